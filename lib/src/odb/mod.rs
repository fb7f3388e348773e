//! Object database: loose storage, pack reading/writing, and the unified
//! store that composes them.

pub mod idx;
pub mod loose;
pub mod pack;
pub mod pack_writer;
pub mod store;

pub use loose::LooseObjectDb;
pub use store::Store;
