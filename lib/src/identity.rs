//! Author/committer identity resolution and timestamp/timezone formatting.
//!
//! Grounded on `examples/original_source/pygit/util.py::timestamp_from_env`/
//! `timezone_offset_utc` and `config.py::get_user_identity`. Resolution order
//! per spec.md §4.16: environment variables, then repository config, then
//! the OS account name via `whoami`, then a fixed fallback.

use chrono::{Local, Offset, Utc};

use crate::config::Config;

const FALLBACK_NAME: &str = "Unknown";
const FALLBACK_EMAIL: &str = "unknown@localhost";

/// An author or committer identity plus the point in time an action is
/// attributed to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub timestamp: i64,
    pub tz_offset: String,
}

impl Signature {
    /// `"Name <email>"`, the form embedded in commit/tag headers.
    pub fn identity_line(&self) -> String {
        format!("{} <{}>", self.name, self.email)
    }
}

/// Injectable identity source, so callers (and tests) can override any layer
/// of the resolution chain without touching process environment or `$HOME`.
pub trait IdentitySource {
    fn env_var(&self, key: &str) -> Option<String>;
    fn config(&self) -> Option<&Config>;
    fn os_account_name(&self) -> Option<String>;
}

/// The real resolution chain: `std::env`, repository config, `whoami`.
pub struct SystemIdentitySource<'a> {
    pub config: Option<&'a Config>,
}

impl IdentitySource for SystemIdentitySource<'_> {
    fn env_var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }

    fn config(&self) -> Option<&Config> {
        self.config
    }

    fn os_account_name(&self) -> Option<String> {
        let name = whoami::realname();
        if name.trim().is_empty() {
            None
        } else {
            Some(name)
        }
    }
}

/// Resolve a name/email pair for `kind` (`"AUTHOR"` or `"COMMITTER"`):
/// `GIT_<KIND>_NAME`/`GIT_<KIND>_EMAIL`, then `user.name`/`user.email` in
/// config, then the OS account name with a synthesized email, then a fixed
/// fallback. Name and email are resolved independently, so e.g. an
/// env-supplied name can pair with a config-supplied email.
pub fn resolve_name_email(source: &dyn IdentitySource, kind: &str) -> (String, String) {
    let name = source
        .env_var(&format!("GIT_{kind}_NAME"))
        .or_else(|| source.config().and_then(|c| c.get("user.name").ok().flatten()))
        .or_else(|| source.os_account_name())
        .unwrap_or_else(|| FALLBACK_NAME.to_string());
    let email = source
        .env_var(&format!("GIT_{kind}_EMAIL"))
        .or_else(|| source.config().and_then(|c| c.get("user.email").ok().flatten()))
        .unwrap_or_else(|| FALLBACK_EMAIL.to_string());
    (name, email)
}

/// `GIT_AUTHOR_DATE`/`GIT_COMMITTER_DATE`, formatted `"<unix-ts> <tz>"`
/// (e.g. `"1700000000 +0000"`). Returns `None` if unset or malformed.
pub fn timestamp_from_env(kind: &str) -> Option<(i64, String)> {
    let val = std::env::var(format!("GIT_{kind}_DATE")).ok()?;
    let val = val.trim();
    if val.is_empty() {
        return None;
    }
    let mut parts = val.splitn(2, char::is_whitespace);
    let ts: i64 = parts.next()?.parse().ok()?;
    let tz = parts.next().unwrap_or("+0000").trim().to_string();
    Some((ts, if tz.is_empty() { "+0000".to_string() } else { tz }))
}

pub fn local_tz_offset() -> String {
    let offset_seconds = Local::now().offset().fix().local_minus_utc();
    let sign = if offset_seconds >= 0 { '+' } else { '-' };
    let abs = offset_seconds.unsigned_abs();
    format!("{sign}{:02}{:02}", abs / 3600, (abs % 3600) / 60)
}

/// Build the [`Signature`] to attribute a new commit/tag to, honoring
/// `GIT_<KIND>_DATE` for reproducible timestamps (e.g. test fixtures,
/// scripted history rewrites) before falling back to wall-clock time.
pub fn resolve_signature(source: &dyn IdentitySource, kind: &str) -> Signature {
    let (name, email) = resolve_name_email(source, kind);
    let (timestamp, tz_offset) = timestamp_from_env(kind)
        .unwrap_or_else(|| (Utc::now().timestamp(), local_tz_offset()));
    Signature { name, email, timestamp, tz_offset }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct FakeSource {
        env: std::collections::HashMap<String, String>,
        config: Config,
    }

    impl IdentitySource for FakeSource {
        fn env_var(&self, key: &str) -> Option<String> {
            self.env.get(key).cloned()
        }
        fn config(&self) -> Option<&Config> {
            Some(&self.config)
        }
        fn os_account_name(&self) -> Option<String> {
            None
        }
    }

    #[test]
    fn env_takes_priority_over_config() {
        let mut config = Config::default();
        config.set("user.name", "Config Name").unwrap();
        config.set("user.email", "config@example.com").unwrap();
        let mut env = std::collections::HashMap::new();
        env.insert("GIT_AUTHOR_NAME".to_string(), "Env Name".to_string());
        let source = FakeSource { env, config };
        let (name, email) = resolve_name_email(&source, "AUTHOR");
        assert_eq!(name, "Env Name");
        assert_eq!(email, "config@example.com");
    }

    #[test]
    fn falls_back_when_nothing_configured() {
        let source = FakeSource { env: Default::default(), config: Config::default() };
        let (name, email) = resolve_name_email(&source, "COMMITTER");
        assert_eq!(name, FALLBACK_NAME);
        assert_eq!(email, FALLBACK_EMAIL);
    }

    #[test]
    fn timestamp_from_env_parses_unix_and_tz() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            std::env::set_var("GIT_AUTHOR_DATE", "1700000000 +0530");
        }
        assert_eq!(timestamp_from_env("AUTHOR"), Some((1700000000, "+0530".to_string())));
        unsafe {
            std::env::remove_var("GIT_AUTHOR_DATE");
        }
        assert_eq!(timestamp_from_env("AUTHOR"), None);
    }
}
