//! The cached session token shared by every run mode.
//!
//! The token is copied by hand from an authenticated web-app request and
//! written to a small JSON file that every strategy reads on start-up.
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use time::OffsetDateTime;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const MIN_TOKEN_LEN: usize = 20;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Session {
    #[serde(rename = "x-ut-sid")]
    pub token: String,
    #[serde(default)]
    pub nucleus_id: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default)]
    pub manual_entry: bool,
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

impl Session {
    pub fn new(token: &str, nucleus_id: Option<String>) -> Result<Self> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::InvalidSession("token is empty".into()));
        }
        if token.len() < MIN_TOKEN_LEN {
            return Err(Error::InvalidSession(format!(
                "token is too short ({} chars), copy the whole X-UT-SID value",
                token.len()
            )));
        }

        Ok(Self {
            token: token.to_string(),
            nucleus_id: nucleus_id.filter(|id| !id.trim().is_empty()),
            user_agent: default_user_agent(),
            timestamp: OffsetDateTime::now_utc().unix_timestamp() as f64,
            manual_entry: true,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            Error::InvalidSession(format!("couldn't read {}: {e}", path.display()))
        })?;
        let session: Session = serde_json::from_str(&text).map_err(|e| {
            Error::InvalidSession(format!("couldn't parse {}: {e}", path.display()))
        })?;

        if session.token.trim().is_empty() {
            return Err(Error::InvalidSession(format!(
                "x-ut-sid missing in {}",
                path.display()
            )));
        }

        Ok(session)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn masked_token(&self) -> String {
        let prefix: String = self.token.chars().take(8).collect();
        format!("{prefix}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("fcmarket-session-{}-{name}", std::process::id()))
    }

    #[test]
    fn rejects_short_tokens() {
        assert!(matches!(
            Session::new("abc", None),
            Err(Error::InvalidSession(_))
        ));
        assert!(matches!(
            Session::new("   ", None),
            Err(Error::InvalidSession(_))
        ));
    }

    #[test]
    fn save_then_load() {
        let path = temp_file("roundtrip.json");
        let session = Session::new("0123456789abcdef0123456789", Some("42".into())).unwrap();
        session.save(&path).unwrap();

        let loaded = Session::load(&path).unwrap();
        assert_eq!(loaded, session);
        assert_eq!(loaded.masked_token(), "01234567...");

        fs::remove_file(path).ok();
    }

    #[test]
    fn loads_file_without_optional_fields() {
        let path = temp_file("minimal.json");
        fs::write(&path, r#"{"x-ut-sid": "0123456789abcdef0123456789"}"#).unwrap();

        let session = Session::load(&path).unwrap();
        assert_eq!(session.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(session.nucleus_id, None);
        assert!(!session.manual_entry);

        fs::remove_file(path).ok();
    }

    #[test]
    fn missing_or_empty_token_is_invalid() {
        assert!(matches!(
            Session::load(temp_file("does-not-exist.json")),
            Err(Error::InvalidSession(_))
        ));

        let path = temp_file("no-token-key.json");
        fs::write(&path, r#"{"nucleus_id": "42"}"#).unwrap();
        assert!(matches!(Session::load(&path), Err(Error::InvalidSession(_))));
        fs::remove_file(&path).ok();

        let path = temp_file("empty-token.json");
        fs::write(&path, r#"{"x-ut-sid": ""}"#).unwrap();
        assert!(matches!(Session::load(&path), Err(Error::InvalidSession(_))));
        fs::remove_file(path).ok();
    }
}
