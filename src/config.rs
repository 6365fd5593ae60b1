use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::compose::DEFAULT_REPLY_BODY;

pub const SETTINGS_FILE: &str = "settings.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub credentials_path: PathBuf,
    pub server: ServerConfig,
    pub responder: ResponderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// How long a login waits for the user to finish the consent flow.
    pub consent_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponderConfig {
    /// Marker label for handled messages.
    pub label_name: String,
    /// Gmail search selecting candidate messages.
    pub query: String,
    pub min_delay_secs: u64,
    pub max_delay_secs: u64,
    pub reply_body: String,
    /// Tag and archive a message even when its reply failed to send.
    pub tag_on_send_failure: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            credentials_path: PathBuf::from("credentials.json"),
            server: ServerConfig::default(),
            responder: ResponderConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 5000)),
            consent_timeout_secs: 300,
        }
    }
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            label_name: "During Vacation".to_string(),
            query: "-in:chats -from:me -has:userlabels".to_string(),
            min_delay_secs: 45,
            max_delay_secs: 120,
            reply_body: DEFAULT_REPLY_BODY.to_string(),
            tag_on_send_failure: true,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(SETTINGS_FILE)
    }

    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn log_level(&self) -> Result<tracing::Level> {
        self.log_level
            .parse()
            .map_err(|_| anyhow::anyhow!("Unknown log level {:?}", self.log_level))
    }

    fn validate(&self) -> Result<()> {
        self.log_level()?;
        if self.server.consent_timeout_secs == 0 {
            bail!("server.consent_timeout_secs must be at least 1");
        }
        let r = &self.responder;
        if r.label_name.trim().is_empty() {
            bail!("responder.label_name must not be empty");
        }
        if r.min_delay_secs == 0 {
            bail!("responder.min_delay_secs must be at least 1");
        }
        if r.min_delay_secs > r.max_delay_secs {
            bail!(
                "responder.min_delay_secs ({}) exceeds max_delay_secs ({})",
                r.min_delay_secs,
                r.max_delay_secs
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(dir.path().join("settings.toml")).unwrap();

        assert_eq!(config.server.bind.port(), 5000);
        assert_eq!(config.server.consent_timeout_secs, 300);
        assert_eq!(config.responder.label_name, "During Vacation");
        assert_eq!(config.responder.query, "-in:chats -from:me -has:userlabels");
        assert_eq!((config.responder.min_delay_secs, config.responder.max_delay_secs), (45, 120));
        assert!(config.responder.tag_on_send_failure);
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "log_level = \"debug\"\n[responder]\nlabel_name = \"Away\"\ntag_on_send_failure = false"
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();

        assert_eq!(config.log_level().unwrap(), tracing::Level::DEBUG);
        assert_eq!(config.responder.label_name, "Away");
        assert!(!config.responder.tag_on_send_failure);
        assert_eq!(config.responder.max_delay_secs, 120);
        assert_eq!(config.credentials_path, PathBuf::from("credentials.json"));
    }

    #[test]
    fn inverted_delay_bounds_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[responder]\nmin_delay_secs = 200\nmax_delay_secs = 100").unwrap();

        assert!(Config::load_from(file.path()).is_err());
    }

    #[test]
    fn zero_consent_timeout_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nconsent_timeout_secs = 0").unwrap();

        assert!(Config::load_from(file.path()).is_err());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log_level = ").unwrap();

        assert!(Config::load_from(file.path()).is_err());
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log_level = \"loud\"").unwrap();

        assert!(Config::load_from(file.path()).is_err());
    }
}
