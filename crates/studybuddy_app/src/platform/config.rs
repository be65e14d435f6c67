//! Optional RON configuration file.
//!
//! Every field may be omitted; missing fields keep the engine defaults.
//!
//! ```ron
//! (
//!     base_url: "http://localhost:8000/",
//!     poll_interval_ms: 500,
//!     n_results: 5,
//! )
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use studybuddy_engine::{ClientError, ClientSettings, EngineConfig, PollSettings};
use studybuddy_logging::{sb_debug, sb_info};

pub const CONFIG_FILENAME: &str = "studybuddy.ron";

const DEFAULT_N_RESULTS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub base_url: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub chat_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub n_results: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        let client = ClientSettings::default();
        let poll = PollSettings::default();
        Self {
            base_url: client.base_url.to_string(),
            connect_timeout_secs: client.connect_timeout.as_secs(),
            request_timeout_secs: client.request_timeout.as_secs(),
            chat_timeout_secs: client.chat_timeout.as_secs(),
            poll_interval_ms: poll.interval.as_millis() as u64,
            n_results: DEFAULT_N_RESULTS,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: ron::error::SpannedError,
    },
    #[error("invalid base url: {0}")]
    BaseUrl(#[source] ClientError),
    #[error("{0} must be positive")]
    NotPositive(&'static str),
}

/// Loads `explicit`, or `./studybuddy.ron` when no path is given. Only the
/// implicit file may be missing.
pub fn load(explicit: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let (path, required) = match explicit {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(CONFIG_FILENAME), false),
    };
    let content = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound && !required => {
            sb_debug!("No config at {:?}; using defaults", path);
            return Ok(AppConfig::default());
        }
        Err(source) => return Err(ConfigError::Read { path, source }),
    };

    let config = ron::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.clone(),
        source,
    })?;
    sb_info!("Loaded config from {:?}", path);
    Ok(config)
}

impl AppConfig {
    pub fn into_engine_config(self) -> Result<EngineConfig, ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::NotPositive("poll_interval_ms"));
        }
        if self.n_results == 0 {
            return Err(ConfigError::NotPositive("n_results"));
        }
        let client = ClientSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            chat_timeout: Duration::from_secs(self.chat_timeout_secs),
            ..ClientSettings::default()
        }
        .with_base_url(&self.base_url)
        .map_err(ConfigError::BaseUrl)?;
        Ok(EngineConfig {
            client,
            poll: PollSettings {
                interval: Duration::from_millis(self.poll_interval_ms),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        fs::write(&path, "(base_url: \"http://study.local:9000/\", n_results: 8)").unwrap();

        let config = load(Some(&path)).unwrap();
        assert_eq!(
            config,
            AppConfig {
                base_url: "http://study.local:9000/".to_string(),
                n_results: 8,
                ..AppConfig::default()
            }
        );
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(Some(&dir.path().join("absent.ron"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        fs::write(&path, "(base_url: 42").unwrap();
        assert!(matches!(load(Some(&path)), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn defaults_match_engine_defaults() {
        let engine = AppConfig::default().into_engine_config().unwrap();
        assert_eq!(engine.client.base_url.as_str(), "http://localhost:8000/");
        assert_eq!(engine.client.request_timeout, Duration::from_secs(30));
        assert_eq!(engine.poll.interval, Duration::from_millis(500));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let zero_poll = AppConfig {
            poll_interval_ms: 0,
            ..AppConfig::default()
        };
        assert!(matches!(
            zero_poll.into_engine_config(),
            Err(ConfigError::NotPositive("poll_interval_ms"))
        ));

        let bad_url = AppConfig {
            base_url: "not a url".to_string(),
            ..AppConfig::default()
        };
        assert!(matches!(
            bad_url.into_engine_config(),
            Err(ConfigError::BaseUrl(_))
        ));
    }
}
