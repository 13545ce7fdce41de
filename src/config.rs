use std::{
    env, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use log::info;
use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8008";
pub const DEFAULT_USERS_PATH: &str = "data/users.json";
pub const DEFAULT_CONFIG_PATH: &str = "data/config.json";
pub const DEFAULT_SESSIONS: usize = 10;

/// Optional runtime configuration file.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// Key for password derivation. Without it sessions can only use pre-issued tokens.
    #[serde(default)]
    pub shared_secret: Option<String>,
}

impl RuntimeConfig {
    /// A missing file yields the defaults; a file that exists but does not parse is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No runtime config at {}, login-based auth disabled", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Missing {
                    path: path.to_owned(),
                    source,
                })
            }
        };

        let mut config: RuntimeConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Malformed {
                path: path.to_owned(),
                source,
            })?;

        if config.shared_secret.as_deref().is_some_and(str::is_empty) {
            config.shared_secret = None;
        }

        Ok(config)
    }
}

/// Command line and environment for the binary.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub base_url: String,
    pub sessions: usize,
    /// `None` runs until interrupted.
    pub duration: Option<Duration>,
    pub users_path: PathBuf,
    pub config_path: PathBuf,
    pub request_timeout: Duration,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::parse(
            env::args().skip(1),
            env::var("LOAD_USERS").ok(),
            env::var("LOAD_CONFIG").ok(),
        )
    }

    /// `[base_url] [sessions] [duration_secs]`, where a duration of 0 means indefinite.
    pub fn parse<I>(
        args: I,
        users_path: Option<String>,
        config_path: Option<String>,
    ) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();

        let base_url = args.next().unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::InvalidArgument(format!(
                "base url must be http(s): {}",
                base_url
            )));
        }

        let sessions = match args.next() {
            Some(s) => s.parse::<usize>().map_err(|e| {
                ConfigError::InvalidArgument(format!("session count {:?}: {}", s, e))
            })?,
            None => DEFAULT_SESSIONS,
        };

        let duration = match args.next() {
            Some(s) => {
                let secs = s.parse::<u64>().map_err(|e| {
                    ConfigError::InvalidArgument(format!("duration {:?}: {}", s, e))
                })?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            None => None,
        };

        Ok(Settings {
            base_url,
            sessions,
            duration,
            users_path: users_path
                .unwrap_or_else(|| DEFAULT_USERS_PATH.to_string())
                .into(),
            config_path: config_path
                .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
                .into(),
            request_timeout: Duration::from_secs(90),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_without_arguments() {
        let settings = Settings::parse(Vec::new(), None, None).unwrap();

        assert_eq!(settings.base_url, DEFAULT_BASE_URL);
        assert_eq!(settings.sessions, DEFAULT_SESSIONS);
        assert_eq!(settings.duration, None);
        assert_eq!(settings.users_path, PathBuf::from(DEFAULT_USERS_PATH));
    }

    #[test]
    fn positional_arguments() {
        let settings = Settings::parse(
            args(&["https://matrix.example.org", "250", "600"]),
            Some("u.json".into()),
            None,
        )
        .unwrap();

        assert_eq!(settings.base_url, "https://matrix.example.org");
        assert_eq!(settings.sessions, 250);
        assert_eq!(settings.duration, Some(Duration::from_secs(600)));
        assert_eq!(settings.users_path, PathBuf::from("u.json"));
    }

    #[test]
    fn zero_duration_is_indefinite() {
        let settings =
            Settings::parse(args(&["http://localhost", "1", "0"]), None, None).unwrap();
        assert_eq!(settings.duration, None);
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(Settings::parse(args(&["localhost:8008"]), None, None).is_err());
        assert!(Settings::parse(args(&["http://localhost", "many"]), None, None).is_err());
    }

    #[test]
    fn missing_runtime_config_is_default() {
        let config = RuntimeConfig::load("does/not/exist.json").unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }
}
