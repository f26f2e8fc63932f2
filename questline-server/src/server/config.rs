use serde::Deserialize;
use std::{env, fs, io::ErrorKind, path::Path};

pub const DEFAULT_PROFILE_ID: &str = "household";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub dev_cors_origin: Option<String>,
    pub listen_port: Option<u16>,
    /// Profile whose balances the domain actions move.
    pub profile_id: String,
    /// IANA timezone name deciding the local day of actions.
    pub timezone: String,
    /// Balance of a freshly created profile.
    pub starting_points: i32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            dev_cors_origin: None,
            listen_port: None,
            profile_id: DEFAULT_PROFILE_ID.to_string(),
            timezone: "UTC".to_string(),
            starting_points: 0,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Yaml(e) => write!(f, "YAML error: {}", e),
            ConfigError::Invalid(m) => write!(f, "invalid config: {}", m),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        ConfigError::Io(value)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(value: serde_yaml::Error) -> Self {
        ConfigError::Yaml(value)
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
        Self::load_from_path(path)
    }

    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %path.as_ref().display(), "config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        let cfg: AppConfig = serde_yaml::from_str(&text)?;
        cfg.tz()?;
        if cfg.profile_id.trim().is_empty() {
            return Err(ConfigError::Invalid("profile_id must not be empty".into()));
        }
        Ok(cfg)
    }

    pub fn tz(&self) -> Result<chrono_tz::Tz, ConfigError> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|e| ConfigError::Invalid(format!("timezone {}: {}", self.timezone, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AppConfig::load_from_path(dir.path().join("nope.yaml")).unwrap();
        assert_eq!(cfg.profile_id, DEFAULT_PROFILE_ID);
        assert_eq!(cfg.tz().unwrap(), chrono_tz::Tz::UTC);
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "timezone: Europe/Warsaw\nstarting_points: 25").unwrap();
        let cfg = AppConfig::load_from_path(f.path()).unwrap();
        assert_eq!(cfg.starting_points, 25);
        assert_eq!(cfg.tz().unwrap(), chrono_tz::Europe::Warsaw);
        assert_eq!(cfg.profile_id, DEFAULT_PROFILE_ID);
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "timezone: Mars/Olympus").unwrap();
        let err = AppConfig::load_from_path(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
