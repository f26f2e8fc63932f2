use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::AppError;
use crate::query::QueryOptions;

pub const ENV_CONFIG: &str = "QUESTLINE_CONFIG";
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5151";
pub const DEFAULT_PROFILE_ID: &str = "household";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_url: String,
    pub profile_id: String,
    /// Where list mirrors are kept; defaults to the platform data dir.
    pub mirror_dir: Option<PathBuf>,
    pub fetch_timeout_secs: u64,
    pub fetch_retries: u32,
    /// Cached lists younger than this are served without asking the server.
    pub stale_after_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.into(),
            profile_id: DEFAULT_PROFILE_ID.into(),
            mirror_dir: None,
            fetch_timeout_secs: 15,
            fetch_retries: 2,
            stale_after_secs: 30,
        }
    }
}

impl ClientConfig {
    /// Resolves the config path and loads it; a missing file yields defaults.
    pub fn find_and_load(cli_value: Option<PathBuf>) -> Result<(PathBuf, Self), AppError> {
        let path = resolve_config_path(cli_value)?;
        let cfg = if path.exists() {
            load_config(&path)?
        } else {
            Self::default()
        };
        Ok((path, cfg))
    }

    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            timeout: Duration::from_secs(self.fetch_timeout_secs.max(1)),
            retries: self.fetch_retries,
            stale_after: Duration::from_secs(self.stale_after_secs),
            ..QueryOptions::default()
        }
    }

    pub fn mirror_dir(&self) -> Result<PathBuf, AppError> {
        if let Some(dir) = &self.mirror_dir {
            return Ok(dir.clone());
        }
        let pd = project_dirs()
            .ok_or_else(|| AppError::Config("could not determine data dir".into()))?;
        Ok(pd.data_dir().join("mirror"))
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "questline", "questline")
}

pub fn resolve_config_path(cli_value: Option<PathBuf>) -> Result<PathBuf, AppError> {
    if let Some(p) = cli_value {
        return Ok(p);
    }
    if let Ok(p) = std::env::var(ENV_CONFIG) {
        return Ok(PathBuf::from(p));
    }
    default_config_path().ok_or_else(|| AppError::Config("could not determine config dir".into()))
}

pub fn default_config_path() -> Option<PathBuf> {
    Some(project_dirs()?.config_dir().join("client.yaml"))
}

pub fn load_config(path: &Path) -> Result<ClientConfig, AppError> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("read {} failed: {e}", path.display())))?;
    let mut cfg: ClientConfig = serde_yaml::from_str(&data)
        .map_err(|e| AppError::Config(format!("parse {} failed: {e}", path.display())))?;
    cfg.server_url = normalize_server_url(&cfg.server_url);
    Ok(cfg)
}

pub fn normalize_server_url(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.trim_end_matches('/').to_string()
    } else {
        format!("http://{}", trimmed.trim_end_matches('/'))
    }
}
