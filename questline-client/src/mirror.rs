//! Local mirror of server lists, used when the server is out of reach.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, trace};

#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("mirror io: {0}")]
    Io(#[from] std::io::Error),
    #[error("mirror serde: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("mirror unavailable: {0}")]
    Unavailable(String),
}

/// Storage slots, one per entity list plus the profile.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MirrorKey {
    AllTasks,
    AllRules,
    AllRewards,
    AllPunishments,
    AllPunishmentHistory,
    AllTaskCompletions,
    AllRuleViolations,
    Profile,
}

impl MirrorKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            MirrorKey::AllTasks => "allTasks",
            MirrorKey::AllRules => "allRules",
            MirrorKey::AllRewards => "allRewards",
            MirrorKey::AllPunishments => "allPunishments",
            MirrorKey::AllPunishmentHistory => "allPunishmentHistory",
            MirrorKey::AllTaskCompletions => "allTaskCompletions",
            MirrorKey::AllRuleViolations => "allRuleViolations",
            MirrorKey::Profile => "profile",
        }
    }
}

impl fmt::Display for MirrorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key-value persistence of JSON documents with a last-sync stamp per key.
#[async_trait]
pub trait LocalMirror: Send + Sync {
    async fn read(&self, key: MirrorKey) -> Result<Option<Value>, MirrorError>;
    /// Stores `value` and stamps the key's last sync time.
    async fn write(&self, key: MirrorKey, value: Value) -> Result<(), MirrorError>;
    async fn last_sync(&self, key: MirrorKey) -> Result<Option<OffsetDateTime>, MirrorError>;
}

pub async fn load<T: DeserializeOwned>(
    mirror: &dyn LocalMirror,
    key: MirrorKey,
) -> Result<Option<Vec<T>>, MirrorError> {
    match mirror.read(key).await? {
        Some(v) => Ok(Some(serde_json::from_value(v)?)),
        None => Ok(None),
    }
}

pub async fn save<T: Serialize>(
    mirror: &dyn LocalMirror,
    key: MirrorKey,
    items: &[T],
) -> Result<(), MirrorError> {
    let value = serde_json::to_value(items)?;
    mirror.write(key, value).await
}

/// One `<key>.json` file per key plus `last_sync.json` under a directory.
pub struct FileMirror {
    dir: PathBuf,
    // Serializes writers of last_sync.json
    stamps: Mutex<()>,
}

const LAST_SYNC_FILE: &str = "last_sync.json";

impl FileMirror {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            stamps: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    async fn read_json(path: &Path) -> Result<Option<Value>, MirrorError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write to a sibling temp file, then rename over the target.
    async fn write_atomic(&self, path: &Path, value: &Value) -> Result<(), MirrorError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let tmp = path.with_extension(format!("json.tmp-{}", uuid::Uuid::new_v4()));
        let data = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(&tmp, data).await?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn read_stamps(&self) -> Result<HashMap<String, String>, MirrorError> {
        let path = self.dir.join(LAST_SYNC_FILE);
        match Self::read_json(&path).await? {
            Some(v) => Ok(serde_json::from_value(v)?),
            None => Ok(HashMap::new()),
        }
    }
}

#[async_trait]
impl LocalMirror for FileMirror {
    async fn read(&self, key: MirrorKey) -> Result<Option<Value>, MirrorError> {
        let path = self.path_for(key.as_str());
        trace!(path = %path.display(), "mirror read");
        Self::read_json(&path).await
    }

    async fn write(&self, key: MirrorKey, value: Value) -> Result<(), MirrorError> {
        let path = self.path_for(key.as_str());
        self.write_atomic(&path, &value).await?;

        let _guard = self.stamps.lock().await;
        let mut stamps = self.read_stamps().await.unwrap_or_default();
        let now = OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .map_err(|e| MirrorError::Unavailable(e.to_string()))?;
        stamps.insert(key.as_str().to_string(), now);
        let stamps = serde_json::to_value(stamps)?;
        self.write_atomic(&self.dir.join(LAST_SYNC_FILE), &stamps)
            .await?;
        debug!(key = %key, path = %path.display(), "mirror saved");
        Ok(())
    }

    async fn last_sync(&self, key: MirrorKey) -> Result<Option<OffsetDateTime>, MirrorError> {
        let stamps = self.read_stamps().await?;
        let Some(text) = stamps.get(key.as_str()) else {
            return Ok(None);
        };
        OffsetDateTime::parse(text, &time::format_description::well_known::Rfc3339)
            .map(Some)
            .map_err(|e| MirrorError::Unavailable(format!("bad last_sync for {key}: {e}")))
    }
}

/// In-process mirror; writes can be switched to fail.
#[derive(Default)]
pub struct MemoryMirror {
    docs: Mutex<HashMap<MirrorKey, (Value, OffsetDateTime)>>,
    fail_writes: AtomicBool,
}

impl MemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl LocalMirror for MemoryMirror {
    async fn read(&self, key: MirrorKey) -> Result<Option<Value>, MirrorError> {
        Ok(self.docs.lock().await.get(&key).map(|(v, _)| v.clone()))
    }

    async fn write(&self, key: MirrorKey, value: Value) -> Result<(), MirrorError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(MirrorError::Unavailable("writes disabled".into()));
        }
        self.docs
            .lock()
            .await
            .insert(key, (value, OffsetDateTime::now_utc()));
        Ok(())
    }

    async fn last_sync(&self, key: MirrorKey) -> Result<Option<OffsetDateTime>, MirrorError> {
        Ok(self.docs.lock().await.get(&key).map(|(_, t)| *t))
    }
}
