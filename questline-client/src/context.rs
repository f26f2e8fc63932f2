use std::sync::Arc;

use crate::cache::QueryCache;
use crate::mirror::{LocalMirror, MemoryMirror};
use crate::notice::{LogNotices, NoticeSink};
use crate::query::QueryOptions;

/// Collaborators every hook and helper works against.
#[derive(Clone)]
pub struct SyncContext {
    pub cache: QueryCache,
    pub mirror: Arc<dyn LocalMirror>,
    pub notices: Arc<dyn NoticeSink>,
    pub options: QueryOptions,
}

impl SyncContext {
    pub fn new(mirror: Arc<dyn LocalMirror>, notices: Arc<dyn NoticeSink>) -> Self {
        Self {
            cache: QueryCache::new(),
            mirror,
            notices,
            options: QueryOptions::default(),
        }
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    /// Memory-only mirror and log notices.
    pub fn ephemeral() -> Self {
        Self::new(Arc::new(MemoryMirror::new()), Arc::new(LogNotices))
    }
}
