//! Sync state of a cached record.

use std::borrow::Cow;
use std::fmt;

use questline_shared::domain::Record;
use uuid::Uuid;

/// Client-side identifier of a record the server has not acknowledged yet.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TempId(Uuid);

impl TempId {
    pub fn new() -> Self {
        TempId(Uuid::new_v4())
    }
}

impl Default for TempId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "temp-{}", self.0)
    }
}

/// A cached list entry: either an optimistic placeholder or a server record.
#[derive(Debug, Clone, PartialEq)]
pub enum Synced<T> {
    Pending { temp_id: TempId, record: T },
    Persisted(T),
}

impl<T: Record> Synced<T> {
    /// Temp id for placeholders, server id otherwise.
    pub fn id(&self) -> Cow<'_, str> {
        match self {
            Synced::Pending { temp_id, .. } => Cow::Owned(temp_id.to_string()),
            Synced::Persisted(r) => Cow::Borrowed(r.id()),
        }
    }

    pub fn has_id(&self, id: &str) -> bool {
        self.id() == id
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Synced::Pending { .. })
    }

    pub fn temp_id(&self) -> Option<TempId> {
        match self {
            Synced::Pending { temp_id, .. } => Some(*temp_id),
            Synced::Persisted(_) => None,
        }
    }

    pub fn record(&self) -> &T {
        match self {
            Synced::Pending { record, .. } | Synced::Persisted(record) => record,
        }
    }

    pub fn record_mut(&mut self) -> &mut T {
        match self {
            Synced::Pending { record, .. } | Synced::Persisted(record) => record,
        }
    }

    pub fn into_record(self) -> T {
        match self {
            Synced::Pending { record, .. } | Synced::Persisted(record) => record,
        }
    }

    pub fn persisted(&self) -> Option<&T> {
        match self {
            Synced::Persisted(r) => Some(r),
            Synced::Pending { .. } => None,
        }
    }
}

/// Server records of a list, placeholders skipped.
pub fn persisted_records<T: Record>(list: &[Synced<T>]) -> Vec<T> {
    list.iter().filter_map(|s| s.persisted().cloned()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use questline_shared::domain::{Editable, Task, TaskDraft, now_utc};

    #[test]
    fn pending_entries_are_addressed_by_temp_id() {
        let temp = TempId::new();
        let task = Task::from_draft(temp.to_string(), &TaskDraft::new("Clean room", 5), now_utc());
        let pending = Synced::Pending {
            temp_id: temp,
            record: task.clone(),
        };
        assert!(pending.is_pending());
        assert!(pending.id().starts_with("temp-"));
        assert!(pending.has_id(&temp.to_string()));

        let mut saved = task;
        saved.id = "t1".into();
        let persisted = Synced::Persisted(saved);
        assert!(!persisted.is_pending());
        assert_eq!(persisted.id(), "t1");
        assert_eq!(persisted_records(&[pending, persisted]).len(), 1);
    }
}
