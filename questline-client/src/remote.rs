use std::time::Duration;

use async_trait::async_trait;
use questline_shared::api::rest::{self, RestError};
use questline_shared::api::{
    HistoryFilter, PointsAdjustReq, PunishmentApplyResp, RewardBuyResp, RuleViolationResp, Table,
    TaskCompletionResp,
};
use questline_shared::domain::{
    Editable, Profile, Punishment, PunishmentHistoryItem, Reward, Rule, RuleViolation, Task,
    TaskCompletion,
};

#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    #[error("server unreachable: {0}")]
    Unreachable(String),
    #[error("server rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("malformed server response: {0}")]
    Decode(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl RemoteError {
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Message suitable for a notice; prefers the server's `{"error"}` text.
    pub fn user_message(&self) -> String {
        match self {
            RemoteError::Rejected { body, .. } => {
                serde_json::from_str::<questline_shared::api::ErrorBody>(body)
                    .map(|b| b.error)
                    .unwrap_or_else(|_| self.to_string())
            }
            other => other.to_string(),
        }
    }
}

impl From<RestError> for RemoteError {
    fn from(e: RestError) -> Self {
        match e {
            RestError::Http(m) => RemoteError::Unreachable(m),
            RestError::Status { status, body } => RemoteError::Rejected { status, body },
            RestError::Serde(m) => RemoteError::Decode(m),
        }
    }
}

/// Table-level CRUD against the remote store.
#[async_trait]
pub trait RemoteTable<E: Editable>: Send + Sync {
    async fn select_all(&self) -> Result<Vec<E>, RemoteError>;
    async fn insert(&self, draft: &E::Draft) -> Result<E, RemoteError>;
    async fn update(&self, id: &str, patch: &E::Patch) -> Result<E, RemoteError>;
    async fn delete(&self, id: &str) -> Result<(), RemoteError>;
}

/// Server-side atomic actions and the read-only history tables.
#[async_trait]
pub trait RemoteActions: Send + Sync {
    async fn complete_task(&self, task_id: &str) -> Result<TaskCompletionResp, RemoteError>;
    async fn violate_rule(&self, rule_id: &str) -> Result<RuleViolationResp, RemoteError>;
    async fn buy_reward(&self, reward_id: &str) -> Result<RewardBuyResp, RemoteError>;
    async fn apply_punishment(&self, punishment_id: &str)
    -> Result<PunishmentApplyResp, RemoteError>;
    async fn profile(&self, profile_id: &str) -> Result<Profile, RemoteError>;
    async fn adjust_points(
        &self,
        profile_id: &str,
        req: &PointsAdjustReq,
    ) -> Result<Profile, RemoteError>;
    async fn task_completions(
        &self,
        filter: &HistoryFilter,
    ) -> Result<Vec<TaskCompletion>, RemoteError>;
    async fn rule_violations(&self, filter: &HistoryFilter)
    -> Result<Vec<RuleViolation>, RemoteError>;
    async fn punishment_history(
        &self,
        filter: &HistoryFilter,
    ) -> Result<Vec<PunishmentHistoryItem>, RemoteError>;
}

/// Everything the hooks need from a server.
pub trait Backend:
    RemoteTable<Task>
    + RemoteTable<Rule>
    + RemoteTable<Reward>
    + RemoteTable<Punishment>
    + RemoteActions
{
}

impl<T> Backend for T where
    T: RemoteTable<Task>
        + RemoteTable<Rule>
        + RemoteTable<Reward>
        + RemoteTable<Punishment>
        + RemoteActions
{
}

/// REST implementation over the shared client helpers.
#[derive(Debug, Clone)]
pub struct RestRemote {
    base: String,
}

impl RestRemote {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Version string reported by the server.
    pub async fn server_version(&self) -> Result<String, RemoteError> {
        Ok(rest::server_version(&self.base).await?.version)
    }
}

#[async_trait]
impl<E: Editable> RemoteTable<E> for RestRemote {
    async fn select_all(&self) -> Result<Vec<E>, RemoteError> {
        Ok(rest::select_all(&self.base, E::TABLE).await?)
    }

    async fn insert(&self, draft: &E::Draft) -> Result<E, RemoteError> {
        Ok(rest::insert(&self.base, E::TABLE, draft).await?)
    }

    async fn update(&self, id: &str, patch: &E::Patch) -> Result<E, RemoteError> {
        Ok(rest::update(&self.base, E::TABLE, id, patch).await?)
    }

    async fn delete(&self, id: &str) -> Result<(), RemoteError> {
        Ok(rest::delete(&self.base, E::TABLE, id).await?)
    }
}

#[async_trait]
impl RemoteActions for RestRemote {
    async fn complete_task(&self, task_id: &str) -> Result<TaskCompletionResp, RemoteError> {
        Ok(rest::complete_task(&self.base, task_id).await?)
    }

    async fn violate_rule(&self, rule_id: &str) -> Result<RuleViolationResp, RemoteError> {
        Ok(rest::violate_rule(&self.base, rule_id).await?)
    }

    async fn buy_reward(&self, reward_id: &str) -> Result<RewardBuyResp, RemoteError> {
        Ok(rest::buy_reward(&self.base, reward_id).await?)
    }

    async fn apply_punishment(
        &self,
        punishment_id: &str,
    ) -> Result<PunishmentApplyResp, RemoteError> {
        Ok(rest::apply_punishment(&self.base, punishment_id).await?)
    }

    async fn profile(&self, profile_id: &str) -> Result<Profile, RemoteError> {
        Ok(rest::select_one(&self.base, Table::Profiles, profile_id).await?)
    }

    async fn adjust_points(
        &self,
        profile_id: &str,
        req: &PointsAdjustReq,
    ) -> Result<Profile, RemoteError> {
        Ok(rest::adjust_points(&self.base, profile_id, req).await?)
    }

    async fn task_completions(
        &self,
        filter: &HistoryFilter,
    ) -> Result<Vec<TaskCompletion>, RemoteError> {
        Ok(rest::select_filtered(&self.base, Table::TaskCompletionHistory, filter).await?)
    }

    async fn rule_violations(
        &self,
        filter: &HistoryFilter,
    ) -> Result<Vec<RuleViolation>, RemoteError> {
        Ok(rest::select_filtered(&self.base, Table::RuleViolations, filter).await?)
    }

    async fn punishment_history(
        &self,
        filter: &HistoryFilter,
    ) -> Result<Vec<PunishmentHistoryItem>, RemoteError> {
        Ok(rest::select_filtered(&self.base, Table::PunishmentHistory, filter).await?)
    }
}
