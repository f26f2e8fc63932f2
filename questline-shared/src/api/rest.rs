//! Minimal REST client helpers for consumers (clients).

use super::endpoints as ep;
use super::*;
use once_cell::sync::Lazy;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

pub use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("http: {0}")]
    Http(String),
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("serde: {0}")]
    Serde(String),
}

impl RestError {
    pub fn status(&self) -> Option<u16> {
        match self {
            RestError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .tcp_keepalive(Some(Duration::from_secs(180)))
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(180))
        // Bound request duration; list queries race a shorter timeout on top
        .timeout(Duration::from_secs(60))
        .build()
        .expect("failed to build HTTP client")
});

fn mk_client() -> Result<reqwest::Client, RestError> {
    Ok(HTTP_CLIENT.clone())
}

async fn handle_json<T: DeserializeOwned>(res: reqwest::Response) -> Result<T, RestError> {
    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(RestError::Status {
            status: status.as_u16(),
            body,
        });
    }
    res.json::<T>()
        .await
        .map_err(|e| RestError::Serde(e.to_string()))
}

async fn handle_empty(res: reqwest::Response) -> Result<(), RestError> {
    if res.status().is_success() {
        Ok(())
    } else {
        let status = res.status().as_u16();
        let body = res.text().await.unwrap_or_default();
        Err(RestError::Status { status, body })
    }
}

async fn get_json<T: DeserializeOwned>(url: String) -> Result<T, RestError> {
    let client = mk_client()?;
    let res = client
        .get(url)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
    url: String,
    body: Option<&B>,
) -> Result<T, RestError> {
    let client = mk_client()?;
    let mut req = client.post(url);
    if let Some(b) = body {
        req = req.json(b);
    }
    let res = req
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn server_version(base: &str) -> Result<VersionInfoDto, RestError> {
    get_json(ep::version(base)).await
}

/// `GET /{table}`, newest first for history tables.
pub async fn select_all<T: DeserializeOwned>(base: &str, table: Table) -> Result<Vec<T>, RestError> {
    get_json(ep::collection(base, table)).await
}

pub async fn select_filtered<T: DeserializeOwned>(
    base: &str,
    table: Table,
    filter: &HistoryFilter,
) -> Result<Vec<T>, RestError> {
    get_json(ep::filtered_collection(base, table, filter)).await
}

pub async fn select_one<T: DeserializeOwned>(
    base: &str,
    table: Table,
    id: &str,
) -> Result<T, RestError> {
    get_json(ep::item(base, table, id)).await
}

/// Insert-returning: the response carries the server id and timestamps.
pub async fn insert<D: Serialize, T: DeserializeOwned>(
    base: &str,
    table: Table,
    draft: &D,
) -> Result<T, RestError> {
    post_json(ep::collection(base, table), Some(draft)).await
}

/// Update-returning: the response is the authoritative record.
pub async fn update<P: Serialize, T: DeserializeOwned>(
    base: &str,
    table: Table,
    id: &str,
    patch: &P,
) -> Result<T, RestError> {
    let client = mk_client()?;
    let res = client
        .patch(ep::item(base, table, id))
        .json(patch)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn delete(base: &str, table: Table, id: &str) -> Result<(), RestError> {
    let client = mk_client()?;
    let res = client
        .delete(ep::item(base, table, id))
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_empty(res).await
}

pub async fn complete_task(base: &str, task_id: &str) -> Result<TaskCompletionResp, RestError> {
    post_json::<(), _>(ep::task_complete(base, task_id), None).await
}

pub async fn violate_rule(base: &str, rule_id: &str) -> Result<RuleViolationResp, RestError> {
    post_json::<(), _>(ep::rule_violate(base, rule_id), None).await
}

pub async fn buy_reward(base: &str, reward_id: &str) -> Result<RewardBuyResp, RestError> {
    post_json::<(), _>(ep::reward_buy(base, reward_id), None).await
}

pub async fn apply_punishment(
    base: &str,
    punishment_id: &str,
) -> Result<PunishmentApplyResp, RestError> {
    post_json::<(), _>(ep::punishment_apply(base, punishment_id), None).await
}

pub async fn adjust_points(
    base: &str,
    profile_id: &str,
    req: &PointsAdjustReq,
) -> Result<Profile, RestError> {
    post_json(ep::profile_points(base, profile_id), Some(req)).await
}
