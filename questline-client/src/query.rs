//! Cache-first list queries with timeout, retry and mirror fallback.

use std::future::Future;
use std::time::Duration;

use questline_shared::domain::{Editable, Record, now_utc};
use tracing::{debug, info, warn};

use crate::cache::QueryKey;
use crate::context::SyncContext;
use crate::mirror;
use crate::notice::Notice;
use crate::optimistic::{List, persist_or_warn};
use crate::record::Synced;
use crate::remote::RemoteError;

#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Upper bound for one remote fetch attempt.
    pub timeout: Duration,
    /// Extra attempts after the first failure.
    pub retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Cached lists younger than this are served without a fetch.
    pub stale_after: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            retries: 2,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            stale_after: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("no data available: {0}")]
    Unavailable(#[source] RemoteError),
}

/// Where a list answer came from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ListSource {
    Cache,
    Remote,
    Mirror,
    /// Invalidated cache contents, served because everything else failed.
    Stale,
}

#[derive(Debug, Clone)]
pub struct Listed<T> {
    pub items: List<T>,
    pub source: ListSource,
}

impl<T: Record> Listed<T> {
    pub fn records(&self) -> Vec<T> {
        self.items.iter().map(|s| s.record().clone()).collect()
    }
}

/// Runs `fetch` with the per-attempt timeout and exponential backoff between attempts.
async fn fetch_with_retry<T, F, Fut>(
    opts: &QueryOptions,
    key: QueryKey,
    fetch: &F,
) -> Result<Vec<T>, RemoteError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Vec<T>, RemoteError>>,
{
    let mut backoff = opts.initial_backoff;
    let mut attempt = 0u32;
    loop {
        let err = match tokio::time::timeout(opts.timeout, fetch()).await {
            Ok(Ok(rows)) => return Ok(rows),
            Ok(Err(e)) => e,
            Err(_) => RemoteError::Timeout(opts.timeout),
        };
        // Rejections are answers, not outages
        let retryable = !matches!(err, RemoteError::Rejected { status, .. } if status < 500);
        if !retryable || attempt >= opts.retries {
            return Err(err);
        }
        attempt += 1;
        warn!(?key, error = %err, attempt, backoff_ms = backoff.as_millis() as u64, "list fetch failed; retrying");
        tokio::time::sleep(backoff).await;
        backoff = std::cmp::min(backoff * 2, opts.max_backoff);
    }
}

/// Serves a list from the cache when fresh, otherwise from the remote store,
/// falling back to the mirror and finally to stale cache contents.
pub async fn list_query<T, F, Fut>(
    ctx: &SyncContext,
    key: QueryKey,
    fetch: F,
) -> Result<Listed<T>, QueryError>
where
    T: Record,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Vec<T>, RemoteError>>,
{
    let opts = &ctx.options;
    if ctx.cache.is_fresh(key, opts.stale_after).await
        && let Some(items) = ctx.cache.get::<List<T>>(key).await
    {
        return Ok(Listed {
            items,
            source: ListSource::Cache,
        });
    }

    let _guard = ctx.cache.fetch_lock(key).await;
    // Someone else may have fetched while we waited
    if ctx.cache.is_fresh(key, opts.stale_after).await
        && let Some(items) = ctx.cache.get::<List<T>>(key).await
    {
        return Ok(Listed {
            items,
            source: ListSource::Cache,
        });
    }

    match fetch_with_retry(opts, key, &fetch).await {
        Ok(rows) => {
            // Keep placeholders of creates still in flight
            let pending: List<T> = ctx
                .cache
                .get::<List<T>>(key)
                .await
                .unwrap_or_default()
                .into_iter()
                .filter(|s| s.is_pending())
                .collect();
            let mut items: List<T> = rows.into_iter().map(Synced::Persisted).collect();
            items.extend(pending);
            ctx.cache.set(key, items.clone()).await;
            persist_or_warn::<T>(ctx, key).await;
            debug!(?key, count = items.len(), "list fetched");
            Ok(Listed {
                items,
                source: ListSource::Remote,
            })
        }
        Err(err) => fallback(ctx, key, err).await,
    }
}

async fn fallback<T: Record>(
    ctx: &SyncContext,
    key: QueryKey,
    err: RemoteError,
) -> Result<Listed<T>, QueryError> {
    match mirror::load::<T>(ctx.mirror.as_ref(), key.mirror_key()).await {
        Ok(Some(rows)) => {
            let synced = ctx
                .mirror
                .last_sync(key.mirror_key())
                .await
                .ok()
                .flatten();
            info!(?key, error = %err, last_sync = ?synced, "serving list from local mirror");
            ctx.notices.notify(Notice::warning(
                "Working offline",
                format!("Showing locally saved data: {}", err.user_message()),
            ));
            let items: List<T> = rows.into_iter().map(Synced::Persisted).collect();
            ctx.cache.set(key, items.clone()).await;
            // Stays stale so the next read tries the server again
            ctx.cache.invalidate(key).await;
            return Ok(Listed {
                items,
                source: ListSource::Mirror,
            });
        }
        Ok(None) => {}
        Err(e) => warn!(?key, error = %e, "mirror read failed"),
    }

    if let Some(items) = ctx.cache.get::<List<T>>(key).await {
        warn!(?key, error = %err, "serving stale cache");
        return Ok(Listed {
            items,
            source: ListSource::Stale,
        });
    }

    ctx.notices.notify(Notice::error(
        "Could not load data",
        err.user_message(),
    ));
    Err(QueryError::Unavailable(err))
}

/// Finds `id` in the list; a missing record (or an unreachable list) yields defaults.
pub async fn get_or_default<E, F, Fut>(ctx: &SyncContext, key: QueryKey, id: &str, fetch: F) -> E
where
    E: Editable,
    E::Draft: Default,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Vec<E>, RemoteError>>,
{
    match list_query::<E, _, _>(ctx, key, fetch).await {
        Ok(listed) => {
            if let Some(found) = listed.items.into_iter().find(|s| s.has_id(id)) {
                return found.into_record();
            }
        }
        Err(e) => debug!(?key, id, error = %e, "list unavailable; using defaults"),
    }
    E::from_draft(id.to_string(), &Default::default(), now_utc())
}
