//! Generic optimistic create/update/delete over cached lists.
//!
//! Each helper snapshots the cached list, applies the change locally, awaits
//! the remote call and then either reconciles with the server record or
//! restores the snapshot. The mirror is only written after a successful
//! remote call, and a mirror failure never rolls anything back.

use std::future::Future;

use questline_shared::api::Table;
use questline_shared::domain::{Editable, Record};
use tracing::{debug, warn};

use crate::cache::QueryKey;
use crate::context::SyncContext;
use crate::mirror::{self, MirrorError};
use crate::notice::Notice;
use crate::record::{Synced, TempId, persisted_records};
use crate::remote::RemoteError;

pub type List<T> = Vec<Synced<T>>;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MutationState {
    Idle,
    OptimisticApplied,
    SettledSuccess,
    SettledError,
}

#[derive(Debug)]
pub struct MutationOutcome<T> {
    /// States passed through, in order.
    pub trail: Vec<MutationState>,
    pub result: Result<T, RemoteError>,
    /// False when the mirror could not follow a successful remote write.
    pub mirrored: bool,
}

impl<T> MutationOutcome<T> {
    pub fn state(&self) -> MutationState {
        self.trail.last().copied().unwrap_or(MutationState::Idle)
    }

    pub fn into_result(self) -> Result<T, RemoteError> {
        self.result
    }
}

/// A second list whose rows point at records of the mutated list.
pub struct Related<H> {
    pub key: QueryKey,
    /// True when `row` references the record with the given id.
    pub references: fn(&H, &str) -> bool,
}

fn noun(table: Table) -> &'static str {
    match table {
        Table::Tasks => "task",
        Table::Rules => "rule",
        Table::Rewards => "reward",
        Table::Punishments => "punishment",
        Table::PunishmentHistory => "punishment history",
        Table::RuleViolations => "rule violation",
        Table::TaskCompletionHistory => "task completion",
        Table::Profiles => "profile",
    }
}

async fn restore<T: Send + Sync + 'static>(ctx: &SyncContext, key: QueryKey, snapshot: Option<T>) {
    match snapshot {
        Some(v) => ctx.cache.set(key, v).await,
        None => ctx.cache.remove(key).await,
    }
}

/// Loads the mirror copy into an empty cache slot, marked stale.
pub(crate) async fn seed_from_mirror<T: Record>(ctx: &SyncContext, key: QueryKey) {
    if ctx.cache.get::<List<T>>(key).await.is_some() {
        return;
    }
    match mirror::load::<T>(ctx.mirror.as_ref(), key.mirror_key()).await {
        Ok(Some(rows)) => {
            let list: List<T> = rows.into_iter().map(Synced::Persisted).collect();
            ctx.cache.set(key, list).await;
            ctx.cache.invalidate(key).await;
        }
        Ok(None) => {}
        Err(e) => debug!(error = %e, ?key, "no mirror copy to seed from"),
    }
}

/// Writes the persisted part of a cached list to the mirror. No-op when the list is not cached.
pub(crate) async fn persist_list<T: Record>(
    ctx: &SyncContext,
    key: QueryKey,
) -> Result<(), MirrorError> {
    let _guard = ctx.cache.mirror_lock(key).await;
    let Some(list) = ctx.cache.get::<List<T>>(key).await else {
        return Ok(());
    };
    mirror::save(
        ctx.mirror.as_ref(),
        key.mirror_key(),
        &persisted_records(&list),
    )
    .await
}

/// Persists and reports a failure as a warning. Returns whether the mirror is current.
pub(crate) async fn persist_or_warn<T: Record>(ctx: &SyncContext, key: QueryKey) -> bool {
    match persist_list::<T>(ctx, key).await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, ?key, "mirror write failed after remote success");
            ctx.notices.notify(Notice::warning(
                "Saved, but not stored locally",
                format!("The server has the change; the local copy could not be updated: {e}"),
            ));
            false
        }
    }
}

/// Inserts a placeholder built from `draft`, then swaps it for the server record.
pub async fn create_optimistic<E, B, F, Fut>(
    ctx: &SyncContext,
    key: QueryKey,
    draft: &E::Draft,
    build: B,
    remote: F,
) -> MutationOutcome<E>
where
    E: Editable,
    B: FnOnce(&TempId, &E::Draft) -> E,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<E, RemoteError>>,
{
    let mut trail = vec![MutationState::Idle];
    let snapshot = ctx.cache.get::<List<E>>(key).await;
    seed_from_mirror::<E>(ctx, key).await;

    let temp_id = TempId::new();
    let placeholder = Synced::Pending {
        temp_id,
        record: build(&temp_id, draft),
    };
    let pending = placeholder.clone();
    if !ctx
        .cache
        .update::<List<E>, _>(key, move |list| list.push(pending))
        .await
    {
        ctx.cache.set(key, vec![placeholder]).await;
    }
    trail.push(MutationState::OptimisticApplied);
    debug!(?key, %temp_id, "optimistic create applied");

    let mut mirrored = false;
    let result = match remote().await {
        Ok(saved) => {
            let server = saved.clone();
            let reconciled = ctx
                .cache
                .update::<List<E>, _>(key, move |list| {
                    if list.iter().any(|s| s.has_id(server.id())) {
                        // A refetch already brought the row in
                        list.retain(|s| s.temp_id() != Some(temp_id));
                    } else if let Some(slot) =
                        list.iter_mut().find(|s| s.temp_id() == Some(temp_id))
                    {
                        *slot = Synced::Persisted(server);
                    } else {
                        list.push(Synced::Persisted(server));
                    }
                })
                .await;
            if !reconciled {
                ctx.cache
                    .set(key, vec![Synced::Persisted(saved.clone())])
                    .await;
            }
            mirrored = persist_or_warn::<E>(ctx, key).await;
            trail.push(MutationState::SettledSuccess);
            Ok(saved)
        }
        Err(e) => {
            restore(ctx, key, snapshot).await;
            warn!(error = %e, ?key, %temp_id, "create failed; rolled back");
            ctx.notices.notify(Notice::error(
                format!("Could not create {}", noun(E::TABLE)),
                e.user_message(),
            ));
            trail.push(MutationState::SettledError);
            Err(e)
        }
    };

    ctx.cache.invalidate(key).await;
    MutationOutcome {
        trail,
        result,
        mirrored,
    }
}

/// Merges `patch` into the cached record, then replaces it with the server's version.
///
/// A record missing from the cache is left missing; the remote call still runs.
pub async fn update_optimistic<E, F, Fut>(
    ctx: &SyncContext,
    key: QueryKey,
    id: &str,
    patch: &E::Patch,
    remote: F,
) -> MutationOutcome<E>
where
    E: Editable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<E, RemoteError>>,
{
    let mut trail = vec![MutationState::Idle];
    let snapshot = ctx.cache.get::<List<E>>(key).await;
    seed_from_mirror::<E>(ctx, key).await;

    let mut found = false;
    ctx.cache
        .update::<List<E>, _>(key, |list| {
            if let Some(entry) = list.iter_mut().find(|s| s.has_id(id)) {
                entry.record_mut().apply_patch(patch);
                found = true;
            }
        })
        .await;
    if !found {
        debug!(?key, id, "update target not cached; remote only");
    }
    trail.push(MutationState::OptimisticApplied);

    let mut mirrored = false;
    let result = match remote().await {
        Ok(saved) => {
            let server = saved.clone();
            ctx.cache
                .update::<List<E>, _>(key, move |list| {
                    if let Some(entry) = list.iter_mut().find(|s| s.has_id(server.id())) {
                        *entry = Synced::Persisted(server);
                    }
                })
                .await;
            mirrored = persist_or_warn::<E>(ctx, key).await;
            trail.push(MutationState::SettledSuccess);
            Ok(saved)
        }
        Err(e) => {
            restore(ctx, key, snapshot).await;
            warn!(error = %e, ?key, id, "update failed; rolled back");
            ctx.notices.notify(Notice::error(
                format!("Could not update {}", noun(E::TABLE)),
                e.user_message(),
            ));
            trail.push(MutationState::SettledError);
            Err(e)
        }
    };

    ctx.cache.invalidate(key).await;
    MutationOutcome {
        trail,
        result,
        mirrored,
    }
}

pub async fn delete_optimistic<E, F, Fut>(
    ctx: &SyncContext,
    key: QueryKey,
    id: &str,
    remote: F,
) -> MutationOutcome<()>
where
    E: Record,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), RemoteError>>,
{
    delete_optimistic_with::<E, E, F, Fut>(ctx, key, id, remote, None).await
}

/// Removes the record at once; on success also drops rows of `related` that point at it.
pub async fn delete_optimistic_with<E, H, F, Fut>(
    ctx: &SyncContext,
    key: QueryKey,
    id: &str,
    remote: F,
    related: Option<Related<H>>,
) -> MutationOutcome<()>
where
    E: Record,
    H: Record,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), RemoteError>>,
{
    let mut trail = vec![MutationState::Idle];
    let snapshot = ctx.cache.get::<List<E>>(key).await;
    let related_snapshot = match &related {
        Some(r) => ctx.cache.get::<List<H>>(r.key).await,
        None => None,
    };
    seed_from_mirror::<E>(ctx, key).await;

    ctx.cache
        .update::<List<E>, _>(key, |list| list.retain(|s| !s.has_id(id)))
        .await;
    trail.push(MutationState::OptimisticApplied);

    let mut mirrored = false;
    let result = match remote().await {
        Ok(()) => {
            mirrored = persist_or_warn::<E>(ctx, key).await;
            if let Some(r) = &related {
                mirrored &= drop_related(ctx, r, id).await;
            }
            trail.push(MutationState::SettledSuccess);
            Ok(())
        }
        Err(e) => {
            restore(ctx, key, snapshot).await;
            if let Some(r) = &related {
                restore(ctx, r.key, related_snapshot).await;
            }
            warn!(error = %e, ?key, id, "delete failed; rolled back");
            ctx.notices.notify(Notice::error(
                format!("Could not delete {}", noun(E::TABLE)),
                e.user_message(),
            ));
            trail.push(MutationState::SettledError);
            Err(e)
        }
    };

    ctx.cache.invalidate(key).await;
    if let Some(r) = &related {
        ctx.cache.invalidate(r.key).await;
    }
    MutationOutcome {
        trail,
        result,
        mirrored,
    }
}

/// Filters the related list in the cache, or straight in the mirror when it was never loaded.
async fn drop_related<H: Record>(ctx: &SyncContext, related: &Related<H>, id: &str) -> bool {
    let references = related.references;
    let cached = ctx
        .cache
        .update::<List<H>, _>(related.key, |list| {
            list.retain(|s| !references(s.record(), id))
        })
        .await;
    if cached {
        return persist_or_warn::<H>(ctx, related.key).await;
    }

    let mirror_key = related.key.mirror_key();
    let outcome = async {
        let _guard = ctx.cache.mirror_lock(related.key).await;
        if let Some(rows) = mirror::load::<H>(ctx.mirror.as_ref(), mirror_key).await? {
            let kept: Vec<H> = rows.into_iter().filter(|h| !references(h, id)).collect();
            mirror::save(ctx.mirror.as_ref(), mirror_key, &kept).await?;
        }
        Ok::<(), MirrorError>(())
    }
    .await;
    match outcome {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, key = %mirror_key, "could not trim related rows in mirror");
            ctx.notices.notify(Notice::warning(
                "Saved, but not stored locally",
                format!("Related history could not be trimmed locally: {e}"),
            ));
            false
        }
    }
}
