//! Per-entity data hooks.
//!
//! Each hook pairs a [`Collection`] (list plus optimistic CRUD) with the
//! domain actions of its entity. Side effects that span lists, such as a
//! completion touching tasks, history and the profile, live here and never
//! in the generic helpers.

use std::sync::Arc;

use questline_shared::domain::{Editable, Profile, Punishment, Record, Reward, Rule, Task, now_utc};
use tracing::debug;

use crate::cache::QueryKey;
use crate::context::SyncContext;
use crate::notice::Notice;
use crate::optimistic::{
    List, MutationOutcome, Related, create_optimistic, delete_optimistic_with, persist_or_warn,
    seed_from_mirror, update_optimistic,
};
use crate::query::{Listed, QueryError, get_or_default, list_query};
use crate::record::Synced;
use crate::remote::{Backend, RemoteActions, RemoteError, RemoteTable};

mod profile;
mod punishments;
mod rewards;
mod rules;
mod tasks;

pub use profile::ProfileHook;
pub use punishments::PunishmentsHook;
pub use rewards::RewardsHook;
pub use rules::RulesHook;
pub use tasks::TasksHook;

/// All hooks over one context and one server.
pub struct Hooks {
    pub tasks: TasksHook,
    pub rules: RulesHook,
    pub rewards: RewardsHook,
    pub punishments: PunishmentsHook,
    pub profile: ProfileHook,
}

impl Hooks {
    pub fn new<R: Backend + 'static>(
        ctx: SyncContext,
        remote: Arc<R>,
        profile_id: impl Into<String>,
    ) -> Self {
        let actions: Arc<dyn RemoteActions> = remote.clone();
        let tasks: Arc<dyn RemoteTable<Task>> = remote.clone();
        let rules: Arc<dyn RemoteTable<Rule>> = remote.clone();
        let rewards: Arc<dyn RemoteTable<Reward>> = remote.clone();
        let punishments: Arc<dyn RemoteTable<Punishment>> = remote;
        Self {
            tasks: TasksHook::new(
                Collection::new(ctx.clone(), QueryKey::Tasks, tasks),
                actions.clone(),
            ),
            rules: RulesHook::new(
                Collection::new(ctx.clone(), QueryKey::Rules, rules),
                actions.clone(),
            ),
            rewards: RewardsHook::new(
                Collection::new(ctx.clone(), QueryKey::Rewards, rewards),
                actions.clone(),
            ),
            punishments: PunishmentsHook::new(
                Collection::new(ctx.clone(), QueryKey::Punishments, punishments),
                actions.clone(),
            ),
            profile: ProfileHook::new(ctx, actions, profile_id.into()),
        }
    }
}

/// A cached list of one editable entity with optimistic CRUD.
pub struct Collection<E: Editable> {
    ctx: SyncContext,
    key: QueryKey,
    remote: Arc<dyn RemoteTable<E>>,
}

impl<E: Editable> Collection<E> {
    pub fn new(ctx: SyncContext, key: QueryKey, remote: Arc<dyn RemoteTable<E>>) -> Self {
        Self { ctx, key, remote }
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    pub fn key(&self) -> QueryKey {
        self.key
    }

    pub async fn list(&self) -> Result<Listed<E>, QueryError> {
        list_query::<E, _, _>(&self.ctx, self.key, || self.remote.select_all()).await
    }

    pub async fn create(&self, draft: E::Draft) -> MutationOutcome<E> {
        create_optimistic::<E, _, _, _>(
            &self.ctx,
            self.key,
            &draft,
            |temp, d| E::from_draft(temp.to_string(), d, now_utc()),
            || self.remote.insert(&draft),
        )
        .await
    }

    pub async fn update(&self, id: &str, patch: E::Patch) -> MutationOutcome<E> {
        update_optimistic::<E, _, _>(&self.ctx, self.key, id, &patch, || {
            self.remote.update(id, &patch)
        })
        .await
    }

    pub async fn delete(&self, id: &str) -> MutationOutcome<()> {
        self.delete_with::<E>(id, None).await
    }

    /// Deletes and, on success, drops the `related` rows pointing at `id`.
    pub async fn delete_with<H: Record>(
        &self,
        id: &str,
        related: Option<Related<H>>,
    ) -> MutationOutcome<()> {
        delete_optimistic_with::<E, H, _, _>(
            &self.ctx,
            self.key,
            id,
            || self.remote.delete(id),
            related,
        )
        .await
    }
}

impl<E> Collection<E>
where
    E: Editable,
    E::Draft: Default,
{
    pub async fn get_or_default(&self, id: &str) -> E {
        get_or_default::<E, _, _>(&self.ctx, self.key, id, || self.remote.select_all()).await
    }
}

#[derive(Debug, Copy, Clone)]
enum Placement {
    /// Newest first, as history lists are ordered.
    Front,
    /// Replace the row with the same id; append when absent.
    InPlace,
}

/// Folds a server row returned by a domain action into a cached list.
///
/// A list that is neither cached nor mirrored is left alone; the next
/// fetch brings the row in.
async fn merge_row<T: Record>(ctx: &SyncContext, key: QueryKey, row: T, placement: Placement) {
    seed_from_mirror::<T>(ctx, key).await;
    let merged = ctx
        .cache
        .update::<List<T>, _>(key, |list| match placement {
            Placement::Front => list.insert(0, Synced::Persisted(row)),
            Placement::InPlace => {
                if let Some(slot) = list.iter_mut().find(|s| s.has_id(row.id())) {
                    *slot = Synced::Persisted(row);
                } else {
                    list.push(Synced::Persisted(row));
                }
            }
        })
        .await;
    if merged {
        persist_or_warn::<T>(ctx, key).await;
    } else {
        debug!(?key, "list not loaded; row left for the next fetch");
    }
    ctx.cache.invalidate(key).await;
}

/// Replaces the cached profile with the server's balance.
async fn store_profile(ctx: &SyncContext, profile: Profile) {
    let single: List<Profile> = vec![Synced::Persisted(profile)];
    ctx.cache.set(QueryKey::Profile, single).await;
    persist_or_warn::<Profile>(ctx, QueryKey::Profile).await;
    ctx.cache.invalidate(QueryKey::Profile).await;
}

fn action_failed(ctx: &SyncContext, title: &str, err: &RemoteError) {
    ctx.notices.notify(Notice::error(title, err.user_message()));
}

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
mod tests;
