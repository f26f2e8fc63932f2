use std::sync::Arc;

use questline_shared::api::PointsAdjustReq;
use questline_shared::domain::{Profile, now_utc};
use tracing::info;

use super::{action_failed, store_profile};
use crate::cache::QueryKey;
use crate::context::SyncContext;
use crate::query::{QueryError, list_query};
use crate::record::Synced;
use crate::remote::{RemoteActions, RemoteError};

/// Point balances of the household profile.
pub struct ProfileHook {
    ctx: SyncContext,
    actions: Arc<dyn RemoteActions>,
    profile_id: String,
}

impl ProfileHook {
    pub(super) fn new(ctx: SyncContext, actions: Arc<dyn RemoteActions>, profile_id: String) -> Self {
        Self {
            ctx,
            actions,
            profile_id,
        }
    }

    pub fn id(&self) -> &str {
        &self.profile_id
    }

    /// Cached like any list; a profile the server does not return reads as zero balances.
    pub async fn get(&self) -> Result<Profile, QueryError> {
        let actions = &self.actions;
        let id = self.profile_id.as_str();
        let listed = list_query::<Profile, _, _>(&self.ctx, QueryKey::Profile, move || async move {
            actions.profile(id).await.map(|p| vec![p])
        })
        .await?;
        Ok(listed
            .items
            .into_iter()
            .find(|s| s.has_id(id))
            .map(Synced::into_record)
            .unwrap_or_else(|| Profile {
                id: id.to_string(),
                points: 0,
                dom_points: 0,
                updated_at: now_utc(),
            }))
    }

    /// Adds the deltas on the server in one statement; negative values deduct.
    pub async fn adjust(&self, delta: i32, dom_delta: i32) -> Result<Profile, RemoteError> {
        let req = PointsAdjustReq { delta, dom_delta };
        match self.actions.adjust_points(&self.profile_id, &req).await {
            Ok(profile) => {
                info!(
                    profile_id = %self.profile_id,
                    delta,
                    dom_delta,
                    points = profile.points,
                    dom_points = profile.dom_points,
                    "points adjusted"
                );
                store_profile(&self.ctx, profile.clone()).await;
                Ok(profile)
            }
            Err(e) => {
                action_failed(&self.ctx, "Could not adjust points", &e);
                Err(e)
            }
        }
    }
}
