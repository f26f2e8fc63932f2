use std::sync::Arc;

use questline_shared::api::{HistoryFilter, PunishmentApplyResp};
use questline_shared::domain::{Punishment, PunishmentDraft, PunishmentHistoryItem, PunishmentPatch};
use tracing::info;

use super::{Collection, Placement, action_failed, merge_row, store_profile};
use crate::cache::QueryKey;
use crate::notice::Notice;
use crate::optimistic::{MutationOutcome, Related};
use crate::query::{Listed, QueryError, list_query};
use crate::remote::{RemoteActions, RemoteError};

fn history_of(row: &PunishmentHistoryItem, punishment_id: &str) -> bool {
    row.punishment_id == punishment_id
}

pub struct PunishmentsHook {
    items: Collection<Punishment>,
    actions: Arc<dyn RemoteActions>,
}

impl PunishmentsHook {
    pub(super) fn new(items: Collection<Punishment>, actions: Arc<dyn RemoteActions>) -> Self {
        Self { items, actions }
    }

    pub async fn list(&self) -> Result<Listed<Punishment>, QueryError> {
        self.items.list().await
    }

    pub async fn get_or_default(&self, id: &str) -> Punishment {
        self.items.get_or_default(id).await
    }

    pub async fn create(&self, draft: PunishmentDraft) -> MutationOutcome<Punishment> {
        self.items.create(draft).await
    }

    pub async fn update(&self, id: &str, patch: PunishmentPatch) -> MutationOutcome<Punishment> {
        self.items.update(id, patch).await
    }

    /// History rows of the punishment are removed from cache and mirror too.
    pub async fn delete(&self, id: &str) -> MutationOutcome<()> {
        self.items
            .delete_with(
                id,
                Some(Related {
                    key: QueryKey::PunishmentHistory,
                    references: history_of,
                }),
            )
            .await
    }

    pub async fn apply(&self, id: &str) -> Result<PunishmentApplyResp, RemoteError> {
        let ctx = self.items.context();
        let resp = match self.actions.apply_punishment(id).await {
            Ok(resp) => resp,
            Err(e) => {
                action_failed(ctx, "Could not apply punishment", &e);
                return Err(e);
            }
        };
        info!(
            punishment_id = %id,
            deducted = resp.history.points_deducted,
            balance = resp.profile.points,
            "punishment applied"
        );

        merge_row(
            ctx,
            QueryKey::PunishmentHistory,
            resp.history.clone(),
            Placement::Front,
        )
        .await;
        store_profile(ctx, resp.profile.clone()).await;
        ctx.notices.notify(Notice::success(
            "Punishment applied",
            format!("-{} points", resp.history.points_deducted),
        ));
        Ok(resp)
    }

    pub async fn history(&self) -> Result<Listed<PunishmentHistoryItem>, QueryError> {
        let filter = HistoryFilter::default();
        list_query::<PunishmentHistoryItem, _, _>(
            self.items.context(),
            QueryKey::PunishmentHistory,
            || self.actions.punishment_history(&filter),
        )
        .await
    }
}
