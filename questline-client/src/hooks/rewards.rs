use std::sync::Arc;

use questline_shared::api::RewardBuyResp;
use questline_shared::domain::{Reward, RewardDraft, RewardPatch};
use tracing::info;

use super::{Collection, Placement, action_failed, merge_row, store_profile};
use crate::cache::QueryKey;
use crate::notice::Notice;
use crate::optimistic::MutationOutcome;
use crate::query::{Listed, QueryError};
use crate::remote::{RemoteActions, RemoteError};

pub struct RewardsHook {
    items: Collection<Reward>,
    actions: Arc<dyn RemoteActions>,
}

impl RewardsHook {
    pub(super) fn new(items: Collection<Reward>, actions: Arc<dyn RemoteActions>) -> Self {
        Self { items, actions }
    }

    pub async fn list(&self) -> Result<Listed<Reward>, QueryError> {
        self.items.list().await
    }

    pub async fn get_or_default(&self, id: &str) -> Reward {
        self.items.get_or_default(id).await
    }

    pub async fn create(&self, draft: RewardDraft) -> MutationOutcome<Reward> {
        self.items.create(draft).await
    }

    pub async fn update(&self, id: &str, patch: RewardPatch) -> MutationOutcome<Reward> {
        self.items.update(id, patch).await
    }

    pub async fn delete(&self, id: &str) -> MutationOutcome<()> {
        self.items.delete(id).await
    }

    /// Spends the cost (dom points for dom rewards) and takes one from supply.
    /// The server refuses when supply or balance is short.
    pub async fn buy(&self, id: &str) -> Result<RewardBuyResp, RemoteError> {
        let ctx = self.items.context();
        let resp = match self.actions.buy_reward(id).await {
            Ok(resp) => resp,
            Err(e) => {
                action_failed(ctx, "Could not buy reward", &e);
                return Err(e);
            }
        };
        info!(
            reward_id = %id,
            supply = resp.reward.supply,
            dom = resp.reward.is_dom_reward,
            "reward bought"
        );

        merge_row(ctx, QueryKey::Rewards, resp.reward.clone(), Placement::InPlace).await;
        store_profile(ctx, resp.profile.clone()).await;
        ctx.notices.notify(Notice::success(
            "Reward purchased",
            format!("{} for {} points", resp.reward.title, resp.reward.cost),
        ));
        Ok(resp)
    }
}
