use std::sync::Arc;

use questline_shared::api::{HistoryFilter, RuleViolationResp};
use questline_shared::domain::{
    Rule, RuleDraft, RulePatch, RuleViolation, UsageData, usage_from_history,
};
use tracing::info;

use super::{Collection, Placement, action_failed, merge_row};
use crate::cache::QueryKey;
use crate::notice::Notice;
use crate::optimistic::{MutationOutcome, Related};
use crate::query::{Listed, QueryError, list_query};
use crate::remote::{RemoteActions, RemoteError};

fn violation_of(row: &RuleViolation, rule_id: &str) -> bool {
    row.rule_id == rule_id
}

pub struct RulesHook {
    items: Collection<Rule>,
    actions: Arc<dyn RemoteActions>,
}

impl RulesHook {
    pub(super) fn new(items: Collection<Rule>, actions: Arc<dyn RemoteActions>) -> Self {
        Self { items, actions }
    }

    pub async fn list(&self) -> Result<Listed<Rule>, QueryError> {
        self.items.list().await
    }

    pub async fn get_or_default(&self, id: &str) -> Rule {
        self.items.get_or_default(id).await
    }

    pub async fn create(&self, draft: RuleDraft) -> MutationOutcome<Rule> {
        self.items.create(draft).await
    }

    pub async fn update(&self, id: &str, patch: RulePatch) -> MutationOutcome<Rule> {
        self.items.update(id, patch).await
    }

    pub async fn delete(&self, id: &str) -> MutationOutcome<()> {
        self.items
            .delete_with(
                id,
                Some(Related {
                    key: QueryKey::RuleViolations,
                    references: violation_of,
                }),
            )
            .await
    }

    pub async fn violate(&self, id: &str) -> Result<RuleViolationResp, RemoteError> {
        let ctx = self.items.context();
        let resp = match self.actions.violate_rule(id).await {
            Ok(resp) => resp,
            Err(e) => {
                action_failed(ctx, "Could not record violation", &e);
                return Err(e);
            }
        };
        info!(rule_id = %id, day = resp.violation.day_of_week, "rule violation recorded");

        merge_row(ctx, QueryKey::Rules, resp.rule.clone(), Placement::InPlace).await;
        merge_row(
            ctx,
            QueryKey::RuleViolations,
            resp.violation.clone(),
            Placement::Front,
        )
        .await;
        ctx.notices.notify(Notice::success(
            "Violation recorded",
            resp.rule.title.clone(),
        ));
        Ok(resp)
    }

    pub async fn violations(&self) -> Result<Listed<RuleViolation>, QueryError> {
        let filter = HistoryFilter::default();
        list_query::<RuleViolation, _, _>(self.items.context(), QueryKey::RuleViolations, || {
            self.actions.rule_violations(&filter)
        })
        .await
    }

    /// Violations of one rule counted per weekday, from the history list.
    pub async fn violation_tally(&self, rule_id: &str) -> Result<UsageData, QueryError> {
        let listed = self.violations().await?;
        Ok(usage_from_history(
            listed
                .items
                .iter()
                .map(|s| s.record())
                .filter(|v| v.rule_id == rule_id)
                .map(|v| v.day_of_week),
        ))
    }
}
