use std::sync::Arc;

use questline_shared::api::{HistoryFilter, TaskCompletionResp};
use questline_shared::domain::{Task, TaskCompletion, TaskDraft, TaskPatch};
use tracing::info;

use super::{Collection, Placement, action_failed, merge_row, store_profile};
use crate::cache::QueryKey;
use crate::notice::Notice;
use crate::optimistic::{MutationOutcome, Related};
use crate::query::{Listed, QueryError, list_query};
use crate::remote::{RemoteActions, RemoteError};

fn completion_of(row: &TaskCompletion, task_id: &str) -> bool {
    row.task_id == task_id
}

pub struct TasksHook {
    items: Collection<Task>,
    actions: Arc<dyn RemoteActions>,
}

impl TasksHook {
    pub(super) fn new(items: Collection<Task>, actions: Arc<dyn RemoteActions>) -> Self {
        Self { items, actions }
    }

    pub async fn list(&self) -> Result<Listed<Task>, QueryError> {
        self.items.list().await
    }

    pub async fn get_or_default(&self, id: &str) -> Task {
        self.items.get_or_default(id).await
    }

    pub async fn create(&self, draft: TaskDraft) -> MutationOutcome<Task> {
        self.items.create(draft).await
    }

    pub async fn update(&self, id: &str, patch: TaskPatch) -> MutationOutcome<Task> {
        self.items.update(id, patch).await
    }

    /// Completion rows of the task go with it.
    pub async fn delete(&self, id: &str) -> MutationOutcome<()> {
        self.items
            .delete_with(
                id,
                Some(Related {
                    key: QueryKey::TaskCompletions,
                    references: completion_of,
                }),
            )
            .await
    }

    /// Records a completion on the server and folds the result into the
    /// task, completion and profile lists.
    pub async fn complete(&self, id: &str) -> Result<TaskCompletionResp, RemoteError> {
        let ctx = self.items.context();
        let resp = match self.actions.complete_task(id).await {
            Ok(resp) => resp,
            Err(e) => {
                action_failed(ctx, "Could not complete task", &e);
                return Err(e);
            }
        };
        info!(task_id = %id, points = resp.task.points, balance = resp.profile.points, "task completed");

        merge_row(ctx, QueryKey::Tasks, resp.task.clone(), Placement::InPlace).await;
        merge_row(
            ctx,
            QueryKey::TaskCompletions,
            resp.completion.clone(),
            Placement::Front,
        )
        .await;
        store_profile(ctx, resp.profile.clone()).await;
        ctx.notices.notify(Notice::success(
            "Task completed",
            format!("+{} points for {}", resp.task.points, resp.task.title),
        ));
        Ok(resp)
    }

    pub async fn completions(&self) -> Result<Listed<TaskCompletion>, QueryError> {
        let filter = HistoryFilter::default();
        list_query::<TaskCompletion, _, _>(self.items.context(), QueryKey::TaskCompletions, || {
            self.actions.task_completions(&filter)
        })
        .await
    }
}
