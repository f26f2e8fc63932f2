//! In-memory server double for hook and helper tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use questline_shared::api::{
    HistoryFilter, PointsAdjustReq, PunishmentApplyResp, RewardBuyResp, RuleViolationResp, Table,
    TaskCompletionResp,
};
use questline_shared::domain::{
    Editable, HISTORY_WEEK_START, Profile, Punishment, PunishmentHistoryItem, Reward, Rule,
    RuleViolation, Task, TaskCompletion, USAGE_WEEK_START, day_index, now_utc,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{Notify, Semaphore};

use super::Hooks;
use crate::context::SyncContext;
use crate::mirror::MemoryMirror;
use crate::notice::RecordingNotices;
use crate::query::QueryOptions;
use crate::remote::{RemoteActions, RemoteError, RemoteTable};

pub(crate) const PROFILE: &str = "household";

fn rejected(status: u16, msg: &str) -> RemoteError {
    RemoteError::Rejected {
        status,
        body: format!(r#"{{"error":"{msg}"}}"#),
    }
}

/// Rows kept as JSON per table, like the real store hands them out.
pub(crate) struct FakeRemote {
    tables: Mutex<HashMap<Table, Vec<Value>>>,
    balance: Mutex<(i32, i32)>,
    next_id: AtomicU64,
    fail: AtomicBool,
    gated: AtomicBool,
    replies_gated: AtomicBool,
    gate: Semaphore,
    pub calls: AtomicU32,
    /// Signalled when a held call reaches the server.
    pub entered: Notify,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            balance: Mutex::new((0, 0)),
            next_id: AtomicU64::new(0),
            fail: AtomicBool::new(false),
            gated: AtomicBool::new(false),
            replies_gated: AtomicBool::new(false),
            gate: Semaphore::new(0),
            calls: AtomicU32::new(0),
            entered: Notify::new(),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Holds every call after `entered` until [`FakeRemote::release`].
    pub fn hold(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    /// Like [`FakeRemote::hold`], but inserts are stored first and only the reply waits.
    pub fn hold_replies(&self) {
        self.replies_gated.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.gated.store(false, Ordering::SeqCst);
        self.replies_gated.store(false, Ordering::SeqCst);
        self.gate.add_permits(1);
    }

    pub fn set_balance(&self, points: i32, dom_points: i32) {
        *self.balance.lock().unwrap() = (points, dom_points);
    }

    pub fn balance(&self) -> (i32, i32) {
        *self.balance.lock().unwrap()
    }

    pub fn rows<T: DeserializeOwned>(&self, table: Table) -> Vec<T> {
        self.tables
            .lock()
            .unwrap()
            .get(&table)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|v| serde_json::from_value(v).unwrap())
            .collect()
    }

    fn put<T: Serialize>(&self, table: Table, rows: &[T]) {
        let values = rows
            .iter()
            .map(|r| serde_json::to_value(r).unwrap())
            .collect();
        self.tables.lock().unwrap().insert(table, values);
    }

    /// Seeds a record directly, bypassing the call counters.
    pub fn seed<E: Editable>(&self, id: &str, draft: &E::Draft) -> E {
        let record = E::from_draft(id.to_string(), draft, now_utc());
        let mut rows: Vec<E> = self.rows(E::TABLE);
        rows.push(record.clone());
        self.put(E::TABLE, &rows);
        record
    }

    pub fn seed_row<T: Serialize + DeserializeOwned>(&self, table: Table, row: T) {
        let mut rows: Vec<T> = self.rows(table);
        rows.push(row);
        self.put(table, &rows);
    }

    fn fresh_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn checkpoint(&self) -> Result<(), RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.gated.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.gate.acquire().await.unwrap().forget();
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(RemoteError::Unreachable("connection refused".into()));
        }
        Ok(())
    }

    async fn reply_gate(&self) {
        if self.replies_gated.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.gate.acquire().await.unwrap().forget();
        }
    }

    fn profile_now(&self) -> Profile {
        let (points, dom_points) = self.balance();
        Profile {
            id: PROFILE.into(),
            points,
            dom_points,
            updated_at: now_utc(),
        }
    }

    fn today(&self) -> u8 {
        day_index(now_utc().weekday(), HISTORY_WEEK_START) as u8
    }
}

#[async_trait]
impl<E: Editable> RemoteTable<E> for FakeRemote {
    async fn select_all(&self) -> Result<Vec<E>, RemoteError> {
        self.checkpoint().await?;
        Ok(self.rows(E::TABLE))
    }

    async fn insert(&self, draft: &E::Draft) -> Result<E, RemoteError> {
        self.checkpoint().await?;
        let record = E::from_draft(self.fresh_id(E::TABLE.as_str()), draft, now_utc());
        let mut rows: Vec<E> = self.rows(E::TABLE);
        rows.push(record.clone());
        self.put(E::TABLE, &rows);
        self.reply_gate().await;
        Ok(record)
    }

    async fn update(&self, id: &str, patch: &E::Patch) -> Result<E, RemoteError> {
        self.checkpoint().await?;
        let mut rows: Vec<E> = self.rows(E::TABLE);
        let row = rows
            .iter_mut()
            .find(|r| r.id() == id)
            .ok_or_else(|| rejected(404, "not found"))?;
        row.apply_patch(patch);
        let saved = row.clone();
        self.put(E::TABLE, &rows);
        Ok(saved)
    }

    async fn delete(&self, id: &str) -> Result<(), RemoteError> {
        self.checkpoint().await?;
        let mut rows: Vec<E> = self.rows(E::TABLE);
        let before = rows.len();
        rows.retain(|r| r.id() != id);
        if rows.len() == before {
            return Err(rejected(404, "not found"));
        }
        self.put(E::TABLE, &rows);
        Ok(())
    }
}

#[async_trait]
impl RemoteActions for FakeRemote {
    async fn complete_task(&self, task_id: &str) -> Result<TaskCompletionResp, RemoteError> {
        self.checkpoint().await?;
        let mut tasks: Vec<Task> = self.rows(Table::Tasks);
        let task = tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| rejected(404, "task not found"))?;
        let now = now_utc();
        task.completed = true;
        task.last_completed_date = Some(now);
        task.usage_data.increment(day_index(now.weekday(), USAGE_WEEK_START));
        let task = task.clone();
        self.put(Table::Tasks, &tasks);

        let completion = TaskCompletion {
            id: self.fresh_id("completion"),
            task_id: task_id.to_string(),
            day_of_week: self.today(),
            completed_at: now,
        };
        self.seed_row(Table::TaskCompletionHistory, completion.clone());
        let profile = {
            let mut b = self.balance.lock().unwrap();
            b.0 += task.points;
            drop(b);
            self.profile_now()
        };
        Ok(TaskCompletionResp {
            task,
            completion,
            profile,
        })
    }

    async fn violate_rule(&self, rule_id: &str) -> Result<RuleViolationResp, RemoteError> {
        self.checkpoint().await?;
        let mut rules: Vec<Rule> = self.rows(Table::Rules);
        let rule = rules
            .iter_mut()
            .find(|r| r.id == rule_id)
            .ok_or_else(|| rejected(404, "rule not found"))?;
        rule.usage_data
            .increment(day_index(now_utc().weekday(), USAGE_WEEK_START));
        let rule = rule.clone();
        self.put(Table::Rules, &rules);
        let violation = RuleViolation {
            id: self.fresh_id("violation"),
            rule_id: rule_id.to_string(),
            day_of_week: self.today(),
            violation_date: now_utc(),
        };
        self.seed_row(Table::RuleViolations, violation.clone());
        Ok(RuleViolationResp { rule, violation })
    }

    async fn buy_reward(&self, reward_id: &str) -> Result<RewardBuyResp, RemoteError> {
        self.checkpoint().await?;
        let mut rewards: Vec<Reward> = self.rows(Table::Rewards);
        let reward = rewards
            .iter_mut()
            .find(|r| r.id == reward_id)
            .ok_or_else(|| rejected(404, "reward not found"))?;
        if reward.supply <= 0 {
            return Err(rejected(409, "reward is out of supply"));
        }
        {
            let mut b = self.balance.lock().unwrap();
            let purse = if reward.is_dom_reward { &mut b.1 } else { &mut b.0 };
            if *purse < reward.cost {
                return Err(rejected(409, "not enough points"));
            }
            *purse -= reward.cost;
        }
        reward.supply -= 1;
        let reward = reward.clone();
        self.put(Table::Rewards, &rewards);
        Ok(RewardBuyResp {
            reward,
            profile: self.profile_now(),
        })
    }

    async fn apply_punishment(
        &self,
        punishment_id: &str,
    ) -> Result<PunishmentApplyResp, RemoteError> {
        self.checkpoint().await?;
        let punishments: Vec<Punishment> = self.rows(Table::Punishments);
        let punishment = punishments
            .iter()
            .find(|p| p.id == punishment_id)
            .ok_or_else(|| rejected(404, "punishment not found"))?;
        {
            let mut b = self.balance.lock().unwrap();
            b.0 -= punishment.points;
            b.1 += punishment.dom_points;
        }
        let history = PunishmentHistoryItem {
            id: self.fresh_id("history"),
            punishment_id: punishment_id.to_string(),
            points_deducted: punishment.points,
            day_of_week: self.today(),
            applied_date: now_utc(),
        };
        self.seed_row(Table::PunishmentHistory, history.clone());
        Ok(PunishmentApplyResp {
            history,
            profile: self.profile_now(),
        })
    }

    async fn profile(&self, profile_id: &str) -> Result<Profile, RemoteError> {
        self.checkpoint().await?;
        if profile_id != PROFILE {
            return Err(rejected(404, "profile not found"));
        }
        Ok(self.profile_now())
    }

    async fn adjust_points(
        &self,
        profile_id: &str,
        req: &PointsAdjustReq,
    ) -> Result<Profile, RemoteError> {
        self.checkpoint().await?;
        if profile_id != PROFILE {
            return Err(rejected(404, "profile not found"));
        }
        {
            let mut b = self.balance.lock().unwrap();
            b.0 += req.delta;
            b.1 += req.dom_delta;
        }
        Ok(self.profile_now())
    }

    async fn task_completions(
        &self,
        filter: &HistoryFilter,
    ) -> Result<Vec<TaskCompletion>, RemoteError> {
        self.checkpoint().await?;
        let rows: Vec<TaskCompletion> = self.rows(Table::TaskCompletionHistory);
        Ok(rows
            .into_iter()
            .filter(|r| filter.task_id.as_deref().is_none_or(|id| r.task_id == id))
            .collect())
    }

    async fn rule_violations(
        &self,
        filter: &HistoryFilter,
    ) -> Result<Vec<RuleViolation>, RemoteError> {
        self.checkpoint().await?;
        let rows: Vec<RuleViolation> = self.rows(Table::RuleViolations);
        Ok(rows
            .into_iter()
            .filter(|r| filter.rule_id.as_deref().is_none_or(|id| r.rule_id == id))
            .collect())
    }

    async fn punishment_history(
        &self,
        filter: &HistoryFilter,
    ) -> Result<Vec<PunishmentHistoryItem>, RemoteError> {
        self.checkpoint().await?;
        let rows: Vec<PunishmentHistoryItem> = self.rows(Table::PunishmentHistory);
        Ok(rows
            .into_iter()
            .filter(|r| {
                filter
                    .punishment_id
                    .as_deref()
                    .is_none_or(|id| r.punishment_id == id)
            })
            .collect())
    }
}

/// Everything a test needs to drive hooks and look behind them.
pub(crate) struct Harness {
    pub hooks: Hooks,
    pub ctx: SyncContext,
    pub remote: Arc<FakeRemote>,
    pub mirror: Arc<MemoryMirror>,
    pub notices: Arc<RecordingNotices>,
}

pub(crate) fn harness() -> Harness {
    let remote = Arc::new(FakeRemote::new());
    let mirror = Arc::new(MemoryMirror::new());
    let notices = Arc::new(RecordingNotices::new());
    let ctx = SyncContext::new(mirror.clone(), notices.clone()).with_options(QueryOptions {
        timeout: Duration::from_secs(2),
        retries: 0,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
        stale_after: Duration::from_secs(60),
    });
    let hooks = Hooks::new(ctx.clone(), remote.clone(), PROFILE);
    Harness {
        hooks,
        ctx,
        remote,
        mirror,
        notices,
    }
}
