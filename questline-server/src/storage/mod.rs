pub mod models;
pub mod schema;

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use models::{
    ProfileRow, PunishmentHistoryRow, PunishmentRow, RewardRow, RuleRow, RuleViolationRow,
    TaskCompletionRow, TaskRow, to_naive,
};
use questline_shared::domain::{
    Editable, Frequency, HISTORY_WEEK_START, Profile, Punishment, PunishmentDraft,
    PunishmentHistoryItem, PunishmentPatch, Reward, RewardDraft, RewardPatch, Rule, RuleDraft,
    RulePatch, RuleViolation, Task, TaskCompletion, TaskDraft, TaskPatch, USAGE_WEEK_START,
    convert_day_index, now_utc,
};
use tracing::{debug, trace};

/// Structured error type for all storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A Diesel ORM error (query failure, constraint violation, etc.)
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// Failed to acquire or build a connection from the pool.
    #[error("pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    /// A `spawn_blocking` task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A database migration failed to apply.
    #[error("migration error: {0}")]
    Migration(String),

    /// The caller supplied invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The addressed row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The action is not allowed in the current state (no supply, not enough points).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A stored column could not be decoded.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

#[derive(Clone)]
pub struct Store {
    pool: Pool<ConnectionManager<SqliteConnection>>,
    tz: Tz,
}

/// Local calendar position of an action.
struct DayStamp {
    at: NaiveDateTime,
    history_day: usize,
    usage_slot: usize,
}

impl Store {
    pub async fn connect_sqlite(path: &str) -> Result<Self, StorageError> {
        let url = path.to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(url);
        let pool = Pool::builder().max_size(8).build(manager)?;

        // Run pending Diesel migrations on startup (auto-init empty DBs)
        {
            let pool_clone = pool.clone();
            tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
                const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
                let mut conn = pool_clone.get()?;
                configure_sqlite_conn(&mut conn)?;
                conn.run_pending_migrations(MIGRATIONS)
                    .map_err(|e| StorageError::Migration(e.to_string()))?;
                Ok(())
            })
            .await??;
        }

        Ok(Store { pool, tz: Tz::UTC })
    }

    /// Sets the household timezone used for weekdays and "today".
    pub fn with_timezone(mut self, tz: Tz) -> Self {
        self.tz = tz;
        self
    }

    async fn run<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T, StorageError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<T, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            f(&mut conn)
        })
        .await?
    }

    fn stamp(&self, now: DateTime<Utc>) -> DayStamp {
        let local = now.with_timezone(&self.tz);
        let history_day = local.weekday().num_days_from_sunday() as usize;
        DayStamp {
            at: now.naive_utc(),
            history_day,
            usage_slot: convert_day_index(history_day, HISTORY_WEEK_START, USAGE_WEEK_START),
        }
    }

    /// UTC start of the current daily or weekly period in the household timezone.
    fn period_start(&self, frequency: Frequency, now: DateTime<Utc>) -> NaiveDateTime {
        let local = now.with_timezone(&self.tz);
        let mut day = local.date_naive();
        if frequency == Frequency::Weekly {
            day -= Duration::days(i64::from(local.weekday().num_days_from_monday()));
        }
        let midnight = day.and_time(chrono::NaiveTime::MIN);
        self.tz
            .from_local_datetime(&midnight)
            .earliest()
            .map(|d| d.with_timezone(&Utc).naive_utc())
            .unwrap_or(midnight)
    }

    /// `completed` only holds while the last completion is in the current period.
    fn refresh_completed(&self, mut task: Task, now: DateTime<Utc>) -> Task {
        if task.completed {
            let start = self.period_start(task.frequency, now);
            let still_current = task
                .last_completed_date
                .map(|d| to_naive(d) >= start)
                .unwrap_or(false);
            task.completed = still_current;
        }
        task
    }

    pub async fn ensure_profile(
        &self,
        profile_id: &str,
        starting_points: i32,
    ) -> Result<(), StorageError> {
        use schema::profiles;
        let row = ProfileRow {
            id: profile_id.to_string(),
            points: starting_points,
            dom_points: 0,
            updated_at: Utc::now().naive_utc(),
        };
        self.run(move |conn| {
            diesel::insert_into(profiles::table)
                .values(&row)
                .on_conflict_do_nothing()
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    // Tasks

    pub async fn list_tasks(&self) -> Result<Vec<Task>, StorageError> {
        use schema::tasks::dsl::*;
        let rows = self
            .run(|conn| {
                Ok(tasks
                    .order(created_at.asc())
                    .select(TaskRow::as_select())
                    .load(conn)?)
            })
            .await?;
        let now = Utc::now();
        rows.into_iter()
            .map(|r| r.into_domain().map(|t| self.refresh_completed(t, now)))
            .collect()
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Option<Task>, StorageError> {
        let tid = task_id.to_string();
        let row = self.run(move |conn| load_task(conn, &tid)).await?;
        let now = Utc::now();
        row.map(|r| r.into_domain().map(|t| self.refresh_completed(t, now)))
            .transpose()
    }

    pub async fn insert_task(&self, draft: TaskDraft) -> Result<Task, StorageError> {
        use schema::tasks;
        let task = Task::from_draft(new_id(), &draft, now_utc());
        check_task(&task)?;
        let row = TaskRow::from_domain(&task)?;
        trace!(id = %row.id, title = %row.title, "insert_task");
        let saved = self
            .run(move |conn| {
                Ok(diesel::insert_into(tasks::table)
                    .values(&row)
                    .returning(TaskRow::as_returning())
                    .get_result(conn)?)
            })
            .await?;
        saved.into_domain()
    }

    pub async fn update_task(&self, task_id: &str, patch: TaskPatch) -> Result<Task, StorageError> {
        use schema::tasks;
        let tid = task_id.to_string();
        let store = self.clone();
        let saved = self
            .run(move |conn| {
                conn.immediate_transaction(|conn| -> Result<TaskRow, StorageError> {
                    let row = load_task(conn, &tid)?
                        .ok_or_else(|| StorageError::NotFound(format!("task {tid}")))?;
                    let mut task = row.into_domain()?;
                    task.apply_patch(&patch);
                    check_task(&task)?;
                    if patch.completed.is_none() {
                        // Raising the target reopens a task done fewer times this period
                        let start = store.period_start(task.frequency, Utc::now());
                        let done = count_task_completions_since(conn, &tid, start)?;
                        task.completed = done >= i64::from(task.frequency_count);
                    }
                    task.updated_at = now_utc();
                    let row = TaskRow::from_domain(&task)?;
                    Ok(diesel::update(tasks::table.find(&tid))
                        .set(&row)
                        .returning(TaskRow::as_returning())
                        .get_result(conn)?)
                })
            })
            .await?;
        saved.into_domain()
    }

    /// Hard delete; the task's completion history goes with it.
    pub async fn delete_task(&self, task_id: &str) -> Result<bool, StorageError> {
        use schema::{task_completion_history as tch, tasks};
        let tid = task_id.to_string();
        self.run(move |conn| {
            conn.immediate_transaction(|conn| -> Result<bool, StorageError> {
                diesel::delete(tch::table.filter(tch::task_id.eq(&tid))).execute(conn)?;
                let n = diesel::delete(tasks::table.find(&tid)).execute(conn)?;
                Ok(n > 0)
            })
        })
        .await
    }

    pub async fn list_task_completions(
        &self,
        task_filter: Option<String>,
    ) -> Result<Vec<TaskCompletion>, StorageError> {
        use schema::task_completion_history::dsl as tch;
        let rows = self
            .run(move |conn| {
                let mut q = tch::task_completion_history
                    .select(TaskCompletionRow::as_select())
                    .into_boxed();
                if let Some(t) = task_filter {
                    q = q.filter(tch::task_id.eq(t));
                }
                Ok(q.order(tch::completed_at.desc()).load(conn)?)
            })
            .await?;
        Ok(rows.into_iter().map(TaskCompletion::from).collect())
    }

    /// Records a completion, bumps usage and credits the profile in one transaction.
    pub async fn complete_task(
        &self,
        task_id: &str,
        profile_id: &str,
    ) -> Result<(Task, TaskCompletion, Profile), StorageError> {
        use schema::{task_completion_history as tch, tasks};
        let tid = task_id.to_string();
        let pid = profile_id.to_string();
        let now = Utc::now();
        let stamp = self.stamp(now);
        let store = self.clone();
        self.run(move |conn| {
            conn.immediate_transaction(|conn| -> Result<(Task, TaskCompletion, Profile), StorageError> {
                let row = load_task(conn, &tid)?
                    .ok_or_else(|| StorageError::NotFound(format!("task {tid}")))?;
                let mut task = row.into_domain()?;
                let done = count_task_completions_since(
                    conn,
                    &tid,
                    store.period_start(task.frequency, now),
                )?;
                if done >= i64::from(task.frequency_count) {
                    return Err(StorageError::Conflict(format!(
                        "task {tid} already completed {done} time(s) this period"
                    )));
                }
                let completion = TaskCompletionRow {
                    id: new_id(),
                    task_id: tid.clone(),
                    day_of_week: stamp.history_day as i32,
                    completed_at: stamp.at,
                };
                diesel::insert_into(tch::table)
                    .values(&completion)
                    .execute(conn)?;

                task.usage_data.increment(stamp.usage_slot);
                task.last_completed_date = Some(models::to_offset(stamp.at));
                task.completed = done + 1 >= i64::from(task.frequency_count);
                task.updated_at = now_utc();
                let row = TaskRow::from_domain(&task)?;
                let saved = diesel::update(tasks::table.find(&tid))
                    .set(&row)
                    .returning(TaskRow::as_returning())
                    .get_result(conn)?;

                let profile = adjust_profile(conn, &pid, task.points, 0, stamp.at)?;
                debug!(task_id = %tid, points = task.points, balance = profile.points, "task completed");
                Ok((saved.into_domain()?, completion.into(), profile.into()))
            })
        })
        .await
    }

    // Rules

    pub async fn list_rules(&self) -> Result<Vec<Rule>, StorageError> {
        use schema::rules::dsl::*;
        let rows = self
            .run(|conn| {
                Ok(rules
                    .order(created_at.asc())
                    .select(RuleRow::as_select())
                    .load(conn)?)
            })
            .await?;
        rows.into_iter().map(RuleRow::into_domain).collect()
    }

    pub async fn get_rule(&self, rule_id: &str) -> Result<Option<Rule>, StorageError> {
        let rid = rule_id.to_string();
        let row = self.run(move |conn| load_rule(conn, &rid)).await?;
        row.map(RuleRow::into_domain).transpose()
    }

    pub async fn insert_rule(&self, draft: RuleDraft) -> Result<Rule, StorageError> {
        use schema::rules;
        let rule = Rule::from_draft(new_id(), &draft, now_utc());
        check_rule(&rule)?;
        let row = RuleRow::from_domain(&rule)?;
        let saved = self
            .run(move |conn| {
                Ok(diesel::insert_into(rules::table)
                    .values(&row)
                    .returning(RuleRow::as_returning())
                    .get_result(conn)?)
            })
            .await?;
        saved.into_domain()
    }

    pub async fn update_rule(&self, rule_id: &str, patch: RulePatch) -> Result<Rule, StorageError> {
        use schema::rules;
        let rid = rule_id.to_string();
        let saved = self
            .run(move |conn| {
                conn.immediate_transaction(|conn| -> Result<RuleRow, StorageError> {
                    let row = load_rule(conn, &rid)?
                        .ok_or_else(|| StorageError::NotFound(format!("rule {rid}")))?;
                    let mut rule = row.into_domain()?;
                    rule.apply_patch(&patch);
                    check_rule(&rule)?;
                    rule.updated_at = now_utc();
                    let row = RuleRow::from_domain(&rule)?;
                    Ok(diesel::update(rules::table.find(&rid))
                        .set(&row)
                        .returning(RuleRow::as_returning())
                        .get_result(conn)?)
                })
            })
            .await?;
        saved.into_domain()
    }

    /// Hard delete; violations of the rule go with it.
    pub async fn delete_rule(&self, rule_id: &str) -> Result<bool, StorageError> {
        use schema::{rule_violations as rv, rules};
        let rid = rule_id.to_string();
        self.run(move |conn| {
            conn.immediate_transaction(|conn| -> Result<bool, StorageError> {
                diesel::delete(rv::table.filter(rv::rule_id.eq(&rid))).execute(conn)?;
                let n = diesel::delete(rules::table.find(&rid)).execute(conn)?;
                Ok(n > 0)
            })
        })
        .await
    }

    pub async fn list_rule_violations(
        &self,
        rule_filter: Option<String>,
    ) -> Result<Vec<RuleViolation>, StorageError> {
        use schema::rule_violations::dsl as rv;
        let rows = self
            .run(move |conn| {
                let mut q = rv::rule_violations
                    .select(RuleViolationRow::as_select())
                    .into_boxed();
                if let Some(r) = rule_filter {
                    q = q.filter(rv::rule_id.eq(r));
                }
                Ok(q.order(rv::violation_date.desc()).load(conn)?)
            })
            .await?;
        Ok(rows.into_iter().map(RuleViolation::from).collect())
    }

    pub async fn violate_rule(&self, rule_id: &str) -> Result<(Rule, RuleViolation), StorageError> {
        use schema::{rule_violations as rv, rules};
        let rid = rule_id.to_string();
        let stamp = self.stamp(Utc::now());
        self.run(move |conn| {
            conn.immediate_transaction(|conn| -> Result<(Rule, RuleViolation), StorageError> {
                let row = load_rule(conn, &rid)?
                    .ok_or_else(|| StorageError::NotFound(format!("rule {rid}")))?;
                let mut rule = row.into_domain()?;
                let violation = RuleViolationRow {
                    id: new_id(),
                    rule_id: rid.clone(),
                    day_of_week: stamp.history_day as i32,
                    violation_date: stamp.at,
                };
                diesel::insert_into(rv::table)
                    .values(&violation)
                    .execute(conn)?;
                rule.usage_data.increment(stamp.usage_slot);
                rule.updated_at = now_utc();
                let row = RuleRow::from_domain(&rule)?;
                let saved = diesel::update(rules::table.find(&rid))
                    .set(&row)
                    .returning(RuleRow::as_returning())
                    .get_result(conn)?;
                Ok((saved.into_domain()?, violation.into()))
            })
        })
        .await
    }

    // Rewards

    pub async fn list_rewards(&self) -> Result<Vec<Reward>, StorageError> {
        use schema::rewards::dsl::*;
        let rows = self
            .run(|conn| {
                Ok(rewards
                    .order(created_at.asc())
                    .select(RewardRow::as_select())
                    .load(conn)?)
            })
            .await?;
        rows.into_iter().map(RewardRow::into_domain).collect()
    }

    pub async fn get_reward(&self, reward_id: &str) -> Result<Option<Reward>, StorageError> {
        let rid = reward_id.to_string();
        let row = self.run(move |conn| load_reward(conn, &rid)).await?;
        row.map(RewardRow::into_domain).transpose()
    }

    pub async fn insert_reward(&self, draft: RewardDraft) -> Result<Reward, StorageError> {
        use schema::rewards;
        let reward = Reward::from_draft(new_id(), &draft, now_utc());
        check_reward(&reward)?;
        let row = RewardRow::from_domain(&reward)?;
        let saved = self
            .run(move |conn| {
                Ok(diesel::insert_into(rewards::table)
                    .values(&row)
                    .returning(RewardRow::as_returning())
                    .get_result(conn)?)
            })
            .await?;
        saved.into_domain()
    }

    pub async fn update_reward(
        &self,
        reward_id: &str,
        patch: RewardPatch,
    ) -> Result<Reward, StorageError> {
        use schema::rewards;
        let rid = reward_id.to_string();
        let saved = self
            .run(move |conn| {
                conn.immediate_transaction(|conn| -> Result<RewardRow, StorageError> {
                    let row = load_reward(conn, &rid)?
                        .ok_or_else(|| StorageError::NotFound(format!("reward {rid}")))?;
                    let mut reward = row.into_domain()?;
                    reward.apply_patch(&patch);
                    check_reward(&reward)?;
                    reward.updated_at = now_utc();
                    let row = RewardRow::from_domain(&reward)?;
                    Ok(diesel::update(rewards::table.find(&rid))
                        .set(&row)
                        .returning(RewardRow::as_returning())
                        .get_result(conn)?)
                })
            })
            .await?;
        saved.into_domain()
    }

    pub async fn delete_reward(&self, reward_id: &str) -> Result<bool, StorageError> {
        use schema::rewards;
        let rid = reward_id.to_string();
        self.run(move |conn| {
            let n = diesel::delete(rewards::table.find(&rid)).execute(conn)?;
            Ok(n > 0)
        })
        .await
    }

    /// Spends points (dom points for dom rewards) and takes one unit of supply.
    pub async fn buy_reward(
        &self,
        reward_id: &str,
        profile_id: &str,
    ) -> Result<(Reward, Profile), StorageError> {
        use schema::rewards;
        let rid = reward_id.to_string();
        let pid = profile_id.to_string();
        self.run(move |conn| {
            conn.immediate_transaction(|conn| -> Result<(Reward, Profile), StorageError> {
                let row = load_reward(conn, &rid)?
                    .ok_or_else(|| StorageError::NotFound(format!("reward {rid}")))?;
                let mut reward = row.into_domain()?;
                if reward.supply <= 0 {
                    return Err(StorageError::Conflict(format!("reward {rid} is out of supply")));
                }
                let profile = load_profile(conn, &pid)?
                    .ok_or_else(|| StorageError::NotFound(format!("profile {pid}")))?;
                let balance = if reward.is_dom_reward {
                    profile.dom_points
                } else {
                    profile.points
                };
                if balance < reward.cost {
                    return Err(StorageError::Conflict(format!(
                        "insufficient points: have {balance}, need {}",
                        reward.cost
                    )));
                }
                reward.supply -= 1;
                reward.updated_at = now_utc();
                let row = RewardRow::from_domain(&reward)?;
                let saved = diesel::update(rewards::table.find(&rid))
                    .set(&row)
                    .returning(RewardRow::as_returning())
                    .get_result(conn)?;
                let now = Utc::now().naive_utc();
                let profile = if reward.is_dom_reward {
                    adjust_profile(conn, &pid, 0, -reward.cost, now)?
                } else {
                    adjust_profile(conn, &pid, -reward.cost, 0, now)?
                };
                Ok((saved.into_domain()?, profile.into()))
            })
        })
        .await
    }

    // Punishments

    pub async fn list_punishments(&self) -> Result<Vec<Punishment>, StorageError> {
        use schema::punishments::dsl::*;
        let rows = self
            .run(|conn| {
                Ok(punishments
                    .order(created_at.asc())
                    .select(PunishmentRow::as_select())
                    .load(conn)?)
            })
            .await?;
        rows.into_iter().map(PunishmentRow::into_domain).collect()
    }

    pub async fn get_punishment(
        &self,
        punishment_id: &str,
    ) -> Result<Option<Punishment>, StorageError> {
        let pid = punishment_id.to_string();
        let row = self.run(move |conn| load_punishment(conn, &pid)).await?;
        row.map(PunishmentRow::into_domain).transpose()
    }

    pub async fn insert_punishment(
        &self,
        draft: PunishmentDraft,
    ) -> Result<Punishment, StorageError> {
        use schema::punishments;
        let punishment = Punishment::from_draft(new_id(), &draft, now_utc());
        check_punishment(&punishment)?;
        let row = PunishmentRow::from_domain(&punishment)?;
        let saved = self
            .run(move |conn| {
                Ok(diesel::insert_into(punishments::table)
                    .values(&row)
                    .returning(PunishmentRow::as_returning())
                    .get_result(conn)?)
            })
            .await?;
        saved.into_domain()
    }

    pub async fn update_punishment(
        &self,
        punishment_id: &str,
        patch: PunishmentPatch,
    ) -> Result<Punishment, StorageError> {
        use schema::punishments;
        let pid = punishment_id.to_string();
        let saved = self
            .run(move |conn| {
                conn.immediate_transaction(|conn| -> Result<PunishmentRow, StorageError> {
                    let row = load_punishment(conn, &pid)?
                        .ok_or_else(|| StorageError::NotFound(format!("punishment {pid}")))?;
                    let mut punishment = row.into_domain()?;
                    punishment.apply_patch(&patch);
                    check_punishment(&punishment)?;
                    punishment.updated_at = now_utc();
                    let row = PunishmentRow::from_domain(&punishment)?;
                    Ok(diesel::update(punishments::table.find(&pid))
                        .set(&row)
                        .returning(PunishmentRow::as_returning())
                        .get_result(conn)?)
                })
            })
            .await?;
        saved.into_domain()
    }

    /// Hard delete; the punishment's history rows go with it.
    pub async fn delete_punishment(&self, punishment_id: &str) -> Result<bool, StorageError> {
        use schema::{punishment_history as ph, punishments};
        let pid = punishment_id.to_string();
        self.run(move |conn| {
            conn.immediate_transaction(|conn| -> Result<bool, StorageError> {
                let history =
                    diesel::delete(ph::table.filter(ph::punishment_id.eq(&pid))).execute(conn)?;
                let n = diesel::delete(punishments::table.find(&pid)).execute(conn)?;
                trace!(punishment_id = %pid, history, deleted = n, "delete_punishment");
                Ok(n > 0)
            })
        })
        .await
    }

    pub async fn list_punishment_history(
        &self,
        punishment_filter: Option<String>,
    ) -> Result<Vec<PunishmentHistoryItem>, StorageError> {
        use schema::punishment_history::dsl as ph;
        let rows = self
            .run(move |conn| {
                let mut q = ph::punishment_history
                    .select(PunishmentHistoryRow::as_select())
                    .into_boxed();
                if let Some(p) = punishment_filter {
                    q = q.filter(ph::punishment_id.eq(p));
                }
                Ok(q.order(ph::applied_date.desc()).load(conn)?)
            })
            .await?;
        Ok(rows.into_iter().map(PunishmentHistoryItem::from).collect())
    }

    /// Deducts the punishment's points, credits its dom points and logs a history row.
    pub async fn apply_punishment(
        &self,
        punishment_id: &str,
        profile_id: &str,
    ) -> Result<(PunishmentHistoryItem, Profile), StorageError> {
        use schema::punishment_history as ph;
        let pid = punishment_id.to_string();
        let prof = profile_id.to_string();
        let stamp = self.stamp(Utc::now());
        self.run(move |conn| {
            conn.immediate_transaction(|conn| -> Result<(PunishmentHistoryItem, Profile), StorageError> {
                let punishment = load_punishment(conn, &pid)?
                    .ok_or_else(|| StorageError::NotFound(format!("punishment {pid}")))?;
                let item = PunishmentHistoryRow {
                    id: new_id(),
                    punishment_id: pid.clone(),
                    points_deducted: punishment.points,
                    day_of_week: stamp.history_day as i32,
                    applied_date: stamp.at,
                };
                diesel::insert_into(ph::table).values(&item).execute(conn)?;
                let profile = adjust_profile(
                    conn,
                    &prof,
                    -punishment.points,
                    punishment.dom_points,
                    stamp.at,
                )?;
                Ok((item.into(), profile.into()))
            })
        })
        .await
    }

    // Profiles

    pub async fn list_profiles(&self) -> Result<Vec<Profile>, StorageError> {
        use schema::profiles::dsl::*;
        let rows = self
            .run(|conn| {
                Ok(profiles
                    .order(id.asc())
                    .select(ProfileRow::as_select())
                    .load(conn)?)
            })
            .await?;
        Ok(rows.into_iter().map(Profile::from).collect())
    }

    pub async fn get_profile(&self, profile_id: &str) -> Result<Option<Profile>, StorageError> {
        let pid = profile_id.to_string();
        let row = self.run(move |conn| load_profile(conn, &pid)).await?;
        Ok(row.map(Profile::from))
    }

    /// Atomic increment of both balances; never read-modify-write.
    pub async fn adjust_points(
        &self,
        profile_id: &str,
        delta: i32,
        dom_delta: i32,
    ) -> Result<Profile, StorageError> {
        let pid = profile_id.to_string();
        let now = Utc::now().naive_utc();
        let row = self
            .run(move |conn| adjust_profile(conn, &pid, delta, dom_delta, now))
            .await?;
        Ok(row.into())
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn load_task(conn: &mut SqliteConnection, tid: &str) -> Result<Option<TaskRow>, StorageError> {
    use schema::tasks;
    Ok(tasks::table
        .find(tid)
        .select(TaskRow::as_select())
        .first(conn)
        .optional()?)
}

fn load_rule(conn: &mut SqliteConnection, rid: &str) -> Result<Option<RuleRow>, StorageError> {
    use schema::rules;
    Ok(rules::table
        .find(rid)
        .select(RuleRow::as_select())
        .first(conn)
        .optional()?)
}

fn load_reward(conn: &mut SqliteConnection, rid: &str) -> Result<Option<RewardRow>, StorageError> {
    use schema::rewards;
    Ok(rewards::table
        .find(rid)
        .select(RewardRow::as_select())
        .first(conn)
        .optional()?)
}

fn load_punishment(
    conn: &mut SqliteConnection,
    pid: &str,
) -> Result<Option<PunishmentRow>, StorageError> {
    use schema::punishments;
    Ok(punishments::table
        .find(pid)
        .select(PunishmentRow::as_select())
        .first(conn)
        .optional()?)
}

fn load_profile(
    conn: &mut SqliteConnection,
    pid: &str,
) -> Result<Option<ProfileRow>, StorageError> {
    use schema::profiles;
    Ok(profiles::table
        .find(pid)
        .select(ProfileRow::as_select())
        .first(conn)
        .optional()?)
}

fn count_task_completions_since(
    conn: &mut SqliteConnection,
    tid: &str,
    since: NaiveDateTime,
) -> Result<i64, StorageError> {
    use schema::task_completion_history::dsl as tch;
    Ok(tch::task_completion_history
        .filter(tch::task_id.eq(tid))
        .filter(tch::completed_at.ge(since))
        .count()
        .get_result(conn)?)
}

/// Single UPDATE with column arithmetic so concurrent adjustments never lose writes.
fn adjust_profile(
    conn: &mut SqliteConnection,
    pid: &str,
    delta: i32,
    dom_delta: i32,
    now: NaiveDateTime,
) -> Result<ProfileRow, StorageError> {
    use schema::profiles::dsl as p;
    diesel::update(p::profiles.find(pid))
        .set((
            p::points.eq(p::points + delta),
            p::dom_points.eq(p::dom_points + dom_delta),
            p::updated_at.eq(now),
        ))
        .returning(ProfileRow::as_returning())
        .get_result(conn)
        .optional()?
        .ok_or_else(|| StorageError::NotFound(format!("profile {pid}")))
}

fn check_title(title: &str) -> Result<(), StorageError> {
    if title.trim().is_empty() {
        return Err(StorageError::InvalidInput("title must not be empty".into()));
    }
    Ok(())
}

fn check_non_negative(name: &str, value: i32) -> Result<(), StorageError> {
    if value < 0 {
        return Err(StorageError::InvalidInput(format!(
            "{name} must not be negative"
        )));
    }
    Ok(())
}

fn check_styling(s: &questline_shared::domain::Styling) -> Result<(), StorageError> {
    if s.background_opacity > 100 || s.focal_point_x > 100 || s.focal_point_y > 100 {
        return Err(StorageError::InvalidInput(
            "opacity and focal point must be within 0..=100".into(),
        ));
    }
    Ok(())
}

fn check_task(t: &Task) -> Result<(), StorageError> {
    check_title(&t.title)?;
    check_non_negative("points", t.points)?;
    if t.frequency_count < 1 {
        return Err(StorageError::InvalidInput(
            "frequency_count must be at least 1".into(),
        ));
    }
    check_styling(&t.styling)
}

fn check_rule(r: &Rule) -> Result<(), StorageError> {
    check_title(&r.title)?;
    if r.frequency_count < 1 {
        return Err(StorageError::InvalidInput(
            "frequency_count must be at least 1".into(),
        ));
    }
    check_styling(&r.styling)
}

fn check_reward(r: &Reward) -> Result<(), StorageError> {
    check_title(&r.title)?;
    check_non_negative("cost", r.cost)?;
    check_non_negative("supply", r.supply)?;
    check_styling(&r.styling)
}

fn check_punishment(p: &Punishment) -> Result<(), StorageError> {
    check_title(&p.title)?;
    check_non_negative("points", p.points)?;
    check_non_negative("dom_points", p.dom_points)?;
    check_non_negative("dom_supply", p.dom_supply)?;
    check_styling(&p.styling)
}

fn configure_sqlite_conn(conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
    // Busy timeout first so the WAL switch itself waits on a locked database
    diesel::sql_query("PRAGMA busy_timeout=5000;").execute(conn)?;
    diesel::sql_query("PRAGMA journal_mode=WAL;").execute(conn)?;
    diesel::sql_query("PRAGMA synchronous=NORMAL;").execute(conn)?;
    Ok(())
}
