use crate::storage::StorageError;
use crate::storage::schema::{
    profiles, punishment_history, punishments, rewards, rule_violations, rules,
    task_completion_history, tasks,
};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use questline_shared::domain::{
    Profile, Punishment, PunishmentHistoryItem, Reward, Rule, RuleViolation, Styling, Task,
    TaskCompletion, UsageData,
};
use time::OffsetDateTime;

pub fn to_offset(dt: NaiveDateTime) -> OffsetDateTime {
    let micros = dt.and_utc().timestamp_micros();
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(micros) * 1_000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

pub fn to_naive(dt: OffsetDateTime) -> NaiveDateTime {
    chrono::DateTime::from_timestamp(dt.unix_timestamp(), dt.nanosecond())
        .map(|d| d.naive_utc())
        .unwrap_or_default()
}

fn parse_json<T: serde::de::DeserializeOwned>(
    column: &str,
    text: &str,
) -> Result<T, StorageError> {
    serde_json::from_str(text).map_err(|e| StorageError::Corrupt(format!("{column}: {e}")))
}

fn to_json<T: serde::Serialize>(column: &str, value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(|e| StorageError::Corrupt(format!("{column}: {e}")))
}

fn parse_enum<T: std::str::FromStr<Err = String>>(text: &str) -> Result<T, StorageError> {
    text.parse().map_err(StorageError::Corrupt)
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset, Identifiable)]
#[diesel(table_name = tasks)]
pub struct TaskRow {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub points: i32,
    pub priority: String,
    pub frequency: String,
    pub frequency_count: i32,
    pub completed: bool,
    pub last_completed_date: Option<NaiveDateTime>,
    pub usage_data: String,
    pub styling: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl TaskRow {
    pub fn from_domain(t: &Task) -> Result<Self, StorageError> {
        Ok(TaskRow {
            id: t.id.clone(),
            title: t.title.clone(),
            description: t.description.clone(),
            points: t.points,
            priority: t.priority.as_str().to_string(),
            frequency: t.frequency.as_str().to_string(),
            frequency_count: t.frequency_count,
            completed: t.completed,
            last_completed_date: t.last_completed_date.map(to_naive),
            usage_data: to_json("usage_data", &t.usage_data)?,
            styling: to_json("styling", &t.styling)?,
            created_at: to_naive(t.created_at),
            updated_at: to_naive(t.updated_at),
        })
    }

    pub fn into_domain(self) -> Result<Task, StorageError> {
        Ok(Task {
            priority: parse_enum(&self.priority)?,
            frequency: parse_enum(&self.frequency)?,
            usage_data: parse_json::<UsageData>("usage_data", &self.usage_data)?,
            styling: parse_json::<Styling>("styling", &self.styling)?,
            id: self.id,
            title: self.title,
            description: self.description,
            points: self.points,
            frequency_count: self.frequency_count,
            completed: self.completed,
            last_completed_date: self.last_completed_date.map(to_offset),
            created_at: to_offset(self.created_at),
            updated_at: to_offset(self.updated_at),
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset, Identifiable)]
#[diesel(table_name = rules)]
pub struct RuleRow {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: String,
    pub frequency: String,
    pub frequency_count: i32,
    pub usage_data: String,
    pub background_images: String,
    pub carousel_timer: i32,
    pub styling: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl RuleRow {
    pub fn from_domain(r: &Rule) -> Result<Self, StorageError> {
        Ok(RuleRow {
            id: r.id.clone(),
            title: r.title.clone(),
            description: r.description.clone(),
            priority: r.priority.as_str().to_string(),
            frequency: r.frequency.as_str().to_string(),
            frequency_count: r.frequency_count,
            usage_data: to_json("usage_data", &r.usage_data)?,
            background_images: to_json("background_images", &r.background_images)?,
            carousel_timer: i32::try_from(r.carousel_timer).unwrap_or(i32::MAX),
            styling: to_json("styling", &r.styling)?,
            created_at: to_naive(r.created_at),
            updated_at: to_naive(r.updated_at),
        })
    }

    pub fn into_domain(self) -> Result<Rule, StorageError> {
        Ok(Rule {
            priority: parse_enum(&self.priority)?,
            frequency: parse_enum(&self.frequency)?,
            usage_data: parse_json("usage_data", &self.usage_data)?,
            background_images: parse_json("background_images", &self.background_images)?,
            styling: parse_json("styling", &self.styling)?,
            carousel_timer: self.carousel_timer.max(0) as u32,
            id: self.id,
            title: self.title,
            description: self.description,
            frequency_count: self.frequency_count,
            created_at: to_offset(self.created_at),
            updated_at: to_offset(self.updated_at),
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset, Identifiable)]
#[diesel(table_name = rewards)]
pub struct RewardRow {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub cost: i32,
    pub supply: i32,
    pub is_dom_reward: bool,
    pub styling: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl RewardRow {
    pub fn from_domain(r: &Reward) -> Result<Self, StorageError> {
        Ok(RewardRow {
            id: r.id.clone(),
            title: r.title.clone(),
            description: r.description.clone(),
            cost: r.cost,
            supply: r.supply,
            is_dom_reward: r.is_dom_reward,
            styling: to_json("styling", &r.styling)?,
            created_at: to_naive(r.created_at),
            updated_at: to_naive(r.updated_at),
        })
    }

    pub fn into_domain(self) -> Result<Reward, StorageError> {
        Ok(Reward {
            styling: parse_json("styling", &self.styling)?,
            id: self.id,
            title: self.title,
            description: self.description,
            cost: self.cost,
            supply: self.supply,
            is_dom_reward: self.is_dom_reward,
            created_at: to_offset(self.created_at),
            updated_at: to_offset(self.updated_at),
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset, Identifiable)]
#[diesel(table_name = punishments)]
pub struct PunishmentRow {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub points: i32,
    pub dom_points: i32,
    pub dom_supply: i32,
    pub styling: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl PunishmentRow {
    pub fn from_domain(p: &Punishment) -> Result<Self, StorageError> {
        Ok(PunishmentRow {
            id: p.id.clone(),
            title: p.title.clone(),
            description: p.description.clone(),
            points: p.points,
            dom_points: p.dom_points,
            dom_supply: p.dom_supply,
            styling: to_json("styling", &p.styling)?,
            created_at: to_naive(p.created_at),
            updated_at: to_naive(p.updated_at),
        })
    }

    pub fn into_domain(self) -> Result<Punishment, StorageError> {
        Ok(Punishment {
            styling: parse_json("styling", &self.styling)?,
            id: self.id,
            title: self.title,
            description: self.description,
            points: self.points,
            dom_points: self.dom_points,
            dom_supply: self.dom_supply,
            created_at: to_offset(self.created_at),
            updated_at: to_offset(self.updated_at),
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Identifiable, Associations)]
#[diesel(table_name = punishment_history)]
#[diesel(belongs_to(PunishmentRow, foreign_key = punishment_id))]
pub struct PunishmentHistoryRow {
    pub id: String,
    pub punishment_id: String,
    pub points_deducted: i32,
    pub day_of_week: i32,
    pub applied_date: NaiveDateTime,
}

impl From<PunishmentHistoryRow> for PunishmentHistoryItem {
    fn from(r: PunishmentHistoryRow) -> Self {
        PunishmentHistoryItem {
            id: r.id,
            punishment_id: r.punishment_id,
            points_deducted: r.points_deducted,
            day_of_week: r.day_of_week.clamp(0, 6) as u8,
            applied_date: to_offset(r.applied_date),
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Identifiable, Associations)]
#[diesel(table_name = rule_violations)]
#[diesel(belongs_to(RuleRow, foreign_key = rule_id))]
pub struct RuleViolationRow {
    pub id: String,
    pub rule_id: String,
    pub day_of_week: i32,
    pub violation_date: NaiveDateTime,
}

impl From<RuleViolationRow> for RuleViolation {
    fn from(r: RuleViolationRow) -> Self {
        RuleViolation {
            id: r.id,
            rule_id: r.rule_id,
            day_of_week: r.day_of_week.clamp(0, 6) as u8,
            violation_date: to_offset(r.violation_date),
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Identifiable, Associations)]
#[diesel(table_name = task_completion_history)]
#[diesel(belongs_to(TaskRow, foreign_key = task_id))]
pub struct TaskCompletionRow {
    pub id: String,
    pub task_id: String,
    pub day_of_week: i32,
    pub completed_at: NaiveDateTime,
}

impl From<TaskCompletionRow> for TaskCompletion {
    fn from(r: TaskCompletionRow) -> Self {
        TaskCompletion {
            id: r.id,
            task_id: r.task_id,
            day_of_week: r.day_of_week.clamp(0, 6) as u8,
            completed_at: to_offset(r.completed_at),
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Identifiable)]
#[diesel(table_name = profiles)]
pub struct ProfileRow {
    pub id: String,
    pub points: i32,
    pub dom_points: i32,
    pub updated_at: NaiveDateTime,
}

impl From<ProfileRow> for Profile {
    fn from(r: ProfileRow) -> Self {
        Profile {
            id: r.id,
            points: r.points,
            dom_points: r.dom_points,
            updated_at: to_offset(r.updated_at),
        }
    }
}
