use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset, Weekday};

use crate::api::Table;

/// Number of slots in every per-weekday counter array.
pub const WEEK_SLOTS: usize = 7;

/// Which weekday owns slot 0 of a 7-slot array.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeekStart {
    Monday,
    Sunday,
}

/// `usage_data` arrays are indexed from Monday.
pub const USAGE_WEEK_START: WeekStart = WeekStart::Monday;
/// History rows (`day_of_week`) are indexed from Sunday.
pub const HISTORY_WEEK_START: WeekStart = WeekStart::Sunday;

pub fn day_index(weekday: Weekday, start: WeekStart) -> usize {
    let n = match start {
        WeekStart::Monday => weekday.number_days_from_monday(),
        WeekStart::Sunday => weekday.number_days_from_sunday(),
    };
    n as usize
}

/// Converts a slot index between the two conventions.
pub fn convert_day_index(index: usize, from: WeekStart, to: WeekStart) -> usize {
    let index = index % WEEK_SLOTS;
    match (from, to) {
        (WeekStart::Monday, WeekStart::Sunday) => (index + 1) % WEEK_SLOTS,
        (WeekStart::Sunday, WeekStart::Monday) => (index + WEEK_SLOTS - 1) % WEEK_SLOTS,
        _ => index,
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    #[default]
    Daily,
    Weekly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            other => Err(format!("unknown frequency: {other}")),
        }
    }
}

/// Fixed 7-slot per-weekday counter. Slot 0 is [`USAGE_WEEK_START`].
///
/// Deserializing an array of any other length pads with zeros or truncates,
/// so the length invariant holds for every value that exists.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<u32>", into = "Vec<u32>")]
pub struct UsageData([u32; WEEK_SLOTS]);

impl UsageData {
    pub fn zeros() -> Self {
        UsageData([0; WEEK_SLOTS])
    }

    pub fn slots(&self) -> &[u32; WEEK_SLOTS] {
        &self.0
    }

    pub fn get(&self, index: usize) -> u32 {
        self.0[index % WEEK_SLOTS]
    }

    pub fn increment(&mut self, index: usize) {
        let slot = &mut self.0[index % WEEK_SLOTS];
        *slot = slot.saturating_add(1);
    }

    pub fn total(&self) -> u32 {
        self.0.iter().sum()
    }
}

impl From<Vec<u32>> for UsageData {
    fn from(value: Vec<u32>) -> Self {
        let mut slots = [0u32; WEEK_SLOTS];
        for (slot, v) in slots.iter_mut().zip(value) {
            *slot = v;
        }
        UsageData(slots)
    }
}

impl From<UsageData> for Vec<u32> {
    fn from(value: UsageData) -> Self {
        value.0.to_vec()
    }
}

/// Card styling. Every field has a non-null default so records coming from
/// the store without styling still render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Styling {
    pub title_color: String,
    pub subtext_color: String,
    pub calendar_color: String,
    pub icon_color: String,
    pub highlight_effect: bool,
    pub icon_name: Option<String>,
    pub icon_url: Option<String>,
    pub background_image_url: Option<String>,
    pub background_opacity: u8,
    pub focal_point_x: u8,
    pub focal_point_y: u8,
}

impl Default for Styling {
    fn default() -> Self {
        Styling {
            title_color: "#FFFFFF".into(),
            subtext_color: "#8E9196".into(),
            calendar_color: "#7E69AB".into(),
            icon_color: "#9B87F5".into(),
            highlight_effect: false,
            icon_name: None,
            icon_url: None,
            background_image_url: None,
            background_opacity: 100,
            focal_point_x: 50,
            focal_point_y: 50,
        }
    }
}

fn default_frequency_count() -> i32 {
    1
}

fn default_carousel_timer() -> u32 {
    5
}

/// Anything listed from a store table.
pub trait Record: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    const TABLE: Table;
    fn id(&self) -> &str;
}

/// A record the user creates and edits.
pub trait Editable: Record {
    type Draft: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static;
    type Patch: Clone + fmt::Debug + Default + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Builds a full record out of a draft, as the store would.
    fn from_draft(id: String, draft: &Self::Draft, now: OffsetDateTime) -> Self;

    /// Merges the fields present in `patch`; absent fields are left alone.
    fn apply_patch(&mut self, patch: &Self::Patch);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub points: i32,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub frequency: Frequency,
    #[serde(default = "default_frequency_count")]
    pub frequency_count: i32,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_completed_date: Option<OffsetDateTime>,
    #[serde(default)]
    pub usage_data: UsageData,
    #[serde(flatten)]
    pub styling: Styling,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub points: i32,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub frequency: Frequency,
    #[serde(default = "default_frequency_count")]
    pub frequency_count: i32,
    #[serde(default)]
    pub usage_data: UsageData,
    #[serde(flatten)]
    pub styling: Styling,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>, points: i32) -> Self {
        TaskDraft {
            title: title.into(),
            points,
            ..Default::default()
        }
    }
}

impl Default for TaskDraft {
    fn default() -> Self {
        TaskDraft {
            title: String::new(),
            description: None,
            points: 0,
            priority: Priority::Medium,
            frequency: Frequency::Daily,
            frequency_count: 1,
            usage_data: UsageData::zeros(),
            styling: Styling::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<Frequency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_count: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_data: Option<UsageData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub styling: Option<Styling>,
}

impl Record for Task {
    const TABLE: Table = Table::Tasks;
    fn id(&self) -> &str {
        &self.id
    }
}

impl Editable for Task {
    type Draft = TaskDraft;
    type Patch = TaskPatch;

    fn from_draft(id: String, draft: &TaskDraft, now: OffsetDateTime) -> Self {
        Task {
            id,
            title: draft.title.clone(),
            description: draft.description.clone(),
            points: draft.points,
            priority: draft.priority,
            frequency: draft.frequency,
            frequency_count: draft.frequency_count,
            completed: false,
            last_completed_date: None,
            usage_data: draft.usage_data,
            styling: draft.styling.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    fn apply_patch(&mut self, patch: &TaskPatch) {
        if let Some(v) = &patch.title {
            self.title = v.clone();
        }
        if let Some(v) = &patch.description {
            self.description = Some(v.clone());
        }
        if let Some(v) = patch.points {
            self.points = v;
        }
        if let Some(v) = patch.priority {
            self.priority = v;
        }
        if let Some(v) = patch.frequency {
            self.frequency = v;
        }
        if let Some(v) = patch.frequency_count {
            self.frequency_count = v;
        }
        if let Some(v) = patch.completed {
            self.completed = v;
        }
        if let Some(v) = patch.usage_data {
            self.usage_data = v;
        }
        if let Some(v) = &patch.styling {
            self.styling = v.clone();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub frequency: Frequency,
    #[serde(default = "default_frequency_count")]
    pub frequency_count: i32,
    #[serde(default)]
    pub usage_data: UsageData,
    #[serde(default)]
    pub background_images: Vec<String>,
    #[serde(default = "default_carousel_timer")]
    pub carousel_timer: u32,
    #[serde(flatten)]
    pub styling: Styling,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDraft {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub frequency: Frequency,
    #[serde(default = "default_frequency_count")]
    pub frequency_count: i32,
    #[serde(default)]
    pub usage_data: UsageData,
    #[serde(default)]
    pub background_images: Vec<String>,
    #[serde(default = "default_carousel_timer")]
    pub carousel_timer: u32,
    #[serde(flatten)]
    pub styling: Styling,
}

impl RuleDraft {
    pub fn new(title: impl Into<String>) -> Self {
        RuleDraft {
            title: title.into(),
            ..Default::default()
        }
    }
}

impl Default for RuleDraft {
    fn default() -> Self {
        RuleDraft {
            title: String::new(),
            description: None,
            priority: Priority::Medium,
            frequency: Frequency::Daily,
            frequency_count: 1,
            usage_data: UsageData::zeros(),
            background_images: Vec::new(),
            carousel_timer: default_carousel_timer(),
            styling: Styling::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RulePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<Frequency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_count: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_data: Option<UsageData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_images: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carousel_timer: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub styling: Option<Styling>,
}

impl Record for Rule {
    const TABLE: Table = Table::Rules;
    fn id(&self) -> &str {
        &self.id
    }
}

impl Editable for Rule {
    type Draft = RuleDraft;
    type Patch = RulePatch;

    fn from_draft(id: String, draft: &RuleDraft, now: OffsetDateTime) -> Self {
        Rule {
            id,
            title: draft.title.clone(),
            description: draft.description.clone(),
            priority: draft.priority,
            frequency: draft.frequency,
            frequency_count: draft.frequency_count,
            usage_data: draft.usage_data,
            background_images: draft.background_images.clone(),
            carousel_timer: draft.carousel_timer,
            styling: draft.styling.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    fn apply_patch(&mut self, patch: &RulePatch) {
        if let Some(v) = &patch.title {
            self.title = v.clone();
        }
        if let Some(v) = &patch.description {
            self.description = Some(v.clone());
        }
        if let Some(v) = patch.priority {
            self.priority = v;
        }
        if let Some(v) = patch.frequency {
            self.frequency = v;
        }
        if let Some(v) = patch.frequency_count {
            self.frequency_count = v;
        }
        if let Some(v) = patch.usage_data {
            self.usage_data = v;
        }
        if let Some(v) = &patch.background_images {
            self.background_images = v.clone();
        }
        if let Some(v) = patch.carousel_timer {
            self.carousel_timer = v;
        }
        if let Some(v) = &patch.styling {
            self.styling = v.clone();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reward {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub cost: i32,
    #[serde(default)]
    pub supply: i32,
    #[serde(default)]
    pub is_dom_reward: bool,
    #[serde(flatten)]
    pub styling: Styling,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardDraft {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub cost: i32,
    #[serde(default)]
    pub supply: i32,
    #[serde(default)]
    pub is_dom_reward: bool,
    #[serde(flatten)]
    pub styling: Styling,
}

impl RewardDraft {
    pub fn new(title: impl Into<String>, cost: i32) -> Self {
        RewardDraft {
            title: title.into(),
            cost,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supply: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_dom_reward: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub styling: Option<Styling>,
}

impl Record for Reward {
    const TABLE: Table = Table::Rewards;
    fn id(&self) -> &str {
        &self.id
    }
}

impl Editable for Reward {
    type Draft = RewardDraft;
    type Patch = RewardPatch;

    fn from_draft(id: String, draft: &RewardDraft, now: OffsetDateTime) -> Self {
        Reward {
            id,
            title: draft.title.clone(),
            description: draft.description.clone(),
            cost: draft.cost,
            supply: draft.supply,
            is_dom_reward: draft.is_dom_reward,
            styling: draft.styling.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    fn apply_patch(&mut self, patch: &RewardPatch) {
        if let Some(v) = &patch.title {
            self.title = v.clone();
        }
        if let Some(v) = &patch.description {
            self.description = Some(v.clone());
        }
        if let Some(v) = patch.cost {
            self.cost = v;
        }
        if let Some(v) = patch.supply {
            self.supply = v;
        }
        if let Some(v) = patch.is_dom_reward {
            self.is_dom_reward = v;
        }
        if let Some(v) = &patch.styling {
            self.styling = v.clone();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Punishment {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub points: i32,
    #[serde(default)]
    pub dom_points: i32,
    #[serde(default)]
    pub dom_supply: i32,
    #[serde(flatten)]
    pub styling: Styling,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PunishmentDraft {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub points: i32,
    #[serde(default)]
    pub dom_points: i32,
    #[serde(default)]
    pub dom_supply: i32,
    #[serde(flatten)]
    pub styling: Styling,
}

impl PunishmentDraft {
    /// Dom points default to half the cost, rounded up.
    pub fn new(title: impl Into<String>, points: i32) -> Self {
        PunishmentDraft {
            title: title.into(),
            points,
            dom_points: (points + 1) / 2,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PunishmentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dom_points: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dom_supply: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub styling: Option<Styling>,
}

impl Record for Punishment {
    const TABLE: Table = Table::Punishments;
    fn id(&self) -> &str {
        &self.id
    }
}

impl Editable for Punishment {
    type Draft = PunishmentDraft;
    type Patch = PunishmentPatch;

    fn from_draft(id: String, draft: &PunishmentDraft, now: OffsetDateTime) -> Self {
        Punishment {
            id,
            title: draft.title.clone(),
            description: draft.description.clone(),
            points: draft.points,
            dom_points: draft.dom_points,
            dom_supply: draft.dom_supply,
            styling: draft.styling.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    fn apply_patch(&mut self, patch: &PunishmentPatch) {
        if let Some(v) = &patch.title {
            self.title = v.clone();
        }
        if let Some(v) = &patch.description {
            self.description = Some(v.clone());
        }
        if let Some(v) = patch.points {
            self.points = v;
        }
        if let Some(v) = patch.dom_points {
            self.dom_points = v;
        }
        if let Some(v) = patch.dom_supply {
            self.dom_supply = v;
        }
        if let Some(v) = &patch.styling {
            self.styling = v.clone();
        }
    }
}

/// One application of a punishment. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PunishmentHistoryItem {
    pub id: String,
    pub punishment_id: String,
    pub points_deducted: i32,
    /// Slot index per [`HISTORY_WEEK_START`].
    pub day_of_week: u8,
    #[serde(with = "time::serde::rfc3339")]
    pub applied_date: OffsetDateTime,
}

impl Record for PunishmentHistoryItem {
    const TABLE: Table = Table::PunishmentHistory;
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskCompletion {
    pub id: String,
    pub task_id: String,
    /// Slot index per [`HISTORY_WEEK_START`].
    pub day_of_week: u8,
    #[serde(with = "time::serde::rfc3339")]
    pub completed_at: OffsetDateTime,
}

impl Record for TaskCompletion {
    const TABLE: Table = Table::TaskCompletionHistory;
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleViolation {
    pub id: String,
    pub rule_id: String,
    /// Slot index per [`HISTORY_WEEK_START`].
    pub day_of_week: u8,
    #[serde(with = "time::serde::rfc3339")]
    pub violation_date: OffsetDateTime,
}

impl Record for RuleViolation {
    const TABLE: Table = Table::RuleViolations;
    fn id(&self) -> &str {
        &self.id
    }
}

/// Points balance for the household.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub points: i32,
    pub dom_points: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Record for Profile {
    const TABLE: Table = Table::Profiles;
    fn id(&self) -> &str {
        &self.id
    }
}

/// Tally of history rows per weekday, in the usage-array convention.
pub fn usage_from_history<I>(days: I) -> UsageData
where
    I: IntoIterator<Item = u8>,
{
    let mut usage = UsageData::zeros();
    for day in days {
        usage.increment(convert_day_index(
            day as usize,
            HISTORY_WEEK_START,
            USAGE_WEEK_START,
        ));
    }
    usage
}

pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(UtcOffset::UTC)
}
