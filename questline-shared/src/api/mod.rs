use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{
    Profile, PunishmentHistoryItem, Reward, Rule, RuleViolation, Task, TaskCompletion,
};

pub mod endpoints;
#[cfg(feature = "rest-client")]
pub mod rest;

pub const API_V1_PREFIX: &str = "/api/v1";

/// Store tables exposed as REST collections.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Tasks,
    Rules,
    Rewards,
    Punishments,
    PunishmentHistory,
    RuleViolations,
    TaskCompletionHistory,
    Profiles,
}

impl Table {
    pub const ALL: [Table; 8] = [
        Table::Tasks,
        Table::Rules,
        Table::Rewards,
        Table::Punishments,
        Table::PunishmentHistory,
        Table::RuleViolations,
        Table::TaskCompletionHistory,
        Table::Profiles,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Tasks => "tasks",
            Table::Rules => "rules",
            Table::Rewards => "rewards",
            Table::Punishments => "punishments",
            Table::PunishmentHistory => "punishment_history",
            Table::RuleViolations => "rule_violations",
            Table::TaskCompletionHistory => "task_completion_history",
            Table::Profiles => "profiles",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Table::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown table: {s}"))
    }
}

/// Equality filters accepted by history listings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub punishment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
}

impl HistoryFilter {
    pub fn is_empty(&self) -> bool {
        self.punishment_id.is_none() && self.task_id.is_none() && self.rule_id.is_none()
    }
}

// Domain actions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCompletionResp {
    pub task: Task,
    pub completion: TaskCompletion,
    pub profile: Profile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PunishmentApplyResp {
    pub history: PunishmentHistoryItem,
    pub profile: Profile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardBuyResp {
    pub reward: Reward,
    pub profile: Profile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleViolationResp {
    pub rule: Rule,
    pub violation: RuleViolation,
}

/// Atomic balance adjustment; both deltas may be negative.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PointsAdjustReq {
    #[serde(default)]
    pub delta: i32,
    #[serde(default)]
    pub dom_delta: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfoDto {
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
