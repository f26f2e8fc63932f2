pub mod api;
pub mod domain;

pub use domain::{
    Editable, Profile, Punishment, PunishmentDraft, PunishmentHistoryItem, PunishmentPatch,
    Record, Reward, RewardDraft, RewardPatch, Rule, RuleDraft, RulePatch, RuleViolation, Task,
    TaskCompletion, TaskDraft, TaskPatch,
};
