use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use questline_shared::api::{
    HistoryFilter, PointsAdjustReq, PunishmentApplyResp, RewardBuyResp, RuleViolationResp,
    TaskCompletionResp, VersionInfoDto,
};
use questline_shared::domain::{
    Profile, Punishment, PunishmentDraft, PunishmentHistoryItem, PunishmentPatch, Reward,
    RewardDraft, RewardPatch, Rule, RuleDraft, RulePatch, RuleViolation, Task, TaskCompletion,
    TaskDraft, TaskPatch,
};
use tracing::info;

use super::{AppError, AppState};

type ApiResult<T> = Result<Json<T>, AppError>;

fn found<T>(kind: &str, id: &str, value: Option<T>) -> ApiResult<T> {
    value
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("{kind} not found: {id}")))
}

fn deleted(kind: &str, id: &str, existed: bool) -> Result<StatusCode, AppError> {
    if existed {
        info!(kind, id, "deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found(format!("{kind} not found: {id}")))
    }
}

pub(super) async fn api_version() -> Json<VersionInfoDto> {
    Json(VersionInfoDto {
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// Tasks

pub(super) async fn list_tasks(State(state): State<AppState>) -> ApiResult<Vec<Task>> {
    Ok(Json(state.store.list_tasks().await?))
}

pub(super) async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Task> {
    found("task", &id, state.store.get_task(&id).await?)
}

pub(super) async fn insert_task(
    State(state): State<AppState>,
    Json(draft): Json<TaskDraft>,
) -> Result<(StatusCode, Json<Task>), AppError> {
    let task = state.store.insert_task(draft).await?;
    info!(id = %task.id, title = %task.title, "task created");
    Ok((StatusCode::CREATED, Json(task)))
}

pub(super) async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<TaskPatch>,
) -> ApiResult<Task> {
    Ok(Json(state.store.update_task(&id, patch).await?))
}

pub(super) async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    deleted("task", &id, state.store.delete_task(&id).await?)
}

pub(super) async fn complete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<TaskCompletionResp> {
    let (task, completion, profile) = state.store.complete_task(&id, state.profile_id()).await?;
    info!(task_id = %id, day = completion.day_of_week, points = profile.points, "task completed");
    Ok(Json(TaskCompletionResp {
        task,
        completion,
        profile,
    }))
}

pub(super) async fn list_task_completions(
    State(state): State<AppState>,
    Query(filter): Query<HistoryFilter>,
) -> ApiResult<Vec<TaskCompletion>> {
    Ok(Json(state.store.list_task_completions(filter.task_id).await?))
}

// Rules

pub(super) async fn list_rules(State(state): State<AppState>) -> ApiResult<Vec<Rule>> {
    Ok(Json(state.store.list_rules().await?))
}

pub(super) async fn get_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Rule> {
    found("rule", &id, state.store.get_rule(&id).await?)
}

pub(super) async fn insert_rule(
    State(state): State<AppState>,
    Json(draft): Json<RuleDraft>,
) -> Result<(StatusCode, Json<Rule>), AppError> {
    let rule = state.store.insert_rule(draft).await?;
    info!(id = %rule.id, title = %rule.title, "rule created");
    Ok((StatusCode::CREATED, Json(rule)))
}

pub(super) async fn update_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<RulePatch>,
) -> ApiResult<Rule> {
    Ok(Json(state.store.update_rule(&id, patch).await?))
}

pub(super) async fn delete_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    deleted("rule", &id, state.store.delete_rule(&id).await?)
}

pub(super) async fn violate_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<RuleViolationResp> {
    let (rule, violation) = state.store.violate_rule(&id).await?;
    info!(rule_id = %id, day = violation.day_of_week, "rule violated");
    Ok(Json(RuleViolationResp { rule, violation }))
}

pub(super) async fn list_rule_violations(
    State(state): State<AppState>,
    Query(filter): Query<HistoryFilter>,
) -> ApiResult<Vec<RuleViolation>> {
    Ok(Json(state.store.list_rule_violations(filter.rule_id).await?))
}

// Rewards

pub(super) async fn list_rewards(State(state): State<AppState>) -> ApiResult<Vec<Reward>> {
    Ok(Json(state.store.list_rewards().await?))
}

pub(super) async fn get_reward(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Reward> {
    found("reward", &id, state.store.get_reward(&id).await?)
}

pub(super) async fn insert_reward(
    State(state): State<AppState>,
    Json(draft): Json<RewardDraft>,
) -> Result<(StatusCode, Json<Reward>), AppError> {
    let reward = state.store.insert_reward(draft).await?;
    info!(id = %reward.id, title = %reward.title, "reward created");
    Ok((StatusCode::CREATED, Json(reward)))
}

pub(super) async fn update_reward(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<RewardPatch>,
) -> ApiResult<Reward> {
    Ok(Json(state.store.update_reward(&id, patch).await?))
}

pub(super) async fn delete_reward(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    deleted("reward", &id, state.store.delete_reward(&id).await?)
}

pub(super) async fn buy_reward(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<RewardBuyResp> {
    let (reward, profile) = state.store.buy_reward(&id, state.profile_id()).await?;
    info!(reward_id = %id, supply = reward.supply, points = profile.points, "reward bought");
    Ok(Json(RewardBuyResp { reward, profile }))
}

// Punishments

pub(super) async fn list_punishments(
    State(state): State<AppState>,
) -> ApiResult<Vec<Punishment>> {
    Ok(Json(state.store.list_punishments().await?))
}

pub(super) async fn get_punishment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Punishment> {
    found("punishment", &id, state.store.get_punishment(&id).await?)
}

pub(super) async fn insert_punishment(
    State(state): State<AppState>,
    Json(draft): Json<PunishmentDraft>,
) -> Result<(StatusCode, Json<Punishment>), AppError> {
    let punishment = state.store.insert_punishment(draft).await?;
    info!(id = %punishment.id, title = %punishment.title, "punishment created");
    Ok((StatusCode::CREATED, Json(punishment)))
}

pub(super) async fn update_punishment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<PunishmentPatch>,
) -> ApiResult<Punishment> {
    Ok(Json(state.store.update_punishment(&id, patch).await?))
}

pub(super) async fn delete_punishment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    deleted(
        "punishment",
        &id,
        state.store.delete_punishment(&id).await?,
    )
}

pub(super) async fn apply_punishment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<PunishmentApplyResp> {
    let (history, profile) = state
        .store
        .apply_punishment(&id, state.profile_id())
        .await?;
    info!(punishment_id = %id, deducted = history.points_deducted, points = profile.points, "punishment applied");
    Ok(Json(PunishmentApplyResp { history, profile }))
}

pub(super) async fn list_punishment_history(
    State(state): State<AppState>,
    Query(filter): Query<HistoryFilter>,
) -> ApiResult<Vec<PunishmentHistoryItem>> {
    Ok(Json(
        state
            .store
            .list_punishment_history(filter.punishment_id)
            .await?,
    ))
}

// Profiles

pub(super) async fn list_profiles(State(state): State<AppState>) -> ApiResult<Vec<Profile>> {
    Ok(Json(state.store.list_profiles().await?))
}

pub(super) async fn get_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Profile> {
    found("profile", &id, state.store.get_profile(&id).await?)
}

pub(super) async fn adjust_points(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PointsAdjustReq>,
) -> ApiResult<Profile> {
    let profile = state
        .store
        .adjust_points(&id, req.delta, req.dom_delta)
        .await?;
    info!(profile_id = %id, delta = req.delta, dom_delta = req.dom_delta, points = profile.points, "points adjusted");
    Ok(Json(profile))
}
