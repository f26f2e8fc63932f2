use std::sync::atomic::Ordering;

use questline_shared::api::Table;
use questline_shared::domain::{
    Punishment, PunishmentDraft, PunishmentHistoryItem, Reward, RewardDraft, Rule, RuleDraft,
    RulePatch, RuleViolation, Task, TaskCompletion, TaskDraft, TaskPatch, now_utc,
};

use super::testing::{PROFILE, harness};
use crate::cache::QueryKey;
use crate::mirror::{self, MirrorKey};
use crate::notice::NoticeLevel;
use crate::optimistic::{List, MutationState};
use crate::query::ListSource;

fn history(id: &str, punishment_id: &str) -> PunishmentHistoryItem {
    PunishmentHistoryItem {
        id: id.into(),
        punishment_id: punishment_id.into(),
        points_deducted: 5,
        day_of_week: 0,
        applied_date: now_utc(),
    }
}

fn ids<T: questline_shared::domain::Record>(list: &List<T>) -> Vec<String> {
    list.iter().map(|s| s.id().into_owned()).collect()
}

#[tokio::test]
async fn create_shows_placeholder_until_server_answers() {
    let h = harness();
    h.hooks.tasks.list().await.unwrap();

    h.remote.hold();
    let create = h.hooks.tasks.create(TaskDraft::new("Dishes", 5));
    let observe = async {
        h.remote.entered.notified().await;
        let cached = h.ctx.cache.get::<List<Task>>(QueryKey::Tasks).await.unwrap();
        assert_eq!(cached.len(), 1);
        assert!(cached[0].is_pending());
        assert!(cached[0].id().starts_with("temp-"));
        assert_eq!(cached[0].record().title, "Dishes");
        h.remote.release();
    };
    let (outcome, ()) = tokio::join!(create, observe);

    assert_eq!(
        outcome.trail,
        vec![
            MutationState::Idle,
            MutationState::OptimisticApplied,
            MutationState::SettledSuccess
        ]
    );
    let saved = outcome.into_result().unwrap();
    let cached = h.ctx.cache.get::<List<Task>>(QueryKey::Tasks).await.unwrap();
    assert_eq!(cached.len(), 1);
    assert!(!cached[0].is_pending());
    assert_eq!(cached[0].id(), saved.id.as_str());
    assert!(h.ctx.cache.is_stale(QueryKey::Tasks).await);

    let mirrored = mirror::load::<Task>(h.mirror.as_ref(), MirrorKey::AllTasks)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(mirrored.len(), 1);
    assert_eq!(mirrored[0].id, saved.id);
}

#[tokio::test]
async fn refetch_during_create_leaves_one_record() {
    let h = harness();
    h.hooks.tasks.list().await.unwrap();

    h.remote.hold_replies();
    let create = h.hooks.tasks.create(TaskDraft::new("Dishes", 5));
    let refetch = async {
        h.remote.entered.notified().await;
        h.ctx.cache.invalidate(QueryKey::Tasks).await;
        let listed = h.hooks.tasks.list().await.unwrap();
        assert_eq!(listed.source, ListSource::Remote);
        assert_eq!(listed.items.len(), 2);
        assert!(listed.items.iter().any(|s| s.is_pending()));
        h.remote.release();
    };
    let (outcome, ()) = tokio::join!(create, refetch);

    let saved = outcome.into_result().unwrap();
    let cached = h.ctx.cache.get::<List<Task>>(QueryKey::Tasks).await.unwrap();
    assert_eq!(ids(&cached), vec![saved.id.clone()]);
    let mirrored = mirror::load::<Task>(h.mirror.as_ref(), MirrorKey::AllTasks)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(mirrored.len(), 1);
}

#[tokio::test]
async fn failed_create_restores_the_list() {
    let h = harness();
    h.remote.seed::<Task>("t1", &TaskDraft::new("Laundry", 3));
    h.hooks.tasks.list().await.unwrap();
    let before = h.ctx.cache.get::<List<Task>>(QueryKey::Tasks).await.unwrap();

    h.remote.set_failing(true);
    let outcome = h.hooks.tasks.create(TaskDraft::new("Dishes", 5)).await;

    assert_eq!(outcome.state(), MutationState::SettledError);
    let after = h.ctx.cache.get::<List<Task>>(QueryKey::Tasks).await.unwrap();
    assert_eq!(after, before);
    let notices = h.notices.take();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Error);
    assert_eq!(notices[0].title, "Could not create task");
}

#[tokio::test]
async fn failed_update_rolls_back_the_merged_patch() {
    let h = harness();
    let mut draft = RuleDraft::new("No phones at dinner");
    draft.frequency_count = 1;
    h.remote.seed::<Rule>("r1", &draft);
    h.hooks.rules.list().await.unwrap();

    h.remote.set_failing(true);
    h.remote.hold();
    let patch = RulePatch {
        frequency_count: Some(3),
        ..Default::default()
    };
    let update = h.hooks.rules.update("r1", patch);
    let observe = async {
        h.remote.entered.notified().await;
        let cached = h.ctx.cache.get::<List<Rule>>(QueryKey::Rules).await.unwrap();
        assert_eq!(cached[0].record().frequency_count, 3);
        h.remote.release();
    };
    let (outcome, ()) = tokio::join!(update, observe);

    assert!(outcome.into_result().is_err());
    let cached = h.ctx.cache.get::<List<Rule>>(QueryKey::Rules).await.unwrap();
    assert_eq!(cached[0].record().frequency_count, 1);
    assert_eq!(h.notices.levels(), vec![NoticeLevel::Error]);
}

#[tokio::test]
async fn update_of_an_unknown_id_inserts_nothing() {
    let h = harness();
    h.remote.seed::<Task>("t1", &TaskDraft::new("Laundry", 3));
    h.hooks.tasks.list().await.unwrap();

    let patch = TaskPatch {
        points: Some(9),
        ..Default::default()
    };
    let outcome = h.hooks.tasks.update("missing", patch).await;

    assert!(outcome.into_result().unwrap_err().is_not_found());
    let cached = h.ctx.cache.get::<List<Task>>(QueryKey::Tasks).await.unwrap();
    assert_eq!(ids(&cached), vec!["t1".to_string()]);
}

#[tokio::test]
async fn failed_delete_puts_the_record_back_in_place() {
    let h = harness();
    for (id, title) in [("w1", "Movie"), ("w2", "Ice cream"), ("w3", "Late night")] {
        h.remote.seed::<Reward>(id, &RewardDraft::new(title, 10));
    }
    h.hooks.rewards.list().await.unwrap();

    h.remote.set_failing(true);
    h.remote.hold();
    let delete = h.hooks.rewards.delete("w2");
    let observe = async {
        h.remote.entered.notified().await;
        let cached = h.ctx.cache.get::<List<Reward>>(QueryKey::Rewards).await.unwrap();
        assert_eq!(ids(&cached), vec!["w1".to_string(), "w3".to_string()]);
        h.remote.release();
    };
    let (outcome, ()) = tokio::join!(delete, observe);

    assert_eq!(outcome.state(), MutationState::SettledError);
    let cached = h.ctx.cache.get::<List<Reward>>(QueryKey::Rewards).await.unwrap();
    assert_eq!(
        ids(&cached),
        vec!["w1".to_string(), "w2".to_string(), "w3".to_string()]
    );
}

#[tokio::test]
async fn deleting_a_punishment_drops_its_history() {
    let h = harness();
    h.remote.seed::<Punishment>("p1", &PunishmentDraft::new("Extra chores", 5));
    h.remote.seed::<Punishment>("p2", &PunishmentDraft::new("No dessert", 2));
    h.remote.seed_row(Table::PunishmentHistory, history("h1", "p1"));
    h.remote.seed_row(Table::PunishmentHistory, history("h2", "p2"));
    h.remote.seed_row(Table::PunishmentHistory, history("h3", "p1"));
    h.hooks.punishments.list().await.unwrap();
    h.hooks.punishments.history().await.unwrap();

    let outcome = h.hooks.punishments.delete("p1").await;

    assert_eq!(outcome.state(), MutationState::SettledSuccess);
    assert!(outcome.mirrored);
    let cached = h
        .ctx
        .cache
        .get::<List<PunishmentHistoryItem>>(QueryKey::PunishmentHistory)
        .await
        .unwrap();
    assert_eq!(ids(&cached), vec!["h2".to_string()]);
    let mirrored =
        mirror::load::<PunishmentHistoryItem>(h.mirror.as_ref(), MirrorKey::AllPunishmentHistory)
            .await
            .unwrap()
            .unwrap();
    assert_eq!(mirrored.len(), 1);
    assert_eq!(mirrored[0].punishment_id, "p2");
    let punishments =
        mirror::load::<Punishment>(h.mirror.as_ref(), MirrorKey::AllPunishments)
            .await
            .unwrap()
            .unwrap();
    assert_eq!(punishments.len(), 1);
}

#[tokio::test]
async fn history_only_in_the_mirror_is_trimmed_there() {
    let h = harness();
    h.remote.seed::<Punishment>("p1", &PunishmentDraft::new("Extra chores", 5));
    h.hooks.punishments.list().await.unwrap();
    mirror::save(
        h.mirror.as_ref(),
        MirrorKey::AllPunishmentHistory,
        &[history("h1", "p1"), history("h2", "p9")],
    )
    .await
    .unwrap();

    h.hooks.punishments.delete("p1").await.into_result().unwrap();

    let mirrored =
        mirror::load::<PunishmentHistoryItem>(h.mirror.as_ref(), MirrorKey::AllPunishmentHistory)
            .await
            .unwrap()
            .unwrap();
    assert_eq!(mirrored.len(), 1);
    assert_eq!(mirrored[0].id, "h2");
}

#[tokio::test]
async fn mirror_failure_warns_without_rollback() {
    let h = harness();
    h.hooks.tasks.list().await.unwrap();
    h.mirror.set_fail_writes(true);

    let outcome = h.hooks.tasks.create(TaskDraft::new("Dishes", 5)).await;

    assert_eq!(outcome.state(), MutationState::SettledSuccess);
    assert!(!outcome.mirrored);
    let cached = h.ctx.cache.get::<List<Task>>(QueryKey::Tasks).await.unwrap();
    assert_eq!(cached.len(), 1);
    assert!(!cached[0].is_pending());
    assert_eq!(h.notices.levels(), vec![NoticeLevel::Warning]);
}

#[tokio::test]
async fn list_falls_back_to_the_mirror_when_offline() {
    let h = harness();
    h.remote.seed::<Rule>("r1", &RuleDraft::new("Bed by ten"));
    let first = h.hooks.rules.list().await.unwrap();
    assert_eq!(first.source, ListSource::Remote);

    let calls = h.remote.calls.load(Ordering::SeqCst);
    let again = h.hooks.rules.list().await.unwrap();
    assert_eq!(again.source, ListSource::Cache);
    assert_eq!(h.remote.calls.load(Ordering::SeqCst), calls);

    h.ctx.cache.invalidate(QueryKey::Rules).await;
    h.remote.set_failing(true);
    let offline = h.hooks.rules.list().await.unwrap();
    assert_eq!(offline.source, ListSource::Mirror);
    assert_eq!(offline.records()[0].id, "r1");
    assert_eq!(h.notices.levels(), vec![NoticeLevel::Warning]);
}

#[tokio::test]
async fn list_without_any_copy_reports_an_error() {
    let h = harness();
    h.remote.set_failing(true);

    assert!(h.hooks.rewards.list().await.is_err());
    assert_eq!(h.notices.levels(), vec![NoticeLevel::Error]);
}

#[tokio::test]
async fn missing_records_read_as_defaults() {
    let h = harness();
    h.remote.seed::<Task>("t1", &TaskDraft::new("Laundry", 3));

    let known = h.hooks.tasks.get_or_default("t1").await;
    assert_eq!(known.title, "Laundry");

    let unknown = h.hooks.tasks.get_or_default("nope").await;
    assert_eq!(unknown.id, "nope");
    assert_eq!(unknown.points, 0);
    assert_eq!(unknown.frequency_count, 1);
    assert_eq!(unknown.usage_data.total(), 0);
}

#[tokio::test]
async fn completing_a_task_updates_three_lists() {
    let h = harness();
    h.remote.seed::<Task>("t1", &TaskDraft::new("Laundry", 3));
    h.remote.set_balance(10, 0);
    h.hooks.tasks.list().await.unwrap();
    h.hooks.tasks.completions().await.unwrap();

    let resp = h.hooks.tasks.complete("t1").await.unwrap();

    assert_eq!(resp.profile.points, 13);
    let tasks = h.ctx.cache.get::<List<Task>>(QueryKey::Tasks).await.unwrap();
    assert!(tasks[0].record().completed);
    let completions = h
        .ctx
        .cache
        .get::<List<TaskCompletion>>(QueryKey::TaskCompletions)
        .await
        .unwrap();
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].record().task_id, "t1");
    assert_eq!(h.hooks.profile.get().await.unwrap().points, 13);
    assert_eq!(h.notices.levels(), vec![NoticeLevel::Success]);
}

#[tokio::test]
async fn buying_with_short_supply_changes_nothing() {
    let h = harness();
    let mut draft = RewardDraft::new("Movie night", 5);
    draft.supply = 0;
    h.remote.seed::<Reward>("w1", &draft);
    h.remote.set_balance(20, 0);
    h.hooks.rewards.list().await.unwrap();

    let err = h.hooks.rewards.buy("w1").await.unwrap_err();

    assert_eq!(err.status(), Some(409));
    assert_eq!(err.user_message(), "reward is out of supply");
    assert_eq!(h.remote.balance(), (20, 0));
    let cached = h.ctx.cache.get::<List<Reward>>(QueryKey::Rewards).await.unwrap();
    assert_eq!(cached[0].record().supply, 0);
    assert_eq!(h.notices.levels(), vec![NoticeLevel::Error]);
}

#[tokio::test]
async fn dom_rewards_spend_dom_points() {
    let h = harness();
    let mut draft = RewardDraft::new("Breakfast in bed", 4);
    draft.supply = 2;
    draft.is_dom_reward = true;
    h.remote.seed::<Reward>("w1", &draft);
    h.remote.set_balance(1, 6);
    h.hooks.rewards.list().await.unwrap();

    let resp = h.hooks.rewards.buy("w1").await.unwrap();

    assert_eq!((resp.profile.points, resp.profile.dom_points), (1, 2));
    let cached = h.ctx.cache.get::<List<Reward>>(QueryKey::Rewards).await.unwrap();
    assert_eq!(cached[0].record().supply, 1);
}

#[tokio::test]
async fn applying_a_punishment_records_history_and_balance() {
    let h = harness();
    h.remote.seed::<Punishment>("p1", &PunishmentDraft::new("Extra chores", 5));
    h.remote.set_balance(10, 0);
    h.hooks.punishments.history().await.unwrap();

    let resp = h.hooks.punishments.apply("p1").await.unwrap();

    assert_eq!(resp.profile.points, 5);
    assert_eq!(resp.profile.dom_points, 3);
    let cached = h
        .ctx
        .cache
        .get::<List<PunishmentHistoryItem>>(QueryKey::PunishmentHistory)
        .await
        .unwrap();
    assert_eq!(cached[0].record().punishment_id, "p1");
    let profile = mirror::load::<questline_shared::domain::Profile>(
        h.mirror.as_ref(),
        MirrorKey::Profile,
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(profile[0].id, PROFILE);
    assert_eq!(profile[0].points, 5);
}

#[tokio::test]
async fn rule_violations_are_prepended() {
    let h = harness();
    h.remote.seed::<Rule>("r1", &RuleDraft::new("Bed by ten"));
    h.hooks.rules.list().await.unwrap();
    h.hooks.rules.violations().await.unwrap();

    h.hooks.rules.violate("r1").await.unwrap();
    h.hooks.rules.violate("r1").await.unwrap();

    let cached = h
        .ctx
        .cache
        .get::<List<RuleViolation>>(QueryKey::RuleViolations)
        .await
        .unwrap();
    assert_eq!(cached.len(), 2);
    assert_eq!(cached[0].id(), "violation-2");
    let rules = h.ctx.cache.get::<List<Rule>>(QueryKey::Rules).await.unwrap();
    assert_eq!(rules[0].record().usage_data.total(), 2);
}

#[tokio::test]
async fn profile_adjustments_go_through_the_server() {
    let h = harness();
    h.remote.set_balance(3, 3);

    let profile = h.hooks.profile.adjust(-5, 2).await.unwrap();

    assert_eq!((profile.points, profile.dom_points), (-2, 5));
    assert_eq!(h.remote.balance(), (-2, 5));
    let cached = h.hooks.profile.get().await.unwrap();
    assert_eq!(cached.points, -2);
}

#[tokio::test]
async fn violation_tally_counts_by_usage_weekday() {
    let h = harness();
    h.remote.seed::<Rule>("r1", &RuleDraft::new("Bed by ten"));
    let rows = [("v1", "r1", 0u8), ("v2", "r1", 1), ("v3", "r1", 1), ("v4", "r2", 1)];
    for (id, rule_id, day) in rows {
        h.remote.seed_row(
            Table::RuleViolations,
            RuleViolation {
                id: id.into(),
                rule_id: rule_id.into(),
                day_of_week: day,
                violation_date: now_utc(),
            },
        );
    }

    let tally = h.hooks.rules.violation_tally("r1").await.unwrap();

    // Sunday lands in the last slot, Monday in the first
    assert_eq!(tally.slots(), &[2, 0, 0, 0, 0, 0, 1]);
}
