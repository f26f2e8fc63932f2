use std::sync::Arc;

use questline_shared::domain::{
    Profile, Punishment, PunishmentHistoryItem, Record, Reward, Rule, RuleViolation, Task,
    TaskCompletion,
};
use tracing::debug;

pub mod cache;
pub mod cli;
pub mod config;
pub mod context;
pub mod hooks;
pub mod mirror;
pub mod notice;
pub mod optimistic;
pub mod query;
pub mod record;
pub mod remote;

pub use cli::{Cli, Command};
pub use config::{ClientConfig, load_config, resolve_config_path};

use cli::{ProfileCmd, PunishmentCmd, RewardCmd, RuleCmd, TaskCmd};
use context::SyncContext;
use hooks::Hooks;
use mirror::FileMirror;
use notice::LogNotices;
use query::{ListSource, Listed, QueryError};
use record::Synced;
use remote::{RemoteError, RestRemote};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Query(#[from] QueryError),
}

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

pub async fn run(cli: Cli) -> Result<(), AppError> {
    init_tracing();

    let (cfg_path, mut cfg) = ClientConfig::find_and_load(cli.config)?;
    debug!(path = ?cfg_path, "loaded config");
    if let Some(server) = &cli.server {
        cfg.server_url = config::normalize_server_url(server);
    }

    let ctx = SyncContext::new(
        Arc::new(FileMirror::new(cfg.mirror_dir()?)),
        Arc::new(LogNotices),
    )
    .with_options(cfg.query_options());
    let remote = Arc::new(RestRemote::new(cfg.server_url.clone()));
    let hooks = Hooks::new(ctx, remote.clone(), cfg.profile_id.clone());

    match cli.command {
        Command::Tasks { action } => tasks(&hooks, action).await,
        Command::Rules { action } => rules(&hooks, action).await,
        Command::Rewards { action } => rewards(&hooks, action).await,
        Command::Punishments { action } => punishments(&hooks, action).await,
        Command::Profile { action } => profile(&hooks, action).await,
        Command::Version => {
            println!("client {}", env!("CARGO_PKG_VERSION"));
            println!("server {}", remote.server_version().await?);
            Ok(())
        }
    }
}

async fn tasks(hooks: &Hooks, action: TaskCmd) -> Result<(), AppError> {
    let h = &hooks.tasks;
    match action {
        TaskCmd::List => print_list(&h.list().await?, task_line),
        TaskCmd::Show { id } => println!("{}", task_line(&h.get_or_default(&id).await)),
        TaskCmd::Add(args) => {
            let task = h.create(args.into()).await.into_result()?;
            println!("created {}", task_line(&task));
        }
        TaskCmd::Edit { id, fields } => {
            let task = h.update(&id, fields.into()).await.into_result()?;
            println!("updated {}", task_line(&task));
        }
        TaskCmd::Rm { id } => {
            h.delete(&id).await.into_result()?;
            println!("deleted {id}");
        }
        TaskCmd::Complete { id } => {
            let resp = h.complete(&id).await?;
            println!("{}", task_line(&resp.task));
            println!("{}", profile_line(&resp.profile));
        }
        TaskCmd::History { id } => {
            let listed = h.completions().await?;
            print_rows(&listed, |c: &TaskCompletion| {
                id.as_deref().is_none_or(|id| c.task_id == id)
            }, |c| {
                format!("{}\t{}\tday {}\t{}", c.id, c.task_id, c.day_of_week, c.completed_at)
            });
        }
    }
    Ok(())
}

async fn rules(hooks: &Hooks, action: RuleCmd) -> Result<(), AppError> {
    let h = &hooks.rules;
    match action {
        RuleCmd::List => print_list(&h.list().await?, rule_line),
        RuleCmd::Show { id } => println!("{}", rule_line(&h.get_or_default(&id).await)),
        RuleCmd::Add(args) => {
            let rule = h.create(args.into()).await.into_result()?;
            println!("created {}", rule_line(&rule));
        }
        RuleCmd::Edit { id, fields } => {
            let rule = h.update(&id, fields.into()).await.into_result()?;
            println!("updated {}", rule_line(&rule));
        }
        RuleCmd::Rm { id } => {
            h.delete(&id).await.into_result()?;
            println!("deleted {id}");
        }
        RuleCmd::Violate { id } => {
            let resp = h.violate(&id).await?;
            println!("{}", rule_line(&resp.rule));
        }
        RuleCmd::History { id } => {
            if let Some(rule_id) = &id {
                let tally = h.violation_tally(rule_id).await?;
                println!("{rule_id}\ttotal {}\tby weekday {:?}", tally.total(), tally.slots());
            }
            let listed = h.violations().await?;
            print_rows(&listed, |v: &RuleViolation| {
                id.as_deref().is_none_or(|id| v.rule_id == id)
            }, |v| {
                format!("{}\t{}\tday {}\t{}", v.id, v.rule_id, v.day_of_week, v.violation_date)
            });
        }
    }
    Ok(())
}

async fn rewards(hooks: &Hooks, action: RewardCmd) -> Result<(), AppError> {
    let h = &hooks.rewards;
    match action {
        RewardCmd::List => print_list(&h.list().await?, reward_line),
        RewardCmd::Show { id } => println!("{}", reward_line(&h.get_or_default(&id).await)),
        RewardCmd::Add(args) => {
            let reward = h.create(args.into()).await.into_result()?;
            println!("created {}", reward_line(&reward));
        }
        RewardCmd::Edit { id, fields } => {
            let reward = h.update(&id, fields.into()).await.into_result()?;
            println!("updated {}", reward_line(&reward));
        }
        RewardCmd::Rm { id } => {
            h.delete(&id).await.into_result()?;
            println!("deleted {id}");
        }
        RewardCmd::Buy { id } => {
            let resp = h.buy(&id).await?;
            println!("{}", reward_line(&resp.reward));
            println!("{}", profile_line(&resp.profile));
        }
    }
    Ok(())
}

async fn punishments(hooks: &Hooks, action: PunishmentCmd) -> Result<(), AppError> {
    let h = &hooks.punishments;
    match action {
        PunishmentCmd::List => print_list(&h.list().await?, punishment_line),
        PunishmentCmd::Show { id } => {
            println!("{}", punishment_line(&h.get_or_default(&id).await))
        }
        PunishmentCmd::Add(args) => {
            let p = h.create(args.into()).await.into_result()?;
            println!("created {}", punishment_line(&p));
        }
        PunishmentCmd::Edit { id, fields } => {
            let p = h.update(&id, fields.into()).await.into_result()?;
            println!("updated {}", punishment_line(&p));
        }
        PunishmentCmd::Rm { id } => {
            h.delete(&id).await.into_result()?;
            println!("deleted {id}");
        }
        PunishmentCmd::Apply { id } => {
            let resp = h.apply(&id).await?;
            println!(
                "{}\t-{} points",
                resp.history.punishment_id, resp.history.points_deducted
            );
            println!("{}", profile_line(&resp.profile));
        }
        PunishmentCmd::History { id } => {
            let listed = h.history().await?;
            print_rows(&listed, |r: &PunishmentHistoryItem| {
                id.as_deref().is_none_or(|id| r.punishment_id == id)
            }, |r| {
                format!(
                    "{}\t{}\t-{}\tday {}\t{}",
                    r.id, r.punishment_id, r.points_deducted, r.day_of_week, r.applied_date
                )
            });
        }
    }
    Ok(())
}

async fn profile(hooks: &Hooks, action: ProfileCmd) -> Result<(), AppError> {
    let h = &hooks.profile;
    let profile = match action {
        ProfileCmd::Show => h.get().await?,
        ProfileCmd::Adjust { delta, dom_delta } => h.adjust(delta, dom_delta).await?,
    };
    println!("{}", profile_line(&profile));
    Ok(())
}

fn print_list<T: Record>(listed: &Listed<T>, line: fn(&T) -> String) {
    announce_source(listed.source);
    for item in &listed.items {
        match item {
            Synced::Persisted(r) => println!("{}", line(r)),
            Synced::Pending { record, .. } => println!("{} (pending)", line(record)),
        }
    }
}

fn print_rows<T: Record>(listed: &Listed<T>, keep: impl Fn(&T) -> bool, line: impl Fn(&T) -> String) {
    announce_source(listed.source);
    for row in listed.items.iter().map(Synced::record).filter(|r| keep(r)) {
        println!("{}", line(row));
    }
}

fn announce_source(source: ListSource) {
    match source {
        ListSource::Mirror => println!("# offline: showing the last saved copy"),
        ListSource::Stale => println!("# offline: showing possibly outdated data"),
        ListSource::Cache | ListSource::Remote => {}
    }
}

fn task_line(t: &Task) -> String {
    format!(
        "{}\t{}\t{} pts\t{} x{}\t{}",
        t.id,
        t.title,
        t.points,
        t.frequency,
        t.frequency_count,
        if t.completed { "done" } else { "open" }
    )
}

fn rule_line(r: &Rule) -> String {
    format!(
        "{}\t{}\t{} x{}\tthis week {:?}",
        r.id,
        r.title,
        r.frequency,
        r.frequency_count,
        r.usage_data.slots()
    )
}

fn reward_line(r: &Reward) -> String {
    format!(
        "{}\t{}\t{} {}\tsupply {}",
        r.id,
        r.title,
        r.cost,
        if r.is_dom_reward { "dom pts" } else { "pts" },
        r.supply
    )
}

fn punishment_line(p: &Punishment) -> String {
    format!(
        "{}\t{}\t-{} pts\t+{} dom pts\tdom supply {}",
        p.id, p.title, p.points, p.dom_points, p.dom_supply
    )
}

fn profile_line(p: &Profile) -> String {
    format!("{}\tpoints {}\tdom points {}", p.id, p.points, p.dom_points)
}
