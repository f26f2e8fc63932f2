use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use questline_shared::domain::{
    Frequency, Priority, PunishmentDraft, PunishmentPatch, RewardDraft, RewardPatch, RuleDraft,
    RulePatch, TaskDraft, TaskPatch,
};

const HELP_EPILOG: &str = r#"Config resolution order:
  1) --config/-c PATH
  2) $QUESTLINE_CONFIG
  3) XDG default: ~/.config/questline/client.yaml
"#;

#[derive(Debug, Parser)]
#[command(
    name = "questline",
    version,
    about = "Household quests, rules and rewards from the command line",
    long_about = None,
    after_long_help = HELP_EPILOG,
)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Server URL, overrides the config (e.g. http://127.0.0.1:5151)
    #[arg(long)]
    pub server: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Recurring tasks that earn points
    Tasks {
        #[command(subcommand)]
        action: TaskCmd,
    },
    /// House rules and their violations
    Rules {
        #[command(subcommand)]
        action: RuleCmd,
    },
    /// Rewards bought with points
    Rewards {
        #[command(subcommand)]
        action: RewardCmd,
    },
    /// Punishments that deduct points
    Punishments {
        #[command(subcommand)]
        action: PunishmentCmd,
    },
    /// Point balances
    Profile {
        #[command(subcommand)]
        action: ProfileCmd,
    },
    /// Client and server versions
    Version,
}

#[derive(Debug, Subcommand)]
pub enum TaskCmd {
    List,
    Show { id: String },
    Add(TaskArgs),
    Edit {
        id: String,
        #[command(flatten)]
        fields: TaskEditArgs,
    },
    Rm { id: String },
    /// Mark the task done for this period and earn its points
    Complete { id: String },
    /// Completion history, optionally for one task
    History { id: Option<String> },
}

#[derive(Debug, Subcommand)]
pub enum RuleCmd {
    List,
    Show { id: String },
    Add(RuleArgs),
    Edit {
        id: String,
        #[command(flatten)]
        fields: RuleEditArgs,
    },
    Rm { id: String },
    /// Record a violation today
    Violate { id: String },
    History { id: Option<String> },
}

#[derive(Debug, Subcommand)]
pub enum RewardCmd {
    List,
    Show { id: String },
    Add(RewardArgs),
    Edit {
        id: String,
        #[command(flatten)]
        fields: RewardEditArgs,
    },
    Rm { id: String },
    /// Spend points on one unit of the reward
    Buy { id: String },
}

#[derive(Debug, Subcommand)]
pub enum PunishmentCmd {
    List,
    Show { id: String },
    Add(PunishmentArgs),
    Edit {
        id: String,
        #[command(flatten)]
        fields: PunishmentEditArgs,
    },
    Rm { id: String },
    /// Deduct the punishment's points now
    Apply { id: String },
    History { id: Option<String> },
}

#[derive(Debug, Subcommand)]
pub enum ProfileCmd {
    Show,
    /// Add (or with negative values, remove) points
    Adjust {
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        delta: i32,
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        dom_delta: i32,
    },
}

#[derive(Debug, Args)]
pub struct TaskArgs {
    #[arg(long)]
    pub title: String,
    #[arg(long, default_value_t = 0)]
    pub points: i32,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long, default_value_t = Priority::Medium)]
    pub priority: Priority,
    #[arg(long, default_value_t = Frequency::Daily)]
    pub frequency: Frequency,
    /// Completions allowed per period
    #[arg(long, default_value_t = 1)]
    pub count: i32,
}

impl From<TaskArgs> for TaskDraft {
    fn from(a: TaskArgs) -> Self {
        TaskDraft {
            description: a.description,
            priority: a.priority,
            frequency: a.frequency,
            frequency_count: a.count,
            ..TaskDraft::new(a.title, a.points)
        }
    }
}

#[derive(Debug, Args)]
pub struct TaskEditArgs {
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub points: Option<i32>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub priority: Option<Priority>,
    #[arg(long)]
    pub frequency: Option<Frequency>,
    #[arg(long)]
    pub count: Option<i32>,
    #[arg(long)]
    pub completed: Option<bool>,
}

impl From<TaskEditArgs> for TaskPatch {
    fn from(a: TaskEditArgs) -> Self {
        TaskPatch {
            title: a.title,
            description: a.description,
            points: a.points,
            priority: a.priority,
            frequency: a.frequency,
            frequency_count: a.count,
            completed: a.completed,
            ..Default::default()
        }
    }
}

#[derive(Debug, Args)]
pub struct RuleArgs {
    #[arg(long)]
    pub title: String,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long, default_value_t = Priority::Medium)]
    pub priority: Priority,
    #[arg(long, default_value_t = Frequency::Daily)]
    pub frequency: Frequency,
    #[arg(long, default_value_t = 1)]
    pub count: i32,
}

impl From<RuleArgs> for RuleDraft {
    fn from(a: RuleArgs) -> Self {
        RuleDraft {
            description: a.description,
            priority: a.priority,
            frequency: a.frequency,
            frequency_count: a.count,
            ..RuleDraft::new(a.title)
        }
    }
}

#[derive(Debug, Args)]
pub struct RuleEditArgs {
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub priority: Option<Priority>,
    #[arg(long)]
    pub frequency: Option<Frequency>,
    #[arg(long)]
    pub count: Option<i32>,
}

impl From<RuleEditArgs> for RulePatch {
    fn from(a: RuleEditArgs) -> Self {
        RulePatch {
            title: a.title,
            description: a.description,
            priority: a.priority,
            frequency: a.frequency,
            frequency_count: a.count,
            ..Default::default()
        }
    }
}

#[derive(Debug, Args)]
pub struct RewardArgs {
    #[arg(long)]
    pub title: String,
    #[arg(long)]
    pub cost: i32,
    #[arg(long, default_value_t = 1)]
    pub supply: i32,
    #[arg(long)]
    pub description: Option<String>,
    /// Paid from dom points
    #[arg(long)]
    pub dom: bool,
}

impl From<RewardArgs> for RewardDraft {
    fn from(a: RewardArgs) -> Self {
        RewardDraft {
            description: a.description,
            supply: a.supply,
            is_dom_reward: a.dom,
            ..RewardDraft::new(a.title, a.cost)
        }
    }
}

#[derive(Debug, Args)]
pub struct RewardEditArgs {
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub cost: Option<i32>,
    #[arg(long)]
    pub supply: Option<i32>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub dom: Option<bool>,
}

impl From<RewardEditArgs> for RewardPatch {
    fn from(a: RewardEditArgs) -> Self {
        RewardPatch {
            title: a.title,
            description: a.description,
            cost: a.cost,
            supply: a.supply,
            is_dom_reward: a.dom,
            ..Default::default()
        }
    }
}

#[derive(Debug, Args)]
pub struct PunishmentArgs {
    #[arg(long)]
    pub title: String,
    #[arg(long)]
    pub points: i32,
    /// Defaults to half of --points, rounded up
    #[arg(long)]
    pub dom_points: Option<i32>,
    #[arg(long, default_value_t = 0)]
    pub dom_supply: i32,
    #[arg(long)]
    pub description: Option<String>,
}

impl From<PunishmentArgs> for PunishmentDraft {
    fn from(a: PunishmentArgs) -> Self {
        let base = PunishmentDraft::new(a.title, a.points);
        PunishmentDraft {
            description: a.description,
            dom_points: a.dom_points.unwrap_or(base.dom_points),
            dom_supply: a.dom_supply,
            ..base
        }
    }
}

#[derive(Debug, Args)]
pub struct PunishmentEditArgs {
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub points: Option<i32>,
    #[arg(long)]
    pub dom_points: Option<i32>,
    #[arg(long)]
    pub dom_supply: Option<i32>,
    #[arg(long)]
    pub description: Option<String>,
}

impl From<PunishmentEditArgs> for PunishmentPatch {
    fn from(a: PunishmentEditArgs) -> Self {
        PunishmentPatch {
            title: a.title,
            description: a.description,
            points: a.points,
            dom_points: a.dom_points,
            dom_supply: a.dom_supply,
            ..Default::default()
        }
    }
}
