use clap::Parser;
use std::path::PathBuf;

const HELP_EPILOG: &str = r#"Server options can also be provided via environment variables:
  CONFIG_PATH (default: ./config.yaml)
  DB_PATH     (default: data/app.db)
  PORT        (default: 5151 or config.listen_port)

Command-line flags take precedence over the environment.
"#;

#[derive(Debug, Parser)]
#[command(
    name = "questline-server",
    version,
    about = "Questline household points server",
    long_about = None,
    after_long_help = HELP_EPILOG,
)]
pub struct Cli {
    /// Path to the YAML config file
    #[arg(long, env = "CONFIG_PATH", default_value = "config.yaml")]
    pub config: PathBuf,
    /// SQLite database file
    #[arg(long, env = "DB_PATH", default_value = "data/app.db")]
    pub db: PathBuf,
    /// Listen port (overrides config.listen_port)
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,
}
