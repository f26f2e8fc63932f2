use clap::Parser;
use questline_client::{Cli, run};

#[tokio::main]
async fn main() -> Result<(), questline_client::AppError> {
    run(Cli::parse()).await
}
