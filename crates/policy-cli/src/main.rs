//! Policy Store CLI - Main Entry Point

use clap::Parser;
use policy_cli::{run, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    run(Cli::parse()).await
}
