use std::error::Error;

use clap::{Parser, Subcommand};
use cmx_sweep::CampaignMode;
use commands::{
    campaign::{self, CampaignArgs},
    env::{self, DeployArgs, PrepareArgs},
    plan::{self, PlanArgs},
    status::{self, StatusArgs},
    DefinitionArgs,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod interrupt;
mod shell;

const DEFAULT_LOG_FILTER: &str = "cmx=info,cmx_sweep=info";

#[derive(Parser, Debug)]
#[command(name = "cmx", about = "Benchmark campaign runner over parameter matrices")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a checkpointed campaign, tearing down after every trial.
    Campaign(CampaignArgs),
    /// Run a campaign on one reused environment, provisioning increments only.
    Incremental(CampaignArgs),
    /// Print the ordered trials a campaign would execute.
    Plan(PlanArgs),
    /// Summarize the sweep ledger of a campaign.
    Status(StatusArgs),
    /// Provision the environment and refresh its inventory.
    Deploy(DeployArgs),
    /// Refresh the inventory of an existing environment.
    Inventory(DefinitionArgs),
    /// Configure agents for a driver.
    Prepare(PrepareArgs),
    /// Release the resources of an environment.
    Destroy(DefinitionArgs),
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Campaign(args) => campaign::run(&args, CampaignMode::Full),
        Command::Incremental(args) => campaign::run(&args, CampaignMode::Incremental),
        Command::Plan(args) => plan::run(&args),
        Command::Status(args) => status::run(&args),
        Command::Deploy(args) => env::deploy(&args),
        Command::Inventory(args) => env::inventory(&args),
        Command::Prepare(args) => env::prepare(&args),
        Command::Destroy(args) => env::destroy(&args),
    }
}
