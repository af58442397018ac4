use std::error::Error;

use clap::Args;
use cmx_sweep::{load_config, Testbed};

use super::DefinitionArgs;
use crate::shell::ShellTestbed;

const DEFAULT_ENV: &str = ".";

#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Driver to prepare once the environment is up.
    pub driver: Option<String>,
    #[command(flatten)]
    pub definition: DefinitionArgs,
    /// Infrastructure provider declared under `providers`.
    #[arg(long, default_value = "vagrant")]
    pub provider: String,
    /// Rebuild the environment instead of reusing it.
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct PrepareArgs {
    /// Driver whose agents are configured.
    pub driver: String,
    #[command(flatten)]
    pub definition: DefinitionArgs,
}

/// Provisions the environment, refreshes the inventory and optionally
/// prepares a driver.
pub fn deploy(args: &DeployArgs) -> Result<(), Box<dyn Error>> {
    let config = load_config(&args.definition.conf)?;
    let env_dir = args.definition.env_dir(DEFAULT_ENV);
    let mut testbed = ShellTestbed::new(&config);
    testbed.deploy(&args.provider, args.force, &config, &env_dir)?;
    testbed.inventory()?;
    if let Some(driver) = &args.driver {
        testbed.prepare(driver, &env_dir)?;
    }
    tracing::info!(provider = %args.provider, env = %env_dir.display(), "environment ready");
    Ok(())
}

pub fn inventory(args: &DefinitionArgs) -> Result<(), Box<dyn Error>> {
    let config = load_config(&args.conf)?;
    let env_dir = args.env_dir(DEFAULT_ENV);
    ShellTestbed::attached(&config, &env_dir).inventory()?;
    Ok(())
}

pub fn prepare(args: &PrepareArgs) -> Result<(), Box<dyn Error>> {
    let config = load_config(&args.definition.conf)?;
    let env_dir = args.definition.env_dir(DEFAULT_ENV);
    ShellTestbed::attached(&config, &env_dir).prepare(&args.driver, &env_dir)?;
    Ok(())
}

/// Runs the teardown hook against an existing environment.
pub fn destroy(args: &DefinitionArgs) -> Result<(), Box<dyn Error>> {
    let config = load_config(&args.conf)?;
    let env_dir = args.env_dir(DEFAULT_ENV);
    ShellTestbed::attached(&config, &env_dir).teardown()?;
    tracing::info!(env = %env_dir.display(), "environment torn down");
    Ok(())
}
