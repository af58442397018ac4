use std::error::Error;
use std::path::Path;

use clap::Args;
use cmx_core::serde::write_json_atomic;
use cmx_sweep::{
    load_config, CampaignDriver, CampaignMode, CampaignReport, DriverOpts, SweepState,
    TestCaseRegistry,
};

use super::{DefinitionArgs, REPORT_FILE};
use crate::interrupt;
use crate::shell::ShellTestbed;

#[derive(Args, Debug)]
pub struct CampaignArgs {
    /// Test case to run; also names the campaign section of the definition.
    pub test_case: String,
    #[command(flatten)]
    pub definition: DefinitionArgs,
    /// Infrastructure provider declared under `providers`.
    #[arg(long, default_value = "vagrant")]
    pub provider: String,
    /// Rebuild the environment instead of reusing it.
    #[arg(long)]
    pub force: bool,
    /// Discard the sweep ledger before running (full campaigns only).
    #[arg(long)]
    pub reset: bool,
}

pub fn run(args: &CampaignArgs, mode: CampaignMode) -> Result<(), Box<dyn Error>> {
    let config = load_config(&args.definition.conf)?;
    let registry = TestCaseRegistry::builtin();
    let test_case = registry.resolve(&args.test_case)?;
    let env_dir = args.definition.env_dir(&args.test_case);

    let mut opts = DriverOpts::new(args.provider.clone(), env_dir.clone());
    opts.force = args.force;
    if args.reset {
        if mode == CampaignMode::Full {
            SweepState::reset(&opts.sweeps_dir(), &args.test_case)?;
        } else {
            tracing::warn!("--reset has no effect on incremental campaigns");
        }
    }

    interrupt::install(opts.cancel.clone())?;
    let mut testbed = ShellTestbed::new(&config);
    let mut driver = CampaignDriver::new(&mut testbed, test_case, opts);
    let report = match mode {
        CampaignMode::Full => driver.run_full(&config, &args.test_case)?,
        CampaignMode::Incremental => driver.run_incremental(&config, &args.test_case)?,
    };
    persist_report(&env_dir, &report)?;
    Ok(())
}

fn persist_report(env_dir: &Path, report: &CampaignReport) -> Result<(), Box<dyn Error>> {
    let path = env_dir.join(REPORT_FILE);
    write_json_atomic(&path, report)?;
    tracing::info!(path = %path.display(), "campaign report written");
    Ok(())
}
