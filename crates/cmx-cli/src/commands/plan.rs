use std::error::Error;

use clap::Args;
use cmx_core::serde::to_canonical_json_bytes;
use cmx_core::{Trial, TRIAL_ID_FIELD};
use cmx_sweep::{
    expand, load_config, resolve_trial, ConfigurationSpace, TestCase, TestCaseRegistry,
};

use super::DefinitionArgs;

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Test case whose campaign is expanded.
    pub test_case: String,
    #[command(flatten)]
    pub definition: DefinitionArgs,
    /// Expand the way incremental campaigns do (default zip group applied).
    #[arg(long)]
    pub incremental: bool,
    /// Print the resolved trials as JSON instead of one identifier per line.
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &PlanArgs) -> Result<(), Box<dyn Error>> {
    let config = load_config(&args.definition.conf)?;
    let registry = TestCaseRegistry::builtin();
    let test_case = registry.resolve(&args.test_case)?;
    let trials = planned_trials(&config, test_case, &args.test_case, args.incremental)?;
    if args.json {
        let bytes = to_canonical_json_bytes(&trials)?;
        println!("{}", String::from_utf8(bytes)?);
        return Ok(());
    }
    for trial in &trials {
        println!("{}", trial.get_str(TRIAL_ID_FIELD).unwrap_or_default());
    }
    Ok(())
}

fn planned_trials(
    config: &ConfigurationSpace,
    test_case: &TestCase,
    campaign: &str,
    incremental: bool,
) -> Result<Vec<Trial>, Box<dyn Error>> {
    let spec = config.campaign(campaign)?;
    let space = if incremental {
        spec.space(test_case.default_zip)
    } else {
        spec.full_space()
    };
    test_case.check_space(&space)?;
    let trials = test_case.select(expand(&space)?);
    Ok(trials.iter().map(resolve_trial).collect())
}
