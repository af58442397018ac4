use std::error::Error;
use std::path::{Path, PathBuf};

use clap::Args;
use cmx_core::serde::to_canonical_json_bytes;
use cmx_sweep::{trial_id, ResultRecorder, SweepState, TrialStatus, SWEEPS_DIR};
use serde::Serialize;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Campaign whose ledger is inspected.
    pub test_case: String,
    /// Environment directory; defaults to the test case name.
    #[arg(long)]
    pub env: Option<PathBuf>,
    /// List the identifiers of pending trials.
    #[arg(long)]
    pub pending: bool,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    campaign: String,
    ledger: String,
    pending: usize,
    done: usize,
    skipped: usize,
    recorded: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pending_ids: Vec<String>,
}

pub fn run(args: &StatusArgs) -> Result<(), Box<dyn Error>> {
    let env_dir = args
        .env
        .clone()
        .unwrap_or_else(|| args.test_case.clone().into());
    let report = gather(&env_dir, &args.test_case, args.pending)?;
    let bytes = to_canonical_json_bytes(&report)?;
    println!("{}", String::from_utf8(bytes)?);
    Ok(())
}

fn gather(
    env_dir: &Path,
    campaign: &str,
    list_pending: bool,
) -> Result<StatusReport, Box<dyn Error>> {
    let state = SweepState::load(&env_dir.join(SWEEPS_DIR), campaign)?;
    let summary = state.summary();
    let recorded = ResultRecorder::new(env_dir).load()?.len();
    let pending_ids = if list_pending {
        state
            .with_status(TrialStatus::Pending)
            .iter()
            .map(trial_id)
            .collect()
    } else {
        Vec::new()
    };
    Ok(StatusReport {
        campaign: campaign.to_string(),
        ledger: state.path().display().to_string(),
        pending: summary.pending,
        done: summary.done,
        skipped: summary.skipped,
        recorded,
        pending_ids,
    })
}
