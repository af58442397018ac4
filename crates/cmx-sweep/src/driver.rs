use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use cmx_core::errors::{CampaignError, ErrorInfo};
use cmx_core::{Trial, BACKUP_DIR_FIELD, TRIAL_ID_FIELD};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ConfigurationSpace;
use crate::incremental::IncrementalAdjuster;
use crate::ordering::DRIVER_KEY;
use crate::recorder::{trial_id, ResultRecorder};
use crate::space::expand;
use crate::state::SweepState;
use crate::testbed::Testbed;
use crate::testcase::TestCase;

/// Sub-directory of an environment holding sweep ledgers.
pub const SWEEPS_DIR: &str = "sweeps";

/// Shared flag an operator raises to stop a campaign before its next trial.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates a lowered flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// True once cancellation was requested.
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How the environment is handled across trials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignMode {
    /// Prepare and tear down around every trial; progress is checkpointed.
    Full,
    /// Reuse the environment and provision only per-step increments.
    Incremental,
}

/// Options shared by both execution modes.
#[derive(Debug, Clone)]
pub struct DriverOpts {
    /// Infrastructure provider passed to the deployer.
    pub provider: String,
    /// Rebuild the environment instead of reusing it.
    pub force: bool,
    /// Environment directory owning ledgers and the campaign record.
    pub env_dir: PathBuf,
    /// Cancellation flag checked before every trial.
    pub cancel: CancelFlag,
}

impl DriverOpts {
    /// Options for `provider` rooted at `env_dir`.
    pub fn new(provider: impl Into<String>, env_dir: impl Into<PathBuf>) -> Self {
        Self {
            provider: provider.into(),
            force: false,
            env_dir: env_dir.into(),
            cancel: CancelFlag::new(),
        }
    }

    /// Directory holding the sweep ledgers of this environment.
    pub fn sweeps_dir(&self) -> PathBuf {
        self.env_dir.join(SWEEPS_DIR)
    }
}

/// Result of attempting a single trial.
#[derive(Debug, Clone, PartialEq)]
pub enum TrialOutcome {
    /// The trial ran to completion.
    Completed,
    /// The trial failed; the campaign continues with the next trial.
    Failed(CampaignError),
    /// The campaign must stop: operator interrupt or a definition problem.
    Aborted(CampaignError),
}

impl TrialOutcome {
    fn from_result(result: Result<(), CampaignError>) -> Self {
        match result {
            Ok(()) => TrialOutcome::Completed,
            Err(err) if err.is_trial_scoped() => TrialOutcome::Failed(err),
            Err(err) => TrialOutcome::Aborted(err),
        }
    }
}

/// A trial that was attempted and failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedTrial {
    /// Identifier of the failed trial.
    pub trial_id: String,
    /// Error family of the failure.
    pub family: String,
    /// Rendered error.
    pub error: String,
}

/// Outcome summary of one campaign run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignReport {
    /// Campaign (test case) name.
    pub campaign: String,
    /// Execution mode.
    pub mode: CampaignMode,
    /// RFC 3339 start time.
    pub started_at: String,
    /// RFC 3339 finish time.
    pub finished_at: String,
    /// Identifiers of trials that completed in this run.
    pub completed: Vec<String>,
    /// Trials that failed in this run.
    pub skipped: Vec<SkippedTrial>,
    /// Trials of the sweep the test case filter excludes.
    pub excluded: usize,
}

impl CampaignReport {
    fn new(campaign: &str, mode: CampaignMode) -> Self {
        Self {
            campaign: campaign.to_string(),
            mode,
            started_at: now_rfc3339(),
            finished_at: String::new(),
            completed: Vec::new(),
            skipped: Vec::new(),
            excluded: 0,
        }
    }

    fn skip(&mut self, id: &str, err: &CampaignError) {
        self.skipped.push(SkippedTrial {
            trial_id: id.to_string(),
            family: err.family().to_string(),
            error: err.to_string(),
        });
    }

    fn finish(mut self) -> Self {
        self.finished_at = now_rfc3339();
        tracing::info!(
            campaign = %self.campaign,
            mode = ?self.mode,
            completed = self.completed.len(),
            skipped = self.skipped.len(),
            excluded = self.excluded,
            "campaign finished"
        );
        for skipped in &self.skipped {
            tracing::warn!(trial_id = %skipped.trial_id, error = %skipped.error, "skipped trial");
        }
        self
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Adds the derived `trial_id` and `backup_dir` fields to a copy of `trial`.
pub fn resolve_trial(trial: &Trial) -> Trial {
    let base = trial.without_derived();
    let id = trial_id(&base);
    let mut resolved = base;
    resolved.insert(TRIAL_ID_FIELD, Value::String(id.clone()));
    resolved.insert(BACKUP_DIR_FIELD, Value::String(id));
    resolved
}

fn driver_of(trial: &Trial) -> Result<String, CampaignError> {
    match trial.get(DRIVER_KEY) {
        Some(Value::String(driver)) => Ok(driver.clone()),
        Some(other) => Ok(other.to_string()),
        None => Err(CampaignError::Configuration(ErrorInfo::new(
            "trial_missing_driver",
            "trial does not name a driver",
        ))),
    }
}

fn id_of(trial: &Trial) -> String {
    trial.get_str(TRIAL_ID_FIELD).unwrap_or_default().to_string()
}

/// Records the outcome of a full-mode trial in the record and the ledger.
///
/// Returns an error when the campaign must stop: the trial was aborted, or
/// the ledger could not be updated.
fn settle_full(
    state: &mut SweepState,
    recorder: &ResultRecorder,
    report: &mut CampaignReport,
    trial: &Trial,
    resolved: &Trial,
    outcome: TrialOutcome,
) -> Result<(), CampaignError> {
    let id = id_of(resolved);
    match outcome {
        TrialOutcome::Completed => {
            let stored = recorder.record(resolved).and_then(|()| state.done(trial));
            match stored {
                Ok(()) => {
                    tracing::info!(trial_id = %id, "trial completed");
                    report.completed.push(id);
                }
                Err(err) => {
                    tracing::error!(
                        trial_id = %id,
                        error = %err,
                        "could not store completed trial"
                    );
                    state.skip(trial)?;
                    report.skip(&id, &err);
                }
            }
            Ok(())
        }
        TrialOutcome::Failed(err) => {
            tracing::error!(
                trial_id = %id,
                family = err.family(),
                error = %err,
                "trial failed; skipping"
            );
            if let Err(record_err) = recorder.record(resolved) {
                tracing::warn!(
                    trial_id = %id,
                    error = %record_err,
                    "could not record failed trial"
                );
            }
            state.skip(trial)?;
            report.skip(&id, &err);
            Ok(())
        }
        TrialOutcome::Aborted(err) => {
            tracing::error!(trial_id = %id, error = %err, "aborting campaign");
            Err(err.with_context("trial_id", id))
        }
    }
}

/// Execution loop tying sweeps, ledgers and collaborators together.
pub struct CampaignDriver<'a, T: Testbed + ?Sized> {
    testbed: &'a mut T,
    test_case: &'a TestCase,
    opts: DriverOpts,
}

impl<'a, T: Testbed + ?Sized> CampaignDriver<'a, T> {
    /// Driver running `test_case` against `testbed`.
    pub fn new(testbed: &'a mut T, test_case: &'a TestCase, opts: DriverOpts) -> Self {
        Self {
            testbed,
            test_case,
            opts,
        }
    }

    fn check_cancel(&self) -> Result<(), CampaignError> {
        if self.opts.cancel.is_raised() {
            return Err(CampaignError::Interrupted(
                ErrorInfo::new("campaign_cancelled", "campaign cancelled by operator")
                    .with_hint("completed trials are kept in the ledger; rerun to resume"),
            ));
        }
        Ok(())
    }

    fn provision(&mut self, config: &ConfigurationSpace) -> Result<(), CampaignError> {
        tracing::info!(
            provider = %self.opts.provider,
            force = self.opts.force,
            env = %self.opts.env_dir.display(),
            "deploying environment"
        );
        self.testbed
            .deploy(&self.opts.provider, self.opts.force, config, &self.opts.env_dir)?;
        self.testbed.inventory()
    }

    /// Runs `campaign` tearing the environment down after every trial.
    ///
    /// Progress is checkpointed in the sweep ledger so a rerun with the same
    /// environment directory only executes the remaining trials.
    pub fn run_full(
        &mut self,
        config: &ConfigurationSpace,
        campaign: &str,
    ) -> Result<CampaignReport, CampaignError> {
        let spec = config.campaign(campaign)?;
        let space = spec.full_space();
        self.test_case.check_space(&space)?;
        let trials = expand(&space)?;
        let mut state = SweepState::open(&self.opts.sweeps_dir(), campaign, trials)?;
        let mut report = CampaignReport::new(campaign, CampaignMode::Full);
        report.excluded = state
            .pending()
            .iter()
            .filter(|trial| !self.test_case.constraint.admits(trial))
            .count();

        self.provision(config)?;
        let recorder = ResultRecorder::new(&self.opts.env_dir);
        let test_case = self.test_case;

        loop {
            self.check_cancel()?;
            let Some(next) = state.get_next(|pending| test_case.select(pending)) else {
                break;
            };
            let resolved = resolve_trial(&next);
            let id = id_of(&resolved);
            tracing::info!(trial_id = %id, "starting trial");

            let outcome = TrialOutcome::from_result(self.attempt_full(&resolved));
            let settled =
                settle_full(&mut state, &recorder, &mut report, &next, &resolved, outcome);
            self.teardown(&id);
            settled?;
        }

        Ok(report.finish())
    }

    fn attempt_full(&mut self, resolved: &Trial) -> Result<(), CampaignError> {
        let driver = driver_of(resolved)?;
        self.testbed.prepare(&driver, &self.opts.env_dir)?;
        self.testbed.run_trial(self.test_case.name, resolved)
    }

    fn teardown(&mut self, id: &str) {
        if let Err(err) = self.testbed.teardown() {
            tracing::warn!(trial_id = %id, error = %err, "teardown failed");
        }
    }

    /// Runs `campaign` on one environment reused across trials.
    ///
    /// Drivers are prepared only when the driver changes between consecutive
    /// trials, and each trial is rewritten into its increment over the
    /// previous candidate before it runs. Progress is not checkpointed.
    pub fn run_incremental(
        &mut self,
        config: &ConfigurationSpace,
        campaign: &str,
    ) -> Result<CampaignReport, CampaignError> {
        let spec = config.campaign(campaign)?;
        let space = spec.space(self.test_case.default_zip);
        self.test_case.check_space(&space)?;
        let trials = expand(&space)?;
        let total = trials.len();
        let selected = self.test_case.select(trials);
        let adjuster = IncrementalAdjuster::new(&space, self.test_case.adjustment)?;
        let pause = spec.pause_between()?;
        let mut report = CampaignReport::new(campaign, CampaignMode::Incremental);
        report.excluded = total - selected.len();

        tracing::warn!(
            campaign,
            trials = selected.len(),
            "incremental campaigns are not checkpointed; \
             an interrupted run restarts from the first trial"
        );
        self.provision(config)?;
        let recorder = ResultRecorder::new(&self.opts.env_dir);
        let mut prepared: Option<String> = None;

        for (idx, trial) in selected.iter().enumerate() {
            self.check_cancel()?;
            if idx > 0 {
                if let Some(pause) = pause {
                    tracing::debug!(?pause, "pausing between trials");
                    thread::sleep(pause);
                }
            }
            let mut resolved = resolve_trial(trial);
            let id = id_of(&resolved);
            tracing::info!(trial_id = %id, "starting incremental trial");

            let result = self.attempt_incremental(&mut prepared, &adjuster, &mut resolved);
            match TrialOutcome::from_result(result) {
                TrialOutcome::Completed => match recorder.record(&resolved) {
                    Ok(()) => {
                        tracing::info!(trial_id = %id, "trial completed");
                        report.completed.push(id);
                    }
                    Err(err) => {
                        tracing::error!(trial_id = %id, error = %err, "could not record trial");
                        report.skip(&id, &err);
                    }
                },
                TrialOutcome::Failed(err) => {
                    tracing::error!(
                        trial_id = %id,
                        family = err.family(),
                        error = %err,
                        "trial failed; continuing"
                    );
                    if let Err(record_err) = recorder.record(&resolved) {
                        tracing::warn!(
                            trial_id = %id,
                            error = %record_err,
                            "could not record failed trial"
                        );
                    }
                    report.skip(&id, &err);
                }
                TrialOutcome::Aborted(err) => {
                    tracing::error!(trial_id = %id, error = %err, "aborting campaign");
                    return Err(err.with_context("trial_id", id));
                }
            }
        }

        Ok(report.finish())
    }

    fn attempt_incremental(
        &mut self,
        prepared: &mut Option<String>,
        adjuster: &IncrementalAdjuster,
        resolved: &mut Trial,
    ) -> Result<(), CampaignError> {
        let driver = driver_of(resolved)?;
        if prepared.as_deref() != Some(driver.as_str()) {
            tracing::info!(driver = %driver, "preparing driver");
            self.testbed.prepare(&driver, &self.opts.env_dir)?;
            *prepared = Some(driver);
        }
        adjuster.adjust(resolved)?;
        self.testbed.run_trial(self.test_case.name, resolved)
    }
}
