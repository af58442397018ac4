//! Experiment-matrix engine: sweep expansion, ordering, checkpointed trial
//! state, incremental deltas and the campaign loop.
#![deny(missing_docs)]

/// Campaign definition loading.
pub mod config;
/// Campaign execution loop.
pub mod driver;
pub mod incremental;
/// Deterministic trial ordering and admission.
pub mod ordering;
/// Trial identifiers and the campaign record.
pub mod recorder;
/// Parameter space expansion.
pub mod space;
/// Checkpointed trial ledger.
pub mod state;
/// External collaborator contract.
pub mod testbed;
/// Test case variants and their registry.
pub mod testcase;

pub use config::{load_config, CampaignSpec, CommandSpec, ConfigurationSpace, HookSpec};
pub use driver::{
    resolve_trial, CampaignDriver, CampaignMode, CampaignReport, CancelFlag, DriverOpts,
    SkippedTrial, TrialOutcome, SWEEPS_DIR,
};
pub use incremental::{previous_and_current, IncrementalAdjuster, TOPICS_FIELD};
pub use ordering::{filter, sort, topics, Constraint};
pub use recorder::{trial_id, ResultRecorder, RECORD_FILE};
pub use space::{expand, ParameterSpace};
pub use state::{LedgerSummary, SweepState, TrialStatus};
pub use testbed::Testbed;
pub use testcase::{Adjustment, TestCase, TestCaseRegistry};
