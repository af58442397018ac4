use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use cmx_core::errors::{CampaignError, ErrorInfo};
use cmx_core::serde::from_yaml_slice;
use cmx_core::Trial;
use cmx_sweep::{
    CampaignDriver, CancelFlag, ConfigurationSpace, DriverOpts, ResultRecorder, SweepState,
    TestCaseRegistry, Testbed, TrialStatus, SWEEPS_DIR,
};

const DEFINITION: &str = r#"
providers:
  vagrant: ["true"]
campaign:
  test_case_1:
    driver: [rabbitmq]
    call_type: [rpc-call]
    nbr_clients: [1, 2]
    nbr_servers: [1, 2]
  test_case_2:
    driver: [rabbitmq]
    call_type: [rpc-cast]
  incremental:
    driver: [rabbitmq, qpidd]
    call_type: [rpc-call]
    nbr_clients: [10, 20, 30]
    nbr_servers: [5, 10, 30]
    pause: [0, 0, 0]
  paced:
    driver: [rabbitmq]
    call_type: [rpc-call]
    nbr_clients: [10, 20, 30]
    nbr_servers: [5, 10, 30]
    pause_between_secs: 0.3
"#;

fn config() -> ConfigurationSpace {
    from_yaml_slice(DEFINITION.as_bytes()).expect("definition")
}

#[derive(Default)]
struct FakeTestbed {
    calls: Vec<String>,
    runs: Vec<Trial>,
    fail_on: Option<(u64, u64)>,
    interrupt_on: Option<(u64, u64)>,
    cancel_on: Option<((u64, u64), CancelFlag)>,
    block_ledger: Option<PathBuf>,
    run_times: Vec<Instant>,
}

impl FakeTestbed {
    fn count(&self, call: &str) -> usize {
        self.calls.iter().filter(|c| c.starts_with(call)).count()
    }
}

fn pair(trial: &Trial) -> (u64, u64) {
    (
        trial.get_u64("nbr_clients").unwrap_or_default(),
        trial.get_u64("nbr_servers").unwrap_or_default(),
    )
}

impl Testbed for FakeTestbed {
    fn deploy(
        &mut self,
        provider: &str,
        _force: bool,
        _config: &ConfigurationSpace,
        _env: &Path,
    ) -> Result<(), CampaignError> {
        self.calls.push(format!("deploy:{provider}"));
        Ok(())
    }

    fn inventory(&mut self) -> Result<(), CampaignError> {
        self.calls.push("inventory".to_string());
        Ok(())
    }

    fn prepare(&mut self, driver: &str, _env: &Path) -> Result<(), CampaignError> {
        self.calls.push(format!("prepare:{driver}"));
        Ok(())
    }

    fn run_trial(&mut self, test_case: &str, trial: &Trial) -> Result<(), CampaignError> {
        self.calls.push(format!("run:{test_case}"));
        self.runs.push(trial.clone());
        self.run_times.push(Instant::now());
        if let Some(blocker) = &self.block_ledger {
            fs::create_dir_all(blocker).expect("block ledger");
        }
        if let Some((at, cancel)) = &self.cancel_on {
            if *at == pair(trial) {
                cancel.raise();
            }
        }
        if self.interrupt_on == Some(pair(trial)) {
            return Err(CampaignError::Interrupted(ErrorInfo::new(
                "run_interrupted",
                "operator pressed ctrl-c",
            )));
        }
        if self.fail_on == Some(pair(trial)) {
            return Err(CampaignError::Execution(ErrorInfo::new(
                "run_failed",
                "benchmark exited with status 1",
            )));
        }
        Ok(())
    }

    fn teardown(&mut self) -> Result<(), CampaignError> {
        self.calls.push("teardown".to_string());
        Ok(())
    }
}

#[test]
fn failed_trial_is_skipped_and_the_campaign_continues() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let registry = TestCaseRegistry::builtin();
    let case = registry.resolve("test_case_1").expect("tc1");
    let mut testbed = FakeTestbed {
        fail_on: Some((2, 1)),
        ..FakeTestbed::default()
    };

    let report = CampaignDriver::new(&mut testbed, case, DriverOpts::new("vagrant", temp.path()))
        .run_full(&config(), "test_case_1")
        .expect("campaign");

    assert_eq!(report.completed.len(), 2);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].family, "execution");
    assert_eq!(report.excluded, 1);
    let order: Vec<(u64, u64)> = testbed.runs.iter().map(pair).collect();
    assert_eq!(order, vec![(1, 1), (2, 1), (2, 2)]);
    assert_eq!(testbed.count("deploy"), 1);
    assert_eq!(testbed.count("prepare"), 3);
    assert_eq!(testbed.count("teardown"), 3);

    let recorded = ResultRecorder::new(temp.path()).load().expect("record");
    assert_eq!(recorded.len(), 3);
    assert!(recorded
        .iter()
        .all(|trial| trial.get_str("trial_id") == trial.get_str("backup_dir")));

    let ledger = SweepState::load(&temp.path().join(SWEEPS_DIR), "test_case_1").expect("ledger");
    let summary = ledger.summary();
    assert_eq!((summary.done, summary.skipped, summary.pending), (2, 1, 1));
}

#[test]
fn rerun_after_completion_runs_nothing() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let registry = TestCaseRegistry::builtin();
    let case = registry.resolve("test_case_1").expect("tc1");
    let mut first = FakeTestbed::default();
    CampaignDriver::new(&mut first, case, DriverOpts::new("vagrant", temp.path()))
        .run_full(&config(), "test_case_1")
        .expect("first run");

    let mut second = FakeTestbed::default();
    let report = CampaignDriver::new(&mut second, case, DriverOpts::new("vagrant", temp.path()))
        .run_full(&config(), "test_case_1")
        .expect("second run");
    assert!(report.completed.is_empty());
    assert!(second.runs.is_empty());
}

#[test]
fn interrupt_aborts_and_leaves_the_trial_pending() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let registry = TestCaseRegistry::builtin();
    let case = registry.resolve("test_case_1").expect("tc1");
    let mut testbed = FakeTestbed {
        interrupt_on: Some((2, 1)),
        ..FakeTestbed::default()
    };

    let err = CampaignDriver::new(&mut testbed, case, DriverOpts::new("vagrant", temp.path()))
        .run_full(&config(), "test_case_1")
        .expect_err("interrupted");
    assert!(matches!(
        err,
        CampaignError::Interrupted(ref info) if info.context.contains_key("trial_id")
    ));
    assert_eq!(testbed.runs.len(), 2);
    assert_eq!(testbed.count("teardown"), 2);

    let mut resumed = FakeTestbed::default();
    let report = CampaignDriver::new(&mut resumed, case, DriverOpts::new("vagrant", temp.path()))
        .run_full(&config(), "test_case_1")
        .expect("resume");
    let order: Vec<(u64, u64)> = resumed.runs.iter().map(pair).collect();
    assert_eq!(order, vec![(2, 1), (2, 2)]);
    assert_eq!(report.completed.len(), 2);

    let ledger = SweepState::load(&temp.path().join(SWEEPS_DIR), "test_case_1").expect("ledger");
    let interrupted = resumed.runs[0].without_derived();
    assert_eq!(ledger.status(&interrupted), Some(TrialStatus::Done));
}

#[test]
fn raised_cancel_flag_stops_before_the_first_trial() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let registry = TestCaseRegistry::builtin();
    let case = registry.resolve("test_case_1").expect("tc1");
    let opts = DriverOpts::new("vagrant", temp.path());
    opts.cancel.raise();
    let mut testbed = FakeTestbed::default();

    let err = CampaignDriver::new(&mut testbed, case, opts)
        .run_full(&config(), "test_case_1")
        .expect_err("cancelled");
    assert!(matches!(err, CampaignError::Interrupted(_)));
    assert!(testbed.runs.is_empty());
}

#[test]
fn definition_problems_fail_before_deploy() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let registry = TestCaseRegistry::builtin();

    let tc1 = registry.resolve("test_case_1").expect("tc1");
    let mut testbed = FakeTestbed::default();
    let err = CampaignDriver::new(&mut testbed, tc1, DriverOpts::new("vagrant", temp.path()))
        .run_full(&config(), "test_case_9")
        .expect_err("unknown campaign");
    assert!(matches!(err, CampaignError::Configuration(_)));

    let tc2 = registry.resolve("test_case_2").expect("tc2");
    let err = CampaignDriver::new(&mut testbed, tc2, DriverOpts::new("vagrant", temp.path()))
        .run_full(&config(), "test_case_2")
        .expect_err("missing parameters");
    assert!(matches!(
        err,
        CampaignError::Configuration(ref info) if info.code == "test_case_missing_parameters"
    ));
    assert!(testbed.calls.is_empty());
}

#[test]
fn incremental_prepares_once_per_driver_and_runs_deltas() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let registry = TestCaseRegistry::builtin();
    let case = registry.resolve("test_case_1").expect("tc1");
    let mut testbed = FakeTestbed::default();

    let report = CampaignDriver::new(&mut testbed, case, DriverOpts::new("vagrant", temp.path()))
        .run_incremental(&config(), "incremental")
        .expect("incremental");

    assert_eq!(report.completed.len(), 6);
    let prepares: Vec<&str> = testbed
        .calls
        .iter()
        .filter(|call| call.starts_with("prepare"))
        .map(String::as_str)
        .collect();
    assert_eq!(prepares, vec!["prepare:qpidd", "prepare:rabbitmq"]);
    assert_eq!(testbed.count("teardown"), 0);

    let deltas: Vec<(u64, u64)> = testbed.runs.iter().take(3).map(pair).collect();
    assert_eq!(deltas, vec![(10, 5), (10, 5), (10, 20)]);
    assert!(!temp.path().join(SWEEPS_DIR).exists());
}

#[test]
fn unwritable_ledger_aborts_after_teardown() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let registry = TestCaseRegistry::builtin();
    let case = registry.resolve("test_case_1").expect("tc1");
    let blocker = temp
        .path()
        .join(SWEEPS_DIR)
        .join("test_case_1")
        .join("ledger.tmp");
    let mut testbed = FakeTestbed {
        fail_on: Some((1, 1)),
        block_ledger: Some(blocker),
        ..FakeTestbed::default()
    };

    let err = CampaignDriver::new(&mut testbed, case, DriverOpts::new("vagrant", temp.path()))
        .run_full(&config(), "test_case_1")
        .expect_err("ledger cannot be written");
    assert!(matches!(err, CampaignError::Persistence(_)));
    assert_eq!(testbed.runs.len(), 1);
    assert_eq!(testbed.count("teardown"), 1);
}

#[test]
fn cancel_raised_mid_trial_stops_after_its_teardown() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let registry = TestCaseRegistry::builtin();
    let case = registry.resolve("test_case_1").expect("tc1");
    let opts = DriverOpts::new("vagrant", temp.path());
    let mut testbed = FakeTestbed {
        cancel_on: Some(((1, 1), opts.cancel.clone())),
        ..FakeTestbed::default()
    };

    let err = CampaignDriver::new(&mut testbed, case, opts)
        .run_full(&config(), "test_case_1")
        .expect_err("cancelled");
    assert!(matches!(
        err,
        CampaignError::Interrupted(ref info) if info.code == "campaign_cancelled"
    ));
    assert_eq!(testbed.runs.len(), 1);
    assert_eq!(testbed.count("teardown"), 1);

    let ledger = SweepState::load(&temp.path().join(SWEEPS_DIR), "test_case_1").expect("ledger");
    assert_eq!(ledger.summary().done, 1);
}

#[test]
fn incremental_failure_is_skipped_and_later_drivers_run() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let registry = TestCaseRegistry::builtin();
    let case = registry.resolve("test_case_1").expect("tc1");
    let mut testbed = FakeTestbed {
        fail_on: Some((10, 20)),
        ..FakeTestbed::default()
    };

    let report = CampaignDriver::new(&mut testbed, case, DriverOpts::new("vagrant", temp.path()))
        .run_incremental(&config(), "incremental")
        .expect("incremental");

    assert_eq!(testbed.runs.len(), 6);
    assert_eq!(report.completed.len(), 4);
    assert_eq!(report.skipped.len(), 2);
    assert!(report.skipped.iter().all(|skipped| skipped.family == "execution"));
    assert!(report.skipped[0].trial_id.contains("driver__qpidd"));
    assert!(report.skipped[1].trial_id.contains("driver__rabbitmq"));
    assert_eq!(testbed.runs[3].get_str("driver"), Some("rabbitmq"));

    let recorded = ResultRecorder::new(temp.path()).load().expect("record");
    assert_eq!(recorded.len(), 6);
}

#[test]
fn incremental_interrupt_aborts_the_campaign() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let registry = TestCaseRegistry::builtin();
    let case = registry.resolve("test_case_1").expect("tc1");
    let mut testbed = FakeTestbed {
        interrupt_on: Some((10, 20)),
        ..FakeTestbed::default()
    };

    let err = CampaignDriver::new(&mut testbed, case, DriverOpts::new("vagrant", temp.path()))
        .run_incremental(&config(), "incremental")
        .expect_err("interrupted");
    assert!(matches!(
        err,
        CampaignError::Interrupted(ref info) if info.context.contains_key("trial_id")
    ));
    assert_eq!(testbed.runs.len(), 3);
    assert_eq!(testbed.count("prepare:rabbitmq"), 0);
    assert_eq!(ResultRecorder::new(temp.path()).load().expect("record").len(), 2);
}

#[test]
fn incremental_pause_only_separates_trials() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let registry = TestCaseRegistry::builtin();
    let case = registry.resolve("test_case_1").expect("tc1");
    let pause = Duration::from_millis(300);
    let mut testbed = FakeTestbed::default();

    let started = Instant::now();
    let report = CampaignDriver::new(&mut testbed, case, DriverOpts::new("vagrant", temp.path()))
        .run_incremental(&config(), "paced")
        .expect("incremental");

    assert_eq!(report.completed.len(), 3);
    assert_eq!(testbed.run_times.len(), 3);
    assert!(testbed.run_times[0].duration_since(started) < pause);
    for gap in testbed.run_times.windows(2) {
        assert!(gap[1].duration_since(gap[0]) >= pause);
    }
}
