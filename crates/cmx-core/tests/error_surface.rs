use cmx_core::errors::{CampaignError, ErrorInfo};

fn sample_info(code: &str, message: &str) -> ErrorInfo {
    ErrorInfo::new(code, message)
        .with_context("trial_id", "driver__rabbitmq")
        .with_context("reason", "example")
}

#[test]
fn configuration_error_is_fatal() {
    let err = CampaignError::Configuration(sample_info("C001", "unknown test case"));
    assert_eq!(err.info().code, "C001");
    assert!(!err.is_trial_scoped());
    assert_eq!(err.family(), "configuration");
}

#[test]
fn environment_error_is_trial_scoped() {
    let err = CampaignError::Environment(sample_info("E001", "prepare failed"));
    assert!(err.is_trial_scoped());
    assert!(err.info().context.contains_key("trial_id"));
}

#[test]
fn execution_error_is_trial_scoped() {
    let err = CampaignError::Execution(sample_info("X001", "workload exited 1"));
    assert!(err.is_trial_scoped());
}

#[test]
fn persistence_error_is_trial_scoped() {
    let err = CampaignError::Persistence(sample_info("P001", "disk full"));
    assert!(err.is_trial_scoped());
}

#[test]
fn interrupt_is_not_trial_scoped() {
    let err = CampaignError::Interrupted(sample_info("I001", "operator cancelled"));
    assert!(!err.is_trial_scoped());
    assert_eq!(err.family(), "interrupted");
}

#[test]
fn display_includes_context_and_hint() {
    let err = CampaignError::Persistence(
        ErrorInfo::new("ledger_write", "rename failed")
            .with_context("path", "/tmp/ledger.json")
            .with_hint("check free space"),
    );
    let text = err.to_string();
    assert!(text.starts_with("persistence error: rename failed (code: ledger_write)"));
    assert!(text.contains("path=/tmp/ledger.json"));
    assert!(text.contains("hint: check free space"));
}

#[test]
fn serde_roundtrip_keeps_family() {
    let err = CampaignError::Execution(sample_info("X002", "timeout"))
        .with_context("driver", "qpidd");
    let json = serde_json::to_string(&err).expect("encode");
    assert!(json.contains("\"family\":\"Execution\""));
    let back: CampaignError = serde_json::from_str(&json).expect("decode");
    assert_eq!(back, err);
}
