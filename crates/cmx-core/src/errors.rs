//! Structured error types shared across cmx crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`CampaignError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (trial ids, paths, drivers, etc.).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the operator resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

/// Canonical error type for campaign execution.
///
/// Environment, execution and persistence failures raised while a single trial
/// is being processed are scoped to that trial. Configuration errors and
/// interrupts terminate the campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum CampaignError {
    /// Missing or malformed campaign and parameter definitions.
    #[error("configuration error: {0}")]
    Configuration(ErrorInfo),
    /// Provisioning or preparation failures.
    #[error("environment error: {0}")]
    Environment(ErrorInfo),
    /// Trial run failures.
    #[error("execution error: {0}")]
    Execution(ErrorInfo),
    /// Ledger or record file I/O failures.
    #[error("persistence error: {0}")]
    Persistence(ErrorInfo),
    /// Operator cancellation.
    #[error("interrupted: {0}")]
    Interrupted(ErrorInfo),
}

impl CampaignError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            CampaignError::Configuration(info)
            | CampaignError::Environment(info)
            | CampaignError::Execution(info)
            | CampaignError::Persistence(info)
            | CampaignError::Interrupted(info) => info,
        }
    }

    /// Short family label used in logs and reports.
    pub fn family(&self) -> &'static str {
        match self {
            CampaignError::Configuration(_) => "configuration",
            CampaignError::Environment(_) => "environment",
            CampaignError::Execution(_) => "execution",
            CampaignError::Persistence(_) => "persistence",
            CampaignError::Interrupted(_) => "interrupted",
        }
    }

    /// True when the error only invalidates the trial being processed.
    pub fn is_trial_scoped(&self) -> bool {
        matches!(
            self,
            CampaignError::Environment(_)
                | CampaignError::Execution(_)
                | CampaignError::Persistence(_)
        )
    }

    /// Adds a context entry to the wrapped payload.
    pub fn with_context(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        match self {
            CampaignError::Configuration(info) => {
                CampaignError::Configuration(info.with_context(key, value))
            }
            CampaignError::Environment(info) => {
                CampaignError::Environment(info.with_context(key, value))
            }
            CampaignError::Execution(info) => {
                CampaignError::Execution(info.with_context(key, value))
            }
            CampaignError::Persistence(info) => {
                CampaignError::Persistence(info.with_context(key, value))
            }
            CampaignError::Interrupted(info) => {
                CampaignError::Interrupted(info.with_context(key, value))
            }
        }
    }
}

/// Wraps an I/O style failure as a [`CampaignError::Persistence`] error.
pub fn persistence_error(code: &str, err: impl ToString) -> CampaignError {
    CampaignError::Persistence(ErrorInfo::new(code, err.to_string()))
}
