use cmx_core::errors::{CampaignError, ErrorInfo};
use cmx_core::Trial;
use serde::Serialize;

use crate::ordering::{
    self, Constraint, CALL_TYPE_KEY, CLIENTS_KEY, DRIVER_KEY, SERVERS_KEY, TOPICS_KEY,
};
use crate::space::ParameterSpace;

/// Incremental adjustment applied to trials of a reused environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Adjustment {
    /// Replace each listed count with its increment over the previous candidate.
    NumericDelta {
        /// Keys whose values become deltas.
        keys: &'static [&'static str],
    },
    /// Bind `topics` to the names added since the previous candidate of `key`.
    TopicSlice {
        /// Key holding the cumulative topic count.
        key: &'static str,
    },
}

/// One benchmark scenario: how its trials are ordered, admitted and adjusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCase {
    /// Name used in campaign definitions and passed to the trial runner.
    pub name: &'static str,
    /// Tertiary sort key after driver and call type.
    pub group_key: &'static str,
    /// Admission predicate.
    pub constraint: Constraint,
    /// Adjustment applied in incremental campaigns.
    pub adjustment: Adjustment,
    /// Zip group used by incremental campaigns when the definition declares none.
    pub default_zip: &'static [&'static str],
}

impl TestCase {
    /// Sorts then filters `trials` according to this test case.
    pub fn select(&self, trials: Vec<Trial>) -> Vec<Trial> {
        ordering::filter(ordering::sort(trials, self.group_key), self.constraint)
    }

    /// Parameter names this test case reads.
    pub fn required_keys(&self) -> Vec<&'static str> {
        let mut keys = vec![DRIVER_KEY, CALL_TYPE_KEY, self.group_key];
        if self.constraint != Constraint::Unconstrained {
            keys.extend([CLIENTS_KEY, SERVERS_KEY]);
        }
        match self.adjustment {
            Adjustment::NumericDelta { keys: delta } => keys.extend(delta.iter().copied()),
            Adjustment::TopicSlice { key } => keys.push(key),
        }
        keys.sort_unstable();
        keys.dedup();
        keys
    }

    /// Fails when `space` lacks a parameter this test case reads.
    pub fn check_space(&self, space: &ParameterSpace) -> Result<(), CampaignError> {
        let missing: Vec<&str> = self
            .required_keys()
            .into_iter()
            .filter(|key| !space.parameters.contains_key(*key))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(CampaignError::Configuration(
            ErrorInfo::new("test_case_missing_parameters", "campaign lacks required parameters")
                .with_context("test_case", self.name)
                .with_context("missing", missing.join(",")),
        ))
    }
}

const CLIENT_SERVER_DELTA: Adjustment = Adjustment::NumericDelta {
    keys: &[CLIENTS_KEY, SERVERS_KEY],
};
const TOPIC_SLICE: Adjustment = Adjustment::TopicSlice { key: TOPICS_KEY };
const CLIENT_SERVER_ZIP: &[&str] = &[CLIENTS_KEY, SERVERS_KEY, "pause"];
const TOPIC_ZIP: &[&str] = &[TOPICS_KEY, "pause"];

/// Explicit table of known test cases, built once at startup.
#[derive(Debug, Clone)]
pub struct TestCaseRegistry {
    cases: Vec<TestCase>,
}

impl TestCaseRegistry {
    /// Registry holding the four stock benchmark scenarios.
    pub fn builtin() -> Self {
        Self {
            cases: vec![
                TestCase {
                    name: "test_case_1",
                    group_key: CLIENTS_KEY,
                    constraint: Constraint::ServersAtMostClients,
                    adjustment: CLIENT_SERVER_DELTA,
                    default_zip: CLIENT_SERVER_ZIP,
                },
                TestCase {
                    name: "test_case_2",
                    group_key: TOPICS_KEY,
                    constraint: Constraint::Unconstrained,
                    adjustment: TOPIC_SLICE,
                    default_zip: TOPIC_ZIP,
                },
                TestCase {
                    name: "test_case_3",
                    group_key: CLIENTS_KEY,
                    constraint: Constraint::ServersAtLeastClients,
                    adjustment: CLIENT_SERVER_DELTA,
                    default_zip: CLIENT_SERVER_ZIP,
                },
                TestCase {
                    name: "test_case_4",
                    group_key: TOPICS_KEY,
                    constraint: Constraint::Unconstrained,
                    adjustment: TOPIC_SLICE,
                    default_zip: TOPIC_ZIP,
                },
            ],
        }
    }

    /// Looks a test case up by name.
    pub fn resolve(&self, name: &str) -> Result<&TestCase, CampaignError> {
        self.cases
            .iter()
            .find(|case| case.name == name)
            .ok_or_else(|| {
                CampaignError::Configuration(
                    ErrorInfo::new("test_case_unknown", "unknown test case")
                        .with_context("test_case", name.to_string())
                        .with_hint(format!("known test cases: {}", self.names().join(", "))),
                )
            })
    }

    /// Names of all registered test cases.
    pub fn names(&self) -> Vec<&'static str> {
        self.cases.iter().map(|case| case.name).collect()
    }
}
