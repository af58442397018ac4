//! Delta computation for campaigns that reuse one provisioned environment.
//!
//! Successive trials of an incremental campaign only provision what the
//! previous trial did not: the extra clients and servers, or the topics added
//! since the previous candidate count.

use cmx_core::errors::{CampaignError, ErrorInfo};
use cmx_core::Trial;
use serde_json::{json, Value};

use crate::ordering::topics;
use crate::space::ParameterSpace;
use crate::testcase::Adjustment;

/// Field bound to the topic names a topic-slice step provisions.
pub const TOPICS_FIELD: &str = "topics";

/// Returns the candidate preceding `current` in `history`, or `0` when
/// `current` is the first candidate.
pub fn previous_and_current(
    history: &[Value],
    current: &Value,
    key: &str,
) -> Result<(Value, Value), CampaignError> {
    let position = history
        .iter()
        .position(|candidate| candidate == current)
        .ok_or_else(|| {
            CampaignError::Configuration(
                ErrorInfo::new("history_missing_value", "value is not a declared candidate")
                    .with_context("parameter", key.to_string())
                    .with_context("value", current.to_string()),
            )
        })?;
    let previous = match position {
        0 => json!(0),
        idx => history[idx - 1].clone(),
    };
    Ok((previous, current.clone()))
}

fn as_count(value: &Value, key: &str) -> Result<u64, CampaignError> {
    value.as_u64().ok_or_else(|| {
        CampaignError::Configuration(
            ErrorInfo::new(
                "history_not_count",
                "incremental parameters must be non-negative integers",
            )
            .with_context("parameter", key.to_string())
            .with_context("value", value.to_string()),
        )
    })
}

/// Rewrites trials of an incremental campaign into per-step increments.
#[derive(Debug, Clone)]
pub struct IncrementalAdjuster {
    adjustment: Adjustment,
    histories: Vec<(String, Vec<Value>)>,
    topic_names: Vec<String>,
}

impl IncrementalAdjuster {
    /// Builds an adjuster reading candidate histories from `space`.
    pub fn new(space: &ParameterSpace, adjustment: Adjustment) -> Result<Self, CampaignError> {
        let keys: Vec<&str> = match adjustment {
            Adjustment::NumericDelta { keys } => keys.to_vec(),
            Adjustment::TopicSlice { key } => vec![key],
        };
        let mut histories = Vec::with_capacity(keys.len());
        for key in keys {
            let values = space.values(key).ok_or_else(|| {
                CampaignError::Configuration(
                    ErrorInfo::new("history_unknown_key", "incremental key is not declared")
                        .with_context("parameter", key.to_string()),
                )
            })?;
            for value in values {
                as_count(value, key)?;
            }
            histories.push((key.to_string(), values.to_vec()));
        }
        let topic_names = match adjustment {
            Adjustment::TopicSlice { .. } => {
                let largest = histories
                    .iter()
                    .flat_map(|(_, values)| values.iter().filter_map(Value::as_u64))
                    .max()
                    .unwrap_or(0);
                let count = usize::try_from(largest).map_err(|_| {
                    CampaignError::Configuration(
                        ErrorInfo::new("history_too_large", "topic count does not fit in memory")
                            .with_context("value", largest.to_string()),
                    )
                })?;
                topics(count)
            }
            Adjustment::NumericDelta { .. } => Vec::new(),
        };
        Ok(Self {
            adjustment,
            histories,
            topic_names,
        })
    }

    /// Applies the adjustment to `trial` in place.
    pub fn adjust(&self, trial: &mut Trial) -> Result<(), CampaignError> {
        for (key, history) in &self.histories {
            let current = trial.get(key).cloned().ok_or_else(|| {
                CampaignError::Configuration(
                    ErrorInfo::new("trial_missing_key", "trial lacks an incremental parameter")
                        .with_context("parameter", key.clone()),
                )
            })?;
            let (previous, current) = previous_and_current(history, &current, key)?;
            let previous = as_count(&previous, key)?;
            let current = as_count(&current, key)?;
            match self.adjustment {
                Adjustment::NumericDelta { .. } => {
                    trial.insert(key.clone(), json!(current.saturating_sub(previous)));
                }
                Adjustment::TopicSlice { .. } => {
                    let start = (previous as usize).min(self.topic_names.len());
                    let end = (current as usize).min(self.topic_names.len()).max(start);
                    trial.insert(TOPICS_FIELD, Value::from(self.topic_names[start..end].to_vec()));
                }
            }
        }
        Ok(())
    }
}
