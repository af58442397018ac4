use std::collections::BTreeMap;

use cmx_core::errors::{CampaignError, ErrorInfo};
use cmx_core::Trial;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Candidate values for every parameter of a campaign.
///
/// Keys listed in `zip` are expanded point-wise (index aligned) instead of
/// combinatorially with each other. The zipped rows are then combined with
/// every independent key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpace {
    /// Ordered, non-empty candidate list per parameter name.
    pub parameters: BTreeMap<String, Vec<Value>>,
    /// Names expanded point-wise. Empty means plain cartesian product.
    #[serde(default)]
    pub zip: Vec<String>,
}

impl ParameterSpace {
    /// Creates a space without a zip group.
    pub fn new(parameters: BTreeMap<String, Vec<Value>>) -> Self {
        Self {
            parameters,
            zip: Vec::new(),
        }
    }

    /// Declares the zip group of the space.
    pub fn with_zip<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.zip = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Candidate list of `key`, if declared.
    pub fn values(&self, key: &str) -> Option<&[Value]> {
        self.parameters.get(key).map(Vec::as_slice)
    }

    /// Checks list shapes, value kinds, parameter names and zip membership.
    pub fn validate(&self) -> Result<(), CampaignError> {
        for (name, values) in &self.parameters {
            validate_name(name)?;
            if values.is_empty() {
                return Err(CampaignError::Configuration(
                    ErrorInfo::new("space_empty_list", "parameter has no candidate values")
                        .with_context("parameter", name.clone()),
                ));
            }
            if let Some(bad) = values.iter().find(|value| !is_scalar(value)) {
                return Err(CampaignError::Configuration(
                    ErrorInfo::new("space_non_scalar", "candidate values must be scalars")
                        .with_context("parameter", name.clone())
                        .with_context("value", bad.to_string()),
                ));
            }
        }
        for key in &self.zip {
            if !self.parameters.contains_key(key) {
                return Err(CampaignError::Configuration(
                    ErrorInfo::new("space_zip_unknown", "zip group names an undeclared parameter")
                        .with_context("parameter", key.clone()),
                ));
            }
        }
        Ok(())
    }

    /// Number of trials [`expand`] yields.
    pub fn trial_count(&self) -> usize {
        let independent: usize = self
            .parameters
            .iter()
            .filter(|(name, _)| !self.zip.contains(name))
            .map(|(_, values)| values.len())
            .product();
        independent * self.zip_rows()
    }

    fn zip_rows(&self) -> usize {
        self.zip
            .iter()
            .filter_map(|key| self.parameters.get(key))
            .map(Vec::len)
            .min()
            .unwrap_or(1)
    }
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

fn validate_name(name: &str) -> Result<(), CampaignError> {
    let well_formed = !name.is_empty()
        && !name.contains("__")
        && !name.starts_with('_')
        && !name.ends_with('_')
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if well_formed {
        Ok(())
    } else {
        Err(CampaignError::Configuration(
            ErrorInfo::new("space_bad_name", "invalid parameter name")
                .with_context("parameter", name.to_string())
                .with_hint("use ASCII letters, digits and single inner underscores"),
        ))
    }
}

/// Expands `space` into concrete trials.
///
/// Independent keys are combined as a cartesian product in key order. Zip keys
/// contribute `min(len)` index-aligned rows; trailing values of longer zip
/// lists are dropped.
pub fn expand(space: &ParameterSpace) -> Result<Vec<Trial>, CampaignError> {
    space.validate()?;
    let zip_lengths: Vec<usize> = space
        .zip
        .iter()
        .filter_map(|key| space.parameters.get(key))
        .map(Vec::len)
        .collect();
    if zip_lengths.windows(2).any(|pair| pair[0] != pair[1]) {
        tracing::warn!(
            zip = ?space.zip,
            lengths = ?zip_lengths,
            "zip group lists differ in length; truncating to the shortest"
        );
    }

    let rows = zip_rows(space);
    let independent: Vec<(&String, &Vec<Value>)> = space
        .parameters
        .iter()
        .filter(|(name, _)| !space.zip.contains(name))
        .collect();

    let mut outputs = Vec::with_capacity(space.trial_count());
    for row in &rows {
        expand_grid(&independent, 0, row.clone(), &mut outputs);
    }
    Ok(outputs)
}

fn zip_rows(space: &ParameterSpace) -> Vec<Trial> {
    if space.zip.is_empty() {
        return vec![Trial::new()];
    }
    (0..space.zip_rows())
        .map(|idx| {
            space
                .zip
                .iter()
                .filter_map(|key| {
                    space
                        .parameters
                        .get(key)
                        .map(|values| (key.clone(), values[idx].clone()))
                })
                .collect()
        })
        .collect()
}

fn expand_grid(
    params: &[(&String, &Vec<Value>)],
    idx: usize,
    current: Trial,
    outputs: &mut Vec<Trial>,
) {
    if idx == params.len() {
        outputs.push(current);
        return;
    }
    let (name, values) = params[idx];
    for value in values {
        let mut next = current.clone();
        next.insert(name.clone(), value.clone());
        expand_grid(params, idx + 1, next, outputs);
    }
}
