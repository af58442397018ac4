use std::fs;
use std::path::{Path, PathBuf};

use cmx_core::errors::{persistence_error, CampaignError};
use cmx_core::serde::{from_json_slice, write_json_atomic};
use cmx_core::Trial;
use serde_json::Value;

/// File name of the campaign record inside an environment directory.
pub const RECORD_FILE: &str = "params.json";

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            ':' => out.push_str("%3A"),
            '-' => out.push_str("%2D"),
            other => out.push(other),
        }
    }
    out
}

/// Marks string values that would otherwise read as a number, bool or null.
const QUOTE_MARKER: &str = "%22";

fn render(value: &Value) -> String {
    match value {
        Value::String(text) if reads_as_non_string(text) => {
            format!("{QUOTE_MARKER}{}", escape(text))
        }
        Value::String(text) => escape(text),
        other => escape(&other.to_string()),
    }
}

fn reads_as_non_string(text: &str) -> bool {
    matches!(
        serde_json::from_str::<Value>(text),
        Ok(Value::Number(_) | Value::Bool(_) | Value::Null)
    )
}

/// Deterministic identifier of a trial, usable as a path segment.
///
/// Fields are rendered as `key__value` in key order and joined with `-`.
/// Path separators, colons, dashes and the escape character itself are
/// percent-escaped. Strings that spell a number, bool or null carry a
/// leading `%22` so they never share an identifier with the scalar itself.
pub fn trial_id(trial: &Trial) -> String {
    trial
        .iter()
        .map(|(key, value)| format!("{}__{}", escape(key), render(value)))
        .collect::<Vec<_>>()
        .join("-")
}

/// Append-only record of every attempted trial of a campaign environment.
#[derive(Debug, Clone)]
pub struct ResultRecorder {
    path: PathBuf,
}

impl ResultRecorder {
    /// Recorder writing to `<env_dir>/params.json`.
    pub fn new(env_dir: &Path) -> Self {
        Self {
            path: env_dir.join(RECORD_FILE),
        }
    }

    /// Location of the record file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `trial` to the record file.
    ///
    /// The whole array is rewritten through a temporary file, so the record is
    /// a complete JSON document after every append. Concurrent writers are not
    /// supported.
    pub fn record(&self, trial: &Trial) -> Result<(), CampaignError> {
        let mut records = self.load()?;
        records.push(trial.clone());
        write_json_atomic(&self.path, &records)?;
        tracing::debug!(
            path = %self.path.display(),
            records = records.len(),
            "campaign record appended"
        );
        Ok(())
    }

    /// Reads all recorded trials, or an empty list when none were recorded.
    pub fn load(&self) -> Result<Vec<Trial>, CampaignError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let bytes = fs::read(&self.path).map_err(|err| {
            persistence_error("record_read", err)
                .with_context("path", self.path.display().to_string())
        })?;
        from_json_slice(&bytes)
    }
}
