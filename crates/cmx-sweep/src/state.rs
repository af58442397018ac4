use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use cmx_core::errors::{persistence_error, CampaignError, ErrorInfo};
use cmx_core::hash::stable_hash_string;
use cmx_core::serde::{from_json_slice, write_json_atomic};
use cmx_core::Trial;
use serde::{Deserialize, Serialize};

use crate::recorder::trial_id;

const LEDGER_FILE: &str = "ledger.json";

/// Progress of a single trial within a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrialStatus {
    /// Not attempted yet, or excluded by the active selection.
    Pending,
    /// Attempted and succeeded.
    Done,
    /// Attempted and failed.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LedgerEntry {
    id: String,
    trial: Trial,
    status: TrialStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Ledger {
    name: String,
    sweep_hash: String,
    entries: Vec<LedgerEntry>,
}

/// Counts of trials per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    /// Trials still pending.
    pub pending: usize,
    /// Trials marked done.
    pub done: usize,
    /// Trials marked skipped.
    pub skipped: usize,
}

impl LedgerSummary {
    /// Total number of trials tracked.
    pub fn total(&self) -> usize {
        self.pending + self.done + self.skipped
    }
}

/// Persisted ledger of pending, done and skipped trials for one campaign.
///
/// Every status transition is written to disk before the call returns, so a
/// reopened ledger never re-issues a trial that was marked done or skipped.
#[derive(Debug)]
pub struct SweepState {
    path: PathBuf,
    ledger: Ledger,
    index: BTreeMap<String, usize>,
}

impl SweepState {
    /// Directory holding the ledger of campaign `name` under `sweeps_dir`.
    pub fn ledger_dir(sweeps_dir: &Path, name: &str) -> PathBuf {
        sweeps_dir.join(name)
    }

    /// Opens the ledger of `name`, creating it from `trials` when absent.
    ///
    /// Reopening with a trial set that differs from the persisted one is a
    /// configuration error: resuming requires the same sweep.
    pub fn open(sweeps_dir: &Path, name: &str, trials: Vec<Trial>) -> Result<Self, CampaignError> {
        let dir = Self::ledger_dir(sweeps_dir, name);
        let path = dir.join(LEDGER_FILE);
        let entries = dedup_entries(trials);
        let sweep_hash = sweep_hash(&entries)?;

        if path.exists() {
            let bytes = fs::read(&path).map_err(|err| {
                persistence_error("ledger_read", err)
                    .with_context("path", path.display().to_string())
            })?;
            let ledger: Ledger = from_json_slice(&bytes)?;
            if ledger.sweep_hash != sweep_hash {
                return Err(CampaignError::Configuration(
                    ErrorInfo::new(
                        "ledger_mismatch",
                        "persisted sweep differs from the current parameter space",
                    )
                    .with_context("campaign", name.to_string())
                    .with_context("path", path.display().to_string())
                    .with_hint("use a new campaign name or reset the ledger"),
                ));
            }
            let state = Self::from_ledger(path, ledger);
            let summary = state.summary();
            tracing::info!(
                campaign = name,
                done = summary.done,
                skipped = summary.skipped,
                pending = summary.pending,
                "resuming sweep ledger"
            );
            return Ok(state);
        }

        let ledger = Ledger {
            name: name.to_string(),
            sweep_hash,
            entries,
        };
        let state = Self::from_ledger(path, ledger);
        state.persist()?;
        tracing::info!(
            campaign = name,
            trials = state.ledger.entries.len(),
            "created sweep ledger"
        );
        Ok(state)
    }

    /// Opens an existing ledger without comparing it to a sweep.
    pub fn load(sweeps_dir: &Path, name: &str) -> Result<Self, CampaignError> {
        let path = Self::ledger_dir(sweeps_dir, name).join(LEDGER_FILE);
        let bytes = fs::read(&path).map_err(|err| {
            persistence_error("ledger_read", err).with_context("path", path.display().to_string())
        })?;
        let ledger: Ledger = from_json_slice(&bytes)?;
        Ok(Self::from_ledger(path, ledger))
    }

    /// Deletes the ledger of `name`, if any.
    pub fn reset(sweeps_dir: &Path, name: &str) -> Result<(), CampaignError> {
        let dir = Self::ledger_dir(sweeps_dir, name);
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|err| {
                persistence_error("ledger_reset", err)
                    .with_context("path", dir.display().to_string())
            })?;
            tracing::info!(campaign = name, "removed sweep ledger");
        }
        Ok(())
    }

    fn from_ledger(path: PathBuf, ledger: Ledger) -> Self {
        let index = ledger
            .entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| (entry.id.clone(), idx))
            .collect();
        Self {
            path,
            ledger,
            index,
        }
    }

    /// Path of the persisted ledger file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the first pending trial the selection yields, or `None` when
    /// the sweep is exhausted for that selection.
    pub fn get_next<F>(&self, select: F) -> Option<Trial>
    where
        F: FnOnce(Vec<Trial>) -> Vec<Trial>,
    {
        select(self.pending()).into_iter().next()
    }

    /// Pending trials in enumeration order.
    pub fn pending(&self) -> Vec<Trial> {
        self.ledger
            .entries
            .iter()
            .filter(|entry| entry.status == TrialStatus::Pending)
            .map(|entry| entry.trial.clone())
            .collect()
    }

    /// Status of `trial`, if it belongs to the sweep.
    pub fn status(&self, trial: &Trial) -> Option<TrialStatus> {
        let id = trial_id(&trial.without_derived());
        self.index
            .get(&id)
            .map(|&idx| self.ledger.entries[idx].status)
    }

    /// Marks `trial` as done and persists the ledger.
    pub fn done(&mut self, trial: &Trial) -> Result<(), CampaignError> {
        self.transition(trial, TrialStatus::Done)
    }

    /// Marks `trial` as skipped and persists the ledger.
    pub fn skip(&mut self, trial: &Trial) -> Result<(), CampaignError> {
        self.transition(trial, TrialStatus::Skipped)
    }

    /// Counts of trials per status.
    pub fn summary(&self) -> LedgerSummary {
        let mut summary = LedgerSummary::default();
        for entry in &self.ledger.entries {
            match entry.status {
                TrialStatus::Pending => summary.pending += 1,
                TrialStatus::Done => summary.done += 1,
                TrialStatus::Skipped => summary.skipped += 1,
            }
        }
        summary
    }

    /// Trials with the given status, in enumeration order.
    pub fn with_status(&self, status: TrialStatus) -> Vec<Trial> {
        self.ledger
            .entries
            .iter()
            .filter(|entry| entry.status == status)
            .map(|entry| entry.trial.clone())
            .collect()
    }

    fn transition(&mut self, trial: &Trial, status: TrialStatus) -> Result<(), CampaignError> {
        let id = trial_id(&trial.without_derived());
        let idx = *self.index.get(&id).ok_or_else(|| {
            CampaignError::Persistence(
                ErrorInfo::new("ledger_unknown_trial", "trial does not belong to this sweep")
                    .with_context("trial_id", id.clone()),
            )
        })?;
        let previous = self.ledger.entries[idx].status;
        self.ledger.entries[idx].status = status;
        if let Err(err) = self.persist() {
            self.ledger.entries[idx].status = previous;
            return Err(err);
        }
        tracing::debug!(trial_id = %id, status = ?status, "ledger updated");
        Ok(())
    }

    fn persist(&self) -> Result<(), CampaignError> {
        write_json_atomic(&self.path, &self.ledger)
    }
}

fn dedup_entries(trials: Vec<Trial>) -> Vec<LedgerEntry> {
    let mut seen = BTreeSet::new();
    let mut entries = Vec::with_capacity(trials.len());
    for trial in trials {
        let id = trial_id(&trial);
        if !seen.insert(id.clone()) {
            continue;
        }
        entries.push(LedgerEntry {
            id,
            trial,
            status: TrialStatus::Pending,
        });
    }
    entries
}

fn sweep_hash(entries: &[LedgerEntry]) -> Result<String, CampaignError> {
    let mut ids: Vec<&str> = entries.iter().map(|entry| entry.id.as_str()).collect();
    ids.sort_unstable();
    stable_hash_string(&ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn trials() -> Vec<Trial> {
        (1..=3)
            .map(|n| [("nbr_clients".to_string(), json!(n * 10))].into_iter().collect())
            .collect()
    }

    #[test]
    fn duplicates_collapse() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let mut input = trials();
        input.push(input[0].clone());
        let state = SweepState::open(dir.path(), "dup", input).expect("open");
        assert_eq!(state.summary().total(), 3);
    }

    #[test]
    fn scalar_and_string_spellings_stay_distinct() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let input: Vec<Trial> = [json!(10), json!("10"), json!(true), json!("true")]
            .into_iter()
            .map(|value| [("pause".to_string(), value)].into_iter().collect())
            .collect();
        let mut state = SweepState::open(dir.path(), "kinds", input.clone()).expect("open");
        assert_eq!(state.summary().total(), 4);
        state.done(&input[1]).expect("done");
        assert_eq!(state.status(&input[0]), Some(TrialStatus::Pending));
        assert_eq!(state.status(&input[1]), Some(TrialStatus::Done));
    }

    #[test]
    fn sweep_hash_ignores_enumeration_order() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let mut state = SweepState::open(dir.path(), "order", trials()).expect("open");
        let first = state.pending()[0].clone();
        state.done(&first).expect("done");
        let mut reversed = trials();
        reversed.reverse();
        let reopened = SweepState::open(dir.path(), "order", reversed).expect("reopen");
        assert_eq!(reopened.status(&first), Some(TrialStatus::Done));
    }

    #[test]
    fn unknown_trial_cannot_transition() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let mut state = SweepState::open(dir.path(), "unknown", trials()).expect("open");
        let stranger: Trial = [("nbr_clients".to_string(), json!(99))].into_iter().collect();
        assert!(state.skip(&stranger).is_err());
        assert_eq!(state.summary().pending, 3);
    }

    #[test]
    fn derived_fields_do_not_affect_lookup() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let mut state = SweepState::open(dir.path(), "derived", trials()).expect("open");
        let mut resolved = state.pending()[1].clone();
        resolved.insert(cmx_core::TRIAL_ID_FIELD, json!("x"));
        resolved.insert(cmx_core::BACKUP_DIR_FIELD, json!("x"));
        state.skip(&resolved).expect("skip");
        assert_eq!(state.summary().skipped, 1);
    }
}
