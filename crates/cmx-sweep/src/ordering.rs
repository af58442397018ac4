use std::cmp::Ordering;

use cmx_core::{compare_values, Trial};
use serde::{Deserialize, Serialize};

/// Field naming the benchmarked backend of a trial.
pub const DRIVER_KEY: &str = "driver";
/// Field naming the call pattern of a trial.
pub const CALL_TYPE_KEY: &str = "call_type";
/// Number of benchmark clients.
pub const CLIENTS_KEY: &str = "nbr_clients";
/// Number of benchmark servers.
pub const SERVERS_KEY: &str = "nbr_servers";
/// Number of topics.
pub const TOPICS_KEY: &str = "nbr_topics";

/// Per-trial admission predicate of a test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Constraint {
    /// Every trial is admitted.
    #[default]
    Unconstrained,
    /// Admits trials where `nbr_servers <= nbr_clients`.
    ServersAtMostClients,
    /// Admits trials where `nbr_servers >= nbr_clients`.
    ServersAtLeastClients,
}

impl Constraint {
    /// Evaluates the predicate against a single trial.
    pub fn admits(&self, trial: &Trial) -> bool {
        match self {
            Constraint::Unconstrained => true,
            Constraint::ServersAtMostClients => {
                servers_vs_clients(trial).is_some_and(|ord| ord != Ordering::Greater)
            }
            Constraint::ServersAtLeastClients => {
                servers_vs_clients(trial).is_some_and(|ord| ord != Ordering::Less)
            }
        }
    }
}

fn servers_vs_clients(trial: &Trial) -> Option<Ordering> {
    let servers = trial.get(SERVERS_KEY)?;
    let clients = trial.get(CLIENTS_KEY)?;
    Some(compare_values(Some(servers), Some(clients)))
}

/// Orders two trials by driver, call type, then `group_key`.
pub fn compare_trials(a: &Trial, b: &Trial, group_key: &str) -> Ordering {
    compare_values(a.get(DRIVER_KEY), b.get(DRIVER_KEY))
        .then_with(|| compare_values(a.get(CALL_TYPE_KEY), b.get(CALL_TYPE_KEY)))
        .then_with(|| compare_values(a.get(group_key), b.get(group_key)))
}

/// Stable sort grouping trials by driver and call type, ascending by `group_key`.
///
/// Executing trials in this order keeps consecutive trials on the same
/// provisioned backend.
pub fn sort(mut trials: Vec<Trial>, group_key: &str) -> Vec<Trial> {
    trials.sort_by(|a, b| compare_trials(a, b, group_key));
    trials
}

/// Keeps the trials admitted by `constraint`, preserving order.
pub fn filter(trials: Vec<Trial>, constraint: Constraint) -> Vec<Trial> {
    trials
        .into_iter()
        .filter(|trial| constraint.admits(trial))
        .collect()
}

/// Generates `n` topic names zero-padded to the width of `n - 1`.
pub fn topics(n: usize) -> Vec<String> {
    if n == 0 {
        return Vec::new();
    }
    let width = (n - 1).to_string().len();
    (0..n).map(|k| format!("topic-{k:0width$}")).collect()
}
