//! Resolved trial mappings and value ordering helpers.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field holding the deterministic identifier of a trial.
pub const TRIAL_ID_FIELD: &str = "trial_id";
/// Field holding the result storage directory of a trial.
pub const BACKUP_DIR_FIELD: &str = "backup_dir";

/// One fully resolved set of parameter values to execute once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trial(BTreeMap<String, Value>);

impl Trial {
    /// Creates an empty trial.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Returns the value bound to `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Binds `key` to `value`, returning the previous binding.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Removes `key` from the trial.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Returns true when `key` is bound.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Iterates over bindings in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Number of bound fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no field is bound.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the value bound to `key` as an unsigned integer.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    /// Returns the value bound to `key` as a string slice.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Returns a copy of the trial without the derived identifier fields.
    pub fn without_derived(&self) -> Trial {
        let mut base = self.clone();
        base.remove(TRIAL_ID_FIELD);
        base.remove(BACKUP_DIR_FIELD);
        base
    }
}

impl From<BTreeMap<String, Value>> for Trial {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for Trial {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn kind_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

/// Total order over optional JSON scalars.
///
/// Numbers compare numerically, strings lexically and booleans false-first.
/// Values of different kinds order by kind: missing < bool < number < string.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            match (x.as_i64(), y.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => {
                    let x = x.as_f64().unwrap_or(f64::NAN);
                    let y = y.as_f64().unwrap_or(f64::NAN);
                    x.total_cmp(&y)
                }
            }
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => kind_rank(a).cmp(&kind_rank(b)),
    }
}
