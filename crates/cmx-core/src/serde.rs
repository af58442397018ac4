use std::collections::BTreeMap;
use std::fs;
use std::iter::FromIterator;
use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::errors::{persistence_error, CampaignError, ErrorInfo};

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let ordered = map
                .into_iter()
                .map(|(key, value)| (key, canonicalize(value)))
                .collect::<BTreeMap<_, _>>();
            Value::Object(Map::from_iter(ordered))
        }
        Value::Array(values) => {
            let canonical_values = values.into_iter().map(canonicalize).collect();
            Value::Array(canonical_values)
        }
        other => other,
    }
}

/// Serializes a value into canonical JSON bytes with deterministic ordering.
pub fn to_canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CampaignError> {
    let value =
        serde_json::to_value(value).map_err(|err| persistence_error("json_serialize", err))?;
    let canonical = canonicalize(value);
    let mut bytes = Vec::new();
    serde_json::to_writer_pretty(&mut bytes, &canonical)
        .map_err(|err| persistence_error("json_write", err))?;
    Ok(bytes)
}

/// Deserializes a value from JSON bytes.
pub fn from_json_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T, CampaignError> {
    serde_json::from_slice(data).map_err(|err| persistence_error("json_deserialize", err))
}

/// Deserializes a YAML campaign definition.
///
/// Failures here are configuration errors: the document is operator supplied.
pub fn from_yaml_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T, CampaignError> {
    serde_yaml::from_slice(data).map_err(|err| {
        CampaignError::Configuration(ErrorInfo::new("yaml_deserialize", err.to_string()))
    })
}

/// Replaces `path` with `bytes` through a sibling temporary file and a rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CampaignError> {
    let parent = path.parent().ok_or_else(|| {
        CampaignError::Persistence(
            ErrorInfo::new("atomic_write_parent", "path has no parent")
                .with_context("path", path.display().to_string()),
        )
    })?;
    fs::create_dir_all(parent).map_err(|err| {
        persistence_error("atomic_write_dir", err)
            .with_context("path", parent.display().to_string())
    })?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(|err| {
        persistence_error("atomic_write_tmp", err).with_context("path", tmp.display().to_string())
    })?;
    fs::rename(&tmp, path).map_err(|err| {
        persistence_error("atomic_write_rename", err)
            .with_context("path", path.display().to_string())
    })
}

/// Serializes `value` as canonical JSON and writes it atomically to `path`.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), CampaignError> {
    let bytes = to_canonical_json_bytes(value)?;
    write_atomic(path, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_bytes_sort_keys() {
        let a = to_canonical_json_bytes(&json!({"b": 1, "a": 2})).expect("json");
        let text = String::from_utf8(a).expect("utf8");
        assert!(text.find("\"a\"").expect("a") < text.find("\"b\"").expect("b"));
    }

    #[test]
    fn atomic_write_leaves_no_tmp() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("nested").join("ledger.json");
        write_json_atomic(&path, &json!([1, 2, 3])).expect("write");
        let restored: Vec<u64> = from_json_slice(&fs::read(&path).expect("read")).expect("parse");
        assert_eq!(restored, vec![1, 2, 3]);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn yaml_errors_are_configuration_errors() {
        let err = from_yaml_slice::<Value>(b"campaign: [unclosed").expect_err("bad yaml");
        assert!(matches!(err, CampaignError::Configuration(_)));
    }
}
