#![deny(missing_docs)]
#![doc = "Core error taxonomy, trial types and canonical persistence helpers for cmx."]

pub mod errors;
/// Stable content hashing.
pub mod hash;
/// Canonical JSON and YAML helpers plus atomic writes.
pub mod serde;
pub mod trial;

pub use errors::{persistence_error, CampaignError, ErrorInfo};
pub use hash::stable_hash_string;
pub use trial::{compare_values, Trial, BACKUP_DIR_FIELD, TRIAL_ID_FIELD};
