//! Error type for diff and patch operations.
//!
//! Only serialization failures are errors; missing patch targets and
//! malformed operations are tolerated and logged.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiffError {
	#[error("diff document is not a {expected} diff (found '{found}')")]
	WrongDiffType { expected: &'static str, found: String },

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}
