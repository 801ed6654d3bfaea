//! Error types for layout operations.

use thiserror::Error;

/// Errors raised by layout record validation and layer operations.
///
/// Warning-class conditions (unresolved variables, out-of-range layer
/// references, skipped patch targets) are *not* errors; they are returned as
/// diagnostic strings alongside results.
#[derive(Debug, Error)]
pub enum LayoutError {
	#[error("layer '{0}' not found")]
	LayerNotFound(String),

	#[error("layer '{0}' already exists")]
	DuplicateLayer(String),

	#[error("position {position} is out of range for {count} layers")]
	InvalidPosition { position: isize, count: usize },

	#[error("invalid import data: {0}")]
	InvalidImport(String),

	#[error("hold-tap '{name}' requires exactly 2 bindings, found {found}")]
	HoldTapBindingCount { name: String, found: usize },

	#[error("invalid flavor '{flavor}' for hold-tap '{name}'")]
	InvalidFlavor { name: String, flavor: String },

	#[error("combo '{0}' must have at least one key position")]
	EmptyKeyPositions(String),

	#[error("invalid key position {position} in combo '{name}'")]
	InvalidKeyPosition { name: String, position: i64 },

	#[error("macro '{name}' cannot have more than 2 parameters, found {found}")]
	MacroParamCount { name: String, found: usize },

	#[error("duplicate {kind} name '{name}'")]
	DuplicateBehavior { kind: &'static str, name: String },

	#[error("invalid export format '{0}' (use: bindings, layer, or full)")]
	InvalidExportFormat(String),

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LayoutError>;
