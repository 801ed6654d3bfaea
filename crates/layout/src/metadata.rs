//! Keymap round-trip metadata.
//!
//! Everything the Devicetree AST surfaces but the typed layout would
//! otherwise discard: comments, includes, preprocessor directives, the
//! original header/footer text, and a best-effort dependency graph. Kept so
//! an exported keymap can be reconstructed close to its source form.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A source comment with its contextual category (`header`, `behavior`,
/// `combos`, `property:<name>`, `general`, …).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeymapComment {
	pub text: String,
	pub line: u32,
	#[serde(default)]
	pub context: String,
	#[serde(default)]
	pub is_block: bool,
}

/// An `#include` directive and its resolution outcome: either an absolute
/// filesystem path, or the sentinel `[system] <path>` / `[local] <path>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeymapInclude {
	pub path: String,
	pub line: u32,
	#[serde(default)]
	pub resolved_path: String,
}

/// A preprocessor directive other than `#include`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDirective {
	pub directive: String,
	#[serde(default)]
	pub condition: String,
	#[serde(default)]
	pub value: String,
	pub line: u32,
}

/// Include dependency graph: resolved paths, logical roles, and includes
/// that could not be resolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyInfo {
	#[serde(default)]
	pub include_dependencies: Vec<String>,
	/// Logical role (e.g. `[behaviors_dtsi]`, `[key_definitions]`,
	/// `[bluetooth]`) to the include path that likely provides it.
	#[serde(default)]
	pub behavior_sources: IndexMap<String, String>,
	#[serde(default)]
	pub unresolved_includes: Vec<String>,
}

/// Round-trip metadata captured during keymap import.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeymapMetadata {
	#[serde(default)]
	pub comments: Vec<KeymapComment>,
	#[serde(default)]
	pub includes: Vec<KeymapInclude>,
	#[serde(default)]
	pub config_directives: Vec<ConfigDirective>,
	#[serde(default)]
	pub original_header: String,
	#[serde(default)]
	pub original_footer: String,
	#[serde(default)]
	pub dependencies: DependencyInfo,
	/// Provenance: how this layout was produced.
	#[serde(default)]
	pub parsing_method: String,
	#[serde(default)]
	pub parsing_mode: String,
	#[serde(default)]
	pub source_file: String,
}

impl KeymapMetadata {
	pub fn is_empty(&self) -> bool {
		self == &Self::default()
	}
}
