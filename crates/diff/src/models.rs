//! The layout diff document.
//!
//! A diff is position-aware for layers (identity = layer name) and
//! identity-keyed for behaviors (identity = name / code). Scalar metadata
//! fields carry plain JSON-Patch operation lists.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire tag for this document shape.
pub const DIFF_TYPE: &str = "layout_diff_v2";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOpKind {
	Replace,
	Add,
	Remove,
}

/// One JSON-Patch operation. `path = ""` targets the whole value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOp {
	pub op: PatchOpKind,
	pub path: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value: Option<Value>,
}

impl PatchOp {
	pub fn replace(path: impl Into<String>, value: Value) -> Self {
		Self { op: PatchOpKind::Replace, path: path.into(), value: Some(value) }
	}

	pub fn add(path: impl Into<String>, value: Value) -> Self {
		Self { op: PatchOpKind::Add, path: path.into(), value: Some(value) }
	}

	pub fn remove(path: impl Into<String>) -> Self {
		Self { op: PatchOpKind::Remove, path: path.into(), value: None }
	}
}

/// A layer present only in the modified layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddedLayer {
	pub name: String,
	pub new_position: usize,
	/// Serialized binding row.
	pub data: Value,
}

/// A layer present only in the base layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovedLayer {
	pub name: String,
	pub original_position: usize,
	pub data: Value,
}

/// A layer present in both layouts with content or position changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerModification {
	pub original_position: usize,
	pub new_position: usize,
	pub position_changed: bool,
	/// JSON-Patch operations against the binding row, with bare indices
	/// (`"0"`, `"1"`, …) as paths.
	#[serde(default)]
	pub patch: Vec<PatchOp>,
}

/// Layer section of a diff.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerChanges {
	#[serde(default)]
	pub added: Vec<AddedLayer>,
	#[serde(default)]
	pub removed: Vec<RemovedLayer>,
	#[serde(default)]
	pub modified: IndexMap<String, LayerModification>,
}

impl LayerChanges {
	pub fn is_empty(&self) -> bool {
		self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
	}
}

/// An added or removed behavior with its serialized record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorEntry {
	pub name: String,
	pub data: Value,
}

/// Behavior section of a diff, keyed by the behavior's identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehaviorChanges {
	#[serde(default)]
	pub added: Vec<BehaviorEntry>,
	#[serde(default)]
	pub removed: Vec<BehaviorEntry>,
	#[serde(default)]
	pub modified: IndexMap<String, Vec<PatchOp>>,
}

impl BehaviorChanges {
	pub fn is_empty(&self) -> bool {
		self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
	}
}

/// A structural diff between two layouts.
///
/// `version` and `uuid` travel in the header; every other metadata scalar
/// gets its own operation list when it changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutDiff {
	pub diff_type: String,
	pub base_version: String,
	pub modified_version: String,
	pub base_uuid: String,
	pub modified_uuid: String,
	pub timestamp: DateTime<Utc>,
	#[serde(default)]
	pub layers: LayerChanges,
	#[serde(default)]
	pub hold_taps: BehaviorChanges,
	#[serde(default)]
	pub combos: BehaviorChanges,
	#[serde(default)]
	pub macros: BehaviorChanges,
	#[serde(default)]
	pub input_listeners: BehaviorChanges,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub title: Option<Vec<PatchOp>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub creator: Option<Vec<PatchOp>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub notes: Option<Vec<PatchOp>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tags: Option<Vec<PatchOp>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub locale: Option<Vec<PatchOp>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub parent_uuid: Option<Vec<PatchOp>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub date: Option<Vec<PatchOp>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub base_layout: Option<Vec<PatchOp>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub custom_defined_behaviors: Option<Vec<PatchOp>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub custom_devicetree: Option<Vec<PatchOp>>,
}

impl LayoutDiff {
	pub fn new() -> Self {
		Self {
			diff_type: DIFF_TYPE.to_string(),
			base_version: String::new(),
			modified_version: String::new(),
			base_uuid: String::new(),
			modified_uuid: String::new(),
			timestamp: Utc::now(),
			layers: LayerChanges::default(),
			hold_taps: BehaviorChanges::default(),
			combos: BehaviorChanges::default(),
			macros: BehaviorChanges::default(),
			input_listeners: BehaviorChanges::default(),
			title: None,
			creator: None,
			notes: None,
			tags: None,
			locale: None,
			parent_uuid: None,
			date: None,
			base_layout: None,
			custom_defined_behaviors: None,
			custom_devicetree: None,
		}
	}

	/// True when the diff records any difference at all.
	pub fn has_changes(&self) -> bool {
		!self.layers.is_empty()
			|| !self.hold_taps.is_empty()
			|| !self.combos.is_empty()
			|| !self.macros.is_empty()
			|| !self.input_listeners.is_empty()
			|| self.title.is_some()
			|| self.creator.is_some()
			|| self.notes.is_some()
			|| self.tags.is_some()
			|| self.locale.is_some()
			|| self.parent_uuid.is_some()
			|| self.date.is_some()
			|| self.base_layout.is_some()
			|| self.custom_defined_behaviors.is_some()
			|| self.custom_devicetree.is_some()
			|| self.base_version != self.modified_version
			|| self.base_uuid != self.modified_uuid
	}
}

impl Default for LayoutDiff {
	fn default() -> Self {
		Self::new()
	}
}
