//! Patch application: the inverse of diff computation.
//!
//! `apply_patch(base, diff(base, modified))` reproduces `modified` up to
//! canonical ordering of behavior lists. Operations that target missing
//! fields are logged and skipped; they never fail the application.

use keyweave_layout::{
	ComboBehavior, HoldTapBehavior, InputListener, LayoutBinding, LayoutData, MacroBehavior,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::DiffError;
use crate::models::{
	BehaviorChanges, DIFF_TYPE, LayerModification, LayoutDiff, PatchOp, PatchOpKind,
};

/// Apply a diff to a base layout, producing the modified layout. The base
/// is cloned, never mutated.
pub fn apply_patch(base: &LayoutData, diff: &LayoutDiff) -> Result<LayoutData, DiffError> {
	if diff.diff_type != DIFF_TYPE {
		return Err(DiffError::WrongDiffType {
			expected: DIFF_TYPE,
			found: diff.diff_type.clone(),
		});
	}

	let mut result = base.clone();

	apply_layer_changes(&mut result, diff);

	apply_behavior_changes(&mut result.hold_taps, &diff.hold_taps, |b| &b.name, "hold-tap");
	apply_behavior_changes(&mut result.combos, &diff.combos, |b| &b.name, "combo");
	apply_behavior_changes(&mut result.macros, &diff.macros, |b| &b.name, "macro");
	apply_behavior_changes(
		&mut result.input_listeners,
		&diff.input_listeners,
		|b| &b.code,
		"input listener",
	);

	apply_string_ops(&mut result.title, diff.title.as_deref(), "title");
	apply_string_ops(&mut result.creator, diff.creator.as_deref(), "creator");
	apply_string_ops(&mut result.notes, diff.notes.as_deref(), "notes");
	apply_string_ops(&mut result.locale, diff.locale.as_deref(), "locale");
	apply_string_ops(&mut result.parent_uuid, diff.parent_uuid.as_deref(), "parent_uuid");
	apply_string_ops(&mut result.base_layout, diff.base_layout.as_deref(), "base_layout");
	apply_string_ops(
		&mut result.custom_defined_behaviors,
		diff.custom_defined_behaviors.as_deref(),
		"custom_defined_behaviors",
	);
	apply_string_ops(
		&mut result.custom_devicetree,
		diff.custom_devicetree.as_deref(),
		"custom_devicetree",
	);

	if let Some(ops) = &diff.tags
		&& let Some(value) = replacement_value(ops)
	{
		match serde_json::from_value(value.clone()) {
			Ok(tags) => result.tags = tags,
			Err(err) => warn!(%err, "skipping malformed tags patch"),
		}
	}
	if let Some(ops) = &diff.date
		&& let Some(value) = replacement_value(ops)
	{
		match value.as_i64().and_then(|secs| chrono::DateTime::from_timestamp(secs, 0)) {
			Some(date) => result.date = date,
			None => warn!(?value, "skipping malformed date patch"),
		}
	}

	// Version and uuid travel in the diff header.
	if !diff.modified_version.is_empty() {
		result.version = diff.modified_version.clone();
	}
	if !diff.modified_uuid.is_empty() {
		result.uuid = diff.modified_uuid.clone();
	}

	Ok(result)
}

fn apply_layer_changes(result: &mut LayoutData, diff: &LayoutDiff) {
	// Removals first, in descending original position.
	let mut removals: Vec<_> = diff.layers.removed.iter().collect();
	removals.sort_by(|a, b| b.original_position.cmp(&a.original_position));
	for removal in removals {
		match result.layer_index(&removal.name) {
			Some(index) => {
				result.layer_names.remove(index);
				if index < result.layers.len() {
					result.layers.remove(index);
				}
			}
			None => debug!(layer = %removal.name, "removal target absent, skipping"),
		}
	}

	// Content rebuilds before any reordering.
	for (name, modification) in &diff.layers.modified {
		if modification.patch.is_empty() {
			continue;
		}
		match result.layer_index(name) {
			Some(index) => {
				let empty = Vec::new();
				let row = result.layers.get(index).unwrap_or(&empty);
				let rebuilt = apply_row_patch(row, &modification.patch);
				if index < result.layers.len() {
					result.layers[index] = rebuilt;
				} else {
					result.layers.resize_with(index + 1, Vec::new);
					result.layers[index] = rebuilt;
				}
			}
			None => debug!(layer = %name, "modification target absent, skipping"),
		}
	}

	// Additions in ascending target position.
	let mut additions: Vec<_> = diff.layers.added.iter().collect();
	additions.sort_by_key(|a| a.new_position);
	for addition in additions {
		if result.layer_index(&addition.name).is_some() {
			debug!(layer = %addition.name, "addition target already present, skipping");
			continue;
		}
		let row: Vec<LayoutBinding> = match serde_json::from_value(addition.data.clone()) {
			Ok(row) => row,
			Err(err) => {
				warn!(layer = %addition.name, %err, "added layer data malformed, inserting empty row");
				Vec::new()
			}
		};
		let position = addition.new_position.min(result.layer_names.len());
		result.layer_names.insert(position, addition.name.clone());
		result.layers.insert(position.min(result.layers.len()), row);
	}

	// Position changes: remove-then-insert, ascending target position.
	let mut moves: Vec<(&String, &LayerModification)> = diff
		.layers
		.modified
		.iter()
		.filter(|(_, m)| m.position_changed)
		.collect();
	moves.sort_by_key(|(_, m)| m.new_position);
	for (name, modification) in moves {
		let Some(current) = result.layer_index(name) else {
			debug!(layer = %name, "move target absent, skipping");
			continue;
		};
		let target = modification.new_position.min(result.layer_names.len().saturating_sub(1));
		if current == target {
			continue;
		}
		let layer_name = result.layer_names.remove(current);
		let row = (current < result.layers.len()).then(|| result.layers.remove(current));
		result.layer_names.insert(target, layer_name);
		if let Some(row) = row {
			result.layers.insert(target.min(result.layers.len()), row);
		}
	}
}

/// Rebuild a binding row from index-path operations: replaces in place,
/// adds ascending, removes descending.
fn apply_row_patch(row: &[LayoutBinding], ops: &[PatchOp]) -> Vec<LayoutBinding> {
	let mut rebuilt: Vec<LayoutBinding> = row.to_vec();

	for op in ops.iter().filter(|op| op.op == PatchOpKind::Replace) {
		let Some(index) = parse_index(&op.path) else { continue };
		let Some(binding) = op.value.as_ref().and_then(decode_binding) else { continue };
		if index < rebuilt.len() {
			rebuilt[index] = binding;
		} else {
			debug!(index, len = rebuilt.len(), "replace index out of range, skipping");
		}
	}

	let mut adds: Vec<(usize, LayoutBinding)> = ops
		.iter()
		.filter(|op| op.op == PatchOpKind::Add)
		.filter_map(|op| {
			Some((parse_index(&op.path)?, op.value.as_ref().and_then(decode_binding)?))
		})
		.collect();
	adds.sort_by_key(|(index, _)| *index);
	for (index, binding) in adds {
		let index = index.min(rebuilt.len());
		rebuilt.insert(index, binding);
	}

	let mut removes: Vec<usize> =
		ops.iter().filter(|op| op.op == PatchOpKind::Remove).filter_map(|op| parse_index(&op.path)).collect();
	removes.sort_unstable_by(|a, b| b.cmp(a));
	for index in removes {
		if index < rebuilt.len() {
			rebuilt.remove(index);
		} else {
			debug!(index, len = rebuilt.len(), "remove index out of range, skipping");
		}
	}

	rebuilt
}

fn parse_index(path: &str) -> Option<usize> {
	path.trim_start_matches('/').parse().ok()
}

fn decode_binding(value: &Value) -> Option<LayoutBinding> {
	match serde_json::from_value(value.clone()) {
		Ok(binding) => Some(binding),
		Err(err) => {
			warn!(%err, "binding value malformed, skipping operation");
			None
		}
	}
}

/// Trait alias bound for patchable behavior records.
trait Behavior: Serialize + DeserializeOwned + Clone {}
impl Behavior for HoldTapBehavior {}
impl Behavior for ComboBehavior {}
impl Behavior for MacroBehavior {}
impl Behavior for InputListener {}

fn apply_behavior_changes<T: Behavior>(
	list: &mut Vec<T>,
	changes: &BehaviorChanges,
	identity: impl Fn(&T) -> &str,
	kind: &str,
) {
	for removal in &changes.removed {
		let before = list.len();
		list.retain(|behavior| identity(behavior) != removal.name);
		if list.len() == before {
			debug!(kind, name = %removal.name, "removal target absent, skipping");
		}
	}

	for (name, ops) in &changes.modified {
		let Some(position) = list.iter().position(|behavior| identity(behavior) == name) else {
			debug!(kind, name = %name, "modification target absent, skipping");
			continue;
		};
		let mut value = match serde_json::to_value(&list[position]) {
			Ok(value) => value,
			Err(err) => {
				warn!(kind, name = %name, %err, "behavior serialization failed, skipping");
				continue;
			}
		};
		apply_value_ops(&mut value, ops);
		match serde_json::from_value(value) {
			Ok(patched) => list[position] = patched,
			Err(err) => {
				warn!(kind, name = %name, %err, "patched behavior no longer valid, keeping original");
			}
		}
	}

	for addition in &changes.added {
		if list.iter().any(|behavior| identity(behavior) == addition.name) {
			debug!(kind, name = %addition.name, "addition target already present, skipping");
			continue;
		}
		match serde_json::from_value(addition.data.clone()) {
			Ok(behavior) => list.push(behavior),
			Err(err) => warn!(kind, name = %addition.name, %err, "added behavior malformed, skipping"),
		}
	}
}

/// Descend one path segment into `target`, returning the child if present.
fn step_into<'a>(target: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
	match target {
		Value::Object(map) => map.get_mut(segment),
		Value::Array(items) => segment.parse::<usize>().ok().and_then(|index| items.get_mut(index)),
		_ => None,
	}
}

/// Descend through `segments` in order, returning the final target if every
/// segment resolves. Recursion (rather than a loop) keeps each reborrow's
/// lifetime scoped to its own stack frame.
fn navigate<'a>(target: &'a mut Value, segments: &[&str]) -> Option<&'a mut Value> {
	match segments {
		[] => Some(target),
		[head, tail @ ..] => navigate(step_into(target, head)?, tail),
	}
}

/// Apply JSON-pointer operations to a serialized record. Missing targets
/// are skipped.
///
/// Paths in a diff are ordered lexicographically, which does not match
/// numeric array order; operations are re-ordered here so array inserts
/// apply ascending and removals descending.
fn apply_value_ops(value: &mut Value, ops: &[PatchOp]) {
	let mut ordered: Vec<&PatchOp> = ops.iter().collect();
	ordered.sort_by(|a, b| {
		op_phase(a)
			.cmp(&op_phase(b))
			.then_with(|| match (a.op, b.op) {
				(PatchOpKind::Add, PatchOpKind::Add) => numeric_path_key(&a.path).cmp(&numeric_path_key(&b.path)),
				(PatchOpKind::Remove, PatchOpKind::Remove) => {
					numeric_path_key(&b.path).cmp(&numeric_path_key(&a.path))
				}
				_ => std::cmp::Ordering::Equal,
			})
	});

	for op in ordered {
		let segments: Vec<&str> =
			op.path.trim_start_matches('/').split('/').filter(|s| !s.is_empty()).collect();

		if segments.is_empty() {
			if op.op == PatchOpKind::Replace
				&& let Some(replacement) = &op.value
			{
				*value = replacement.clone();
			}
			continue;
		}

		let (leaf, parents) = segments.split_last().expect("non-empty segments");
		let Some(target) = navigate(&mut *value, parents) else {
			debug!(path = %op.path, "patch path absent, skipping");
			continue;
		};

		let op_kind = &op.op;
		match target {
			Value::Object(map) => match op_kind {
				PatchOpKind::Replace | PatchOpKind::Add => {
					if let Some(new_value) = &op.value {
						map.insert((*leaf).to_string(), new_value.clone());
					}
				}
				PatchOpKind::Remove => {
					if map.shift_remove(*leaf).is_none() {
						debug!(path = %op.path, "remove target absent, skipping");
					}
				}
			},
			Value::Array(items) => {
				let kind = op_kind;
				let Some(index) = leaf.parse::<usize>().ok() else {
					debug!(path = %op.path, "non-numeric index into array, skipping");
					continue;
				};
				match kind {
					PatchOpKind::Replace => {
						if let (Some(new_value), Some(slot)) =
							(&op.value, items.get_mut(index))
						{
							*slot = new_value.clone();
						} else {
							debug!(path = %op.path, "replace index out of range, skipping");
						}
					}
					PatchOpKind::Add => {
						if let Some(new_value) = &op.value {
							items.insert(index.min(items.len()), new_value.clone());
						}
					}
					PatchOpKind::Remove => {
						if index < items.len() {
							items.remove(index);
						} else {
							debug!(path = %op.path, "remove index out of range, skipping");
						}
					}
				}
			}
			_ => debug!(path = %op.path, "patch target is a scalar, skipping"),
		}
	}
}

fn op_phase(op: &PatchOp) -> u8 {
	match op.op {
		PatchOpKind::Replace => 0,
		PatchOpKind::Add => 1,
		PatchOpKind::Remove => 2,
	}
}

/// Path key with numeric trailing segments compared as numbers, so
/// `/bindings/2` orders before `/bindings/10`.
fn numeric_path_key(path: &str) -> (String, usize) {
	match path.rsplit_once('/') {
		Some((parent, leaf)) => match leaf.parse::<usize>() {
			Ok(index) => (parent.to_string(), index),
			Err(_) => (path.to_string(), 0),
		},
		None => (path.to_string(), 0),
	}
}

fn apply_string_ops(field: &mut String, ops: Option<&[PatchOp]>, name: &str) {
	let Some(ops) = ops else { return };
	match replacement_value(ops) {
		Some(Value::String(text)) => *field = text.clone(),
		Some(other) => warn!(field = name, ?other, "scalar patch value is not a string, skipping"),
		None => debug!(field = name, "scalar patch has no replace operation, skipping"),
	}
}

fn replacement_value(ops: &[PatchOp]) -> Option<&Value> {
	ops.iter()
		.find(|op| op.op == PatchOpKind::Replace && op.path.is_empty())
		.and_then(|op| op.value.as_ref())
}
