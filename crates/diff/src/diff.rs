//! Structural diff computation.
//!
//! Layers diff by name with position tracking; behaviors diff by identity
//! with record-scoped JSON-Patch; metadata scalars diff wholesale. Output
//! ordering is stable: layers by position, behaviors lexicographically by
//! name, record operations by path.

use keyweave_layout::{LayoutBinding, LayoutData};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::DiffError;
use crate::models::{
	AddedLayer, BehaviorChanges, BehaviorEntry, LayerChanges, LayerModification, LayoutDiff,
	PatchOp, RemovedLayer,
};

/// Compute a structural diff between two layouts. Neither input is mutated.
pub fn create_layout_diff(
	base: &LayoutData,
	modified: &LayoutData,
) -> Result<LayoutDiff, DiffError> {
	let mut diff = LayoutDiff::new();
	diff.base_version = base.version.clone();
	diff.modified_version = modified.version.clone();
	diff.base_uuid = base.uuid.clone();
	diff.modified_uuid = modified.uuid.clone();

	diff.layers = layer_changes(base, modified)?;
	diff.hold_taps = behavior_changes(&base.hold_taps, &modified.hold_taps, |b| &b.name)?;
	diff.combos = behavior_changes(&base.combos, &modified.combos, |b| &b.name)?;
	diff.macros = behavior_changes(&base.macros, &modified.macros, |b| &b.name)?;
	diff.input_listeners =
		behavior_changes(&base.input_listeners, &modified.input_listeners, |b| &b.code)?;

	diff.title = scalar_patch(&base.title, &modified.title)?;
	diff.creator = scalar_patch(&base.creator, &modified.creator)?;
	diff.notes = scalar_patch(&base.notes, &modified.notes)?;
	diff.tags = tags_patch(&base.tags, &modified.tags);
	diff.locale = scalar_patch(&base.locale, &modified.locale)?;
	diff.parent_uuid = scalar_patch(&base.parent_uuid, &modified.parent_uuid)?;
	diff.date = (base.date.timestamp() != modified.date.timestamp())
		.then(|| vec![PatchOp::replace("", Value::from(modified.date.timestamp()))]);
	diff.base_layout = scalar_patch(&base.base_layout, &modified.base_layout)?;
	diff.custom_defined_behaviors =
		scalar_patch(&base.custom_defined_behaviors, &modified.custom_defined_behaviors)?;
	diff.custom_devicetree =
		scalar_patch(&base.custom_devicetree, &modified.custom_devicetree)?;

	debug!(has_changes = diff.has_changes(), "computed layout diff");
	Ok(diff)
}

fn layer_changes(base: &LayoutData, modified: &LayoutData) -> Result<LayerChanges, DiffError> {
	let mut changes = LayerChanges::default();

	for (new_position, name) in modified.layer_names.iter().enumerate() {
		if base.layer_index(name).is_none() {
			changes.added.push(AddedLayer {
				name: name.clone(),
				new_position,
				data: row_value(modified, new_position)?,
			});
		}
	}

	for (original_position, name) in base.layer_names.iter().enumerate() {
		if modified.layer_index(name).is_none() {
			changes.removed.push(RemovedLayer {
				name: name.clone(),
				original_position,
				data: row_value(base, original_position)?,
			});
		}
	}

	// Common layers, ordered by base position.
	for (original_position, name) in base.layer_names.iter().enumerate() {
		let Some(new_position) = modified.layer_index(name) else { continue };

		let empty = Vec::new();
		let base_row = base.layers.get(original_position).unwrap_or(&empty);
		let modified_row = modified.layers.get(new_position).unwrap_or(&empty);
		let patch = row_diff(base_row, modified_row)?;
		let position_changed = original_position != new_position;

		if !patch.is_empty() || position_changed {
			changes.modified.insert(
				name.clone(),
				LayerModification { original_position, new_position, position_changed, patch },
			);
		}
	}

	Ok(changes)
}

fn row_value(layout: &LayoutData, index: usize) -> Result<Value, DiffError> {
	match layout.layers.get(index) {
		Some(row) => Ok(serde_json::to_value(row)?),
		None => Ok(Value::Array(Vec::new())),
	}
}

/// Index-wise row patch: `replace` for mismatches, `add` for a grown tail,
/// `remove` for a shrunk one. Paths are bare indices in canonical form.
fn row_diff(base: &[LayoutBinding], modified: &[LayoutBinding]) -> Result<Vec<PatchOp>, DiffError> {
	let mut ops = Vec::new();
	let common = base.len().min(modified.len());

	for index in 0..common {
		if base[index] != modified[index] {
			ops.push(PatchOp::replace(
				index.to_string(),
				serde_json::to_value(&modified[index])?,
			));
		}
	}
	for (index, binding) in modified.iter().enumerate().skip(common) {
		ops.push(PatchOp::add(index.to_string(), serde_json::to_value(binding)?));
	}
	for index in common..base.len() {
		ops.push(PatchOp::remove(index.to_string()));
	}
	Ok(ops)
}

/// Identity-keyed behavior diff; added/removed/modified are each ordered
/// lexicographically by identity.
fn behavior_changes<T: Serialize>(
	base: &[T],
	modified: &[T],
	identity: impl Fn(&T) -> &str,
) -> Result<BehaviorChanges, DiffError> {
	let mut changes = BehaviorChanges::default();

	let base_by_name: Vec<(&str, &T)> = base.iter().map(|b| (identity(b), b)).collect();
	let modified_by_name: Vec<(&str, &T)> = modified.iter().map(|b| (identity(b), b)).collect();

	let mut added: Vec<&(&str, &T)> = modified_by_name
		.iter()
		.filter(|(name, _)| !base_by_name.iter().any(|(n, _)| n == name))
		.collect();
	added.sort_by(|a, b| a.0.cmp(b.0));
	for (name, behavior) in added {
		changes
			.added
			.push(BehaviorEntry { name: (*name).to_string(), data: serde_json::to_value(behavior)? });
	}

	let mut removed: Vec<&(&str, &T)> = base_by_name
		.iter()
		.filter(|(name, _)| !modified_by_name.iter().any(|(n, _)| n == name))
		.collect();
	removed.sort_by(|a, b| a.0.cmp(b.0));
	for (name, behavior) in removed {
		changes
			.removed
			.push(BehaviorEntry { name: (*name).to_string(), data: serde_json::to_value(behavior)? });
	}

	let mut common: Vec<&str> = base_by_name
		.iter()
		.filter(|(name, _)| modified_by_name.iter().any(|(n, _)| n == name))
		.map(|(name, _)| *name)
		.collect();
	common.sort_unstable();

	for name in common {
		let base_value = serde_json::to_value(
			base_by_name.iter().find(|(n, _)| *n == name).map(|(_, b)| b).expect("common"),
		)?;
		let modified_value = serde_json::to_value(
			modified_by_name.iter().find(|(n, _)| *n == name).map(|(_, b)| b).expect("common"),
		)?;

		let mut ops = Vec::new();
		value_diff(&base_value, &modified_value, "", &mut ops);
		if !ops.is_empty() {
			ops.sort_by(|a, b| a.path.cmp(&b.path));
			changes.modified.insert(name.to_string(), ops);
		}
	}

	Ok(changes)
}

/// Recursive value diff with JSON-pointer paths. Arrays use the same
/// index-wise canonical form as binding rows.
fn value_diff(base: &Value, modified: &Value, path: &str, ops: &mut Vec<PatchOp>) {
	match (base, modified) {
		(Value::Object(base_map), Value::Object(modified_map)) => {
			for (key, base_item) in base_map {
				let child = format!("{path}/{key}");
				match modified_map.get(key) {
					Some(modified_item) => value_diff(base_item, modified_item, &child, ops),
					None => ops.push(PatchOp::remove(child)),
				}
			}
			for (key, modified_item) in modified_map {
				if !base_map.contains_key(key) {
					ops.push(PatchOp::add(format!("{path}/{key}"), modified_item.clone()));
				}
			}
		}
		(Value::Array(base_items), Value::Array(modified_items)) => {
			let common = base_items.len().min(modified_items.len());
			for index in 0..common {
				value_diff(
					&base_items[index],
					&modified_items[index],
					&format!("{path}/{index}"),
					ops,
				);
			}
			for (index, item) in modified_items.iter().enumerate().skip(common) {
				ops.push(PatchOp::add(format!("{path}/{index}"), item.clone()));
			}
			for index in common..base_items.len() {
				ops.push(PatchOp::remove(format!("{path}/{index}")));
			}
		}
		(base_value, modified_value) => {
			if base_value != modified_value {
				ops.push(PatchOp::replace(path, modified_value.clone()));
			}
		}
	}
}

fn scalar_patch(base: &str, modified: &str) -> Result<Option<Vec<PatchOp>>, DiffError> {
	Ok((base != modified)
		.then(|| vec![PatchOp::replace("", Value::String(modified.to_string()))]))
}

/// Tags are a set: order is not significant.
fn tags_patch(base: &[String], modified: &[String]) -> Option<Vec<PatchOp>> {
	let mut base_sorted = base.to_vec();
	let mut modified_sorted = modified.to_vec();
	base_sorted.sort();
	modified_sorted.sort();
	(base_sorted != modified_sorted).then(|| {
		vec![PatchOp::replace(
			"",
			Value::Array(modified.iter().map(|t| Value::String(t.clone())).collect()),
		)]
	})
}
