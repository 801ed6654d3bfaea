//! In-place layer operations: add, remove, move, list, export.
//!
//! File handling stays with callers; every operation works on a
//! [`LayoutData`] already in memory. The remove identifier resolves, in
//! order: decimal index, exact name, `*` wildcard, regex.

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::binding::LayoutBinding;
use crate::error::{LayoutError, Result};
use crate::layout::LayoutData;

/// Fallback key count when no keyboard profile is available.
pub const DEFAULT_KEY_COUNT: usize = 80;

/// Where a new layer's bindings come from.
#[derive(Debug, Clone, Copy)]
pub enum LayerSource<'a> {
	/// Fill with the no-op binding up to the configured key count.
	Empty,
	/// Copy bindings from an existing layer.
	CopyFrom(&'a str),
	/// Import from external JSON: a bindings array, a `{name, bindings}`
	/// object, or a full layout (then `layer` selects which row).
	ImportFrom { data: &'a Value, layer: Option<&'a str> },
}

/// Export shapes for a single layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
	Bindings,
	Layer,
	Full,
}

impl std::str::FromStr for ExportFormat {
	type Err = LayoutError;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"bindings" => Ok(Self::Bindings),
			"layer" => Ok(Self::Layer),
			"full" => Ok(Self::Full),
			other => Err(LayoutError::InvalidExportFormat(other.to_string())),
		}
	}
}

/// One removed layer in a [`RemoveReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedLayer {
	pub name: String,
	pub position: usize,
}

/// Outcome of a remove operation.
#[derive(Debug, Clone, Default)]
pub struct RemoveReport {
	pub removed_count: usize,
	pub removed_layers: Vec<RemovedLayer>,
	pub warnings: Vec<String>,
	pub had_matches: bool,
}

/// Outcome of a move operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveReport {
	pub name: String,
	pub from_position: usize,
	pub to_position: usize,
	pub moved: bool,
}

/// Summary row for [`LayerOps::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerInfo {
	pub position: usize,
	pub name: String,
	pub binding_count: usize,
}

/// Layer operations parameterized by the keyboard profile's key count and
/// no-op binding.
#[derive(Debug, Clone)]
pub struct LayerOps {
	key_count: usize,
	fill: LayoutBinding,
}

impl Default for LayerOps {
	fn default() -> Self {
		Self { key_count: DEFAULT_KEY_COUNT, fill: LayoutBinding::none() }
	}
}

impl LayerOps {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_key_count(mut self, key_count: usize) -> Self {
		self.key_count = key_count;
		self
	}

	pub fn with_fill_binding(mut self, fill: LayoutBinding) -> Self {
		self.fill = fill;
		self
	}

	/// Insert a new layer. Returns the position it landed at.
	pub fn add(
		&self,
		layout: &mut LayoutData,
		name: &str,
		position: Option<isize>,
		source: LayerSource<'_>,
	) -> Result<usize> {
		if layout.layer_index(name).is_some() {
			return Err(LayoutError::DuplicateLayer(name.to_string()));
		}

		let count = layout.layer_names.len();
		let position = normalize_insert_position(position, count)?;
		let bindings = self.build_bindings(layout, source)?;

		layout.layer_names.insert(position, name.to_string());
		layout.layers.insert(position.min(layout.layers.len()), bindings);
		debug!(layer = name, position, "added layer");
		Ok(position)
	}

	/// Remove every layer matching `identifier`. Matches are removed in
	/// descending position order so earlier indices stay valid throughout.
	pub fn remove(&self, layout: &mut LayoutData, identifier: &str) -> RemoveReport {
		let mut report = RemoveReport::default();
		let mut matches = self.find_layers_to_remove(layout, identifier, &mut report.warnings);

		if matches.is_empty() {
			report.warnings.push(format!("no layers match '{identifier}'"));
			return report;
		}
		report.had_matches = true;

		matches.sort_by(|a, b| b.position.cmp(&a.position));
		for entry in matches {
			layout.layer_names.remove(entry.position);
			if entry.position < layout.layers.len() {
				layout.layers.remove(entry.position);
			}
			debug!(layer = %entry.name, position = entry.position, "removed layer");
			report.removed_layers.push(entry);
		}
		report.removed_count = report.removed_layers.len();
		// Report in ascending original position for readability.
		report.removed_layers.sort_by_key(|entry| entry.position);
		report
	}

	/// Resolve a remove identifier to matching layers without mutating.
	pub fn find_layers_to_remove(
		&self,
		layout: &LayoutData,
		identifier: &str,
		warnings: &mut Vec<String>,
	) -> Vec<RemovedLayer> {
		// A bare non-negative decimal is a layer index.
		if let Ok(index) = identifier.parse::<usize>() {
			return match layout.layer_names.get(index) {
				Some(name) => vec![RemovedLayer { name: name.clone(), position: index }],
				None => {
					warnings.push(format!(
						"layer index {index} out of range ({} layers)",
						layout.layer_names.len()
					));
					Vec::new()
				}
			};
		}

		// Exact name match wins over pattern interpretation.
		if let Some(position) = layout.layer_index(identifier) {
			return vec![RemovedLayer { name: identifier.to_string(), position }];
		}

		let pattern = if is_plain_wildcard(identifier) {
			wildcard_to_regex(identifier)
		} else {
			format!("^(?:{identifier})$")
		};
		let regex = match Regex::new(&pattern) {
			Ok(regex) => regex,
			Err(err) => {
				warn!(identifier, %err, "invalid layer pattern");
				warnings.push(format!("invalid pattern '{identifier}': {err}"));
				return Vec::new();
			}
		};

		layout
			.layer_names
			.iter()
			.enumerate()
			.filter(|(_, name)| regex.is_match(name))
			.map(|(position, name)| RemovedLayer { name: name.clone(), position })
			.collect()
	}

	/// Move a layer to `new_position` (negative counts from the end).
	/// A no-op when source and destination coincide.
	pub fn move_layer(
		&self,
		layout: &mut LayoutData,
		name: &str,
		new_position: isize,
	) -> Result<MoveReport> {
		let from = layout
			.layer_index(name)
			.ok_or_else(|| LayoutError::LayerNotFound(name.to_string()))?;

		let count = layout.layer_names.len();
		let to = clamp_move_position(new_position, count);

		if from == to {
			return Ok(MoveReport { name: name.to_string(), from_position: from, to_position: to, moved: false });
		}

		let layer_name = layout.layer_names.remove(from);
		let bindings = (from < layout.layers.len()).then(|| layout.layers.remove(from));

		layout.layer_names.insert(to, layer_name);
		if let Some(bindings) = bindings {
			layout.layers.insert(to.min(layout.layers.len()), bindings);
		}

		debug!(layer = name, from, to, "moved layer");
		Ok(MoveReport { name: name.to_string(), from_position: from, to_position: to, moved: true })
	}

	pub fn list(&self, layout: &LayoutData) -> Vec<LayerInfo> {
		layout
			.layer_names
			.iter()
			.enumerate()
			.map(|(position, name)| LayerInfo {
				position,
				name: name.clone(),
				binding_count: layout.layers.get(position).map_or(0, Vec::len),
			})
			.collect()
	}

	/// Export a single layer in the requested shape.
	pub fn export(
		&self,
		layout: &LayoutData,
		name: &str,
		format: ExportFormat,
	) -> Result<Value> {
		let position = layout
			.layer_index(name)
			.ok_or_else(|| LayoutError::LayerNotFound(name.to_string()))?;
		let bindings = layout
			.layers
			.get(position)
			.ok_or_else(|| LayoutError::LayerNotFound(name.to_string()))?;

		let bindings_value = serde_json::to_value(bindings)?;
		let value = match format {
			ExportFormat::Bindings => bindings_value,
			ExportFormat::Layer => serde_json::json!({
				"name": name,
				"bindings": bindings_value,
			}),
			ExportFormat::Full => {
				let mut single = LayoutData::new(layout.keyboard.clone(), format!("Exported layer: {name}"));
				single.parent_uuid = layout.uuid.clone();
				single.creator = layout.creator.clone();
				single.locale = layout.locale.clone();
				single.layer_names = vec![name.to_string()];
				single.layers = vec![bindings.clone()];
				single.to_value()?
			}
		};
		Ok(value)
	}

	fn build_bindings(
		&self,
		layout: &LayoutData,
		source: LayerSource<'_>,
	) -> Result<Vec<LayoutBinding>> {
		match source {
			LayerSource::Empty => Ok(vec![self.fill.clone(); self.key_count]),
			LayerSource::CopyFrom(source_name) => {
				let index = layout
					.layer_index(source_name)
					.ok_or_else(|| LayoutError::LayerNotFound(source_name.to_string()))?;
				layout
					.layers
					.get(index)
					.cloned()
					.ok_or_else(|| LayoutError::LayerNotFound(source_name.to_string()))
			}
			LayerSource::ImportFrom { data, layer } => self.import_bindings(data, layer),
		}
	}

	fn import_bindings(&self, data: &Value, layer: Option<&str>) -> Result<Vec<LayoutBinding>> {
		match data {
			Value::Array(_) => Ok(convert_bindings(data)?),
			Value::Object(map) => {
				if let Some(layer_name) = layer {
					let names: Vec<String> = map
						.get("layer_names")
						.and_then(Value::as_array)
						.map(|names| {
							names.iter().filter_map(Value::as_str).map(str::to_string).collect()
						})
						.unwrap_or_default();
					let index = names.iter().position(|n| n == layer_name).ok_or_else(|| {
						LayoutError::InvalidImport(format!(
							"layer '{layer_name}' not found (available: {})",
							names.join(", ")
						))
					})?;
					let row = map
						.get("layers")
						.and_then(Value::as_array)
						.and_then(|layers| layers.get(index))
						.ok_or_else(|| {
							LayoutError::InvalidImport(format!(
								"layer '{layer_name}' has no binding data"
							))
						})?;
					convert_bindings(row)
				} else if let Some(bindings) = map.get("bindings") {
					convert_bindings(bindings)
				} else if map.contains_key("layers") {
					Err(LayoutError::InvalidImport(
						"import data is a full layout; specify which layer to import".to_string(),
					))
				} else {
					Err(LayoutError::InvalidImport(
						"expected a bindings array, a layer object, or a full layout".to_string(),
					))
				}
			}
			_ => Err(LayoutError::InvalidImport(
				"expected a bindings array, a layer object, or a full layout".to_string(),
			)),
		}
	}
}

fn convert_bindings(value: &Value) -> Result<Vec<LayoutBinding>> {
	let items = value
		.as_array()
		.ok_or_else(|| LayoutError::InvalidImport("bindings must be an array".to_string()))?;
	items
		.iter()
		.map(|item| match item {
			Value::String(text) => Ok(LayoutBinding::parse_lenient(text)),
			other => Ok(serde_json::from_value(other.clone())?),
		})
		.collect()
}

fn normalize_insert_position(position: Option<isize>, count: usize) -> Result<usize> {
	let Some(position) = position else {
		return Ok(count);
	};
	let resolved = if position < 0 { position + count as isize } else { position };
	if resolved < 0 || resolved > count as isize {
		return Err(LayoutError::InvalidPosition { position, count });
	}
	Ok(resolved as usize)
}

fn clamp_move_position(position: isize, count: usize) -> usize {
	if position < 0 {
		(count as isize + position).max(0) as usize
	} else {
		(position as usize).min(count.saturating_sub(1))
	}
}

/// A `*` wildcard with no other regex metacharacters.
fn is_plain_wildcard(identifier: &str) -> bool {
	identifier.contains('*')
		&& !identifier.chars().any(|c| ".+?^$()[]{}|\\".contains(c))
}

fn wildcard_to_regex(identifier: &str) -> String {
	let escaped: String = identifier
		.chars()
		.map(|c| if c == '*' { ".*".to_string() } else { regex::escape(&c.to_string()) })
		.collect();
	format!("^{escaped}$")
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	fn layout(names: &[&str]) -> LayoutData {
		let mut layout = LayoutData::new("test", "Test");
		layout.layer_names = names.iter().map(ToString::to_string).collect();
		layout.layers = names
			.iter()
			.enumerate()
			.map(|(i, _)| vec![LayoutBinding::with_params("&mo", vec![crate::binding::LayoutParam::new(i as i64)])])
			.collect();
		layout
	}

	#[test]
	fn test_add_empty_layer_fills_key_count() {
		let mut data = layout(&["Base"]);
		let ops = LayerOps::new().with_key_count(4);
		let position = ops.add(&mut data, "Nav", None, LayerSource::Empty).unwrap();
		assert_eq!(position, 1);
		assert_eq!(data.layers[1].len(), 4);
		assert!(data.layers[1].iter().all(|b| b.value == "&none"));
	}

	#[test]
	fn test_add_at_position_and_negative() {
		let mut data = layout(&["A", "B", "C"]);
		let ops = LayerOps::new().with_key_count(1);
		assert_eq!(ops.add(&mut data, "X", Some(1), LayerSource::Empty).unwrap(), 1);
		assert_eq!(data.layer_names, vec!["A", "X", "B", "C"]);
		assert_eq!(ops.add(&mut data, "Y", Some(-1), LayerSource::Empty).unwrap(), 3);
		assert_eq!(data.layer_names, vec!["A", "X", "B", "Y", "C"]);
	}

	#[test]
	fn test_add_duplicate_name_rejected() {
		let mut data = layout(&["Base"]);
		let ops = LayerOps::new();
		assert!(matches!(
			ops.add(&mut data, "Base", None, LayerSource::Empty),
			Err(LayoutError::DuplicateLayer(_))
		));
	}

	#[test]
	fn test_add_copy_from() {
		let mut data = layout(&["Base"]);
		let ops = LayerOps::new();
		ops.add(&mut data, "Clone", None, LayerSource::CopyFrom("Base")).unwrap();
		assert_eq!(data.layers[1], data.layers[0]);
	}

	#[test]
	fn test_add_import_bindings_array() {
		let mut data = layout(&["Base"]);
		let ops = LayerOps::new();
		let import = serde_json::json!([{"value": "&kp", "params": [{"value": "Q"}]}, "&trans"]);
		ops.add(&mut data, "Imported", None, LayerSource::ImportFrom { data: &import, layer: None })
			.unwrap();
		assert_eq!(data.layers[1][0].value, "&kp");
		assert_eq!(data.layers[1][1].value, "&trans");
	}

	#[test]
	fn test_add_import_specific_layer_from_full_layout() {
		let mut data = layout(&["Base"]);
		let ops = LayerOps::new();
		let import = serde_json::json!({
			"layer_names": ["One", "Two"],
			"layers": [[{"value": "&kp", "params": []}], [{"value": "&mo", "params": []}]],
		});
		ops.add(&mut data, "Two", None, LayerSource::ImportFrom { data: &import, layer: Some("Two") })
			.unwrap();
		assert_eq!(data.layers[1][0].value, "&mo");

		let err = ops
			.add(&mut data, "Three", None, LayerSource::ImportFrom { data: &import, layer: None })
			.unwrap_err();
		assert!(matches!(err, LayoutError::InvalidImport(_)));
	}

	#[test]
	fn test_remove_by_index_and_name() {
		let mut data = layout(&["Base", "Nav", "Num"]);
		let ops = LayerOps::new();

		let report = ops.remove(&mut data, "1");
		assert_eq!(report.removed_count, 1);
		assert_eq!(report.removed_layers[0].name, "Nav");
		assert_eq!(data.layer_names, vec!["Base", "Num"]);

		let report = ops.remove(&mut data, "Num");
		assert_eq!(report.removed_count, 1);
		assert!(report.had_matches);
		assert_eq!(data.layer_names, vec!["Base"]);
	}

	#[test]
	fn test_remove_by_wildcard() {
		let mut data = layout(&["Base", "Mouse", "MouseSlow", "MouseFast", "Upper"]);
		let ops = LayerOps::new();

		let report = ops.remove(&mut data, "Mouse*");
		assert_eq!(report.removed_count, 3);
		assert!(report.had_matches);
		let removed: Vec<_> = report.removed_layers.iter().map(|r| r.name.clone()).collect();
		assert_eq!(removed, vec!["Mouse", "MouseSlow", "MouseFast"]);
		assert_eq!(data.layer_names, vec!["Base", "Upper"]);
		assert_eq!(data.layers.len(), 2);
	}

	#[test]
	fn test_remove_by_regex() {
		let mut data = layout(&["Base", "Index1", "Index2", "Upper"]);
		let ops = LayerOps::new();
		let report = ops.remove(&mut data, "Index[12]");
		assert_eq!(report.removed_count, 2);
		assert_eq!(data.layer_names, vec!["Base", "Upper"]);
	}

	#[test]
	fn test_remove_no_match_reports() {
		let mut data = layout(&["Base"]);
		let ops = LayerOps::new();
		let report = ops.remove(&mut data, "Ghost");
		assert_eq!(report.removed_count, 0);
		assert!(!report.had_matches);
		assert!(!report.warnings.is_empty());
		assert_eq!(data.layer_names, vec!["Base"]);
	}

	#[test]
	fn test_remove_invalid_regex_warns() {
		let mut data = layout(&["Base"]);
		let ops = LayerOps::new();
		let report = ops.remove(&mut data, "Nav["); // not a wildcard, invalid regex
		assert_eq!(report.removed_count, 0);
		assert!(!report.had_matches);
		assert!(report.warnings.iter().any(|w| w.contains("invalid pattern")));
	}

	#[test]
	fn test_wildcard_with_regex_meta_is_regex() {
		// Contains both '*' and regex metacharacters: treated as a regex,
		// not converted.
		assert!(!is_plain_wildcard("Mouse.*"));
		assert!(is_plain_wildcard("Mouse*"));
		assert!(is_plain_wildcard("*ouse*"));
	}

	#[test]
	fn test_descending_removal_matches_recomputed_indices() {
		// Removing matches one at a time, recomputing indices after each
		// removal, must agree with the descending-order batch removal.
		let names = ["A", "Mouse", "B", "MouseSlow", "MouseFast", "C"];
		let ops = LayerOps::new();

		let mut batch = layout(&names);
		ops.remove(&mut batch, "Mouse*");

		let mut serial = layout(&names);
		for target in ["Mouse", "MouseSlow", "MouseFast"] {
			ops.remove(&mut serial, target);
		}

		assert_eq!(batch.layer_names, serial.layer_names);
		assert_eq!(batch.layers, serial.layers);
	}

	#[test]
	fn test_move_layer() {
		let mut data = layout(&["base", "lower", "raise", "adjust"]);
		let ops = LayerOps::new();

		let report = ops.move_layer(&mut data, "lower", 2).unwrap();
		assert!(report.moved);
		assert_eq!(data.layer_names, vec!["base", "raise", "lower", "adjust"]);
		// Binding rows travel with their layer.
		assert_eq!(data.layers[2][0].params[0].value, crate::binding::ParamValue::Int(1));
	}

	#[test]
	fn test_move_noop_when_same_position() {
		let mut data = layout(&["A", "B"]);
		let ops = LayerOps::new();
		let report = ops.move_layer(&mut data, "B", 1).unwrap();
		assert!(!report.moved);
		assert_eq!(data.layer_names, vec!["A", "B"]);
	}

	#[test]
	fn test_move_clamps_out_of_range() {
		let mut data = layout(&["A", "B", "C"]);
		let ops = LayerOps::new();
		let report = ops.move_layer(&mut data, "A", 99).unwrap();
		assert_eq!(report.to_position, 2);
		assert_eq!(data.layer_names, vec!["B", "C", "A"]);

		let report = ops.move_layer(&mut data, "A", -3).unwrap();
		assert_eq!(report.to_position, 0);
		assert_eq!(data.layer_names, vec!["A", "B", "C"]);
	}

	#[test]
	fn test_list() {
		let data = layout(&["Base", "Nav"]);
		let ops = LayerOps::new();
		let info = ops.list(&data);
		assert_eq!(info.len(), 2);
		assert_eq!(info[1], LayerInfo { position: 1, name: "Nav".into(), binding_count: 1 });
	}

	#[test]
	fn test_export_formats() {
		let data = layout(&["Base"]);
		let ops = LayerOps::new();

		let bindings = ops.export(&data, "Base", ExportFormat::Bindings).unwrap();
		assert!(bindings.is_array());

		let layer = ops.export(&data, "Base", ExportFormat::Layer).unwrap();
		assert_eq!(layer["name"], "Base");
		assert!(layer["bindings"].is_array());

		let full = ops.export(&data, "Base", ExportFormat::Full).unwrap();
		assert_eq!(full["keyboard"], "test");
		assert_eq!(full["title"], "Exported layer: Base");
		assert_eq!(full["layer_names"], serde_json::json!(["Base"]));
		assert_eq!(full["parent_uuid"], data.uuid);
	}

	#[test]
	fn test_export_unknown_layer() {
		let data = layout(&["Base"]);
		let ops = LayerOps::new();
		assert!(matches!(
			ops.export(&data, "Ghost", ExportFormat::Bindings),
			Err(LayoutError::LayerNotFound(_))
		));
	}
}
