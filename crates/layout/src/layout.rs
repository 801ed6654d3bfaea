//! The layout record: metadata, layers, behaviors, and custom sections.
//!
//! Field declaration order is the canonical wire order (§ layout JSON
//! format): `variables` comes first so downstream resolvers see definitions
//! before any use, and the bulky layer/behavior data trails the metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::behaviors::{
	ComboBehavior, ConfigParameter, HoldTapBehavior, InputListener, MacroBehavior,
};
use crate::binding::LayoutBinding;
use crate::error::{LayoutError, Result};
use crate::metadata::KeymapMetadata;

/// Behaviors that carry a layer index as their first parameter.
const LAYER_BEHAVIORS: &[&str] = &["&mo", "&lt", "&to", "&tog"];

/// One named row of bindings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutLayer {
	pub name: String,
	pub bindings: Vec<LayoutBinding>,
}

/// A complete keyboard layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutData {
	/// Free-form variables referenced via `${name}` / `{{ expr }}` templates.
	#[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
	pub variables: serde_json::Map<String, Value>,
	pub keyboard: String,
	#[serde(default = "default_firmware_api_version")]
	pub firmware_api_version: String,
	#[serde(default = "default_locale")]
	pub locale: String,
	#[serde(default)]
	pub uuid: String,
	#[serde(default)]
	pub parent_uuid: String,
	#[serde(with = "epoch_date", default = "Utc::now")]
	pub date: DateTime<Utc>,
	#[serde(default)]
	pub creator: String,
	pub title: String,
	#[serde(default)]
	pub notes: String,
	#[serde(default)]
	pub tags: Vec<String>,
	#[serde(default = "default_version")]
	pub version: String,
	#[serde(default)]
	pub base_version: String,
	#[serde(default)]
	pub base_layout: String,
	#[serde(
		rename = "keymapMetadata",
		alias = "keymap_metadata",
		default,
		skip_serializing_if = "KeymapMetadata::is_empty"
	)]
	pub keymap_metadata: KeymapMetadata,
	#[serde(default)]
	pub layer_names: Vec<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub config_parameters: Vec<ConfigParameter>,
	#[serde(rename = "holdTaps", alias = "hold_taps", default)]
	pub hold_taps: Vec<HoldTapBehavior>,
	#[serde(default)]
	pub combos: Vec<ComboBehavior>,
	#[serde(default)]
	pub macros: Vec<MacroBehavior>,
	#[serde(rename = "inputListeners", alias = "input_listeners", default)]
	pub input_listeners: Vec<InputListener>,
	#[serde(default)]
	pub layers: Vec<Vec<LayoutBinding>>,
	#[serde(default)]
	pub custom_defined_behaviors: String,
	#[serde(default)]
	pub custom_devicetree: String,
}

fn default_firmware_api_version() -> String {
	"1".to_string()
}

fn default_locale() -> String {
	"en-US".to_string()
}

fn default_version() -> String {
	"1.0.0".to_string()
}

impl LayoutData {
	/// Create an empty layout with a fresh uuid.
	pub fn new(keyboard: impl Into<String>, title: impl Into<String>) -> Self {
		Self {
			variables: serde_json::Map::new(),
			keyboard: keyboard.into(),
			firmware_api_version: default_firmware_api_version(),
			locale: default_locale(),
			uuid: Uuid::new_v4().to_string(),
			parent_uuid: String::new(),
			date: Utc::now(),
			creator: String::new(),
			title: title.into(),
			notes: String::new(),
			tags: Vec::new(),
			version: default_version(),
			base_version: String::new(),
			base_layout: String::new(),
			keymap_metadata: KeymapMetadata::default(),
			layer_names: Vec::new(),
			config_parameters: Vec::new(),
			hold_taps: Vec::new(),
			combos: Vec::new(),
			macros: Vec::new(),
			input_listeners: Vec::new(),
			layers: Vec::new(),
			custom_defined_behaviors: String::new(),
			custom_devicetree: String::new(),
		}
	}

	/// Index of a layer by name.
	pub fn layer_index(&self, name: &str) -> Option<usize> {
		self.layer_names.iter().position(|n| n == name)
	}

	/// Pair layer names with their rows.
	pub fn structured_layers(&self) -> Vec<LayoutLayer> {
		self.layer_names
			.iter()
			.zip(self.layers.iter())
			.map(|(name, bindings)| LayoutLayer { name: name.clone(), bindings: bindings.clone() })
			.collect()
	}

	/// Serialize to the wire JSON shape.
	pub fn to_value(&self) -> Result<Value> {
		Ok(serde_json::to_value(self)?)
	}

	/// Deserialize from the wire JSON shape.
	pub fn from_value(value: Value) -> Result<Self> {
		Ok(serde_json::from_value(value)?)
	}

	/// Structural validation: duplicate layer names, duplicate behavior
	/// identities, and per-behavior contracts.
	pub fn validate(&self) -> Result<()> {
		let mut seen = Vec::new();
		for name in &self.layer_names {
			if seen.contains(&name) {
				return Err(LayoutError::DuplicateLayer(name.clone()));
			}
			seen.push(name);
		}

		check_unique("hold-tap", self.hold_taps.iter().map(|b| b.name.as_str()))?;
		check_unique("combo", self.combos.iter().map(|b| b.name.as_str()))?;
		check_unique("macro", self.macros.iter().map(|b| b.name.as_str()))?;
		check_unique("input listener", self.input_listeners.iter().map(|b| b.code.as_str()))?;

		for behavior in &self.hold_taps {
			behavior.validate()?;
		}
		for combo in &self.combos {
			combo.validate()?;
		}
		for mac in &self.macros {
			mac.validate()?;
		}
		Ok(())
	}

	/// Report every out-of-range layer reference (`&mo`, `&lt`, `&to`,
	/// `&tog`). References are reported, never mutated.
	pub fn validate_layer_references(&self) -> Vec<String> {
		let count = self.layer_names.len() as i64;
		let mut errors = Vec::new();

		for (layer_name, row) in self.layer_names.iter().zip(self.layers.iter()) {
			for (index, binding) in row.iter().enumerate() {
				if !LAYER_BEHAVIORS.contains(&binding.value.as_str()) {
					continue;
				}
				let Some(layer_ref) = binding.params.first().and_then(|p| p.value.as_int())
				else {
					continue;
				};
				if layer_ref < 0 || layer_ref >= count {
					errors.push(format!(
						"Invalid layer reference in {layer_name}[{index}]: {} {layer_ref} (valid range: 0-{})",
						binding.value,
						count.max(1) - 1,
					));
				}
			}
		}
		errors
	}

	/// Scan a row of binding strings into typed bindings, used by tests and
	/// collaborators that hold textual rows.
	pub fn parse_row(row: &[&str]) -> Vec<LayoutBinding> {
		row.iter().map(|s| LayoutBinding::parse_lenient(s)).collect()
	}
}

fn check_unique<'a>(
	kind: &'static str,
	names: impl Iterator<Item = &'a str>,
) -> Result<()> {
	let mut seen: Vec<&str> = Vec::new();
	for name in names {
		if seen.contains(&name) {
			return Err(LayoutError::DuplicateBehavior { kind, name: name.to_string() });
		}
		seen.push(name);
	}
	Ok(())
}

/// Wire serialization for the `date` field: integer epoch seconds on
/// output; integer epochs and ISO-8601 strings accepted on input.
mod epoch_date {
	use chrono::{DateTime, TimeZone, Utc};
	use serde::{Deserialize, Deserializer, Serializer, de::Error};

	pub fn serialize<S: Serializer>(date: &DateTime<Utc>, ser: S) -> Result<S::Ok, S::Error> {
		ser.serialize_i64(date.timestamp())
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<DateTime<Utc>, D::Error> {
		#[derive(Deserialize)]
		#[serde(untagged)]
		enum Wire {
			Epoch(i64),
			Iso(String),
		}

		match Wire::deserialize(de)? {
			Wire::Epoch(secs) => Utc
				.timestamp_opt(secs, 0)
				.single()
				.ok_or_else(|| D::Error::custom(format!("epoch out of range: {secs}"))),
			Wire::Iso(text) => text
				.parse::<DateTime<Utc>>()
				.or_else(|_| {
					chrono::NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S")
						.map(|naive| naive.and_utc())
				})
				.map_err(|_| D::Error::custom(format!("unrecognized date: {text}"))),
		}
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	fn layout_with_rows(names: &[&str], rows: &[&[&str]]) -> LayoutData {
		let mut layout = LayoutData::new("test", "Test Layout");
		layout.layer_names = names.iter().map(ToString::to_string).collect();
		layout.layers = rows.iter().map(|row| LayoutData::parse_row(row)).collect();
		layout
	}

	#[test]
	fn test_canonical_field_order() {
		let mut layout = LayoutData::new("glove80", "Mine");
		layout.variables.insert("t".into(), serde_json::json!(200));
		layout.layer_names = vec!["Base".into()];
		layout.layers = vec![vec![LayoutBinding::none()]];

		let json = serde_json::to_string(&layout).unwrap();
		let variables = json.find("\"variables\"").unwrap();
		let keyboard = json.find("\"keyboard\"").unwrap();
		let layer_names = json.find("\"layer_names\"").unwrap();
		let hold_taps = json.find("\"holdTaps\"").unwrap();
		let layers = json.find("\"layers\"").unwrap();
		assert!(variables < keyboard);
		assert!(keyboard < layer_names);
		assert!(layer_names < hold_taps);
		assert!(hold_taps < layers);
	}

	#[test]
	fn test_date_round_trip_epoch() {
		let layout = LayoutData::new("kb", "T");
		let value = layout.to_value().unwrap();
		assert!(value["date"].is_i64());

		let back = LayoutData::from_value(value).unwrap();
		assert_eq!(back.date.timestamp(), layout.date.timestamp());
	}

	#[test]
	fn test_date_accepts_iso_strings() {
		for date in ["2024-01-15T10:30:00Z", "2024-01-15T10:30:00"] {
			let value = serde_json::json!({
				"keyboard": "kb",
				"title": "T",
				"date": date,
			});
			let layout = LayoutData::from_value(value).unwrap();
			assert_eq!(layout.date.timestamp(), 1705314600, "date: {date}");
		}
	}

	#[test]
	fn test_defaults_applied() {
		let value = serde_json::json!({"keyboard": "kb", "title": "T"});
		let layout = LayoutData::from_value(value).unwrap();
		assert_eq!(layout.firmware_api_version, "1");
		assert_eq!(layout.locale, "en-US");
		assert_eq!(layout.version, "1.0.0");
		assert!(layout.layers.is_empty());
	}

	#[test]
	fn test_layer_reference_validation() {
		let layout = layout_with_rows(
			&["Base", "Nav"],
			&[&["&mo 1", "&lt 2 SPACE", "&tog 3"], &["&to 0", "&mo 5", "&trans"]],
		);
		let errors = layout.validate_layer_references();
		assert_eq!(
			errors,
			vec![
				"Invalid layer reference in Base[1]: &lt 2 (valid range: 0-1)",
				"Invalid layer reference in Base[2]: &tog 3 (valid range: 0-1)",
				"Invalid layer reference in Nav[1]: &mo 5 (valid range: 0-1)",
			]
		);
	}

	#[test]
	fn test_layer_reference_negative_index() {
		let layout = layout_with_rows(&["Base", "Nav"], &[&["&mo -1", "&trans"], &["&to 0"]]);
		let errors = layout.validate_layer_references();
		assert_eq!(errors, vec!["Invalid layer reference in Base[0]: &mo -1 (valid range: 0-1)"]);
	}

	#[test]
	fn test_layer_reference_ignores_other_behaviors() {
		let layout = layout_with_rows(
			&["Base", "Nav"],
			&[&["&kp Q", "&mt LCTRL A", "&mo 1", "&trans", "&none"], &["&kp LEFT", "&to 0"]],
		);
		assert!(layout.validate_layer_references().is_empty());
	}

	#[test]
	fn test_self_reference_is_valid() {
		let layout = layout_with_rows(&["Base"], &[&["&mo 0", "&to 0", "&trans"]]);
		assert!(layout.validate_layer_references().is_empty());
	}

	#[test]
	fn test_validate_duplicate_layer_names() {
		let layout = layout_with_rows(&["Base", "Base"], &[&["&trans"], &["&trans"]]);
		assert!(matches!(layout.validate(), Err(LayoutError::DuplicateLayer(_))));
	}

	#[test]
	fn test_validate_duplicate_behavior_names() {
		let mut layout = LayoutData::new("kb", "T");
		for _ in 0..2 {
			let mut ht = HoldTapBehavior::new("&hm");
			ht.bindings = vec!["&kp".into(), "&kp".into()];
			layout.hold_taps.push(ht);
		}
		assert!(matches!(
			layout.validate(),
			Err(LayoutError::DuplicateBehavior { kind: "hold-tap", .. })
		));
	}

	#[test]
	fn test_structured_layers() {
		let layout = layout_with_rows(&["Base", "Nav"], &[&["&kp Q"], &["&kp W"]]);
		let structured = layout.structured_layers();
		assert_eq!(structured.len(), 2);
		assert_eq!(structured[0].name, "Base");
		assert_eq!(structured[1].bindings[0].value, "&kp");
	}

}
