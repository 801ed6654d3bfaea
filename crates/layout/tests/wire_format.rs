//! Loading and re-emitting the layout JSON wire format.
//!
//! Template references live in the serialized document; resolution runs on
//! the JSON shape (variables first), and the typed record is built from the
//! flattened form. String-typed fields may carry unresolved references
//! through the typed record unchanged.

use keyweave_layout::{LayoutData, ParamValue, flatten_value};
use pretty_assertions::assert_eq;
use serde_json::json;

const FIXTURE: &str = r#"{
	"variables": {
		"fast_term": 150,
		"home_flavor": "balanced"
	},
	"keyboard": "glove80",
	"firmware_api_version": "1",
	"locale": "en-US",
	"uuid": "8984a4e0-aaaa-bbbb-cccc-598b03505234",
	"parent_uuid": "",
	"date": 1705314600,
	"creator": "someone",
	"title": "Glorious Engrammer",
	"notes": "",
	"tags": ["engrammer", "dvorak-ish"],
	"version": "42",
	"base_version": "41",
	"base_layout": "glorious-engrammer",
	"layer_names": ["Base", "Lower", "Magic"],
	"config_parameters": [
		{"paramName": "HOLD_TAP_TERM", "value": 200, "description": "default hold-tap term"}
	],
	"holdTaps": [
		{
			"name": "&hml",
			"description": "left homerow mod",
			"bindings": ["&kp", "&kp"],
			"tappingTermMs": "${fast_term}",
			"flavor": "${home_flavor}"
		}
	],
	"combos": [
		{
			"name": "hyper",
			"keyPositions": [10, 11],
			"timeoutMs": 50,
			"layers": [-1],
			"binding": {"value": "&sk", "params": [{"value": "LA", "params": [{"value": "LC", "params": [{"value": "LSHFT"}]}]}]}
		}
	],
	"macros": [
		{
			"name": "&vim_save",
			"waitMs": 10,
			"tapMs": 10,
			"params": [],
			"bindings": [{"value": "&kp", "params": [{"value": "ESC"}]}, {"value": "&kp", "params": [{"value": "COLON"}]}]
		}
	],
	"inputListeners": [
		{
			"code": "&mmv_input_listener",
			"inputProcessors": [{"code": "&zip_xy_scaler", "params": [2, 1]}],
			"nodes": []
		}
	],
	"layers": [
		[{"value": "&kp", "params": [{"value": "Q"}]}, {"value": "&lt", "params": [{"value": 1}, {"value": "SPACE"}]}],
		[{"value": "&trans", "params": []}, {"value": "&to", "params": [{"value": 0}]}],
		[{"value": "&magic", "params": [{"value": 2}, {"value": 0}]}, {"value": "&none", "params": []}]
	],
	"custom_defined_behaviors": "",
	"custom_devicetree": ""
}"#;

fn load_flattened() -> LayoutData {
	let document: serde_json::Value = serde_json::from_str(FIXTURE).unwrap();
	let (flat, warnings) = flatten_value(&document);
	assert!(warnings.is_empty(), "warnings: {warnings:?}");
	LayoutData::from_value(flat).unwrap()
}

#[test]
fn test_flatten_then_type() {
	let layout = load_flattened();

	assert_eq!(layout.keyboard, "glove80");
	assert_eq!(layout.date.timestamp(), 1705314600);
	assert_eq!(layout.layer_names, vec!["Base", "Lower", "Magic"]);
	assert_eq!(layout.layers.len(), 3);
	assert_eq!(layout.layers[0][1].params[0].value, ParamValue::Int(1));
	assert_eq!(layout.config_parameters[0].param_name, "HOLD_TAP_TERM");
	assert_eq!(layout.input_listeners[0].code, "&mmv_input_listener");
	assert_eq!(layout.combos[0].binding.to_string(), "&sk LA(LC(LSHFT))");

	// The templated integer resolved before typing; the templated string
	// resolved to its variable value.
	assert_eq!(layout.hold_taps[0].tapping_term_ms, Some(150));
	assert_eq!(layout.hold_taps[0].flavor.as_deref(), Some("balanced"));

	layout.validate().unwrap();
	assert!(layout.validate_layer_references().is_empty());
}

#[test]
fn test_reemission_preserves_wire_names_and_order() {
	let layout = load_flattened();
	let out = serde_json::to_string(&layout).unwrap();

	for (earlier, later) in [
		("\"keyboard\"", "\"uuid\""),
		("\"date\"", "\"title\""),
		("\"layer_names\"", "\"holdTaps\""),
		("\"holdTaps\"", "\"combos\""),
		("\"combos\"", "\"macros\""),
		("\"macros\"", "\"inputListeners\""),
		("\"inputListeners\"", "\"layers\""),
		("\"layers\"", "\"custom_defined_behaviors\""),
	] {
		let a = out.find(earlier).unwrap_or_else(|| panic!("{earlier} missing"));
		let b = out.find(later).unwrap_or_else(|| panic!("{later} missing"));
		assert!(a < b, "{earlier} must precede {later}");
	}

	let value: serde_json::Value = serde_json::from_str(&out).unwrap();
	assert!(value["date"].is_i64());
	assert_eq!(value["date"], json!(1705314600));
	assert_eq!(value["combos"][0]["keyPositions"], json!([10, 11]));
}

#[test]
fn test_flatten_is_idempotent_on_the_document() {
	let document: serde_json::Value = serde_json::from_str(FIXTURE).unwrap();
	let (once, _) = flatten_value(&document);
	let (twice, _) = flatten_value(&once);
	assert_eq!(once, twice);
	assert!(once.get("variables").is_none());
	assert_eq!(once["holdTaps"][0]["tappingTermMs"], json!(150));
}

#[test]
fn test_unresolved_references_stay_verbatim() {
	let mut document: serde_json::Value = serde_json::from_str(FIXTURE).unwrap();
	document.as_object_mut().unwrap().remove("variables");

	let (flat, warnings) = flatten_value(&document);
	assert_eq!(warnings.len(), 2);
	assert_eq!(flat["holdTaps"][0]["tappingTermMs"], json!("${fast_term}"));
	assert_eq!(flat["holdTaps"][0]["flavor"], json!("${home_flavor}"));
}

#[test]
fn test_unresolved_string_field_rides_the_typed_record() {
	// A template in a string-typed field survives typing untouched while
	// resolution is skipped.
	let _guard = keyweave_layout::SkipResolution::acquire();

	let mut document: serde_json::Value = serde_json::from_str(FIXTURE).unwrap();
	let hold_tap = document["holdTaps"][0].as_object_mut().unwrap();
	hold_tap.insert("tappingTermMs".to_string(), json!(150));

	let (unresolved, warnings) = flatten_value(&document);
	assert!(warnings.is_empty());
	// Skipped resolution leaves the document as-is, variables included.
	assert_eq!(unresolved, document);

	let layout = LayoutData::from_value(unresolved).unwrap();
	assert_eq!(layout.hold_taps[0].flavor.as_deref(), Some("${home_flavor}"));
}
