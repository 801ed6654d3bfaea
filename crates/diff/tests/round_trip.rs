//! Diff/patch round-trip: applying a diff to its base reproduces the
//! modified layout.

use keyweave_diff::{LayoutDiff, PatchOp, apply_patch, create_layout_diff};
use keyweave_layout::{ComboBehavior, HoldTapBehavior, LayoutData, MacroBehavior};
use pretty_assertions::assert_eq;

fn layout(names: &[&str], rows: &[&[&str]]) -> LayoutData {
	let mut layout = LayoutData::new("test_keyboard", "Test Layout");
	layout.uuid = "uuid-base".to_string();
	layout.layer_names = names.iter().map(ToString::to_string).collect();
	layout.layers = rows.iter().map(|row| LayoutData::parse_row(row)).collect();
	layout
}

fn hold_tap(name: &str, term: i64) -> HoldTapBehavior {
	let mut ht = HoldTapBehavior::new(name);
	ht.bindings = vec!["&kp".into(), "&kp".into()];
	ht.tapping_term_ms = Some(term);
	ht
}

fn combo(name: &str, positions: &[i64], binding: &str) -> ComboBehavior {
	ComboBehavior {
		name: name.to_string(),
		key_positions: positions.to_vec(),
		layers: Some(vec![-1]),
		binding: binding.parse().unwrap(),
		..ComboBehavior::default()
	}
}

fn assert_round_trip(base: &LayoutData, modified: &LayoutData) {
	let diff = create_layout_diff(base, modified).unwrap();
	let patched = apply_patch(base, &diff).unwrap();

	assert_eq!(patched.layer_names, modified.layer_names);
	assert_eq!(patched.layers, modified.layers);
	assert_eq!(patched.title, modified.title);
	assert_eq!(patched.version, modified.version);
	assert_eq!(patched.uuid, modified.uuid);

	let sort_names = |mut v: Vec<String>| {
		v.sort();
		v
	};
	assert_eq!(
		sort_names(patched.hold_taps.iter().map(|b| b.name.clone()).collect()),
		sort_names(modified.hold_taps.iter().map(|b| b.name.clone()).collect()),
	);
	for behavior in &patched.hold_taps {
		let expected = modified.hold_taps.iter().find(|b| b.name == behavior.name).unwrap();
		assert_eq!(behavior, expected);
	}
	for behavior in &patched.combos {
		let expected = modified.combos.iter().find(|b| b.name == behavior.name).unwrap();
		assert_eq!(behavior, expected);
	}
	for behavior in &patched.macros {
		let expected = modified.macros.iter().find(|b| b.name == behavior.name).unwrap();
		assert_eq!(behavior, expected);
	}
}

#[test]
fn test_single_key_change_round_trip() {
	let base = layout(&["layer_0"], &[&["&kp Q", "&kp W"]]);
	let modified = layout(&["layer_0"], &[&["&kp A", "&kp W"]]);
	assert_round_trip(&base, &modified);
}

#[test]
fn test_layer_reorder_round_trip() {
	let rows: &[&[&str]] = &[&["&kp A"], &["&kp B"], &["&kp C"], &["&kp D"]];
	let base = layout(&["base", "lower", "raise", "adjust"], rows);
	let reordered: &[&[&str]] = &[&["&kp A"], &["&kp C"], &["&kp B"], &["&kp D"]];
	let modified = layout(&["base", "raise", "lower", "adjust"], reordered);
	assert_round_trip(&base, &modified);
}

#[test]
fn test_full_rotation_round_trip() {
	let base = layout(&["a", "b", "c"], &[&["&kp A"], &["&kp B"], &["&kp C"]]);
	let modified = layout(&["c", "a", "b"], &[&["&kp C"], &["&kp A"], &["&kp B"]]);
	assert_round_trip(&base, &modified);
}

#[test]
fn test_addition_removal_and_move_combined() {
	let base = layout(&["base", "gone", "nav"], &[&["&kp A"], &["&kp X"], &["&mo 1"]]);
	let modified =
		layout(&["new", "nav", "base"], &[&["&kp N"], &["&mo 1"], &["&kp A", "&kp B"]]);
	assert_round_trip(&base, &modified);
}

#[test]
fn test_row_resize_round_trip() {
	let base = layout(&["a"], &[&["&kp Q", "&kp W", "&kp E", "&kp R"]]);
	let modified = layout(&["a"], &[&["&kp Q", "&none"]]);
	assert_round_trip(&base, &modified);
	assert_round_trip(&modified, &base);
}

#[test]
fn test_behavior_round_trip() {
	let mut base = layout(&["a"], &[&["&kp Q"]]);
	base.hold_taps = vec![hold_tap("&ht_a", 200), hold_tap("&ht_gone", 150)];
	base.combos = vec![combo("esc", &[0, 1], "&kp ESC")];
	base.macros = vec![MacroBehavior::new("&m1")];

	let mut modified = layout(&["a"], &[&["&kp Q"]]);
	modified.hold_taps = vec![hold_tap("&ht_a", 250), hold_tap("&ht_new", 180)];
	modified.combos = vec![combo("esc", &[0, 1, 2], "&sk LA(LC(LSHFT))")];
	modified.macros = vec![];

	assert_round_trip(&base, &modified);
}

#[test]
fn test_input_listener_round_trip() {
	use keyweave_layout::{InputListener, InputListenerNode, InputProcessor};

	let listener = |code: &str, scale: i64| InputListener {
		code: code.to_string(),
		input_processors: vec![InputProcessor {
			code: "&zip_xy_scaler".to_string(),
			params: vec![scale.into(), 1.into()],
		}],
		nodes: vec![InputListenerNode {
			code: "warp".to_string(),
			layers: vec![3],
			..InputListenerNode::default()
		}],
	};

	let mut base = layout(&["a"], &[&["&kp Q"]]);
	base.input_listeners = vec![listener("&mmv_input_listener", 2)];

	let mut modified = base.clone();
	modified.input_listeners = vec![listener("&mmv_input_listener", 5), listener("&msc_input_listener", 1)];

	let diff = create_layout_diff(&base, &modified).unwrap();
	assert_eq!(diff.input_listeners.added.len(), 1);
	assert_eq!(diff.input_listeners.added[0].name, "&msc_input_listener");
	assert!(diff.input_listeners.modified.contains_key("&mmv_input_listener"));

	let patched = apply_patch(&base, &diff).unwrap();
	assert_eq!(patched.input_listeners.len(), 2);
	let mmv = patched
		.input_listeners
		.iter()
		.find(|l| l.code == "&mmv_input_listener")
		.unwrap();
	assert_eq!(mmv.input_processors[0].params[0], keyweave_layout::ParamValue::Int(5));
}

#[test]
fn test_metadata_round_trip() {
	let base = layout(&["a"], &[&["&kp Q"]]);
	let mut modified = base.clone();
	modified.title = "Renamed".to_string();
	modified.creator = "someone".to_string();
	modified.notes = "now with notes".to_string();
	modified.tags = vec!["travel".to_string()];
	modified.version = "1.1.0".to_string();
	modified.uuid = "uuid-modified".to_string();
	modified.custom_devicetree = "&pinctrl { };".to_string();

	let diff = create_layout_diff(&base, &modified).unwrap();
	let patched = apply_patch(&base, &diff).unwrap();

	assert_eq!(patched.title, "Renamed");
	assert_eq!(patched.creator, "someone");
	assert_eq!(patched.notes, "now with notes");
	assert_eq!(patched.tags, vec!["travel"]);
	assert_eq!(patched.version, "1.1.0");
	assert_eq!(patched.uuid, "uuid-modified");
	assert_eq!(patched.custom_devicetree, "&pinctrl { };");
}

#[test]
fn test_patch_missing_targets_is_forgiving() {
	let base = layout(&["Base"], &[&["&kp Q", "&kp W"]]);

	let mut diff = LayoutDiff::new();
	diff.title = Some(vec![PatchOp::replace("", serde_json::json!("Updated Layout"))]);
	diff.layers.removed.push(keyweave_diff::RemovedLayer {
		name: "Ghost".to_string(),
		original_position: 7,
		data: serde_json::json!([]),
	});
	diff.hold_taps.modified.insert(
		"&missing".to_string(),
		vec![PatchOp::replace("/tappingTermMs", serde_json::json!(100))],
	);

	let patched = apply_patch(&base, &diff).unwrap();
	assert_eq!(patched.title, "Updated Layout");
	assert_eq!(patched.layer_names, vec!["Base"]);
	assert_eq!(patched.layers[0].len(), 2);
	assert!(patched.hold_taps.is_empty());
}

#[test]
fn test_wrong_diff_type_rejected() {
	let base = layout(&["a"], &[&["&kp Q"]]);
	let mut diff = LayoutDiff::new();
	diff.diff_type = "layout_diff_v1".to_string();
	assert!(apply_patch(&base, &diff).is_err());
}

#[test]
fn test_diff_document_serialization_round_trip() {
	let base = layout(&["a", "b"], &[&["&kp Q"], &["&kp W"]]);
	let modified = layout(&["b", "a"], &[&["&kp W"], &["&kp E"]]);

	let diff = create_layout_diff(&base, &modified).unwrap();
	let text = serde_json::to_string_pretty(&diff).unwrap();
	let loaded: LayoutDiff = serde_json::from_str(&text).unwrap();

	let patched = apply_patch(&base, &loaded).unwrap();
	assert_eq!(patched.layer_names, modified.layer_names);
	assert_eq!(patched.layers, modified.layers);
}
