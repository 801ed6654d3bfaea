//! Parsing a realistic, full-size keymap source.

use keyweave_dts::{DtDocument, DtMultiWalker, DtValueKind, Lexer};
use pretty_assertions::assert_eq;

const KEYMAP: &str = r#"/*
 * Glorious Engrammer, abridged
 */

#include <behaviors.dtsi>
#include <dt-bindings/zmk/bt.h>
#include <dt-bindings/zmk/keys.h>
#include "macros.dtsi"

#define HYPER LS(LC(LA(LGUI)))
#define QUICK_TAP_MS 175

/ {
	chosen {
		zmk,matrix_transform = &default_transform;
	};

	behaviors {
		// Positional hold-tap for the left hand
		hml: homerow_mods_left {
			compatible = "zmk,behavior-hold-tap";
			#binding-cells = <2>;
			flavor = "balanced";
			tapping-term-ms = <280>;
			quick-tap-ms = <QUICK_TAP_MS>;
			require-prior-idle-ms = <150>;
			hold-trigger-key-positions = <5 6 7 8 9 15 16 17 18 19>;
			hold-trigger-on-release;
			bindings = <&kp>, <&kp>;
		};

		ss_cw: smart_shift {
			compatible = "zmk,behavior-tap-dance";
			#binding-cells = <0>;
			tapping-term-ms = <200>;
			bindings = <&sk LSHFT>, <&caps_word>;
		};
	};

	macros {
		vim_save: vim_save {
			compatible = "zmk,behavior-macro";
			#binding-cells = <0>;
			wait-ms = <10>;
			tap-ms = <10>;
			bindings = <&kp ESC &kp COLON &kp W &kp RET>;
		};
	};

	combos {
		compatible = "zmk,combos";
		combo_hyper_left {
			timeout-ms = <50>;
			key-positions = <24 25>;
			layers = <0 1>;
			bindings = <&kp HYPER>;
		};
	};

	keymap {
		compatible = "zmk,keymap";

		layer_base {
			bindings = <
				&kp Q        &kp W       &kp F
				&hml LCTRL A &hml LALT R &kp S
				&lt 1 SPACE  &ss_cw      &mo 2
			>;
		};

		layer_nav {
			bindings = <
				&kp HOME &kp UP   &kp END
				&kp LEFT &kp DOWN &kp RIGHT
				&to 0    &trans   &trans
			>;
		};

		layer_fn {
			bindings = <
				&kp F1      &kp F2  &kp F3
				&bt BT_CLR  &trans  &trans
				&to 0       &trans  &trans
			>;
		};
	};
};

&sensors {
	triggers-per-rotation = <20>;
};
"#;

#[test]
fn test_parses_without_errors() {
	let doc = DtDocument::parse(KEYMAP).unwrap();
	assert!(doc.errors.is_empty(), "errors: {:#?}", doc.errors);
	assert_eq!(doc.roots.len(), 2);
	assert_eq!(doc.roots[1].name, "&sensors");
}

#[test]
fn test_directives_and_defines() {
	let doc = DtDocument::parse(KEYMAP).unwrap();
	let directives: Vec<_> = doc.conditionals.iter().map(|c| c.directive.as_str()).collect();
	assert_eq!(
		directives,
		vec!["include", "include", "include", "include", "define", "define"]
	);
	assert_eq!(doc.conditionals[4].condition, "HYPER LS(LC(LA(LGUI)))");
}

#[test]
fn test_behavior_properties_reachable() {
	let doc = DtDocument::parse(KEYMAP).unwrap();
	let walker = DtMultiWalker::new(&doc.roots);

	let hml = walker.find_nodes_by_label("hml")[0];
	assert_eq!(hml.name, "homerow_mods_left");
	let term = hml.get_property("tapping_term_ms").unwrap();
	assert_eq!(term.value.as_ref().unwrap().as_int(), Some(280));

	// A macro-expanded value stays textual and coerces to nothing.
	let quick = hml.get_property("quick-tap-ms").unwrap();
	assert_eq!(quick.value.as_ref().unwrap().as_int(), None);

	let positions = hml.get_property("hold-trigger-key-positions").unwrap();
	assert_eq!(
		positions.value.as_ref().unwrap().as_int_array(),
		vec![5, 6, 7, 8, 9, 15, 16, 17, 18, 19]
	);

	assert_eq!(hml.comments.len(), 1);
	assert_eq!(hml.comments[0].content(), "Positional hold-tap for the left hand");
}

#[test]
fn test_layer_rows_group_correctly() {
	let doc = DtDocument::parse(KEYMAP).unwrap();
	let keymap = doc.roots[0].find_node_by_path("/keymap").unwrap();
	assert_eq!(keymap.children.len(), 3);

	let base = &keymap.children["layer_base"];
	let bindings = base.get_property("bindings").unwrap().value.as_ref().unwrap();
	let DtValueKind::Array(elems) = &bindings.kind else { panic!("expected array") };
	// 9 logical bindings across 20 raw tokens (references plus parameters).
	assert_eq!(elems.len(), 20);
	assert_eq!(elems.iter().filter(|e| e.as_text().starts_with('&')).count(), 9);
}

#[test]
fn test_multiline_array_raw_matches_source() {
	let doc = DtDocument::parse(KEYMAP).unwrap();
	let keymap = doc.roots[0].find_node_by_path("/keymap").unwrap();
	let nav = &keymap.children["layer_nav"];
	let raw = &nav.get_property("bindings").unwrap().value.as_ref().unwrap().raw;
	assert!(raw.starts_with('<'));
	assert!(raw.ends_with('>'));
	assert!(raw.contains("&kp HOME"));
}

#[test]
fn test_define_expansion_is_not_performed() {
	// `&kp HYPER` stays symbolic; preprocessor semantics belong to the
	// firmware build, not the importer.
	let doc = DtDocument::parse(KEYMAP).unwrap();
	let walker = DtMultiWalker::new(&doc.roots);
	let combo = walker.find_nodes_by_name("combo_hyper_left")[0];
	let bindings = combo.get_property("bindings").unwrap().value.as_ref().unwrap();
	let DtValueKind::Array(elems) = &bindings.kind else { panic!("expected array") };
	assert_eq!(elems[1].as_text(), "HYPER");
}

#[test]
fn test_whole_file_token_stream_is_contiguous() {
	let mut rebuilt = String::new();
	for token in Lexer::new(KEYMAP).keep_whitespace() {
		rebuilt.push_str(token.unwrap().raw);
	}
	assert_eq!(rebuilt, KEYMAP);
}
