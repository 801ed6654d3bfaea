//! Behavior archetype extraction from parsed Devicetree roots.
//!
//! Classification is driven by `compatible` substrings, with structural
//! fallbacks for combos (which are commonly declared without a compatible
//! under a `combos` container node).

use keyweave_dts::{DtMultiWalker, DtNode};
use tracing::debug;

/// Behavior archetypes recognized by the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Archetype {
	HoldTap,
	Macro,
	TapDance,
	Combo,
	CapsWord,
	StickyKey,
	Layer,
	ModMorph,
}

/// `compatible` substrings per archetype.
const BEHAVIOR_PATTERNS: &[(Archetype, &[&str])] = &[
	(Archetype::HoldTap, &["zmk,behavior-hold-tap", "zmk,behavior-tap-hold"]),
	(Archetype::Macro, &["zmk,behavior-macro", "zmk,behavior-sequence"]),
	(Archetype::TapDance, &["zmk,behavior-tap-dance", "zmk,behavior-multi-tap"]),
	(Archetype::Combo, &["zmk,behavior-combo"]),
	(Archetype::CapsWord, &["zmk,behavior-caps-word", "zmk,behavior-capsword"]),
	(Archetype::StickyKey, &["zmk,behavior-sticky-key", "zmk,behavior-sk"]),
	(
		Archetype::Layer,
		&["zmk,behavior-momentary-layer", "zmk,behavior-toggle-layer", "zmk,behavior-layer-tap"],
	),
	(Archetype::ModMorph, &["zmk,behavior-mod-morph", "zmk,behavior-modifier"]),
];

/// Nodes grouped per archetype, in AST order.
#[derive(Debug, Default)]
pub struct ExtractedBehaviors<'a> {
	pub hold_taps: Vec<&'a DtNode>,
	pub macros: Vec<&'a DtNode>,
	pub combos: Vec<&'a DtNode>,
	pub tap_dances: Vec<&'a DtNode>,
	pub caps_word: Vec<&'a DtNode>,
	pub sticky_keys: Vec<&'a DtNode>,
	pub layers: Vec<&'a DtNode>,
	pub mods: Vec<&'a DtNode>,
	pub other_behaviors: Vec<&'a DtNode>,
}

impl<'a> ExtractedBehaviors<'a> {
	pub fn total(&self) -> usize {
		self.hold_taps.len()
			+ self.macros.len()
			+ self.combos.len()
			+ self.tap_dances.len()
			+ self.caps_word.len()
			+ self.sticky_keys.len()
			+ self.layers.len()
			+ self.mods.len()
			+ self.other_behaviors.len()
	}

	/// Archetypes that have no typed layout record and therefore round-trip
	/// through the custom-behaviors text block.
	pub fn untyped(&self) -> impl Iterator<Item = &'a DtNode> {
		self.tap_dances
			.iter()
			.chain(&self.caps_word)
			.chain(&self.sticky_keys)
			.chain(&self.layers)
			.chain(&self.mods)
			.chain(&self.other_behaviors)
			.copied()
	}
}

/// Advanced node groups surfaced for downstream consumers.
#[derive(Debug, Default)]
pub struct AdvancedPatterns<'a> {
	pub input_listeners: Vec<&'a DtNode>,
	pub sensor_configs: Vec<&'a DtNode>,
	pub underglow_configs: Vec<&'a DtNode>,
	pub mouse_configs: Vec<&'a DtNode>,
	pub conditional_layers: Vec<&'a DtNode>,
	pub custom_behaviors: Vec<&'a DtNode>,
}

/// Classifies AST subtrees into behavior archetypes.
#[derive(Debug, Default)]
pub struct BehaviorExtractor;

impl BehaviorExtractor {
	pub fn new() -> Self {
		Self
	}

	/// Extract every behavior archetype across the given roots.
	pub fn extract<'a>(&self, roots: &'a [DtNode]) -> ExtractedBehaviors<'a> {
		let walker = DtMultiWalker::new(roots);
		let mut out = ExtractedBehaviors::default();

		// Combos first: structural detection catches nodes without any
		// compatible string.
		out.combos = self.extract_combos(roots);

		for (node, prop) in
			walker.find_properties(|prop| prop.name == "compatible" && prop.value.is_some())
		{
			let Some(value) = prop.value.as_ref() else { continue };
			if !is_behavior_compatible(value) {
				continue;
			}
			// Container nodes (`combos` with compatible = "zmk,combos" and
			// friends) hold behaviors but are not behaviors themselves.
			if matches!(node.name.as_str(), "combos" | "behaviors" | "macros" | "keymap") {
				continue;
			}

			match categorize(value) {
				Some(Archetype::HoldTap) => push_unique(&mut out.hold_taps, node),
				Some(Archetype::Macro) => push_unique(&mut out.macros, node),
				Some(Archetype::TapDance) => push_unique(&mut out.tap_dances, node),
				Some(Archetype::Combo) => push_unique(&mut out.combos, node),
				Some(Archetype::CapsWord) => push_unique(&mut out.caps_word, node),
				Some(Archetype::StickyKey) => push_unique(&mut out.sticky_keys, node),
				Some(Archetype::Layer) => push_unique(&mut out.layers, node),
				Some(Archetype::ModMorph) => push_unique(&mut out.mods, node),
				None => push_unique(&mut out.other_behaviors, node),
			}
		}

		debug!(
			hold_taps = out.hold_taps.len(),
			macros = out.macros.len(),
			combos = out.combos.len(),
			other = out.other_behaviors.len(),
			"extracted behaviors"
		);
		out
	}

	/// Combos come from three places: children of `combos` container nodes,
	/// nodes carrying both `key-positions` and `bindings`, and nodes with a
	/// combo compatible string.
	fn extract_combos<'a>(&self, roots: &'a [DtNode]) -> Vec<&'a DtNode> {
		let walker = DtMultiWalker::new(roots);
		let mut combos: Vec<&'a DtNode> = Vec::new();

		for section in walker.find_nodes_by_name("combos") {
			for child in section.children.values() {
				push_unique(&mut combos, child);
			}
		}

		for (node, _) in
			walker.find_properties(|prop| prop.name == "key-positions" && prop.value.is_some())
		{
			if node.get_property("bindings").is_some() {
				push_unique(&mut combos, node);
			}
		}

		for (node, prop) in
			walker.find_properties(|prop| prop.name == "compatible" && prop.value.is_some())
		{
			let Some(value) = prop.value.as_ref() else { continue };
			if value.string_contains("zmk,behavior-combo") {
				push_unique(&mut combos, node);
			}
		}

		combos
	}

	/// Locate input listeners, sensor/RGB/pointer configuration, and
	/// conditional-layer style properties.
	pub fn detect_advanced_patterns<'a>(&self, roots: &'a [DtNode]) -> AdvancedPatterns<'a> {
		let walker = DtMultiWalker::new(roots);
		let mut patterns = AdvancedPatterns::default();

		patterns.input_listeners = walker.find_nodes(is_input_listener);

		patterns.sensor_configs = walker.find_nodes_by_compatible("zmk,behavior-sensor-rotate");

		patterns.underglow_configs = walker.find_nodes_by_compatible("worldsemi,ws2812");
		for node in walker.find_nodes_by_name("rgb_ug") {
			push_unique(&mut patterns.underglow_configs, node);
		}

		patterns.mouse_configs = walker.find_nodes_by_name("mmv");
		for node in walker.find_nodes_by_name("mouse") {
			push_unique(&mut patterns.mouse_configs, node);
		}

		patterns.conditional_layers = walker
			.find_properties(|prop| prop.name == "layers" && prop.value.is_some())
			.into_iter()
			.map(|(node, _)| node)
			.collect();

		patterns.custom_behaviors = walker
			.find_properties(|prop| prop.name == "compatible" && prop.value.is_some())
			.into_iter()
			.filter(|(_, prop)| {
				let Some(value) = prop.value.as_ref() else { return false };
				value.string_contains("zmk,behavior") && categorize(value).is_none()
			})
			.map(|(node, _)| node)
			.collect();

		patterns
	}
}

/// A node name of `input_listener` or `*_input_listener`, with or without a
/// reference-modification `&` prefix.
pub fn is_input_listener(node: &DtNode) -> bool {
	let name = node.name.trim_start_matches('&');
	name == "input_listener" || name.ends_with("_input_listener")
}

fn is_behavior_compatible(value: &keyweave_dts::DtValue) -> bool {
	value.string_contains("zmk,behavior") || value.string_contains("zmk,combo")
}

fn categorize(value: &keyweave_dts::DtValue) -> Option<Archetype> {
	for (archetype, patterns) in BEHAVIOR_PATTERNS {
		for pattern in *patterns {
			if value.string_contains(pattern) {
				return Some(*archetype);
			}
		}
	}
	None
}

fn push_unique<'a>(bucket: &mut Vec<&'a DtNode>, node: &'a DtNode) {
	if !bucket.iter().any(|seen| std::ptr::eq(*seen, node)) {
		bucket.push(node);
	}
}
