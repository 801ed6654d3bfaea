//! Lowering of behavior AST nodes into typed records.
//!
//! Conversion is forgiving: a behavior that violates its archetype contract
//! is dropped with a warning, and anything unparseable degrades to a raw
//! fallback. Warnings accumulate on the converter and are drained by the
//! orchestrator.

use keyweave_dts::{DtMultiWalker, DtNode, DtProperty, DtValueKind};
use keyweave_layout::{
	ComboBehavior, HOLD_TAP_FLAVORS, HoldTapBehavior, InputListener, InputListenerNode,
	InputProcessor, LayoutBinding, MacroBehavior, ParamValue,
};
use tracing::{debug, warn};

use crate::bindings::group_bindings;

/// Converts extracted behavior nodes into layout records.
pub struct BehaviorConverter<'a> {
	roots: &'a [DtNode],
	warnings: Vec<String>,
}

impl<'a> BehaviorConverter<'a> {
	pub fn new(roots: &'a [DtNode]) -> Self {
		Self { roots, warnings: Vec::new() }
	}

	pub fn warnings(&self) -> &[String] {
		&self.warnings
	}

	pub fn take_warnings(&mut self) -> Vec<String> {
		std::mem::take(&mut self.warnings)
	}

	fn warn(&mut self, message: String) {
		warn!("{message}");
		self.warnings.push(message);
	}

	/// Convert a hold-tap node. Returns `None` (with a warning) when the
	/// node has no name or does not yield exactly two bindings.
	pub fn convert_hold_tap(&mut self, node: &DtNode) -> Option<HoldTapBehavior> {
		let name = behavior_name(node)?;
		let mut hold_tap = HoldTapBehavior::new(format!("&{name}"));
		hold_tap.description = self.extract_description(node);

		hold_tap.tapping_term_ms = int_property(node, "tapping-term-ms");
		hold_tap.quick_tap_ms = int_property(node, "quick-tap-ms");
		hold_tap.require_prior_idle_ms = int_property(node, "require-prior-idle-ms");

		if let Some(flavor) = string_property(node, "flavor") {
			if !HOLD_TAP_FLAVORS.contains(&flavor.as_str()) {
				self.warn(format!("hold-tap '&{name}' has unknown flavor '{flavor}'"));
			}
			hold_tap.flavor = Some(flavor);
		}

		if node.get_property("hold-trigger-on-release").is_some() {
			hold_tap.hold_trigger_on_release = Some(true);
		}
		if node.get_property("retro-tap").is_some() {
			hold_tap.retro_tap = Some(true);
		}
		if let Some(prop) = node.get_property("hold-trigger-key-positions") {
			let positions = prop.value.as_ref().map(|v| v.as_int_array()).unwrap_or_default();
			if !positions.is_empty() {
				hold_tap.hold_trigger_key_positions = Some(positions);
			}
		}

		hold_tap.bindings = node
			.get_property("bindings")
			.and_then(|p| p.value.as_ref())
			.map(reference_list)
			.unwrap_or_default();

		if hold_tap.bindings.len() != 2 {
			self.warn(format!(
				"hold-tap '&{name}' requires exactly 2 bindings, found {}; dropping",
				hold_tap.bindings.len()
			));
			return None;
		}

		Some(hold_tap)
	}

	/// Convert a macro node, inferring the parameter slots from
	/// `#binding-cells` with a `compatible` fallback.
	pub fn convert_macro(&mut self, node: &DtNode) -> Option<MacroBehavior> {
		let name = behavior_name(node)?;
		let mut mac = MacroBehavior::new(format!("&{name}"));
		mac.description = self.extract_description(node);

		mac.wait_ms = int_property(node, "wait-ms");
		mac.tap_ms = int_property(node, "tap-ms");

		if let Some(prop) = node.get_property("bindings") {
			mac.bindings = self.bindings_property(prop);
		}

		mac.params = self.macro_params(node, &mac.name);
		Some(mac)
	}

	/// Parameter slot resolution. `#binding-cells` has priority; the
	/// `compatible` suffix is a fallback; anything else defaults to no
	/// parameters. Every fallback path warns.
	fn macro_params(&mut self, node: &DtNode, name: &str) -> Option<Vec<ParamValue>> {
		let cells_prop =
			node.get_property("#binding-cells").or_else(|| node.get_property("binding-cells"));
		if let Some(prop) = cells_prop {
			let cells = prop.value.as_ref().and_then(|v| v.as_int());
			return match cells {
				Some(0) => Some(Vec::new()),
				Some(1) => Some(vec!["code".into()]),
				Some(2) => Some(vec!["param1".into(), "param2".into()]),
				other => {
					self.warn(format!(
						"unexpected #binding-cells value for macro {name}: {other:?}"
					));
					None
				}
			};
		}

		if let Some(compatible) = node.compatible() {
			let inferred = match compatible.as_str() {
				"zmk,behavior-macro-one-param" => Some(vec!["code".into()]),
				"zmk,behavior-macro-two-param" => {
					Some(vec!["param1".into(), "param2".into()])
				}
				"zmk,behavior-macro" => Some(Vec::new()),
				_ => None,
			};
			if let Some(params) = inferred {
				self.warn(format!(
					"missing #binding-cells for macro {name}, inferred {} parameter(s) from compatible '{compatible}'; consider adding #binding-cells = <{}>; to the definition",
					params.len(),
					params.len(),
				));
				return Some(params);
			}
		}

		self.warn(format!(
			"unable to determine parameter count for macro {name}; defaulting to no parameters"
		));
		Some(Vec::new())
	}

	/// Convert a combo node. `key-positions` and a single logical binding
	/// are required.
	pub fn convert_combo(&mut self, node: &DtNode) -> Option<ComboBehavior> {
		let name = behavior_name(node)?;
		// Combos use bare names; the devicetree convention prefixes them
		// with `combo_`.
		let combo_name = name.strip_prefix("combo_").unwrap_or(&name).to_string();

		let Some(positions_prop) = node.get_property("key-positions") else {
			self.warn(format!("combo '{name}' missing key-positions property; dropping"));
			return None;
		};
		let key_positions =
			positions_prop.value.as_ref().map(|v| v.as_int_array()).unwrap_or_default();
		if key_positions.is_empty() {
			self.warn(format!("combo '{name}' has invalid key-positions; dropping"));
			return None;
		}

		let Some(bindings_prop) = node.get_property("bindings") else {
			self.warn(format!("combo '{name}' missing bindings property; dropping"));
			return None;
		};
		let Some(binding) = self.single_binding(bindings_prop, &combo_name) else {
			self.warn(format!("combo '{name}' has invalid bindings; dropping"));
			return None;
		};

		let mut combo = ComboBehavior {
			name: combo_name,
			description: self.extract_description(node),
			key_positions,
			binding,
			..ComboBehavior::default()
		};

		combo.timeout_ms = int_property(node, "timeout-ms");
		combo.layers = match node.get_property("layers").and_then(|p| p.value.as_ref()) {
			Some(value) => Some(value.as_int_array()),
			None => {
				debug!(combo = %combo.name, "layers unspecified, adding placeholder [-1]");
				Some(vec![-1])
			}
		};

		Some(combo)
	}

	/// Convert an input listener node: processors from the
	/// `input-processors` property, per-layer child nodes beneath it.
	pub fn convert_input_listener(&mut self, node: &DtNode) -> Option<InputListener> {
		let code = if node.name.starts_with('&') {
			node.name.clone()
		} else {
			format!("&{}", behavior_name(node)?)
		};

		let mut listener = InputListener { code, ..InputListener::default() };
		if let Some(prop) = node.get_property("input-processors") {
			listener.input_processors = self.input_processors(prop);
		}

		for child in node.children.values() {
			let mut entry = InputListenerNode {
				code: child.name.clone(),
				description: self.extract_description(child),
				..InputListenerNode::default()
			};
			if let Some(value) = child.get_property("layers").and_then(|p| p.value.as_ref()) {
				entry.layers = value.as_int_array();
			}
			if let Some(prop) = child.get_property("input-processors") {
				entry.input_processors = self.input_processors(prop);
			}
			listener.nodes.push(entry);
		}

		Some(listener)
	}

	fn input_processors(&mut self, prop: &DtProperty) -> Vec<InputProcessor> {
		let Some(value) = prop.value.as_ref() else {
			return Vec::new();
		};
		let DtValueKind::Array(elems) = &value.kind else {
			return Vec::new();
		};
		group_bindings(elems, &mut self.warnings)
			.into_iter()
			.map(|binding| InputProcessor {
				code: binding.value,
				params: binding.params.into_iter().map(|p| p.value).collect(),
			})
			.collect()
	}

	/// Bindings list for macros, grouped by the array rule.
	fn bindings_property(&mut self, prop: &DtProperty) -> Vec<LayoutBinding> {
		let Some(value) = prop.value.as_ref() else {
			return Vec::new();
		};
		match &value.kind {
			DtValueKind::Array(elems) => group_bindings(elems, &mut self.warnings),
			_ => {
				let text = value.raw.trim().trim_matches(['<', '>']).trim().to_string();
				if text.starts_with('&') {
					vec![LayoutBinding::parse_lenient(&text)]
				} else {
					Vec::new()
				}
			}
		}
	}

	/// Exactly one logical binding; extra bindings are dropped with a
	/// warning.
	fn single_binding(&mut self, prop: &DtProperty, owner: &str) -> Option<LayoutBinding> {
		let mut grouped = self.bindings_property(prop);
		if grouped.len() > 1 {
			self.warn(format!(
				"combo '{owner}' has {} bindings, expected one; keeping the first",
				grouped.len()
			));
		}
		if grouped.is_empty() { None } else { Some(grouped.swap_remove(0)) }
	}

	/// Behavior description, in priority order: the node's own leading
	/// comments, trailing comments on the parent directly above this node,
	/// a `description` property, a `label` property.
	fn extract_description(&self, node: &DtNode) -> Option<String> {
		let own = comment_description(&node.comments);
		if !own.is_empty() {
			return Some(own);
		}

		if let Some(parent) = DtMultiWalker::new(self.roots).parent_of(node) {
			let mut lines: Vec<String> = Vec::new();
			for comment in parent.comments.iter().rev() {
				if comment.text.trim().starts_with('#') {
					continue;
				}
				lines.push(comment.content().to_string());
			}
			lines.reverse();
			let text = collapse_blank_lines(&lines.join("\n"));
			if !text.is_empty() {
				return Some(text);
			}
		}

		if let Some(description) = string_property(node, "description") {
			return Some(description);
		}
		string_property(node, "label")
	}
}

/// Node identity: label when present, otherwise the node name.
fn behavior_name(node: &DtNode) -> Option<String> {
	let name = node.label.clone().unwrap_or_else(|| node.name.clone());
	if name.is_empty() {
		warn!("behavior node missing name/label");
		return None;
	}
	Some(name)
}

fn int_property(node: &DtNode, name: &str) -> Option<i64> {
	node.get_property(name).and_then(|p| p.value.as_ref()).and_then(|v| v.as_int())
}

fn string_property(node: &DtNode, name: &str) -> Option<String> {
	node.get_property(name).and_then(|p| p.value.as_ref()).map(|v| v.as_str())
}

/// Behavior references (`&`-prefixed tokens) in an array value. Hold-tap
/// bindings are references without parameters.
fn reference_list(value: &keyweave_dts::DtValue) -> Vec<String> {
	match &value.kind {
		DtValueKind::Array(elems) => elems
			.iter()
			.map(keyweave_dts::DtArrayElem::as_text)
			.filter(|text| text.starts_with('&'))
			.collect(),
		DtValueKind::Reference(name) => vec![format!("&{name}")],
		_ => value
			.raw
			.trim()
			.trim_matches(['<', '>'])
			.split([',', ' '])
			.map(str::trim)
			.filter(|part| part.starts_with('&'))
			.map(str::to_string)
			.collect(),
	}
}

/// Join cleaned comment lines, keeping single blank lines for formatting.
fn comment_description(comments: &[keyweave_dts::DtComment]) -> String {
	let lines: Vec<String> = comments
		.iter()
		.filter(|comment| !comment.text.trim().starts_with('#'))
		.map(|comment| comment.content().to_string())
		.collect();
	collapse_blank_lines(&lines.join("\n"))
}

/// Collapse runs of blank lines down to a single blank line.
fn collapse_blank_lines(text: &str) -> String {
	let mut out: Vec<&str> = Vec::new();
	let mut blank_run = 0usize;
	for line in text.lines() {
		if line.trim().is_empty() {
			blank_run += 1;
			if blank_run > 1 {
				continue;
			}
			out.push("");
		} else {
			blank_run = 0;
			out.push(line.trim_end());
		}
	}
	out.join("\n").trim().to_string()
}
