//! Layer decoding: keymap node to ordered layers of typed bindings.

use keyweave_dts::{DtMultiWalker, DtNode, DtValueKind};
use keyweave_layout::LayoutBinding;
use tracing::warn;

use crate::bindings::group_bindings;

/// Layer name prefix used by keymap children.
const LAYER_PREFIX: &str = "layer_";

/// Decoded layers: names and rows stay parallel.
#[derive(Debug, Default, Clone)]
pub struct DecodedLayers {
	pub layer_names: Vec<String>,
	pub layers: Vec<Vec<LayoutBinding>>,
	pub warnings: Vec<String>,
}

/// Decode layers from parsed roots.
///
/// The keymap node is found via the `/keymap` path or by literal name; when
/// sliced section content has no surrounding keymap node, top-level
/// `layer_*` nodes are decoded directly. Layer order is AST insertion
/// order. Returns `None` when no layer definitions exist at all.
pub fn decode_layers(roots: &[DtNode]) -> Option<DecodedLayers> {
	let walker = DtMultiWalker::new(roots);

	let keymap_nodes = walker.find_nodes_by_name("keymap");
	for keymap in keymap_nodes {
		if let Some(decoded) = decode_from_children(keymap.children.values()) {
			return Some(decoded);
		}
	}

	// Section slices carry bare `layer_*` nodes at the top level.
	if let Some(decoded) = decode_from_children(roots.iter()) {
		return Some(decoded);
	}
	let top_level_children = roots.iter().flat_map(|root| root.children.values());
	decode_from_children(top_level_children)
}

fn decode_from_children<'a>(
	children: impl Iterator<Item = &'a DtNode>,
) -> Option<DecodedLayers> {
	let mut decoded = DecodedLayers::default();

	for child in children {
		if !child.name.starts_with(LAYER_PREFIX) {
			continue;
		}
		decoded.layer_names.push(child.name[LAYER_PREFIX.len()..].to_string());
		decoded.layers.push(decode_row(child, &mut decoded.warnings));
	}

	if decoded.layer_names.is_empty() {
		None
	} else {
		Some(decoded)
	}
}

fn decode_row(layer: &DtNode, warnings: &mut Vec<String>) -> Vec<LayoutBinding> {
	let Some(value) = layer.get_property("bindings").and_then(|p| p.value.as_ref()) else {
		warn!(layer = %layer.name, "layer has no bindings property");
		warnings.push(format!("layer '{}' has no bindings property", layer.name));
		return Vec::new();
	};

	match &value.kind {
		DtValueKind::Array(elems) => group_bindings(elems, warnings),
		_ => {
			let text = value.as_str();
			if text.trim().is_empty() {
				Vec::new()
			} else {
				vec![LayoutBinding::parse_lenient(text.trim())]
			}
		}
	}
}
