//! Import orchestration: keymap source to layout record.
//!
//! Two modes: full (parse the whole standalone keymap) and template-aware
//! (slice user-owned sections out of a rendered template). Both accumulate
//! diagnostics; individual component warnings never flip `success`.

use indexmap::IndexMap;
use keyweave_dts::{DtDocument, DtNode};
use keyweave_layout::{LayoutBinding, LayoutData};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::convert::BehaviorConverter;
use crate::extract::{BehaviorExtractor, is_input_listener};
use crate::layers::decode_layers;
use crate::metadata::{IncludeResolver, MetadataExtractor};
use crate::section::{ExtractionConfig, SectionExtractor, default_extraction_config};

/// Keymap parsing modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParsingMode {
	#[serde(rename = "full")]
	Full,
	#[serde(rename = "template")]
	TemplateAware,
}

impl ParsingMode {
	pub fn as_str(self) -> &'static str {
		match self {
			ParsingMode::Full => "full",
			ParsingMode::TemplateAware => "template",
		}
	}
}

/// Collaborator contract: keyboard-specific knowledge supplied by the
/// profile configuration layer.
pub trait KeyboardProfile {
	fn name(&self) -> &str;

	fn key_count(&self) -> usize {
		keyweave_layout::DEFAULT_KEY_COUNT
	}

	/// The binding used to pad fresh layers.
	fn fill_binding(&self) -> LayoutBinding {
		LayoutBinding::none()
	}

	/// Profile-specific section extraction; `None` selects the built-in
	/// default configuration.
	fn extraction_config(&self) -> Option<Vec<ExtractionConfig>> {
		None
	}
}

/// Result of a keymap import.
#[derive(Debug)]
pub struct ImportResult {
	pub success: bool,
	pub layout: Option<LayoutData>,
	pub errors: Vec<String>,
	pub warnings: Vec<String>,
	pub parsing_mode: ParsingMode,
	/// Raw content per extracted section (template mode only).
	pub extracted_sections: IndexMap<String, String>,
}

impl ImportResult {
	fn new(parsing_mode: ParsingMode) -> Self {
		Self {
			success: false,
			layout: None,
			errors: Vec::new(),
			warnings: Vec::new(),
			parsing_mode,
			extracted_sections: IndexMap::new(),
		}
	}
}

/// Orchestrates the import pipeline.
pub struct KeymapImporter {
	extractor: BehaviorExtractor,
	sections: SectionExtractor,
	metadata: MetadataExtractor,
}

impl Default for KeymapImporter {
	fn default() -> Self {
		Self {
			extractor: BehaviorExtractor::new(),
			sections: SectionExtractor::new(),
			metadata: MetadataExtractor::new(),
		}
	}
}

impl KeymapImporter {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_include_resolver(resolver: IncludeResolver) -> Self {
		Self { metadata: MetadataExtractor::with_resolver(resolver), ..Self::default() }
	}

	/// Import keymap source text. Template mode requires a profile;
	/// `source_id` is recorded as provenance when given.
	pub fn import(
		&self,
		source: &str,
		mode: ParsingMode,
		profile: Option<&dyn KeyboardProfile>,
		source_id: Option<&str>,
	) -> ImportResult {
		let mut result = ImportResult::new(mode);

		let layout = match mode {
			ParsingMode::Full => self.import_full(source, profile, &mut result),
			ParsingMode::TemplateAware => {
				let Some(profile) = profile else {
					result
						.errors
						.push("keyboard profile is required for template-aware parsing".to_string());
					return result;
				};
				self.import_template(source, profile, &mut result)
			}
		};

		if let Some(mut layout) = layout {
			layout.keymap_metadata.parsing_method = "ast".to_string();
			layout.keymap_metadata.parsing_mode = mode.as_str().to_string();
			layout.keymap_metadata.source_file = source_id.unwrap_or_default().to_string();
			result.layout = Some(layout);
			result.success = true;
		}
		result
	}

	fn import_full(
		&self,
		source: &str,
		profile: Option<&dyn KeyboardProfile>,
		result: &mut ImportResult,
	) -> Option<LayoutData> {
		let doc = match DtDocument::parse(source) {
			Ok(doc) => doc,
			Err(err) => {
				result.errors.push(err.to_string());
				return None;
			}
		};
		result.warnings.extend(doc.errors.iter().map(ToString::to_string));

		if doc.roots.is_empty() {
			result.errors.push("no device tree content found".to_string());
			return None;
		}

		let keyboard = profile.map(|p| p.name()).unwrap_or("unknown");
		let mut layout = LayoutData::new(keyboard, "Imported Keymap");

		if let Some(mut decoded) = decode_layers(&doc.roots) {
			result.warnings.append(&mut decoded.warnings);
			layout.layer_names = decoded.layer_names;
			layout.layers = decoded.layers;
		} else {
			warn!("no keymap layers found in source");
			result.warnings.push("no keymap layers found in source".to_string());
		}

		let extracted = self.extractor.extract(&doc.roots);
		let mut converter = BehaviorConverter::new(&doc.roots);
		layout.hold_taps =
			extracted.hold_taps.iter().filter_map(|n| converter.convert_hold_tap(n)).collect();
		layout.macros =
			extracted.macros.iter().filter_map(|n| converter.convert_macro(n)).collect();
		layout.combos =
			extracted.combos.iter().filter_map(|n| converter.convert_combo(n)).collect();

		let advanced = self.extractor.detect_advanced_patterns(&doc.roots);
		layout.input_listeners = advanced
			.input_listeners
			.iter()
			.filter_map(|n| converter.convert_input_listener(n))
			.collect();
		result.warnings.append(&mut converter.take_warnings());

		layout.keymap_metadata = self.metadata.extract(&doc.roots, source);
		for reference_error in layout.validate_layer_references() {
			result.warnings.push(reference_error);
		}

		let (custom_devicetree, custom_behaviors) =
			extract_custom_sections(&doc.roots, &extracted, source);
		layout.custom_devicetree = custom_devicetree;
		layout.custom_defined_behaviors = custom_behaviors;

		debug!(
			layers = layout.layer_names.len(),
			hold_taps = layout.hold_taps.len(),
			macros = layout.macros.len(),
			combos = layout.combos.len(),
			"full import complete"
		);
		Some(layout)
	}

	fn import_template(
		&self,
		source: &str,
		profile: &dyn KeyboardProfile,
		result: &mut ImportResult,
	) -> Option<LayoutData> {
		let configs: Vec<ExtractionConfig> =
			profile.extraction_config().unwrap_or_else(default_extraction_config);

		let (sections, mut extract_warnings) = self.sections.extract_sections(source, &configs);
		result.warnings.append(&mut extract_warnings);

		let mut processed = self.sections.process_sections(&sections);
		result.warnings.append(&mut processed.warnings);

		let mut layout = LayoutData::new(profile.name(), "Imported Layout");
		layout.layer_names = processed.layer_names;
		layout.layers = processed.layers;
		layout.hold_taps = processed.hold_taps;
		layout.macros = processed.macros;
		layout.combos = processed.combos;
		if let Some(custom) = processed.custom_devicetree {
			layout.custom_devicetree = custom;
		}
		if let Some(custom) = processed.custom_defined_behaviors {
			layout.custom_defined_behaviors = custom;
		}

		// Raw section text feeds the export templates back out again.
		for (tpl_ctx_name, section) in &sections {
			result.extracted_sections.insert(tpl_ctx_name.clone(), section.raw_content.clone());
			layout.variables.insert(
				tpl_ctx_name.clone(),
				serde_json::Value::String(section.raw_content.clone()),
			);
		}

		for reference_error in layout.validate_layer_references() {
			result.warnings.push(reference_error);
		}
		Some(layout)
	}
}

/// Verbatim capture of top-level blocks the typed layout has no field for:
/// reference modifications (minus input listeners) become custom devicetree;
/// behaviors without a typed archetype become custom defined behaviors.
fn extract_custom_sections(
	roots: &[DtNode],
	extracted: &crate::extract::ExtractedBehaviors<'_>,
	source: &str,
) -> (String, String) {
	let typed: Vec<&DtNode> = extracted
		.hold_taps
		.iter()
		.chain(&extracted.macros)
		.chain(&extracted.combos)
		.copied()
		.collect();
	let contains_typed = |root: &DtNode| {
		root.walk().any(|node| typed.iter().any(|t| std::ptr::eq(*t, node)))
	};

	let mut devicetree_blocks = Vec::new();
	for root in roots {
		if root.name.starts_with('&') && !is_input_listener(root) && !contains_typed(root) {
			if let Some(block) = balanced_block(source, &root.name) {
				devicetree_blocks.push(block);
			}
		}
	}

	let mut behavior_blocks = Vec::new();
	for node in extracted.untyped() {
		let header = node.label.as_deref().map(|label| format!("{label}: {}", node.name));
		let header = header.unwrap_or_else(|| node.name.clone());
		if let Some(block) = balanced_block(source, &header) {
			behavior_blocks.push(block);
		}
	}

	(devicetree_blocks.join("\n\n"), behavior_blocks.join("\n\n"))
}

/// Extract `header { … }` from source with balanced-brace matching.
fn balanced_block(source: &str, header: &str) -> Option<String> {
	let mut search_from = 0;
	while let Some(found) = source[search_from..].find(header) {
		let start = search_from + found;
		let after = start + header.len();
		let rest = &source[after..];
		let brace_offset = rest.find(|c: char| !c.is_whitespace());
		match brace_offset {
			Some(offset) if rest[offset..].starts_with('{') => {
				let brace_start = after + offset;
				let mut depth = 0usize;
				for (index, ch) in source[brace_start..].char_indices() {
					match ch {
						'{' => depth += 1,
						'}' => {
							depth -= 1;
							if depth == 0 {
								let end = brace_start + index + 1;
								return Some(source[start..end].to_string());
							}
						}
						_ => {}
					}
				}
				return None;
			}
			_ => {
				search_from = after;
			}
		}
	}
	None
}
