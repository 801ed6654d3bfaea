//! Template-aware section slicing.
//!
//! In template import mode the keymap is a rendered template; only the
//! user-owned regions between known delimiters are extracted and processed.
//! Unmatched or unparseable sections produce warnings, never failures.

use indexmap::IndexMap;
use keyweave_dts::DtDocument;
use keyweave_layout::{ComboBehavior, HoldTapBehavior, LayoutBinding, MacroBehavior};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::convert::BehaviorConverter;
use crate::extract::BehaviorExtractor;
use crate::layers::decode_layers;

/// How a section's content is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
	/// Stored verbatim.
	Dtsi,
	Behavior,
	Macro,
	Combo,
	Keymap,
	/// Stored verbatim for the export template.
	InputListener,
}

/// One section to extract: a template-context name, the data it feeds, and
/// a start pattern with an optional end pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
	/// Template variable the raw content is stashed under.
	pub tpl_ctx_name: String,
	/// Logical name of the extracted data.
	pub layer_data_name: String,
	#[serde(rename = "type")]
	pub kind: SectionKind,
	/// `(start_pattern, end_pattern)`; a missing end pattern means the
	/// section runs to the next section start or end of input.
	pub delimiter: (String, Option<String>),
}

impl ExtractionConfig {
	pub fn new(
		tpl_ctx_name: &str,
		layer_data_name: &str,
		kind: SectionKind,
		start: &str,
		end: Option<&str>,
	) -> Self {
		Self {
			tpl_ctx_name: tpl_ctx_name.to_string(),
			layer_data_name: layer_data_name.to_string(),
			kind,
			delimiter: (start.to_string(), end.map(str::to_string)),
		}
	}
}

/// The built-in extraction configuration, matching the section layout the
/// export templates emit.
pub fn default_extraction_config() -> Vec<ExtractionConfig> {
	vec![
		ExtractionConfig::new(
			"user_behaviors_dtsi",
			"behaviors",
			SectionKind::Behavior,
			r"(?m)^\s*behaviors\s*\{",
			None,
		),
		ExtractionConfig::new(
			"user_macros_dtsi",
			"macros",
			SectionKind::Macro,
			r"(?m)^\s*macros\s*\{",
			None,
		),
		ExtractionConfig::new(
			"combos_dtsi",
			"combos",
			SectionKind::Combo,
			r"(?m)^\s*combos\s*\{",
			None,
		),
		ExtractionConfig::new(
			"keymap_dtsi",
			"keymap",
			SectionKind::Keymap,
			r"(?m)^\s*keymap\s*\{",
			None,
		),
		ExtractionConfig::new(
			"input_listeners_dtsi",
			"input_listeners",
			SectionKind::InputListener,
			r"(?m)^&\w+_input_listener\s*\{",
			None,
		),
		ExtractionConfig::new(
			"custom_devicetree",
			"custom_devicetree",
			SectionKind::Dtsi,
			r"/\*\s*Custom Devicetree\s*\*/",
			None,
		),
		ExtractionConfig::new(
			"custom_defined_behaviors",
			"custom_defined_behaviors",
			SectionKind::Dtsi,
			r"/\*\s*Custom Defined Behaviors\s*\*/",
			None,
		),
	]
}

/// A sliced region of the source.
#[derive(Debug, Clone)]
pub struct ExtractedSection {
	pub name: String,
	/// Cleaned content: empty lines, pure comment lines, and template
	/// comment lines dropped.
	pub content: String,
	pub raw_content: String,
	pub kind: SectionKind,
}

/// All processed section data, ready for layout assembly.
#[derive(Debug, Default)]
pub struct ProcessedSections {
	pub layer_names: Vec<String>,
	pub layers: Vec<Vec<LayoutBinding>>,
	pub hold_taps: Vec<HoldTapBehavior>,
	pub macros: Vec<MacroBehavior>,
	pub combos: Vec<ComboBehavior>,
	pub custom_devicetree: Option<String>,
	pub custom_defined_behaviors: Option<String>,
	pub input_listeners_raw: Option<String>,
	pub warnings: Vec<String>,
}

/// Extracts and processes delimiter-bounded sections.
#[derive(Debug, Default)]
pub struct SectionExtractor;

impl SectionExtractor {
	pub fn new() -> Self {
		Self
	}

	/// Slice every configured section out of `content`. Returns sections
	/// keyed by template-context name plus warnings for failed patterns.
	pub fn extract_sections(
		&self,
		content: &str,
		configs: &[ExtractionConfig],
	) -> (IndexMap<String, ExtractedSection>, Vec<String>) {
		let mut sections = IndexMap::new();
		let mut warnings = Vec::new();

		// Collect every start offset so open-ended sections can stop at the
		// next section boundary.
		let mut starts: Vec<usize> = Vec::new();
		for config in configs {
			if let Ok(regex) = build_regex(&config.delimiter.0) {
				starts.extend(regex.find_iter(content).map(|m| m.start()));
			}
		}
		starts.sort_unstable();

		for config in configs {
			match self.extract_single(content, config, &starts) {
				Ok(Some(section)) => {
					debug!(
						section = %config.tpl_ctx_name,
						chars = section.raw_content.len(),
						"extracted section"
					);
					sections.insert(config.tpl_ctx_name.clone(), section);
				}
				Ok(None) => {
					debug!(section = %config.tpl_ctx_name, "no start delimiter found");
				}
				Err(message) => {
					warn!(section = %config.tpl_ctx_name, "{message}");
					warnings.push(message);
				}
			}
		}
		(sections, warnings)
	}

	fn extract_single(
		&self,
		content: &str,
		config: &ExtractionConfig,
		all_starts: &[usize],
	) -> Result<Option<ExtractedSection>, String> {
		let start_regex = build_regex(&config.delimiter.0)
			.map_err(|err| format!("invalid start pattern for {}: {err}", config.tpl_ctx_name))?;
		let Some(start) = start_regex.find(content) else {
			return Ok(None);
		};

		let search_from = start.end();
		let end = match &config.delimiter.1 {
			Some(end_pattern) => {
				let end_regex = build_regex(end_pattern).map_err(|err| {
					format!("invalid end pattern for {}: {err}", config.tpl_ctx_name)
				})?;
				end_regex
					.find(&content[search_from..])
					.map(|m| search_from + m.start())
					.unwrap_or(content.len())
			}
			None => all_starts
				.iter()
				.copied()
				.find(|&offset| offset > start.start() && offset >= search_from)
				.unwrap_or(content.len()),
		};

		let raw_content = content[search_from..end].trim().to_string();
		let cleaned = clean_section_content(&raw_content);
		if cleaned.is_empty() {
			return Ok(None);
		}

		Ok(Some(ExtractedSection {
			name: config.layer_data_name.clone(),
			content: cleaned,
			raw_content,
			kind: config.kind,
		}))
	}

	/// Parse and convert every extracted section according to its kind.
	pub fn process_sections(
		&self,
		sections: &IndexMap<String, ExtractedSection>,
	) -> ProcessedSections {
		let mut out = ProcessedSections::default();

		for section in sections.values() {
			match section.kind {
				SectionKind::Dtsi => match section.name.as_str() {
					"custom_devicetree" => out.custom_devicetree = Some(section.content.clone()),
					"custom_defined_behaviors" => {
						out.custom_defined_behaviors = Some(section.content.clone());
					}
					other => {
						debug!(section = other, "verbatim section has no layout field");
					}
				},
				SectionKind::InputListener => {
					out.input_listeners_raw = Some(section.content.clone());
				}
				SectionKind::Behavior | SectionKind::Macro | SectionKind::Combo => {
					self.process_behavior_section(section, &mut out);
				}
				SectionKind::Keymap => self.process_keymap_section(section, &mut out),
			}
		}
		out
	}

	/// Behavior-ish sections parse the raw content so comments survive as
	/// descriptions; stray closing braces in a slice only add warnings.
	fn process_behavior_section(&self, section: &ExtractedSection, out: &mut ProcessedSections) {
		let source =
			if section.raw_content.is_empty() { &section.content } else { &section.raw_content };
		let doc = match DtDocument::parse(source) {
			Ok(doc) => doc,
			Err(err) => {
				out.warnings.push(format!("section '{}': {err}", section.name));
				return;
			}
		};
		out.warnings.extend(doc.errors.iter().map(|e| format!("section '{}': {e}", section.name)));

		let extractor = BehaviorExtractor::new();
		let extracted = extractor.extract(&doc.roots);
		let mut converter = BehaviorConverter::new(&doc.roots);

		match section.kind {
			SectionKind::Behavior => {
				out.hold_taps
					.extend(extracted.hold_taps.iter().filter_map(|n| converter.convert_hold_tap(n)));
				// Macros and combos declared inside a behaviors slice still
				// belong to their own lists.
				out.macros
					.extend(extracted.macros.iter().filter_map(|n| converter.convert_macro(n)));
				out.combos
					.extend(extracted.combos.iter().filter_map(|n| converter.convert_combo(n)));
			}
			SectionKind::Macro => {
				out.macros
					.extend(extracted.macros.iter().filter_map(|n| converter.convert_macro(n)));
			}
			SectionKind::Combo => {
				out.combos
					.extend(extracted.combos.iter().filter_map(|n| converter.convert_combo(n)));
			}
			_ => {}
		}
		out.warnings.append(&mut converter.take_warnings());
	}

	fn process_keymap_section(&self, section: &ExtractedSection, out: &mut ProcessedSections) {
		let doc = match DtDocument::parse(&section.content) {
			Ok(doc) => doc,
			Err(err) => {
				out.warnings.push(format!("keymap section: {err}"));
				return;
			}
		};
		out.warnings.extend(doc.errors.iter().map(|e| format!("keymap section: {e}")));

		match decode_layers(&doc.roots) {
			Some(mut decoded) => {
				out.layer_names = decoded.layer_names;
				out.layers = decoded.layers;
				out.warnings.append(&mut decoded.warnings);
			}
			None => out.warnings.push("no layer data found in keymap section".to_string()),
		}
	}
}

fn build_regex(pattern: &str) -> Result<regex::Regex, regex::Error> {
	RegexBuilder::new(pattern).case_insensitive(true).multi_line(true).build()
}

/// Drop empty lines, pure comment lines, and template comment lines.
fn clean_section_content(content: &str) -> String {
	let mut lines = Vec::new();
	for line in content.lines() {
		let stripped = line.trim();
		if stripped.is_empty() {
			continue;
		}
		if stripped.starts_with("//")
			|| (stripped.starts_with("/*") && stripped.ends_with("*/"))
		{
			continue;
		}
		if stripped.contains("{#") && stripped.contains("#}") {
			continue;
		}
		lines.push(line);
	}
	lines.join("\n")
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	const TEMPLATE_KEYMAP: &str = r#"
// generated keymap
#include <behaviors.dtsi>

/ {
	behaviors {
		{# user behaviors #}
		hm: homerow {
			compatible = "zmk,behavior-hold-tap";
			tapping-term-ms = <200>;
			bindings = <&kp>, <&kp>;
		};
	};

	macros {
		hi: macro_hi {
			compatible = "zmk,behavior-macro";
			#binding-cells = <0>;
			bindings = <&kp H &kp I>;
		};
	};

	combos {
		combo_esc {
			key-positions = <0 1>;
			bindings = <&kp ESC>;
		};
	};

	keymap {
		compatible = "zmk,keymap";
		layer_base {
			bindings = <&kp Q &kp W>;
		};
		layer_nav {
			bindings = <&mo 1 &trans>;
		};
	};
};
"#;

	#[test]
	fn test_extract_sections_by_delimiters() {
		let extractor = SectionExtractor::new();
		let (sections, warnings) =
			extractor.extract_sections(TEMPLATE_KEYMAP, &default_extraction_config());
		assert!(warnings.is_empty());

		assert!(sections.contains_key("user_behaviors_dtsi"));
		assert!(sections.contains_key("user_macros_dtsi"));
		assert!(sections.contains_key("combos_dtsi"));
		assert!(sections.contains_key("keymap_dtsi"));

		let behaviors = &sections["user_behaviors_dtsi"];
		assert!(behaviors.raw_content.contains("hm: homerow"));
		// The macros section must not bleed into the behaviors slice.
		assert!(!behaviors.raw_content.contains("macro_hi"));
	}

	#[test]
	fn test_cleaning_drops_comment_and_template_lines() {
		let cleaned = clean_section_content(
			"\n// pure comment\n/* block */\n{# template note #}\nreal content;\n",
		);
		assert_eq!(cleaned, "real content;");
	}

	#[test]
	fn test_process_sections_full_round() {
		let extractor = SectionExtractor::new();
		let (sections, _) =
			extractor.extract_sections(TEMPLATE_KEYMAP, &default_extraction_config());
		let processed = extractor.process_sections(&sections);

		assert_eq!(processed.layer_names, vec!["base", "nav"]);
		assert_eq!(processed.layers.len(), 2);
		assert_eq!(processed.hold_taps.len(), 1);
		assert_eq!(processed.hold_taps[0].name, "&hm");
		assert_eq!(processed.macros.len(), 1);
		assert_eq!(processed.macros[0].name, "&hi");
		assert_eq!(processed.combos.len(), 1);
		assert_eq!(processed.combos[0].name, "esc");
	}

	#[test]
	fn test_custom_dtsi_sections_with_markers() {
		let source = "/* Custom Defined Behaviors */\nspecial: thing {\n\tstatus = \"okay\";\n};\n/* Custom Devicetree */\n&pinctrl {\n\tgroove;\n};\n";
		let extractor = SectionExtractor::new();
		let (sections, _) = extractor.extract_sections(source, &default_extraction_config());
		let processed = extractor.process_sections(&sections);

		let behaviors = processed.custom_defined_behaviors.unwrap();
		assert!(behaviors.contains("special: thing"));
		let devicetree = processed.custom_devicetree.unwrap();
		assert!(devicetree.contains("&pinctrl"));
	}

	#[test]
	fn test_invalid_pattern_warns_but_continues() {
		let configs = vec![
			ExtractionConfig::new("bad", "bad", SectionKind::Dtsi, r"([", None),
			ExtractionConfig::new(
				"keymap_dtsi",
				"keymap",
				SectionKind::Keymap,
				r"keymap\s*\{",
				None,
			),
		];
		let extractor = SectionExtractor::new();
		let (sections, warnings) = extractor.extract_sections(TEMPLATE_KEYMAP, &configs);
		assert_eq!(warnings.len(), 1);
		assert!(warnings[0].contains("invalid start pattern"));
		assert!(sections.contains_key("keymap_dtsi"));
	}

	#[test]
	fn test_missing_section_is_skipped() {
		let extractor = SectionExtractor::new();
		let (sections, warnings) =
			extractor.extract_sections("/ { };", &default_extraction_config());
		assert!(sections.is_empty());
		assert!(warnings.is_empty());
	}
}
