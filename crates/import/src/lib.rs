//! Keymap import pipeline: Devicetree source to typed layout records.
//!
//! The pipeline walks parsed ASTs from `keyweave-dts`, classifies behavior
//! subtrees by `compatible` patterns, lowers them into the typed records of
//! `keyweave-layout`, and captures round-trip metadata (comments, includes,
//! directives, header/footer). The [`KeymapImporter`] orchestrates both
//! import modes; [`KeyboardProfile`] is the seam to the keyboard
//! configuration collaborator.

pub mod bindings;
pub mod convert;
pub mod extract;
pub mod import;
pub mod layers;
pub mod metadata;
pub mod section;

pub use bindings::group_bindings;
pub use convert::BehaviorConverter;
pub use extract::{AdvancedPatterns, Archetype, BehaviorExtractor, ExtractedBehaviors};
pub use import::{ImportResult, KeyboardProfile, KeymapImporter, ParsingMode};
pub use layers::{DecodedLayers, decode_layers};
pub use metadata::{IncludeResolver, MetadataExtractor};
pub use section::{
	ExtractedSection, ExtractionConfig, ProcessedSections, SectionExtractor, SectionKind,
	default_extraction_config,
};
