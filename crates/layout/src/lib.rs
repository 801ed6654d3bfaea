//! Typed ZMK layout records and the operations that work on them.
//!
//! The layout record ([`LayoutData`]) is the JSON-facing core of keyweave:
//! metadata, ordered layers of [`LayoutBinding`]s, behavior definitions, and
//! the round-trip [`KeymapMetadata`] block captured during keymap import.
//! On top of the records this crate provides variable resolution
//! (`${name}` / `{{ expr }}` templates), layer management, and
//! layer-reference validation.

pub mod behaviors;
pub mod binding;
pub mod error;
pub mod layers;
pub mod layout;
pub mod metadata;
pub mod variables;

pub use behaviors::{
	ComboBehavior, ConfigParameter, HOLD_TAP_FLAVORS, HoldTapBehavior, InputListener,
	InputListenerNode, InputProcessor, MacroBehavior,
};
pub use binding::{BindingParseError, LayoutBinding, LayoutParam, ParamValue};
pub use error::{LayoutError, Result};
pub use layers::{
	DEFAULT_KEY_COUNT, ExportFormat, LayerInfo, LayerOps, LayerSource, MoveReport, RemoveReport,
	RemovedLayer,
};
pub use layout::{LayoutData, LayoutLayer};
pub use metadata::{
	ConfigDirective, DependencyInfo, KeymapComment, KeymapInclude, KeymapMetadata,
};
pub use variables::{
	SkipResolution, VariableResolver, flatten_value, resolution_skipped, usage, validate_value,
};
