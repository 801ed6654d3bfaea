//! Structural diffing and patching for keyboard layouts.
//!
//! The diff document ([`LayoutDiff`]) is position-aware for layers and
//! identity-keyed for behaviors; [`apply_patch`] is its inverse, so
//! `apply_patch(a, create_layout_diff(a, b))` reproduces `b` up to
//! canonical ordering of behavior lists.

pub mod diff;
pub mod error;
pub mod models;
pub mod patch;

pub use diff::create_layout_diff;
pub use error::DiffError;
pub use models::{
	AddedLayer, BehaviorChanges, BehaviorEntry, DIFF_TYPE, LayerChanges, LayerModification,
	LayoutDiff, PatchOp, PatchOpKind, RemovedLayer,
};
pub use patch::apply_patch;
