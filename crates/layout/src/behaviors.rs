//! Typed behavior records: hold-taps, combos, macros, input listeners.
//!
//! Field names on the wire follow the layout JSON format (camelCase for the
//! behavior-specific fields); snake_case spellings are accepted on input.

use serde::{Deserialize, Serialize};

use crate::binding::{LayoutBinding, ParamValue};
use crate::error::LayoutError;

/// Hold-tap flavors accepted by the firmware.
pub const HOLD_TAP_FLAVORS: &[&str] =
	&["tap-preferred", "hold-preferred", "balanced", "tap-unless-interrupted"];

/// A hold-tap behavior: one binding on tap, another on hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HoldTapBehavior {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	/// Exactly two behavior references: hold, then tap.
	#[serde(default)]
	pub bindings: Vec<String>,
	#[serde(
		rename = "tappingTermMs",
		alias = "tapping_term_ms",
		default,
		skip_serializing_if = "Option::is_none"
	)]
	pub tapping_term_ms: Option<i64>,
	#[serde(
		rename = "quickTapMs",
		alias = "quick_tap_ms",
		default,
		skip_serializing_if = "Option::is_none"
	)]
	pub quick_tap_ms: Option<i64>,
	#[serde(
		rename = "requirePriorIdleMs",
		alias = "require_prior_idle_ms",
		default,
		skip_serializing_if = "Option::is_none"
	)]
	pub require_prior_idle_ms: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub flavor: Option<String>,
	#[serde(
		rename = "holdTriggerOnRelease",
		alias = "hold_trigger_on_release",
		default,
		skip_serializing_if = "Option::is_none"
	)]
	pub hold_trigger_on_release: Option<bool>,
	#[serde(
		rename = "holdTriggerKeyPositions",
		alias = "hold_trigger_key_positions",
		default,
		skip_serializing_if = "Option::is_none"
	)]
	pub hold_trigger_key_positions: Option<Vec<i64>>,
	#[serde(
		rename = "retroTap",
		alias = "retro_tap",
		default,
		skip_serializing_if = "Option::is_none"
	)]
	pub retro_tap: Option<bool>,
}

impl HoldTapBehavior {
	pub fn new(name: impl Into<String>) -> Self {
		Self { name: name.into(), ..Self::default() }
	}

	/// Check the record-level contracts: exactly two bindings, known flavor.
	pub fn validate(&self) -> Result<(), LayoutError> {
		if self.bindings.len() != 2 {
			return Err(LayoutError::HoldTapBindingCount {
				name: self.name.clone(),
				found: self.bindings.len(),
			});
		}
		if let Some(flavor) = &self.flavor
			&& !HOLD_TAP_FLAVORS.contains(&flavor.as_str())
		{
			return Err(LayoutError::InvalidFlavor {
				name: self.name.clone(),
				flavor: flavor.clone(),
			});
		}
		Ok(())
	}
}

/// A combo: an action fired when a set of key positions is pressed together.
///
/// Combo names are bare (no `&` prefix) in the layout format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComboBehavior {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(
		rename = "timeoutMs",
		alias = "timeout_ms",
		default,
		skip_serializing_if = "Option::is_none"
	)]
	pub timeout_ms: Option<i64>,
	#[serde(rename = "keyPositions", alias = "key_positions", default)]
	pub key_positions: Vec<i64>,
	/// Layers the combo is active on; `[-1]` is the placeholder for "not
	/// specified in the source".
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub layers: Option<Vec<i64>>,
	pub binding: LayoutBinding,
}

impl ComboBehavior {
	pub fn validate(&self) -> Result<(), LayoutError> {
		if self.key_positions.is_empty() {
			return Err(LayoutError::EmptyKeyPositions(self.name.clone()));
		}
		for &position in &self.key_positions {
			if position < 0 {
				return Err(LayoutError::InvalidKeyPosition {
					name: self.name.clone(),
					position,
				});
			}
		}
		Ok(())
	}
}

/// A macro: an ordered sequence of bindings executed as one activation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MacroBehavior {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(
		rename = "waitMs",
		alias = "wait_ms",
		default,
		skip_serializing_if = "Option::is_none"
	)]
	pub wait_ms: Option<i64>,
	#[serde(
		rename = "tapMs",
		alias = "tap_ms",
		default,
		skip_serializing_if = "Option::is_none"
	)]
	pub tap_ms: Option<i64>,
	#[serde(default)]
	pub bindings: Vec<LayoutBinding>,
	/// Parameter slots: `[]`, `["code"]`, or `["param1", "param2"]`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub params: Option<Vec<ParamValue>>,
}

impl MacroBehavior {
	pub fn new(name: impl Into<String>) -> Self {
		Self { name: name.into(), ..Self::default() }
	}

	pub fn validate(&self) -> Result<(), LayoutError> {
		if let Some(params) = &self.params
			&& params.len() > 2
		{
			return Err(LayoutError::MacroParamCount {
				name: self.name.clone(),
				found: params.len(),
			});
		}
		Ok(())
	}
}

/// An input processor applied by an input listener.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputProcessor {
	pub code: String,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub params: Vec<ParamValue>,
}

/// A per-layer node inside an input listener.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputListenerNode {
	pub code: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub layers: Vec<i64>,
	#[serde(
		rename = "inputProcessors",
		alias = "input_processors",
		default,
		skip_serializing_if = "Vec::is_empty"
	)]
	pub input_processors: Vec<InputProcessor>,
}

/// An input listener (pointer devices and similar). Identity is `code`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputListener {
	pub code: String,
	#[serde(
		rename = "inputProcessors",
		alias = "input_processors",
		default,
		skip_serializing_if = "Vec::is_empty"
	)]
	pub input_processors: Vec<InputProcessor>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub nodes: Vec<InputListenerNode>,
}

/// A keyboard configuration parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigParameter {
	#[serde(rename = "paramName", alias = "param_name")]
	pub param_name: String,
	pub value: ParamValue,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
}
