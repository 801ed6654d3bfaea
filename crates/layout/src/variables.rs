//! Variable substitution over the serialized layout shape.
//!
//! Templates are resolved on the generic JSON value tree, not the typed
//! records: `${name}` substitutes a top-level variable, `{{ expr }}`
//! evaluates a small attribute/index expression against variable values.
//! Unknown references are left verbatim and reported as warnings.

use std::cell::Cell;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::error::Result;
use crate::layout::LayoutData;

static SIMPLE_RE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static pattern"));
static EXPR_RE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("static pattern"));

thread_local! {
	static SKIP_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Scoped, re-entrant marker that disables variable resolution on the
/// current thread while alive. Used during raw file editing where template
/// tokens must survive untouched.
#[must_use = "resolution is only skipped while the guard is alive"]
pub struct SkipResolution {
	_not_send: std::marker::PhantomData<*const ()>,
}

impl SkipResolution {
	pub fn acquire() -> Self {
		SKIP_DEPTH.with(|depth| depth.set(depth.get() + 1));
		Self { _not_send: std::marker::PhantomData }
	}
}

impl Drop for SkipResolution {
	fn drop(&mut self) {
		SKIP_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
	}
}

/// True while any [`SkipResolution`] guard is alive on this thread.
pub fn resolution_skipped() -> bool {
	SKIP_DEPTH.with(|depth| depth.get() > 0)
}

/// Resolves `${name}` and `{{ expr }}` templates against a variables map.
pub struct VariableResolver<'a> {
	variables: &'a serde_json::Map<String, Value>,
}

impl<'a> VariableResolver<'a> {
	pub fn new(variables: &'a serde_json::Map<String, Value>) -> Self {
		Self { variables }
	}

	/// Resolve every template reference in `value`, returning the resolved
	/// tree and warnings for everything left unresolved.
	pub fn resolve(&self, value: &Value) -> (Value, Vec<String>) {
		let mut warnings = Vec::new();
		let resolved = self.resolve_inner(value, &mut warnings);
		(resolved, warnings)
	}

	fn resolve_inner(&self, value: &Value, warnings: &mut Vec<String>) -> Value {
		match value {
			Value::String(text) => self.resolve_string(text, warnings),
			Value::Array(items) => {
				Value::Array(items.iter().map(|item| self.resolve_inner(item, warnings)).collect())
			}
			Value::Object(map) => Value::Object(
				map.iter()
					.map(|(key, item)| (key.clone(), self.resolve_inner(item, warnings)))
					.collect(),
			),
			other => other.clone(),
		}
	}

	fn resolve_string(&self, text: &str, warnings: &mut Vec<String>) -> Value {
		let trimmed = text.trim();

		// A string that is exactly one reference substitutes the typed value,
		// so `"${timing}"` can resolve to an integer.
		if let Some(cap) = SIMPLE_RE.captures(trimmed)
			&& cap.get(0).map(|m| m.as_str()) == Some(trimmed)
		{
			match self.variables.get(&cap[1]) {
				Some(value) => return value.clone(),
				None => {
					push_warning(warnings, format!("unknown variable '{}'", &cap[1]));
					return Value::String(text.to_string());
				}
			}
		}
		if let Some(cap) = EXPR_RE.captures(trimmed)
			&& cap.get(0).map(|m| m.as_str()) == Some(trimmed)
		{
			match self.eval_expr(&cap[1]) {
				Some(value) => return value,
				None => {
					push_warning(warnings, format!("unresolvable expression '{{{{ {} }}}}'", &cap[1]));
					return Value::String(text.to_string());
				}
			}
		}

		// Embedded references splice their stringified values.
		let mut result = text.to_string();

		let simple_replaced = SIMPLE_RE.replace_all(&result, |cap: &regex::Captures<'_>| {
			match self.variables.get(&cap[1]) {
				Some(value) => stringify(value),
				None => {
					push_warning(warnings, format!("unknown variable '{}'", &cap[1]));
					cap[0].to_string()
				}
			}
		});
		result = simple_replaced.into_owned();

		let expr_replaced = EXPR_RE.replace_all(&result, |cap: &regex::Captures<'_>| {
			match self.eval_expr(&cap[1]) {
				Some(value) => stringify(&value),
				None => {
					push_warning(warnings, format!("unresolvable expression '{{{{ {} }}}}'", &cap[1]));
					cap[0].to_string()
				}
			}
		});
		result = expr_replaced.into_owned();

		Value::String(result)
	}

	/// Evaluate `name(.attr | [index] | ["key"])*` against the variables.
	fn eval_expr(&self, expr: &str) -> Option<Value> {
		let expr = expr.trim();
		let name_end = expr.find(['.', '[']).unwrap_or(expr.len());
		let (name, mut rest) = expr.split_at(name_end);
		let mut current = self.variables.get(name.trim())?.clone();

		while !rest.is_empty() {
			if let Some(after) = rest.strip_prefix('.') {
				let end = after.find(['.', '[']).unwrap_or(after.len());
				let (attr, remaining) = after.split_at(end);
				current = current.get(attr.trim())?.clone();
				rest = remaining;
			} else if let Some(after) = rest.strip_prefix('[') {
				let close = after.find(']')?;
				let key = after[..close].trim();
				current = if let Ok(index) = key.parse::<usize>() {
					current.get(index)?.clone()
				} else {
					current.get(key.trim_matches(['"', '\'']))?.clone()
				};
				rest = &after[close + 1..];
			} else {
				return None;
			}
		}
		Some(current)
	}
}

fn stringify(value: &Value) -> String {
	match value {
		Value::String(s) => s.clone(),
		other => other.to_string(),
	}
}

fn push_warning(warnings: &mut Vec<String>, message: String) {
	warn!("{message}");
	warnings.push(message);
}

/// Resolve all templates in a serialized layout and drop the `variables`
/// entry. A no-op (returning the input unchanged) while resolution is
/// skipped. Idempotent: flattening a flattened value changes nothing.
pub fn flatten_value(value: &Value) -> (Value, Vec<String>) {
	if resolution_skipped() {
		return (value.clone(), Vec::new());
	}

	let Value::Object(map) = value else {
		return (value.clone(), Vec::new());
	};

	let empty = serde_json::Map::new();
	let variables = match map.get("variables") {
		Some(Value::Object(vars)) => vars,
		_ => &empty,
	};
	let resolver = VariableResolver::new(variables);

	let mut warnings = Vec::new();
	let mut out = serde_json::Map::new();
	for (key, item) in map {
		if key == "variables" {
			continue;
		}
		out.insert(key.clone(), resolver.resolve_inner(item, &mut warnings));
	}
	(Value::Object(out), warnings)
}

/// Report every unresolvable template reference in a serialized layout.
pub fn validate_value(value: &Value) -> Vec<String> {
	let (_, warnings) = flatten_value(value);
	warnings
}

/// Map each referenced variable name to the JSON paths where it appears.
pub fn usage(value: &Value) -> IndexMap<String, Vec<String>> {
	let mut usages: IndexMap<String, Vec<String>> = IndexMap::new();
	collect_usage(value, String::new(), &mut usages);
	usages
}

fn collect_usage(value: &Value, path: String, usages: &mut IndexMap<String, Vec<String>>) {
	match value {
		Value::String(text) => {
			for cap in SIMPLE_RE.captures_iter(text) {
				usages.entry(cap[1].to_string()).or_default().push(path.clone());
			}
			for cap in EXPR_RE.captures_iter(text) {
				let expr = cap[1].trim();
				let name_end = expr.find(['.', '[']).unwrap_or(expr.len());
				usages.entry(expr[..name_end].trim().to_string()).or_default().push(path.clone());
			}
		}
		Value::Array(items) => {
			for (index, item) in items.iter().enumerate() {
				collect_usage(item, format!("{path}/{index}"), usages);
			}
		}
		Value::Object(map) => {
			for (key, item) in map {
				if path.is_empty() && key == "variables" {
					continue;
				}
				collect_usage(item, format!("{path}/{key}"), usages);
			}
		}
		_ => {}
	}
}

impl LayoutData {
	/// Serialize with all templates resolved and the `variables` section
	/// removed. Returns the flattened value with resolution warnings.
	pub fn to_flattened_value(&self) -> Result<(Value, Vec<String>)> {
		let value = self.to_value()?;
		Ok(flatten_value(&value))
	}
}
