//! Key binding records and the binding-string parser.
//!
//! A binding is a behavior reference (`&kp`, `&hm`, …) followed by
//! parameters. Parameters are recursive to represent modifier function calls:
//! `&sk LA(LC(LSHFT))` parses into one parameter `LA` whose children recurse
//! through `LC` down to `LSHFT`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// A scalar parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
	Int(i64),
	Bool(bool),
	Str(String),
}

impl Default for ParamValue {
	fn default() -> Self {
		ParamValue::Int(0)
	}
}

impl ParamValue {
	pub fn as_int(&self) -> Option<i64> {
		match self {
			ParamValue::Int(v) => Some(*v),
			ParamValue::Str(s) => s.parse().ok(),
			ParamValue::Bool(_) => None,
		}
	}
}

impl fmt::Display for ParamValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ParamValue::Int(v) => write!(f, "{v}"),
			ParamValue::Bool(b) => write!(f, "{b}"),
			ParamValue::Str(s) => write!(f, "{s}"),
		}
	}
}

impl From<&str> for ParamValue {
	fn from(s: &str) -> Self {
		ParamValue::Str(s.to_string())
	}
}

impl From<i64> for ParamValue {
	fn from(v: i64) -> Self {
		ParamValue::Int(v)
	}
}

/// A binding parameter: a scalar value plus nested sub-parameters for
/// function-call syntax.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutParam {
	pub value: ParamValue,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub params: Vec<LayoutParam>,
}

impl LayoutParam {
	pub fn new(value: impl Into<ParamValue>) -> Self {
		Self { value: value.into(), params: Vec::new() }
	}

	pub fn call(value: impl Into<ParamValue>, params: Vec<LayoutParam>) -> Self {
		Self { value: value.into(), params }
	}
}

impl fmt::Display for LayoutParam {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.params.is_empty() {
			write!(f, "{}", self.value)
		} else {
			let inner: Vec<String> = self.params.iter().map(ToString::to_string).collect();
			write!(f, "{}({})", self.value, inner.join(" "))
		}
	}
}

/// A single key action: behavior reference plus ordered parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutBinding {
	pub value: String,
	#[serde(default)]
	pub params: Vec<LayoutParam>,
}

impl LayoutBinding {
	pub fn new(value: impl Into<String>) -> Self {
		Self { value: value.into(), params: Vec::new() }
	}

	pub fn with_params(value: impl Into<String>, params: Vec<LayoutParam>) -> Self {
		Self { value: value.into(), params }
	}

	/// The keyboard's no-op binding.
	pub fn none() -> Self {
		Self::new("&none")
	}

	/// Behavior reference of this binding.
	pub fn behavior(&self) -> &str {
		&self.value
	}

	/// Parse a binding string, falling back to a parameterless binding with
	/// the raw text as its value when the string does not parse. The
	/// fallback is logged but never an error.
	pub fn parse_lenient(raw: &str) -> Self {
		match raw.parse() {
			Ok(binding) => binding,
			Err(err) => {
				warn!(binding = raw, %err, "falling back to raw binding");
				Self::new(raw)
			}
		}
	}
}

impl Default for LayoutBinding {
	fn default() -> Self {
		Self::none()
	}
}

impl fmt::Display for LayoutBinding {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.value)?;
		for param in &self.params {
			write!(f, " {param}")?;
		}
		Ok(())
	}
}

/// Errors from binding-string parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingParseError {
	#[error("empty binding string")]
	Empty,

	#[error("unbalanced parentheses in '{0}'")]
	UnbalancedParens(String),
}

impl FromStr for LayoutBinding {
	type Err = BindingParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let normalized = normalize_parens(s);
		let tokens = split_top_level(&normalized)?;
		let mut iter = tokens.into_iter();
		let value = iter.next().ok_or(BindingParseError::Empty)?;

		let mut params = Vec::new();
		for token in iter {
			params.push(parse_param(&token)?);
		}
		Ok(LayoutBinding { value, params })
	}
}

/// Remove whitespace adjacent to parentheses so that spaced forms like
/// `LA ( LC ( LSHFT ) )` parse the same as `LA(LC(LSHFT))`.
fn normalize_parens(s: &str) -> String {
	let mut out = String::with_capacity(s.len());
	let chars: Vec<char> = s.trim().chars().collect();
	let mut i = 0;
	while i < chars.len() {
		let ch = chars[i];
		if ch.is_whitespace() {
			// Collapse the run, then drop it entirely when it borders a paren.
			let mut j = i;
			while j < chars.len() && chars[j].is_whitespace() {
				j += 1;
			}
			let next = chars.get(j);
			let prev = out.chars().last();
			// Drop runs before any paren and after an opening paren; a run
			// after a closing paren still separates sibling tokens.
			let borders_paren =
				matches!(next, Some('(') | Some(')')) || matches!(prev, Some('('));
			if !borders_paren && next.is_some() {
				out.push(' ');
			}
			i = j;
		} else {
			out.push(ch);
			i += 1;
		}
	}
	out
}

/// Split on whitespace at parenthesis depth zero.
fn split_top_level(s: &str) -> Result<Vec<String>, BindingParseError> {
	let mut tokens = Vec::new();
	let mut current = String::new();
	let mut depth: i32 = 0;

	for ch in s.chars() {
		match ch {
			'(' => {
				depth += 1;
				current.push(ch);
			}
			')' => {
				depth -= 1;
				if depth < 0 {
					return Err(BindingParseError::UnbalancedParens(s.to_string()));
				}
				current.push(ch);
			}
			c if c.is_whitespace() && depth == 0 => {
				if !current.is_empty() {
					tokens.push(std::mem::take(&mut current));
				}
			}
			c => current.push(c),
		}
	}
	if depth != 0 {
		return Err(BindingParseError::UnbalancedParens(s.to_string()));
	}
	if !current.is_empty() {
		tokens.push(current);
	}
	Ok(tokens)
}

fn parse_param(token: &str) -> Result<LayoutParam, BindingParseError> {
	if let Some(open) = token.find('(') {
		if !token.ends_with(')') {
			return Err(BindingParseError::UnbalancedParens(token.to_string()));
		}
		let name = &token[..open];
		let inner = &token[open + 1..token.len() - 1];
		let mut params = Vec::new();
		for part in split_top_level(inner)? {
			let part = part.trim_end_matches(',');
			if !part.is_empty() {
				params.push(parse_param(part)?);
			}
		}
		return Ok(LayoutParam::call(scalar(name), params));
	}
	Ok(LayoutParam::new(scalar(token)))
}

fn scalar(token: &str) -> ParamValue {
	match token.parse::<i64>() {
		Ok(v) => ParamValue::Int(v),
		Err(_) => ParamValue::Str(token.to_string()),
	}
}
