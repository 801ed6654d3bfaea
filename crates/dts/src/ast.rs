//! Annotated Devicetree AST.
//!
//! Nodes own their properties, children, and attached comments. Children and
//! properties live in insertion-ordered maps keyed by name; redefinition
//! updates the existing entry in place, so every child stays addressable by
//! a stable key.

use indexmap::IndexMap;
use tracing::warn;

/// A comment attached to a node or property, delimiters included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DtComment {
	pub text: String,
	pub is_block: bool,
	pub line: u32,
	pub column: u32,
}

impl DtComment {
	/// Comment text with `//` or `/* */` delimiters stripped.
	pub fn content(&self) -> &str {
		let text = self.text.trim();
		if let Some(rest) = text.strip_prefix("//") {
			rest.trim()
		} else if let Some(rest) = text.strip_prefix("/*") {
			rest.strip_suffix("*/").unwrap_or(rest).trim()
		} else {
			text
		}
	}
}

/// A preprocessor directive encountered while parsing (`#ifdef`, `#define`, …).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DtConditional {
	/// Directive name without the leading `#`.
	pub directive: String,
	/// Everything after the directive name.
	pub condition: String,
	pub line: u32,
}

/// One element of an angle-bracket array.
///
/// Identifiers, references, and reassembled function calls such as
/// `LA(LC(LSHFT))` are preserved textually; only plain numbers are decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DtArrayElem {
	Int(i64),
	/// A quoted string element.
	Str(String),
	/// An identifier, `&reference`, or function-call token kept verbatim.
	Token(String),
}

impl DtArrayElem {
	pub fn as_text(&self) -> String {
		match self {
			DtArrayElem::Int(v) => v.to_string(),
			DtArrayElem::Str(s) | DtArrayElem::Token(s) => s.clone(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DtValueKind {
	Str(String),
	Int(i64),
	Bool(bool),
	/// `&label` reference; the string excludes the ampersand.
	Reference(String),
	Array(Vec<DtArrayElem>),
}

/// A property value together with its raw source text.
///
/// The raw text is kept for diagnostics and loss-free re-emission; it always
/// re-tokenizes to an equivalent value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DtValue {
	pub kind: DtValueKind,
	pub raw: String,
}

impl DtValue {
	pub fn string(value: impl Into<String>, raw: impl Into<String>) -> Self {
		Self { kind: DtValueKind::Str(value.into()), raw: raw.into() }
	}

	pub fn integer(value: i64, raw: impl Into<String>) -> Self {
		Self { kind: DtValueKind::Int(value), raw: raw.into() }
	}

	pub fn boolean(value: bool) -> Self {
		Self { kind: DtValueKind::Bool(value), raw: String::new() }
	}

	pub fn reference(label: impl Into<String>, raw: impl Into<String>) -> Self {
		Self { kind: DtValueKind::Reference(label.into()), raw: raw.into() }
	}

	pub fn array(elems: Vec<DtArrayElem>, raw: impl Into<String>) -> Self {
		Self { kind: DtValueKind::Array(elems), raw: raw.into() }
	}

	/// String form of the value: quoted strings verbatim, scalars
	/// stringified, references with their `&` restored, arrays via raw text.
	pub fn as_str(&self) -> String {
		match &self.kind {
			DtValueKind::Str(s) => s.clone(),
			DtValueKind::Int(v) => v.to_string(),
			DtValueKind::Bool(b) => b.to_string(),
			DtValueKind::Reference(r) => format!("&{r}"),
			DtValueKind::Array(_) => self.raw.clone(),
		}
	}

	/// Integer coercion: decimal or hex literals, one-element arrays, or
	/// angle-stripped raw text.
	pub fn as_int(&self) -> Option<i64> {
		match &self.kind {
			DtValueKind::Int(v) => Some(*v),
			DtValueKind::Str(s) => parse_int_text(s.trim().trim_matches(['<', '>'])),
			DtValueKind::Array(elems) if elems.len() == 1 => match &elems[0] {
				DtArrayElem::Int(v) => Some(*v),
				DtArrayElem::Str(s) | DtArrayElem::Token(s) => parse_int_text(s),
			},
			DtValueKind::Bool(_) | DtValueKind::Reference(_) | DtValueKind::Array(_) => {
				parse_int_text(self.raw.trim().trim_matches(['<', '>']).trim())
			}
		}
	}

	/// Boolean coercion: presence alone means true, so only explicit textual
	/// falsehoods and absent values read as false.
	pub fn as_bool(&self) -> bool {
		match &self.kind {
			DtValueKind::Bool(b) => *b,
			DtValueKind::Int(v) => *v != 0,
			DtValueKind::Str(s) => {
				matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
			}
			DtValueKind::Reference(_) | DtValueKind::Array(_) => true,
		}
	}

	/// Integer-array coercion. Elements that cannot be coerced are skipped
	/// with a warning.
	pub fn as_int_array(&self) -> Vec<i64> {
		match &self.kind {
			DtValueKind::Array(elems) => elems
				.iter()
				.filter_map(|elem| match elem {
					DtArrayElem::Int(v) => Some(*v),
					DtArrayElem::Str(s) | DtArrayElem::Token(s) => {
						let parsed = parse_int_text(s);
						if parsed.is_none() {
							warn!(element = %s, "skipping non-integer array element");
						}
						parsed
					}
				})
				.collect(),
			DtValueKind::Int(v) => vec![*v],
			_ => self
				.raw
				.trim()
				.trim_matches(['<', '>'])
				.split_whitespace()
				.filter_map(parse_int_text)
				.collect(),
		}
	}

	/// True when any string form of the value contains `needle`.
	pub fn string_contains(&self, needle: &str) -> bool {
		match &self.kind {
			DtValueKind::Str(s) => s.contains(needle),
			DtValueKind::Array(elems) => elems.iter().any(|e| match e {
				DtArrayElem::Str(s) | DtArrayElem::Token(s) => s.contains(needle),
				DtArrayElem::Int(_) => false,
			}),
			_ => false,
		}
	}
}

fn parse_int_text(text: &str) -> Option<i64> {
	let text = text.trim();
	if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
		i64::from_str_radix(hex, 16).ok()
	} else {
		text.parse().ok()
	}
}

/// A named property with an optional value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DtProperty {
	pub name: String,
	pub value: Option<DtValue>,
	pub comments: Vec<DtComment>,
	pub line: u32,
	pub column: u32,
}

impl DtProperty {
	pub fn new(name: impl Into<String>, value: Option<DtValue>, line: u32, column: u32) -> Self {
		Self { name: name.into(), value, comments: Vec::new(), line, column }
	}
}

/// A Devicetree node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DtNode {
	pub name: String,
	pub label: Option<String>,
	pub unit_address: Option<String>,
	pub properties: IndexMap<String, DtProperty>,
	pub children: IndexMap<String, DtNode>,
	pub comments: Vec<DtComment>,
	pub line: u32,
	pub column: u32,
}

impl DtNode {
	pub fn new(name: impl Into<String>, line: u32, column: u32) -> Self {
		Self { name: name.into(), line, column, ..Self::default() }
	}

	pub fn add_property(&mut self, prop: DtProperty) {
		self.properties.insert(prop.name.clone(), prop);
	}

	pub fn add_child(&mut self, child: DtNode) {
		self.children.insert(child.name.clone(), child);
	}

	/// Dash/underscore-insensitive property lookup: `tapping-term-ms` and
	/// `tapping_term_ms` resolve to the same property.
	pub fn get_property(&self, name: &str) -> Option<&DtProperty> {
		if let Some(prop) = self.properties.get(name) {
			return Some(prop);
		}
		let wanted = normalize_name(name);
		self.properties.values().find(|p| normalize_name(&p.name) == wanted)
	}

	/// String value of the `compatible` property, when present.
	pub fn compatible(&self) -> Option<String> {
		let value = self.get_property("compatible")?.value.as_ref()?;
		Some(value.as_str())
	}

	/// Pre-order traversal of this node and all descendants.
	pub fn walk(&self) -> impl Iterator<Item = &DtNode> {
		let mut stack = vec![self];
		std::iter::from_fn(move || {
			let node = stack.pop()?;
			for child in node.children.values().rev() {
				stack.push(child);
			}
			Some(node)
		})
	}

	/// Resolve a slash-separated path such as `/keymap/layer_base` relative
	/// to this node.
	pub fn find_node_by_path(&self, path: &str) -> Option<&DtNode> {
		let mut current = self;
		for segment in path.split('/').filter(|s| !s.is_empty()) {
			current = current.children.get(segment)?;
		}
		Some(current)
	}

	/// All descendants (including self) whose `compatible` string contains
	/// the given substring.
	pub fn find_nodes_by_compatible(&self, needle: &str) -> Vec<&DtNode> {
		self.walk()
			.filter(|node| {
				node.get_property("compatible")
					.and_then(|p| p.value.as_ref())
					.is_some_and(|v| v.string_contains(needle))
			})
			.collect()
	}

	/// Find the direct parent of `target` within this subtree, comparing by
	/// node identity.
	pub fn parent_of(&self, target: &DtNode) -> Option<&DtNode> {
		self.walk().find(|node| node.children.values().any(|c| std::ptr::eq(c, target)))
	}
}

fn normalize_name(name: &str) -> String {
	name.replace('-', "_")
}
