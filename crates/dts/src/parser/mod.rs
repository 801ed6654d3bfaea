//! Recursive descent parser for Devicetree source.
//!
//! The parser accepts a top-level sequence of root blocks (`/ { … };`),
//! reference-node modifications (`&label { … };`), and stray labeled nodes.
//! It never aborts: on a parse error it records a diagnostic, synchronizes
//! past the next `;` or `}`, and keeps going, returning a partial tree
//! together with the error list.

use thiserror::Error;

use crate::ast::{DtArrayElem, DtComment, DtConditional, DtNode, DtProperty, DtValue};
use crate::lexer::{LexError, tokenize};
use crate::token::{Token, TokenKind};


/// A recoverable parse diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at {line}:{column}: {message} [{context}]")]
pub struct ParseError {
	pub message: String,
	pub line: u32,
	pub column: u32,
	/// Tokens surrounding the error position, with the offending token marked.
	pub context: String,
}

/// Result of parsing one Devicetree source.
#[derive(Debug, Clone, Default)]
pub struct DtDocument {
	/// Top-level nodes in source order. Root blocks parse to a node with an
	/// empty name; reference modifications keep their `&label` spelling.
	pub roots: Vec<DtNode>,
	/// Preprocessor directives seen anywhere in the source.
	pub conditionals: Vec<DtConditional>,
	pub errors: Vec<ParseError>,
}

impl DtDocument {
	/// Parse `src` into a (possibly partial) document.
	///
	/// # Errors
	///
	/// Only lexical errors are fatal; parse errors accumulate in
	/// [`DtDocument::errors`].
	pub fn parse(src: &str) -> Result<Self, LexError> {
		let tokens = tokenize(src)?;
		Ok(Parser::new(src, tokens).run())
	}

	/// Every node across all roots, pre-order.
	pub fn walk(&self) -> impl Iterator<Item = &DtNode> {
		self.roots.iter().flat_map(DtNode::walk)
	}
}

struct Parser<'src> {
	src: &'src str,
	tokens: Vec<Token<'src>>,
	pos: usize,
	errors: Vec<ParseError>,
	conditionals: Vec<DtConditional>,
	pending_comments: Vec<DtComment>,
}

impl<'src> Parser<'src> {
	fn new(src: &'src str, tokens: Vec<Token<'src>>) -> Self {
		Self {
			src,
			tokens,
			pos: 0,
			errors: Vec::new(),
			conditionals: Vec::new(),
			pending_comments: Vec::new(),
		}
	}

	fn run(mut self) -> DtDocument {
		let mut roots = Vec::new();

		while !self.at_end() {
			self.consume_trivia();
			if self.at_end() {
				break;
			}

			if self.check(TokenKind::Slash) && self.check_at(1, TokenKind::LBrace) {
				let (line, column) = self.position();
				self.advance();
				self.advance();
				let mut root = DtNode::new("", line, column);
				root.comments = std::mem::take(&mut self.pending_comments);
				self.parse_node_body(&mut root);
				self.expect(TokenKind::RBrace);
				self.expect(TokenKind::Semicolon);
				roots.push(root);
			} else if self.check(TokenKind::Reference) && self.check_at(1, TokenKind::LBrace) {
				let tok = self.current().cloned().expect("checked reference");
				self.advance();
				self.advance();
				let mut node = DtNode::new(tok.raw, tok.line, tok.column);
				node.label = Some(tok.text.into_owned());
				node.comments = std::mem::take(&mut self.pending_comments);
				self.parse_node_body(&mut node);
				self.expect(TokenKind::RBrace);
				self.expect(TokenKind::Semicolon);
				roots.push(node);
			} else if self.check(TokenKind::Ident) {
				match self.parse_child_node() {
					Some(node) => roots.push(node),
					None => self.synchronize(),
				}
			} else {
				let found = self.describe_current();
				self.error(format!("expected node definition, got {found}"));
				self.synchronize();
			}
		}

		DtDocument { roots, conditionals: self.conditionals, errors: self.errors }
	}

	fn parse_node_body(&mut self, node: &mut DtNode) {
		while !self.check(TokenKind::RBrace) && !self.at_end() {
			if self.consume_trivia() {
				continue;
			}
			if self.check(TokenKind::RBrace) || self.at_end() {
				break;
			}

			if self.is_property() {
				match self.parse_property() {
					Some(prop) => node.add_property(prop),
					None => self.synchronize(),
				}
			} else {
				match self.parse_child_node() {
					Some(child) => node.add_child(child),
					None => self.synchronize(),
				}
			}
		}

		// Trailing comments belong to the enclosing node.
		node.comments.append(&mut self.pending_comments);
	}

	/// An identifier followed by `=` or `;` starts a property.
	fn is_property(&self) -> bool {
		self.check(TokenKind::Ident)
			&& matches!(
				self.tokens.get(self.pos + 1).map(|t| t.kind),
				Some(TokenKind::Equals | TokenKind::Semicolon)
			)
	}

	fn parse_property(&mut self) -> Option<DtProperty> {
		let tok = self.current()?.clone();
		let name = tok.raw.to_string();
		let comments = std::mem::take(&mut self.pending_comments);
		self.advance();

		if self.check(TokenKind::Semicolon) {
			self.advance();
			let mut prop =
				DtProperty::new(name, Some(DtValue::boolean(true)), tok.line, tok.column);
			prop.comments = comments;
			return Some(prop);
		}

		if self.check(TokenKind::Equals) {
			self.advance();
			let mut values = vec![self.parse_property_value()];
			while self.check(TokenKind::Comma) {
				self.advance();
				values.push(self.parse_property_value());
			}
			let value = if values.len() == 1 {
				values.pop().expect("one value")
			} else {
				combine_values(values)
			};
			self.expect(TokenKind::Semicolon);
			let mut prop = DtProperty::new(name, Some(value), tok.line, tok.column);
			prop.comments = comments;
			return Some(prop);
		}

		self.error("expected '=' or ';' after property name".to_string());
		None
	}

	fn parse_property_value(&mut self) -> DtValue {
		let Some(tok) = self.current().cloned() else {
			self.error("expected property value".to_string());
			return DtValue::string("", "");
		};

		match tok.kind {
			TokenKind::Str => {
				self.advance();
				DtValue::string(tok.text, tok.raw)
			}
			TokenKind::Number => {
				self.advance();
				match parse_number(tok.raw) {
					Some(value) => DtValue::integer(value, tok.raw),
					None => {
						self.error(format!("invalid number: {}", tok.raw));
						DtValue::string(tok.raw, tok.raw)
					}
				}
			}
			TokenKind::Reference => {
				self.advance();
				DtValue::reference(tok.text, tok.raw)
			}
			TokenKind::AngleOpen => self.parse_array_value(),
			TokenKind::Ident => {
				self.advance();
				DtValue::string(tok.raw, tok.raw)
			}
			_ => {
				self.error(format!("expected property value, got {}", tok.kind.describe()));
				DtValue::string("", "")
			}
		}
	}

	fn parse_array_value(&mut self) -> DtValue {
		let start = self.current().map(|t| t.offset).unwrap_or_default();
		self.advance(); // <

		let mut elems = Vec::new();
		let mut end = start;

		while !self.check(TokenKind::AngleClose) && !self.at_end() {
			let tok = self.current().cloned().expect("not at end");
			end = tok.offset + tok.raw.len();
			match tok.kind {
				TokenKind::Number => {
					self.advance();
					match parse_number(tok.raw) {
						Some(value) => elems.push(DtArrayElem::Int(value)),
						None => elems.push(DtArrayElem::Token(tok.raw.to_string())),
					}
				}
				TokenKind::Reference => {
					self.advance();
					elems.push(DtArrayElem::Token(tok.raw.to_string()));
				}
				TokenKind::Ident => {
					self.advance();
					if self.check(TokenKind::LParen) {
						let call = self.parse_call(tok.raw);
						elems.push(DtArrayElem::Token(call));
					} else {
						elems.push(DtArrayElem::Token(tok.raw.to_string()));
					}
				}
				TokenKind::Str => {
					self.advance();
					elems.push(DtArrayElem::Str(tok.text.into_owned()));
				}
				TokenKind::Comma | TokenKind::Comment | TokenKind::Preprocessor => {
					self.advance();
				}
				_ => {
					// Tolerate stray punctuation inside arrays.
					self.advance();
					elems.push(DtArrayElem::Token(tok.raw.to_string()));
				}
			}
		}

		if self.check(TokenKind::AngleClose) {
			let tok = self.current().expect("checked close");
			end = tok.offset + tok.raw.len();
			self.advance();
		} else {
			self.error("expected '>' to close array value".to_string());
		}

		let raw = self.src.get(start..end).unwrap_or_default().to_string();
		DtValue::array(elems, raw)
	}

	/// Reassemble `IDENT ( … )` into one atomic token, recursing into nested
	/// calls so `LA(LC(LSHFT))` survives as a single array element.
	fn parse_call(&mut self, name: &str) -> String {
		self.advance(); // (
		let mut inner: Vec<String> = Vec::new();

		loop {
			let Some(tok) = self.current().cloned() else {
				self.error(format!("unterminated call '{name}('"));
				break;
			};
			match tok.kind {
				TokenKind::RParen => {
					self.advance();
					break;
				}
				TokenKind::Ident => {
					self.advance();
					if self.check(TokenKind::LParen) {
						let nested = self.parse_call(tok.raw);
						inner.push(nested);
					} else {
						inner.push(tok.raw.to_string());
					}
				}
				TokenKind::Comma => {
					self.advance();
					inner.push(",".to_string());
				}
				_ => {
					self.advance();
					inner.push(tok.raw.to_string());
				}
			}
		}

		format!("{name}({})", inner.join(" ").replace(" ,", ","))
	}

	fn parse_child_node(&mut self) -> Option<DtNode> {
		let first = self.current()?.clone();
		if first.kind != TokenKind::Ident {
			self.error("expected node name".to_string());
			return None;
		}
		let leading_comments = std::mem::take(&mut self.pending_comments);
		self.advance();

		let mut label = None;
		let name;
		if self.check(TokenKind::Colon) {
			self.advance();
			label = Some(first.raw.to_string());
			if self.check(TokenKind::Ident) {
				name = self.current().expect("checked ident").raw.to_string();
				self.advance();
			} else {
				self.error("expected node name after label".to_string());
				return None;
			}
		} else {
			name = first.raw.to_string();
		}

		let mut unit_address = None;
		if self.check(TokenKind::At) {
			self.advance();
			if self.check(TokenKind::Ident) || self.check(TokenKind::Number) {
				unit_address = Some(self.current().expect("checked address").raw.to_string());
				self.advance();
			} else {
				self.error("expected unit address after '@'".to_string());
			}
		}

		if !self.check(TokenKind::LBrace) {
			self.error(format!("expected '{{' after node name '{name}'"));
			return None;
		}
		self.advance();

		let mut node = DtNode::new(name, first.line, first.column);
		node.label = label;
		node.unit_address = unit_address;
		node.comments = leading_comments;
		self.parse_node_body(&mut node);
		self.expect(TokenKind::RBrace);
		self.expect(TokenKind::Semicolon);
		Some(node)
	}

	/// Consume comments and preprocessor directives, returning whether any
	/// were consumed. Comments queue up for attachment to the next item;
	/// directives are collected on the document.
	fn consume_trivia(&mut self) -> bool {
		let mut consumed = false;
		while let Some(tok) = self.current() {
			match tok.kind {
				TokenKind::Comment => {
					self.pending_comments.push(DtComment {
						text: tok.raw.to_string(),
						is_block: tok.raw.starts_with("/*"),
						line: tok.line,
						column: tok.column,
					});
					consumed = true;
					self.advance();
				}
				TokenKind::Preprocessor => {
					let text = tok.raw.trim_start();
					let body = text.trim_start_matches('#');
					let (directive, condition) = match body.split_once(char::is_whitespace) {
						Some((d, rest)) => (d.to_string(), rest.trim().to_string()),
						None => (body.to_string(), String::new()),
					};
					self.conditionals.push(DtConditional { directive, condition, line: tok.line });
					consumed = true;
					self.advance();
				}
				_ => break,
			}
		}
		consumed
	}

	fn current(&self) -> Option<&Token<'src>> {
		self.tokens.get(self.pos).filter(|t| t.kind != TokenKind::Eof)
	}

	fn check(&self, kind: TokenKind) -> bool {
		self.current().is_some_and(|t| t.kind == kind)
	}

	fn check_at(&self, n: usize, kind: TokenKind) -> bool {
		self.tokens.get(self.pos + n).is_some_and(|t| t.kind == kind)
	}

	fn at_end(&self) -> bool {
		self.current().is_none()
	}

	fn advance(&mut self) {
		if self.pos < self.tokens.len() {
			self.pos += 1;
		}
	}

	fn expect(&mut self, kind: TokenKind) {
		if self.check(kind) {
			self.advance();
		} else {
			let found = self.describe_current();
			self.error(format!("expected {}, got {found}", kind.describe()));
		}
	}

	fn describe_current(&self) -> String {
		match self.current() {
			Some(tok) => format!("{} '{}'", tok.kind.describe(), tok.raw),
			None => "end of input".to_string(),
		}
	}

	fn position(&self) -> (u32, u32) {
		self.current().map(|t| (t.line, t.column)).unwrap_or_else(|| {
			self.tokens.last().map(|t| (t.line, t.column)).unwrap_or((0, 0))
		})
	}

	fn error(&mut self, message: String) {
		let (line, column) = self.position();
		let context = self.context_window(3);
		self.errors.push(ParseError { message, line, column, context });
	}

	fn context_window(&self, window: usize) -> String {
		let start = self.pos.saturating_sub(window);
		let end = (self.pos + window + 1).min(self.tokens.len());
		self.tokens[start..end]
			.iter()
			.enumerate()
			.map(|(i, tok)| {
				if start + i == self.pos {
					format!(">>> {} <<<", tok.raw)
				} else {
					tok.raw.to_string()
				}
			})
			.collect::<Vec<_>>()
			.join(" ")
	}

	/// Advance past the next `;` or `}` so parsing can continue after an
	/// error.
	fn synchronize(&mut self) {
		while let Some(tok) = self.current() {
			let stop = matches!(tok.kind, TokenKind::Semicolon | TokenKind::RBrace);
			self.advance();
			if stop {
				return;
			}
		}
	}
}

fn parse_number(raw: &str) -> Option<i64> {
	if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
		i64::from_str_radix(hex, 16).ok()
	} else {
		raw.parse().ok()
	}
}

/// Fold multiple comma-separated property values into one array value.
fn combine_values(values: Vec<DtValue>) -> DtValue {
	let raw = values.iter().map(|v| v.raw.clone()).collect::<Vec<_>>().join(", ");
	let mut elems = Vec::new();
	for value in values {
		match value.kind {
			crate::ast::DtValueKind::Str(s) => elems.push(DtArrayElem::Str(s)),
			crate::ast::DtValueKind::Int(v) => elems.push(DtArrayElem::Int(v)),
			crate::ast::DtValueKind::Bool(b) => elems.push(DtArrayElem::Token(b.to_string())),
			crate::ast::DtValueKind::Reference(r) => elems.push(DtArrayElem::Token(format!("&{r}"))),
			crate::ast::DtValueKind::Array(inner) => elems.extend(inner),
		}
	}
	DtValue::array(elems, raw)
}
