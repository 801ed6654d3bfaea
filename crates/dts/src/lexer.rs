//! Devicetree lexical analysis.
//!
//! The lexer walks UTF-8 source and yields [`Token`]s lazily. Whitespace is
//! skipped unless the lexer is built with [`Lexer::keep_whitespace`]; comments
//! and preprocessor lines are always emitted as tokens so the parser can
//! attach them to AST nodes.

use std::borrow::Cow;

use thiserror::Error;

use crate::token::{Token, TokenKind};

/// Fatal lexical errors. Each carries the position where lexing stopped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
	#[error("unterminated string literal starting at {line}:{column}")]
	UnterminatedString { offset: usize, line: u32, column: u32 },

	#[error("unterminated block comment starting at {line}:{column}")]
	UnterminatedBlockComment { offset: usize, line: u32, column: u32 },

	#[error("invalid hex literal '{literal}' at {line}:{column}")]
	InvalidHexLiteral {
		literal: String,
		offset: usize,
		line: u32,
		column: u32,
	},
}

/// Preprocessor directive names. Anything else after `#` is an identifier
/// character: `#binding-cells` is a property name, not a directive.
const DIRECTIVES: &[&str] = &[
	"include", "define", "undef", "ifdef", "ifndef", "if", "elif", "else", "endif", "pragma",
	"error", "warning",
];

/// Lazy tokenizer over Devicetree source text.
pub struct Lexer<'src> {
	src: &'src str,
	offset: usize,
	line: u32,
	column: u32,
	keep_whitespace: bool,
	finished: bool,
}

impl<'src> Lexer<'src> {
	pub fn new(src: &'src str) -> Self {
		Self {
			src,
			offset: 0,
			line: 1,
			column: 1,
			keep_whitespace: false,
			finished: false,
		}
	}

	/// Emit [`TokenKind::Whitespace`] tokens instead of skipping whitespace.
	pub fn keep_whitespace(mut self) -> Self {
		self.keep_whitespace = true;
		self
	}

	fn rest(&self) -> &'src str {
		&self.src[self.offset..]
	}

	fn peek(&self) -> Option<char> {
		self.rest().chars().next()
	}

	fn peek_at(&self, n: usize) -> Option<char> {
		self.rest().chars().nth(n)
	}

	fn bump(&mut self) -> Option<char> {
		let ch = self.peek()?;
		self.offset += ch.len_utf8();
		if ch == '\n' {
			self.line += 1;
			self.column = 1;
		} else {
			self.column += 1;
		}
		Some(ch)
	}

	fn bump_while(&mut self, predicate: impl Fn(char) -> bool) {
		while let Some(ch) = self.peek() {
			if !predicate(ch) {
				break;
			}
			self.bump();
		}
	}

	/// Consume an identifier tail. A comma glues only when an identifier
	/// character follows directly, so compound names like
	/// `zmk,matrix_transform` stay one token while list separators do not.
	fn bump_ident(&mut self) {
		while let Some(ch) = self.peek() {
			if is_ident_continue(ch) {
				self.bump();
			} else if ch == ',' && self.peek_at(1).is_some_and(is_ident_start) {
				self.bump();
			} else {
				break;
			}
		}
	}

	fn token(&self, kind: TokenKind, start: Mark<'src>) -> Token<'src> {
		let raw = &self.src[start.offset..self.offset];
		Token {
			kind,
			raw,
			text: Cow::Borrowed(raw),
			offset: start.offset,
			line: start.line,
			column: start.column,
		}
	}

	fn mark(&self) -> Mark<'src> {
		Mark {
			offset: self.offset,
			line: self.line,
			column: self.column,
			_src: std::marker::PhantomData,
		}
	}

	fn next_token(&mut self) -> Result<Token<'src>, LexError> {
		if self.keep_whitespace
			&& let Some(ch) = self.peek()
			&& ch.is_whitespace()
		{
			let start = self.mark();
			self.bump_while(char::is_whitespace);
			return Ok(self.token(TokenKind::Whitespace, start));
		}
		if !self.keep_whitespace {
			self.bump_while(char::is_whitespace);
		}

		let start = self.mark();
		let Some(ch) = self.peek() else {
			return Ok(self.token(TokenKind::Eof, start));
		};

		match ch {
			'/' if self.peek_at(1) == Some('/') => {
				self.bump_while(|c| c != '\n');
				Ok(self.token(TokenKind::Comment, start))
			}
			'/' if self.peek_at(1) == Some('*') => {
				self.bump();
				self.bump();
				loop {
					match self.peek() {
						Some('*') if self.peek_at(1) == Some('/') => {
							self.bump();
							self.bump();
							break;
						}
						Some(_) => {
							self.bump();
						}
						None => {
							return Err(LexError::UnterminatedBlockComment {
								offset: start.offset,
								line: start.line,
								column: start.column,
							});
						}
					}
				}
				Ok(self.token(TokenKind::Comment, start))
			}
			'"' => self.lex_string(start),
			'#' => self.lex_hash(start),
			'&' => {
				self.bump();
				self.bump_ident();
				let mut tok = self.token(TokenKind::Reference, start);
				tok.text = Cow::Borrowed(&tok.raw[1..]);
				Ok(tok)
			}
			c if c.is_ascii_digit() => self.lex_number(start),
			c if is_ident_start(c) => {
				self.bump_ident();
				Ok(self.token(TokenKind::Ident, start))
			}
			_ => {
				self.bump();
				let kind = match ch {
					'{' => TokenKind::LBrace,
					'}' => TokenKind::RBrace,
					'[' => TokenKind::LBracket,
					']' => TokenKind::RBracket,
					'<' => TokenKind::AngleOpen,
					'>' => TokenKind::AngleClose,
					';' => TokenKind::Semicolon,
					':' => TokenKind::Colon,
					',' => TokenKind::Comma,
					'=' => TokenKind::Equals,
					'@' => TokenKind::At,
					'/' => TokenKind::Slash,
					'(' => TokenKind::LParen,
					')' => TokenKind::RParen,
					// Unknown punctuation is surfaced as a one-character
					// identifier; the parser reports it in context.
					_ => TokenKind::Ident,
				};
				Ok(self.token(kind, start))
			}
		}
	}

	fn lex_string(&mut self, start: Mark<'src>) -> Result<Token<'src>, LexError> {
		self.bump();
		let mut cooked = String::new();
		loop {
			match self.bump() {
				Some('"') => break,
				Some('\\') => match self.bump() {
					Some('n') => cooked.push('\n'),
					Some('t') => cooked.push('\t'),
					Some('r') => cooked.push('\r'),
					Some('0') => cooked.push('\0'),
					Some(other) => cooked.push(other),
					None => {
						return Err(LexError::UnterminatedString {
							offset: start.offset,
							line: start.line,
							column: start.column,
						});
					}
				},
				Some(ch) => cooked.push(ch),
				None => {
					return Err(LexError::UnterminatedString {
						offset: start.offset,
						line: start.line,
						column: start.column,
					});
				}
			}
		}
		let mut tok = self.token(TokenKind::Str, start);
		tok.text = Cow::Owned(cooked);
		Ok(tok)
	}

	fn lex_hash(&mut self, start: Mark<'src>) -> Result<Token<'src>, LexError> {
		let after = &self.rest()[1..];
		let word: String = after.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
		let word_is_directive = DIRECTIVES.contains(&word.as_str())
			&& !after[word.len()..].starts_with(|c: char| is_ident_continue(c));
		if word_is_directive {
			self.bump_while(|c| c != '\n');
			Ok(self.token(TokenKind::Preprocessor, start))
		} else {
			self.bump();
			self.bump_ident();
			Ok(self.token(TokenKind::Ident, start))
		}
	}

	fn lex_number(&mut self, start: Mark<'src>) -> Result<Token<'src>, LexError> {
		self.bump_while(|c| c.is_ascii_alphanumeric() || c == '_');
		let raw = &self.src[start.offset..self.offset];
		if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
			if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
				return Err(LexError::InvalidHexLiteral {
					literal: raw.to_string(),
					offset: start.offset,
					line: start.line,
					column: start.column,
				});
			}
			return Ok(self.token(TokenKind::Number, start));
		}
		if raw.chars().all(|c| c.is_ascii_digit()) {
			Ok(self.token(TokenKind::Number, start))
		} else {
			// Unit addresses and macro-ish tokens like `1e0` stay identifiers.
			Ok(self.token(TokenKind::Ident, start))
		}
	}
}

#[derive(Clone, Copy)]
struct Mark<'src> {
	offset: usize,
	line: u32,
	column: u32,
	_src: std::marker::PhantomData<&'src str>,
}

impl<'src> Iterator for Lexer<'src> {
	type Item = Result<Token<'src>, LexError>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.finished {
			return None;
		}
		let tok = self.next_token();
		if matches!(&tok, Ok(t) if t.kind == TokenKind::Eof) || tok.is_err() {
			self.finished = true;
		}
		Some(tok)
	}
}

fn is_ident_start(c: char) -> bool {
	c.is_ascii_alphabetic() || c == '_' || c == '#' || c == '.'
}

fn is_ident_continue(c: char) -> bool {
	c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '+' | '?')
}

/// Tokenize `src` completely, skipping whitespace.
///
/// # Errors
///
/// Returns the first [`LexError`] encountered; tokens before the error are
/// discarded because the parse of this source cannot proceed.
pub fn tokenize(src: &str) -> Result<Vec<Token<'_>>, LexError> {
	Lexer::new(src).collect()
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	fn kinds(src: &str) -> Vec<TokenKind> {
		tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
	}

	#[test]
	fn test_basic_tokens() {
		use TokenKind::*;
		for (src, expected) in [
			("/ { };", vec![Slash, LBrace, RBrace, Semicolon, Eof]),
			("a = <1 0x2f>;", vec![Ident, Equals, AngleOpen, Number, Number, AngleClose, Semicolon, Eof]),
			("&kp Q", vec![Reference, Ident, Eof]),
			("label: node@1f {", vec![Ident, Colon, Ident, At, Ident, LBrace, Eof]),
			("LA(LC(X))", vec![Ident, LParen, Ident, LParen, Ident, RParen, RParen, Eof]),
		] {
			assert_eq!(kinds(src), expected, "source: {src}");
		}
	}

	#[test]
	fn test_string_escapes() {
		let toks = tokenize(r#""a\"b\n""#).unwrap();
		assert_eq!(toks[0].kind, TokenKind::Str);
		assert_eq!(toks[0].text, "a\"b\n");
		assert_eq!(toks[0].raw, r#""a\"b\n""#);
	}

	#[test]
	fn test_comments_and_preprocessor() {
		let toks = tokenize("// line\n/* block */\n#include <dt-bindings/zmk/keys.h>\n").unwrap();
		assert_eq!(toks[0].kind, TokenKind::Comment);
		assert_eq!(toks[0].raw, "// line");
		assert_eq!(toks[1].kind, TokenKind::Comment);
		assert_eq!(toks[1].raw, "/* block */");
		assert_eq!(toks[2].kind, TokenKind::Preprocessor);
		assert!(toks[2].raw.starts_with("#include"));
	}

	#[test]
	fn test_binding_cells_is_identifier() {
		let toks = tokenize("#binding-cells = <1>;").unwrap();
		assert_eq!(toks[0].kind, TokenKind::Ident);
		assert_eq!(toks[0].raw, "#binding-cells");
	}

	#[test]
	fn test_compound_names_keep_their_comma() {
		let toks = tokenize("zmk,matrix_transform = &default_transform;").unwrap();
		assert_eq!(toks[0].kind, TokenKind::Ident);
		assert_eq!(toks[0].raw, "zmk,matrix_transform");

		// Commas before whitespace or strings stay separators.
		let toks = tokenize("compatible = \"a\", \"b\";").unwrap();
		assert_eq!(toks[3].kind, TokenKind::Comma);
	}

	#[test]
	fn test_reference_text_strips_ampersand() {
		let toks = tokenize("&macro_param_1to1").unwrap();
		assert_eq!(toks[0].kind, TokenKind::Reference);
		assert_eq!(toks[0].text, "macro_param_1to1");
	}

	#[test]
	fn test_unterminated_string() {
		let err = tokenize("x = \"oops").unwrap_err();
		assert!(matches!(err, LexError::UnterminatedString { line: 1, .. }));
	}

	#[test]
	fn test_unterminated_block_comment() {
		let err = tokenize("/* never closed").unwrap_err();
		assert!(matches!(err, LexError::UnterminatedBlockComment { .. }));
	}

	#[test]
	fn test_invalid_hex() {
		let err = tokenize("a = <0xzz>;").unwrap_err();
		assert!(matches!(err, LexError::InvalidHexLiteral { .. }));
	}

	#[test]
	fn test_raw_concatenation_reproduces_input() {
		let src = "/ {\n\tkeymap { // c\n\t\tbindings = <&kp Q &hm LCTRL A>;\n\t};\n};\n";
		let mut out = String::new();
		for tok in Lexer::new(src).keep_whitespace() {
			out.push_str(tok.unwrap().raw);
		}
		assert_eq!(out, src);
	}

	#[test]
	fn test_positions_monotonic() {
		let src = "a = <1>;\nb = <2>;\n";
		let toks = tokenize(src).unwrap();
		for pair in toks.windows(2) {
			assert!(pair[0].offset <= pair[1].offset);
		}
		// `b` opens the second line.
		assert_eq!(toks[6].raw, "b");
		assert_eq!(toks[6].line, 2);
	}
}
