//! Devicetree tooling for ZMK keymap sources.
//!
//! This crate lexes and parses the Devicetree subset used by ZMK `.keymap`
//! files into an annotated AST that keeps everything downstream import and
//! round-trip machinery needs: comments, preprocessor directives, raw
//! property text, and source positions.
//!
//! The pipeline is `source → [`Lexer`] → [`parser::DtDocument`] → walkers`:
//!
//! ```
//! use keyweave_dts::DtDocument;
//!
//! let doc = DtDocument::parse("/ { keymap { layer_base { bindings = <&kp Q>; }; }; };")?;
//! assert!(doc.errors.is_empty());
//! let keymap = doc.roots[0].find_node_by_path("/keymap").unwrap();
//! assert_eq!(keymap.children.len(), 1);
//! # Ok::<(), keyweave_dts::LexError>(())
//! ```

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;
pub mod walker;

pub use ast::{DtArrayElem, DtComment, DtConditional, DtNode, DtProperty, DtValue, DtValueKind};
pub use lexer::{LexError, Lexer, tokenize};
pub use parser::{DtDocument, ParseError};
pub use token::{Token, TokenKind};
pub use walker::{DtMultiWalker, DtWalker};
