//! PDF parsing modules.
//!
//! - `lexer`: byte-level tokenizer
//! - `object_parser`: PDF object and indirect object parser

pub mod lexer;
pub mod object_parser;

// Re-export main types for convenience
pub use lexer::{Keyword, Lexer, Token};
pub use object_parser::{IndirectObject, ObjectParser, StreamExtent};
