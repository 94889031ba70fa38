//! logos-based tokenizer for the prop mini-language.
//!
//! Token priority in logos is determined by:
//! 1. Longest match wins (`"a b"` as [`PropToken::Quoted`] beats the
//!    unterminated prefix)
//! 2. For equal length matches, earlier-defined variants win
//!
//! Whitespace is skipped, so adjacency (`key=value` vs `key = value`) is
//! checked by the parser from the spans.

use logos::Logos;

/// Token of a props string such as `flat color=primary label="Say \"hi\""`.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r\f]+")]
pub enum PropToken {
    /// Double-quoted string literal with backslash escapes.
    #[regex(r#""([^"\\]|\\.)*""#)]
    Quoted,

    /// A double quote that never closes.
    #[regex(r#""([^"\\]|\\.)*"#)]
    Unterminated,

    /// Bare word: prop names and unquoted values.
    #[regex(r"[\w\-.%:/]+")]
    Word,

    /// `=`
    #[token("=")]
    Eq,
}

/// A token with the byte span it was lexed from.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    /// The token kind, or `None` if the lexer could not match anything.
    pub token: Option<PropToken>,
    /// Source text of the token.
    pub text: String,
    /// Byte offset where this token starts in the source.
    pub start: usize,
    /// Byte offset where this token ends in the source.
    pub end: usize,
}

/// Tokenize a props string, keeping spans and lexer errors.
///
/// Unlike a plain token stream, failures are preserved as `token: None` so the
/// parser can report the offending text.
pub fn tokenize(input: &str) -> Vec<Spanned> {
    PropToken::lexer(input)
        .spanned()
        .map(|(result, span)| Spanned {
            token: result.ok(),
            text: input[span.clone()].to_string(),
            start: span.start,
            end: span.end,
        })
        .collect()
}
