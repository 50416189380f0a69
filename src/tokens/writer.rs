//! Line-oriented token construction.

use super::{Token, TokenKind};

const INDENT: &str = "    ";

/// Accumulates tokens, tracking the current indentation level.
#[derive(Debug, Default)]
pub struct TokenWriter {
    tokens: Vec<Token>,
    indent: usize,
}

impl TokenWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_tokens(self) -> Vec<Token> {
        self.tokens
    }

    pub fn indent(&mut self) {
        self.indent += 1;
    }

    pub fn dedent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    pub fn indent_level(&self) -> usize {
        self.indent
    }

    /// Start a line: indentation, then the line marker when an ID is given.
    pub fn begin_line(&mut self, id: Option<&str>, cross_language_id: Option<&str>) {
        if self.indent > 0 {
            self.push(TokenKind::Whitespace, INDENT.repeat(self.indent));
        }
        if let Some(id) = id {
            self.marker(id, cross_language_id);
        }
    }

    /// A line-id marker; it has no visible text.
    pub fn marker(&mut self, id: &str, cross_language_id: Option<&str>) {
        let mut token = Token::new(TokenKind::LineIdMarker, "");
        token.definition_id = Some(id.to_string());
        token.cross_language_id = cross_language_id.map(str::to_string);
        self.tokens.push(token);
    }

    pub fn newline(&mut self) {
        self.push(TokenKind::Newline, "");
    }

    pub fn push(&mut self, kind: TokenKind, value: impl Into<String>) {
        self.tokens.push(Token::new(kind, value));
    }

    pub fn keyword(&mut self, value: &str) {
        self.push(TokenKind::Keyword, value);
    }

    pub fn punct(&mut self, value: &str) {
        self.push(TokenKind::Punctuation, value);
    }

    pub fn space(&mut self) {
        self.push(TokenKind::Whitespace, " ");
    }

    pub fn text(&mut self, value: &str) {
        self.push(TokenKind::Text, value);
    }

    pub fn member(&mut self, value: &str) {
        self.push(TokenKind::MemberName, value);
    }

    pub fn comment(&mut self, value: &str) {
        self.push(TokenKind::Comment, value);
    }

    /// A literal value; double-quoted text becomes a string literal.
    pub fn value(&mut self, value: &str) {
        if is_string_literal(value) {
            self.push(TokenKind::StringLiteral, value);
        } else {
            self.push(TokenKind::Literal, value);
        }
    }

    pub fn type_name(&mut self, value: &str, navigate_to: Option<&str>) {
        let mut token = Token::new(TokenKind::TypeName, value);
        token.navigate_to_id = navigate_to.map(str::to_string);
        self.tokens.push(token);
    }

    /// A trailing comment excluded from diffs.
    pub fn skip_diff_comment(&mut self, value: &str) {
        self.push(TokenKind::SkipDiffRangeStart, "");
        self.comment(value);
        self.push(TokenKind::SkipDiffRangeEnd, "");
    }
}

/// `"x"`, `'x'`, `b"x"`, `r'x'` and the like.
fn is_string_literal(value: &str) -> bool {
    let body = value.trim_start_matches(['r', 'R', 'u', 'U', 'b', 'B', 'f', 'F']);
    let quote = match body.chars().next() {
        Some(q @ ('"' | '\'')) => q,
        _ => return false,
    };
    body.len() >= 2 && body.ends_with(quote)
}
