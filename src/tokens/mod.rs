//! The APIView token stream.
//!
//! - `writer`: line-oriented token construction
//! - `types`: tokenizing type expressions into navigable names
//! - `emitter`: walks the node graph and renders every line
//! - `navigation`: the navigator tree

mod emitter;
mod navigation;
mod types;
mod writer;

use serde::{Serialize, Serializer};

pub use emitter::{Emitter, GLOBAL_ID};
pub use navigation::{build_navigation, NavigationItem, NavigationTags};
pub use types::write_type;
pub use writer::TokenWriter;

/// Token kinds, serialized by their integer value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Text = 0,
    Newline = 1,
    Whitespace = 2,
    Punctuation = 3,
    Keyword = 4,
    LineIdMarker = 5,
    TypeName = 6,
    MemberName = 7,
    StringLiteral = 8,
    Literal = 9,
    Comment = 10,
    DocumentRangeStart = 11,
    DocumentRangeEnd = 12,
    DeprecatedRangeStart = 13,
    DeprecatedRangeEnd = 14,
    SkipDiffRangeStart = 15,
    SkipDiffRangeEnd = 16,
}

impl Serialize for TokenKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl TokenKind {
    /// Kinds that delimit ranges and have no visible text.
    pub fn is_range(&self) -> bool {
        matches!(
            self,
            TokenKind::DocumentRangeStart
                | TokenKind::DocumentRangeEnd
                | TokenKind::DeprecatedRangeStart
                | TokenKind::DeprecatedRangeEnd
                | TokenKind::SkipDiffRangeStart
                | TokenKind::SkipDiffRangeEnd
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    #[serde(rename = "Kind")]
    pub kind: TokenKind,
    #[serde(rename = "Value")]
    pub value: String,
    #[serde(rename = "DefinitionId", skip_serializing_if = "Option::is_none")]
    pub definition_id: Option<String>,
    #[serde(rename = "NavigateToId", skip_serializing_if = "Option::is_none")]
    pub navigate_to_id: Option<String>,
    #[serde(rename = "CrossLanguageDefinitionId", skip_serializing_if = "Option::is_none")]
    pub cross_language_id: Option<String>,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
            definition_id: None,
            navigate_to_id: None,
            cross_language_id: None,
        }
    }
}

/// Render tokens as plain text lines, the way a reviewer would read them.
pub fn render_lines(tokens: &[Token]) -> Vec<String> {
    let mut lines = vec![String::new()];
    for token in tokens {
        match token.kind {
            TokenKind::Newline => lines.push(String::new()),
            TokenKind::LineIdMarker => {}
            kind if kind.is_range() => {}
            _ => {
                if let Some(line) = lines.last_mut() {
                    line.push_str(&token.value);
                }
            }
        }
    }
    if lines.last().map(|l| l.is_empty()).unwrap_or(false) {
        lines.pop();
    }
    lines
}

/// Definition IDs of every line-id marker, in document order.
pub fn line_ids(tokens: &[Token]) -> Vec<&str> {
    tokens
        .iter()
        .filter(|t| t.kind == TokenKind::LineIdMarker)
        .filter_map(|t| t.definition_id.as_deref())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_serialization_omits_empty_ids() {
        let token = Token::new(TokenKind::Keyword, "def");
        assert_eq!(serde_json::to_string(&token).unwrap(), r#"{"Kind":4,"Value":"def"}"#);

        let mut marker = Token::new(TokenKind::LineIdMarker, "");
        marker.definition_id = Some("pkg.Foo".into());
        assert_eq!(
            serde_json::to_string(&marker).unwrap(),
            r#"{"Kind":5,"Value":"","DefinitionId":"pkg.Foo"}"#
        );
    }

    #[test]
    fn test_render_lines_skips_markers_and_ranges() {
        let mut marker = Token::new(TokenKind::LineIdMarker, "");
        marker.definition_id = Some("x".into());
        let tokens = vec![
            Token::new(TokenKind::SkipDiffRangeStart, ""),
            marker,
            Token::new(TokenKind::Keyword, "class"),
            Token::new(TokenKind::Whitespace, " "),
            Token::new(TokenKind::TypeName, "Foo"),
            Token::new(TokenKind::Newline, ""),
            Token::new(TokenKind::SkipDiffRangeEnd, ""),
        ];
        assert_eq!(render_lines(&tokens), vec!["class Foo"]);
        assert_eq!(line_ids(&tokens), vec!["x"]);
    }
}
