//! Core types for diagnostics.

use serde::{Deserialize, Serialize, Serializer};
use std::path::PathBuf;

use crate::error::StubError;

/// Severity levels, serialized by their integer value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Default = 0,
    Info = 1,
    Warning = 2,
    Error = 3,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Default => "default",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl Serialize for Severity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default" => Ok(Severity::Default),
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            _ => Err(format!("unknown severity: {}", s)),
        }
    }
}

/// The closed vocabulary of diagnostic codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticCode {
    MissingType,
    MissingSourceLink,
    MissingKwargs,
    NameMismatch,
    DecoratorParse,
    MissingReturnType,
    MissingTypehint,
    ReturnTypeMismatch,
    ListReturnType,
}

impl DiagnosticCode {
    pub const ALL: [DiagnosticCode; 9] = [
        DiagnosticCode::MissingType,
        DiagnosticCode::MissingSourceLink,
        DiagnosticCode::MissingKwargs,
        DiagnosticCode::NameMismatch,
        DiagnosticCode::DecoratorParse,
        DiagnosticCode::MissingReturnType,
        DiagnosticCode::MissingTypehint,
        DiagnosticCode::ReturnTypeMismatch,
        DiagnosticCode::ListReturnType,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCode::MissingType => "missing-type",
            DiagnosticCode::MissingSourceLink => "missing-source-link",
            DiagnosticCode::MissingKwargs => "missing-kwargs",
            DiagnosticCode::NameMismatch => "name-mismatch",
            DiagnosticCode::DecoratorParse => "decorator-parse",
            DiagnosticCode::MissingReturnType => "missing-return-type",
            DiagnosticCode::MissingTypehint => "missing-typehint",
            DiagnosticCode::ReturnTypeMismatch => "return-type-mismatch",
            DiagnosticCode::ListReturnType => "list-return-type",
        }
    }

    /// Parse a code name. Unrecognized names are a hard error.
    pub fn parse(s: &str) -> Result<Self, StubError> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| StubError::UnknownDiagnosticCode(s.to_string()))
    }

    /// Severity used when settings do not override it.
    pub fn default_severity(&self) -> Severity {
        match self {
            DiagnosticCode::ReturnTypeMismatch | DiagnosticCode::ListReturnType => Severity::Error,
            DiagnosticCode::MissingTypehint | DiagnosticCode::DecoratorParse => Severity::Info,
            _ => Severity::Warning,
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DiagnosticCode {
    type Err = StubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Where a finding points before the engine attributes it to a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A node's namespace ID.
    Node(String),
    /// A location in a source file; claimed by the innermost node whose span covers it.
    Source { file: PathBuf, line: usize },
    /// A whole file. Never claimed by a node.
    File(PathBuf),
}

/// A raw finding produced by a checker or recorded on a node while building.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub code: DiagnosticCode,
    pub message: String,
    pub target: Target,
}

impl Finding {
    pub fn node(code: DiagnosticCode, target_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            target: Target::Node(target_id.into()),
        }
    }

    pub fn at_source(code: DiagnosticCode, file: PathBuf, line: usize, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            target: Target::Source { file, line },
        }
    }

    pub fn in_file(code: DiagnosticCode, file: PathBuf, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            target: Target::File(file),
        }
    }
}

/// A diagnostic as it appears in the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    #[serde(rename = "DiagnosticId")]
    pub diagnostic_id: String,
    #[serde(rename = "Text")]
    pub text: String,
    #[serde(rename = "HelpLinkUri", skip_serializing_if = "Option::is_none")]
    pub help_link_uri: Option<String>,
    #[serde(rename = "TargetId")]
    pub target_id: String,
    #[serde(rename = "Level")]
    pub level: Severity,
    #[serde(skip)]
    pub code: DiagnosticCode,
    #[serde(skip)]
    pub serial: u64,
}

impl Diagnostic {
    pub fn is_claimed(&self) -> bool {
        !self.target_id.is_empty()
    }
}
