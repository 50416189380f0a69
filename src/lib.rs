//! apistub - APIView stub generator for Python packages.
//!
//! Reads a Python package (wheel, sdist, or source tree) statically and
//! renders its public API as the APIView token document used for API review:
//! one line per class, function, property and constant, each anchored by a
//! stable namespace ID, plus lint diagnostics attached to those lines.
//!
//! # Architecture
//!
//! - `package`: acquisition (extraction, metadata, install, mapping files)
//! - `discover`: import root, namespace and module discovery
//! - `python`: tree-sitter parsing and the package-wide symbol table
//! - `docstring`, `signature`: signature resolution from code, type comments
//!   and docstrings
//! - `nodes`: the API node graph
//! - `diagnostics`: checkers and diagnostic attribution
//! - `tokens`: token emission and navigation
//! - `apiview`: the output document
//! - `generator`: the pipeline tying these together

pub mod apiview;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod discover;
pub mod docstring;
pub mod error;
pub mod generator;
pub mod nodes;
pub mod package;
pub mod python;
pub mod report;
pub mod signature;
pub mod tokens;

pub use apiview::ApiView;
pub use config::Settings;
pub use diagnostics::{Diagnostic, DiagnosticCode, DiagnosticReport, Severity};
pub use error::StubError;
pub use generator::{Generated, Generator};
pub use tokens::{Token, TokenKind};
