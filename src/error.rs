//! Error types for stub generation.
//!
//! Everything that makes the output meaningless (bad input, failed install,
//! broken ID invariants) is a `StubError`. Problems the document can still
//! describe become diagnostics instead.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors that abort a generation run.
#[derive(Error, Debug)]
pub enum StubError {
    #[error("package path does not exist: {0}")]
    InvalidPath(PathBuf),
    #[error("{0} is neither a wheel nor a source distribution")]
    UnsupportedArchive(PathBuf),
    #[error("source directory {0} has neither setup.py nor pyproject.toml")]
    MissingBuildFile(PathBuf),
    #[error("failed to extract {path}: {reason}")]
    Extract { path: PathBuf, reason: String },
    #[error("package install failed ({status}): {output}")]
    InstallFailed { status: String, output: String },
    #[error("no python interpreter found on PATH (looked for python3, python)")]
    InterpreterNotFound,
    #[error("cannot determine package metadata: {0}")]
    Metadata(String),
    #[error("cannot locate the package namespace under {0}")]
    NamespaceNotFound(PathBuf),
    #[error("invalid settings: {0}")]
    Config(String),
    #[error("duplicate definition id {0:?}")]
    DuplicateDefinitionId(String),
    #[error("unknown diagnostic code {0:?}")]
    UnknownDiagnosticCode(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StubError>;
