//! Lint checks over the node graph and their attribution to lines.

mod checkers;
mod engine;
mod types;

pub use checkers::{
    builtin_checkers, ArgTypeChecker, CheckContext, Checker, DocstringNameChecker, KwargsChecker, PagingChecker,
    ReturnTypeChecker, SourceLinkChecker,
};
pub use engine::{DiagnosticEngine, DiagnosticReport};
pub use types::{Diagnostic, DiagnosticCode, Finding, Severity, Target};
