//! Static model of Python source.
//!
//! - `parser`: tree-sitter parsing into owned module models
//! - `model`: the module, class and function definitions
//! - `index`: package-wide symbol table and name resolution

pub mod index;
pub mod model;
pub mod parser;

pub use index::{is_under, Definition, DefinitionKind, ImportFailure, PackageIndex, Resolved};
pub use model::*;
pub use parser::{normalize_expr, split_top_level, string_literal, PythonParser};
