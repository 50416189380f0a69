//! Owned model of a parsed Python module.
//!
//! The tree-sitter tree is dropped once a module has been extracted; all later
//! phases work on these plain values.

use std::path::PathBuf;

/// A line range inside a source file (1-indexed, inclusive).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceSpan {
    pub file: PathBuf,
    pub start_line: usize,
    pub end_line: usize,
}

impl SourceSpan {
    pub fn from_node(file: &std::path::Path, node: tree_sitter::Node) -> Self {
        Self {
            file: file.to_path_buf(),
            start_line: node.start_position().row + 1,
            end_line: node.end_position().row + 1,
        }
    }

    pub fn contains(&self, file: &std::path::Path, line: usize) -> bool {
        self.file == file && self.start_line <= line && line <= self.end_line
    }

    pub fn len(&self) -> usize {
        self.end_line - self.start_line
    }

    pub fn is_empty(&self) -> bool {
        self.start_line == self.end_line
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ParamKind {
    PositionalOnly,
    PositionalOrKeyword,
    VarPositional,
    KeywordOnly,
    VarKeyword,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    pub annotation: Option<String>,
    pub default: Option<Expr>,
}

/// A decorator as written in source, without the leading `@`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decorator {
    pub text: String,
    /// Dotted name of the decorator, or of the callee when it is a call.
    pub name: Option<String>,
    /// True when the decorator is a bare (dotted) identifier.
    pub is_simple: bool,
    pub has_error: bool,
}

impl Decorator {
    /// Last segment of the decorator name (`functools.wraps` -> `wraps`).
    pub fn short_name(&self) -> Option<&str> {
        self.name.as_deref().map(|n| n.rsplit('.').next().unwrap_or(n))
    }

    pub fn is(&self, short: &str) -> bool {
        self.short_name() == Some(short)
    }
}

/// Python-2 style signature comment: `# type: (int, str) -> bool`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeComment {
    pub args: Vec<String>,
    pub returns: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Docstring {
    pub text: String,
    /// Line of the first non-blank docstring line.
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDef {
    pub name: String,
    pub is_async: bool,
    pub decorators: Vec<Decorator>,
    pub params: Vec<Param>,
    pub returns: Option<String>,
    pub type_comment: Option<TypeComment>,
    pub docstring: Option<Docstring>,
    pub span: SourceSpan,
    /// The definition's parse subtree contains syntax errors.
    pub has_error: bool,
}

impl FunctionDef {
    pub fn has_decorator(&self, short: &str) -> bool {
        self.decorators.iter().any(|d| d.is(short))
    }

    pub fn is_overload(&self) -> bool {
        self.has_decorator("overload")
    }

    pub fn is_property(&self) -> bool {
        self.has_decorator("property") || self.has_decorator("cached_property")
    }

    /// `@<name>.setter` for the given property name.
    pub fn is_setter_of(&self, property: &str) -> bool {
        self.decorators
            .iter()
            .any(|d| d.name.as_deref() == Some(&format!("{}.setter", property)))
    }

    pub fn is_accessor(&self) -> bool {
        self.decorators.iter().any(|d| {
            d.name
                .as_deref()
                .map(|n| n.ends_with(".setter") || n.ends_with(".deleter"))
                .unwrap_or(false)
        })
    }
}

/// A parsed expression: its normalized text plus a coarse classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    pub text: String,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprKind {
    /// A string literal; holds the unquoted content.
    Str(String),
    Number,
    Bool,
    None,
    Ellipsis,
    Collection,
    /// A (dotted) name, e.g. the right side of `Public = _Private`.
    Name(String),
    Other,
}

impl Expr {
    pub fn is_constant(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Str(_) | ExprKind::Number | ExprKind::Bool
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub name: String,
    pub annotation: Option<String>,
    pub value: Option<Expr>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDef {
    pub name: String,
    pub bases: Vec<String>,
    pub keywords: Vec<(String, String)>,
    pub decorators: Vec<Decorator>,
    pub docstring: Option<Docstring>,
    pub functions: Vec<FunctionDef>,
    pub assignments: Vec<Assignment>,
    pub classes: Vec<ClassDef>,
    pub span: SourceSpan,
}

impl ClassDef {
    pub fn metaclass(&self) -> Option<&str> {
        self.keywords
            .iter()
            .find(|(k, _)| k == "metaclass")
            .map(|(_, v)| v.as_str())
    }
}

/// What an import statement binds a local name to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportTarget {
    /// `import a.b` / `import a.b as c`.
    Module(String),
    /// `from a import b`.
    Member { module: String, name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    pub local: String,
    pub target: ImportTarget,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModuleSource {
    pub name: String,
    pub path: PathBuf,
    pub is_package: bool,
    pub docstring: Option<Docstring>,
    /// The declared export list, when the module has a literal `__all__`.
    pub all: Option<Vec<String>>,
    pub classes: Vec<ClassDef>,
    pub functions: Vec<FunctionDef>,
    pub assignments: Vec<Assignment>,
    pub imports: Vec<ImportBinding>,
    /// Modules pulled in with `from x import *`.
    pub wildcard_imports: Vec<String>,
    /// First line containing a syntax error, if any.
    pub syntax_error: Option<usize>,
}

impl ModuleSource {
    pub fn class(&self, name: &str) -> Option<&ClassDef> {
        self.classes.iter().rev().find(|c| c.name == name)
    }

    /// All top-level definitions of a function name, in source order.
    pub fn functions_named(&self, name: &str) -> Vec<&FunctionDef> {
        self.functions.iter().filter(|f| f.name == name).collect()
    }

    pub fn assignment(&self, name: &str) -> Option<&Assignment> {
        self.assignments.iter().rev().find(|a| a.name == name)
    }

    pub fn import(&self, name: &str) -> Option<&ImportBinding> {
        self.imports.iter().rev().find(|i| i.local == name)
    }

    /// Every name bound at module level, in first-seen order.
    pub fn bound_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let mut push = |n: &str| {
            if !names.iter().any(|x| x == n) {
                names.push(n.to_string());
            }
        };
        for c in &self.classes {
            push(&c.name);
        }
        for f in &self.functions {
            push(&f.name);
        }
        for a in &self.assignments {
            push(&a.name);
        }
        for i in &self.imports {
            push(&i.local);
        }
        names
    }
}
