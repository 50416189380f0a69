//! The API node graph.
//!
//! Nodes are plain tagged variants owned by their parent: a module owns its
//! classes, functions and constants; a class owns its members. Everything else
//! (navigation, diagnostics, type links) refers to nodes by namespace ID.

mod builder;
mod class;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

pub use builder::GraphBuilder;
pub use class::{capabilities_of, ClassKind, ABC_TABLE};

use crate::diagnostics::Finding;
use crate::python::{Decorator, Docstring, SourceSpan};
use crate::signature::Signature;

/// Suffix appended to the IDs of coroutine functions.
pub const ASYNC_SUFFIX: &str = ":async";

/// ID of a function argument.
pub fn param_id(function_id: &str, name: &str) -> String {
    format!("{}.param({})", function_id, name)
}

/// ID of the closing line of a multi-line signature.
pub fn return_type_id(function_id: &str) -> String {
    format!("{}.returntype", function_id)
}

/// True for `__name__` style names.
pub fn is_dunder(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

#[derive(Debug, Clone)]
pub struct FunctionNode {
    pub name: String,
    pub id: String,
    /// Qualified name of the defining module and name.
    pub origin: String,
    /// Module the function was defined in; type names resolve against it.
    pub scope: String,
    pub signature: Signature,
    pub is_method: bool,
    pub docstring: Option<Docstring>,
    pub span: SourceSpan,
    pub errors: Vec<Finding>,
    /// For a numbered overload, the ID of its implementation.
    pub overload_of: Option<String>,
}

impl FunctionNode {
    pub fn is_hidden(&self) -> bool {
        self.signature.hidden
    }
}

#[derive(Debug, Clone)]
pub struct ClassNode {
    pub name: String,
    pub id: String,
    pub origin: String,
    pub scope: String,
    pub kind: ClassKind,
    pub bases: Vec<String>,
    /// Abstract capabilities whose methods were absorbed.
    pub implements: Vec<&'static str>,
    pub decorators: Vec<Decorator>,
    pub children: Vec<Node>,
    pub docstring: Option<Docstring>,
    pub span: SourceSpan,
    pub errors: Vec<Finding>,
}

#[derive(Debug, Clone)]
pub struct PropertyNode {
    pub name: String,
    pub id: String,
    pub type_name: Option<String>,
    pub read_only: bool,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Module,
    Class,
    Instance,
}

#[derive(Debug, Clone)]
pub struct VariableNode {
    pub name: String,
    pub id: String,
    pub kind: VariableKind,
    pub type_name: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EnumMemberNode {
    pub name: String,
    pub id: String,
    /// Rendered value, quoted when it is a string.
    pub value: String,
}

/// A TypedDict key.
#[derive(Debug, Clone)]
pub struct KeyNode {
    pub name: String,
    pub id: String,
    pub type_name: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Node {
    Class(ClassNode),
    Function(FunctionNode),
    Property(PropertyNode),
    Variable(VariableNode),
    EnumMember(EnumMemberNode),
    Key(KeyNode),
}

impl Node {
    pub fn id(&self) -> &str {
        match self {
            Node::Class(n) => &n.id,
            Node::Function(n) => &n.id,
            Node::Property(n) => &n.id,
            Node::Variable(n) => &n.id,
            Node::EnumMember(n) => &n.id,
            Node::Key(n) => &n.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Node::Class(n) => &n.name,
            Node::Function(n) => &n.name,
            Node::Property(n) => &n.name,
            Node::Variable(n) => &n.name,
            Node::EnumMember(n) => &n.name,
            Node::Key(n) => &n.name,
        }
    }

    /// Findings recorded while the node was built.
    pub fn errors(&self) -> &[Finding] {
        match self {
            Node::Class(n) => &n.errors,
            Node::Function(n) => &n.errors,
            _ => &[],
        }
    }

    pub fn span(&self) -> Option<&SourceSpan> {
        match self {
            Node::Class(n) => Some(&n.span),
            Node::Function(n) => Some(&n.span),
            Node::Property(n) => Some(&n.span),
            _ => None,
        }
    }

    pub fn children(&self) -> &[Node] {
        match self {
            Node::Class(n) => &n.children,
            _ => &[],
        }
    }

    /// Hidden nodes are not rendered and cannot be diagnosed.
    pub fn is_hidden(&self) -> bool {
        matches!(self, Node::Function(f) if f.is_hidden())
    }
}

#[derive(Debug, Clone)]
pub struct ModuleNode {
    pub name: String,
    pub path: std::path::PathBuf,
    pub docstring: Option<Docstring>,
    /// Variables, then functions, then classes; each alphabetical.
    pub children: Vec<Node>,
}

impl ModuleNode {
    pub fn id(&self) -> &str {
        &self.name
    }
}

/// Visit every visible node depth-first, parents before children.
pub fn walk<'a>(nodes: &'a [Node], visit: &mut dyn FnMut(&'a Node)) {
    for node in nodes {
        if node.is_hidden() {
            continue;
        }
        visit(node);
        walk(node.children(), visit);
    }
}

/// Lookup tables over a built graph, keyed by namespace ID.
#[derive(Debug, Default)]
pub struct NodeIndex {
    ids: BTreeSet<String>,
    by_origin: BTreeMap<String, String>,
    spans: Vec<(SourceSpan, String)>,
}

impl NodeIndex {
    pub fn build(modules: &[ModuleNode]) -> Self {
        let mut index = Self::default();
        for module in modules {
            index.ids.insert(module.name.clone());
            walk(&module.children, &mut |node| {
                index.ids.insert(node.id().to_string());
                match node {
                    Node::Class(c) => {
                        index.by_origin.entry(c.origin.clone()).or_insert_with(|| c.id.clone());
                    }
                    _ => {}
                }
                if let Some(span) = node.span() {
                    index.spans.push((span.clone(), node.id().to_string()));
                }
            });
        }
        index
    }

    /// Line ID a type reference should link to.
    pub fn navigate_target(&self, qualified: &str) -> Option<&str> {
        match self.by_origin.get(qualified) {
            Some(id) => Some(id),
            None => self.ids.get(qualified).map(String::as_str),
        }
    }

    /// The innermost node whose source span covers a location.
    pub fn claim_source(&self, file: &Path, line: usize) -> Option<&str> {
        self.spans
            .iter()
            .filter(|(span, _)| span.contains(file, line))
            .min_by_key(|(span, _)| span.len())
            .map(|(_, id)| id.as_str())
    }
}
