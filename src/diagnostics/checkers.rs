//! Built-in checkers.
//!
//! Each checker walks the built graph and returns raw findings; the engine
//! decides severity, attribution and deduplication.

use lazy_static::lazy_static;
use regex::Regex;

use super::{DiagnosticCode, Finding};
use crate::config::Settings;
use crate::docstring;
use crate::nodes::{is_dunder, param_id, walk, ClassNode, FunctionNode, ModuleNode, Node};
use crate::python::{ClassDef, FunctionDef, PackageIndex, ParamKind, Resolved};
use crate::signature::{ArgKind, TypeSource};

lazy_static! {
    static ref QUALIFIED: Regex = Regex::new(r"((?:~?)[\w.]+\.+([\w]+))").unwrap();
    static ref ITEM_PAGED: Regex = Regex::new(r"^(?:~?[\w.]*\.)?(?:Async)?ItemPaged\b").unwrap();
    static ref TILDE_REF: Regex = Regex::new(r"~([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)").unwrap();
}

/// Everything a checker may look at.
pub struct CheckContext<'a> {
    pub modules: &'a [ModuleNode],
    pub index: &'a PackageIndex,
    pub settings: &'a Settings,
}

impl<'a> CheckContext<'a> {
    /// Visit every visible function with the class that owns it.
    pub fn for_each_function(&self, visit: &mut dyn FnMut(Option<&ClassNode>, &FunctionNode)) {
        fn visit_nodes(nodes: &[Node], owner: Option<&ClassNode>, visit: &mut dyn FnMut(Option<&ClassNode>, &FunctionNode)) {
            for node in nodes {
                match node {
                    Node::Function(f) if !f.is_hidden() => visit(owner, f),
                    Node::Class(c) => visit_nodes(&c.children, Some(c), visit),
                    _ => {}
                }
            }
        }
        for module in self.modules {
            visit_nodes(&module.children, None, visit);
        }
    }

    /// Methods exempt from lint: the configured list and dunders other than `__init__`.
    pub fn is_lint_exempt(&self, name: &str) -> bool {
        (is_dunder(name) && name != "__init__") || self.settings.exclusion_methods().iter().any(|m| m == name)
    }
}

/// A pluggable check over the node graph.
pub trait Checker {
    fn name(&self) -> &'static str;

    /// Codes this checker can emit.
    fn codes(&self) -> &'static [DiagnosticCode];

    fn check(&self, ctx: &CheckContext<'_>) -> Vec<Finding>;
}

/// The checkers run by default, in reporting order.
pub fn builtin_checkers() -> Vec<Box<dyn Checker>> {
    vec![
        Box::new(ReturnTypeChecker),
        Box::new(KwargsChecker),
        Box::new(ArgTypeChecker),
        Box::new(PagingChecker),
        Box::new(SourceLinkChecker),
        Box::new(DocstringNameChecker),
    ]
}

/// Drop qualifying prefixes so `~azure.foo.Widget` and `Widget` compare equal.
fn shortened(type_name: &str) -> String {
    let short = QUALIFIED.replace_all(type_name, "$2");
    short
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '"' && *c != '\'')
        .collect()
}

/// Return type presence, provenance and agreement.
pub struct ReturnTypeChecker;

impl Checker for ReturnTypeChecker {
    fn name(&self) -> &'static str {
        "return-type"
    }

    fn codes(&self) -> &'static [DiagnosticCode] {
        &[
            DiagnosticCode::MissingReturnType,
            DiagnosticCode::MissingTypehint,
            DiagnosticCode::ReturnTypeMismatch,
        ]
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        let exempt = ctx.settings.typehint_exempt_methods();
        let mut findings = Vec::new();
        ctx.for_each_function(&mut |_, f| {
            if ctx.is_lint_exempt(&f.name) || exempt.iter().any(|m| m == &f.name) {
                return;
            }
            let sig = &f.signature;
            match sig.return_source {
                None => findings.push(Finding::node(
                    DiagnosticCode::MissingReturnType,
                    &f.id,
                    format!("Function '{}' has no return type.", f.name),
                )),
                Some(TypeSource::Docstring) => findings.push(Finding::node(
                    DiagnosticCode::MissingTypehint,
                    &f.id,
                    format!("Return type of '{}' is only documented in its docstring; add a type hint.", f.name),
                )),
                Some(_) => {}
            }
            if let (Some(hinted), Some(documented)) = (&sig.hinted_return, &sig.documented_return) {
                if shortened(hinted) != shortened(documented) {
                    findings.push(Finding::node(
                        DiagnosticCode::ReturnTypeMismatch,
                        &f.id,
                        format!(
                            "Return type hint '{}' of '{}' does not match the documented type '{}'.",
                            hinted, f.name, documented
                        ),
                    ));
                }
            }
        });
        findings
    }
}

/// Client methods must accept `**kwargs`.
pub struct KwargsChecker;

impl Checker for KwargsChecker {
    fn name(&self) -> &'static str {
        "client-kwargs"
    }

    fn codes(&self) -> &'static [DiagnosticCode] {
        &[DiagnosticCode::MissingKwargs]
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        let suffixes = ctx.settings.kwargs_class_suffixes();
        let exempt = ctx.settings.kwargs_exempt_methods();
        let mut findings = Vec::new();
        ctx.for_each_function(&mut |owner, f| {
            let Some(class) = owner else {
                return;
            };
            if !suffixes.iter().any(|s| class.name.ends_with(s.as_str())) {
                return;
            }
            if ctx.is_lint_exempt(&f.name) || exempt.iter().any(|m| m == &f.name) || f.signature.has_var_keyword() {
                return;
            }
            findings.push(Finding::node(
                DiagnosticCode::MissingKwargs,
                &f.id,
                format!("Client method '{}.{}' does not accept **kwargs.", class.name, f.name),
            ));
        });
        findings
    }
}

/// Every real argument needs a type from some source.
pub struct ArgTypeChecker;

impl Checker for ArgTypeChecker {
    fn name(&self) -> &'static str {
        "arg-type"
    }

    fn codes(&self) -> &'static [DiagnosticCode] {
        &[DiagnosticCode::MissingType]
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        let mut findings = Vec::new();
        ctx.for_each_function(&mut |_, f| {
            if ctx.is_lint_exempt(&f.name) {
                return;
            }
            for (position, arg) in f.signature.args.iter().enumerate() {
                let variadic = matches!(arg.kind, ArgKind::Separator | ArgKind::VarPositional | ArgKind::VarKeyword);
                let receiver = position == 0 && f.is_method && !f.signature.is_static && arg.is_receiver();
                if variadic || receiver || arg.type_name.is_some() {
                    continue;
                }
                findings.push(Finding::node(
                    DiagnosticCode::MissingType,
                    param_id(&f.id, &arg.name),
                    format!("Argument '{}' of '{}' has no type.", arg.name, f.name),
                ));
            }
        });
        findings
    }
}

/// `list*` operations return a pager.
pub struct PagingChecker;

impl Checker for PagingChecker {
    fn name(&self) -> &'static str {
        "paging"
    }

    fn codes(&self) -> &'static [DiagnosticCode] {
        &[DiagnosticCode::ListReturnType]
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        let mut findings = Vec::new();
        ctx.for_each_function(&mut |_, f| {
            let traced = f.signature.decorators.iter().any(|d| d.is("distributed_trace"));
            if !f.name.starts_with("list") || !traced {
                return;
            }
            let Some(ret) = &f.signature.return_type else {
                return;
            };
            if !ITEM_PAGED.is_match(ret) {
                findings.push(Finding::node(
                    DiagnosticCode::ListReturnType,
                    &f.id,
                    format!("'{}' is a list operation but returns '{}' instead of ItemPaged.", f.name, ret),
                ));
            }
        });
        findings
    }
}

/// `~`-qualified references into the package must resolve.
pub struct SourceLinkChecker;

impl SourceLinkChecker {
    fn check_type(ctx: &CheckContext<'_>, target: &str, type_name: &str, findings: &mut Vec<Finding>) {
        for caps in TILDE_REF.captures_iter(type_name) {
            let qualified = &caps[1];
            if !ctx.index.is_internal(qualified) {
                continue;
            }
            if matches!(ctx.index.resolve_qualified(qualified), Resolved::Unresolved) {
                findings.push(Finding::node(
                    DiagnosticCode::MissingSourceLink,
                    target,
                    format!("Type '{}' does not resolve to a definition in the package.", qualified),
                ));
            }
        }
    }
}

impl Checker for SourceLinkChecker {
    fn name(&self) -> &'static str {
        "source-link"
    }

    fn codes(&self) -> &'static [DiagnosticCode] {
        &[DiagnosticCode::MissingSourceLink]
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        let mut findings = Vec::new();
        for module in ctx.modules {
            walk(&module.children, &mut |node| match node {
                Node::Function(f) => {
                    for arg in f.signature.args.iter().filter(|a| !a.is_separator()) {
                        if let Some(t) = &arg.type_name {
                            Self::check_type(ctx, &param_id(&f.id, &arg.name), t, &mut findings);
                        }
                    }
                    if let Some(t) = &f.signature.return_type {
                        Self::check_type(ctx, &f.id, t, &mut findings);
                    }
                }
                Node::Class(c) => {
                    for base in &c.bases {
                        Self::check_type(ctx, &c.id, base, &mut findings);
                    }
                }
                Node::Property(p) => {
                    if let Some(t) = &p.type_name {
                        Self::check_type(ctx, &p.id, t, &mut findings);
                    }
                }
                Node::Variable(v) => {
                    if let Some(t) = &v.type_name {
                        Self::check_type(ctx, &v.id, t, &mut findings);
                    }
                }
                Node::Key(k) => {
                    if let Some(t) = &k.type_name {
                        Self::check_type(ctx, &k.id, t, &mut findings);
                    }
                }
                Node::EnumMember(_) => {}
            });
        }
        findings
    }
}

/// Docstrings must not document parameters the function does not have.
///
/// Scans source rather than the graph, so findings in functions that are
/// not rendered stay unclaimed.
pub struct DocstringNameChecker;

impl DocstringNameChecker {
    fn check_function(path: &std::path::Path, function: &FunctionDef, findings: &mut Vec<Finding>) {
        let Some(doc) = &function.docstring else {
            return;
        };
        let parsed = docstring::parse(&doc.text);
        let has = |kind: ParamKind| function.params.iter().any(|p| p.kind == kind);
        let declared = |name: &str| function.params.iter().any(|p| p.name == name);

        let mut report = |name: &str, offset: usize| {
            findings.push(Finding::at_source(
                DiagnosticCode::NameMismatch,
                path.to_path_buf(),
                doc.line + offset,
                format!(
                    "Docstring of '{}' documents '{}', which is not a parameter.",
                    function.name, name
                ),
            ));
        };

        for arg in &parsed.pos_args {
            let name = arg.name.trim_start_matches('*');
            if !declared(name) && !has(ParamKind::VarKeyword) {
                report(name, arg.offset);
            }
        }
        for arg in &parsed.kw_args {
            if !declared(&arg.name) && !has(ParamKind::VarKeyword) {
                report(&arg.name, arg.offset);
            }
        }
    }

    fn check_class(path: &std::path::Path, class: &ClassDef, findings: &mut Vec<Finding>) {
        for function in &class.functions {
            Self::check_function(path, function, findings);
        }
        for nested in &class.classes {
            Self::check_class(path, nested, findings);
        }
    }
}

impl Checker for DocstringNameChecker {
    fn name(&self) -> &'static str {
        "docstring-name"
    }

    fn codes(&self) -> &'static [DiagnosticCode] {
        &[DiagnosticCode::NameMismatch]
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        let mut findings = Vec::new();
        for module in ctx.index.modules().filter(|m| ctx.index.is_internal(&m.name)) {
            for function in &module.functions {
                Self::check_function(&module.path, function, &mut findings);
            }
            for class in &module.classes {
                Self::check_class(&module.path, class, &mut findings);
            }
        }
        findings
    }
}
