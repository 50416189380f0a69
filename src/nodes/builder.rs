//! Builds module nodes from the package index.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use tracing::debug;

use super::{FunctionNode, ModuleNode, Node, VariableKind, VariableNode, ASYNC_SUFFIX};
use crate::config::Settings;
use crate::diagnostics::{DiagnosticCode, Finding};
use crate::python::{
    string_literal, Assignment, DefinitionKind, Expr, ExprKind, FunctionDef, ModuleSource, PackageIndex, Resolved,
};
use crate::signature;

lazy_static! {
    static ref TYPE_NAME: Regex =
        Regex::new(r"~?[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*").unwrap();
    static ref QUOTED_NAME: Regex = Regex::new(r#"["']([A-Za-z_][A-Za-z0-9_.]*)["']"#).unwrap();
}

/// Turns indexed modules into [`ModuleNode`]s.
pub struct GraphBuilder<'a> {
    pub(super) index: &'a PackageIndex,
    pub(super) settings: &'a Settings,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(index: &'a PackageIndex, settings: &'a Settings) -> Self {
        Self { index, settings }
    }

    /// Build every module that was parsed; failed modules are skipped.
    pub fn build(&self, modules: &[String]) -> Vec<ModuleNode> {
        modules.iter().filter_map(|m| self.build_module(m)).collect()
    }

    pub fn build_module(&self, name: &str) -> Option<ModuleNode> {
        let source = self.index.module(name)?;
        let mut variables: Vec<Node> = Vec::new();
        let mut functions: Vec<FunctionNode> = Vec::new();
        let mut classes: Vec<Node> = Vec::new();

        for exported in self.index.public_names(name) {
            let Resolved::Definition(def) = self.index.resolve(name, &exported) else {
                continue;
            };
            if !self.index.is_internal(&def.module.name) {
                continue;
            }
            let id = format!("{}.{}", name, exported);
            match def.kind {
                DefinitionKind::Class(class) => {
                    let mut node = self.build_class(def.module, class, id, &exported);
                    if exported != class.name {
                        node.errors.push(name_mismatch(&node.id, &exported, &def.origin()));
                    }
                    classes.push(Node::Class(node));
                }
                DefinitionKind::Function(_) => {
                    if self.is_excluded_origin(&def.module.name) {
                        continue;
                    }
                    let defs = def.module.functions_named(def.name);
                    let mut group = self.function_group(name, def.module, &defs, &exported, false, None);
                    if exported != def.name {
                        for f in group.iter_mut() {
                            f.errors.push(name_mismatch(&f.id, &exported, &def.origin()));
                        }
                    }
                    functions.extend(group);
                }
                DefinitionKind::Constant(assignment) => {
                    if let Some(var) = self.constant(def.module, assignment, id, &exported, VariableKind::Module) {
                        variables.push(Node::Variable(var));
                    }
                }
            }
        }

        variables.sort_by(|a, b| a.name().cmp(b.name()));
        sort_functions(&mut functions);
        classes.sort_by(|a, b| a.name().cmp(b.name()));

        let mut children = variables;
        children.extend(functions.into_iter().map(Node::Function));
        children.extend(classes);
        debug!(module = %name, children = children.len(), "built module");

        Some(ModuleNode {
            name: name.to_string(),
            path: source.path.clone(),
            docstring: source.docstring.clone(),
            children,
        })
    }

    /// Function nodes for every definition of one name in a container.
    ///
    /// Sync and async definitions are grouped separately; within a group,
    /// overloads get numbered IDs and the last plain definition is the
    /// implementation.
    pub(super) fn function_group(
        &self,
        parent_id: &str,
        scope: &ModuleSource,
        defs: &[&FunctionDef],
        exported: &str,
        is_method: bool,
        fallback_doc: Option<&str>,
    ) -> Vec<FunctionNode> {
        let mut nodes = Vec::new();
        for is_async in [false, true] {
            let base = format!(
                "{}.{}{}",
                parent_id,
                exported,
                if is_async { ASYNC_SUFFIX } else { "" }
            );
            let overloads = defs.iter().filter(|d| d.is_async == is_async && d.is_overload());
            for (i, def) in overloads.enumerate() {
                let mut node = self.function(scope, def, format!("{}_{}", base, i + 1), exported, is_method, fallback_doc);
                node.overload_of = Some(base.clone());
                nodes.push(node);
            }
            let implementation = defs.iter().filter(|d| d.is_async == is_async && !d.is_overload()).last();
            if let Some(def) = implementation {
                nodes.push(self.function(scope, def, base, exported, is_method, fallback_doc));
            }
        }
        nodes
    }

    fn function(
        &self,
        scope: &ModuleSource,
        def: &FunctionDef,
        id: String,
        exported: &str,
        is_method: bool,
        fallback_doc: Option<&str>,
    ) -> FunctionNode {
        let mut sig = signature::resolve(def, is_method, fallback_doc);
        sig.map_types(|t| self.canonical_type(&scope.name, t));

        let mut errors = Vec::new();
        let unparsed = def.decorators.iter().find(|d| d.has_error || d.name.is_none());
        if def.has_error || unparsed.is_some() {
            let what = match unparsed {
                Some(d) => format!("Decorator '@{}' of '{}' could not be parsed.", d.text, def.name),
                None => format!("Signature of '{}' could not be fully parsed.", def.name),
            };
            errors.push(Finding::node(DiagnosticCode::DecoratorParse, id.clone(), what));
        }

        FunctionNode {
            name: exported.to_string(),
            id,
            origin: format!("{}.{}", scope.name, def.name),
            scope: scope.name.clone(),
            signature: sig,
            is_method,
            docstring: def.docstring.clone(),
            span: def.span.clone(),
            errors,
            overload_of: None,
        }
    }

    /// A module or class constant; only plain literals qualify at module level.
    pub(super) fn constant(
        &self,
        scope: &ModuleSource,
        assignment: &Assignment,
        id: String,
        exported: &str,
        kind: VariableKind,
    ) -> Option<VariableNode> {
        let value = assignment.value.as_ref();
        if kind == VariableKind::Module && !value.map(Expr::is_constant).unwrap_or(false) {
            return None;
        }
        let type_name = match &assignment.annotation {
            Some(a) => Some(self.canonical_type(&scope.name, a)),
            None => value.and_then(inferred_type),
        };
        Some(VariableNode {
            name: exported.to_string(),
            id,
            kind,
            type_name,
            value: value.map(render_value),
        })
    }

    pub(super) fn is_excluded_origin(&self, module: &str) -> bool {
        self.settings
            .excluded_origin_suffixes()
            .iter()
            .any(|suffix| module.ends_with(suffix.as_str()))
    }

    /// Rewrite package-internal class references as `~origin` so they can
    /// be linked; everything else is left as written.
    pub fn canonical_type(&self, scope: &str, text: &str) -> String {
        let text = forward_ref(text);
        let unquoted = QUOTED_NAME.replace_all(text, |caps: &Captures| {
            match self.index.resolve_dotted(scope, &caps[1]) {
                Resolved::Definition(_) => caps[1].to_string(),
                _ => caps[0].to_string(),
            }
        });
        TYPE_NAME
            .replace_all(&unquoted, |caps: &Captures| {
                let Some(m) = caps.get(0) else {
                    return String::new();
                };
                let quoted = unquoted[..m.start()].ends_with(['"', '\'']);
                if quoted {
                    return m.as_str().to_string();
                }
                let resolved = match m.as_str().strip_prefix('~') {
                    Some(qualified) => self.index.resolve_qualified(qualified),
                    None => self.index.resolve_dotted(scope, m.as_str()),
                };
                match resolved {
                    Resolved::Definition(d) if matches!(d.kind, DefinitionKind::Class(_)) && self.index.is_internal(&d.module.name) => {
                        format!("~{}", d.origin())
                    }
                    _ => m.as_str().to_string(),
                }
            })
            .into_owned()
    }
}

/// Strip the quotes of a whole-annotation forward reference.
fn forward_ref(text: &str) -> &str {
    let text = text.trim();
    let quoted = text.len() >= 2
        && ((text.starts_with('"') && text.ends_with('"')) || (text.starts_with('\'') && text.ends_with('\'')));
    if quoted {
        &text[1..text.len() - 1]
    } else {
        text
    }
}

fn name_mismatch(id: &str, exported: &str, origin: &str) -> Finding {
    Finding::node(
        DiagnosticCode::NameMismatch,
        id,
        format!("'{}' is exported under a different name than its definition '{}'.", exported, origin),
    )
}

/// Overloads in source order, then the implementation; sync before async.
pub(super) fn sort_functions(functions: &mut [FunctionNode]) {
    functions.sort_by(|a, b| {
        (&a.name, a.signature.is_async, !a.signature.is_overload).cmp(&(
            &b.name,
            b.signature.is_async,
            !b.signature.is_overload,
        ))
    });
}

/// Literal rendering of a value; strings keep their prefix and prefer double quotes.
pub(super) fn render_value(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Str(_) => string_literal(&expr.text),
        _ => expr.text.clone(),
    }
}

fn inferred_type(expr: &Expr) -> Option<String> {
    let name = match &expr.kind {
        ExprKind::Str(_) if expr.text.starts_with(['b', 'B']) => "bytes",
        ExprKind::Str(_) => "str",
        ExprKind::Bool => "bool",
        ExprKind::Number if expr.text.contains(['.', 'e', 'E']) && !expr.text.starts_with("0x") => "float",
        ExprKind::Number => "int",
        _ => return None,
    };
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::python::PythonParser;
    use std::path::Path;

    fn index(files: &[(&str, &str, bool)]) -> PackageIndex {
        let parser = PythonParser::new().unwrap();
        let modules = files
            .iter()
            .map(|(name, code, is_package)| {
                let parsed = parser.parse(Path::new(&format!("{}.py", name)), code.as_bytes().to_vec()).unwrap();
                parser.extract(&parsed, name, *is_package)
            })
            .collect();
        PackageIndex::from_modules("pkg", modules)
    }

    fn render(node: &Node) -> String {
        match node {
            Node::Function(f) => f.id.clone(),
            other => other.id().to_string(),
        }
    }

    #[test]
    fn test_module_children_order_and_filters() {
        let idx = index(&[
            (
                "pkg",
                "from typing import Optional\nfrom ._impl import Zeta, alpha\nLIMIT = 10\nNAME: str = 'x'\n_HIDDEN = 1\nconfig = {}\ndef beta(): pass\nclass Alpha: pass\n",
                true,
            ),
            ("pkg._impl", "class Zeta: pass\ndef alpha(): pass\n", false),
        ]);
        let settings = Settings::default();
        let builder = GraphBuilder::new(&idx, &settings);
        let module = builder.build_module("pkg").unwrap();
        let ids: Vec<String> = module.children.iter().map(render).collect();
        assert_eq!(
            ids,
            vec!["pkg.LIMIT", "pkg.NAME", "pkg.alpha", "pkg.beta", "pkg.Alpha", "pkg.Zeta"]
        );
        match &module.children[0] {
            Node::Variable(v) => {
                assert_eq!(v.type_name.as_deref(), Some("int"));
                assert_eq!(v.value.as_deref(), Some("10"));
            }
            other => panic!("unexpected {:?}", other),
        }
        match &module.children[1] {
            Node::Variable(v) => assert_eq!(v.value.as_deref(), Some("\"x\"")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_overload_and_async_ids() {
        let idx = index(&[(
            "pkg",
            "@overload\ndef get(a: int) -> int: ...\n@overload\ndef get(a: str) -> str: ...\ndef get(a): ...\n",
            true,
        )]);
        let settings = Settings::default();
        let module = GraphBuilder::new(&idx, &settings).build_module("pkg").unwrap();
        let ids: Vec<String> = module.children.iter().map(render).collect();
        assert_eq!(ids, vec!["pkg.get_1", "pkg.get_2", "pkg.get"]);
    }

    #[test]
    fn test_alias_export_records_name_mismatch() {
        let idx = index(&[("pkg", "class _Impl: pass\nPublic = _Impl\n", true)]);
        let settings = Settings::default();
        let module = GraphBuilder::new(&idx, &settings).build_module("pkg").unwrap();
        assert_eq!(module.children.len(), 1);
        let errors = module.children[0].errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, DiagnosticCode::NameMismatch);
    }

    #[test]
    fn test_canonical_type_links_internal_classes() {
        let idx = index(&[
            ("pkg", "from ._models import Widget\nimport typing\n", true),
            ("pkg._models", "class Widget: pass\n", false),
        ]);
        let settings = Settings::default();
        let builder = GraphBuilder::new(&idx, &settings);
        assert_eq!(
            builder.canonical_type("pkg", "Optional[List[Widget]]"),
            "Optional[List[~pkg._models.Widget]]"
        );
        assert_eq!(builder.canonical_type("pkg", "\"Widget\""), "~pkg._models.Widget");
        assert_eq!(builder.canonical_type("pkg", "~pkg.Widget"), "~pkg._models.Widget");
        assert_eq!(builder.canonical_type("pkg", "Literal['fast']"), "Literal['fast']");
        assert_eq!(builder.canonical_type("pkg", "typing.Any"), "typing.Any");
    }
}
