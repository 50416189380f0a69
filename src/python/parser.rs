//! Python source parsing using tree-sitter.

use std::path::{Path, PathBuf};

use anyhow::Context;
use lazy_static::lazy_static;
use regex::Regex;
use streaming_iterator::StreamingIterator;
use tree_sitter::{Language, Node, Parser, Query, QueryCursor};

use super::model::*;

/// Tree-sitter query for extracting imports.
const IMPORT_QUERY: &str = r#"
; import module
(import_statement) @import

; from module import name
(import_from_statement) @import_from
"#;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref OPEN_SPACE: Regex = Regex::new(r"([\[\(\{]) ").unwrap();
    static ref CLOSE_SPACE: Regex = Regex::new(r",? ([\]\)\}])").unwrap();
    static ref TYPE_COMMENT: Regex =
        Regex::new(r"#\s*type:\s*\((.*)\)\s*->\s*([^\n#]+)").unwrap();
    static ref STRING_PREFIX: Regex = Regex::new(r"^[rRuUbBfF]{0,2}").unwrap();
}

/// Holds a parsed tree-sitter tree and associated metadata.
pub struct ParsedFile {
    /// The tree-sitter parse tree.
    pub tree: tree_sitter::Tree,
    /// Source bytes, kept for node text extraction.
    pub source: Vec<u8>,
    /// The file path (for spans and error reporting).
    pub path: PathBuf,
}

impl ParsedFile {
    /// Get text for a tree-sitter node.
    pub fn node_text(&self, node: Node) -> &str {
        node.utf8_text(&self.source).unwrap_or("")
    }
}

/// Parses Python files into [`ModuleSource`] values.
pub struct PythonParser {
    language: Language,
    import_query: Query,
}

impl PythonParser {
    pub fn new() -> anyhow::Result<Self> {
        let language: Language = tree_sitter_python::LANGUAGE.into();
        let import_query = Query::new(&language, IMPORT_QUERY)?;
        Ok(Self {
            language,
            import_query,
        })
    }

    fn create_parser(&self) -> anyhow::Result<Parser> {
        let mut parser = Parser::new();
        parser.set_language(&self.language)?;
        Ok(parser)
    }

    /// Parse source bytes. Syntax errors still yield a tree with ERROR nodes.
    pub fn parse(&self, path: &Path, source: Vec<u8>) -> anyhow::Result<ParsedFile> {
        let mut parser = self.create_parser()?;
        let tree = parser
            .parse(&source, None)
            .ok_or_else(|| anyhow::anyhow!("failed to parse {}", path.display()))?;
        Ok(ParsedFile {
            tree,
            source,
            path: path.to_path_buf(),
        })
    }

    /// Read, parse and extract one module.
    pub fn parse_module(&self, path: &Path, name: &str, is_package: bool) -> anyhow::Result<ModuleSource> {
        let source = std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
        let parsed = self.parse(path, source)?;
        Ok(self.extract(&parsed, name, is_package))
    }

    /// Build the module model from a parse tree.
    pub fn extract(&self, parsed: &ParsedFile, name: &str, is_package: bool) -> ModuleSource {
        let root = parsed.tree.root_node();
        let mut module = ModuleSource {
            name: name.to_string(),
            path: parsed.path.clone(),
            is_package,
            docstring: block_docstring(parsed, root),
            syntax_error: first_error_line(root),
            ..Default::default()
        };
        collect_module_block(parsed, root, &mut module);
        self.collect_imports(parsed, &mut module);
        module
    }

    fn collect_imports(&self, parsed: &ParsedFile, module: &mut ModuleSource) {
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&self.import_query, parsed.tree.root_node(), &parsed.source[..]);

        while let Some(m) = matches.next() {
            for capture in m.captures {
                let node = capture.node;
                if !is_module_scope(node) {
                    continue;
                }
                let line = node.start_position().row + 1;
                match self.import_query.capture_names()[capture.index as usize] {
                    "import" => import_statement(parsed, node, line, module),
                    "import_from" => import_from_statement(parsed, node, line, module),
                    _ => {}
                }
            }
        }
    }
}

fn import_statement(parsed: &ParsedFile, node: Node, line: usize, module: &mut ModuleSource) {
    let names: Vec<Node> = node.children_by_field_name("name", &mut node.walk()).collect();
    for name in names {
        match name.kind() {
            "dotted_name" => {
                let full = parsed.node_text(name).to_string();
                let top = full.split('.').next().unwrap_or(&full).to_string();
                module.imports.push(ImportBinding {
                    local: top.clone(),
                    target: ImportTarget::Module(top),
                    line,
                });
            }
            "aliased_import" => {
                let (Some(target), Some(alias)) =
                    (name.child_by_field_name("name"), name.child_by_field_name("alias"))
                else {
                    continue;
                };
                module.imports.push(ImportBinding {
                    local: parsed.node_text(alias).to_string(),
                    target: ImportTarget::Module(parsed.node_text(target).to_string()),
                    line,
                });
            }
            _ => {}
        }
    }
}

fn import_from_statement(parsed: &ParsedFile, node: Node, line: usize, module: &mut ModuleSource) {
    let Some(source_module) = node.child_by_field_name("module_name") else {
        return;
    };
    let from = match source_module.kind() {
        "relative_import" => {
            let mut dots = 0;
            let mut rest = None;
            let children: Vec<Node> = source_module.named_children(&mut source_module.walk()).collect();
            for child in children {
                match child.kind() {
                    "import_prefix" => dots = parsed.node_text(child).matches('.').count(),
                    "dotted_name" => rest = Some(parsed.node_text(child)),
                    _ => {}
                }
            }
            resolve_relative(&module.name, module.is_package, dots, rest)
        }
        _ => parsed.node_text(source_module).to_string(),
    };

    let children: Vec<Node> = node.named_children(&mut node.walk()).collect();
    if children.iter().any(|c| c.kind() == "wildcard_import") {
        module.wildcard_imports.push(from);
        return;
    }

    let names: Vec<Node> = node.children_by_field_name("name", &mut node.walk()).collect();
    for name in names {
        let (imported, local) = match name.kind() {
            "aliased_import" => {
                let (Some(target), Some(alias)) =
                    (name.child_by_field_name("name"), name.child_by_field_name("alias"))
                else {
                    continue;
                };
                (parsed.node_text(target), parsed.node_text(alias))
            }
            _ => {
                let text = parsed.node_text(name);
                (text, text)
            }
        };
        module.imports.push(ImportBinding {
            local: local.to_string(),
            target: ImportTarget::Member {
                module: from.clone(),
                name: imported.to_string(),
            },
            line,
        });
    }
}

/// Turn `from ..x import y` into an absolute module name.
pub fn resolve_relative(current: &str, is_package: bool, dots: usize, rest: Option<&str>) -> String {
    let mut parts: Vec<&str> = current.split('.').collect();
    if !is_package {
        parts.pop();
    }
    for _ in 1..dots.max(1) {
        parts.pop();
    }
    let base = parts.join(".");
    match rest {
        Some(r) if base.is_empty() => r.to_string(),
        Some(r) => format!("{}.{}", base, r),
        None => base,
    }
}

/// True when no function or class encloses the node.
fn is_module_scope(node: Node) -> bool {
    let mut current = node.parent();
    while let Some(parent) = current {
        if matches!(parent.kind(), "function_definition" | "class_definition") {
            return false;
        }
        current = parent.parent();
    }
    true
}

fn first_error_line(root: Node) -> Option<usize> {
    if !root.has_error() {
        return None;
    }
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if node.is_error() || node.is_missing() {
            return Some(node.start_position().row + 1);
        }
        if node.has_error() && cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return Some(root.start_position().row + 1);
            }
        }
    }
}

/// Statements at module level. Conditional and `try` blocks are flattened so
/// `if TYPE_CHECKING:` and import fallbacks still bind their names.
fn collect_module_block(parsed: &ParsedFile, block: Node, module: &mut ModuleSource) {
    let children: Vec<Node> = block.named_children(&mut block.walk()).collect();
    for child in children {
        match child.kind() {
            "class_definition" => module.classes.push(class_def(parsed, child, child, Vec::new())),
            "function_definition" => module.functions.push(function_def(parsed, child, child, Vec::new())),
            "decorated_definition" => match decorated(parsed, child) {
                Some(Definition::Class(c)) => module.classes.push(c),
                Some(Definition::Function(f)) => module.functions.push(f),
                None => {}
            },
            "expression_statement" => module_expression(parsed, child, module),
            "if_statement" | "try_statement" | "elif_clause" | "else_clause" | "except_clause"
            | "finally_clause" | "block" => collect_module_block(parsed, child, module),
            _ => {}
        }
    }
}

fn module_expression(parsed: &ParsedFile, stmt: Node, module: &mut ModuleSource) {
    let Some(expr) = stmt.named_child(0) else {
        return;
    };
    match expr.kind() {
        "assignment" => {
            for assignment in assignments(parsed, expr) {
                if assignment.name == "__all__" {
                    if let Some(right) = expr.child_by_field_name("right") {
                        module.all = Some(string_list(parsed, right));
                    }
                    continue;
                }
                module.assignments.push(assignment);
            }
        }
        "augmented_assignment" => {
            let is_all = expr
                .child_by_field_name("left")
                .map(|l| parsed.node_text(l) == "__all__")
                .unwrap_or(false);
            if let (true, Some(right)) = (is_all, expr.child_by_field_name("right")) {
                let extra = string_list(parsed, right);
                module.all.get_or_insert_with(Vec::new).extend(extra);
            }
        }
        "call" => {
            let callee = expr
                .child_by_field_name("function")
                .map(|f| parsed.node_text(f))
                .unwrap_or("");
            let Some(args) = expr.child_by_field_name("arguments") else {
                return;
            };
            match callee {
                "__all__.extend" => {
                    let extra = string_list(parsed, args);
                    module.all.get_or_insert_with(Vec::new).extend(extra);
                }
                "__all__.append" => {
                    let extra = string_list(parsed, args);
                    module.all.get_or_insert_with(Vec::new).extend(extra);
                }
                _ => {}
            }
        }
        _ => {}
    }
}

/// String elements of a list/tuple literal, concatenations of them, or call arguments.
fn string_list(parsed: &ParsedFile, node: Node) -> Vec<String> {
    match node.kind() {
        "string" | "concatenated_string" => vec![unquote(parsed.node_text(node))],
        "list" | "tuple" | "argument_list" | "parenthesized_expression" => {
            let children: Vec<Node> = node.named_children(&mut node.walk()).collect();
            children
                .into_iter()
                .flat_map(|c| match c.kind() {
                    "string" | "concatenated_string" => vec![unquote(parsed.node_text(c))],
                    "list" | "tuple" => string_list(parsed, c),
                    _ => Vec::new(),
                })
                .collect()
        }
        "binary_operator" => {
            let mut out = Vec::new();
            for field in ["left", "right"] {
                if let Some(side) = node.child_by_field_name(field) {
                    out.extend(string_list(parsed, side));
                }
            }
            out
        }
        _ => Vec::new(),
    }
}

/// Simple-name targets of an assignment, including chained `a = b = 1`.
fn assignments(parsed: &ParsedFile, node: Node) -> Vec<Assignment> {
    let mut out = Vec::new();
    let right = node.child_by_field_name("right");
    let annotation = node
        .child_by_field_name("type")
        .map(|t| normalize_expr(parsed.node_text(t)));

    // Chained assignment: the value is whatever the innermost right side holds.
    let value = match right {
        Some(r) if r.kind() == "assignment" => {
            let inner = assignments(parsed, r);
            let value = inner.last().and_then(|a| a.value.clone());
            out.extend(inner);
            value
        }
        Some(r) => Some(expr(parsed, r)),
        None => None,
    };

    if let Some(left) = node.child_by_field_name("left") {
        if left.kind() == "identifier" {
            out.insert(
                0,
                Assignment {
                    name: parsed.node_text(left).to_string(),
                    annotation,
                    value,
                    line: node.start_position().row + 1,
                },
            );
        }
    }
    out
}

enum Definition {
    Class(ClassDef),
    Function(FunctionDef),
}

fn decorated(parsed: &ParsedFile, node: Node) -> Option<Definition> {
    let children: Vec<Node> = node.named_children(&mut node.walk()).collect();
    let decorators: Vec<Decorator> = children
        .iter()
        .filter(|c| c.kind() == "decorator")
        .map(|c| decorator(parsed, *c))
        .collect();
    let definition = node.child_by_field_name("definition")?;
    match definition.kind() {
        "class_definition" => Some(Definition::Class(class_def(parsed, definition, node, decorators))),
        "function_definition" => Some(Definition::Function(function_def(parsed, definition, node, decorators))),
        _ => None,
    }
}

fn decorator(parsed: &ParsedFile, node: Node) -> Decorator {
    let expression = node.named_child(0);
    let text = expression
        .map(|e| normalize_expr(parsed.node_text(e)))
        .unwrap_or_default();
    let (name, is_simple) = match expression {
        Some(e) if matches!(e.kind(), "identifier" | "attribute") => (Some(strip_spaces(parsed.node_text(e))), true),
        Some(e) if e.kind() == "call" => (
            e.child_by_field_name("function")
                .filter(|f| matches!(f.kind(), "identifier" | "attribute"))
                .map(|f| strip_spaces(parsed.node_text(f))),
            false,
        ),
        _ => (None, false),
    };
    Decorator {
        text,
        name,
        is_simple,
        has_error: node.has_error(),
    }
}

fn class_def(parsed: &ParsedFile, node: Node, outer: Node, decorators: Vec<Decorator>) -> ClassDef {
    let name = node
        .child_by_field_name("name")
        .map(|n| parsed.node_text(n).to_string())
        .unwrap_or_default();

    let mut bases = Vec::new();
    let mut keywords = Vec::new();
    if let Some(args) = node.child_by_field_name("superclasses") {
        let children: Vec<Node> = args.named_children(&mut args.walk()).collect();
        for child in children {
            match child.kind() {
                "keyword_argument" => {
                    if let (Some(k), Some(v)) =
                        (child.child_by_field_name("name"), child.child_by_field_name("value"))
                    {
                        keywords.push((parsed.node_text(k).to_string(), normalize_expr(parsed.node_text(v))));
                    }
                }
                "comment" => {}
                _ => bases.push(normalize_expr(parsed.node_text(child))),
            }
        }
    }

    let mut class = ClassDef {
        name,
        bases,
        keywords,
        decorators,
        docstring: None,
        functions: Vec::new(),
        assignments: Vec::new(),
        classes: Vec::new(),
        span: SourceSpan::from_node(&parsed.path, outer),
    };

    if let Some(body) = node.child_by_field_name("body") {
        class.docstring = block_docstring(parsed, body);
        let children: Vec<Node> = body.named_children(&mut body.walk()).collect();
        for child in children {
            match child.kind() {
                "function_definition" => class.functions.push(function_def(parsed, child, child, Vec::new())),
                "class_definition" => class.classes.push(class_def(parsed, child, child, Vec::new())),
                "decorated_definition" => match decorated(parsed, child) {
                    Some(Definition::Class(c)) => class.classes.push(c),
                    Some(Definition::Function(f)) => class.functions.push(f),
                    None => {}
                },
                "expression_statement" => {
                    if let Some(e) = child.named_child(0).filter(|e| e.kind() == "assignment") {
                        class.assignments.extend(assignments(parsed, e));
                    }
                }
                _ => {}
            }
        }
    }
    class
}

fn function_def(parsed: &ParsedFile, node: Node, outer: Node, decorators: Vec<Decorator>) -> FunctionDef {
    let name = node
        .child_by_field_name("name")
        .map(|n| parsed.node_text(n).to_string())
        .unwrap_or_default();
    let is_async = node.child(0).map(|c| c.kind() == "async").unwrap_or(false);
    let params_node = node.child_by_field_name("parameters");
    let params = params_node.map(|p| parameters(parsed, p)).unwrap_or_default();
    let returns = node
        .child_by_field_name("return_type")
        .map(|r| normalize_expr(parsed.node_text(r)));
    let body = node.child_by_field_name("body");

    let type_comment = match (params_node, body) {
        (Some(p), Some(b)) => {
            let stop = {
                let children: Vec<Node> = b.named_children(&mut b.walk()).collect();
                children
                    .into_iter()
                    .find(|c| c.kind() != "comment")
                    .map(|c| c.start_byte())
                    .unwrap_or_else(|| b.end_byte())
            };
            let start = p.end_byte().min(stop);
            let region = std::str::from_utf8(&parsed.source[start..stop]).unwrap_or("");
            type_comment(region)
        }
        _ => None,
    };

    FunctionDef {
        name,
        is_async,
        decorators,
        params,
        returns,
        type_comment,
        docstring: body.and_then(|b| block_docstring(parsed, b)),
        span: SourceSpan::from_node(&parsed.path, outer),
        has_error: node.has_error(),
    }
}

fn parameters(parsed: &ParsedFile, node: Node) -> Vec<Param> {
    let mut params: Vec<Param> = Vec::new();
    let mut keyword_only = false;
    let children: Vec<Node> = node.named_children(&mut node.walk()).collect();

    for child in children {
        let default_kind = if keyword_only {
            ParamKind::KeywordOnly
        } else {
            ParamKind::PositionalOrKeyword
        };
        let param = match child.kind() {
            "identifier" => Param {
                name: parsed.node_text(child).to_string(),
                kind: default_kind,
                annotation: None,
                default: None,
            },
            "typed_parameter" => {
                let annotation = child
                    .child_by_field_name("type")
                    .map(|t| normalize_expr(parsed.node_text(t)));
                let Some(inner) = child.named_child(0) else {
                    continue;
                };
                let (name, kind) = splat(parsed, inner, default_kind);
                if kind == ParamKind::VarPositional {
                    keyword_only = true;
                }
                Param {
                    name,
                    kind,
                    annotation,
                    default: None,
                }
            }
            "default_parameter" | "typed_default_parameter" => Param {
                name: child
                    .child_by_field_name("name")
                    .map(|n| parsed.node_text(n).to_string())
                    .unwrap_or_default(),
                kind: default_kind,
                annotation: child
                    .child_by_field_name("type")
                    .map(|t| normalize_expr(parsed.node_text(t))),
                default: child.child_by_field_name("value").map(|v| expr(parsed, v)),
            },
            "list_splat_pattern" | "dictionary_splat_pattern" => {
                let (name, kind) = splat(parsed, child, default_kind);
                if kind == ParamKind::VarPositional {
                    keyword_only = true;
                }
                Param {
                    name,
                    kind,
                    annotation: None,
                    default: None,
                }
            }
            "keyword_separator" => {
                keyword_only = true;
                continue;
            }
            "positional_separator" => {
                for p in params.iter_mut() {
                    if p.kind == ParamKind::PositionalOrKeyword {
                        p.kind = ParamKind::PositionalOnly;
                    }
                }
                continue;
            }
            "tuple_pattern" => Param {
                name: normalize_expr(parsed.node_text(child)),
                kind: default_kind,
                annotation: None,
                default: None,
            },
            _ => continue,
        };
        params.push(param);
    }
    params
}

fn splat(parsed: &ParsedFile, node: Node, fallback: ParamKind) -> (String, ParamKind) {
    let text = parsed.node_text(node);
    match node.kind() {
        "list_splat_pattern" => (text.trim_start_matches('*').trim().to_string(), ParamKind::VarPositional),
        "dictionary_splat_pattern" => (text.trim_start_matches('*').trim().to_string(), ParamKind::VarKeyword),
        _ => (text.to_string(), fallback),
    }
}

/// Classify an expression node.
fn expr(parsed: &ParsedFile, node: Node) -> Expr {
    let raw = parsed.node_text(node);
    let kind = match node.kind() {
        "string" | "concatenated_string" => ExprKind::Str(unquote(raw)),
        "integer" | "float" => ExprKind::Number,
        "unary_operator" => match node.child_by_field_name("argument").map(|a| a.kind()) {
            Some("integer") | Some("float") => ExprKind::Number,
            _ => ExprKind::Other,
        },
        "true" | "false" => ExprKind::Bool,
        "none" => ExprKind::None,
        "ellipsis" => ExprKind::Ellipsis,
        "list" | "dictionary" | "tuple" | "set" => ExprKind::Collection,
        "identifier" | "attribute" => ExprKind::Name(strip_spaces(raw)),
        _ => ExprKind::Other,
    };
    Expr {
        text: normalize_expr(raw),
        kind,
    }
}

/// The docstring of a module or block: a leading string statement.
fn block_docstring(parsed: &ParsedFile, block: Node) -> Option<Docstring> {
    let children: Vec<Node> = block.named_children(&mut block.walk()).collect();
    let first = children.into_iter().find(|c| c.kind() != "comment")?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let string = first
        .named_child(0)
        .filter(|s| matches!(s.kind(), "string" | "concatenated_string"))?;
    let raw = unquote(parsed.node_text(string));
    let leading_blank = raw.lines().take_while(|l| l.trim().is_empty()).count();
    Some(Docstring {
        text: clean_docstring(&raw),
        line: string.start_position().row + 1 + leading_blank,
    })
}

/// Parse the signature comment found between a def's parameters and its body.
pub fn type_comment(region: &str) -> Option<TypeComment> {
    let caps = TYPE_COMMENT.captures(region)?;
    let args = split_top_level(&caps[1], ',')
        .into_iter()
        .map(|a| a.trim().trim_start_matches('*').to_string())
        .filter(|a| !a.is_empty())
        .collect();
    Some(TypeComment {
        args,
        returns: caps[2].trim().to_string(),
    })
}

/// Split on a separator that is not nested inside brackets.
pub fn split_top_level(text: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in text.chars() {
        match c {
            '[' | '(' | '{' => depth += 1,
            ']' | ')' | '}' => depth -= 1,
            _ => {}
        }
        if c == sep && depth == 0 {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    parts
}

/// Collapse whitespace and tidy bracket spacing in an expression's source text.
pub fn normalize_expr(text: &str) -> String {
    let collapsed = WHITESPACE.replace_all(text.trim(), " ");
    let opened = OPEN_SPACE.replace_all(&collapsed, "$1");
    CLOSE_SPACE.replace_all(&opened, "$1").into_owned()
}

fn strip_spaces(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// One piece of a string literal: `prefix quote body quote`.
struct StringPart<'a> {
    source: &'a str,
    prefix: &'a str,
    quote: &'a str,
    body: &'a str,
}

impl StringPart<'_> {
    fn is_raw(&self) -> bool {
        self.prefix.contains(['r', 'R'])
    }

    /// Double quotes unless the body holds a double quote and no single
    /// quote, in which case the single-quoted source is already canonical.
    fn canonical(&self) -> String {
        if self.quote != "'" {
            return self.source.to_string();
        }
        if self.is_raw() {
            if self.body.contains('"') {
                return self.source.to_string();
            }
            return format!("{}\"{}\"", self.prefix, self.body);
        }

        let mut out = String::with_capacity(self.body.len() + 2);
        let mut has_single = false;
        let mut has_double = false;
        let mut chars = self.body.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some('\'') => {
                        has_single = true;
                        out.push('\'');
                    }
                    Some(next) => {
                        out.push('\\');
                        out.push(next);
                    }
                    None => out.push('\\'),
                },
                '"' => {
                    has_double = true;
                    out.push_str("\\\"");
                }
                _ => out.push(c),
            }
        }
        if has_double && !has_single {
            return self.source.to_string();
        }
        format!("{}\"{}\"", self.prefix, out)
    }
}

/// Split a string literal (or implicit concatenation of literals) into parts.
/// An unterminated part ends the list with its remaining text as body.
fn string_parts(literal: &str) -> Vec<StringPart<'_>> {
    let mut parts = Vec::new();
    let mut rest = literal.trim();
    while !rest.is_empty() {
        let prefix_len = STRING_PREFIX.find(rest).map(|m| m.end()).unwrap_or(0);
        let after_prefix = &rest[prefix_len..];
        let Some(quote) = ["\"\"\"", "'''", "\"", "'"]
            .into_iter()
            .find(|q| after_prefix.starts_with(q))
        else {
            break;
        };
        let inner = &after_prefix[quote.len()..];
        let Some(end) = find_unescaped(inner, quote) else {
            parts.push(StringPart {
                source: rest,
                prefix: &rest[..prefix_len],
                quote,
                body: inner,
            });
            break;
        };
        let consumed = prefix_len + quote.len() * 2 + end;
        parts.push(StringPart {
            source: &rest[..consumed],
            prefix: &rest[..prefix_len],
            quote,
            body: &inner[..end],
        });
        rest = rest[consumed..].trim_start();
    }
    parts
}

/// Content of a string literal (or implicit concatenation of literals).
pub fn unquote(literal: &str) -> String {
    string_parts(literal).iter().map(|p| p.body).collect()
}

/// Source form of a string literal for display: the prefix is kept and each
/// part is written with double quotes where that needs no change of meaning.
pub fn string_literal(literal: &str) -> String {
    let parts = string_parts(literal);
    if parts.is_empty() {
        return literal.trim().to_string();
    }
    parts.iter().map(StringPart::canonical).collect::<Vec<_>>().join(" ")
}

fn find_unescaped(haystack: &str, needle: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(needle) {
        let at = from + pos;
        let backslashes = haystack[..at].chars().rev().take_while(|c| *c == '\\').count();
        if backslashes % 2 == 0 {
            return Some(at);
        }
        from = at + needle.len();
    }
    None
}

/// Dedent a docstring the way `inspect.cleandoc` does.
pub fn clean_docstring(raw: &str) -> String {
    let lines: Vec<&str> = raw.lines().collect();
    if lines.is_empty() {
        return String::new();
    }
    let indent = lines
        .iter()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    let mut cleaned: Vec<String> = Vec::with_capacity(lines.len());
    cleaned.push(lines[0].trim().to_string());
    for line in &lines[1..] {
        cleaned.push(line.get(indent..).unwrap_or("").trim_end().to_string());
    }
    while cleaned.first().map(|l| l.is_empty()).unwrap_or(false) {
        cleaned.remove(0);
    }
    while cleaned.last().map(|l| l.is_empty()).unwrap_or(false) {
        cleaned.pop();
    }
    cleaned.join("\n")
}
