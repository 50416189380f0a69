//! Renders the node graph as APIView tokens.

use std::path::{Component, Path};

use super::{render_lines, write_type, Token, TokenKind, TokenWriter};
use crate::config::Settings;
use crate::nodes::{
    param_id, return_type_id, ClassNode, EnumMemberNode, FunctionNode, KeyNode, ModuleNode, Node, NodeIndex,
    PropertyNode, VariableKind, VariableNode,
};
use crate::package::CrossLanguageMap;
use crate::python::{Decorator, Docstring, SourceSpan};
use crate::signature::ArgType;

/// Line ID of the document preamble.
pub const GLOBAL_ID: &str = "GLOBAL";

const GENERATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct Emitter<'a> {
    settings: &'a Settings,
    nodes: &'a NodeIndex,
    mapping: Option<&'a CrossLanguageMap>,
    source_url: Option<&'a str>,
    source_root: Option<&'a Path>,
    w: TokenWriter,
}

impl<'a> Emitter<'a> {
    pub fn new(settings: &'a Settings, nodes: &'a NodeIndex) -> Self {
        Self {
            settings,
            nodes,
            mapping: None,
            source_url: None,
            source_root: None,
            w: TokenWriter::new(),
        }
    }

    pub fn with_mapping(mut self, mapping: Option<&'a CrossLanguageMap>) -> Self {
        self.mapping = mapping;
        self
    }

    /// Link class and function lines to `url`; paths are made relative to `root`.
    pub fn with_source_url(mut self, url: Option<&'a str>, root: &'a Path) -> Self {
        self.source_url = url;
        self.source_root = Some(root);
        self
    }

    pub fn emit(mut self, modules: &[ModuleNode]) -> Vec<Token> {
        self.preamble();
        for module in modules {
            self.module(module);
        }
        self.w.into_tokens()
    }

    fn cross(&self, id: &str) -> Option<&'a str> {
        self.mapping.and_then(|m| m.lookup(id))
    }

    fn begin(&mut self, id: &str) {
        let cross = self.cross(id);
        self.w.begin_line(Some(id), cross);
    }

    fn begin_function(&mut self, function: &FunctionNode) {
        let cross = match (&function.overload_of, self.mapping) {
            (Some(implementation), Some(m)) => m.lookup_overload(&function.id, implementation),
            _ => self.cross(&function.id),
        };
        self.w.begin_line(Some(&function.id), cross);
    }

    fn preamble(&mut self) {
        self.w.push(TokenKind::SkipDiffRangeStart, "");
        self.w.begin_line(Some(GLOBAL_ID), None);
        self.w
            .comment(&format!("# Package is parsed using apistub(version:{})", GENERATOR_VERSION));
        self.w.newline();
        if let Some(url) = self.source_url {
            self.w.begin_line(None, None);
            self.w.comment(&format!("# Source URL: {}", url));
            self.w.newline();
        }
        self.w.push(TokenKind::SkipDiffRangeEnd, "");
        self.w.newline();
    }

    fn module(&mut self, module: &ModuleNode) {
        self.begin(&module.name);
        self.w.keyword("namespace");
        self.w.space();
        self.w.text(&module.name);
        self.w.newline();
        self.w.indent();
        if let Some(doc) = &module.docstring {
            self.docstring(doc);
        }
        self.children(&module.children, Some(&module.name));
        self.w.dedent();
        self.w.newline();
    }

    /// `module` is set for module-level children, whose functions display
    /// qualified names.
    fn children(&mut self, children: &[Node], module: Option<&str>) {
        let mut first = true;
        for node in children.iter().filter(|n| !n.is_hidden()) {
            if first || matches!(node, Node::Class(_) | Node::Function(_)) {
                self.w.newline();
            }
            first = false;
            match node {
                Node::Class(c) => self.class(c),
                Node::Function(f) => self.function(f, module),
                Node::Property(p) => self.property(p),
                Node::Variable(v) => self.variable(v),
                Node::EnumMember(e) => self.enum_member(e),
                Node::Key(k) => self.key(k),
            }
        }
    }

    fn decorators(&mut self, decorators: &[Decorator]) {
        for decorator in decorators {
            self.w.begin_line(None, None);
            let text = format!("@{}", decorator.text);
            if decorator.is_simple {
                self.w.keyword(&text);
            } else {
                self.w.push(TokenKind::Literal, text);
            }
            self.w.newline();
        }
    }

    fn class(&mut self, class: &ClassNode) {
        self.decorators(&class.decorators);
        self.begin(&class.id);
        self.w.keyword("class");
        self.w.space();
        self.w.type_name(&class.id, None);
        if !class.bases.is_empty() {
            self.w.punct("(");
            for (i, base) in class.bases.iter().enumerate() {
                if i > 0 {
                    self.w.punct(",");
                    self.w.space();
                }
                write_type(&mut self.w, base, self.nodes);
            }
            self.w.punct(")");
        }
        self.w.punct(":");
        if !class.implements.is_empty() {
            self.w.space();
            self.w.keyword("implements");
            self.w.space();
            for (i, capability) in class.implements.iter().enumerate() {
                if i > 0 {
                    self.w.punct(",");
                    self.w.space();
                }
                self.w.type_name(capability, None);
            }
        }
        self.source_link(&class.span);
        self.w.newline();

        self.w.indent();
        if let Some(doc) = &class.docstring {
            self.docstring(doc);
        }
        self.children(&class.children, None);
        self.w.dedent();
    }

    fn function(&mut self, function: &FunctionNode, module: Option<&str>) {
        self.decorators(&function.signature.decorators);

        let display = match module {
            Some(m) => format!("{}.{}", m, function.name),
            None => function.name.clone(),
        };

        let mut single = TokenWriter::new();
        self.signature_line(&mut single, function, &display);
        let width = self.w.indent_level() * 4 + render_lines(&single.into_tokens()).concat().len();

        let args = function.signature.args.iter().filter(|a| !a.is_separator()).count();
        let too_many = self.settings.max_inline_args().is_some_and(|limit| args > limit);

        if width <= self.settings.max_signature_width() && !too_many {
            self.begin_function(function);
            let mut line = std::mem::take(&mut self.w);
            self.signature_line(&mut line, function, &display);
            self.w = line;
            if module.is_some() {
                self.source_link(&function.span);
            }
            self.w.newline();
        } else {
            self.wrapped_signature(function, &display, module.is_some());
        }

        if let Some(doc) = &function.docstring {
            self.w.indent();
            self.docstring(doc);
            self.w.dedent();
        }
    }

    /// Head, arguments and return type on one line, into `w`.
    fn signature_line(&self, w: &mut TokenWriter, function: &FunctionNode, display: &str) {
        self.signature_head(w, function, display);
        for (i, arg) in function.signature.args.iter().enumerate() {
            if i > 0 {
                w.punct(",");
                w.space();
            }
            if !arg.is_separator() {
                let id = param_id(&function.id, &arg.name);
                w.marker(&id, self.cross(&id));
            }
            self.arg(w, arg);
        }
        self.signature_tail(w, function);
    }

    fn wrapped_signature(&mut self, function: &FunctionNode, display: &str, link: bool) {
        self.begin_function(function);
        let mut w = std::mem::take(&mut self.w);
        self.signature_head(&mut w, function, display);
        self.w = w;
        if link {
            self.source_link(&function.span);
        }
        self.w.newline();

        self.w.indent();
        let count = function.signature.args.len();
        for (i, arg) in function.signature.args.iter().enumerate() {
            if arg.is_separator() {
                self.w.begin_line(None, None);
            } else {
                self.begin(&param_id(&function.id, &arg.name));
            }
            let mut w = std::mem::take(&mut self.w);
            self.arg(&mut w, arg);
            self.w = w;
            if i + 1 < count {
                self.w.punct(",");
            }
            self.w.newline();
        }
        self.w.dedent();

        self.begin(&return_type_id(&function.id));
        let mut w = std::mem::take(&mut self.w);
        self.signature_tail(&mut w, function);
        self.w = w;
        self.w.newline();
    }

    fn signature_head(&self, w: &mut TokenWriter, function: &FunctionNode, display: &str) {
        if function.signature.is_async {
            w.keyword("async");
            w.space();
        }
        w.keyword("def");
        w.space();
        w.member(display);
        w.punct("(");
    }

    fn signature_tail(&self, w: &mut TokenWriter, function: &FunctionNode) {
        w.punct(")");
        if let Some(ret) = &function.signature.return_type {
            w.space();
            w.punct("->");
            w.space();
            write_type(w, ret, self.nodes);
        }
    }

    fn arg(&self, w: &mut TokenWriter, arg: &ArgType) {
        if arg.is_separator() {
            w.punct(&arg.name);
            return;
        }
        w.text(&arg.display_name());
        if let Some(t) = &arg.type_name {
            w.punct(":");
            w.space();
            write_type(w, t, self.nodes);
        }
        if let Some(default) = &arg.default {
            w.space();
            w.punct("=");
            w.space();
            w.value(&default.rendered());
        }
    }

    fn property(&mut self, property: &PropertyNode) {
        self.begin(&property.id);
        self.w.keyword("property");
        self.w.space();
        self.w.member(&property.name);
        self.annotation(property.type_name.as_deref());
        if property.read_only {
            self.w.push(TokenKind::Whitespace, "    ");
            self.w.comment("# Read-only");
        }
        self.w.newline();
    }

    fn variable(&mut self, variable: &VariableNode) {
        self.begin(&variable.id);
        match variable.kind {
            VariableKind::Module => {}
            VariableKind::Class => {
                self.w.keyword("cvar");
                self.w.space();
            }
            VariableKind::Instance => {
                self.w.keyword("ivar");
                self.w.space();
            }
        }
        self.w.member(&variable.name);
        self.annotation(variable.type_name.as_deref());
        if let Some(value) = &variable.value {
            self.assigned(value);
        }
        self.w.newline();
    }

    fn enum_member(&mut self, member: &EnumMemberNode) {
        self.begin(&member.id);
        self.w.member(&member.name);
        self.assigned(&member.value);
        self.w.newline();
    }

    fn key(&mut self, key: &KeyNode) {
        self.begin(&key.id);
        self.w.keyword("key");
        self.w.space();
        self.w.push(TokenKind::StringLiteral, format!("\"{}\"", key.name));
        self.annotation(key.type_name.as_deref());
        self.w.newline();
    }

    fn annotation(&mut self, type_name: Option<&str>) {
        if let Some(t) = type_name {
            self.w.punct(":");
            self.w.space();
            write_type(&mut self.w, t, self.nodes);
        }
    }

    fn assigned(&mut self, value: &str) {
        self.w.space();
        self.w.punct("=");
        self.w.space();
        self.w.value(value);
    }

    fn docstring(&mut self, doc: &Docstring) {
        if !self.settings.emit_docstrings() {
            return;
        }
        let lines: Vec<&str> = doc.text.lines().map(str::trim).collect();
        let start = lines.iter().position(|l| !l.is_empty()).unwrap_or(lines.len());
        let end = lines.iter().rposition(|l| !l.is_empty()).map(|i| i + 1).unwrap_or(start);
        if start >= end {
            return;
        }
        self.w.push(TokenKind::DocumentRangeStart, "");
        for line in &lines[start..end] {
            self.w.begin_line(None, None);
            if line.is_empty() {
                self.w.comment("#");
            } else {
                self.w.comment(&format!("# {}", line));
            }
            self.w.newline();
        }
        self.w.push(TokenKind::DocumentRangeEnd, "");
    }

    fn source_link(&mut self, span: &SourceSpan) {
        let Some(url) = self.source_url else {
            return;
        };
        let path = match self.source_root {
            Some(root) => span.file.strip_prefix(root).unwrap_or(&span.file),
            None => span.file.as_path(),
        };
        let rel: Vec<String> = path
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        self.w.space();
        self.w.skip_diff_comment(&format!(
            "# {}/{}#L{}",
            url.trim_end_matches('/'),
            rel.join("/"),
            span.start_line
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::GraphBuilder;
    use crate::python::{PackageIndex, PythonParser};
    use crate::tokens::line_ids;

    fn emit_with(code: &str, settings: &Settings, mapping: Option<&CrossLanguageMap>) -> Vec<Token> {
        let parser = PythonParser::new().unwrap();
        let parsed = parser.parse(Path::new("pkg/__init__.py"), code.as_bytes().to_vec()).unwrap();
        let index = PackageIndex::from_modules("pkg", vec![parser.extract(&parsed, "pkg", true)]);
        let modules = GraphBuilder::new(&index, settings).build(&["pkg".to_string()]);
        let nodes = NodeIndex::build(&modules);
        Emitter::new(settings, &nodes).with_mapping(mapping).emit(&modules)
    }

    fn emit(code: &str) -> Vec<Token> {
        emit_with(code, &Settings::default(), None)
    }

    fn has_line(tokens: &[Token], text: &str) -> bool {
        render_lines(tokens).iter().any(|l| l.trim() == text)
    }

    #[test]
    fn test_simple_class_lines_and_markers() {
        let tokens = emit("class Foo:\n    def bar(self, x: int, *, y: str = \"k\") -> None: ...\n");
        assert!(has_line(&tokens, "class pkg.Foo:"));
        assert!(has_line(&tokens, "def bar(self, x: int, *, y: str = \"k\") -> None"));
        let ids = line_ids(&tokens);
        for id in ["GLOBAL", "pkg", "pkg.Foo", "pkg.Foo.bar", "pkg.Foo.bar.param(x)", "pkg.Foo.bar.param(y)"] {
            assert!(ids.contains(&id), "missing {}", id);
        }
        assert!(!ids.iter().any(|id| id.ends_with("param(*)")));
    }

    #[test]
    fn test_preamble_is_skip_diffed() {
        let tokens = emit("X: int = 1\n");
        assert_eq!(tokens[0].kind, TokenKind::SkipDiffRangeStart);
        assert_eq!(tokens[1].definition_id.as_deref(), Some(GLOBAL_ID));
        assert!(render_lines(&tokens)[0].starts_with("# Package is parsed using apistub(version:"));
        assert!(has_line(&tokens, "namespace pkg"));
        assert!(has_line(&tokens, "X: int = 1"));
    }

    #[test]
    fn test_module_function_is_qualified() {
        let tokens = emit("async def fetch(url: str) -> bytes: ...\n");
        assert!(has_line(&tokens, "async def pkg.fetch(url: str) -> bytes"));
        assert!(line_ids(&tokens).contains(&"pkg.fetch:async"));
    }

    #[test]
    fn test_long_signature_wraps_one_arg_per_line() {
        let tokens = emit(
            "def configure(first_argument_name: str, second_argument_name: int, third_argument_name: bool = False) -> None: ...\n",
        );
        let lines = render_lines(&tokens);
        assert!(lines.iter().any(|l| l == "    def pkg.configure("));
        assert!(lines.iter().any(|l| l == "        first_argument_name: str,"));
        assert!(lines.iter().any(|l| l == "        third_argument_name: bool = False"));
        assert!(lines.iter().any(|l| l == "    ) -> None"));
        assert!(line_ids(&tokens).contains(&"pkg.configure.returntype"));
    }

    #[test]
    fn test_argument_count_limit_wraps_short_signatures() {
        let code = "def f(a: int, *, b: int = 1, c: str = \"x\") -> None: ...\n";
        assert!(has_line(&emit(code), "def pkg.f(a: int, *, b: int = 1, c: str = \"x\") -> None"));

        let mut settings = Settings::default();
        settings.render.max_inline_args = Some(2);
        let tokens = emit_with(code, &settings, None);
        let lines = render_lines(&tokens);
        assert!(lines.iter().any(|l| l == "    def pkg.f("));
        assert!(lines.iter().any(|l| l == "        a: int,"));
        assert!(lines.iter().any(|l| l == "    ) -> None"));

        let tokens = emit_with("def g(a: int, b: int) -> None: ...\n", &settings, None);
        assert!(has_line(&tokens, "def pkg.g(a: int, b: int) -> None"));
    }

    #[test]
    fn test_members_render() {
        let tokens = emit(
            "from enum import Enum\n\nclass Color(str, Enum):\n    RED = \"r\"\n    GREEN = \"g\"\n\nclass Box:\n    size: int\n    LIMIT = 3\n    @property\n    def name(self) -> str: ...\n",
        );
        assert!(has_line(&tokens, "class pkg.Color(str, Enum):"));
        assert!(has_line(&tokens, "RED = \"r\""));
        assert!(has_line(&tokens, "property name: str    # Read-only"));
        assert!(has_line(&tokens, "cvar LIMIT: int = 3"));
        assert!(has_line(&tokens, "ivar size: int"));
        let ids = line_ids(&tokens);
        assert!(ids.contains(&"pkg.Color.RED"));
        assert!(ids.contains(&"pkg.Color.GREEN"));
    }

    #[test]
    fn test_overload_decorators_precede_rows() {
        let tokens = emit(
            "from typing import overload\n\nclass C:\n    @overload\n    def f(self, a: int) -> int: ...\n    @overload\n    def f(self, a: str) -> str: ...\n    def f(self, a): ...\n",
        );
        let lines: Vec<String> = render_lines(&tokens)
            .into_iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        let first = lines.iter().position(|l| l == "@overload").unwrap();
        assert!(lines[first + 1].starts_with("def f(self, a: int)"));
        assert_eq!(lines[first + 2], "@overload");
        assert!(lines[first + 3].starts_with("def f(self, a: str)"));
        assert!(lines[first + 4].starts_with("def f(self, a)"));
    }

    #[test]
    fn test_internal_type_navigates() {
        let tokens = emit("class Widget: ...\n\ndef make() -> Widget: ...\n");
        let link = tokens
            .iter()
            .find(|t| t.kind == TokenKind::TypeName && t.value == "Widget")
            .unwrap();
        assert_eq!(link.navigate_to_id.as_deref(), Some("pkg.Widget"));
    }

    #[test]
    fn test_cross_language_ids_on_markers() {
        let mapping = CrossLanguageMap::from_json(r#"{"pkg.C.f": "Pkg.C.f", "pkg.C": "Pkg.C"}"#).unwrap();
        let tokens = emit_with(
            "from typing import overload\n\nclass C:\n    @overload\n    def f(self, a: int) -> int: ...\n    def f(self, a): ...\n",
            &Settings::default(),
            Some(&mapping),
        );
        let cross = |id: &str| {
            tokens
                .iter()
                .find(|t| t.definition_id.as_deref() == Some(id))
                .and_then(|t| t.cross_language_id.clone())
        };
        assert_eq!(cross("pkg.C").as_deref(), Some("Pkg.C"));
        assert_eq!(cross("pkg.C.f").as_deref(), Some("Pkg.C.f"));
        assert_eq!(cross("pkg.C.f_1").as_deref(), Some("Pkg.C.f"));
    }

    #[test]
    fn test_numbered_method_names_do_not_borrow_cross_ids() {
        let mapping = CrossLanguageMap::from_json(r#"{"pkg.C.get": "Pkg.C.get"}"#).unwrap();
        let tokens = emit_with(
            "class C:\n    def get(self) -> None: ...\n    def get_2(self) -> None: ...\n",
            &Settings::default(),
            Some(&mapping),
        );
        let cross = |id: &str| {
            tokens
                .iter()
                .find(|t| t.definition_id.as_deref() == Some(id))
                .and_then(|t| t.cross_language_id.clone())
        };
        assert_eq!(cross("pkg.C.get").as_deref(), Some("Pkg.C.get"));
        assert!(tokens.iter().any(|t| t.definition_id.as_deref() == Some("pkg.C.get_2")));
        assert_eq!(cross("pkg.C.get_2"), None);
    }

    #[test]
    fn test_docstrings_only_when_enabled() {
        let code = "def f() -> None:\n    \"\"\"Does a thing.\"\"\"\n";
        assert!(!has_line(&emit(code), "# Does a thing."));

        let mut settings = Settings::default();
        settings.render.emit_docstrings = Some(true);
        let tokens = emit_with(code, &settings, None);
        assert!(has_line(&tokens, "# Does a thing."));
        assert!(tokens.iter().any(|t| t.kind == TokenKind::DocumentRangeStart));
    }
}
