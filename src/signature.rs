//! Canonical signatures.
//!
//! A callable's signature is assembled from three sources that often
//! disagree: the parsed parameter list (kinds, defaults, annotations), a
//! `# type:` comment, and the docstring. Annotations win, then type comments,
//! then docstring declarations.

use crate::docstring::{self, ParsedDocstring};
use crate::python::{string_literal, Decorator, ExprKind, FunctionDef, Param, ParamKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ArgKind {
    PositionalOnly,
    PositionalOrKeyword,
    VarPositional,
    KeywordOnly,
    VarKeyword,
    /// `*` or `/`. Purely presentational.
    Separator,
}

impl From<ParamKind> for ArgKind {
    fn from(kind: ParamKind) -> Self {
        match kind {
            ParamKind::PositionalOnly => ArgKind::PositionalOnly,
            ParamKind::PositionalOrKeyword => ArgKind::PositionalOrKeyword,
            ParamKind::VarPositional => ArgKind::VarPositional,
            ParamKind::KeywordOnly => ArgKind::KeywordOnly,
            ParamKind::VarKeyword => ArgKind::VarKeyword,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultValue {
    /// A string literal in display form, prefix and quotes included.
    Str(String),
    Literal(String),
}

impl DefaultValue {
    pub fn ellipsis() -> Self {
        DefaultValue::Literal("...".to_string())
    }

    pub fn rendered(&self) -> String {
        match self {
            DefaultValue::Str(s) | DefaultValue::Literal(s) => s.clone(),
        }
    }

    fn from_doc(text: &str) -> Self {
        let t = text.trim();
        let quoted = t.len() >= 2
            && ((t.starts_with('"') && t.ends_with('"')) || (t.starts_with('\'') && t.ends_with('\'')));
        if quoted {
            DefaultValue::Str(string_literal(t))
        } else {
            DefaultValue::Literal(t.to_string())
        }
    }
}

/// One formal parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgType {
    pub name: String,
    pub type_name: Option<String>,
    pub default: Option<DefaultValue>,
    pub kind: ArgKind,
}

impl ArgType {
    pub fn separator(symbol: &str) -> Self {
        Self {
            name: symbol.to_string(),
            type_name: None,
            default: None,
            kind: ArgKind::Separator,
        }
    }

    pub fn is_separator(&self) -> bool {
        self.kind == ArgKind::Separator
    }

    /// Name as written in a signature: `*args`, `**kwargs`, `x`.
    pub fn display_name(&self) -> String {
        match self.kind {
            ArgKind::VarPositional => format!("*{}", self.name),
            ArgKind::VarKeyword => format!("**{}", self.name),
            _ => self.name.clone(),
        }
    }

    /// `self` / `cls` receivers.
    pub fn is_receiver(&self) -> bool {
        matches!(self.name.as_str(), "self" | "cls")
    }
}

/// Where a return type came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeSource {
    Annotation,
    TypeComment,
    Docstring,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Signature {
    pub args: Vec<ArgType>,
    pub return_type: Option<String>,
    /// Decorators shown above the `def` line.
    pub decorators: Vec<Decorator>,
    pub is_async: bool,
    pub is_class_bound: bool,
    pub is_static: bool,
    pub is_overload: bool,
    /// Absorbed into an `implements` capability.
    pub hidden: bool,
    pub return_source: Option<TypeSource>,
    /// Return type from annotation or type comment.
    pub hinted_return: Option<String>,
    /// Return type from the docstring `:rtype:`.
    pub documented_return: Option<String>,
}

impl Signature {
    pub fn has_var_keyword(&self) -> bool {
        self.args.iter().any(|a| a.kind == ArgKind::VarKeyword)
    }

    pub fn arg(&self, name: &str) -> Option<&ArgType> {
        self.args.iter().find(|a| !a.is_separator() && a.name == name)
    }

    /// Apply `f` to every type string (arguments and return).
    pub fn map_types(&mut self, mut f: impl FnMut(&str) -> String) {
        for arg in self.args.iter_mut() {
            if let Some(t) = arg.type_name.as_mut() {
                *t = f(t);
            }
        }
        if let Some(r) = self.return_type.as_mut() {
            *r = f(r);
        }
    }
}

/// Resolve a function's canonical signature.
///
/// `fallback_doc` is consulted when the function has no docstring of its own
/// (a class docstring for `__init__`).
pub fn resolve(def: &FunctionDef, is_method: bool, fallback_doc: Option<&str>) -> Signature {
    let doc_text = def
        .docstring
        .as_ref()
        .map(|d| d.text.as_str())
        .or(fallback_doc)
        .unwrap_or("");
    let doc = docstring::parse(doc_text);

    let is_class_bound = def.has_decorator("classmethod");
    let is_static = def.has_decorator("staticmethod");
    let comment_types = type_comment_types(def, is_method && !is_static);

    let mut collected: Vec<ArgType> = def
        .params
        .iter()
        .enumerate()
        .map(|(i, p)| build_arg(p, comment_types.get(i).cloned().flatten(), &doc))
        .collect();

    if is_class_bound && collected.first().map(|a| a.name != "cls").unwrap_or(true) {
        collected.insert(
            0,
            ArgType {
                name: "cls".to_string(),
                type_name: None,
                default: None,
                kind: ArgKind::PositionalOrKeyword,
            },
        );
    }

    if collected.iter().any(|a| a.kind == ArgKind::VarKeyword) {
        for kw in &doc.kw_args {
            if collected.iter().any(|a| a.name == kw.name) {
                continue;
            }
            collected.push(ArgType {
                name: kw.name.clone(),
                type_name: kw.type_name.clone(),
                default: Some(DefaultValue::ellipsis()),
                kind: ArgKind::KeywordOnly,
            });
        }
    }

    let (hinted_return, annotation_source) = match (&def.returns, &def.type_comment) {
        (Some(r), _) => (Some(r.clone()), Some(TypeSource::Annotation)),
        (None, Some(tc)) => (Some(tc.returns.clone()), Some(TypeSource::TypeComment)),
        (None, None) => (None, None),
    };
    let documented_return = doc.ret_type.clone();
    let (return_type, return_source) = match (&hinted_return, &documented_return) {
        (Some(h), _) => (Some(h.clone()), annotation_source),
        (None, Some(d)) => (Some(d.clone()), Some(TypeSource::Docstring)),
        (None, None) => (None, None),
    };

    Signature {
        args: canonical_order(collected),
        return_type,
        decorators: def
            .decorators
            .iter()
            .filter(|d| !d.is("property") && !d.is("cached_property"))
            .cloned()
            .collect(),
        is_async: def.is_async,
        is_class_bound,
        is_static,
        is_overload: def.is_overload(),
        hidden: false,
        return_source,
        hinted_return,
        documented_return,
    }
}

/// Types from a `# type:` comment, aligned with the parameter list.
fn type_comment_types(def: &FunctionDef, skip_receiver: bool) -> Vec<Option<String>> {
    let Some(tc) = &def.type_comment else {
        return Vec::new();
    };
    let mut types: Vec<Option<String>> = Vec::with_capacity(def.params.len());
    let offset = if skip_receiver && tc.args.len() < def.params.len() {
        types.push(None);
        1
    } else {
        0
    };
    for i in offset..def.params.len() {
        types.push(tc.args.get(i - offset).cloned());
    }
    types
}

fn build_arg(param: &Param, comment_type: Option<String>, doc: &ParsedDocstring) -> ArgType {
    let kind = ArgKind::from(param.kind);
    let doc_type = match kind {
        ArgKind::KeywordOnly => doc
            .kw_arg(&param.name)
            .and_then(|a| a.type_name.clone())
            .or_else(|| doc.type_of(&param.name).map(str::to_string)),
        _ => doc.type_of(&param.name).map(str::to_string),
    };
    let type_name = param
        .annotation
        .clone()
        .filter(|a| !a.is_empty())
        .or(comment_type)
        .or(doc_type);

    let default = match &param.default {
        Some(expr) if kind == ArgKind::KeywordOnly && expr.kind == ExprKind::None => Some(DefaultValue::ellipsis()),
        Some(expr) => Some(match &expr.kind {
            ExprKind::Str(_) => DefaultValue::Str(string_literal(&expr.text)),
            _ => DefaultValue::Literal(expr.text.clone()),
        }),
        None if matches!(kind, ArgKind::VarPositional | ArgKind::VarKeyword) => None,
        None => doc
            .pos_arg(&param.name)
            .or_else(|| doc.kw_arg(&param.name))
            .and_then(|a| a.default.as_deref())
            .map(DefaultValue::from_doc),
    };

    ArgType {
        name: param.name.clone(),
        type_name,
        default,
        kind,
    }
}

/// positional-only, `/`, positional, `*args` or `*`, sorted keyword-only, `**kwargs`.
fn canonical_order(args: Vec<ArgType>) -> Vec<ArgType> {
    let take = |kind: ArgKind| -> Vec<ArgType> { args.iter().filter(|a| a.kind == kind).cloned().collect() };
    let positional_only = take(ArgKind::PositionalOnly);
    let positional = take(ArgKind::PositionalOrKeyword);
    let var_positional = take(ArgKind::VarPositional);
    let mut keyword_only = take(ArgKind::KeywordOnly);
    let var_keyword = take(ArgKind::VarKeyword);
    keyword_only.sort_by(|a, b| a.name.cmp(&b.name));

    let mut ordered = Vec::with_capacity(args.len() + 2);
    let has_positional_only = !positional_only.is_empty();
    ordered.extend(positional_only);
    if has_positional_only {
        ordered.push(ArgType::separator("/"));
    }
    ordered.extend(positional);
    if var_positional.is_empty() && !keyword_only.is_empty() {
        ordered.push(ArgType::separator("*"));
    }
    ordered.extend(var_positional);
    ordered.extend(keyword_only);
    ordered.extend(var_keyword);
    ordered
}
