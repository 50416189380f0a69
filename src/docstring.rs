//! Docstring field-list parsing.
//!
//! Handles the reStructuredText field dialect used by the Azure SDK:
//! `:param:`, `:type:`, `:keyword:`, `:paramtype:`, `:ivar:`, `:vartype:`,
//! `:cvar:`, `:rtype:` and `:return:`. Fields are picked out with regular
//! expressions; anything else in the docstring is ignored.

use lazy_static::lazy_static;
use regex::Regex;

use crate::python::{normalize_expr, split_top_level};

lazy_static! {
    static ref FIELD: Regex = Regex::new(r"^(\s*):([A-Za-z_]+)([^:]*):(.*)$").unwrap();
    static ref ROLE: Regex =
        Regex::new(r":(?:py:)?(?:class|obj|data|func|meth|exc|attr|mod|ref):").unwrap();
    static ref OPTIONAL_SUFFIX: Regex = Regex::new(r",\s*optional$").unwrap();
    static ref DEFAULT: Regex =
        Regex::new(r"(?i)\bdefault(?:s to| value is| is)\s*:?\s*(\S.*?)\.?\s*$").unwrap();
}

/// An argument documented in the docstring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocArg {
    pub name: String,
    pub type_name: Option<String>,
    pub default: Option<String>,
    /// Line offset of the field inside the docstring.
    pub offset: usize,
}

/// A documented class or instance variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocVar {
    pub name: String,
    pub type_name: Option<String>,
    pub is_class_var: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDocstring {
    pub pos_args: Vec<DocArg>,
    pub kw_args: Vec<DocArg>,
    pub vars: Vec<DocVar>,
    pub ret_type: Option<String>,
    pub returns: Option<String>,
}

impl ParsedDocstring {
    pub fn pos_arg(&self, name: &str) -> Option<&DocArg> {
        self.pos_args.iter().find(|a| a.name == name)
    }

    pub fn kw_arg(&self, name: &str) -> Option<&DocArg> {
        self.kw_args.iter().find(|a| a.name == name)
    }

    /// Type declared for an argument through any of the field forms.
    pub fn type_of(&self, name: &str) -> Option<&str> {
        self.pos_arg(name)
            .and_then(|a| a.type_name.as_deref())
            .or_else(|| self.kw_arg(name).and_then(|a| a.type_name.as_deref()))
    }
}

/// One field with its continuation lines folded in.
struct Field {
    tag: String,
    args: String,
    value: String,
    offset: usize,
}

fn fields(docstring: &str) -> Vec<Field> {
    let mut out: Vec<Field> = Vec::new();
    let mut indent_of_current: Option<usize> = None;

    for (offset, line) in docstring.lines().enumerate() {
        if let Some(caps) = FIELD.captures(line) {
            indent_of_current = Some(caps[1].len());
            out.push(Field {
                tag: caps[2].to_lowercase(),
                args: caps[3].trim().to_string(),
                value: caps[4].trim().to_string(),
                offset,
            });
            continue;
        }
        let indent = line.len() - line.trim_start().len();
        match (indent_of_current, out.last_mut()) {
            (Some(field_indent), Some(field)) if !line.trim().is_empty() && indent > field_indent => {
                if !field.value.is_empty() {
                    field.value.push(' ');
                }
                field.value.push_str(line.trim());
            }
            _ => indent_of_current = None,
        }
    }
    out
}

/// Split `T name` into type and name; a single word is just the name.
fn type_and_name(args: &str) -> (Option<String>, String) {
    match args.rsplit_once(char::is_whitespace) {
        Some((type_part, name)) => (Some(canonical_type(type_part)), name.trim().to_string()),
        None => (None, args.to_string()),
    }
}

fn find_or_push<'a>(list: &'a mut Vec<DocArg>, name: &str, offset: usize) -> &'a mut DocArg {
    let idx = match list.iter().position(|a| a.name == name) {
        Some(idx) => idx,
        None => {
            list.push(DocArg {
                name: name.to_string(),
                type_name: None,
                default: None,
                offset,
            });
            list.len() - 1
        }
    };
    &mut list[idx]
}

fn default_from(description: &str) -> Option<String> {
    DEFAULT.captures(description).map(|c| c[1].trim().to_string())
}

/// Parse a (cleaned) docstring.
pub fn parse(docstring: &str) -> ParsedDocstring {
    let mut parsed = ParsedDocstring::default();

    for field in fields(docstring) {
        match field.tag.as_str() {
            "param" | "parameter" | "arg" | "argument" | "keyword" | "kwarg" | "kwparam" => {
                if field.args.is_empty() {
                    continue;
                }
                let (type_name, name) = type_and_name(&field.args);
                let list = if matches!(field.tag.as_str(), "keyword" | "kwarg" | "kwparam") {
                    &mut parsed.kw_args
                } else {
                    &mut parsed.pos_args
                };
                let arg = find_or_push(list, &name, field.offset);
                if type_name.is_some() {
                    arg.type_name = type_name;
                }
                if let Some(default) = default_from(&field.value) {
                    arg.default = Some(default);
                }
            }
            "type" | "paramtype" | "keywordtype" | "kwtype" => {
                if field.args.is_empty() || field.value.is_empty() {
                    continue;
                }
                let list = if field.tag == "type" {
                    &mut parsed.pos_args
                } else {
                    &mut parsed.kw_args
                };
                let arg = find_or_push(list, &field.args, field.offset);
                arg.type_name = Some(canonical_type(&field.value));
            }
            "ivar" | "cvar" => {
                if field.args.is_empty() {
                    continue;
                }
                let (type_name, name) = type_and_name(&field.args);
                let is_class_var = field.tag == "cvar";
                match parsed.vars.iter_mut().find(|v| v.name == name) {
                    Some(var) => {
                        var.is_class_var = is_class_var;
                        if type_name.is_some() {
                            var.type_name = type_name;
                        }
                    }
                    None => parsed.vars.push(DocVar {
                        name,
                        type_name,
                        is_class_var,
                    }),
                }
            }
            "vartype" => {
                if field.args.is_empty() || field.value.is_empty() {
                    continue;
                }
                let type_name = Some(canonical_type(&field.value));
                match parsed.vars.iter_mut().find(|v| v.name == field.args) {
                    Some(var) => var.type_name = type_name,
                    None => parsed.vars.push(DocVar {
                        name: field.args.clone(),
                        type_name,
                        is_class_var: false,
                    }),
                }
            }
            "rtype" => {
                if !field.value.is_empty() {
                    parsed.ret_type = Some(canonical_type(&field.value));
                }
            }
            "return" | "returns" => {
                if !field.value.is_empty() {
                    parsed.returns = Some(field.value.clone());
                }
            }
            _ => {}
        }
    }
    parsed
}

/// Normalize a documented type: drop RST roles, fold whitespace and turn
/// `A or B` into `Union[A, B]`.
pub fn canonical_type(raw: &str) -> String {
    let without_roles = ROLE.replace_all(raw, "");
    let cleaned = without_roles.replace('`', "");
    let folded = normalize_expr(&cleaned);
    let trimmed = OPTIONAL_SUFFIX.replace(&folded, "");
    union_of(trimmed.trim())
}

/// `A or B or C` -> `Union[A, B, C]`; only splits outside brackets.
pub fn union_of(text: &str) -> String {
    let parts: Vec<String> = split_top_level(&text.replace(" or ", "\u{0}"), '\u{0}')
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() > 1 {
        format!("Union[{}]", parts.join(", "))
    } else {
        text.replace('\u{0}', " or ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separate_and_combined_forms() {
        let doc = parse(
            ":param name: The name.\n:type name: str\n:param int age: The age.\n:rtype: None",
        );
        assert_eq!(doc.type_of("name"), Some("str"));
        assert_eq!(doc.type_of("age"), Some("int"));
        assert_eq!(doc.ret_type.as_deref(), Some("None"));
    }

    #[test]
    fn test_union_canonicalization() {
        let doc = parse(":param value: The value.\n:type value: str or int or None");
        assert_eq!(doc.type_of("value"), Some("Union[str, int, None]"));
        assert_eq!(union_of("Dict[str, int or str]"), "Dict[str, int or str]");
    }

    #[test]
    fn test_generics_are_preserved() {
        let doc = parse(":param Dict[str, List[int]] mapping: Lookup table.\n:type other: Dict[str, List[int]]");
        assert_eq!(doc.type_of("mapping"), Some("Dict[str, List[int]]"));
        assert_eq!(doc.type_of("other"), Some("Dict[str, List[int]]"));
    }

    #[test]
    fn test_keywords() {
        let doc = parse(
            "Connect.\n\n:keyword int port: The port.\n:keyword tls: Use TLS.\n:paramtype tls: bool\n:keyword str mode: Mode. Default value is \"fast\".",
        );
        let names: Vec<_> = doc.kw_args.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["port", "tls", "mode"]);
        assert_eq!(doc.kw_arg("port").unwrap().type_name.as_deref(), Some("int"));
        assert_eq!(doc.kw_arg("tls").unwrap().type_name.as_deref(), Some("bool"));
        assert_eq!(doc.kw_arg("mode").unwrap().default.as_deref(), Some("\"fast\""));
        assert_eq!(doc.kw_arg("tls").unwrap().offset, 3);
    }

    #[test]
    fn test_multiline_types_and_roles() {
        let doc = parse(
            ":rtype: ~azure.core.paging.ItemPaged[\n    ~azure.foo.models.Widget]\n:param client: The client.\n:type client: :class:`~azure.foo.FooClient`",
        );
        assert_eq!(
            doc.ret_type.as_deref(),
            Some("~azure.core.paging.ItemPaged[~azure.foo.models.Widget]")
        );
        assert_eq!(doc.type_of("client"), Some("~azure.foo.FooClient"));
    }

    #[test]
    fn test_variables() {
        let doc = parse(
            "A model.\n\n:ivar name: The name.\n:vartype name: str\n:cvar int LIMIT: Shared limit.\n:ivar str id: Identifier.",
        );
        assert_eq!(doc.vars.len(), 3);
        assert_eq!(doc.vars[0].type_name.as_deref(), Some("str"));
        assert!(!doc.vars[0].is_class_var);
        assert!(doc.vars[1].is_class_var);
        assert_eq!(doc.vars[1].type_name.as_deref(), Some("int"));
        assert_eq!(doc.vars[2].name, "id");
    }

    #[test]
    fn test_unknown_fields_and_prose_are_ignored() {
        let doc = parse("Does things.\n\n:seealso: other\n.. note:: prose\n:param: missing name");
        assert_eq!(doc, ParsedDocstring::default());
    }
}
