//! Class nodes: kind detection, member collection, canonical ordering and
//! capability absorption.

use std::collections::BTreeSet;

use phf::phf_set;

use super::builder::{render_value, sort_functions};
use super::{
    is_dunder, ClassNode, EnumMemberNode, FunctionNode, GraphBuilder, KeyNode, Node, PropertyNode, VariableKind,
    VariableNode,
};
use crate::docstring;
use crate::python::{ClassDef, DefinitionKind, FunctionDef, ModuleSource, Resolved};
use crate::signature;

static ENUM_BASES: phf::Set<&'static str> = phf_set! {
    "Enum",
    "IntEnum",
    "StrEnum",
    "Flag",
    "IntFlag",
};

/// Abstract capabilities and the methods a class must define to implement them.
pub const ABC_TABLE: &[(&str, &[&str])] = &[
    ("ContextManager", &["__enter__", "__exit__"]),
    ("AsyncContextManager", &["__aenter__", "__aexit__"]),
    ("Iterator", &["__next__", "__iter__"]),
    ("Collection", &["__contains__", "__iter__", "__len__"]),
    (
        "Mapping",
        &[
            "__getitem__",
            "__len__",
            "__eq__",
            "__ne__",
            "__contains__",
            "__iter__",
            "keys",
            "items",
            "values",
            "get",
        ],
    ),
    ("AsyncIterable", &["__anext__", "__aiter__"]),
    ("AsyncIterator", &["__anext__", "__aiter__"]),
    ("Awaitable", &["__await__"]),
];

/// Capabilities fully implemented by a set of method names, in table order.
pub fn capabilities_of(methods: &BTreeSet<&str>) -> Vec<(&'static str, &'static [&'static str])> {
    ABC_TABLE
        .iter()
        .filter(|(_, required)| required.iter().all(|m| methods.contains(m)))
        .copied()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Class,
    Enum,
    TypedDict,
}

impl ClassKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassKind::Class => "class",
            ClassKind::Enum => "enum",
            ClassKind::TypedDict => "class",
        }
    }
}

/// Last segment of a base expression, generics removed (`typing.Generic[T]` -> `Generic`).
fn short_base(base: &str) -> &str {
    let head = base.split('[').next().unwrap_or(base);
    head.rsplit('.').next().unwrap_or(head).trim()
}

/// Member buckets, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Bucket {
    Key,
    Property,
    ClassVariable,
    InstanceVariable,
    EnumMember,
    NestedClass,
    Dunder,
    ClassMethod,
    Method,
}

fn bucket(node: &Node) -> Bucket {
    match node {
        Node::Key(_) => Bucket::Key,
        Node::Property(_) => Bucket::Property,
        Node::Variable(v) if v.kind == VariableKind::Instance => Bucket::InstanceVariable,
        Node::Variable(_) => Bucket::ClassVariable,
        Node::EnumMember(_) => Bucket::EnumMember,
        Node::Class(_) => Bucket::NestedClass,
        Node::Function(f) if is_dunder(&f.name) => Bucket::Dunder,
        Node::Function(f) if f.signature.is_class_bound || f.signature.is_static => Bucket::ClassMethod,
        Node::Function(_) => Bucket::Method,
    }
}

/// Public class members: dunders are kept, `_private` names are not.
fn is_public_member(name: &str) -> bool {
    is_dunder(name) || !name.starts_with('_')
}

impl<'a> GraphBuilder<'a> {
    pub(super) fn build_class(&self, module: &'a ModuleSource, class: &'a ClassDef, id: String, exported: &str) -> ClassNode {
        let lineage = self.lineage(module, class);
        let kind = self.class_kind(&lineage);
        let class_doc = class.docstring.as_ref().map(|d| d.text.as_str());

        let mut children: Vec<Node> = Vec::new();
        let mut functions: Vec<FunctionNode> = Vec::new();
        let mut taken: BTreeSet<String> = BTreeSet::new();

        // Methods and properties, first definition along the lineage wins.
        for (owner_module, owner) in &lineage {
            if self.is_excluded_origin(&owner_module.name) {
                continue;
            }
            let mut names: Vec<&str> = Vec::new();
            for f in &owner.functions {
                if !names.contains(&f.name.as_str()) {
                    names.push(&f.name);
                }
            }
            for name in names {
                if !is_public_member(name) || taken.contains(name) {
                    continue;
                }
                let defs: Vec<&FunctionDef> = owner.functions.iter().filter(|f| f.name == name).collect();
                if let Some(getter) = defs.iter().find(|f| f.is_property()) {
                    taken.insert(name.to_string());
                    let sig = signature::resolve(getter, true, None);
                    children.push(Node::Property(PropertyNode {
                        name: name.to_string(),
                        id: format!("{}.{}", id, name),
                        type_name: sig.return_type.map(|t| self.canonical_type(&owner_module.name, &t)),
                        read_only: !owner.functions.iter().any(|f| f.is_setter_of(name)),
                        span: getter.span.clone(),
                    }));
                    continue;
                }
                let callable: Vec<&FunctionDef> = defs.into_iter().filter(|f| !f.is_accessor()).collect();
                if callable.is_empty() {
                    continue;
                }
                taken.insert(name.to_string());
                let fallback = if name == "__init__" { class_doc } else { None };
                functions.extend(self.function_group(&id, owner_module, &callable, name, true, fallback));
            }
        }

        // Capability absorption.
        let method_names: BTreeSet<&str> = functions.iter().map(|f| f.name.as_str()).collect();
        let capabilities = capabilities_of(&method_names);
        let absorbed: BTreeSet<&str> = capabilities.iter().flat_map(|(_, m)| m.iter().copied()).collect();
        for f in functions.iter_mut() {
            if absorbed.contains(f.name.as_str()) {
                f.signature.hidden = true;
            }
        }
        let implements: Vec<&'static str> = capabilities.iter().map(|(name, _)| *name).collect();

        match kind {
            ClassKind::Enum => self.enum_members(class, &id, &taken, &mut children),
            ClassKind::TypedDict => self.typed_dict_keys(&lineage, &id, &taken, &mut children),
            ClassKind::Class => self.variables(module, &lineage, &id, &taken, &mut children),
        }

        for nested in &class.classes {
            if is_public_member(&nested.name) && !is_dunder(&nested.name) && !taken.contains(&nested.name) {
                let nested_id = format!("{}.{}", id, nested.name);
                children.push(Node::Class(self.build_class(module, nested, nested_id, &nested.name)));
            }
        }

        sort_functions(&mut functions);
        children.extend(functions.into_iter().map(Node::Function));
        // Stable sort keeps overload order inside a name.
        children.sort_by(|a, b| (bucket(a), a.name()).cmp(&(bucket(b), b.name())));

        ClassNode {
            name: exported.to_string(),
            id,
            origin: format!("{}.{}", module.name, class.name),
            scope: module.name.clone(),
            kind,
            bases: class
                .bases
                .iter()
                .filter(|b| b.as_str() != "object")
                .map(|b| self.canonical_type(&module.name, b))
                .collect(),
            implements,
            decorators: class.decorators.clone(),
            children,
            docstring: class.docstring.clone(),
            span: class.span.clone(),
            errors: Vec::new(),
        }
    }

    /// The class followed by its package-internal bases, depth-first and
    /// left-to-right, each class once.
    fn lineage(&self, module: &'a ModuleSource, class: &'a ClassDef) -> Vec<(&'a ModuleSource, &'a ClassDef)> {
        let mut out: Vec<(&'a ModuleSource, &'a ClassDef)> = Vec::new();
        let mut seen: BTreeSet<String> = BTreeSet::new();
        self.collect_lineage(module, class, &mut out, &mut seen);
        out
    }

    fn collect_lineage(
        &self,
        module: &'a ModuleSource,
        class: &'a ClassDef,
        out: &mut Vec<(&'a ModuleSource, &'a ClassDef)>,
        seen: &mut BTreeSet<String>,
    ) {
        if !seen.insert(format!("{}.{}", module.name, class.name)) {
            return;
        }
        out.push((module, class));
        for base in &class.bases {
            let head = base.split('[').next().unwrap_or(base).trim();
            if let Resolved::Definition(def) = self.index.resolve_dotted(&module.name, head) {
                if let DefinitionKind::Class(base_class) = def.kind {
                    if self.index.is_internal(&def.module.name) {
                        self.collect_lineage(def.module, base_class, out, seen);
                    }
                }
            }
        }
    }

    fn class_kind(&self, lineage: &[(&ModuleSource, &ClassDef)]) -> ClassKind {
        for (_, class) in lineage {
            let enum_meta = class.metaclass().map(|m| m.ends_with("EnumMeta")).unwrap_or(false);
            if enum_meta || class.bases.iter().any(|b| ENUM_BASES.contains(short_base(b))) {
                return ClassKind::Enum;
            }
            if class.bases.iter().any(|b| short_base(b) == "TypedDict") {
                return ClassKind::TypedDict;
            }
        }
        ClassKind::Class
    }

    fn enum_members(&self, class: &ClassDef, id: &str, taken: &BTreeSet<String>, out: &mut Vec<Node>) {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for assignment in &class.assignments {
            if assignment.name.starts_with('_') || taken.contains(&assignment.name) {
                continue;
            }
            let Some(value) = &assignment.value else {
                continue;
            };
            if !seen.insert(&assignment.name) {
                continue;
            }
            out.push(Node::EnumMember(EnumMemberNode {
                name: assignment.name.clone(),
                id: format!("{}.{}", id, assignment.name),
                value: render_value(value),
            }));
        }
    }

    fn typed_dict_keys(
        &self,
        lineage: &[(&ModuleSource, &ClassDef)],
        id: &str,
        taken: &BTreeSet<String>,
        out: &mut Vec<Node>,
    ) {
        let mut seen: BTreeSet<String> = BTreeSet::new();
        for (module, class) in lineage {
            for assignment in &class.assignments {
                if assignment.value.is_some() || taken.contains(&assignment.name) {
                    continue;
                }
                let Some(annotation) = &assignment.annotation else {
                    continue;
                };
                if !seen.insert(assignment.name.clone()) {
                    continue;
                }
                out.push(Node::Key(KeyNode {
                    name: assignment.name.clone(),
                    id: format!("{}.{}", id, assignment.name),
                    type_name: Some(self.canonical_type(&module.name, annotation)),
                }));
            }
        }
    }

    /// Class and instance variables from assignments and the class docstring.
    fn variables(
        &self,
        module: &ModuleSource,
        lineage: &[(&ModuleSource, &ClassDef)],
        id: &str,
        taken: &BTreeSet<String>,
        out: &mut Vec<Node>,
    ) {
        let mut vars: Vec<VariableNode> = Vec::new();
        let Some((_, own)) = lineage.first() else {
            return;
        };

        for (owner_module, owner) in lineage {
            let inherited = !std::ptr::eq(*owner, *own);
            for assignment in &owner.assignments {
                let name = &assignment.name;
                if name.starts_with('_') || taken.contains(name) || vars.iter().any(|v| &v.name == name) {
                    continue;
                }
                let class_var = match &assignment.annotation {
                    Some(a) => a.starts_with("ClassVar") || a.contains(".ClassVar"),
                    None => true,
                };
                if inherited && !class_var {
                    continue;
                }
                let kind = if class_var { VariableKind::Class } else { VariableKind::Instance };
                if let Some(mut var) = self.constant(owner_module, assignment, format!("{}.{}", id, name), name, kind) {
                    if let Some(t) = var.type_name.as_mut() {
                        if let Some(inner) = t.strip_prefix("ClassVar[").or_else(|| t.strip_prefix("typing.ClassVar[")) {
                            *t = inner.strip_suffix(']').unwrap_or(inner).to_string();
                        }
                    }
                    vars.push(var);
                }
            }
        }

        let doc = own
            .docstring
            .as_ref()
            .map(|d| docstring::parse(&d.text))
            .unwrap_or_default();
        for doc_var in doc.vars {
            if doc_var.name.starts_with('_') || taken.contains(&doc_var.name) {
                continue;
            }
            let type_name = doc_var.type_name.map(|t| self.canonical_type(&module.name, &t));
            match vars.iter_mut().find(|v| v.name == doc_var.name) {
                Some(existing) => {
                    if existing.type_name.is_none() {
                        existing.type_name = type_name;
                    }
                }
                None => vars.push(VariableNode {
                    id: format!("{}.{}", id, doc_var.name),
                    name: doc_var.name,
                    kind: if doc_var.is_class_var { VariableKind::Class } else { VariableKind::Instance },
                    type_name,
                    value: None,
                }),
            }
        }
        out.extend(vars.into_iter().map(Node::Variable));
    }
}
