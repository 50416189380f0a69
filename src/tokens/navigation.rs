//! The navigator tree shown beside the rendered document.

use serde::Serialize;

use super::GLOBAL_ID;
use crate::nodes::{ClassNode, ModuleNode, Node};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NavigationTags {
    pub type_kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NavigationItem {
    pub text: String,
    pub navigation_id: String,
    pub child_items: Vec<NavigationItem>,
    pub tags: NavigationTags,
}

impl NavigationItem {
    fn new(text: &str, id: &str, kind: &str) -> Self {
        Self {
            text: text.to_string(),
            navigation_id: id.to_string(),
            child_items: Vec::new(),
            tags: NavigationTags {
                type_kind: kind.to_string(),
            },
        }
    }
}

/// Package root, then one entry per module holding its classes and functions.
pub fn build_navigation(package_name: &str, modules: &[ModuleNode]) -> Vec<NavigationItem> {
    let mut root = NavigationItem::new(package_name, GLOBAL_ID, "assembly");
    for module in modules {
        let mut item = NavigationItem::new(&module.name, &module.name, "namespace");
        for node in module.children.iter().filter(|n| !n.is_hidden()) {
            match node {
                Node::Class(c) => item.child_items.push(class_item(c)),
                Node::Function(f) => item.child_items.push(NavigationItem::new(&f.name, &f.id, "method")),
                _ => {}
            }
        }
        root.child_items.push(item);
    }
    vec![root]
}

fn class_item(class: &ClassNode) -> NavigationItem {
    let mut item = NavigationItem::new(&class.name, &class.id, class.kind.as_str());
    for child in &class.children {
        if let Node::Class(nested) = child {
            item.child_items.push(class_item(nested));
        }
    }
    item
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::nodes::GraphBuilder;
    use crate::python::{PackageIndex, PythonParser};
    use std::path::Path;

    #[test]
    fn test_navigation_mirrors_graph() {
        let parser = PythonParser::new().unwrap();
        let code = "from enum import Enum\n\nclass Foo:\n    def bar(self) -> None: ...\n\nclass Color(Enum):\n    RED = 1\n\ndef helper() -> None: ...\n";
        let parsed = parser.parse(Path::new("pkg/__init__.py"), code.as_bytes().to_vec()).unwrap();
        let index = PackageIndex::from_modules("pkg", vec![parser.extract(&parsed, "pkg", true)]);
        let settings = Settings::default();
        let modules = GraphBuilder::new(&index, &settings).build(&["pkg".to_string()]);

        let nav = build_navigation("pkg-dist", &modules);
        assert_eq!(nav.len(), 1);
        assert_eq!(nav[0].text, "pkg-dist");
        assert_eq!(nav[0].navigation_id, GLOBAL_ID);

        let module = &nav[0].child_items[0];
        assert_eq!(module.tags.type_kind, "namespace");
        let entries: Vec<(&str, &str)> = module
            .child_items
            .iter()
            .map(|i| (i.navigation_id.as_str(), i.tags.type_kind.as_str()))
            .collect();
        assert_eq!(entries, vec![("pkg.helper", "method"), ("pkg.Color", "enum"), ("pkg.Foo", "class")]);
        assert!(module.child_items[2].child_items.is_empty());

        let json = serde_json::to_value(&nav[0]).unwrap();
        assert_eq!(json["Tags"]["TypeKind"], "assembly");
        assert!(json["ChildItems"].is_array());
    }
}
