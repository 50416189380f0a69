//! Package-wide symbol table.
//!
//! Every `.py` file under the package's top-level directory is parsed once.
//! Names are then resolved across modules the way the interpreter binds them:
//! local definitions, `from x import y`, module imports, wildcard imports and
//! plain aliases.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use super::model::*;
use super::parser::PythonParser;

/// Maximum alias/re-export chain followed before giving up.
const MAX_RESOLVE_DEPTH: usize = 32;

/// A module that could not be imported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportFailure {
    pub path: PathBuf,
    pub reason: String,
    pub line: Option<usize>,
}

#[derive(Debug)]
pub enum ModuleEntry {
    Parsed(ModuleSource),
    Failed(ImportFailure),
}

/// The definition a name ultimately refers to.
#[derive(Debug, Clone, Copy)]
pub enum DefinitionKind<'a> {
    Class(&'a ClassDef),
    Function(&'a FunctionDef),
    Constant(&'a Assignment),
}

#[derive(Debug, Clone, Copy)]
pub struct Definition<'a> {
    pub module: &'a ModuleSource,
    /// Name the object was defined under.
    pub name: &'a str,
    pub kind: DefinitionKind<'a>,
}

impl<'a> Definition<'a> {
    /// Qualified origin, `module.name`.
    pub fn origin(&self) -> String {
        format!("{}.{}", self.module.name, self.name)
    }
}

#[derive(Debug, Clone)]
pub enum Resolved<'a> {
    Definition(Definition<'a>),
    Module(String),
    /// Bound to something outside the package; holds the best qualified guess.
    Foreign(String),
    Unresolved,
}

/// All parsed modules of one package, keyed by dotted name.
#[derive(Debug, Default)]
pub struct PackageIndex {
    namespace: String,
    modules: BTreeMap<String, ModuleEntry>,
}

impl PackageIndex {
    /// Parse every module of the package rooted at `import_root`.
    pub fn load(import_root: &Path, namespace: &str) -> anyhow::Result<Self> {
        let parser = PythonParser::new()?;
        let top = namespace.split('.').next().unwrap_or(namespace);
        let top_dir = import_root.join(top);
        let mut index = Self {
            namespace: namespace.to_string(),
            modules: BTreeMap::new(),
        };

        let mut files: Vec<PathBuf> = Vec::new();
        if top_dir.is_dir() {
            for entry in WalkDir::new(&top_dir)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| {
                    let name = e.file_name().to_string_lossy();
                    !(e.file_type().is_dir() && (name.starts_with('.') || name == "__pycache__"))
                })
            {
                let entry = entry?;
                if entry.file_type().is_file() && entry.path().extension().map(|e| e == "py").unwrap_or(false) {
                    files.push(entry.path().to_path_buf());
                }
            }
        } else if import_root.join(format!("{}.py", top)).is_file() {
            files.push(import_root.join(format!("{}.py", top)));
        }

        for path in files {
            let Some((name, is_package)) = module_name(import_root, &path) else {
                continue;
            };
            let entry = match parser.parse_module(&path, &name, is_package) {
                Ok(module) => match module.syntax_error {
                    Some(line) => ModuleEntry::Failed(ImportFailure {
                        path: path.clone(),
                        reason: format!("invalid syntax at line {}", line),
                        line: Some(line),
                    }),
                    None => ModuleEntry::Parsed(module),
                },
                Err(e) => {
                    warn!(module = %name, error = %e, "cannot read module");
                    ModuleEntry::Failed(ImportFailure {
                        path: path.clone(),
                        reason: e.to_string(),
                        line: None,
                    })
                }
            };
            debug!(module = %name, "indexed module");
            index.modules.insert(name, entry);
        }
        Ok(index)
    }

    /// Build an index from already-extracted modules.
    pub fn from_modules(namespace: &str, modules: Vec<ModuleSource>) -> Self {
        Self {
            namespace: namespace.to_string(),
            modules: modules
                .into_iter()
                .map(|m| (m.name.clone(), ModuleEntry::Parsed(m)))
                .collect(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn module(&self, name: &str) -> Option<&ModuleSource> {
        match self.modules.get(name) {
            Some(ModuleEntry::Parsed(m)) => Some(m),
            _ => None,
        }
    }

    pub fn failure(&self, name: &str) -> Option<&ImportFailure> {
        match self.modules.get(name) {
            Some(ModuleEntry::Failed(f)) => Some(f),
            _ => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Parsed modules in name order.
    pub fn modules(&self) -> impl Iterator<Item = &ModuleSource> {
        self.modules.values().filter_map(|e| match e {
            ModuleEntry::Parsed(m) => Some(m),
            ModuleEntry::Failed(_) => None,
        })
    }

    /// Failed modules in name order.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &ImportFailure)> {
        self.modules.iter().filter_map(|(name, e)| match e {
            ModuleEntry::Failed(f) => Some((name.as_str(), f)),
            ModuleEntry::Parsed(_) => None,
        })
    }

    /// True when a qualified name lives under the package namespace.
    pub fn is_internal(&self, qualified: &str) -> bool {
        is_under(qualified, &self.namespace)
    }

    /// Names a module exports: its `__all__`, or every public bound name.
    pub fn public_names(&self, module: &str) -> Vec<String> {
        self.public_names_depth(module, 0)
    }

    fn public_names_depth(&self, module: &str, depth: usize) -> Vec<String> {
        let Some(source) = self.module(module).filter(|_| depth <= MAX_RESOLVE_DEPTH) else {
            return Vec::new();
        };
        if let Some(all) = &source.all {
            let mut names = Vec::new();
            for n in all {
                if !names.contains(n) {
                    names.push(n.clone());
                }
            }
            return names;
        }
        let mut names: Vec<String> = source
            .bound_names()
            .into_iter()
            .filter(|n| !n.starts_with('_'))
            .collect();
        for wildcard in &source.wildcard_imports {
            for n in self.public_names_depth(wildcard, depth + 1) {
                if !names.contains(&n) {
                    names.push(n);
                }
            }
        }
        names.sort();
        names
    }

    /// Resolve a simple name as seen from inside `module`.
    pub fn resolve(&self, module: &str, name: &str) -> Resolved<'_> {
        self.resolve_depth(module, name, 0)
    }

    /// Resolve a dotted reference such as `models.Foo` from inside `module`.
    pub fn resolve_dotted(&self, module: &str, dotted: &str) -> Resolved<'_> {
        let mut parts = dotted.split('.');
        let Some(head) = parts.next() else {
            return Resolved::Unresolved;
        };
        let mut current = self.resolve(module, head);
        for part in parts {
            current = match current {
                Resolved::Module(m) => {
                    let sub = format!("{}.{}", m, part);
                    if self.contains(&sub) {
                        Resolved::Module(sub)
                    } else {
                        self.resolve(&m, part)
                    }
                }
                Resolved::Foreign(f) => Resolved::Foreign(format!("{}.{}", f, part)),
                // Attribute access on a class or constant is not followed.
                Resolved::Definition(_) | Resolved::Unresolved => return Resolved::Unresolved,
            };
        }
        current
    }

    /// Qualified name for a reference, when it can be resolved at all.
    pub fn qualify(&self, module: &str, dotted: &str) -> Option<String> {
        match self.resolve_dotted(module, dotted) {
            Resolved::Definition(d) => Some(d.origin()),
            Resolved::Module(m) => Some(m),
            Resolved::Foreign(f) => Some(f),
            Resolved::Unresolved => None,
        }
    }

    /// Resolve a fully qualified name such as `azure.foo.models.Widget`.
    ///
    /// The longest prefix naming a package module anchors the lookup.
    pub fn resolve_qualified(&self, qualified: &str) -> Resolved<'_> {
        if self.module(qualified).is_some() {
            return Resolved::Module(qualified.to_string());
        }
        let mut split = qualified.len();
        while let Some(dot) = qualified[..split].rfind('.') {
            let (module, rest) = (&qualified[..dot], &qualified[dot + 1..]);
            if self.is_internal(module) && self.module(module).is_some() {
                return self.resolve_dotted(module, rest);
            }
            split = dot;
        }
        if self.is_internal(qualified) {
            Resolved::Unresolved
        } else {
            Resolved::Foreign(qualified.to_string())
        }
    }

    fn resolve_depth(&self, module: &str, name: &str, depth: usize) -> Resolved<'_> {
        if depth > MAX_RESOLVE_DEPTH {
            return Resolved::Unresolved;
        }
        let Some(source) = self.module(module) else {
            if self.is_internal(module) {
                return Resolved::Unresolved;
            }
            return Resolved::Foreign(format!("{}.{}", module, name));
        };

        // Later bindings win, so find the last line that binds the name.
        let mut best: Option<(usize, Resolved<'_>)> = None;
        let mut consider = |line: usize, resolved| {
            if best.as_ref().map(|(l, _)| line >= *l).unwrap_or(true) {
                best = Some((line, resolved));
            }
        };

        if let Some(class) = source.class(name) {
            consider(
                class.span.start_line,
                Resolved::Definition(Definition {
                    module: source,
                    name: &class.name,
                    kind: DefinitionKind::Class(class),
                }),
            );
        }
        if let Some(function) = source.functions.iter().rev().find(|f| f.name == name) {
            consider(
                function.span.start_line,
                Resolved::Definition(Definition {
                    module: source,
                    name: &function.name,
                    kind: DefinitionKind::Function(function),
                }),
            );
        }
        if let Some(assignment) = source.assignment(name) {
            let resolved = match assignment.value.as_ref().map(|v| &v.kind) {
                Some(ExprKind::Name(target)) if target != name => self.alias(module, target, depth),
                _ => Resolved::Definition(Definition {
                    module: source,
                    name: &assignment.name,
                    kind: DefinitionKind::Constant(assignment),
                }),
            };
            consider(assignment.line, resolved);
        }
        if let Some(import) = source.import(name) {
            let resolved = match &import.target {
                ImportTarget::Module(m) => {
                    if self.is_internal(m) {
                        Resolved::Module(m.clone())
                    } else {
                        Resolved::Foreign(m.clone())
                    }
                }
                ImportTarget::Member { module: from, name: member } => {
                    let sub = format!("{}.{}", from, member);
                    if self.contains(&sub) {
                        Resolved::Module(sub)
                    } else if self.is_internal(from) {
                        self.resolve_depth(from, member, depth + 1)
                    } else {
                        Resolved::Foreign(sub)
                    }
                }
            };
            consider(import.line, resolved);
        }

        if let Some((_, resolved)) = best {
            return resolved;
        }

        for wildcard in &source.wildcard_imports {
            if self.public_names(wildcard).iter().any(|n| n == name) {
                return self.resolve_depth(wildcard, name, depth + 1);
            }
        }

        // Submodules are reachable as attributes of their package.
        let sub = format!("{}.{}", module, name);
        if source.is_package && self.contains(&sub) {
            return Resolved::Module(sub);
        }
        Resolved::Unresolved
    }

    fn alias(&self, module: &str, target: &str, depth: usize) -> Resolved<'_> {
        if depth > MAX_RESOLVE_DEPTH {
            return Resolved::Unresolved;
        }
        match target.split_once('.') {
            None => self.resolve_depth(module, target, depth + 1),
            Some(_) => self.resolve_dotted(module, target),
        }
    }
}

/// True when `name` equals `namespace` or is nested below it.
pub fn is_under(name: &str, namespace: &str) -> bool {
    namespace.is_empty()
        || name == namespace
        || (name.starts_with(namespace) && name[namespace.len()..].starts_with('.'))
}

/// Dotted module name for a file under the import root.
pub fn module_name(import_root: &Path, path: &Path) -> Option<(String, bool)> {
    let relative = path.strip_prefix(import_root).ok()?;
    let mut parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    let file = parts.pop()?;
    let stem = file.strip_suffix(".py")?;
    let is_package = stem == "__init__";
    if !is_package {
        parts.push(stem.to_string());
    }
    if parts.is_empty() || parts.iter().any(|p| p.contains('.') || p.contains('-')) {
        return None;
    }
    Some((parts.join("."), is_package))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn fixture() -> (TempDir, PackageIndex) {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "azure/__init__.py", "__path__ = __import__('pkgutil').extend_path(__path__, __name__)\n");
        write(
            root,
            "azure/foo/__init__.py",
            "from ._client import FooClient\nfrom . import models\nfrom ._helpers import *\nPublic = _impl\nfrom ._helpers import _impl\n__all__ = ['FooClient', 'models']\n",
        );
        write(root, "azure/foo/_client.py", "from typing import Optional\nclass FooClient:\n    pass\n");
        write(root, "azure/foo/_helpers.py", "def helper(): pass\ndef _impl(): pass\n");
        write(root, "azure/foo/models/__init__.py", "from ._models import Widget\n");
        write(root, "azure/foo/models/_models.py", "class Widget: pass\n");
        write(root, "azure/foo/broken.py", "def broken(:\n");
        let index = PackageIndex::load(root, "azure.foo").unwrap();
        (temp, index)
    }

    #[test]
    fn test_resolves_re_exports() {
        let (_temp, index) = fixture();
        match index.resolve("azure.foo", "FooClient") {
            Resolved::Definition(d) => assert_eq!(d.origin(), "azure.foo._client.FooClient"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(index.resolve("azure.foo", "models"), Resolved::Module(ref m) if m == "azure.foo.models"));
        assert_eq!(
            index.qualify("azure.foo", "models.Widget").as_deref(),
            Some("azure.foo.models._models.Widget")
        );
        assert_eq!(
            index.qualify("azure.foo._client", "Optional").as_deref(),
            Some("typing.Optional")
        );
    }

    #[test]
    fn test_wildcard_and_alias() {
        let (_temp, index) = fixture();
        match index.resolve("azure.foo", "helper") {
            Resolved::Definition(d) => assert_eq!(d.origin(), "azure.foo._helpers.helper"),
            other => panic!("unexpected {:?}", other),
        }
        match index.resolve("azure.foo", "Public") {
            Resolved::Definition(d) => assert_eq!(d.name, "_impl"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_resolve_qualified() {
        let (_temp, index) = fixture();
        match index.resolve_qualified("azure.foo.models.Widget") {
            Resolved::Definition(d) => assert_eq!(d.origin(), "azure.foo.models._models.Widget"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(index.resolve_qualified("azure.foo.models"), Resolved::Module(_)));
        assert!(matches!(index.resolve_qualified("azure.foo.Missing"), Resolved::Unresolved));
        assert!(matches!(index.resolve_qualified("azure.core.PipelineClient"), Resolved::Foreign(_)));
    }

    #[test]
    fn test_public_names() {
        let (_temp, index) = fixture();
        assert_eq!(index.public_names("azure.foo"), vec!["FooClient", "models"]);
        assert_eq!(index.public_names("azure.foo._helpers"), vec!["helper"]);
        assert_eq!(index.public_names("azure.foo.models"), vec!["Widget"]);
    }

    #[test]
    fn test_syntax_errors_are_import_failures() {
        let (_temp, index) = fixture();
        assert!(index.module("azure.foo.broken").is_none());
        let failure = index.failure("azure.foo.broken").unwrap();
        assert_eq!(failure.line, Some(1));
    }

    #[test]
    fn test_module_name() {
        let root = Path::new("/r");
        assert_eq!(module_name(root, Path::new("/r/a/b/__init__.py")), Some(("a.b".into(), true)));
        assert_eq!(module_name(root, Path::new("/r/a/c.py")), Some(("a.c".into(), false)));
        assert_eq!(module_name(root, Path::new("/r/a/x.txt")), None);
    }
}
