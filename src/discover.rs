//! Module discovery.
//!
//! Finds the import root and root namespace of an acquired package and lists
//! the public modules under it in path order.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::config::Settings;
use crate::error::StubError;
use crate::python::is_under;

const INIT_FILE: &str = "__init__.py";

/// What discovery found.
#[derive(Debug, Clone)]
pub struct Discovery {
    pub import_root: PathBuf,
    pub namespace: String,
    /// Public modules to emit, in path order.
    pub modules: Vec<String>,
}

/// Discover the modules of the package rooted at `root`.
///
/// `filter` narrows emission to a sub-namespace.
pub fn discover(root: &Path, filter: Option<&str>, settings: &Settings) -> Result<Discovery, StubError> {
    let import_root = import_root(root);
    let namespace = detect_namespace(&import_root, root)?;
    debug!(import_root = %import_root.display(), namespace = %namespace, "namespace detected");

    let modules = walk_modules(&import_root, &namespace)?
        .into_iter()
        .filter(|m| filter.map(|f| is_under(m, f)).unwrap_or(true))
        .filter(|m| {
            let excluded = settings.is_module_excluded(m);
            if excluded {
                debug!(module = %m, "module excluded by settings");
            }
            !excluded
        })
        .collect();

    Ok(Discovery {
        import_root,
        namespace,
        modules,
    })
}

/// `root/src` when it holds a package, otherwise `root`.
pub fn import_root(root: &Path) -> PathBuf {
    let src = root.join("src");
    let holds_package = fs::read_dir(&src)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .any(|e| e.path().is_dir() && contains_python(&e.path()))
        })
        .unwrap_or(false);
    if holds_package {
        src
    } else {
        root.to_path_buf()
    }
}

fn contains_python(dir: &Path) -> bool {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .any(|e| e.file_type().is_file() && e.path().extension().map(|x| x == "py").unwrap_or(false))
}

fn is_ignored_dir(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() || entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.')
        || name == "__pycache__"
        || name.starts_with("tests")
        || name.starts_with("build")
        || name.ends_with(".dist-info")
        || name.ends_with(".egg-info")
}

/// A `__init__.py` that only extends `__path__` for a namespace package.
fn is_namespace_shim(init: &Path) -> bool {
    fs::read_to_string(init)
        .map(|text| text.contains("extend_path(__path__, __name__)") || text.contains("declare_namespace("))
        .unwrap_or(false)
}

/// The first real package directory under `import_root`, else `top_level.txt`.
pub fn detect_namespace(import_root: &Path, root: &Path) -> Result<String, StubError> {
    for entry in WalkDir::new(import_root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_ignored_dir(e) && !(e.depth() > 0 && e.file_name().to_string_lossy().starts_with('_')))
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_dir() || entry.depth() == 0 {
            continue;
        }
        let init = entry.path().join(INIT_FILE);
        if init.is_file() && !is_namespace_shim(&init) {
            if let Some(name) = dotted(import_root, entry.path()) {
                return Ok(name);
            }
        }
    }
    top_level_name(root).ok_or_else(|| StubError::NamespaceNotFound(root.to_path_buf()))
}

/// First line of a `top_level.txt` in the root or its metadata directories.
fn top_level_name(root: &Path) -> Option<String> {
    let mut candidates = vec![root.join("top_level.txt")];
    if let Ok(entries) = fs::read_dir(root) {
        let mut meta: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                let name = p.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
                name.ends_with(".dist-info") || name.ends_with(".egg-info")
            })
            .map(|p| p.join("top_level.txt"))
            .collect();
        meta.sort();
        candidates.extend(meta);
    }
    candidates.iter().find_map(|path| {
        let text = fs::read_to_string(path).ok()?;
        text.lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(|l| l.replace('/', "."))
    })
}

fn dotted(import_root: &Path, dir: &Path) -> Option<String> {
    let relative = dir.strip_prefix(import_root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() || parts.iter().any(|p| p.contains('.') || p.contains('-')) {
        return None;
    }
    Some(parts.join("."))
}

/// Packages and public `.py` submodules under the namespace.
fn walk_modules(import_root: &Path, namespace: &str) -> Result<Vec<String>, StubError> {
    let ns_dir = namespace.split('.').fold(import_root.to_path_buf(), |p, s| p.join(s));
    let mut modules = Vec::new();
    if !ns_dir.is_dir() {
        if import_root.join(format!("{}.py", namespace)).is_file() {
            modules.push(namespace.to_string());
        }
        return Ok(modules);
    }

    for entry in WalkDir::new(&ns_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            e.depth() == 0
                || !(e.file_type().is_dir()
                    && (name.starts_with('_') || name.starts_with('.') || name == "__pycache__"))
        })
    {
        let entry = entry.map_err(|e| StubError::Io(e.into()))?;
        let path = entry.path();
        if entry.file_type().is_dir() {
            if path.join(INIT_FILE).is_file() {
                if let Some(name) = dotted(import_root, path) {
                    modules.push(name);
                }
            }
            continue;
        }
        let file_name = entry.file_name().to_string_lossy();
        let in_package = path.parent().map(|p| p.join(INIT_FILE).is_file()).unwrap_or(false);
        if in_package && !file_name.starts_with('_') && file_name.ends_with(".py") {
            if let Some(parent) = path.parent().and_then(|p| dotted(import_root, p)) {
                let stem = file_name.trim_end_matches(".py");
                modules.push(format!("{}.{}", parent, stem));
            }
        }
    }
    Ok(modules)
}
