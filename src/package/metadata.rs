//! Package name, version and extras.
//!
//! Built distributions carry core metadata (`METADATA` in a wheel, `PKG-INFO`
//! in an sdist). Source trees are read statically: `pyproject.toml` first,
//! then `setup.py`, and only when neither yields a name and version is
//! `setup.py` executed.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Context;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::StubError;

lazy_static! {
    static ref SETUP_KWARG: Regex =
        Regex::new(r#"(?m)\b(name|version)\s*=\s*(?:['"]([^'"]+)['"]|([A-Za-z_][A-Za-z0-9_]*))"#).unwrap();
    static ref VERSION_ASSIGN: Regex =
        Regex::new(r#"(?m)^\s*(?:VERSION|__version__)\s*(?::\s*str\s*)?=\s*['"]([^'"]+)['"]"#).unwrap();
    static ref EXTRAS_BLOCK: Regex = Regex::new(r"(?s)extras_require\s*=\s*\{(.*?)\}").unwrap();
    static ref EXTRA_KEY: Regex = Regex::new(r#""([^"]+)"\s*:|'([^']+)'\s*:"#).unwrap();
}

/// An optional dependency group, with the environment marker that guards it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extra {
    pub name: String,
    pub marker: Option<String>,
}

impl Extra {
    /// Parse `name` or `name:marker`; a bare `:marker` key has an empty name.
    pub fn parse(key: &str) -> Self {
        match key.split_once(':') {
            Some((name, marker)) => Self {
                name: name.trim().to_string(),
                marker: Some(marker.trim().to_string()).filter(|m| !m.is_empty()),
            },
            None => Self {
                name: key.trim().to_string(),
                marker: None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub name: String,
    pub version: String,
    pub extras: Vec<Extra>,
}

impl Metadata {
    /// Parse RFC 822 style core metadata.
    pub fn from_core_metadata(text: &str) -> Result<Self, StubError> {
        let mut name = None;
        let mut version = None;
        let mut extras = Vec::new();
        for line in text.lines() {
            // The body follows the first blank line.
            if line.trim().is_empty() {
                break;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim().to_string();
            match key.trim() {
                "Name" => name = Some(value),
                "Version" => version = Some(value),
                "Provides-Extra" => extras.push(Extra { name: value, marker: None }),
                _ => {}
            }
        }
        match (name, version) {
            (Some(name), Some(version)) => Ok(Self { name, version, extras }),
            _ => Err(StubError::Metadata("core metadata lacks Name or Version".to_string())),
        }
    }

    /// Read the `METADATA` file of the first `*.dist-info` directory.
    pub fn from_wheel_dir(dir: &Path) -> anyhow::Result<Self> {
        let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_dir() && p.extension().map(|e| e == "dist-info").unwrap_or(false))
            .collect();
        entries.sort();
        let dist_info = entries
            .first()
            .ok_or_else(|| StubError::Metadata(format!("no .dist-info directory in {}", dir.display())))?;
        let text = fs::read_to_string(dist_info.join("METADATA"))
            .with_context(|| format!("reading {}/METADATA", dist_info.display()))?;
        Ok(Self::from_core_metadata(&text)?)
    }

    /// `PKG-INFO` when present, otherwise the source tree's build files.
    pub fn from_sdist_dir(dir: &Path, python: Option<&Path>) -> anyhow::Result<Self> {
        let pkg_info = dir.join("PKG-INFO");
        if pkg_info.is_file() {
            let text = fs::read_to_string(&pkg_info)?;
            return Ok(Self::from_core_metadata(&text)?);
        }
        Self::from_source_dir(dir, python)
    }

    /// Metadata of an unbuilt source tree. `pyproject.toml` wins over `setup.py`.
    pub fn from_source_dir(dir: &Path, python: Option<&Path>) -> anyhow::Result<Self> {
        let pyproject = dir.join("pyproject.toml");
        let setup = dir.join("setup.py");
        if !pyproject.is_file() && !setup.is_file() {
            return Err(StubError::MissingBuildFile(dir.to_path_buf()).into());
        }
        if pyproject.is_file() {
            if let Some(metadata) = from_pyproject(dir, &pyproject)? {
                return Ok(metadata);
            }
            debug!(path = %pyproject.display(), "no [project] name; falling back to setup.py");
        }
        if !setup.is_file() {
            return Err(StubError::Metadata(format!("{} has no [project] name", pyproject.display())).into());
        }
        from_setup_py(dir, &setup, python)
    }
}

#[derive(Debug, Deserialize)]
struct PyProject {
    project: Option<ProjectTable>,
}

#[derive(Debug, Deserialize)]
struct ProjectTable {
    name: Option<String>,
    version: Option<String>,
    #[serde(default, rename = "optional-dependencies")]
    optional_dependencies: std::collections::BTreeMap<String, Vec<String>>,
}

fn from_pyproject(dir: &Path, path: &Path) -> anyhow::Result<Option<Metadata>> {
    let text = fs::read_to_string(path)?;
    let parsed: PyProject = toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    let Some(project) = parsed.project else {
        return Ok(None);
    };
    let Some(name) = project.name else {
        return Ok(None);
    };
    let version = match project.version {
        Some(v) => v,
        None => version_file(dir)
            .ok_or_else(|| StubError::Metadata(format!("cannot determine the version of {}", name)))?,
    };
    let extras = project.optional_dependencies.keys().map(|k| Extra::parse(k)).collect();
    Ok(Some(Metadata { name, version, extras }))
}

fn from_setup_py(dir: &Path, path: &Path, python: Option<&Path>) -> anyhow::Result<Metadata> {
    let text = fs::read_to_string(path)?;
    let mut name = None;
    let mut version = None;
    for cap in SETUP_KWARG.captures_iter(&text) {
        let value = match (cap.get(2), cap.get(3)) {
            (Some(literal), _) => Some(literal.as_str().to_string()),
            (None, Some(ident)) => constant_in(&text, ident.as_str()),
            _ => None,
        };
        match &cap[1] {
            "name" if name.is_none() => name = value,
            "version" if version.is_none() => version = value,
            _ => {}
        }
    }
    if version.is_none() {
        version = version_file(dir);
    }

    let extras = EXTRAS_BLOCK
        .captures(&text)
        .map(|block| {
            EXTRA_KEY
                .captures_iter(&block[1])
                .filter_map(|c| c.get(1).or_else(|| c.get(2)))
                .map(|m| Extra::parse(m.as_str()))
                .collect()
        })
        .unwrap_or_default();

    if let (Some(name), Some(version)) = (name.clone(), version.clone()) {
        return Ok(Metadata { name, version, extras });
    }

    let python = python.ok_or_else(|| {
        StubError::Metadata(format!("{} does not declare a static name and version", path.display()))
    })?;
    let (run_name, run_version) = run_setup_py(dir, python)?;
    Ok(Metadata {
        name: name.unwrap_or(run_name),
        version: version.unwrap_or(run_version),
        extras,
    })
}

/// `IDENT = "value"` at the top level of a script.
fn constant_in(text: &str, ident: &str) -> Option<String> {
    let pattern = format!(r#"(?m)^{}\s*=\s*['"]([^'"]+)['"]"#, regex::escape(ident));
    Regex::new(&pattern).ok()?.captures(text).map(|c| c[1].to_string())
}

/// `python setup.py --name --version`, run inside the package directory.
fn run_setup_py(dir: &Path, python: &Path) -> anyhow::Result<(String, String)> {
    debug!(python = %python.display(), dir = %dir.display(), "running setup.py for metadata");
    let output = Command::new(python)
        .args(["setup.py", "--name", "--version"])
        .current_dir(dir)
        .output()
        .with_context(|| format!("running {} setup.py", python.display()))?;
    if !output.status.success() {
        return Err(StubError::Metadata(format!(
            "setup.py exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ))
        .into());
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut lines = stdout.lines().map(str::trim).filter(|l| !l.is_empty());
    match (lines.next(), lines.next()) {
        (Some(name), Some(version)) => Ok((name.to_string(), version.to_string())),
        _ => Err(StubError::Metadata("setup.py did not print a name and version".to_string()).into()),
    }
}

/// Version from the first `_version.py` in the tree that assigns one.
pub fn version_file(dir: &Path) -> Option<String> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            e.depth() == 0
                || !(e.file_type().is_dir()
                    && (name.starts_with('.') || name.starts_with("tests") || name.starts_with("build")))
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == "_version.py")
        .find_map(|e| {
            let text = fs::read_to_string(e.path()).ok()?;
            VERSION_ASSIGN.captures(&text).map(|c| c[1].to_string())
        })
}
