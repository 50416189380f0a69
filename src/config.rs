//! Generator settings.
//!
//! Settings are optional: every field has a default, and a YAML file only
//! needs to name what it changes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::diagnostics::{DiagnosticCode, Severity};
use crate::error::StubError;

/// Default settings file names to search for.
pub const DEFAULT_SETTINGS_NAMES: &[&str] = &["apistub.yaml", ".apistub.yaml"];

const DEFAULT_HELP_LINK_BASE: &str =
    "https://azure.github.io/azure-sdk/python_design.html";

/// Methods exempt from all lint checks.
const LINT_EXCLUSION_METHODS: &[&str] = &["get", "has_key", "items", "keys", "update", "values", "close"];

/// Top-level settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub lint: LintSettings,
    #[serde(default)]
    pub render: RenderSettings,
    #[serde(default)]
    pub install: InstallSettings,
    /// Glob patterns over dotted module names to leave out of the document.
    #[serde(default)]
    pub exclude_modules: Vec<String>,
    /// Base URL for diagnostic help links; the code is appended as a fragment.
    #[serde(default)]
    pub help_link_base: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LintSettings {
    /// Diagnostic codes whose checkers do not run.
    #[serde(default)]
    pub disabled: Vec<String>,
    /// Per-code severity overrides.
    #[serde(default)]
    pub severity: BTreeMap<String, Severity>,
    #[serde(default)]
    pub exclusion_methods: Option<Vec<String>>,
    /// Class name suffixes whose public methods must take `**kwargs`.
    #[serde(default)]
    pub kwargs_class_suffixes: Option<Vec<String>>,
    #[serde(default)]
    pub kwargs_exempt_methods: Option<Vec<String>>,
    #[serde(default)]
    pub typehint_exempt_methods: Option<Vec<String>>,
    /// Module name suffixes whose functions are never listed on classes.
    #[serde(default)]
    pub excluded_origin_suffixes: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RenderSettings {
    #[serde(default)]
    pub max_signature_width: Option<usize>,
    /// Wrap any signature with more arguments than this, whatever its width.
    #[serde(default)]
    pub max_inline_args: Option<usize>,
    #[serde(default)]
    pub emit_docstrings: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct InstallSettings {
    /// Interpreter to install with (default: python3, then python, on PATH).
    #[serde(default)]
    pub python: Option<PathBuf>,
    /// Whether declared extras are installed after the package.
    #[serde(default)]
    pub extras: Option<bool>,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Settings {
    /// Parse settings from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let settings: Settings = serde_yaml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from an explicit path, or the first discovered file, or defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::parse_file(path);
        }
        match discover() {
            Some(path) => {
                tracing::debug!(path = %path.display(), "using settings file");
                Self::parse_file(path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Every code named in the settings must be known.
    pub fn validate(&self) -> Result<(), StubError> {
        for name in self.lint.disabled.iter().chain(self.lint.severity.keys()) {
            DiagnosticCode::parse(name)?;
        }
        for pattern in &self.exclude_modules {
            globset::Glob::new(pattern)
                .map_err(|e| StubError::Config(format!("exclude_modules {:?}: {}", pattern, e)))?;
        }
        Ok(())
    }

    pub fn is_disabled(&self, code: DiagnosticCode) -> bool {
        self.lint.disabled.iter().any(|d| d == code.as_str())
    }

    pub fn severity_for(&self, code: DiagnosticCode) -> Severity {
        self.lint
            .severity
            .get(code.as_str())
            .copied()
            .unwrap_or_else(|| code.default_severity())
    }

    pub fn help_link(&self, code: DiagnosticCode) -> String {
        let base = self.help_link_base.as_deref().unwrap_or(DEFAULT_HELP_LINK_BASE);
        format!("{}#{}", base.trim_end_matches('#'), code.as_str())
    }

    pub fn exclusion_methods(&self) -> Vec<String> {
        self.lint
            .exclusion_methods
            .clone()
            .unwrap_or_else(|| owned(LINT_EXCLUSION_METHODS))
    }

    pub fn kwargs_class_suffixes(&self) -> Vec<String> {
        self.lint
            .kwargs_class_suffixes
            .clone()
            .unwrap_or_else(|| owned(&["Client"]))
    }

    pub fn kwargs_exempt_methods(&self) -> Vec<String> {
        self.lint
            .kwargs_exempt_methods
            .clone()
            .unwrap_or_else(|| owned(&["close"]))
    }

    pub fn typehint_exempt_methods(&self) -> Vec<String> {
        self.lint
            .typehint_exempt_methods
            .clone()
            .unwrap_or_else(|| owned(&["close", "__init__"]))
    }

    pub fn excluded_origin_suffixes(&self) -> Vec<String> {
        self.lint
            .excluded_origin_suffixes
            .clone()
            .unwrap_or_else(|| owned(&["_model_base"]))
    }

    pub fn max_signature_width(&self) -> usize {
        self.render.max_signature_width.unwrap_or(100)
    }

    pub fn max_inline_args(&self) -> Option<usize> {
        self.render.max_inline_args
    }

    pub fn emit_docstrings(&self) -> bool {
        self.render.emit_docstrings.unwrap_or(false)
    }

    pub fn install_extras(&self) -> bool {
        self.install.extras.unwrap_or(true)
    }

    /// Check whether a dotted module name is excluded by `exclude_modules`.
    pub fn is_module_excluded(&self, module: &str) -> bool {
        self.exclude_modules.iter().any(|pattern| {
            globset::Glob::new(pattern)
                .map(|g| g.compile_matcher().is_match(module))
                .unwrap_or(false)
        })
    }
}

/// Find a settings file in the working directory, then in the user config directory.
fn discover() -> Option<PathBuf> {
    for name in DEFAULT_SETTINGS_NAMES {
        let path = PathBuf::from(name);
        if path.exists() {
            return Some(path);
        }
    }
    let dirs = directories::ProjectDirs::from("", "", "apistub")?;
    let path = dirs.config_dir().join(DEFAULT_SETTINGS_NAMES[0]);
    path.exists().then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.max_signature_width(), 100);
        assert!(!settings.emit_docstrings());
        assert!(settings.exclusion_methods().contains(&"close".to_string()));
        assert_eq!(settings.severity_for(DiagnosticCode::ListReturnType), Severity::Error);
        assert_eq!(
            settings.help_link(DiagnosticCode::MissingKwargs),
            "https://azure.github.io/azure-sdk/python_design.html#missing-kwargs"
        );
    }

    #[test]
    fn test_parse_overrides() {
        let yaml = r#"
lint:
  disabled: [missing-kwargs]
  severity:
    missing-type: error
render:
  max_signature_width: 60
  max_inline_args: 2
exclude_modules:
  - "azure.foo.aio*"
"#;
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();
        settings.validate().unwrap();
        assert!(settings.is_disabled(DiagnosticCode::MissingKwargs));
        assert_eq!(settings.severity_for(DiagnosticCode::MissingType), Severity::Error);
        assert_eq!(settings.max_signature_width(), 60);
        assert_eq!(settings.max_inline_args(), Some(2));
        assert!(settings.is_module_excluded("azure.foo.aio"));
        assert!(!settings.is_module_excluded("azure.foo"));
    }

    #[test]
    fn test_unknown_code_in_settings_is_fatal() {
        let yaml = "lint:\n  disabled: [no-such-check]\n";
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(
            settings.validate(),
            Err(StubError::UnknownDiagnosticCode(_))
        ));
    }
}
