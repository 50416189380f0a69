//! Cross-language ID mapping.
//!
//! A mapping file pairs namespace IDs with the IDs other language renderings
//! of the same service use. Two shapes are accepted:
//!
//! ```json
//! {"CrossLanguagePackageId": "Foo", "azure.foo.FooClient": "Foo.Client"}
//! {"CrossLanguagePackageId": "Foo", "CrossLanguageDefinitionId": {"azure.foo.FooClient": "Foo.Client"}}
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::Value;

use crate::error::StubError;

/// Current mapping file name.
pub const MAPPING_FILE: &str = "apiview-properties.json";
/// Legacy mapping file name, used only when the current one is absent.
pub const LEGACY_MAPPING_FILE: &str = "apiview_mapping_python.json";

const PACKAGE_ID_KEY: &str = "CrossLanguagePackageId";
const DEFINITIONS_KEY: &str = "CrossLanguageDefinitionId";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrossLanguageMap {
    package_id: Option<String>,
    ids: BTreeMap<String, String>,
}

impl CrossLanguageMap {
    pub fn from_json(text: &str) -> Result<Self, StubError> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(root) = value else {
            return Err(StubError::Config("mapping file must hold a JSON object".to_string()));
        };

        let package_id = root.get(PACKAGE_ID_KEY).and_then(Value::as_str).map(str::to_string);
        let entries = match root.get(DEFINITIONS_KEY) {
            Some(Value::Object(nested)) => nested,
            _ => &root,
        };
        let ids = entries
            .iter()
            .filter(|(k, _)| k.as_str() != PACKAGE_ID_KEY)
            .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
            .collect();
        Ok(Self { package_id, ids })
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("parsing mapping file {}", path.display()))
    }

    /// Find the mapping file: an explicit path, then the current and legacy
    /// names in each of `search_dirs`, in order.
    pub fn locate(explicit: Option<&Path>, search_dirs: &[&Path]) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        search_dirs.iter().find_map(|dir| {
            [MAPPING_FILE, LEGACY_MAPPING_FILE]
                .iter()
                .map(|name| dir.join(name))
                .find(|p| p.is_file())
        })
    }

    pub fn lookup(&self, id: &str) -> Option<&str> {
        self.ids.get(id).map(String::as_str)
    }

    /// Cross-language ID for a numbered overload: its own entry, else the
    /// entry of the implementation it overloads.
    pub fn lookup_overload(&self, id: &str, implementation: &str) -> Option<&str> {
        self.lookup(id).or_else(|| self.lookup(implementation))
    }

    pub fn package_id(&self) -> Option<&str> {
        self.package_id.as_deref()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_flat_shape() {
        let map = CrossLanguageMap::from_json(r#"{"CrossLanguagePackageId": "Foo", "a.B": "Foo.B", "n": 3}"#).unwrap();
        assert_eq!(map.package_id(), Some("Foo"));
        assert_eq!(map.len(), 1);
        assert_eq!(map.lookup("a.B"), Some("Foo.B"));
    }

    #[test]
    fn test_nested_shape() {
        let map = CrossLanguageMap::from_json(
            r#"{"CrossLanguagePackageId": "Foo", "CrossLanguageDefinitionId": {"a.B.get": "Foo.B.get"}}"#,
        )
        .unwrap();
        assert_eq!(map.lookup("a.B.get"), Some("Foo.B.get"));
        assert_eq!(map.lookup("a.B.put"), None);
    }

    #[test]
    fn test_numbered_names_only_fall_back_for_overloads() {
        let map = CrossLanguageMap::from_json(r#"{"a.B.get": "Foo.B.get", "a.v_2": "X"}"#).unwrap();
        assert_eq!(map.lookup("a.B.get_2"), None);
        assert_eq!(map.lookup_overload("a.B.get_2", "a.B.get"), Some("Foo.B.get"));
        assert_eq!(map.lookup_overload("a.v_2", "a.v"), Some("X"));
        assert_eq!(map.lookup_overload("a.v_3", "a.v"), None);
    }

    #[test]
    fn test_rejects_non_object() {
        assert!(CrossLanguageMap::from_json("[1, 2]").is_err());
    }

    #[test]
    fn test_current_name_wins_over_legacy() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(LEGACY_MAPPING_FILE), "{}").unwrap();
        assert_eq!(
            CrossLanguageMap::locate(None, &[tmp.path()]),
            Some(tmp.path().join(LEGACY_MAPPING_FILE))
        );
        fs::write(tmp.path().join(MAPPING_FILE), "{}").unwrap();
        assert_eq!(CrossLanguageMap::locate(None, &[tmp.path()]), Some(tmp.path().join(MAPPING_FILE)));

        let explicit = tmp.path().join("custom.json");
        assert_eq!(CrossLanguageMap::locate(Some(&explicit), &[tmp.path()]), Some(explicit));
    }
}
