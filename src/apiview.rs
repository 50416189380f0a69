//! The APIView document and its serialization.

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::info;

use crate::diagnostics::Diagnostic;
use crate::error::StubError;
use crate::tokens::{line_ids, NavigationItem, Token};

/// Value of the `Language` field.
pub const LANGUAGE: &str = "Python";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApiView {
    pub name: String,
    pub version: u32,
    pub version_string: String,
    pub language: String,
    pub package_name: String,
    pub tokens: Vec<Token>,
    pub navigation: Vec<NavigationItem>,
    pub diagnostics: Vec<Diagnostic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cross_language_package_id: Option<String>,
}

impl ApiView {
    pub fn new(package_name: &str, version: &str) -> Self {
        Self {
            name: package_name.to_string(),
            version: 0,
            version_string: version.to_string(),
            language: LANGUAGE.to_string(),
            package_name: package_name.to_string(),
            tokens: Vec::new(),
            navigation: Vec::new(),
            diagnostics: Vec::new(),
            cross_language_package_id: None,
        }
    }

    /// Every line-id marker must carry a distinct ID.
    pub fn verify_unique_ids(&self) -> Result<(), StubError> {
        let mut seen = BTreeSet::new();
        for id in line_ids(&self.tokens) {
            if !seen.insert(id) {
                return Err(StubError::DuplicateDefinitionId(id.to_string()));
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, StubError> {
        self.verify_unique_ids()?;
        Ok(serde_json::to_string(self)?)
    }

    /// `out` itself, or `<out>/<package>_python.json` when `out` is a directory.
    pub fn output_path(&self, out: &Path) -> PathBuf {
        let as_dir = out.is_dir() || out.as_os_str().to_string_lossy().ends_with(['/', '\\']);
        if as_dir {
            out.join(format!("{}_python.json", self.package_name))
        } else {
            out.to_path_buf()
        }
    }

    /// Serialize and atomically replace the output file.
    pub fn write(&self, out: &Path) -> anyhow::Result<PathBuf> {
        let json = self.to_json()?;
        let path = self.output_path(out);
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).with_context(|| format!("creating {}", parent.display()))?;

        let mut tmp = NamedTempFile::new_in(&parent)?;
        tmp.write_all(json.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&path)
            .map_err(|e| e.error)
            .with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), bytes = json.len(), "document written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::{TokenKind, TokenWriter};
    use tempfile::TempDir;

    fn document(ids: &[&str]) -> ApiView {
        let mut w = TokenWriter::new();
        for id in ids {
            w.begin_line(Some(id), None);
            w.push(TokenKind::Text, *id);
            w.newline();
        }
        let mut doc = ApiView::new("azure-foo", "1.0.0");
        doc.tokens = w.into_tokens();
        doc
    }

    #[test]
    fn test_duplicate_ids_are_fatal() {
        assert!(document(&["a", "b"]).verify_unique_ids().is_ok());
        let err = document(&["a", "b", "a"]).to_json().unwrap_err();
        assert!(matches!(err, StubError::DuplicateDefinitionId(id) if id == "a"));
    }

    #[test]
    fn test_document_fields() {
        let doc = document(&["a"]);
        let json: serde_json::Value = serde_json::from_str(&doc.to_json().unwrap()).unwrap();
        assert_eq!(json["Language"], "Python");
        assert_eq!(json["Version"], 0);
        assert_eq!(json["VersionString"], "1.0.0");
        assert_eq!(json["PackageName"], "azure-foo");
        assert!(json.get("CrossLanguagePackageId").is_none());
        assert_eq!(json["Tokens"][0]["Kind"], 5);
    }

    #[test]
    fn test_write_into_directory_and_file() {
        let tmp = TempDir::new().unwrap();
        let doc = document(&["a"]);
        let path = doc.write(tmp.path()).unwrap();
        assert_eq!(path, tmp.path().join("azure-foo_python.json"));
        assert!(path.is_file());

        let explicit = tmp.path().join("nested/out.json");
        assert_eq!(doc.write(&explicit).unwrap(), explicit);
        let written = fs::read_to_string(&explicit).unwrap();
        assert_eq!(written, doc.to_json().unwrap());
    }
}
