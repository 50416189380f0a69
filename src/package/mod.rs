//! Package acquisition.
//!
//! Turns `--pkg-path` into a directory of Python sources plus metadata:
//! wheels and sdists are extracted into a per-run scratch directory, source
//! directories are used in place.

mod archive;
mod install;
mod mapping;
mod metadata;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::Context;
use tempfile::TempDir;
use tracing::{debug, info, warn};

pub use archive::{extract_sdist, extract_wheel};
pub use install::{find_python, install_package, Installer, MarkerEnv, NoopInstaller, PipInstaller};
pub use mapping::{CrossLanguageMap, LEGACY_MAPPING_FILE, MAPPING_FILE};
pub use metadata::{version_file, Extra, Metadata};

use crate::error::StubError;

/// Prefix of per-run scratch directories.
const SCRATCH_PREFIX: &str = "apistub-";

/// Scratch directories older than this are left over from killed runs.
const STALE_AFTER: Duration = Duration::from_secs(60 * 60);

/// A per-run scratch directory, removed when dropped.
#[derive(Debug)]
pub struct Scratch {
    dir: TempDir,
}

impl Scratch {
    /// Create `apistub-*` under `root`, clearing stale siblings first.
    pub fn create(root: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(root).with_context(|| format!("creating temp path {}", root.display()))?;
        clean_stale(root);
        let dir = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(root)
            .with_context(|| format!("creating scratch directory under {}", root.display()))?;
        debug!(path = %dir.path().display(), "scratch directory");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

fn clean_stale(root: &Path) {
    let Ok(entries) = fs::read_dir(root) else {
        return;
    };
    let now = SystemTime::now();
    for entry in entries.filter_map(|e| e.ok()) {
        if !entry.file_name().to_string_lossy().starts_with(SCRATCH_PREFIX) {
            continue;
        }
        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if age.map(|a| a > STALE_AFTER).unwrap_or(false) {
            match fs::remove_dir_all(entry.path()) {
                Ok(()) => debug!(path = %entry.path().display(), "removed stale scratch directory"),
                Err(e) => warn!(path = %entry.path().display(), error = %e, "cannot remove stale scratch directory"),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageKind {
    Wheel,
    Sdist,
    SourceDir,
}

impl PackageKind {
    /// Classify an input path; nothing is touched when this fails.
    pub fn detect(path: &Path) -> Result<Self, StubError> {
        if !path.exists() {
            return Err(StubError::InvalidPath(path.to_path_buf()));
        }
        if path.is_dir() {
            if path.join("pyproject.toml").is_file() || path.join("setup.py").is_file() {
                return Ok(PackageKind::SourceDir);
            }
            return Err(StubError::MissingBuildFile(path.to_path_buf()));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if name.ends_with(".whl") || name.ends_with(".zip") {
            Ok(PackageKind::Wheel)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Ok(PackageKind::Sdist)
        } else {
            Err(StubError::UnsupportedArchive(path.to_path_buf()))
        }
    }
}

/// A package ready for discovery.
#[derive(Debug, Clone)]
pub struct Package {
    pub kind: PackageKind,
    /// The path given on the command line; this is what gets installed.
    pub input: PathBuf,
    /// Directory holding the sources and build files.
    pub root: PathBuf,
    pub metadata: Metadata,
}

/// Extract (if needed) and read metadata. `python` is used only when a
/// `setup.py` has to be executed.
pub fn acquire(input: &Path, scratch: &Scratch, python: Option<&Path>) -> anyhow::Result<Package> {
    let kind = PackageKind::detect(input)?;
    let extracted = scratch.path().join("extracted");
    let (root, metadata) = match kind {
        PackageKind::Wheel => {
            extract_wheel(input, &extracted)?;
            let metadata = Metadata::from_wheel_dir(&extracted)?;
            (extracted, metadata)
        }
        PackageKind::Sdist => {
            let root = extract_sdist(input, &extracted)?;
            let metadata = Metadata::from_sdist_dir(&root, python)?;
            (root, metadata)
        }
        PackageKind::SourceDir => {
            let metadata = Metadata::from_source_dir(input, python)?;
            (input.to_path_buf(), metadata)
        }
    };
    info!(
        kind = ?kind,
        name = %metadata.name,
        version = %metadata.version,
        "package acquired"
    );
    Ok(Package {
        kind,
        input: input.to_path_buf(),
        root,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_kinds() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope.whl");
        assert!(matches!(PackageKind::detect(&missing), Err(StubError::InvalidPath(_))));

        let wheel = tmp.path().join("a-1.0-py3-none-any.whl");
        fs::write(&wheel, b"").unwrap();
        assert_eq!(PackageKind::detect(&wheel).unwrap(), PackageKind::Wheel);

        let sdist = tmp.path().join("a-1.0.tar.gz");
        fs::write(&sdist, b"").unwrap();
        assert_eq!(PackageKind::detect(&sdist).unwrap(), PackageKind::Sdist);

        let other = tmp.path().join("a.rar");
        fs::write(&other, b"").unwrap();
        assert!(matches!(PackageKind::detect(&other), Err(StubError::UnsupportedArchive(_))));

        assert!(matches!(PackageKind::detect(tmp.path()), Err(StubError::MissingBuildFile(_))));
        fs::write(tmp.path().join("setup.py"), "").unwrap();
        assert_eq!(PackageKind::detect(tmp.path()).unwrap(), PackageKind::SourceDir);
    }

    #[test]
    fn test_scratch_is_removed_on_drop() {
        let tmp = TempDir::new().unwrap();
        let path = {
            let scratch = Scratch::create(tmp.path()).unwrap();
            assert!(scratch
                .path()
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(SCRATCH_PREFIX));
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_fresh_scratch_dirs_are_kept() {
        let tmp = TempDir::new().unwrap();
        let sibling = tmp.path().join("apistub-other-run");
        fs::create_dir_all(&sibling).unwrap();
        let _scratch = Scratch::create(tmp.path()).unwrap();
        assert!(sibling.exists());
    }
}
