//! Wheel and source distribution extraction.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::debug;

use crate::error::StubError;

fn extract_error(path: &Path, reason: impl ToString) -> StubError {
    StubError::Extract {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Unpack a wheel (a zip archive) into `dest`.
pub fn extract_wheel(archive: &Path, dest: &Path) -> Result<(), StubError> {
    let file = File::open(archive).map_err(|e| extract_error(archive, e))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| extract_error(archive, e))?;
    fs::create_dir_all(dest)?;
    zip.extract(dest).map_err(|e| extract_error(archive, e))?;
    debug!(archive = %archive.display(), entries = zip.len(), "extracted wheel");
    Ok(())
}

/// Unpack a gzipped tarball into `dest` and return the package root.
///
/// Source distributions conventionally wrap everything in a single
/// `<name>-<version>/` folder; when that is the case the folder is the root.
pub fn extract_sdist(archive: &Path, dest: &Path) -> Result<PathBuf, StubError> {
    let file = File::open(archive).map_err(|e| extract_error(archive, e))?;
    let mut tarball = tar::Archive::new(GzDecoder::new(file));
    fs::create_dir_all(dest)?;
    tarball.unpack(dest).map_err(|e| extract_error(archive, e))?;
    debug!(archive = %archive.display(), "extracted source distribution");
    Ok(single_top_folder(dest)?.unwrap_or_else(|| dest.to_path_buf()))
}

fn single_top_folder(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut entries = fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    if entries.len() != 1 {
        return Ok(None);
    }
    let entry = entries.remove(0);
    Ok(entry.file_type()?.is_dir().then(|| entry.path()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_extract_wheel() {
        let tmp = TempDir::new().unwrap();
        let wheel = tmp.path().join("pkg-1.0-py3-none-any.whl");
        let mut zip = zip::ZipWriter::new(File::create(&wheel).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("pkg/__init__.py", options).unwrap();
        zip.write_all(b"X = 1\n").unwrap();
        zip.start_file("pkg-1.0.dist-info/METADATA", options).unwrap();
        zip.write_all(b"Name: pkg\nVersion: 1.0\n").unwrap();
        zip.finish().unwrap();

        let dest = tmp.path().join("out");
        extract_wheel(&wheel, &dest).unwrap();
        assert!(dest.join("pkg/__init__.py").is_file());
        assert!(dest.join("pkg-1.0.dist-info/METADATA").is_file());
    }

    #[test]
    fn test_extract_sdist_flattens_single_folder() {
        let tmp = TempDir::new().unwrap();
        let sdist = tmp.path().join("pkg-1.0.tar.gz");
        let mut builder = tar::Builder::new(GzEncoder::new(File::create(&sdist).unwrap(), Compression::default()));
        let body = b"X = 1\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "pkg-1.0/pkg/__init__.py", &body[..]).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let dest = tmp.path().join("out");
        let root = extract_sdist(&sdist, &dest).unwrap();
        assert_eq!(root, dest.join("pkg-1.0"));
        assert!(root.join("pkg/__init__.py").is_file());
    }

    #[test]
    fn test_corrupt_wheel_is_extract_error() {
        let tmp = TempDir::new().unwrap();
        let wheel = tmp.path().join("bad.whl");
        fs::write(&wheel, b"not a zip").unwrap();
        let err = extract_wheel(&wheel, &tmp.path().join("out")).unwrap_err();
        assert!(matches!(err, StubError::Extract { .. }));
    }
}
