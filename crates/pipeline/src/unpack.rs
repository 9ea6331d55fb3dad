//! Archive extraction into a scratch directory.
//!
//! Vendor help bundles are zip containers, sometimes with a proprietary
//! header prepended. Strategies, in order: read the file as a plain zip;
//! scan the leading bytes for a local-file-header signature and retry on
//! the trailing slice. The source file is never mutated, and the scratch
//! directory is removed on all exit paths by `TempDir`'s RAII.

use std::io::Cursor;
use std::path::Path;
use tempfile::TempDir;
use thiserror::Error;
use tracing::debug;
use zip::ZipArchive;

/// Signature scan window.
const SCAN_WINDOW: usize = 64 * 1024;

const ZIP_SIGNATURE: &[u8; 4] = b"PK\x03\x04";

#[derive(Error, Debug)]
pub enum UnpackError {
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("Zip error: {0}")]
  Zip(#[from] zip::result::ZipError),
  #[error("No archive signature found in {0}")]
  NoSignature(String),
}

/// Extract an archive into a fresh scratch directory under `scratch_root`
/// (system temp when `None`).
pub fn extract_archive(path: &Path, scratch_root: Option<&Path>) -> Result<TempDir, UnpackError> {
  let scratch = match scratch_root {
    Some(root) => {
      std::fs::create_dir_all(root)?;
      TempDir::new_in(root)?
    }
    None => TempDir::new()?,
  };

  let bytes = std::fs::read(path)?;

  // Plain zip
  match ZipArchive::new(Cursor::new(&bytes[..])) {
    Ok(mut archive) => {
      archive.extract(scratch.path())?;
      return Ok(scratch);
    }
    Err(e) => debug!("Plain zip open failed for {:?}: {}", path, e),
  }

  // Offset scan: a vendor header may precede the zip payload
  if let Some(offset) = find_signature(&bytes) {
    debug!("Found zip signature at offset {} in {:?}", offset, path);
    let mut archive = ZipArchive::new(Cursor::new(&bytes[offset..]))?;
    archive.extract(scratch.path())?;
    return Ok(scratch);
  }

  Err(UnpackError::NoSignature(path.display().to_string()))
}

/// Find the first local-file-header signature at a non-zero offset within
/// the scan window.
fn find_signature(bytes: &[u8]) -> Option<usize> {
  let window = &bytes[..bytes.len().min(SCAN_WINDOW)];
  window
    .windows(ZIP_SIGNATURE.len())
    .position(|w| w == ZIP_SIGNATURE)
    .filter(|&offset| offset > 0)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;
  use tempfile::TempDir;
  use zip::write::SimpleFileOptions;

  fn make_zip(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
      let mut writer = zip::ZipWriter::new(&mut cursor);
      for (name, content) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
      }
      writer.finish().unwrap();
    }
    cursor.into_inner()
  }

  #[test]
  fn test_extract_plain_zip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.hbk");
    std::fs::write(&path, make_zip(&[("doc.html", "<h1>T</h1>")])).unwrap();

    let scratch = extract_archive(&path, None).unwrap();
    let content = std::fs::read_to_string(scratch.path().join("doc.html")).unwrap();
    assert_eq!(content, "<h1>T</h1>");
  }

  #[test]
  fn test_extract_with_prepended_header() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.hbk");
    let mut bytes = b"VENDORHDR\x00\x01\x02".to_vec();
    bytes.extend(make_zip(&[("doc.html", "body")]));
    std::fs::write(&path, bytes).unwrap();

    let scratch = extract_archive(&path, None).unwrap();
    assert!(scratch.path().join("doc.html").exists());
  }

  #[test]
  fn test_extract_garbage_fails_without_touching_source() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.hbk");
    std::fs::write(&path, b"definitely not an archive").unwrap();

    assert!(matches!(extract_archive(&path, None), Err(UnpackError::NoSignature(_))));
    assert_eq!(std::fs::read(&path).unwrap(), b"definitely not an archive");
  }

  #[test]
  fn test_scratch_under_configured_root() {
    let dir = TempDir::new().unwrap();
    let scratch_root = dir.path().join("scratch");
    let path = dir.path().join("a.hbk");
    std::fs::write(&path, make_zip(&[("x.html", "y")])).unwrap();

    let scratch = extract_archive(&path, Some(&scratch_root)).unwrap();
    assert!(scratch.path().starts_with(&scratch_root));

    let kept = scratch.path().to_path_buf();
    drop(scratch);
    assert!(!kept.exists(), "scratch dir must be removed on drop");
  }
}
