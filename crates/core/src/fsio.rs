use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io;
use std::path::Path;

/// Write bytes to `path` via a temp file and atomic rename, so concurrent
/// readers never observe a partial file.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent)?;
  }
  let tmp = path.with_extension("tmp");
  std::fs::write(&tmp, bytes)?;
  std::fs::rename(&tmp, path)
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
  let bytes = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
  atomic_write(path, &bytes)
}

/// Read and deserialize a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> io::Result<T> {
  let bytes = std::fs::read(path)?;
  serde_json::from_slice(&bytes).map_err(io::Error::other)
}
