use sha2::{Digest, Sha256};

/// Hex sha256 of arbitrary bytes. Used for archive content hashes and
/// snippet dedup keys.
pub fn sha256_hex(bytes: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(bytes);
  hex::encode(hasher.finalize())
}

/// Derive a stable 64-bit point id from a key string.
///
/// The id is the first 8 bytes of sha256, big-endian. It is a pure function
/// of the key: the same key yields the same id across runs and processes.
pub fn point_id(key: &str) -> u64 {
  let mut hasher = Sha256::new();
  hasher.update(key.as_bytes());
  let digest = hasher.finalize();
  u64::from_be_bytes(digest[..8].try_into().unwrap_or([0; 8]))
}
