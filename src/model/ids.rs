//! Deterministic identifiers.
//!
//! Every identifier is the first 16 bytes of a SHA-256 digest over a composite
//! key. The key layouts below are part of the cache format: changing one
//! requires bumping the cache schema version.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::SymbolKind;

fn digest_uuid(key: &str) -> Uuid {
    let digest = Sha256::digest(key.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

/// Key: `{path}#{kind}#{name}#{line}:{column}`.
pub fn symbol_id(rel_path: &str, kind: SymbolKind, name: &str, line: u32, column: u32) -> Uuid {
    digest_uuid(&format!(
        "{}#{}#{}#{}:{}",
        rel_path,
        kind.as_str(),
        name,
        line,
        column
    ))
}

/// Key: `file#{path}`.
pub fn file_id(rel_path: &str) -> Uuid {
    digest_uuid(&format!("file#{}", rel_path))
}

/// Lowercase hex SHA-256 of file contents.
pub fn content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(64);
    for byte in digest.iter() {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}
