//! On-disk persistence for [`VectorIndex`].
//!
//! An index directory holds three files:
//!
//! - `manifest.json`: format version, dimensionality, entry count, the
//!   current generation's data file names and their SHA-256 digests
//! - `vectors-<generation>.bin`: a small header followed by the embeddings
//!   as little-endian `f32` rows, in entry order
//! - `chunks-<generation>.json`: entry ids and chunk payloads, in the same order
//!
//! A save writes a fresh generation of data files and then atomically
//! replaces the manifest, so a reader sees either the previous snapshot or
//! the new one. Files from older generations are removed afterwards.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::document::{Chunk, IndexEntry};
use crate::error::{RagError, Result};
use crate::index::VectorIndex;

/// File name of the index manifest.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Prefix of the temporary files [`VectorIndex::save`] renames into place.
pub const TEMP_FILE_PREFIX: &str = ".tmp-carbon-rag-";

const FORMAT_VERSION: u32 = 1;
const VECTORS_MAGIC: &[u8; 4] = b"CRVI";
/// Magic (4) + version (4) + dimensions (4) + count (8).
const VECTORS_HEADER_LEN: usize = 20;

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    format_version: u32,
    generation: String,
    dimensions: usize,
    entry_count: usize,
    vectors_file: String,
    vectors_sha256: String,
    chunks_file: String,
    chunks_sha256: String,
}

#[derive(Serialize, Deserialize)]
struct StoredChunk {
    id: u64,
    chunk: Chunk,
}

impl VectorIndex {
    /// Persist a complete snapshot of this index into `dir`.
    ///
    /// The directory is created if needed. Data files are written under a
    /// new generation name before the manifest is atomically replaced.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IoError`] if any file cannot be written.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| RagError::io(dir, e))?;

        let generation = Uuid::new_v4().simple().to_string();
        let vectors_file = format!("vectors-{generation}.bin");
        let chunks_file = format!("chunks-{generation}.json");

        let vector_bytes = encode_vectors(self);
        let stored: Vec<StoredChunk> = self
            .entries()
            .iter()
            .map(|entry| StoredChunk { id: entry.id, chunk: entry.chunk.clone() })
            .collect();
        let chunk_bytes = serde_json::to_vec(&stored)
            .map_err(|e| RagError::io(dir.join(&chunks_file), io::Error::other(e)))?;

        write_atomic(dir, &vectors_file, &vector_bytes)?;
        write_atomic(dir, &chunks_file, &chunk_bytes)?;

        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            generation: generation.clone(),
            dimensions: self.dimensions(),
            entry_count: self.len(),
            vectors_sha256: sha256_hex(&vector_bytes),
            chunks_sha256: sha256_hex(&chunk_bytes),
            vectors_file,
            chunks_file,
        };
        let manifest_bytes = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| RagError::io(dir.join(MANIFEST_FILE), io::Error::other(e)))?;
        write_atomic(dir, MANIFEST_FILE, &manifest_bytes)?;

        remove_stale_generations(dir, &manifest);
        info!(path = %dir.display(), entry_count = self.len(), %generation, "saved vector index");
        Ok(())
    }

    /// Restore an index previously written by [`save`](VectorIndex::save).
    ///
    /// # Errors
    ///
    /// - [`RagError::IndexNotFoundError`] if `dir` or its manifest does not exist
    /// - [`RagError::IndexCorruptError`] if any file is unreadable as an index,
    ///   fails its checksum, or disagrees with the manifest
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest_bytes = match fs::read(&manifest_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(RagError::IndexNotFoundError { path: dir.to_path_buf() });
            }
            Err(e) => return Err(RagError::io(manifest_path, e)),
        };

        let manifest: Manifest = serde_json::from_slice(&manifest_bytes)
            .map_err(|e| RagError::corrupt(&manifest_path, format!("invalid manifest: {e}")))?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(RagError::corrupt(
                &manifest_path,
                format!("unsupported format version {}", manifest.format_version),
            ));
        }

        let vectors_path = data_file_path(dir, &manifest.vectors_file)?;
        let vector_bytes = read_checked(&vectors_path, &manifest.vectors_sha256)?;
        let embeddings = decode_vectors(&vectors_path, &vector_bytes, &manifest)?;

        let chunks_path = data_file_path(dir, &manifest.chunks_file)?;
        let chunk_bytes = read_checked(&chunks_path, &manifest.chunks_sha256)?;
        let stored: Vec<StoredChunk> = serde_json::from_slice(&chunk_bytes)
            .map_err(|e| RagError::corrupt(&chunks_path, format!("invalid chunk store: {e}")))?;
        if stored.len() != manifest.entry_count {
            return Err(RagError::corrupt(
                &chunks_path,
                format!("expected {} chunks, found {}", manifest.entry_count, stored.len()),
            ));
        }
        if stored.windows(2).any(|pair| pair[0].id >= pair[1].id) {
            return Err(RagError::corrupt(&chunks_path, "entry ids are not strictly increasing"));
        }

        let entries: Vec<IndexEntry> = stored
            .into_iter()
            .zip(embeddings)
            .map(|(stored, embedding)| IndexEntry { id: stored.id, embedding, chunk: stored.chunk })
            .collect();

        info!(path = %dir.display(), entry_count = entries.len(), "loaded vector index");
        Ok(VectorIndex::from_parts(manifest.dimensions, entries))
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Write `bytes` to `dir/name` through a temporary file and an atomic rename.
fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<()> {
    let target = dir.join(name);
    let mut file = tempfile::Builder::new()
        .prefix(TEMP_FILE_PREFIX)
        .tempfile_in(dir)
        .map_err(|e| RagError::io(dir, e))?;
    file.write_all(bytes).map_err(|e| RagError::io(file.path().to_path_buf(), e))?;
    file.as_file().sync_all().map_err(|e| RagError::io(file.path().to_path_buf(), e))?;
    file.persist(&target).map_err(|e| RagError::io(&target, e.error))?;
    debug!(path = %target.display(), bytes = bytes.len(), "wrote index file");
    Ok(())
}

/// Delete data files of older generations and temporary files left by an
/// interrupted save.
fn remove_stale_generations(dir: &Path, current: &Manifest) {
    let Ok(listing) = fs::read_dir(dir) else { return };
    for entry in listing.filter_map(std::result::Result::ok) {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let is_data_file = (name.starts_with("vectors-") && name.ends_with(".bin"))
            || (name.starts_with("chunks-") && name.ends_with(".json"));
        let is_stale = name.starts_with(TEMP_FILE_PREFIX)
            || (is_data_file && name != current.vectors_file && name != current.chunks_file);
        if !is_stale {
            continue;
        }
        if let Err(e) = fs::remove_file(entry.path()) {
            warn!(path = %entry.path().display(), error = %e, "failed to remove stale index file");
        }
    }
}

/// Resolve a data file named by the manifest, refusing anything but a bare file name.
fn data_file_path(dir: &Path, name: &str) -> Result<PathBuf> {
    let path = Path::new(name);
    if name.is_empty() || path.file_name().and_then(|n| n.to_str()) != Some(name) {
        return Err(RagError::corrupt(
            dir.join(MANIFEST_FILE),
            format!("invalid data file name '{name}'"),
        ));
    }
    Ok(dir.join(path))
}

fn read_checked(path: &Path, expected_sha256: &str) -> Result<Vec<u8>> {
    let bytes = fs::read(path)
        .map_err(|e| RagError::corrupt(path, format!("unreadable data file: {e}")))?;
    if sha256_hex(&bytes) != expected_sha256 {
        return Err(RagError::corrupt(path, "checksum mismatch"));
    }
    Ok(bytes)
}

fn encode_vectors(index: &VectorIndex) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(
        VECTORS_HEADER_LEN + index.len() * index.dimensions() * std::mem::size_of::<f32>(),
    );
    bytes.extend_from_slice(VECTORS_MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&(index.dimensions() as u32).to_le_bytes());
    bytes.extend_from_slice(&(index.len() as u64).to_le_bytes());
    for entry in index.entries() {
        for value in &entry.embedding {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
    }
    bytes
}

fn decode_vectors(path: &Path, bytes: &[u8], manifest: &Manifest) -> Result<Vec<Vec<f32>>> {
    if bytes.len() < VECTORS_HEADER_LEN || &bytes[..4] != VECTORS_MAGIC {
        return Err(RagError::corrupt(path, "missing vector file header"));
    }
    let read_u32 = |offset: usize| {
        u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
    };
    let version = read_u32(4);
    let dimensions = read_u32(8) as usize;
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&bytes[12..20]);
    let count = u64::from_le_bytes(count_bytes) as usize;

    if version != FORMAT_VERSION {
        return Err(RagError::corrupt(path, format!("unsupported vector file version {version}")));
    }
    if dimensions == 0 || dimensions != manifest.dimensions || count != manifest.entry_count {
        return Err(RagError::corrupt(
            path,
            format!(
                "header says {count} x {dimensions}, manifest says {} x {}",
                manifest.entry_count, manifest.dimensions
            ),
        ));
    }

    let payload = &bytes[VECTORS_HEADER_LEN..];
    let expected_len = count
        .checked_mul(dimensions)
        .and_then(|n| n.checked_mul(std::mem::size_of::<f32>()))
        .ok_or_else(|| RagError::corrupt(path, "vector payload size overflows"))?;
    if payload.len() != expected_len {
        return Err(RagError::corrupt(
            path,
            format!("expected {expected_len} payload bytes, found {}", payload.len()),
        ));
    }

    let mut embeddings = Vec::with_capacity(count);
    for row in payload.chunks_exact(dimensions * std::mem::size_of::<f32>()) {
        let mut embedding = Vec::with_capacity(dimensions);
        for value in row.chunks_exact(4) {
            let value = f32::from_le_bytes([value[0], value[1], value[2], value[3]]);
            if !value.is_finite() {
                return Err(RagError::corrupt(path, "embedding contains non-finite values"));
            }
            embedding.push(value);
        }
        embeddings.push(embedding);
    }
    Ok(embeddings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_data_file_names_with_directories() {
        let dir = Path::new("/tmp/index");
        assert!(data_file_path(dir, "vectors-abc.bin").is_ok());
        assert!(data_file_path(dir, "../vectors-abc.bin").is_err());
        assert!(data_file_path(dir, "nested/chunks.json").is_err());
        assert!(data_file_path(dir, "").is_err());
    }

    #[test]
    fn sha256_hex_is_lowercase_hex() {
        let digest = sha256_hex(b"scope");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
