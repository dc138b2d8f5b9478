//! Persistence tests for the vector index directory format.

use std::fs;
use std::path::Path;

use carbon_rag::document::{Chunk, IndexEntry};
use carbon_rag::hashing::HashingEmbedder;
use carbon_rag::index::VectorIndex;
use carbon_rag::storage::TEMP_FILE_PREFIX;
use carbon_rag::{MANIFEST_FILE, RagError};

const TEXTS: &[&str] = &[
    "Scope 1 emissions are direct emissions from owned sources.",
    "Scope 2 emissions are indirect emissions from purchased energy.",
    "Carbon offsets are credits purchased to compensate for emissions elsewhere.",
];

fn sample_index() -> VectorIndex {
    let embedder = HashingEmbedder::new(32).unwrap();
    let entries = TEXTS
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let chunk = Chunk {
                id: format!("doc{i}_0"),
                text: text.to_string(),
                metadata: [("source".to_string(), format!("doc{i}.txt"))].into(),
                document_id: format!("doc{i}"),
                chunk_index: 0,
            };
            IndexEntry::new(embedder.embed_sync(text), chunk)
        })
        .collect();
    VectorIndex::build(entries).unwrap()
}

fn data_files(dir: &Path, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok()?.file_name().into_string().ok())
        .filter(|name| name.starts_with(prefix))
        .collect();
    names.sort();
    names
}

#[test]
fn save_then_load_restores_identical_index() {
    let dir = tempfile::tempdir().unwrap();
    let index = sample_index();
    index.save(dir.path()).unwrap();

    let loaded = VectorIndex::load(dir.path()).unwrap();
    assert_eq!(loaded, index);

    let embedder = HashingEmbedder::new(32).unwrap();
    let query = embedder.embed_sync("purchased energy");
    assert_eq!(loaded.search(&query, 3).unwrap(), index.search(&query, 3).unwrap());
}

#[test]
fn save_creates_missing_directories() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("knowledge_base").join("faiss_index");
    sample_index().save(&nested).unwrap();
    assert!(nested.join(MANIFEST_FILE).is_file());
}

#[test]
fn ids_continue_after_reload() {
    let dir = tempfile::tempdir().unwrap();
    sample_index().save(dir.path()).unwrap();

    let mut loaded = VectorIndex::load(dir.path()).unwrap();
    let extra = loaded.entries()[0].clone();
    loaded.add(vec![IndexEntry::new(extra.embedding, extra.chunk)]).unwrap();
    assert_eq!(loaded.entries().last().map(|e| e.id), Some(4));
}

#[test]
fn resave_removes_previous_generation() {
    let dir = tempfile::tempdir().unwrap();
    let mut index = sample_index();
    index.save(dir.path()).unwrap();
    let first_generation = data_files(dir.path(), "vectors-");

    let extra = index.entries()[1].clone();
    index.add(vec![IndexEntry::new(extra.embedding, extra.chunk)]).unwrap();
    index.save(dir.path()).unwrap();

    let vectors = data_files(dir.path(), "vectors-");
    let chunks = data_files(dir.path(), "chunks-");
    assert_eq!(vectors.len(), 1);
    assert_eq!(chunks.len(), 1);
    assert_ne!(vectors, first_generation);
    assert_eq!(VectorIndex::load(dir.path()).unwrap().len(), 4);
}

#[test]
fn save_removes_temp_files_of_an_interrupted_save() {
    let dir = tempfile::tempdir().unwrap();
    let leftover = dir.path().join(format!("{TEMP_FILE_PREFIX}a1b2c3"));
    fs::write(&leftover, b"partial vectors").unwrap();
    let unrelated = dir.path().join(".tmp-other-tool");
    fs::write(&unrelated, b"keep").unwrap();

    sample_index().save(dir.path()).unwrap();

    assert!(!leftover.exists());
    assert!(unrelated.exists());
    assert_eq!(data_files(dir.path(), TEMP_FILE_PREFIX), Vec::<String>::new());
    assert_eq!(VectorIndex::load(dir.path()).unwrap().len(), TEXTS.len());
}

#[test]
fn missing_directory_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = VectorIndex::load(dir.path().join("absent")).unwrap_err();
    assert!(matches!(err, RagError::IndexNotFoundError { .. }));
}

#[test]
fn directory_without_manifest_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("notes.txt"), "not an index").unwrap();
    let err = VectorIndex::load(dir.path()).unwrap_err();
    assert!(matches!(err, RagError::IndexNotFoundError { .. }));
}

#[test]
fn garbage_manifest_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    sample_index().save(dir.path()).unwrap();
    fs::write(dir.path().join(MANIFEST_FILE), "{ not json").unwrap();
    let err = VectorIndex::load(dir.path()).unwrap_err();
    assert!(matches!(err, RagError::IndexCorruptError { .. }));
}

#[test]
fn tampered_vectors_fail_checksum() {
    let dir = tempfile::tempdir().unwrap();
    sample_index().save(dir.path()).unwrap();

    let vectors = dir.path().join(&data_files(dir.path(), "vectors-")[0]);
    let mut bytes = fs::read(&vectors).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&vectors, bytes).unwrap();

    match VectorIndex::load(dir.path()).unwrap_err() {
        RagError::IndexCorruptError { message, .. } => assert!(message.contains("checksum")),
        other => panic!("expected IndexCorruptError, got {other:?}"),
    }
}

#[test]
fn deleted_chunk_store_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    sample_index().save(dir.path()).unwrap();
    fs::remove_file(dir.path().join(&data_files(dir.path(), "chunks-")[0])).unwrap();
    let err = VectorIndex::load(dir.path()).unwrap_err();
    assert!(matches!(err, RagError::IndexCorruptError { .. }));
}

#[test]
fn manifest_pointing_outside_directory_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    sample_index().save(dir.path()).unwrap();

    let manifest_path = dir.path().join(MANIFEST_FILE);
    let mut manifest: serde_json::Value =
        serde_json::from_slice(&fs::read(&manifest_path).unwrap()).unwrap();
    manifest["vectors_file"] = serde_json::Value::from("../vectors.bin");
    fs::write(&manifest_path, serde_json::to_vec(&manifest).unwrap()).unwrap();

    let err = VectorIndex::load(dir.path()).unwrap_err();
    assert!(matches!(err, RagError::IndexCorruptError { .. }));
}
