//! Property tests for exact vector index search.

use std::collections::{HashMap, HashSet};

use carbon_rag::RagError;
use carbon_rag::document::{Chunk, IndexEntry};
use carbon_rag::embedding::dot;
use carbon_rag::index::VectorIndex;
use proptest::prelude::*;

const DIM: usize = 8;

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map("non-zero embedding", |mut v| {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm < 1e-6 {
            return None;
        }
        for val in &mut v {
            *val /= norm;
        }
        Some(v)
    })
}

fn chunk(n: usize) -> Chunk {
    Chunk {
        id: format!("doc_{n}"),
        text: format!("chunk number {n}"),
        metadata: HashMap::new(),
        document_id: "doc".to_string(),
        chunk_index: n,
    }
}

fn entries(embeddings: &[Vec<f32>]) -> Vec<IndexEntry> {
    embeddings.iter().enumerate().map(|(i, e)| IndexEntry::new(e.clone(), chunk(i))).collect()
}

/// **Property: search returns the best `min(k, len)` entries in score order**
/// *For any* index and query, results are ordered by descending inner
/// product, contain no duplicates, and number exactly `min(k, len)`.
mod prop_search_ordering {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ordered_and_bounded(
            embeddings in proptest::collection::vec(arb_normalized_embedding(DIM), 1..30),
            query in arb_normalized_embedding(DIM),
            k in 0usize..40,
        ) {
            let index = VectorIndex::build(entries(&embeddings)).unwrap();
            let results = index.search(&query, k).unwrap();

            prop_assert_eq!(results.len(), k.min(embeddings.len()));

            for window in results.windows(2) {
                prop_assert!(
                    window[0].score >= window[1].score,
                    "results not in descending order: {} < {}",
                    window[0].score,
                    window[1].score,
                );
            }

            let ids: HashSet<&str> = results.iter().map(|r| r.chunk.id.as_str()).collect();
            prop_assert_eq!(ids.len(), results.len());

            // Nothing left out scores higher than the last returned result.
            if let Some(last) = results.last() {
                for (i, embedding) in embeddings.iter().enumerate() {
                    if !ids.contains(format!("doc_{i}").as_str()) {
                        prop_assert!(dot(embedding, &query) <= last.score + 1e-6);
                    }
                }
            }
        }

        #[test]
        fn adding_matches_building_from_concatenation(
            first in proptest::collection::vec(arb_normalized_embedding(DIM), 1..15),
            second in proptest::collection::vec(arb_normalized_embedding(DIM), 0..15),
            query in arb_normalized_embedding(DIM),
            k in 1usize..30,
        ) {
            let all: Vec<Vec<f32>> = first.iter().chain(second.iter()).cloned().collect();
            let combined = VectorIndex::build(entries(&all)).unwrap();

            let mut incremental = VectorIndex::build(entries(&first)).unwrap();
            let tail: Vec<IndexEntry> = entries(&all).split_off(first.len());
            incremental.add(tail).unwrap();

            prop_assert_eq!(&incremental, &combined);
            prop_assert_eq!(
                incremental.search(&query, k).unwrap(),
                combined.search(&query, k).unwrap()
            );
        }
    }
}

#[test]
fn building_from_nothing_is_rejected() {
    assert!(matches!(VectorIndex::build(Vec::new()), Err(RagError::EmptyInputError(_))));
}

#[test]
fn ids_start_at_one_and_increase() {
    let mut index = VectorIndex::build(entries(&[vec![1.0, 0.0], vec![0.0, 1.0]])).unwrap();
    index.add(vec![IndexEntry::new(vec![1.0, 0.0], chunk(2))]).unwrap();
    let ids: Vec<u64> = index.entries().iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[test]
fn ties_keep_insertion_order() {
    let same = vec![0.6, 0.8];
    let index = VectorIndex::build(entries(&[same.clone(), same.clone(), same])).unwrap();
    let results = index.search(&[0.6, 0.8], 3).unwrap();
    let ids: Vec<&str> = results.iter().map(|r| r.chunk.id.as_str()).collect();
    assert_eq!(ids, vec!["doc_0", "doc_1", "doc_2"]);
}

#[test]
fn mismatched_entries_leave_index_unchanged() {
    let mut index = VectorIndex::build(entries(&[vec![1.0, 0.0]])).unwrap();
    let before = index.clone();
    let batch = vec![
        IndexEntry::new(vec![0.0, 1.0], chunk(1)),
        IndexEntry::new(vec![0.0, 0.0, 1.0], chunk(2)),
    ];
    let err = index.add(batch).unwrap_err();
    assert!(matches!(err, RagError::DimensionMismatchError { expected: 2, actual: 3 }));
    assert_eq!(index, before);
}

#[test]
fn mismatched_query_is_rejected() {
    let index = VectorIndex::build(entries(&[vec![1.0, 0.0]])).unwrap();
    let err = index.search(&[1.0, 0.0, 0.0], 1).unwrap_err();
    assert!(matches!(err, RagError::DimensionMismatchError { expected: 2, actual: 3 }));
}

#[test]
fn inconsistent_initial_entries_are_rejected() {
    let err = VectorIndex::build(entries(&[vec![1.0, 0.0], vec![1.0]])).unwrap_err();
    assert!(matches!(err, RagError::DimensionMismatchError { expected: 2, actual: 1 }));
}
