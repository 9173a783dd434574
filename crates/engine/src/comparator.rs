//! Cross-store content comparison
//!
//! The checker cannot know how a store transforms what it is given, so the
//! decision whether a vector chunk and a graph node still describe the same
//! content is delegated to a [`PayloadComparator`].

use tandem_core::Chunk;

/// Decides whether the two sides of an entity agree
pub trait PayloadComparator: Send + Sync {
    /// Whether the stored vector chunk and graph node carry the same content
    fn matches(&self, vector: &Chunk, graph: &Chunk) -> bool;
}

/// Compares xxh3 fingerprints of chunk content
///
/// Metadata is ignored; stores are free to annotate what they keep.
#[derive(Debug, Clone, Copy, Default)]
pub struct FingerprintComparator;

impl PayloadComparator for FingerprintComparator {
    fn matches(&self, vector: &Chunk, graph: &Chunk) -> bool {
        vector.fingerprint() == graph.fingerprint()
    }
}
