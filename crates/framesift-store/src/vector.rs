//! Vector index interface consumed by the retrieval engine.

use framesift_core::Result;

use crate::types::{KeyframeEmbedding, VectorHit, VectorSearchRequest};

/// A collection of keyframe embeddings supporting nearest-neighbor search.
///
/// Implementations must be safe to share between threads; searches never
/// mutate the stored records.
pub trait VectorIndex: Send + Sync {
    /// Embedding dimension every record of the collection has.
    fn dimension(&self) -> usize;

    /// Approximate nearest-neighbor search. Hits are ordered by
    /// non-decreasing distance and there are at most `request.limit` of them.
    fn search(&self, request: &VectorSearchRequest<'_>) -> Result<Vec<VectorHit>>;

    /// Insert records, replacing any existing record for the same
    /// `(video_id, frame_index)`. Returns the number written.
    fn insert(&self, records: &[KeyframeEmbedding]) -> Result<usize>;

    /// Make inserted records visible to search (rebuilds the ANN index).
    fn flush(&self) -> Result<()>;

    /// Drop all records and recreate the collection.
    fn reset(&self) -> Result<()>;

    /// Number of stored records.
    fn count(&self) -> Result<u64>;
}
