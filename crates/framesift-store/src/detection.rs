//! Detection store interface consumed by the retrieval engine.

use framesift_core::Result;
use serde_json::Value;

use crate::pipeline::Pipeline;
use crate::types::{DetectionDocument, UpsertSummary};

/// Per-keyframe detection documents queryable by aggregation pipeline.
pub trait DetectionStore: Send + Sync {
    /// Run a pipeline and return the matching documents, projected.
    fn aggregate(&self, pipeline: &Pipeline) -> Result<Vec<Value>>;

    /// Upsert documents keyed by `(video_id, frame_index)`. An existing
    /// document has its `objects` array replaced, not extended.
    fn upsert_many(&self, docs: &[DetectionDocument]) -> Result<UpsertSummary>;

    /// Drop all documents and recreate the schema and indexes.
    fn reset(&self) -> Result<()>;

    /// Number of stored documents.
    fn count(&self) -> Result<u64>;
}
