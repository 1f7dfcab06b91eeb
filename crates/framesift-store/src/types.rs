//! Data types for keyframe embeddings, detection documents, and search hits.

use framesift_core::DistanceMetric;
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

/// A single object found in a keyframe by the detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    /// Class label. Detector output calls this column `class`.
    #[serde(alias = "class")]
    pub label: String,
    pub confidence: f64,
    #[serde(default)]
    pub bounding_box: BoundingBox,
}

impl DetectedObject {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
            bounding_box: BoundingBox::default(),
        }
    }

    pub fn with_box(mut self, bounding_box: BoundingBox) -> Self {
        self.bounding_box = bounding_box;
        self
    }
}

/// All detections of one keyframe, unique per `(video_id, frame_index)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionDocument {
    pub video_id: String,
    #[serde(alias = "keyframe_index")]
    pub frame_index: i64,
    #[serde(default)]
    pub objects: Vec<DetectedObject>,
}

impl DetectionDocument {
    pub fn new(video_id: impl Into<String>, frame_index: i64, objects: Vec<DetectedObject>) -> Self {
        Self {
            video_id: video_id.into(),
            frame_index,
            objects,
        }
    }
}

/// A precomputed visual embedding of one keyframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyframeEmbedding {
    pub video_id: String,
    pub frame_index: i64,
    pub vector: Vec<f32>,
}

/// Scalar fields a vector search can return alongside the distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputField {
    VideoId,
    FrameIndex,
}

/// Metric parameters of a vector search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    pub metric: DistanceMetric,
    /// IVF lists to probe.
    pub nprobe: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            metric: DistanceMetric::L2,
            nprobe: 10,
        }
    }
}

/// A nearest-neighbor query against a vector collection.
#[derive(Debug, Clone)]
pub struct VectorSearchRequest<'a> {
    pub vector: ArrayView1<'a, f32>,
    /// Name of the vector field to search.
    pub field: &'a str,
    pub params: SearchParams,
    pub limit: usize,
    pub output_fields: &'a [OutputField],
}

/// One nearest-neighbor hit. Only the requested output fields are populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
    /// Internal record id.
    pub id: i64,
    pub distance: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_index: Option<i64>,
}

/// Outcome of a bulk detection upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
}

impl UpsertSummary {
    pub fn total(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Record counts reported by the stores.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub keyframe_embeddings: u64,
    pub embedding_dimension: usize,
    pub detection_documents: u64,
}
