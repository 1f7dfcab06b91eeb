//! framesift ingest: loads precomputed keyframe features and object
//! detector output into the vector index and the detection store.

pub mod detections;
pub mod ingest;
pub mod keyframes;

pub use detections::{read_detection_csv, RESULTS_SUFFIX};
pub use ingest::{IngestReport, IngestSources, Ingester};
pub use keyframes::{frame_index_from_stem, load_video, read_feature_file, VideoFeatures};
