//! framesift store: keyframe vector index and detection document store.
//!
//! Both stores are consumed by the retrieval engine through the narrow
//! [`VectorIndex`] and [`DetectionStore`] traits. The SQLite implementations
//! persist everything in `data/vectordb/`; object queries reach the detection
//! store as a [`Pipeline`] and are lowered to SQL there.

pub mod detection;
pub mod encoding;
pub mod ivf;
pub mod memory;
pub mod pipeline;
pub mod schema;
pub mod sql;
pub mod sqlite_detection;
pub mod sqlite_vector;
pub mod types;
pub mod vector;

pub use detection::DetectionStore;
pub use ivf::IvfFlatIndex;
pub use memory::MemoryDetectionStore;
pub use pipeline::{CountOf, DocumentField, Expr, ObjectPredicate, Pipeline, Projection, Stage};
pub use sqlite_detection::SqliteDetectionStore;
pub use sqlite_vector::{CollectionConfig, SqliteVectorIndex};
pub use types::*;
pub use vector::VectorIndex;
