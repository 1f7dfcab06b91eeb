//! framesift retrieval: keyframe search by text similarity and by detected
//! object conditions.
//!
//! The two paths are independent: [`RetrievalEngine::similarity_search`]
//! ranks keyframes by embedding distance, [`RetrievalEngine::object_search`]
//! compiles conditions into a store pipeline and returns matching documents.

pub mod compiler;
pub mod engine;
pub mod objects;
pub mod similarity;
pub mod types;

pub use compiler::compile;
pub use engine::RetrievalEngine;
pub use objects::{object_search, run_object_query};
pub use similarity::similarity_search;
pub use types::*;
