//! Object-condition search over the detection store.
//!
//! Validation errors are returned to the caller. Store errors are logged and
//! reported as an empty result.

use serde_json::Value;
use tracing::{debug, error, info};

use framesift_core::Result;
use framesift_store::{DetectionStore, Projection};

use crate::compiler::compile;
use crate::types::{ConditionSpec, ObjectQuery};

/// Validate `specs` and return the keyframe documents satisfying all of them.
pub fn object_search(
    store: &dyn DetectionStore,
    specs: &[ConditionSpec],
    projection: Option<&Projection>,
) -> Result<Vec<Value>> {
    if specs.is_empty() {
        return Ok(Vec::new());
    }
    let query = ObjectQuery::from_specs(specs)?;
    Ok(run_object_query(store, &query, projection))
}

/// Execute an already validated query.
pub fn run_object_query(
    store: &dyn DetectionStore,
    query: &ObjectQuery,
    projection: Option<&Projection>,
) -> Vec<Value> {
    if query.is_empty() {
        return Vec::new();
    }

    let pipeline = compile(query, projection);
    debug!(
        "Object pipeline: {}",
        serde_json::to_string(&pipeline).unwrap_or_default()
    );

    match store.aggregate(&pipeline) {
        Ok(docs) => {
            info!("Object search found {} keyframes", docs.len());
            docs
        }
        Err(e) => {
            error!("Object search failed: {}", e);
            Vec::new()
        }
    }
}
