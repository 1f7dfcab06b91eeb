//! In-memory detection store evaluating pipelines with the reference
//! semantics of [`Pipeline::matches`].

use parking_lot::RwLock;
use serde_json::Value;

use framesift_core::Result;

use crate::detection::DetectionStore;
use crate::pipeline::{Pipeline, Projection};
use crate::types::{DetectionDocument, UpsertSummary};

/// Detection store backed by a vector of documents in insertion order.
#[derive(Default)]
pub struct MemoryDetectionStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    docs: Vec<(i64, DetectionDocument)>,
    next_id: i64,
}

impl MemoryDetectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up one document by key.
    pub fn get(&self, video_id: &str, frame_index: i64) -> Option<DetectionDocument> {
        self.inner
            .read()
            .docs
            .iter()
            .find(|(_, d)| d.video_id == video_id && d.frame_index == frame_index)
            .map(|(_, d)| d.clone())
    }
}

impl DetectionStore for MemoryDetectionStore {
    fn aggregate(&self, pipeline: &Pipeline) -> Result<Vec<Value>> {
        let full = Projection::full();
        let projection = pipeline.projection().unwrap_or(&full);
        let inner = self.inner.read();
        Ok(inner
            .docs
            .iter()
            .filter(|(_, doc)| pipeline.matches(doc))
            .map(|(id, doc)| projection.apply(*id, doc))
            .collect())
    }

    fn upsert_many(&self, docs: &[DetectionDocument]) -> Result<UpsertSummary> {
        let mut inner = self.inner.write();
        let mut summary = UpsertSummary::default();
        for doc in docs {
            let existing = inner
                .docs
                .iter()
                .position(|(_, d)| d.video_id == doc.video_id && d.frame_index == doc.frame_index);
            match existing {
                Some(pos) => {
                    inner.docs[pos].1.objects = doc.objects.clone();
                    summary.updated += 1;
                }
                None => {
                    inner.next_id += 1;
                    let id = inner.next_id;
                    inner.docs.push((id, doc.clone()));
                    summary.inserted += 1;
                }
            }
        }
        Ok(summary)
    }

    fn reset(&self) -> Result<()> {
        let mut inner = self.inner.write();
        inner.docs.clear();
        inner.next_id = 0;
        Ok(())
    }

    fn count(&self) -> Result<u64> {
        Ok(self.inner.read().docs.len() as u64)
    }
}
