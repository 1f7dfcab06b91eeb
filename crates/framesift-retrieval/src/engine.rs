//! Retrieval engine: the two query paths over explicit store handles.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use framesift_core::{FramesiftConfig, Result};
use framesift_infer::TextEncoder;
use framesift_ingest::{IngestSources, Ingester};
use framesift_store::{
    CollectionConfig, DetectionStore, Projection, SqliteDetectionStore, SqliteVectorIndex,
    StoreStats, VectorIndex,
};

use crate::objects;
use crate::similarity;
use crate::types::{ConditionSpec, KeyframeHit, ObjectQuery, SimilarityParams};

/// Keyframe retrieval over a vector index and a detection store.
pub struct RetrievalEngine {
    vectors: Arc<dyn VectorIndex>,
    detections: Arc<dyn DetectionStore>,
    encoder: Arc<dyn TextEncoder>,
    params: SimilarityParams,
}

impl RetrievalEngine {
    pub fn new(
        vectors: Arc<dyn VectorIndex>,
        detections: Arc<dyn DetectionStore>,
        encoder: Arc<dyn TextEncoder>,
        params: SimilarityParams,
    ) -> Self {
        info!(
            "Retrieval engine ready: field={}, metric={}, nprobe={}, encoder available={}",
            params.vector_field,
            params.metric,
            params.nprobe,
            encoder.is_available()
        );
        Self {
            vectors,
            detections,
            encoder,
            params,
        }
    }

    /// Open the SQLite stores under the configured data directory. Runs a
    /// full ingestion first when `config.reingest` is set.
    pub fn open(config: &FramesiftConfig, encoder: Arc<dyn TextEncoder>) -> Result<Self> {
        let vectors = SqliteVectorIndex::open(
            &config.data_paths.vectordb,
            CollectionConfig {
                name: config.keyframe_collection.clone(),
                vector_field: config.vector_field.clone(),
                dimension: config.embedding_dim,
                metric: config.metric,
                nlist: config.nlist,
            },
        )?;
        let detections = SqliteDetectionStore::open(&config.data_paths.vectordb)?;

        if config.reingest {
            info!("Re-ingesting data before serving queries");
            Ingester::new(&vectors, &detections)
                .run(&IngestSources::from_paths(&config.data_paths))?;
        }

        Ok(Self::new(
            Arc::new(vectors),
            Arc::new(detections),
            encoder,
            SimilarityParams::from_config(config),
        ))
    }

    /// Nearest keyframes to a free-text query, closest first.
    pub fn similarity_search(&self, query: &str, limit: usize) -> Result<Vec<KeyframeHit>> {
        similarity::similarity_search(
            self.encoder.as_ref(),
            self.vectors.as_ref(),
            &self.params,
            query,
            limit,
        )
    }

    /// Keyframe documents satisfying every condition.
    pub fn object_search(
        &self,
        conditions: &[ConditionSpec],
        projection: Option<&Projection>,
    ) -> Result<Vec<Value>> {
        objects::object_search(self.detections.as_ref(), conditions, projection)
    }

    /// Typed variant of [`Self::object_search`].
    pub fn run_object_query(&self, query: &ObjectQuery, projection: Option<&Projection>) -> Vec<Value> {
        objects::run_object_query(self.detections.as_ref(), query, projection)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            keyframe_embeddings: self.vectors.count()?,
            embedding_dimension: self.vectors.dimension(),
            detection_documents: self.detections.count()?,
        })
    }

    /// Release the store handles.
    pub fn shutdown(self) {
        info!("Shutting down retrieval engine");
        drop(self.vectors);
        drop(self.detections);
        drop(self.encoder);
        info!("Store connections closed");
    }
}
