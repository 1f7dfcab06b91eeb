//! Text-to-keyframe similarity search.

use tracing::{debug, info, warn};

use framesift_core::Result;
use framesift_infer::TextEncoder;
use framesift_store::{OutputField, SearchParams, VectorIndex, VectorSearchRequest};

use crate::types::{KeyframeHit, SimilarityParams};

const OUTPUT_FIELDS: &[OutputField] = &[OutputField::VideoId, OutputField::FrameIndex];

/// Encode `query` and return up to `limit` nearest keyframes, closest first.
///
/// A blank query or a zero limit returns no hits without touching the encoder
/// or the index. Encoder and index failures are returned as errors.
pub fn similarity_search(
    encoder: &dyn TextEncoder,
    index: &dyn VectorIndex,
    params: &SimilarityParams,
    query: &str,
    limit: usize,
) -> Result<Vec<KeyframeHit>> {
    info!("Similarity search: query='{}', limit={}", query, limit);

    if query.trim().is_empty() {
        warn!("Similarity search called with an empty query");
        return Ok(Vec::new());
    }
    if limit == 0 {
        return Ok(Vec::new());
    }

    let vector = encoder.encode(query)?;
    let request = VectorSearchRequest {
        vector: vector.view(),
        field: &params.vector_field,
        params: SearchParams {
            metric: params.metric,
            nprobe: params.nprobe,
        },
        limit,
        output_fields: OUTPUT_FIELDS,
    };

    let hits: Vec<KeyframeHit> = index
        .search(&request)?
        .into_iter()
        .filter_map(|hit| match (hit.video_id, hit.frame_index) {
            (Some(video_id), Some(frame_index)) => Some(KeyframeHit {
                video_id,
                frame_index,
                score: hit.distance,
            }),
            _ => {
                warn!("Vector hit {} is missing output fields, skipping", hit.id);
                None
            }
        })
        .collect();

    debug!("Best distance: {:?}", hits.first().map(|h| h.score));
    info!("Similarity search found {} keyframes", hits.len());
    Ok(hits)
}
