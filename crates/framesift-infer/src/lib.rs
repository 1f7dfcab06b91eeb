//! framesift infer: text encoders for cross-modal keyframe search.
//!
//! Provides the `TextEncoder` trait. When the `onnx` feature is enabled and
//! the CLIP text model is present, `OnnxClipEncoder` embeds queries into the
//! keyframe vector space. Without it, `UnavailableEncoder` is used and
//! similarity search reports an inference error.

pub mod cache;
pub mod clip;
pub mod encoder;

pub use cache::EncodingCache;
pub use encoder::{l2_normalize, TextEncoder, UnavailableEncoder};

#[cfg(feature = "onnx")]
pub use clip::OnnxClipEncoder;

use std::path::Path;
use std::sync::Arc;

/// Create the best available encoder for the given model directory.
///
/// Tries the ONNX CLIP encoder first (if the feature is enabled and the model
/// files are present), falls back to `UnavailableEncoder`.
pub fn create_encoder(model_dir: &Path, dim: usize) -> Arc<dyn TextEncoder> {
    #[cfg(feature = "onnx")]
    {
        match OnnxClipEncoder::load(model_dir, dim) {
            Ok(encoder) => {
                tracing::info!("Using ONNX CLIP text encoder (dim={})", encoder.dimension());
                return Arc::new(encoder);
            }
            Err(e) => {
                tracing::warn!("CLIP text encoder unavailable: {}. Similarity search disabled.", e);
            }
        }
    }

    #[cfg(not(feature = "onnx"))]
    {
        tracing::info!(
            "ONNX feature disabled; no text encoder for {}. Similarity search disabled.",
            model_dir.display()
        );
    }

    Arc::new(UnavailableEncoder::new(dim))
}
