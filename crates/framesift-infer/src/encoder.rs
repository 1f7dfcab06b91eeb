//! Text encoder trait and the fallback implementation.
//!
//! A `TextEncoder` maps a natural-language query into the same embedding
//! space as the stored keyframe vectors (CLIP text tower for CLIP image
//! features). The dimension must match the vector index.

use ndarray::Array1;

use framesift_core::{Error, Result};

/// Encodes query text into a dense vector.
pub trait TextEncoder: Send + Sync {
    /// Embed `text`. Fails if no model is loaded or inference fails.
    fn encode(&self, text: &str) -> Result<Array1<f32>>;

    /// Output dimension.
    fn dimension(&self) -> usize;

    /// Whether a model is loaded.
    fn is_available(&self) -> bool;
}

/// Encoder used when no model could be loaded. Every `encode` call fails,
/// so similarity search reports a hard error instead of silently returning
/// nothing.
pub struct UnavailableEncoder {
    dim: usize,
}

impl UnavailableEncoder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl TextEncoder for UnavailableEncoder {
    fn encode(&self, _text: &str) -> Result<Array1<f32>> {
        Err(Error::Inference("no text encoder model is loaded".into()))
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// Scale `v` to unit length. Near-zero vectors are returned unchanged.
pub fn l2_normalize(v: Array1<f32>) -> Array1<f32> {
    let norm = v.dot(&v).sqrt();
    if norm > 1e-12 {
        v / norm
    } else {
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_unavailable_encoder_fails() {
        let encoder = UnavailableEncoder::new(512);
        assert!(!encoder.is_available());
        assert_eq!(encoder.dimension(), 512);
        assert!(matches!(encoder.encode("a red car"), Err(Error::Inference(_))));
    }

    #[test]
    fn test_l2_normalize() {
        let v = l2_normalize(array![3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let zero = l2_normalize(array![0.0, 0.0]);
        assert_eq!(zero, array![0.0, 0.0]);
    }
}
