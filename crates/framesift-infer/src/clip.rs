//! ONNX CLIP text encoder.
//!
//! Loads an exported CLIP text tower and its tokenizer and produces
//! unit-length query embeddings in the CLIP joint space. Requires the `onnx`
//! feature.

#[cfg(feature = "onnx")]
mod inner {
    use std::path::Path;

    use ndarray::Array1;
    use ort::session::Session;
    use ort::value::Tensor;
    use parking_lot::Mutex;
    use tokenizers::Tokenizer;
    use tracing::{debug, info};

    use framesift_core::{Error, Result};

    use crate::cache::EncodingCache;
    use crate::encoder::{l2_normalize, TextEncoder};

    /// CLIP context length.
    const CONTEXT_LENGTH: usize = 77;

    /// CLIP text encoder backed by ONNX Runtime.
    pub struct OnnxClipEncoder {
        session: Mutex<Session>,
        tokenizer: Tokenizer,
        cache: EncodingCache,
        dimension: usize,
    }

    impl OnnxClipEncoder {
        /// Load `model_dir/text_model.onnx` and `model_dir/tokenizer.json`.
        ///
        /// `dimension` is the expected output size; a model producing another
        /// size is rejected on first use.
        pub fn load(model_dir: &Path, dimension: usize) -> Result<Self> {
            let model_path = model_dir.join("text_model.onnx");
            let tokenizer_path = model_dir.join("tokenizer.json");

            if !model_path.exists() {
                return Err(Error::NotFound(format!(
                    "Text model not found: {}",
                    model_path.display()
                )));
            }
            if !tokenizer_path.exists() {
                return Err(Error::NotFound(format!(
                    "Tokenizer not found: {}",
                    tokenizer_path.display()
                )));
            }

            // With load-dynamic, ORT_DYLIB_PATH must point to libonnxruntime.so
            ort::init().commit();

            let session = Session::builder()
                .map_err(|e| Error::Inference(format!("Failed to create session builder: {}", e)))?
                .with_intra_threads(2)
                .map_err(|e| Error::Inference(format!("Failed to set threads: {}", e)))?
                .commit_from_file(&model_path)
                .map_err(|e| Error::Inference(format!("Failed to load ONNX model: {}", e)))?;

            let tokenizer = Tokenizer::from_file(&tokenizer_path)
                .map_err(|e| Error::Inference(format!("Failed to load tokenizer: {}", e)))?;

            info!(
                "CLIP text encoder loaded: dim={}, model={}",
                dimension,
                model_path.display()
            );

            Ok(Self {
                session: Mutex::new(session),
                tokenizer,
                cache: EncodingCache::default(),
                dimension,
            })
        }

        fn infer(&self, text: &str) -> Result<Array1<f32>> {
            let encoding = self
                .tokenizer
                .encode(text, true)
                .map_err(|e| Error::Inference(format!("Tokenization failed: {}", e)))?;

            let seq_len = encoding.get_ids().len().min(CONTEXT_LENGTH);
            if seq_len == 0 {
                return Err(Error::Inference("Tokenizer produced no tokens".into()));
            }
            let ids: Vec<i64> = encoding.get_ids()[..seq_len]
                .iter()
                .map(|&id| id as i64)
                .collect();
            let mask: Vec<i64> = encoding.get_attention_mask()[..seq_len]
                .iter()
                .map(|&m| m as i64)
                .collect();

            let ids_tensor = Tensor::from_array(([1usize, seq_len], ids))
                .map_err(|e| Error::Inference(format!("Failed to create ids tensor: {}", e)))?;
            let mask_tensor = Tensor::from_array(([1usize, seq_len], mask.clone()))
                .map_err(|e| Error::Inference(format!("Failed to create mask tensor: {}", e)))?;

            let mut session = self.session.lock();
            let outputs = session
                .run(ort::inputs![ids_tensor, mask_tensor])
                .map_err(|e| Error::Inference(format!("ONNX inference failed: {}", e)))?;

            // Projected text embeddings come out as [1, dim]; a bare text
            // transformer yields [1, seq_len, dim] and is mean-pooled.
            let (shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| Error::Inference(format!("Failed to extract output: {}", e)))?;
            let dims: Vec<i64> = shape.iter().copied().collect();

            let embedding = match dims.as_slice() {
                [1, dim] => Array1::from_vec(data[..*dim as usize].to_vec()),
                [1, _, dim] => {
                    let dim = *dim as usize;
                    let mut pooled = Array1::<f32>::zeros(dim);
                    let mut weight = 0.0f32;
                    for (t, &m) in mask.iter().enumerate() {
                        if m > 0 {
                            let offset = t * dim;
                            for d in 0..dim {
                                pooled[d] += data[offset + d];
                            }
                            weight += 1.0;
                        }
                    }
                    if weight == 0.0 {
                        return Err(Error::Inference("Empty attention mask".into()));
                    }
                    pooled / weight
                }
                other => {
                    return Err(Error::Inference(format!(
                        "Unexpected output shape: {:?}",
                        other
                    )))
                }
            };

            if embedding.len() != self.dimension {
                return Err(Error::DimensionMismatch {
                    expected: self.dimension,
                    actual: embedding.len(),
                });
            }
            Ok(l2_normalize(embedding))
        }
    }

    impl TextEncoder for OnnxClipEncoder {
        fn encode(&self, text: &str) -> Result<Array1<f32>> {
            if let Some(cached) = self.cache.get(text) {
                debug!("Encoding cache hit");
                return Ok(cached);
            }
            let embedding = self.infer(text)?;
            self.cache.insert(text, embedding.clone());
            Ok(embedding)
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn is_available(&self) -> bool {
            true
        }
    }
}

#[cfg(feature = "onnx")]
pub use inner::OnnxClipEncoder;
