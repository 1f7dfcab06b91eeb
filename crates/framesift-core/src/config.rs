//! Configuration and data directory management.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Paths to all framesift data directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// SQLite databases for both stores (`data/vectordb/`).
    pub vectordb: PathBuf,
    /// Per-video directories of precomputed keyframe embeddings (`data/clip-features/`).
    pub clip_features: PathBuf,
    /// Detector output, one `<video>_rfdetr_results.csv` per video (`data/object-detection/`).
    pub object_detection: PathBuf,
    /// Text encoder model files (`data/models/`).
    pub models: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            vectordb: root.join("vectordb"),
            clip_features: root.join("clip-features"),
            object_detection: root.join("object-detection"),
            models: root.join("models"),
            root,
        };
        paths.ensure_dirs()?;
        Ok(paths)
    }

    fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.vectordb)?;
        std::fs::create_dir_all(&self.clip_features)?;
        std::fs::create_dir_all(&self.object_detection)?;
        std::fs::create_dir_all(&self.models)?;
        Ok(())
    }
}

/// Distance metric of a vector collection. Lower distance means more similar
/// for every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Squared Euclidean distance.
    L2,
    /// `1 - cosine_similarity`.
    Cosine,
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::L2 => write!(f, "l2"),
            Self::Cosine => write!(f, "cosine"),
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l2" | "euclidean" => Ok(Self::L2),
            "cosine" | "cos" => Ok(Self::Cosine),
            other => Err(Error::Config(format!("unknown distance metric '{}'", other))),
        }
    }
}

/// Top-level framesift configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FramesiftConfig {
    /// Data directory paths.
    pub data_paths: DataPaths,
    /// Embedding dimension (512 for CLIP ViT-B/32).
    pub embedding_dim: usize,
    /// Name of the keyframe vector collection.
    pub keyframe_collection: String,
    /// Name of the vector field searched by similarity queries.
    pub vector_field: String,
    /// Distance metric the collection is indexed with.
    pub metric: DistanceMetric,
    /// Number of IVF lists built at index time.
    pub nlist: usize,
    /// Number of IVF lists probed per query.
    pub nprobe: usize,
    /// Default hit limit for similarity search.
    pub search_limit: usize,
    /// Re-run the full ingestion before the engine serves queries.
    pub reingest: bool,
}

impl FramesiftConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> Result<Self> {
        Self::from_lookup(data_dir, |key| std::env::var(key).ok())
    }

    /// Create configuration reading overrides through `lookup` instead of the
    /// process environment.
    pub fn from_lookup<F>(data_dir: impl AsRef<Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_paths = DataPaths::new(data_dir)?;

        let embedding_dim = parse_var(&lookup, "FRAMESIFT_EMBEDDING_DIM", 512)?;
        if embedding_dim == 0 {
            return Err(Error::Config(
                "FRAMESIFT_EMBEDDING_DIM must be greater than 0".into(),
            ));
        }

        let metric = match lookup("FRAMESIFT_METRIC") {
            Some(v) => v.parse()?,
            None => DistanceMetric::L2,
        };

        let reingest = lookup("FRAMESIFT_REINGEST")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let config = Self {
            data_paths,
            embedding_dim,
            keyframe_collection: lookup("FRAMESIFT_KEYFRAME_COLLECTION")
                .unwrap_or_else(|| "keyframes".to_string()),
            vector_field: "keyframe_vector".to_string(),
            metric,
            nlist: parse_var(&lookup, "FRAMESIFT_NLIST", 128)?,
            nprobe: parse_var(&lookup, "FRAMESIFT_NPROBE", 10)?,
            search_limit: parse_var(&lookup, "FRAMESIFT_SEARCH_LIMIT", 200)?,
            reingest,
        };
        debug!(
            "Config: dim={}, collection={}, metric={}, nlist={}, nprobe={}, root={}",
            config.embedding_dim,
            config.keyframe_collection,
            config.metric,
            config.nlist,
            config.nprobe,
            config.data_paths.root.display()
        );
        Ok(config)
    }
}

fn parse_var<F>(lookup: &F, key: &str, default: usize) -> Result<usize>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{} must be a positive integer, got '{}'", key, raw))),
        None => Ok(default),
    }
}
