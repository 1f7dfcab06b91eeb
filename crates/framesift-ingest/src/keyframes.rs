//! Keyframe feature loading.
//!
//! Layout: `clip-features/<video_id>/<name>_<frame>.{json,f32,bin}`, one file
//! per keyframe. JSON files hold a (possibly nested) numeric array; `.f32`
//! and `.bin` files are raw little-endian f32. PyTorch `.pt` tensors cannot
//! be read and are counted as skipped; convert them to one of the above first.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use framesift_core::{Error, Result};
use framesift_store::encoding::blob_to_vector;
use framesift_store::KeyframeEmbedding;

static TRAILING_INDEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)$").unwrap());

/// Frame index encoded as the trailing integer of a file stem
/// (`keyframe_12` → 12).
pub fn frame_index_from_stem(stem: &str) -> Option<i64> {
    TRAILING_INDEX
        .captures(stem.trim())
        .and_then(|c| c[1].parse().ok())
}

/// Whether `path` has a supported feature file extension.
pub fn is_feature_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("json" | "f32" | "bin")
    )
}

/// Whether `path` is a PyTorch tensor file.
pub fn is_torch_file(path: &Path) -> bool {
    matches!(path.extension().and_then(|e| e.to_str()), Some("pt" | "pth"))
}

/// Read one feature vector.
pub fn read_feature_file(path: &Path) -> Result<Vec<f32>> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => {
            let value: Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
            let mut out = Vec::new();
            flatten_numbers(&value, &mut out)?;
            Ok(out)
        }
        Some("f32" | "bin") => blob_to_vector(&std::fs::read(path)?),
        _ => Err(Error::Ingest(format!(
            "Unsupported feature file: {}",
            path.display()
        ))),
    }
}

fn flatten_numbers(value: &Value, out: &mut Vec<f32>) -> Result<()> {
    match value {
        Value::Array(items) => {
            for item in items {
                flatten_numbers(item, out)?;
            }
            Ok(())
        }
        Value::Number(n) => {
            let x = n
                .as_f64()
                .ok_or_else(|| Error::Ingest(format!("Non-finite feature value: {}", n)))?;
            out.push(x as f32);
            Ok(())
        }
        other => Err(Error::Ingest(format!(
            "Expected a numeric array, found {}",
            other
        ))),
    }
}

/// All keyframe embeddings of one video.
#[derive(Debug, Default)]
pub struct VideoFeatures {
    pub video_id: String,
    /// Sorted by frame index.
    pub embeddings: Vec<KeyframeEmbedding>,
    /// Files that could not be used.
    pub skipped: usize,
}

/// Sub-directories of `root`, sorted by name. Each is one video.
pub fn list_videos(root: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(root)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Load every feature file of one video directory. Unreadable files, files
/// without a frame index and vectors of the wrong dimension are skipped.
pub fn load_video(dir: &Path, dimension: usize) -> Result<VideoFeatures> {
    let video_id = dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Ingest(format!("Invalid video directory: {}", dir.display())))?
        .to_string();

    let mut features = VideoFeatures {
        video_id,
        ..Default::default()
    };

    let mut torch_files = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if is_torch_file(&path) {
            torch_files += 1;
            continue;
        }
        if !is_feature_file(&path) {
            continue;
        }

        let Some(frame_index) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(frame_index_from_stem)
        else {
            warn!("No frame index in file name, skipping: {}", path.display());
            features.skipped += 1;
            continue;
        };

        let vector = match read_feature_file(&path) {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                features.skipped += 1;
                continue;
            }
        };
        if vector.len() != dimension {
            warn!(
                "Skipping {}: expected {} values, found {}",
                path.display(),
                dimension,
                vector.len()
            );
            features.skipped += 1;
            continue;
        }

        features.embeddings.push(KeyframeEmbedding {
            video_id: features.video_id.clone(),
            frame_index,
            vector,
        });
    }

    if torch_files > 0 {
        warn!(
            "Skipped {} PyTorch feature files in {}; export them as .json, .f32 or .bin",
            torch_files,
            dir.display()
        );
        features.skipped += torch_files;
    }

    features.embeddings.sort_by_key(|e| e.frame_index);
    debug!(
        "Loaded {} keyframes for video {} ({} skipped)",
        features.embeddings.len(),
        features.video_id,
        features.skipped
    );
    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use framesift_store::encoding::vector_to_blob;

    #[test]
    fn test_frame_index_from_stem() {
        assert_eq!(frame_index_from_stem("keyframe_12"), Some(12));
        assert_eq!(frame_index_from_stem("007"), Some(7));
        assert_eq!(frame_index_from_stem("L01_V001_frame_0450"), Some(450));
        assert_eq!(frame_index_from_stem("keyframe"), None);
        assert_eq!(frame_index_from_stem("12_keyframe"), None);
    }

    #[test]
    fn test_read_json_and_binary() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("keyframe_1.json");
        std::fs::write(&json, "[[0.5, 1.0], [1.5, 2]]").unwrap();
        assert_eq!(read_feature_file(&json).unwrap(), vec![0.5, 1.0, 1.5, 2.0]);

        let bin = dir.path().join("keyframe_2.f32");
        std::fs::write(&bin, vector_to_blob(&[0.25, -1.0])).unwrap();
        assert_eq!(read_feature_file(&bin).unwrap(), vec![0.25, -1.0]);

        let bad = dir.path().join("keyframe_3.json");
        std::fs::write(&bad, r#"["a"]"#).unwrap();
        assert!(read_feature_file(&bad).is_err());
    }

    #[test]
    fn test_load_video_skips_bad_files() {
        let root = tempfile::tempdir().unwrap();
        let video = root.path().join("L01_V001");
        std::fs::create_dir(&video).unwrap();
        std::fs::write(video.join("keyframe_10.json"), "[1, 0, 0]").unwrap();
        std::fs::write(video.join("keyframe_2.json"), "[0, 1, 0]").unwrap();
        std::fs::write(video.join("keyframe_3.json"), "[0, 1]").unwrap();
        std::fs::write(video.join("cover.json"), "[0, 0, 1]").unwrap();
        std::fs::write(video.join("notes.txt"), "ignored").unwrap();

        let features = load_video(&video, 3).unwrap();
        assert_eq!(features.video_id, "L01_V001");
        let frames: Vec<i64> = features.embeddings.iter().map(|e| e.frame_index).collect();
        assert_eq!(frames, vec![2, 10]);
        assert_eq!(features.skipped, 2);

        assert_eq!(list_videos(root.path()).unwrap(), vec![video]);
    }

    #[test]
    fn test_torch_files_counted_as_skipped() {
        let root = tempfile::tempdir().unwrap();
        let video = root.path().join("L02_V003");
        std::fs::create_dir(&video).unwrap();
        std::fs::write(video.join("keyframe_1.pt"), [0u8; 16]).unwrap();
        std::fs::write(video.join("keyframe_2.pt"), [0u8; 16]).unwrap();
        std::fs::write(video.join("keyframe_3.json"), "[1, 0]").unwrap();

        let features = load_video(&video, 2).unwrap();
        assert_eq!(features.embeddings.len(), 1);
        assert_eq!(features.skipped, 2);
    }
}
