//! Ingestion pipeline: feature files + detector output → both stores.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use framesift_core::{DataPaths, Result};
use framesift_store::{DetectionStore, VectorIndex};

use crate::detections::{read_detection_csv, video_id_from_filename};
use crate::keyframes::{list_videos, load_video};

/// Source directories of one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestSources {
    /// One sub-directory of feature files per video.
    pub clip_features: PathBuf,
    /// Detector output CSV files.
    pub object_detection: PathBuf,
}

impl IngestSources {
    pub fn from_paths(paths: &DataPaths) -> Self {
        Self {
            clip_features: paths.clip_features.clone(),
            object_detection: paths.object_detection.clone(),
        }
    }
}

/// Summary of an ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub videos: usize,
    pub keyframes: usize,
    /// Feature files that could not be used.
    pub skipped_files: usize,
    /// Detector files successfully stored.
    pub detection_files: usize,
    pub frames_inserted: usize,
    pub frames_updated: usize,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Rebuilds both stores from the files on disk.
pub struct Ingester<'a> {
    vectors: &'a dyn VectorIndex,
    detections: &'a dyn DetectionStore,
}

impl<'a> Ingester<'a> {
    pub fn new(vectors: &'a dyn VectorIndex, detections: &'a dyn DetectionStore) -> Self {
        Self {
            vectors,
            detections,
        }
    }

    /// Drop existing data and ingest everything under `sources`.
    ///
    /// Store failures abort the keyframe stage. A detector file that cannot
    /// be parsed or stored is logged and skipped.
    pub fn run(&self, sources: &IngestSources) -> Result<IngestReport> {
        let started_at = Utc::now();
        let timer = Instant::now();
        let mut report = IngestReport {
            videos: 0,
            keyframes: 0,
            skipped_files: 0,
            detection_files: 0,
            frames_inserted: 0,
            frames_updated: 0,
            started_at,
            duration_ms: 0,
        };

        self.vectors.reset()?;
        self.detections.reset()?;

        self.ingest_keyframes(&sources.clip_features, &mut report)?;
        self.ingest_detections(&sources.object_detection, &mut report);

        report.duration_ms = timer.elapsed().as_millis() as u64;
        info!(
            "Ingestion complete: {} videos, {} keyframes, {} detection files ({} frames) in {}ms",
            report.videos,
            report.keyframes,
            report.detection_files,
            report.frames_inserted + report.frames_updated,
            report.duration_ms
        );
        Ok(report)
    }

    fn ingest_keyframes(&self, root: &Path, report: &mut IngestReport) -> Result<()> {
        info!("Ingesting keyframe features from {}", root.display());
        if !root.is_dir() {
            error!("Keyframe feature directory not found: {}", root.display());
            return Ok(());
        }

        let dim = self.vectors.dimension();
        for dir in list_videos(root)? {
            let features = match load_video(&dir, dim) {
                Ok(f) => f,
                Err(e) => {
                    warn!("Skipping video directory {}: {}", dir.display(), e);
                    continue;
                }
            };
            report.skipped_files += features.skipped;
            if features.embeddings.is_empty() {
                warn!("No usable keyframes for video {}", features.video_id);
                continue;
            }

            report.keyframes += self.vectors.insert(&features.embeddings)?;
            report.videos += 1;
        }

        self.vectors.flush()?;
        info!(
            "Keyframe ingestion complete: {} keyframes from {} videos",
            report.keyframes, report.videos
        );
        Ok(())
    }

    fn ingest_detections(&self, root: &Path, report: &mut IngestReport) {
        info!("Ingesting object detections from {}", root.display());
        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) => {
                error!("Object detection directory not found: {} ({})", root.display(), e);
                return;
            }
        };

        let mut files: Vec<(PathBuf, String)> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter_map(|path| {
                let name = path.file_name()?.to_str()?;
                let video_id = video_id_from_filename(name)?.to_string();
                Some((path, video_id))
            })
            .collect();
        files.sort();

        for (path, video_id) in files {
            info!("Processing detection file {}", path.display());
            let docs = match read_detection_csv(&path, &video_id) {
                Ok(docs) => docs,
                Err(e) => {
                    error!("Failed to read {}: {}", path.display(), e);
                    continue;
                }
            };
            match self.detections.upsert_many(&docs) {
                Ok(summary) => {
                    info!(
                        "Upserted {} frames for '{}': {} inserted, {} updated",
                        docs.len(),
                        video_id,
                        summary.inserted,
                        summary.updated
                    );
                    report.detection_files += 1;
                    report.frames_inserted += summary.inserted;
                    report.frames_updated += summary.updated;
                }
                Err(e) => error!("Failed to store detections from {}: {}", path.display(), e),
            }
        }
    }
}
