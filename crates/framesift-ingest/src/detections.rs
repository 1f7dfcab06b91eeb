//! Object detector CSV parsing.
//!
//! One `<video_id>_rfdetr_results.csv` per video with columns `frame`,
//! `class` (or `label`), `confidence`, `x`, `y`, `width`, `height`. Rows are
//! grouped by frame into one [`DetectionDocument`] per keyframe.

use std::collections::BTreeMap;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::warn;

use framesift_core::{Error, Result};
use framesift_store::{BoundingBox, DetectedObject, DetectionDocument};

use crate::keyframes::frame_index_from_stem;

/// File name suffix of detector output files.
pub const RESULTS_SUFFIX: &str = "_rfdetr_results.csv";

/// Video id of a detector output file name, if it is one.
pub fn video_id_from_filename(name: &str) -> Option<&str> {
    name.strip_suffix(RESULTS_SUFFIX).filter(|id| !id.is_empty())
}

/// Frame index of a `frame` cell such as `keyframe_12.webp`.
pub fn parse_frame_index(frame: &str) -> Option<i64> {
    let stem = Path::new(frame.trim()).file_stem()?.to_str()?;
    frame_index_from_stem(stem)
}

struct Columns {
    frame: usize,
    label: usize,
    confidence: usize,
    bbox: Option<[usize; 4]>,
}

impl Columns {
    fn locate(headers: &StringRecord) -> Result<Self> {
        let find = |name: &str| headers.iter().position(|h| h == name);
        let require = |names: &[&str]| {
            names.iter().find_map(|n| find(n)).ok_or_else(|| {
                Error::Ingest(format!("Missing column '{}'", names.join("' or '")))
            })
        };

        let bbox = match (find("x"), find("y"), find("width"), find("height")) {
            (Some(x), Some(y), Some(w), Some(h)) => Some([x, y, w, h]),
            _ => None,
        };

        Ok(Self {
            frame: require(&["frame"])?,
            label: require(&["class", "label"])?,
            confidence: require(&["confidence"])?,
            bbox,
        })
    }
}

fn cell<'r>(record: &'r StringRecord, idx: usize, row: usize) -> Result<&'r str> {
    record
        .get(idx)
        .ok_or_else(|| Error::Ingest(format!("Row {}: missing field {}", row, idx)))
}

fn number(record: &StringRecord, idx: usize, row: usize) -> Result<f64> {
    let raw = cell(record, idx, row)?;
    raw.parse::<f64>()
        .map_err(|_| Error::Ingest(format!("Row {}: '{}' is not a number", row, raw)))
}

/// Parse one detector output file into per-keyframe documents, ordered by
/// frame index. Any malformed row fails the whole file. Rows whose confidence
/// is not finite are skipped with a warning.
pub fn read_detection_csv(path: &Path, video_id: &str) -> Result<Vec<DetectionDocument>> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .from_path(path)
        .map_err(|e| Error::Ingest(format!("{}: {}", path.display(), e)))?;

    let headers = reader
        .headers()
        .map_err(|e| Error::Ingest(format!("{}: {}", path.display(), e)))?
        .clone();
    let columns = Columns::locate(&headers)?;

    let mut frames: BTreeMap<i64, Vec<DetectedObject>> = BTreeMap::new();
    for (i, record) in reader.records().enumerate() {
        let row = i + 2; // 1-based, after the header line
        let record = record.map_err(|e| Error::Ingest(format!("Row {}: {}", row, e)))?;

        let frame_cell = cell(&record, columns.frame, row)?;
        let frame_index = parse_frame_index(frame_cell).ok_or_else(|| {
            Error::Ingest(format!("Row {}: invalid frame '{}'", row, frame_cell))
        })?;

        let confidence = number(&record, columns.confidence, row)?;
        if !confidence.is_finite() {
            warn!(
                "{}: row {} has confidence '{}', skipping detection",
                path.display(),
                row,
                confidence
            );
            continue;
        }

        let mut object = DetectedObject::new(cell(&record, columns.label, row)?, confidence);
        if let Some([x, y, w, h]) = columns.bbox {
            // Detector coordinates are floats; stored boxes are whole pixels.
            object = object.with_box(BoundingBox {
                x: number(&record, x, row)? as i64,
                y: number(&record, y, row)? as i64,
                width: number(&record, w, row)? as i64,
                height: number(&record, h, row)? as i64,
            });
        }
        frames.entry(frame_index).or_default().push(object);
    }

    Ok(frames
        .into_iter()
        .map(|(frame_index, objects)| DetectionDocument::new(video_id, frame_index, objects))
        .collect())
}
