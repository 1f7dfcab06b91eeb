//! SQLite-persisted keyframe vector collection with an in-memory IVF-Flat index.
//!
//! Records live in `keyframe_embeddings`; the ANN index is rebuilt from them
//! lazily after writes, the same way a collection is loaded into memory
//! before it can serve searches.

use std::path::{Path, PathBuf};

use ndarray::Array2;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use framesift_core::{DistanceMetric, Error, Result};

use crate::encoding::{blob_to_vector, vector_to_blob};
use crate::ivf::IvfFlatIndex;
use crate::schema::{PRAGMAS_SQL, VECTOR_SCHEMA_SQL};
use crate::types::{KeyframeEmbedding, OutputField, VectorHit, VectorSearchRequest};
use crate::vector::VectorIndex;

/// Schema and index parameters of one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionConfig {
    pub name: String,
    /// Name of the single vector field.
    pub vector_field: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
    pub nlist: usize,
}

impl CollectionConfig {
    pub fn new(name: impl Into<String>, dimension: usize) -> Self {
        Self {
            name: name.into(),
            vector_field: "keyframe_vector".to_string(),
            dimension,
            metric: DistanceMetric::L2,
            nlist: 128,
        }
    }
}

/// Vector index over one collection in `db_dir/vectors.db`.
pub struct SqliteVectorIndex {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    config: CollectionConfig,
    index: Mutex<LoadedIndex>,
}

struct LoadedIndex {
    ivf: IvfFlatIndex,
    /// `(id, video_id, frame_index)` for each index row.
    keys: Vec<(i64, String, i64)>,
    /// Whether the index needs rebuilding before the next search.
    dirty: bool,
}

impl SqliteVectorIndex {
    /// Open or create the collection.
    ///
    /// Fails with `DimensionMismatch` if the collection already exists with a
    /// different dimension.
    pub fn open(db_dir: impl AsRef<Path>, config: CollectionConfig) -> Result<Self> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir).map_err(|e| Error::Storage(e.to_string()))?;
        let db_path = db_dir.join("vectors.db");

        let conn = Connection::open(&db_path).map_err(|e| Error::Database(e.to_string()))?;
        conn.execute_batch(PRAGMAS_SQL)
            .map_err(|e| Error::Database(e.to_string()))?;
        conn.execute_batch(VECTOR_SCHEMA_SQL)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;

        Self::check_collection(&conn, &config)?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
            index: Mutex::new(LoadedIndex {
                ivf: IvfFlatIndex::build(
                    Array2::zeros((0, config.dimension)),
                    config.metric,
                    config.nlist,
                ),
                keys: Vec::new(),
                dirty: true,
            }),
            config,
        };

        info!(
            "SqliteVectorIndex opened: collection={}, {} vectors, dim={}, metric={}, path={}",
            store.config.name,
            store.count()?,
            store.config.dimension,
            store.config.metric,
            store.db_path.display()
        );
        Ok(store)
    }

    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    /// Verify an existing collection against `config`, or register it.
    fn check_collection(conn: &Connection, config: &CollectionConfig) -> Result<()> {
        let existing: Option<(i64, String)> = conn
            .query_row(
                "SELECT dimension, metric FROM collections WHERE name = ?1",
                params![config.name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;

        match existing {
            Some((dim, metric)) => {
                if dim as usize != config.dimension {
                    return Err(Error::DimensionMismatch {
                        expected: dim as usize,
                        actual: config.dimension,
                    });
                }
                if metric != config.metric.to_string() {
                    warn!(
                        "Collection '{}' was created with metric {}, opening with {}; \
                         re-ingest to rebuild it",
                        config.name, metric, config.metric
                    );
                }
                Ok(())
            }
            None => Self::register_collection(conn, config),
        }
    }

    fn register_collection(conn: &Connection, config: &CollectionConfig) -> Result<()> {
        conn.execute(
            "INSERT OR REPLACE INTO collections (name, vector_field, dimension, metric, nlist) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                config.name,
                config.vector_field,
                config.dimension as i64,
                config.metric.to_string(),
                config.nlist as i64
            ],
        )
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    /// Load every vector of the collection and rebuild the IVF index.
    ///
    /// The caller holds the index lock for the whole rebuild, so a write that
    /// commits meanwhile marks the rebuilt index dirty again. Writers never
    /// hold the connection and index locks together.
    fn load_index(&self, index: &mut LoadedIndex) -> Result<()> {
        let mut keys = Vec::new();
        let mut flat: Vec<f32> = Vec::new();

        {
            let conn = self.conn.lock();
            let mut stmt = conn
                .prepare(
                    "SELECT id, video_id, frame_index, embedding FROM keyframe_embeddings \
                     WHERE collection = ?1 ORDER BY id",
                )
                .map_err(|e| Error::Database(e.to_string()))?;
            let rows = stmt
                .query_map(params![self.config.name], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, Vec<u8>>(3)?,
                    ))
                })
                .map_err(|e| Error::Database(e.to_string()))?;

            for row in rows {
                let (id, video_id, frame_index, blob) =
                    row.map_err(|e| Error::Database(e.to_string()))?;
                let vector = blob_to_vector(&blob)?;
                if vector.len() != self.config.dimension {
                    return Err(Error::DimensionMismatch {
                        expected: self.config.dimension,
                        actual: vector.len(),
                    });
                }
                flat.extend_from_slice(&vector);
                keys.push((id, video_id, frame_index));
            }
        } // conn and stmt dropped here

        let matrix = Array2::from_shape_vec((keys.len(), self.config.dimension), flat)
            .map_err(|e| Error::Internal(format!("Matrix build failed: {}", e)))?;
        let ivf = IvfFlatIndex::build(matrix, self.config.metric, self.config.nlist);
        debug!(
            "Built IVF index for '{}': {} vectors in {} lists",
            self.config.name,
            ivf.len(),
            ivf.nlist()
        );

        index.ivf = ivf;
        index.keys = keys;
        index.dirty = false;
        Ok(())
    }
}

impl VectorIndex for SqliteVectorIndex {
    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn search(&self, request: &VectorSearchRequest<'_>) -> Result<Vec<VectorHit>> {
        if request.field != self.config.vector_field {
            return Err(Error::Search(format!(
                "collection '{}' has no vector field '{}'",
                self.config.name, request.field
            )));
        }
        if request.params.metric != self.config.metric {
            return Err(Error::Search(format!(
                "metric {} does not match collection metric {}",
                request.params.metric, self.config.metric
            )));
        }
        if request.vector.len() != self.config.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.config.dimension,
                actual: request.vector.len(),
            });
        }
        if self.config.metric == DistanceMetric::Cosine
            && request.vector.dot(&request.vector).sqrt() < 1e-9
        {
            return Err(Error::Search(
                "query vector has zero norm; cosine distance is undefined".into(),
            ));
        }
        if request.limit == 0 {
            return Ok(Vec::new());
        }

        let mut index = self.index.lock();
        if index.dirty {
            self.load_index(&mut index)?;
        }

        let want_video = request.output_fields.contains(&OutputField::VideoId);
        let want_frame = request.output_fields.contains(&OutputField::FrameIndex);

        Ok(index
            .ivf
            .search(request.vector, request.params.nprobe, request.limit)
            .into_iter()
            .map(|(row, distance)| {
                let (id, video_id, frame_index) = &index.keys[row];
                VectorHit {
                    id: *id,
                    distance,
                    video_id: want_video.then(|| video_id.clone()),
                    frame_index: want_frame.then_some(*frame_index),
                }
            })
            .collect())
    }

    fn insert(&self, records: &[KeyframeEmbedding]) -> Result<usize> {
        if let Some(bad) = records
            .iter()
            .find(|r| r.vector.len() != self.config.dimension)
        {
            return Err(Error::DimensionMismatch {
                expected: self.config.dimension,
                actual: bad.vector.len(),
            });
        }

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(e.to_string()))?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT OR REPLACE INTO keyframe_embeddings \
                     (collection, video_id, frame_index, embedding) VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(|e| Error::Database(e.to_string()))?;
            for record in records {
                stmt.execute(params![
                    self.config.name,
                    record.video_id,
                    record.frame_index,
                    vector_to_blob(&record.vector)
                ])
                .map_err(|e| Error::Database(e.to_string()))?;
            }
        }
        tx.commit().map_err(|e| Error::Database(e.to_string()))?;
        drop(conn);

        self.index.lock().dirty = true;
        Ok(records.len())
    }

    fn flush(&self) -> Result<()> {
        let mut index = self.index.lock();
        self.load_index(&mut index)
    }

    fn reset(&self) -> Result<()> {
        {
            let conn = self.conn.lock();
            let removed = conn
                .execute(
                    "DELETE FROM keyframe_embeddings WHERE collection = ?1",
                    params![self.config.name],
                )
                .map_err(|e| Error::Database(e.to_string()))?;
            if removed > 0 {
                warn!(
                    "Collection '{}' already exists. Dropped {} vectors.",
                    self.config.name, removed
                );
            }
            Self::register_collection(&conn, &self.config)?;
        }
        self.index.lock().dirty = true;
        Ok(())
    }

    fn count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM keyframe_embeddings WHERE collection = ?1",
                params![self.config.name],
                |row| row.get(0),
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SearchParams;
    use ndarray::array;
    use tempfile::TempDir;

    fn test_index(dim: usize) -> (SqliteVectorIndex, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = CollectionConfig::new("keyframes", dim);
        config.nlist = 2;
        let index = SqliteVectorIndex::open(dir.path(), config).unwrap();
        (index, dir)
    }

    fn record(video: &str, frame: i64, vector: Vec<f32>) -> KeyframeEmbedding {
        KeyframeEmbedding {
            video_id: video.into(),
            frame_index: frame,
            vector,
        }
    }

    const ALL_FIELDS: &[OutputField] = &[OutputField::VideoId, OutputField::FrameIndex];

    fn request<'a>(q: &'a ndarray::Array1<f32>, limit: usize) -> VectorSearchRequest<'a> {
        VectorSearchRequest {
            vector: q.view(),
            field: "keyframe_vector",
            params: SearchParams {
                metric: DistanceMetric::L2,
                nprobe: 2,
            },
            limit,
            output_fields: ALL_FIELDS,
        }
    }

    #[test]
    fn test_insert_and_search() {
        let (index, _dir) = test_index(3);
        index
            .insert(&[
                record("v1", 0, vec![1.0, 0.0, 0.0]),
                record("v1", 1, vec![0.0, 1.0, 0.0]),
                record("v2", 0, vec![0.9, 0.1, 0.0]),
            ])
            .unwrap();
        assert_eq!(index.count().unwrap(), 3);

        let q = array![1.0, 0.0, 0.0];
        let hits = index.search(&request(&q, 2)).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].video_id.as_deref(), Some("v1"));
        assert_eq!(hits[0].frame_index, Some(0));
        assert_eq!(hits[0].distance, 0.0);
        assert_eq!(hits[1].video_id.as_deref(), Some("v2"));
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[test]
    fn test_output_fields_respected() {
        let (index, _dir) = test_index(2);
        index.insert(&[record("v1", 4, vec![1.0, 1.0])]).unwrap();
        let q = array![1.0, 1.0];
        let mut req = request(&q, 5);
        req.output_fields = &[OutputField::FrameIndex];
        let hits = index.search(&req).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].video_id.is_none());
        assert_eq!(hits[0].frame_index, Some(4));
    }

    #[test]
    fn test_reinsert_replaces_frame() {
        let (index, _dir) = test_index(2);
        index.insert(&[record("v1", 0, vec![0.0, 0.0])]).unwrap();
        index.insert(&[record("v1", 0, vec![5.0, 5.0])]).unwrap();
        assert_eq!(index.count().unwrap(), 1);

        let q = array![5.0, 5.0];
        let hits = index.search(&request(&q, 10)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].distance, 0.0);
    }

    #[test]
    fn test_wrong_dimension_rejected() {
        let (index, _dir) = test_index(3);
        let err = index.insert(&[record("v1", 0, vec![1.0])]).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 3, actual: 1 }));
        assert_eq!(index.count().unwrap(), 0);

        let q = array![1.0, 2.0];
        assert!(matches!(
            index.search(&request(&q, 1)),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_unknown_field_and_metric_rejected() {
        let (index, _dir) = test_index(2);
        let q = array![1.0, 2.0];
        let mut req = request(&q, 1);
        req.field = "caption_vector";
        assert!(matches!(index.search(&req), Err(Error::Search(_))));

        let mut req = request(&q, 1);
        req.params.metric = DistanceMetric::Cosine;
        assert!(matches!(index.search(&req), Err(Error::Search(_))));
    }

    #[test]
    fn test_reset_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let index =
                SqliteVectorIndex::open(dir.path(), CollectionConfig::new("keyframes", 2)).unwrap();
            index.insert(&[record("v1", 0, vec![1.0, 2.0])]).unwrap();
        }

        let index =
            SqliteVectorIndex::open(dir.path(), CollectionConfig::new("keyframes", 2)).unwrap();
        assert_eq!(index.count().unwrap(), 1);
        index.reset().unwrap();
        assert_eq!(index.count().unwrap(), 0);
        let q = array![1.0, 2.0];
        assert!(index.search(&request(&q, 3)).unwrap().is_empty());

        let err = SqliteVectorIndex::open(dir.path(), CollectionConfig::new("keyframes", 4))
            .err()
            .unwrap();
        assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 4 }));
    }

    #[test]
    fn test_concurrent_inserts_visible_to_search() {
        let (index, _dir) = test_index(2);
        let q = array![0.0, 0.0];

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for frame in 0..50 {
                    index.insert(&[record("v1", frame, vec![frame as f32, 1.0])]).unwrap();
                }
            });
            scope.spawn(|| {
                for _ in 0..50 {
                    index.search(&request(&q, 1)).unwrap();
                }
            });
        });

        assert_eq!(index.search(&request(&q, 100)).unwrap().len(), 50);
    }

    #[test]
    fn test_insert_after_flush_is_searchable() {
        let (index, _dir) = test_index(2);
        index.insert(&[record("v1", 0, vec![1.0, 0.0])]).unwrap();
        index.flush().unwrap();
        index.insert(&[record("v1", 1, vec![0.0, 1.0])]).unwrap();

        let q = array![0.0, 1.0];
        let hits = index.search(&request(&q, 10)).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].frame_index, Some(1));
    }

    #[test]
    fn test_zero_query_rejected_for_cosine() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = CollectionConfig::new("keyframes", 2);
        config.metric = DistanceMetric::Cosine;
        let index = SqliteVectorIndex::open(dir.path(), config).unwrap();
        index.insert(&[record("v1", 0, vec![1.0, 0.0])]).unwrap();

        let q = array![0.0, 0.0];
        let mut req = request(&q, 5);
        req.params.metric = DistanceMetric::Cosine;
        assert!(matches!(index.search(&req), Err(Error::Search(_))));

        let q = array![2.0, 0.0];
        let mut req = request(&q, 5);
        req.params.metric = DistanceMetric::Cosine;
        assert_eq!(index.search(&req).unwrap().len(), 1);
    }
}
