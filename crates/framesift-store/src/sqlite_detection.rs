//! SQLite detection document store.
//!
//! Each keyframe is one row of `detections`; its objects are mirrored into
//! `detected_objects` so pipelines lower to indexed SQL (see [`crate::sql`]).

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};
use tracing::{debug, info};

use framesift_core::{Error, Result};

use crate::detection::DetectionStore;
use crate::pipeline::{DocumentField, Pipeline};
use crate::schema::{DETECTION_DROP_SQL, DETECTION_SCHEMA_SQL, PRAGMAS_SQL};
use crate::sql;
use crate::types::{DetectedObject, DetectionDocument, UpsertSummary};

/// Detection store in `db_dir/detections.db`.
pub struct SqliteDetectionStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteDetectionStore {
    pub fn open(db_dir: impl AsRef<Path>) -> Result<Self> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir).map_err(|e| Error::Storage(e.to_string()))?;
        let db_path = db_dir.join("detections.db");

        let conn = Connection::open(&db_path).map_err(|e| Error::Database(e.to_string()))?;
        conn.execute_batch(PRAGMAS_SQL)
            .map_err(|e| Error::Database(e.to_string()))?;
        Self::init_schema(&conn)?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
        };
        info!(
            "SqliteDetectionStore initialized: {} documents, path={}",
            store.count()?,
            store.db_path.display()
        );
        Ok(store)
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(DETECTION_SCHEMA_SQL)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))
    }

    /// Look up one document by key.
    pub fn get(&self, video_id: &str, frame_index: i64) -> Result<Option<DetectionDocument>> {
        let conn = self.conn.lock();
        let json: Option<String> = conn
            .query_row(
                "SELECT objects_json FROM detections WHERE video_id = ?1 AND frame_index = ?2",
                params![video_id, frame_index],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;

        json.map(|j| -> Result<DetectionDocument> {
            let objects: Vec<DetectedObject> = serde_json::from_str(&j)?;
            Ok(DetectionDocument::new(video_id, frame_index, objects))
        })
        .transpose()
    }

    fn insert_objects(conn: &Connection, doc_id: i64, objects: &[DetectedObject]) -> Result<()> {
        let mut stmt = conn
            .prepare_cached(
                "INSERT INTO detected_objects (doc_id, label, confidence) VALUES (?1, ?2, ?3)",
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        for object in objects {
            stmt.execute(params![doc_id, object.label, object.confidence])
                .map_err(|e| Error::Database(e.to_string()))?;
        }
        Ok(())
    }
}

/// Convert one result row to a JSON document keyed by field name.
fn row_to_document(row: &Row<'_>, columns: &[DocumentField]) -> rusqlite::Result<Value> {
    let mut out = Map::new();
    for (i, field) in columns.iter().enumerate() {
        let value = match field {
            DocumentField::Id | DocumentField::FrameIndex => Value::from(row.get::<_, i64>(i)?),
            DocumentField::VideoId => Value::from(row.get::<_, String>(i)?),
            DocumentField::Objects => {
                let raw: String = row.get(i)?;
                serde_json::from_str(&raw).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        i,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?
            }
        };
        out.insert(field.name().to_string(), value);
    }
    Ok(Value::Object(out))
}

impl DetectionStore for SqliteDetectionStore {
    fn aggregate(&self, pipeline: &Pipeline) -> Result<Vec<Value>> {
        let query = sql::lower(pipeline)?;
        debug!("Detection query: {} ({} params)", query.sql, query.params.len());

        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&query.sql)
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params_from_iter(query.params.iter()), |row| {
                row_to_document(row, &query.columns)
            })
            .map_err(|e| Error::Database(e.to_string()))?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Database(e.to_string()))
    }

    fn upsert_many(&self, docs: &[DetectionDocument]) -> Result<UpsertSummary> {
        let mut summary = UpsertSummary::default();
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(e.to_string()))?;

        for doc in docs {
            let objects_json = serde_json::to_string(&doc.objects)?;
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM detections WHERE video_id = ?1 AND frame_index = ?2",
                    params![doc.video_id, doc.frame_index],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| Error::Database(e.to_string()))?;

            let doc_id = match existing {
                Some(id) => {
                    tx.execute(
                        "UPDATE detections SET objects_json = ?1 WHERE id = ?2",
                        params![objects_json, id],
                    )
                    .map_err(|e| Error::Database(e.to_string()))?;
                    tx.execute("DELETE FROM detected_objects WHERE doc_id = ?1", params![id])
                        .map_err(|e| Error::Database(e.to_string()))?;
                    summary.updated += 1;
                    id
                }
                None => {
                    tx.execute(
                        "INSERT INTO detections (video_id, frame_index, objects_json) \
                         VALUES (?1, ?2, ?3)",
                        params![doc.video_id, doc.frame_index, objects_json],
                    )
                    .map_err(|e| Error::Database(e.to_string()))?;
                    summary.inserted += 1;
                    tx.last_insert_rowid()
                }
            };
            Self::insert_objects(&tx, doc_id, &doc.objects)?;
        }

        tx.commit().map_err(|e| Error::Database(e.to_string()))?;
        debug!(
            "Upserted {} detection documents ({} new, {} updated)",
            summary.total(),
            summary.inserted,
            summary.updated
        );
        Ok(summary)
    }

    fn reset(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(DETECTION_DROP_SQL)
            .map_err(|e| Error::Database(e.to_string()))?;
        Self::init_schema(&conn)
    }

    fn count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM detections", [], |row| row.get(0))
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDetectionStore;
    use crate::pipeline::{CountOf, Expr, ObjectPredicate, Projection, Stage};
    use crate::types::BoundingBox;
    use tempfile::TempDir;

    fn test_store() -> (SqliteDetectionStore, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteDetectionStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn frame(video: &str, idx: i64, objects: &[(&str, f64)]) -> DetectionDocument {
        DetectionDocument::new(
            video,
            idx,
            objects
                .iter()
                .map(|(l, c)| DetectedObject::new(*l, *c))
                .collect(),
        )
    }

    fn corpus() -> Vec<DetectionDocument> {
        vec![
            frame("v1", 1, &[("car", 0.9), ("car", 0.8), ("person", 0.7)]),
            frame("v1", 2, &[("car", 0.4)]),
            frame("v1", 3, &[("dog", 0.95)]),
            frame("v2", 1, &[("car", 0.6), ("car", 0.7), ("car", 0.8), ("car", 0.9)]),
            frame("v2", 2, &[]),
            frame("v2", 3, &[("person", 0.5), ("car", 0.55)]),
        ]
    }

    fn cars_above(min: f64) -> CountOf {
        CountOf(ObjectPredicate::And(vec![
            ObjectPredicate::LabelEq("car".into()),
            ObjectPredicate::ConfidenceAtLeast(min),
        ]))
    }

    #[test]
    fn test_upsert_and_get() {
        let (store, _dir) = test_store();
        let doc = DetectionDocument::new(
            "v1",
            7,
            vec![DetectedObject::new("car", 0.9).with_box(BoundingBox {
                x: 1,
                y: 2,
                width: 30,
                height: 40,
            })],
        );
        let summary = store.upsert_many(&[doc.clone()]).unwrap();
        assert_eq!(summary, UpsertSummary { inserted: 1, updated: 0 });
        assert_eq!(store.get("v1", 7).unwrap(), Some(doc));
        assert_eq!(store.get("v1", 8).unwrap(), None);
    }

    #[test]
    fn test_upsert_replaces_objects() {
        let (store, _dir) = test_store();
        store
            .upsert_many(&[frame("v1", 1, &[("car", 0.9), ("car", 0.8)])])
            .unwrap();
        let summary = store.upsert_many(&[frame("v1", 1, &[("dog", 0.3)])]).unwrap();
        assert_eq!(summary, UpsertSummary { inserted: 0, updated: 1 });
        assert_eq!(store.count().unwrap(), 1);

        // Stale object rows must not satisfy the old label.
        let pipeline = Pipeline::new().with_stage(Stage::MatchLabels(vec!["car".into()]));
        assert!(store.aggregate(&pipeline).unwrap().is_empty());
        let stored = store.get("v1", 1).unwrap().unwrap();
        assert_eq!(stored.objects, vec![DetectedObject::new("dog", 0.3)]);
    }

    #[test]
    fn test_aggregate_count_range() {
        let (store, _dir) = test_store();
        store.upsert_many(&corpus()).unwrap();

        let pipeline = Pipeline::new()
            .with_stage(Stage::MatchLabels(vec!["car".into()]))
            .with_stage(Stage::MatchExpr(Expr::And(vec![
                Expr::AtLeast(cars_above(0.5), 1),
                Expr::AtMost(cars_above(0.5), 3),
            ])))
            .with_stage(Stage::Project(Projection::new([
                DocumentField::VideoId,
                DocumentField::FrameIndex,
            ])));

        let out = store.aggregate(&pipeline).unwrap();
        let keys: Vec<(String, i64)> = out
            .iter()
            .map(|d| {
                (
                    d["video_id"].as_str().unwrap().to_string(),
                    d["frame_index"].as_i64().unwrap(),
                )
            })
            .collect();
        assert_eq!(keys, vec![("v1".to_string(), 1), ("v2".to_string(), 3)]);
        assert!(out[0].get("objects").is_none());
    }

    #[test]
    fn test_default_projection_returns_objects() {
        let (store, _dir) = test_store();
        store.upsert_many(&corpus()).unwrap();
        let out = store
            .aggregate(&Pipeline::new().with_stage(Stage::MatchLabels(vec!["dog".into()])))
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["objects"][0]["label"], "dog");
        assert!(out[0].get("id").is_none());
    }

    #[test]
    fn test_matches_memory_store() {
        let (sqlite, _dir) = test_store();
        let memory = MemoryDetectionStore::new();
        sqlite.upsert_many(&corpus()).unwrap();
        memory.upsert_many(&corpus()).unwrap();

        let pipelines = vec![
            Pipeline::new(),
            Pipeline::new().with_stage(Stage::MatchLabels(vec!["person".into(), "dog".into()])),
            Pipeline::new().with_stage(Stage::MatchExpr(Expr::AtMost(cars_above(0.0), 0))),
            Pipeline::new()
                .with_stage(Stage::MatchLabels(vec!["car".into()]))
                .with_stage(Stage::MatchExpr(Expr::AtLeast(cars_above(0.75), 2)))
                .with_stage(Stage::Project(Projection::new([
                    DocumentField::Id,
                    DocumentField::FrameIndex,
                ]))),
        ];
        for pipeline in &pipelines {
            assert_eq!(
                sqlite.aggregate(pipeline).unwrap(),
                memory.aggregate(pipeline).unwrap(),
                "pipeline {:?}",
                pipeline
            );
        }
    }

    #[test]
    fn test_reset_clears_documents() {
        let (store, _dir) = test_store();
        store.upsert_many(&corpus()).unwrap();
        assert_eq!(store.count().unwrap(), 6);
        store.reset().unwrap();
        assert_eq!(store.count().unwrap(), 0);
        store.upsert_many(&corpus()[..1]).unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }
}
