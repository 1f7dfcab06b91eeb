//! Database schema SQL for the vector index and the detection store.

/// Keyframe vector collections.
///
/// Vectors are little-endian f32 blobs. A collection records its dimension,
/// metric and IVF list count so a reopened index can be checked against the
/// configured one.
pub const VECTOR_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS collections (
    name TEXT PRIMARY KEY,
    vector_field TEXT NOT NULL,
    dimension INTEGER NOT NULL,
    metric TEXT NOT NULL,
    nlist INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS keyframe_embeddings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    collection TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
    video_id TEXT NOT NULL,
    frame_index INTEGER NOT NULL,
    embedding BLOB NOT NULL,
    UNIQUE (collection, video_id, frame_index)
);

CREATE INDEX IF NOT EXISTS idx_embeddings_collection ON keyframe_embeddings(collection);
"#;

/// Detection documents and their normalized object rows.
///
/// `objects_json` is the source of truth returned to callers;
/// `detected_objects` mirrors it one row per object so label and confidence
/// predicates can use indexes.
pub const DETECTION_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS detections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    video_id TEXT NOT NULL,
    frame_index INTEGER NOT NULL,
    objects_json TEXT NOT NULL,
    UNIQUE (video_id, frame_index)
);

CREATE TABLE IF NOT EXISTS detected_objects (
    doc_id INTEGER NOT NULL REFERENCES detections(id) ON DELETE CASCADE,
    label TEXT NOT NULL,
    confidence REAL NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_objects_doc ON detected_objects(doc_id);
CREATE INDEX IF NOT EXISTS idx_objects_label ON detected_objects(label);
CREATE INDEX IF NOT EXISTS idx_objects_label_confidence ON detected_objects(label, confidence);
"#;

/// Drops every detection table; used when ingestion rebuilds the store.
pub const DETECTION_DROP_SQL: &str = r#"
DROP TABLE IF EXISTS detected_objects;
DROP TABLE IF EXISTS detections;
"#;

/// Connection pragmas shared by both stores.
pub const PRAGMAS_SQL: &str = "PRAGMA journal_mode = WAL;
     PRAGMA foreign_keys = ON;
     PRAGMA cache_size = -65536;
     PRAGMA synchronous = NORMAL;";
