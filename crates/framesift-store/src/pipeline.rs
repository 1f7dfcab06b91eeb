//! Aggregation pipeline IR for detection queries.
//!
//! A [`Pipeline`] is a store-independent description of an object query:
//! a label membership pre-filter, a boolean expression over per-condition
//! object counts, and an optional projection. Stores lower it to their own
//! query language; [`Pipeline::matches`] is the reference evaluation over an
//! in-memory [`DetectionDocument`].

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::types::{DetectedObject, DetectionDocument};

/// A field of a stored detection document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentField {
    /// Internal row id. Never returned unless projected explicitly.
    Id,
    VideoId,
    FrameIndex,
    Objects,
}

impl DocumentField {
    /// Output key used in result documents.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::VideoId => "video_id",
            Self::FrameIndex => "frame_index",
            Self::Objects => "objects",
        }
    }

    /// Parse a field name, accepting the legacy `_id` and `keyframe_index` spellings.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "id" | "_id" => Some(Self::Id),
            "video_id" => Some(Self::VideoId),
            "frame_index" | "keyframe_index" => Some(Self::FrameIndex),
            "objects" => Some(Self::Objects),
            _ => None,
        }
    }
}

/// Inclusion projection: the ordered set of fields returned per document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Projection {
    fields: Vec<DocumentField>,
}

impl Projection {
    pub fn new(fields: impl IntoIterator<Item = DocumentField>) -> Self {
        let mut unique = Vec::new();
        for field in fields {
            if !unique.contains(&field) {
                unique.push(field);
            }
        }
        Self { fields: unique }
    }

    /// Build a projection from field names. Unknown names are ignored, the
    /// same way a document store omits fields that do not exist.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(names.into_iter().filter_map(|n| {
            let parsed = DocumentField::parse(n.as_ref());
            if parsed.is_none() {
                debug!("Ignoring unknown projection field '{}'", n.as_ref());
            }
            parsed
        }))
    }

    /// Everything except the internal id.
    pub fn full() -> Self {
        Self::new([
            DocumentField::VideoId,
            DocumentField::FrameIndex,
            DocumentField::Objects,
        ])
    }

    pub fn fields(&self) -> &[DocumentField] {
        &self.fields
    }

    pub fn contains(&self, field: DocumentField) -> bool {
        self.fields.contains(&field)
    }

    /// Render a document through this projection.
    pub fn apply(&self, id: i64, doc: &DetectionDocument) -> Value {
        let mut out = Map::new();
        for field in &self.fields {
            let value = match field {
                DocumentField::Id => json!(id),
                DocumentField::VideoId => json!(doc.video_id),
                DocumentField::FrameIndex => json!(doc.frame_index),
                DocumentField::Objects => json!(doc.objects),
            };
            out.insert(field.name().to_string(), value);
        }
        Value::Object(out)
    }
}

/// Predicate over a single detected object (the array-filter condition).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectPredicate {
    LabelEq(String),
    ConfidenceAtLeast(f64),
    And(Vec<ObjectPredicate>),
}

impl ObjectPredicate {
    pub fn matches(&self, object: &DetectedObject) -> bool {
        match self {
            Self::LabelEq(label) => object.label == *label,
            Self::ConfidenceAtLeast(min) => object.confidence >= *min,
            Self::And(preds) => preds.iter().all(|p| p.matches(object)),
        }
    }
}

/// Size of the subset of a document's objects matching a predicate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountOf(pub ObjectPredicate);

impl CountOf {
    pub fn count(&self, objects: &[DetectedObject]) -> u64 {
        objects.iter().filter(|o| self.0.matches(o)).count() as u64
    }
}

/// Document-level boolean expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// Conjunction; an empty conjunction is true.
    And(Vec<Expr>),
    AtLeast(CountOf, u64),
    AtMost(CountOf, u64),
}

impl Expr {
    pub fn eval(&self, doc: &DetectionDocument) -> bool {
        match self {
            Self::And(exprs) => exprs.iter().all(|e| e.eval(doc)),
            Self::AtLeast(count, n) => count.count(&doc.objects) >= *n,
            Self::AtMost(count, n) => count.count(&doc.objects) <= *n,
        }
    }
}

/// One step of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Keep documents with at least one object whose label is in the set.
    MatchLabels(Vec<String>),
    /// Keep documents for which the expression holds.
    MatchExpr(Expr),
    /// Select output fields. Must be the last stage.
    Project(Projection),
}

/// An ordered list of stages executed against a detection store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.push(stage);
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Whether a document passes every match stage.
    pub fn matches(&self, doc: &DetectionDocument) -> bool {
        self.stages.iter().all(|stage| match stage {
            Stage::MatchLabels(labels) => doc.objects.iter().any(|o| labels.contains(&o.label)),
            Stage::MatchExpr(expr) => expr.eval(doc),
            Stage::Project(_) => true,
        })
    }

    /// The projection of the pipeline, if it has one.
    pub fn projection(&self) -> Option<&Projection> {
        self.stages.iter().rev().find_map(|stage| match stage {
            Stage::Project(p) => Some(p),
            _ => None,
        })
    }

    /// The same pipeline with every expression stage removed, leaving only the
    /// label pre-filter and the projection.
    pub fn prefilter(&self) -> Self {
        Self {
            stages: self
                .stages
                .iter()
                .filter(|s| !matches!(s, Stage::MatchExpr(_)))
                .cloned()
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(objects: &[(&str, f64)]) -> DetectionDocument {
        DetectionDocument::new(
            "v1",
            5,
            objects
                .iter()
                .map(|(l, c)| DetectedObject::new(*l, *c))
                .collect(),
        )
    }

    fn cars_above(min: f64) -> CountOf {
        CountOf(ObjectPredicate::And(vec![
            ObjectPredicate::LabelEq("car".into()),
            ObjectPredicate::ConfidenceAtLeast(min),
        ]))
    }

    #[test]
    fn test_count_filters_label_and_confidence() {
        let doc = frame(&[("car", 0.9), ("car", 0.3), ("person", 0.8)]);
        assert_eq!(cars_above(0.5).count(&doc.objects), 1);
        assert_eq!(cars_above(0.0).count(&doc.objects), 2);
        assert_eq!(cars_above(0.95).count(&doc.objects), 0);
    }

    #[test]
    fn test_confidence_threshold_is_inclusive() {
        let doc = frame(&[("car", 0.5)]);
        assert_eq!(cars_above(0.5).count(&doc.objects), 1);
    }

    #[test]
    fn test_range_expression() {
        let doc = frame(&[("car", 0.9), ("car", 0.8), ("car", 0.7), ("car", 0.6)]);
        let in_range = Expr::And(vec![
            Expr::AtLeast(cars_above(0.5), 1),
            Expr::AtMost(cars_above(0.5), 3),
        ]);
        assert!(!in_range.eval(&doc));
        assert!(Expr::AtMost(cars_above(0.65), 3).eval(&doc));
        assert!(Expr::And(vec![]).eval(&doc));
    }

    #[test]
    fn test_label_prefilter() {
        let pipeline = Pipeline::new().with_stage(Stage::MatchLabels(vec!["dog".into()]));
        assert!(!pipeline.matches(&frame(&[("car", 0.9)])));
        assert!(pipeline.matches(&frame(&[("car", 0.9), ("dog", 0.1)])));
        assert!(!pipeline.matches(&frame(&[])));
    }

    #[test]
    fn test_prefilter_drops_expressions_only() {
        let pipeline = Pipeline::new()
            .with_stage(Stage::MatchLabels(vec!["car".into()]))
            .with_stage(Stage::MatchExpr(Expr::AtLeast(cars_above(0.5), 1)))
            .with_stage(Stage::Project(Projection::full()));
        let pre = pipeline.prefilter();
        assert_eq!(pre.stages().len(), 2);
        assert!(pre.projection().is_some());

        let weak = frame(&[("car", 0.1)]);
        assert!(pre.matches(&weak));
        assert!(!pipeline.matches(&weak));
    }

    #[test]
    fn test_projection_from_names() {
        let p = Projection::from_names(["_id", "video_id", "keyframe_id", "video_id"]);
        assert_eq!(p.fields(), &[DocumentField::Id, DocumentField::VideoId]);

        let doc = frame(&[("car", 0.9)]);
        let out = p.apply(42, &doc);
        assert_eq!(out["id"], 42);
        assert_eq!(out["video_id"], "v1");
        assert!(out.get("objects").is_none());
    }

    #[test]
    fn test_full_projection_omits_id() {
        let out = Projection::full().apply(7, &frame(&[("car", 0.9)]));
        assert!(out.get("id").is_none());
        assert_eq!(out["frame_index"], 5);
        assert_eq!(out["objects"][0]["label"], "car");
    }
}
