//! Query and result types of the retrieval engine.

use serde::{Deserialize, Serialize};

use framesift_core::{DistanceMetric, Error, FramesiftConfig, Result};

/// One object condition as supplied by a caller (JSON or code).
///
/// Either bound may be omitted, but not both; [`ObjectCondition::try_from`]
/// rejects such a spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionSpec {
    pub label: String,
    #[serde(default, alias = "confidence")]
    pub min_confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_instances: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_instances: Option<u64>,
}

impl ConditionSpec {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            min_confidence: 0.0,
            min_instances: None,
            max_instances: None,
        }
    }

    pub fn min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn at_least(mut self, n: u64) -> Self {
        self.min_instances = Some(n);
        self
    }

    pub fn at_most(mut self, n: u64) -> Self {
        self.max_instances = Some(n);
        self
    }
}

/// Allowed instance count of a condition, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceBounds {
    AtLeast(u64),
    AtMost(u64),
    /// `min > max` is accepted and matches nothing.
    Between(u64, u64),
}

impl InstanceBounds {
    pub fn from_options(min: Option<u64>, max: Option<u64>) -> Option<Self> {
        match (min, max) {
            (Some(min), Some(max)) => Some(Self::Between(min, max)),
            (Some(min), None) => Some(Self::AtLeast(min)),
            (None, Some(max)) => Some(Self::AtMost(max)),
            (None, None) => None,
        }
    }

    pub fn min(&self) -> Option<u64> {
        match self {
            Self::AtLeast(min) | Self::Between(min, _) => Some(*min),
            Self::AtMost(_) => None,
        }
    }

    pub fn max(&self) -> Option<u64> {
        match self {
            Self::AtMost(max) | Self::Between(_, max) => Some(*max),
            Self::AtLeast(_) => None,
        }
    }

    pub fn contains(&self, count: u64) -> bool {
        self.min().map_or(true, |min| count >= min) && self.max().map_or(true, |max| count <= max)
    }
}

/// A validated object condition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectCondition {
    pub label: String,
    pub min_confidence: f64,
    pub bounds: InstanceBounds,
}

impl ObjectCondition {
    pub fn new(label: impl Into<String>, min_confidence: f64, bounds: InstanceBounds) -> Self {
        Self {
            label: label.into(),
            min_confidence,
            bounds,
        }
    }
}

impl TryFrom<&ConditionSpec> for ObjectCondition {
    type Error = Error;

    fn try_from(spec: &ConditionSpec) -> Result<Self> {
        let bounds = InstanceBounds::from_options(spec.min_instances, spec.max_instances)
            .ok_or_else(|| {
                Error::InvalidCondition(format!(
                    "condition for label '{}' must have at least min_instances or max_instances",
                    spec.label
                ))
            })?;
        Ok(Self::new(spec.label.clone(), spec.min_confidence, bounds))
    }
}

/// Conjunction of object conditions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ObjectQuery {
    conditions: Vec<ObjectCondition>,
}

impl ObjectQuery {
    pub fn new(conditions: Vec<ObjectCondition>) -> Self {
        Self { conditions }
    }

    /// Validate every spec; the first invalid one fails the whole query.
    pub fn from_specs(specs: &[ConditionSpec]) -> Result<Self> {
        let conditions = specs
            .iter()
            .map(ObjectCondition::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { conditions })
    }

    pub fn conditions(&self) -> &[ObjectCondition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Distinct labels in first-seen order.
    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        for condition in &self.conditions {
            if !labels.contains(&condition.label) {
                labels.push(condition.label.clone());
            }
        }
        labels
    }
}

/// One similarity search hit. `score` is the metric distance; lower is closer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyframeHit {
    pub video_id: String,
    pub frame_index: i64,
    pub score: f32,
}

/// Fixed parameters of similarity search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimilarityParams {
    pub vector_field: String,
    pub metric: DistanceMetric,
    pub nprobe: usize,
}

impl SimilarityParams {
    pub fn from_config(config: &FramesiftConfig) -> Self {
        Self {
            vector_field: config.vector_field.clone(),
            metric: config.metric,
            nprobe: config.nprobe,
        }
    }
}

impl Default for SimilarityParams {
    fn default() -> Self {
        Self {
            vector_field: "keyframe_vector".to_string(),
            metric: DistanceMetric::L2,
            nprobe: 10,
        }
    }
}
