//! Lowering of a [`Pipeline`] to a single SQLite statement.
//!
//! - label membership → `d.id IN (SELECT doc_id FROM detected_objects WHERE label IN (...))`
//! - array filter + size → correlated `COUNT(*)` over `detected_objects`
//! - numeric comparison → `>=` / `<=` against a bound parameter
//! - projection → select list

use rusqlite::types::Value as SqlValue;

use framesift_core::{Error, Result};

use crate::pipeline::{DocumentField, Expr, ObjectPredicate, Pipeline, Projection, Stage};

/// A lowered query: SQL text, positional parameters and the selected fields
/// in column order.
#[derive(Debug, Clone)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
    pub columns: Vec<DocumentField>,
}

fn column(field: DocumentField) -> &'static str {
    match field {
        DocumentField::Id => "d.id",
        DocumentField::VideoId => "d.video_id",
        DocumentField::FrameIndex => "d.frame_index",
        DocumentField::Objects => "d.objects_json",
    }
}

/// Lower a pipeline. Fails if a stage follows the projection.
pub fn lower(pipeline: &Pipeline) -> Result<SqlQuery> {
    let mut predicates: Vec<String> = Vec::new();
    let mut params: Vec<SqlValue> = Vec::new();
    let mut projection: Option<&Projection> = None;

    for stage in pipeline.stages() {
        if projection.is_some() {
            return Err(Error::InvalidQuery(
                "projection must be the last pipeline stage".into(),
            ));
        }
        match stage {
            Stage::MatchLabels(labels) => {
                predicates.push(lower_label_match(labels, &mut params));
            }
            Stage::MatchExpr(expr) => {
                predicates.push(lower_expr(expr, &mut params));
            }
            Stage::Project(p) => projection = Some(p),
        }
    }

    let full = Projection::full();
    let columns = projection.unwrap_or(&full).fields().to_vec();
    let select = if columns.is_empty() {
        "NULL".to_string()
    } else {
        columns.iter().map(|f| column(*f)).collect::<Vec<_>>().join(", ")
    };

    let mut sql = format!("SELECT {} FROM detections d", select);
    if !predicates.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&predicates.join(" AND "));
    }
    sql.push_str(" ORDER BY d.id");

    Ok(SqlQuery {
        sql,
        params,
        columns,
    })
}

fn lower_label_match(labels: &[String], params: &mut Vec<SqlValue>) -> String {
    if labels.is_empty() {
        return "0".to_string();
    }
    let placeholders = vec!["?"; labels.len()].join(", ");
    params.extend(labels.iter().map(|l| SqlValue::Text(l.clone())));
    format!(
        "d.id IN (SELECT o.doc_id FROM detected_objects o WHERE o.label IN ({}))",
        placeholders
    )
}

fn lower_expr(expr: &Expr, params: &mut Vec<SqlValue>) -> String {
    match expr {
        Expr::And(exprs) if exprs.is_empty() => "1".to_string(),
        Expr::And(exprs) => {
            let parts: Vec<String> = exprs.iter().map(|e| lower_expr(e, params)).collect();
            format!("({})", parts.join(" AND "))
        }
        Expr::AtLeast(count, n) => {
            let size = lower_count(&count.0, params);
            params.push(SqlValue::Integer(bound(*n)));
            format!("{} >= ?", size)
        }
        Expr::AtMost(count, n) => {
            let size = lower_count(&count.0, params);
            params.push(SqlValue::Integer(bound(*n)));
            format!("{} <= ?", size)
        }
    }
}

fn lower_count(pred: &ObjectPredicate, params: &mut Vec<SqlValue>) -> String {
    let filter = lower_predicate(pred, params);
    format!(
        "(SELECT COUNT(*) FROM detected_objects o WHERE o.doc_id = d.id AND {})",
        filter
    )
}

fn lower_predicate(pred: &ObjectPredicate, params: &mut Vec<SqlValue>) -> String {
    match pred {
        ObjectPredicate::LabelEq(label) => {
            params.push(SqlValue::Text(label.clone()));
            "o.label = ?".to_string()
        }
        ObjectPredicate::ConfidenceAtLeast(min) => {
            params.push(SqlValue::Real(*min));
            "o.confidence >= ?".to_string()
        }
        ObjectPredicate::And(preds) if preds.is_empty() => "1".to_string(),
        ObjectPredicate::And(preds) => {
            let parts: Vec<String> = preds.iter().map(|p| lower_predicate(p, params)).collect();
            format!("({})", parts.join(" AND "))
        }
    }
}

fn bound(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
