//! Compilation of an [`ObjectQuery`] into a store [`Pipeline`].
//!
//! Shape of the output:
//!
//! 1. `MatchLabels(distinct labels)` pre-filter
//! 2. `MatchExpr` with one count-range expression per condition, conjoined
//! 3. `Project(projection)` if one was requested

use framesift_store::{CountOf, Expr, ObjectPredicate, Pipeline, Projection, Stage};

use crate::types::{InstanceBounds, ObjectCondition, ObjectQuery};

/// Build the pipeline for `query`. An empty query compiles to a pipeline with
/// an empty label set, which matches nothing.
pub fn compile(query: &ObjectQuery, projection: Option<&Projection>) -> Pipeline {
    let mut pipeline = Pipeline::new().with_stage(Stage::MatchLabels(query.labels()));

    let mut exprs: Vec<Expr> = query.conditions().iter().map(condition_expr).collect();
    match exprs.len() {
        0 => {}
        1 => pipeline.push(Stage::MatchExpr(exprs.remove(0))),
        _ => pipeline.push(Stage::MatchExpr(Expr::And(exprs))),
    }

    if let Some(projection) = projection {
        pipeline.push(Stage::Project(projection.clone()));
    }
    pipeline
}

/// Count-range expression of one condition.
pub fn condition_expr(condition: &ObjectCondition) -> Expr {
    let matching = || {
        CountOf(ObjectPredicate::And(vec![
            ObjectPredicate::LabelEq(condition.label.clone()),
            ObjectPredicate::ConfidenceAtLeast(condition.min_confidence),
        ]))
    };

    match condition.bounds {
        InstanceBounds::AtLeast(min) => Expr::AtLeast(matching(), min),
        InstanceBounds::AtMost(max) => Expr::AtMost(matching(), max),
        InstanceBounds::Between(min, max) => Expr::And(vec![
            Expr::AtLeast(matching(), min),
            Expr::AtMost(matching(), max),
        ]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConditionSpec;
    use framesift_store::{DetectedObject, DetectionDocument, DocumentField};

    fn query(specs: &[ConditionSpec]) -> ObjectQuery {
        ObjectQuery::from_specs(specs).unwrap()
    }

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

    #[test]
    fn test_single_condition_not_wrapped() {
        let pipeline = compile(&query(&[ConditionSpec::new("car").min_confidence(0.5).at_least(1)]), None);
        assert_eq!(pipeline.stages().len(), 2);
        assert_eq!(pipeline.stages()[0], Stage::MatchLabels(vec!["car".into()]));
        match &pipeline.stages()[1] {
            Stage::MatchExpr(Expr::AtLeast(_, 1)) => {}
            other => panic!("unexpected stage {:?}", other),
        }
    }

    #[test]
    fn test_range_condition_becomes_conjunction() {
        let pipeline = compile(
            &query(&[ConditionSpec::new("car").min_confidence(0.5).at_least(1).at_most(3)]),
            None,
        );
        match &pipeline.stages()[1] {
            Stage::MatchExpr(Expr::And(parts)) => {
                assert!(matches!(parts[0], Expr::AtLeast(_, 1)));
                assert!(matches!(parts[1], Expr::AtMost(_, 3)));
            }
            other => panic!("unexpected stage {:?}", other),
        }
    }

    #[test]
    fn test_projection_appended_last() {
        let projection = Projection::new([DocumentField::VideoId]);
        let pipeline = compile(
            &query(&[
                ConditionSpec::new("car").at_least(1),
                ConditionSpec::new("person").at_most(2),
            ]),
            Some(&projection),
        );
        assert_eq!(pipeline.stages().len(), 3);
        assert_eq!(pipeline.projection(), Some(&projection));
        assert_eq!(
            pipeline.stages()[0],
            Stage::MatchLabels(vec!["car".into(), "person".into()])
        );
    }

    #[test]
    fn test_single_condition_range_semantics() {
        let pipeline = compile(
            &query(&[ConditionSpec::new("car").min_confidence(0.5).at_least(1).at_most(3)]),
            None,
        );
        for cars in 0..6 {
            let objects: Vec<(&str, f64)> = std::iter::repeat(("car", 0.8))
                .take(cars)
                .chain([("car", 0.1), ("person", 0.9)])
                .collect();
            assert_eq!(
                pipeline.matches(&frame(&objects)),
                (1..=3).contains(&cars),
                "{} qualifying cars",
                cars
            );
        }
    }

    #[test]
    fn test_conjunction_equals_intersection() {
        let car = ConditionSpec::new("car").min_confidence(0.5).at_least(1);
        let person = ConditionSpec::new("person").min_confidence(0.7).at_least(1);
        let both = compile(&query(&[car.clone(), person.clone()]), None);
        let car_only = compile(&query(&[car]), None);
        let person_only = compile(&query(&[person]), None);

        let docs = [
            frame(&[("car", 0.9), ("car", 0.3), ("person", 0.8)]),
            frame(&[("car", 0.9)]),
            frame(&[("person", 0.75)]),
            frame(&[("car", 0.4), ("person", 0.6)]),
            frame(&[]),
        ];
        for doc in &docs {
            assert_eq!(
                both.matches(doc),
                car_only.matches(doc) && person_only.matches(doc)
            );
            assert!(!both.matches(doc) || both.prefilter().matches(doc));
        }
    }

    #[test]
    fn test_scenarios() {
        let doc = frame(&[("car", 0.9), ("car", 0.3), ("person", 0.8)]);
        let matching = compile(
            &query(&[
                ConditionSpec::new("car").min_confidence(0.5).at_least(1).at_most(3),
                ConditionSpec::new("person").min_confidence(0.7).at_least(1),
            ]),
            None,
        );
        assert!(matching.matches(&doc));

        let strict = compile(
            &query(&[
                ConditionSpec::new("car").min_confidence(0.95).at_least(1).at_most(3),
                ConditionSpec::new("person").min_confidence(0.7).at_least(1),
            ]),
            None,
        );
        assert!(!strict.matches(&doc));
    }

    #[test]
    fn test_at_most_zero_requires_a_listed_label() {
        // The label pre-filter still applies, so "no confident dogs" only
        // matches frames that contain some dog.
        let pipeline = compile(
            &query(&[ConditionSpec::new("dog").min_confidence(0.5).at_most(0)]),
            None,
        );
        assert!(!pipeline.matches(&frame(&[("car", 0.9)])));
        assert!(!pipeline.matches(&frame(&[("dog", 0.9)])));
        assert!(pipeline.matches(&frame(&[("dog", 0.1)])));
    }
}
