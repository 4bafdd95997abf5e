use std::sync::Arc;

use predictree_core::{
    Document, FileVersion, ModelGroup, PredictionList, SubmissionResult, TaskType,
};
use serde_json::{Map, Value};

use super::{FileFormat, Owners, SpanLayout, predictions, review};
use crate::FormatError;
use crate::wire::Fields;

const MODEL_RESULTS: &str = "/results/document/results";

/// Single-document layout with one section per model name.
///
/// Model groups are not listed on the wire. Their ids are positions in key
/// order and their task types are inferred from the first pre-review
/// prediction.
pub struct V1Format;

impl FileFormat for V1Format {
    fn version(&self) -> FileVersion {
        FileVersion::V1
    }

    fn parse(&self, raw: &Value) -> Result<SubmissionResult, FormatError> {
        let mut root = Fields::new(raw, "$")?;
        let submission_id = root.i64("submission_id")?;
        let filename = root.opt_str("input_filename")?.unwrap_or_default();
        let etl_output = root.opt_str("etl_output")?.unwrap_or_default();

        // Wire order, which is also the order of every `post_reviews` list.
        let wire_reviews = root
            .array("reviews_meta")?
            .iter()
            .enumerate()
            .map(|(i, v)| review(v, &format!("$.reviews_meta[{i}]")).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        let sections = raw
            .pointer(MODEL_RESULTS)
            .and_then(Value::as_object)
            .ok_or_else(|| FormatError::malformed("$.results.document.results", "missing object"))?;

        let models: Vec<Arc<ModelGroup>> = sections
            .iter()
            .enumerate()
            .map(|(i, (name, section))| {
                Arc::new(ModelGroup {
                    id: i as i64,
                    name: name.clone(),
                    task_type: infer_task_type(&section["pre_review"]),
                })
            })
            .collect();

        let document = Arc::new(Document {
            id: submission_id,
            filename,
            etl_output,
            models: models.clone(),
        });

        let mut all = PredictionList::new();
        for (model, section) in models.iter().zip(sections.values()) {
            let context = format!("$.results.document.results.{}", model.name);
            let mut owners = Owners {
                document: document.clone(),
                model: model.clone(),
                review: None,
            };
            all.extend(predictions(
                &section["pre_review"],
                &format!("{context}.pre_review"),
                &owners,
                SpanLayout::Inline,
            )?);

            let layers = section["post_reviews"]
                .as_array()
                .map(Vec::as_slice)
                .unwrap_or_default();
            for (i, (review, layer)) in wire_reviews.iter().zip(layers).enumerate() {
                if review.rejected {
                    continue;
                }
                owners.review = Some(review.clone());
                all.extend(predictions(
                    layer,
                    &format!("{context}.post_reviews[{i}]"),
                    &owners,
                    SpanLayout::Inline,
                )?);
            }
        }

        let mut reviews = wire_reviews;
        reviews.sort_by_key(|r| r.id);

        Ok(SubmissionResult {
            version: FileVersion::V1,
            submission_id,
            documents: vec![document],
            models,
            predictions: all,
            reviews,
            errored_files: Map::new(),
        })
    }
}

/// `type` means a form field, `text` an extraction, anything else a
/// classification. A model with no pre-review predictions counts as an
/// extraction.
pub(crate) fn infer_task_type(pre_review: &Value) -> TaskType {
    let first = match pre_review {
        Value::Array(items) => items.first(),
        bare @ Value::Object(_) => Some(bare),
        _ => None,
    };
    match first {
        None => TaskType::Extraction,
        Some(p) if p.get("type").is_some() => TaskType::FormExtraction,
        Some(p) if p.get("text").is_some() => TaskType::Extraction,
        Some(_) => TaskType::Classification,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use predictree_core::{Predicted, Query, ReviewRef, ReviewType, Span};
    use serde_json::json;

    fn parse(raw: Value) -> Result<SubmissionResult, FormatError> {
        V1Format.parse(&normalize(raw, 1))
    }

    fn file(models: Value, reviews: Value) -> Value {
        json!({
            "file_version": 1,
            "submission_id": 12,
            "input_filename": "invoice.pdf",
            "etl_output": "indico-file:///etl/12.json",
            "reviews_meta": reviews,
            "results": {"document": {"results": models}}
        })
    }

    fn extraction(label: &str, start: i64) -> Value {
        json!({
            "label": label, "text": label.to_lowercase(),
            "start": start, "end": start + 3, "page_num": 0,
            "confidence": {label: 0.9}
        })
    }

    #[test]
    fn infers_task_types_and_synthesizes_ids() {
        let result = parse(file(
            json!({
                "Doc Type": {"pre_review": {"label": "Invoice", "confidence": {"Invoice": 0.9}}},
                "Fields": {"pre_review": [extraction("Total", 0)]},
                "Form": {"pre_review": [{"label": "Sig", "type": "signature"}]},
                "Unused": {"pre_review": []}
            }),
            json!([]),
        ))
        .unwrap();

        let task_types: Vec<(i64, &str, TaskType)> = result
            .models
            .iter()
            .map(|m| (m.id, m.name.as_str(), m.task_type))
            .collect();
        assert_eq!(
            task_types,
            vec![
                (0, "Doc Type", TaskType::Classification),
                (1, "Fields", TaskType::Extraction),
                (2, "Form", TaskType::FormExtraction),
                (3, "Unused", TaskType::Extraction),
            ]
        );
        let doc = result.document().unwrap();
        assert_eq!(doc.id, 12);
        assert_eq!(doc.filename, "invoice.pdf");
        assert_eq!(doc.models.len(), 4);
        assert!(result.errored_files.is_empty());
    }

    #[test]
    fn review_layers_follow_wire_order() {
        let result = parse(file(
            json!({"Fields": {
                "pre_review": [extraction("Total", 0), extraction("Date", 10)],
                "post_reviews": [
                    [extraction("Total", 0)],
                    [extraction("Date", 10)]
                ]
            }}),
            json!([
                {"review_id": 9, "reviewer_id": 1, "review_rejected": false, "review_type": "manual"},
                {"review_id": 3, "reviewer_id": 1, "review_rejected": false, "review_type": "auto"}
            ]),
        ))
        .unwrap();

        let manual = result
            .predictions
            .view()
            .filter(&Query::new().review(ReviewType::Manual));
        assert_eq!(manual.single().unwrap().label(), "Total");

        // Sorted by id once parsed.
        let ids: Vec<i64> = result.reviews.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 9]);
        assert_eq!(result.final_review().map(|r| r.id), Some(9));
        assert_eq!(result.final_predictions().single().unwrap().label(), "Total");
    }

    #[test]
    fn rejected_review_layers_are_dropped() {
        let result = parse(file(
            json!({"Fields": {
                "pre_review": [extraction("Total", 0)],
                "post_reviews": [[extraction("Total", 0)]]
            }}),
            json!([{"review_id": 1, "reviewer_id": 1, "review_rejected": true, "review_type": "manual"}]),
        ))
        .unwrap();

        assert!(result.rejected());
        assert_eq!(result.predictions.len(), 1);
        let pre = result
            .predictions
            .view()
            .filter(&Query::new().review(ReviewRef::PreReview));
        assert_eq!(pre.len(), 1);
        assert_eq!(result.final_predictions().len(), 1);
    }

    #[test]
    fn extraction_span_comes_from_top_level_keys() {
        let result = parse(file(
            json!({"Fields": {"pre_review": [extraction("Total", 4)]}}),
            json!([]),
        ))
        .unwrap();
        let e = result.predictions.extractions().single().unwrap();
        assert_eq!(e.span(), Span::new(4, 7, 0));
        assert_eq!(e.text, "total");
    }

    #[test]
    fn missing_model_results_is_malformed() {
        let err = parse(json!({"file_version": 1, "submission_id": 1})).unwrap_err();
        assert!(matches!(err, FormatError::Malformed { .. }));
    }
}
