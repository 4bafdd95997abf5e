//! Change-set serialization.
//!
//! [`to_changes`] writes predictions back out in the wire shape of the file
//! they were parsed from. The output is the payload a review submission
//! carries, and it reads back through the parser into the same predictions.

use std::collections::BTreeMap;

use predictree_core::{
    Classification, Document, DocumentId, Extraction, FileVersion, FormExtraction, ModelGroupId,
    Predicted, Prediction, PredictionBase, PredictionError, SubmissionResult, Summarization,
    TaskType, Unbundling,
};
use serde_json::{Map, Value, json};

use crate::wire::{grouping_value, span_value, write_review_state, write_span};

/// Serialize `predictions` against the result they belong to.
///
/// Every model a document knows appears in the output, empty or not.
pub fn to_changes<P>(predictions: &[P], result: &SubmissionResult) -> Result<Value, PredictionError>
where
    P: Predicted + WirePrediction,
{
    // Bucket by (document, model) up front so the output lists models in
    // document order no matter how `predictions` is ordered.
    let mut buckets: Buckets = BTreeMap::new();
    for p in predictions {
        let document = p.document();
        if !result.contains_document(document) {
            return Err(PredictionError::Validation(format!(
                "prediction {:?} belongs to document {}, which is not part of submission {}",
                p.label(),
                document.id,
                result.submission_id
            )));
        }
        if !document.knows_model(p.model()) {
            return Err(PredictionError::Validation(format!(
                "document {} has no model {:?}",
                document.id,
                p.model().name
            )));
        }
        buckets
            .entry((document.id, p.model().id))
            .or_default()
            .push(p.to_wire(result.version));
    }

    match result.version {
        FileVersion::V1 => v1_changes(result.document()?, &mut buckets),
        FileVersion::V3 => Ok(Value::Array(
            result
                .documents
                .iter()
                .map(|d| v3_changes(d, &mut buckets))
                .collect(),
        )),
    }
}

type Buckets = BTreeMap<(DocumentId, ModelGroupId), Vec<Value>>;

/// A prediction that can be written in a result file's wire shape.
pub trait WirePrediction {
    fn to_wire(&self, version: FileVersion) -> Value;
}

impl<T: WirePrediction + ?Sized> WirePrediction for &T {
    fn to_wire(&self, version: FileVersion) -> Value {
        (**self).to_wire(version)
    }
}

impl<T: WirePrediction + ?Sized> WirePrediction for &mut T {
    fn to_wire(&self, version: FileVersion) -> Value {
        (**self).to_wire(version)
    }
}

impl WirePrediction for Prediction {
    fn to_wire(&self, version: FileVersion) -> Value {
        match self {
            Self::Classification(p) => p.to_wire(version),
            Self::Extraction(p) => p.to_wire(version),
            Self::FormExtraction(p) => p.to_wire(version),
            Self::Summarization(p) => p.to_wire(version),
            Self::Unbundling(p) => p.to_wire(version),
        }
    }
}

impl WirePrediction for Classification {
    fn to_wire(&self, _version: FileVersion) -> Value {
        Value::Object(common(&self.base))
    }
}

impl WirePrediction for Extraction {
    fn to_wire(&self, version: FileVersion) -> Value {
        let mut out = common(&self.base);
        out.insert("text".into(), Value::String(self.text.clone()));
        match version {
            FileVersion::V1 => {
                if let Some(span) = self.spans.first() {
                    write_span(&mut out, span);
                }
            }
            FileVersion::V3 => {
                out.insert("spans".into(), self.spans.iter().map(span_value).collect());
            }
        }
        out.insert(
            "groupings".into(),
            self.groupings.iter().map(grouping_value).collect(),
        );
        write_review_state(&mut out, &self.state);
        Value::Object(out)
    }
}

impl WirePrediction for FormExtraction {
    fn to_wire(&self, _version: FileVersion) -> Value {
        let mut out = common(&self.base);
        out.insert("type".into(), Value::String(self.field_type.as_str().into()));
        out.insert("text".into(), Value::String(self.text.clone()));
        out.insert("page_num".into(), json!(self.bbox.page));
        out.insert("top".into(), json!(self.bbox.top));
        out.insert("left".into(), json!(self.bbox.left));
        out.insert("right".into(), json!(self.bbox.right));
        out.insert("bottom".into(), json!(self.bbox.bottom));
        if let Some(checked) = self.checked {
            out.insert("checked".into(), Value::Bool(checked));
        }
        if let Some(signed) = self.signed {
            out.insert("signed".into(), Value::Bool(signed));
        }
        write_review_state(&mut out, &self.state);
        Value::Object(out)
    }
}

impl WirePrediction for Summarization {
    fn to_wire(&self, _version: FileVersion) -> Value {
        let mut out = common(&self.base);
        out.insert("text".into(), Value::String(self.text.clone()));
        out.insert(
            "citations".into(),
            self.citations.iter().map(span_value).collect(),
        );
        write_review_state(&mut out, &self.state);
        Value::Object(out)
    }
}

impl WirePrediction for Unbundling {
    fn to_wire(&self, _version: FileVersion) -> Value {
        let mut out = common(&self.base);
        out.insert("pages".into(), json!(self.pages));
        Value::Object(out)
    }
}

/// Extras first, so modeled fields win over stale copies.
fn common(base: &PredictionBase) -> Map<String, Value> {
    let mut out = base.extras.clone();
    out.insert("label".into(), Value::String(base.label.clone()));
    if !base.confidences.is_empty() {
        out.insert("confidence".into(), json!(base.confidences));
    }
    out
}

fn v1_changes(document: &Document, buckets: &mut Buckets) -> Result<Value, PredictionError> {
    let mut out = Map::new();
    for model in &document.models {
        let mut values = buckets.remove(&(document.id, model.id)).unwrap_or_default();
        let value = if model.task_type == TaskType::Classification && !values.is_empty() {
            if values.len() > 1 {
                return Err(PredictionError::MultipleValues {
                    count: values.len(),
                });
            }
            values.swap_remove(0)
        } else {
            Value::Array(values)
        };
        out.insert(model.name.clone(), value);
    }
    Ok(Value::Object(out))
}

fn v3_changes(document: &Document, buckets: &mut Buckets) -> Value {
    let model_results: Map<String, Value> = document
        .models
        .iter()
        .map(|m| {
            let values = buckets.remove(&(document.id, m.id)).unwrap_or_default();
            (m.id.to_string(), Value::Array(values))
        })
        .collect();
    json!({
        "submission_file_id": document.id,
        "model_results": model_results,
        "component_results": {},
    })
}
