use std::sync::Arc;

use predictree_core::{
    Document, FileVersion, ModelGroup, PredictionList, SubmissionResult, TaskType,
};
use serde_json::{Map, Value};

use super::{FileFormat, Owners, SpanLayout, predictions, review};
use crate::FormatError;
use crate::wire::Fields;

/// Multi-document layout with explicit model group metadata.
pub struct V3Format;

impl FileFormat for V3Format {
    fn version(&self) -> FileVersion {
        FileVersion::V3
    }

    fn parse(&self, raw: &Value) -> Result<SubmissionResult, FormatError> {
        let mut root = Fields::new(raw, "$")?;
        let submission_id = root.i64("submission_id")?;

        let mut models = Vec::new();
        for (key, meta) in root.object("modelgroup_metadata")? {
            models.push(Arc::new(model_group(&meta, &format!("$.modelgroup_metadata.{key}"))?));
        }

        let mut reviews = Vec::new();
        for (key, value) in root.object("reviews")? {
            reviews.push(Arc::new(review(&value, &format!("$.reviews.{key}"))?));
        }
        reviews.sort_by_key(|r| r.id);
        let final_review = reviews.iter().rev().find(|r| !r.rejected).cloned();

        let errored_files = root.object("errored_files")?;

        let mut documents = Vec::new();
        let mut all = PredictionList::new();
        for (i, file) in root.array("submission_results")?.iter().enumerate() {
            let context = format!("$.submission_results[{i}]");
            let mut f = Fields::new(file, context.as_str())?;
            let id = f.i64("submissionfile_id")?;
            let filename = f.opt_str("input_filename")?.unwrap_or_default();
            let etl_output = f.opt_str("etl_output")?.unwrap_or_default();
            let mut model_results = Fields::new(
                &f.take("model_results").unwrap_or(Value::Null),
                format!("{context}.model_results"),
            )?;
            let original = model_results.object("ORIGINAL")?;
            let final_layer = match final_review {
                Some(_) => model_results.object("FINAL")?,
                None => Map::new(),
            };

            // Resolve every key before the document exists so it can list
            // the models it knows.
            let original = resolve(&models, original)?;
            let final_layer = resolve(&models, final_layer)?;
            let mut known: Vec<Arc<ModelGroup>> = Vec::new();
            for (model, _) in original.iter().chain(&final_layer) {
                if !known.iter().any(|m| m.id == model.id) {
                    known.push(model.clone());
                }
            }

            let document = Arc::new(Document {
                id,
                filename,
                etl_output,
                models: known,
            });

            for (layer, sections, layer_review) in [
                ("ORIGINAL", original, None),
                ("FINAL", final_layer, final_review.clone()),
            ] {
                for (model, section) in sections {
                    let owners = Owners {
                        document: document.clone(),
                        model: model.clone(),
                        review: layer_review.clone(),
                    };
                    all.extend(predictions(
                        &section,
                        &format!("{context}.model_results.{layer}.{}", model.id),
                        &owners,
                        SpanLayout::List,
                    )?);
                }
            }
            documents.push(document);
        }

        Ok(SubmissionResult {
            version: FileVersion::V3,
            submission_id,
            documents,
            models,
            predictions: all,
            reviews,
            errored_files,
        })
    }
}

fn model_group(value: &Value, context: &str) -> Result<ModelGroup, FormatError> {
    let mut f = Fields::new(value, context)?;
    let wire_type = f.str("task_type")?;
    let task_type = task_type(&wire_type)
        .ok_or_else(|| f.error("task_type", format!("unknown task type {wire_type:?}")))?;
    Ok(ModelGroup {
        id: f.i64("id")?,
        name: f.str("name")?,
        task_type,
    })
}

fn task_type(wire: &str) -> Option<TaskType> {
    match wire {
        "classification" => Some(TaskType::Classification),
        "annotation" => Some(TaskType::Extraction),
        "form_extraction" => Some(TaskType::FormExtraction),
        "summarization" => Some(TaskType::Summarization),
        "classification_unbundling" => Some(TaskType::Unbundling),
        _ => None,
    }
}

/// Match each section key to a model group, by id first and then by name.
fn resolve(
    models: &[Arc<ModelGroup>],
    sections: Map<String, Value>,
) -> Result<Vec<(Arc<ModelGroup>, Value)>, FormatError> {
    sections
        .into_iter()
        .map(|(key, section)| {
            let by_id = key
                .parse::<i64>()
                .ok()
                .and_then(|id| models.iter().find(|m| m.id == id));
            let model = by_id
                .or_else(|| models.iter().find(|m| m.name == key))
                .ok_or(FormatError::UnknownModel(key))?;
            Ok((model.clone(), section))
        })
        .collect()
}
