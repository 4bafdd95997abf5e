//! Structural repair of raw result files.
//!
//! Result files written by different pipeline releases omit sections,
//! write single predictions without a wrapping list, or leave review notes
//! null. [`normalize`] fills those gaps so the parsers only ever see one
//! shape per version. It never fails: input it does not recognise is handed
//! back untouched and left for the parser to reject.

use std::collections::HashMap;

use predictree_core::TaskType;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::parse::infer_task_type;

const BOX_KEYS: [&str; 5] = ["page_num", "top", "left", "right", "bottom"];

pub fn normalize(mut raw: Value, version: i64) -> Value {
    let Some(root) = raw.as_object_mut() else {
        return raw;
    };
    match version {
        1 => normalize_v1(root),
        3 => normalize_v3(root),
        other => debug!(version = other, "leaving result file with unknown version as-is"),
    }
    raw
}

fn normalize_v1(root: &mut Map<String, Value>) {
    let review_count = match ensure_array(root, "reviews_meta") {
        Some(reviews) => {
            reviews.iter_mut().for_each(default_notes);
            reviews.len()
        }
        None => 0,
    };

    let Some(models) = root
        .get_mut("results")
        .and_then(|r| r.get_mut("document"))
        .and_then(|d| d.get_mut("results"))
        .and_then(Value::as_object_mut)
    else {
        return;
    };

    for section in models.values_mut() {
        let Some(section) = section.as_object_mut() else {
            continue;
        };
        let pre_review = section.entry("pre_review").or_insert(Value::Null);
        wrap_predictions(pre_review);
        // Review edits follow the model's shape, not their own keys.
        let task_type = wire_task_type(infer_task_type(pre_review));
        for p in predictions_mut(pre_review) {
            default_prediction(p, Some(task_type));
        }

        let Some(post_reviews) = ensure_array(section, "post_reviews") else {
            continue;
        };
        if post_reviews.len() < review_count {
            post_reviews.resize(review_count, Value::Null);
        }
        for layer in post_reviews.iter_mut() {
            wrap_predictions(layer);
            for p in predictions_mut(layer) {
                default_prediction(p, Some(task_type));
            }
        }
    }
}

fn normalize_v3(root: &mut Map<String, Value>) {
    if let Some(reviews) = ensure_object(root, "reviews") {
        reviews.values_mut().for_each(default_notes);
    }
    ensure_object(root, "errored_files");
    ensure_object(root, "component_metadata");

    // Task types by metadata key and by name, so per-prediction defaults
    // follow the model group rather than guessing from keys.
    let mut task_types: HashMap<String, String> = HashMap::new();
    if let Some(meta) = root.get("modelgroup_metadata").and_then(Value::as_object) {
        for (key, group) in meta {
            let Some(task_type) = group.get("task_type").and_then(Value::as_str) else {
                continue;
            };
            task_types.insert(key.clone(), task_type.to_string());
            if let Some(name) = group.get("name").and_then(Value::as_str) {
                task_types
                    .entry(name.to_string())
                    .or_insert_with(|| task_type.to_string());
            }
        }
    }

    let Some(files) = root
        .get_mut("submission_results")
        .and_then(Value::as_array_mut)
    else {
        return;
    };

    for file in files.iter_mut().filter_map(Value::as_object_mut) {
        if let Some(model_results) = ensure_object(file, "model_results") {
            for layer in ["ORIGINAL", "FINAL"] {
                let Some(sections) = ensure_object(model_results, layer) else {
                    continue;
                };
                for (key, section) in sections.iter_mut() {
                    wrap_predictions(section);
                    let task_type = task_types.get(key).map(String::as_str);
                    for p in predictions_mut(section) {
                        default_prediction(p, task_type);
                    }
                }
            }
        }

        if let Some(component_results) = ensure_object(file, "component_results") {
            for layer in ["ORIGINAL", "FINAL"] {
                ensure_object(component_results, layer);
            }
        }
    }
}

/// Replace a missing or mistyped entry with an empty array.
fn ensure_array<'a>(map: &'a mut Map<String, Value>, key: &str) -> Option<&'a mut Vec<Value>> {
    let slot = map.entry(key).or_insert(Value::Null);
    if !slot.is_array() {
        *slot = Value::Array(Vec::new());
    }
    slot.as_array_mut()
}

/// Replace a missing or mistyped entry with an empty object.
fn ensure_object<'a>(
    map: &'a mut Map<String, Value>,
    key: &str,
) -> Option<&'a mut Map<String, Value>> {
    let slot = map.entry(key).or_insert(Value::Null);
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    slot.as_object_mut()
}

fn predictions_mut(section: &mut Value) -> std::slice::IterMut<'_, Value> {
    match section {
        Value::Array(items) => items.iter_mut(),
        _ => Default::default(),
    }
}

/// `null` becomes `[]`, a bare prediction object becomes `[obj]`.
fn wrap_predictions(section: &mut Value) {
    match section {
        Value::Array(_) => {}
        Value::Null => *section = Value::Array(Vec::new()),
        _ => {
            let bare = section.take();
            *section = Value::Array(vec![bare]);
        }
    }
}

fn default_notes(review: &mut Value) {
    if let Some(review) = review.as_object_mut() {
        let notes = review.entry("review_notes").or_insert(Value::Null);
        if notes.is_null() {
            *notes = Value::String(String::new());
        }
    }
}

fn wire_task_type(task_type: TaskType) -> &'static str {
    match task_type {
        TaskType::Classification => "classification",
        TaskType::Extraction => "annotation",
        TaskType::FormExtraction => "form_extraction",
        TaskType::Summarization => "summarization",
        TaskType::Unbundling => "classification_unbundling",
    }
}

/// Fill per-prediction defaults. Without a known task type the shape is
/// guessed from the prediction's own keys.
fn default_prediction(prediction: &mut Value, task_type: Option<&str>) {
    let Some(p) = prediction.as_object_mut() else {
        return;
    };

    if !p.contains_key("confidence")
        && let Some(label) = p.get("label").and_then(Value::as_str)
    {
        let mut confidence = Map::new();
        confidence.insert(label.to_string(), json!(0));
        p.insert("confidence".into(), Value::Object(confidence));
    }

    let task_type = task_type.unwrap_or(if p.contains_key("type") {
        "form_extraction"
    } else if p.contains_key("text") {
        "annotation"
    } else {
        "classification"
    });

    match task_type {
        "form_extraction" => {
            for key in BOX_KEYS {
                p.entry(key).or_insert(Value::Null);
            }
        }
        "annotation" => {
            null_to_empty_array(p, "groupings");
        }
        "summarization" => {
            null_to_empty_array(p, "citations");
        }
        _ => {}
    }
}

fn null_to_empty_array(p: &mut Map<String, Value>, key: &str) {
    let slot = p.entry(key).or_insert(Value::Null);
    if slot.is_null() {
        *slot = Value::Array(Vec::new());
    }
}
