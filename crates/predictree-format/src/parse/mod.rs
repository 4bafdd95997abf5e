//! Versioned result file parsers.
//!
//! Each supported `file_version` is one [`FileFormat`] strategy. Both build
//! the same [`SubmissionResult`] tree; they only differ in where sections
//! live and how an extraction records its spans.

mod v1;
mod v3;

use std::collections::BTreeMap;
use std::sync::Arc;

use predictree_core::{
    BoundingBox, Classification, Document, Extraction, FileVersion, FormExtraction,
    FormFieldType, ModelGroup, PredictedMut, Prediction, PredictionBase, Review, ReviewType,
    SubmissionResult, Summarization, TaskType, Unbundling,
};
use serde_json::Value;
use tracing::debug;

use crate::FormatError;
use crate::normalize::normalize;
use crate::wire::Fields;

pub(crate) use v1::infer_task_type;
pub use v1::V1Format;
pub use v3::V3Format;

/// One wire layout of a result file.
pub trait FileFormat: Send + Sync {
    fn version(&self) -> FileVersion;

    /// Build the result tree from an already normalized object.
    fn parse(&self, raw: &Value) -> Result<SubmissionResult, FormatError>;
}

pub fn format_for(version: FileVersion) -> &'static dyn FileFormat {
    match version {
        FileVersion::V1 => &V1Format,
        FileVersion::V3 => &V3Format,
    }
}

/// Parse a normalized result object.
pub fn parse(raw: &Value, version: FileVersion) -> Result<SubmissionResult, FormatError> {
    format_for(version).parse(raw)
}

/// Decode, normalize and parse a result file.
pub fn load(bytes: &[u8]) -> Result<SubmissionResult, FormatError> {
    let raw: Value = serde_json::from_slice(bytes)?;
    let wire_version = read_version(&raw)?;
    let version =
        FileVersion::from_wire(wire_version).ok_or(FormatError::UnsupportedVersion(wire_version))?;
    let result = parse(&normalize(raw, wire_version), version)?;
    debug!(
        submission_id = result.submission_id,
        documents = result.documents.len(),
        predictions = result.predictions.len(),
        "loaded result file"
    );
    Ok(result)
}

/// The integer `file_version` of a raw result object.
pub fn read_version(raw: &Value) -> Result<i64, FormatError> {
    raw.get("file_version")
        .and_then(Value::as_i64)
        .ok_or(FormatError::MissingVersion)
}

/// Owners shared by every prediction of one section.
pub(crate) struct Owners {
    pub document: Arc<Document>,
    pub model: Arc<ModelGroup>,
    pub review: Option<Arc<Review>>,
}

/// How an extraction stores its position on the wire.
#[derive(Debug, Clone, Copy)]
pub(crate) enum SpanLayout {
    /// `start`/`end`/`page_num` directly on the prediction.
    Inline,
    /// A `spans` list.
    List,
}

pub(crate) fn review(value: &Value, context: &str) -> Result<Review, FormatError> {
    let mut f = Fields::new(value, context)?;
    let review_type = f.str("review_type")?;
    Ok(Review {
        id: f.i64("review_id")?,
        reviewer_id: f.opt_i64("reviewer_id")?.unwrap_or_default(),
        notes: f.opt_str("review_notes")?.unwrap_or_default(),
        rejected: f.opt_bool("review_rejected")?.unwrap_or(false),
        review_type: ReviewType::parse(&review_type)
            .ok_or_else(|| f.error("review_type", format!("unknown review type {review_type:?}")))?,
    })
}

/// Build every prediction of one section.
pub(crate) fn predictions(
    section: &Value,
    context: &str,
    owners: &Owners,
    layout: SpanLayout,
) -> Result<Vec<Prediction>, FormatError> {
    let Value::Array(items) = section else {
        return Err(FormatError::malformed(context, "expected a prediction list"));
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| prediction(item, format!("{context}[{i}]"), owners, layout))
        .collect()
}

fn prediction(
    value: &Value,
    context: String,
    owners: &Owners,
    layout: SpanLayout,
) -> Result<Prediction, FormatError> {
    let mut f = Fields::new(value, context)?;
    let label = f.str("label")?;
    let confidences = f.confidences()?;

    let prediction = match owners.model.task_type {
        TaskType::Classification => Prediction::from(Classification {
            base: base(label, confidences, owners),
        }),
        TaskType::Extraction => {
            let text = f.opt_str("text")?.unwrap_or_default();
            let spans = match layout {
                SpanLayout::List => f.spans("spans")?,
                SpanLayout::Inline if ["start", "end", "page_num"].iter().any(|k| f.has(k)) => {
                    vec![f.inline_span()?]
                }
                SpanLayout::Inline => Vec::new(),
            };
            Prediction::from(Extraction {
                text,
                spans,
                groupings: f.groupings()?,
                state: f.review_state()?,
                base: base(label, confidences, owners),
            })
        }
        TaskType::FormExtraction => {
            let field_type = match f.opt_str("type")? {
                None => FormFieldType::Text,
                Some(t) => FormFieldType::parse(&t)
                    .ok_or_else(|| f.error("type", format!("unknown form field type {t:?}")))?,
            };
            Prediction::from(FormExtraction {
                field_type,
                text: f.opt_str("text")?.unwrap_or_default(),
                bbox: BoundingBox {
                    page: f.opt_i64("page_num")?,
                    top: f.opt_f64("top")?,
                    left: f.opt_f64("left")?,
                    right: f.opt_f64("right")?,
                    bottom: f.opt_f64("bottom")?,
                },
                checked: f.opt_bool("checked")?,
                signed: f.opt_bool("signed")?,
                state: f.review_state()?,
                base: base(label, confidences, owners),
            })
        }
        TaskType::Summarization => Prediction::from(Summarization {
            text: f.opt_str("text")?.unwrap_or_default(),
            citations: f.spans("citations")?,
            state: f.review_state()?,
            base: base(label, confidences, owners),
        }),
        TaskType::Unbundling => {
            let pages = f
                .array("pages")?
                .iter()
                .map(|p| p.as_i64().ok_or_else(|| f.error("pages", "expected page numbers")))
                .collect::<Result<Vec<_>, _>>()?;
            Prediction::from(Unbundling {
                pages,
                base: base(label, confidences, owners),
            })
        }
    };

    Ok(with_extras(prediction, f))
}

fn base(
    label: String,
    confidences: BTreeMap<String, f64>,
    owners: &Owners,
) -> PredictionBase {
    PredictionBase {
        document: owners.document.clone(),
        model: owners.model.clone(),
        review: owners.review.clone(),
        label,
        confidences,
        extras: Default::default(),
    }
}

fn with_extras(mut prediction: Prediction, fields: Fields) -> Prediction {
    prediction.base_mut().extras = fields.into_extras();
    prediction
}
