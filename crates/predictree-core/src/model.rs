//! Canonical result tree: submissions, documents, model groups and reviews.
//!
//! A [`SubmissionResult`] is built once per parse and owns everything below it.
//! Predictions point back at their document, model group and review through
//! shared [`Arc`] handles, so any prediction can be resolved to its owners
//! without walking the tree.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::PredictionError;
use crate::list::PredictionList;
use crate::prediction::{Predicted, Prediction};

pub type SubmissionId = i64;
pub type DocumentId = i64;
pub type ModelGroupId = i64;
pub type ReviewId = i64;

/// Result file format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileVersion {
    /// Single document, per-model nested review sections.
    V1,
    /// Document list with explicit model group metadata.
    V3,
}

impl FileVersion {
    pub fn from_wire(version: i64) -> Option<Self> {
        match version {
            1 => Some(Self::V1),
            3 => Some(Self::V3),
            _ => None,
        }
    }

    pub fn as_wire(&self) -> i64 {
        match self {
            Self::V1 => 1,
            Self::V3 => 3,
        }
    }
}

/// The kind of output a model group produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskType {
    Classification,
    Extraction,
    FormExtraction,
    Summarization,
    Unbundling,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classification => "classification",
            Self::Extraction => "extraction",
            Self::FormExtraction => "form_extraction",
            Self::Summarization => "summarization",
            Self::Unbundling => "unbundling",
        }
    }
}

/// Who performed a review pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReviewType {
    Auto,
    Manual,
    Admin,
}

impl ReviewType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
            Self::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "manual" => Some(Self::Manual),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// A named predictive model producing one task type of output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelGroup {
    pub id: ModelGroupId,
    pub name: String,
    pub task_type: TaskType,
}

/// One file of a submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub filename: String,
    /// Reference to the layout artifact (OCR/ETL output) for this file.
    pub etl_output: String,
    /// Every model group that produced a section for this document.
    pub models: Vec<Arc<ModelGroup>>,
}

impl Document {
    pub fn knows_model(&self, model: &ModelGroup) -> bool {
        self.models.iter().any(|m| m.id == model.id)
    }
}

/// A correction pass over pre-review predictions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Review {
    pub id: ReviewId,
    pub reviewer_id: i64,
    /// Never absent on the model; missing wire notes become `""`.
    pub notes: String,
    pub rejected: bool,
    pub review_type: ReviewType,
}

/// A character span. Every position may be null for review insertions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Span {
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub page: Option<i64>,
}

impl Span {
    /// The all-null span, as opposed to a span that is absent altogether.
    pub const NULL: Span = Span {
        start: None,
        end: None,
        page: None,
    };

    pub fn new(start: i64, end: i64, page: i64) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            page: Some(page),
        }
    }

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

/// A page-relative bounding box.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundingBox {
    pub page: Option<i64>,
    pub top: Option<f64>,
    pub left: Option<f64>,
    pub right: Option<f64>,
    pub bottom: Option<f64>,
}

impl BoundingBox {
    pub const NULL: BoundingBox = BoundingBox {
        page: None,
        top: None,
        left: None,
        right: None,
        bottom: None,
    };

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

/// A linked-label group membership of an extraction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Grouping {
    pub id: i64,
    pub name: String,
    pub index: i64,
}

/// The parsed contents of one result file.
#[derive(Debug, Clone)]
pub struct SubmissionResult {
    pub version: FileVersion,
    pub submission_id: SubmissionId,
    pub documents: Vec<Arc<Document>>,
    pub models: Vec<Arc<ModelGroup>>,
    /// Flat list of every pre-review and surviving post-review prediction.
    pub predictions: PredictionList<Prediction>,
    /// Ordered by review id.
    pub reviews: Vec<Arc<Review>>,
    /// Files the pipeline failed on, kept verbatim (version 3 only).
    pub errored_files: Map<String, Value>,
}

impl SubmissionResult {
    /// Whether the most recent review rejected the submission.
    pub fn rejected(&self) -> bool {
        self.reviews.last().is_some_and(|r| r.rejected)
    }

    /// The last review that was not rejected, if any.
    pub fn final_review(&self) -> Option<&Arc<Review>> {
        self.reviews.iter().rev().find(|r| !r.rejected)
    }

    pub fn pre_review(&self) -> PredictionList<&Prediction> {
        self.predictions
            .iter()
            .filter(|p| p.review().is_none())
            .collect()
    }

    /// Predictions of the final review layer, or the pre-review layer when
    /// no review survived.
    pub fn final_predictions(&self) -> PredictionList<&Prediction> {
        let final_id = self.final_review().map(|r| r.id);
        self.predictions
            .iter()
            .filter(|p| p.review().map(|r| r.id) == final_id)
            .collect()
    }

    pub fn final_predictions_mut(&mut self) -> PredictionList<&mut Prediction> {
        let final_id = self.final_review().map(|r| r.id);
        self.predictions
            .iter_mut()
            .filter(|p| p.review().map(|r| r.id) == final_id)
            .collect()
    }

    /// The single document of this submission.
    pub fn document(&self) -> Result<&Arc<Document>, PredictionError> {
        match self.documents.as_slice() {
            [only] => Ok(only),
            docs => Err(PredictionError::MultipleValues { count: docs.len() }),
        }
    }

    pub fn model(&self, id: ModelGroupId) -> Option<&Arc<ModelGroup>> {
        self.models.iter().find(|m| m.id == id)
    }

    pub fn model_named(&self, name: &str) -> Option<&Arc<ModelGroup>> {
        self.models.iter().find(|m| m.name == name)
    }

    pub fn contains_document(&self, document: &Document) -> bool {
        self.documents.iter().any(|d| d.id == document.id)
    }
}
