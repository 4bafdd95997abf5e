pub mod error;
pub mod list;
pub mod model;
pub mod prediction;
pub mod query;

pub use error::PredictionError;
pub use list::PredictionList;
pub use model::{
    BoundingBox, Document, DocumentId, FileVersion, Grouping, ModelGroup, ModelGroupId, Review,
    ReviewId, ReviewType, Span, SubmissionId, SubmissionResult, TaskType,
};
pub use prediction::{
    AutoReviewable, Classification, Extraction, FormExtraction, FormFieldType, Predicted,
    PredictedMut, Prediction, PredictionBase, ReviewState, Summarization, Unbundling, Variant,
};
pub use query::{ModelRef, Query, ReviewRef};
