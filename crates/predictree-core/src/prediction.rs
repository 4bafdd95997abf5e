//! Prediction taxonomy.
//!
//! [`Prediction`] is a closed sum over the five variants. Behaviour shared by
//! every variant lives on the [`Predicted`] trait; the accept/reject state
//! machine lives on [`AutoReviewable`], implemented only by the variants a
//! reviewer can accept or reject (extractions, form extractions and
//! summarizations). Both traits are implemented for references as well, so
//! a [`PredictionList`](crate::PredictionList) of `&mut Extraction` supports
//! the same operations as a list of owned values.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::PredictionError;
use crate::model::{BoundingBox, Document, Grouping, ModelGroup, Review, Span, TaskType};

/// Fields every prediction carries.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionBase {
    pub document: Arc<Document>,
    pub model: Arc<ModelGroup>,
    /// `None` for pre-review predictions.
    pub review: Option<Arc<Review>>,
    pub label: String,
    pub confidences: BTreeMap<String, f64>,
    /// Wire fields without a dedicated model field, kept for round-tripping.
    pub extras: Map<String, Value>,
}

/// Accept/reject flags of an auto-reviewable prediction.
///
/// The flags are only reachable through the four transitions below, which
/// keep `accepted && rejected` false.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReviewState {
    accepted: bool,
    rejected: bool,
}

impl ReviewState {
    /// Build from wire flags. A prediction flagged both ways is treated as rejected.
    pub fn from_flags(accepted: bool, rejected: bool) -> Self {
        Self {
            accepted: accepted && !rejected,
            rejected,
        }
    }

    pub fn accepted(&self) -> bool {
        self.accepted
    }

    pub fn rejected(&self) -> bool {
        self.rejected
    }

    pub fn accept(&mut self) {
        self.accepted = true;
        self.rejected = false;
    }

    pub fn reject(&mut self) {
        self.accepted = false;
        self.rejected = true;
    }

    pub fn unaccept(&mut self) {
        self.accepted = false;
    }

    pub fn unreject(&mut self) {
        self.rejected = false;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub base: PredictionBase,
}

/// A labeled span (or spans) of document text.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub base: PredictionBase,
    pub text: String,
    pub spans: Vec<Span>,
    pub groupings: BTreeSet<Grouping>,
    pub state: ReviewState,
}

impl Extraction {
    /// The first span, or [`Span::NULL`] when the extraction has none.
    pub fn span(&self) -> Span {
        self.spans.first().copied().unwrap_or(Span::NULL)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormFieldType {
    Checkbox,
    Signature,
    Text,
}

impl FormFieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checkbox => "checkbox",
            Self::Signature => "signature",
            Self::Text => "text",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "checkbox" => Some(Self::Checkbox),
            "signature" => Some(Self::Signature),
            "text" => Some(Self::Text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormExtraction {
    pub base: PredictionBase,
    pub field_type: FormFieldType,
    pub text: String,
    pub bbox: BoundingBox,
    pub checked: Option<bool>,
    pub signed: Option<bool>,
    pub state: ReviewState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summarization {
    pub base: PredictionBase,
    pub text: String,
    pub citations: Vec<Span>,
    pub state: ReviewState,
}

/// One constituent document of a bundle, identified by its pages.
#[derive(Debug, Clone, PartialEq)]
pub struct Unbundling {
    pub base: PredictionBase,
    pub pages: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    Classification(Classification),
    Extraction(Extraction),
    FormExtraction(FormExtraction),
    Summarization(Summarization),
    Unbundling(Unbundling),
}

// ── Capability traits ──

/// Read access shared by every prediction variant.
pub trait Predicted {
    fn base(&self) -> &PredictionBase;

    /// Pages this prediction touches.
    fn pages(&self) -> Vec<i64> {
        Vec::new()
    }

    fn review_state(&self) -> Option<&ReviewState> {
        None
    }

    fn checked(&self) -> Option<bool> {
        None
    }

    fn signed(&self) -> Option<bool> {
        None
    }

    fn document(&self) -> &Document {
        &self.base().document
    }

    fn model(&self) -> &ModelGroup {
        &self.base().model
    }

    fn review(&self) -> Option<&Review> {
        self.base().review.as_deref()
    }

    fn label(&self) -> &str {
        &self.base().label
    }

    /// Confidence of the current label. Predictions added during review may
    /// carry no score for their label, which is an error rather than zero.
    fn confidence(&self) -> Result<f64, PredictionError> {
        let base = self.base();
        base.confidences
            .get(&base.label)
            .copied()
            .ok_or_else(|| PredictionError::MissingConfidence {
                label: base.label.clone(),
            })
    }
}

/// Write access to the shared fields.
pub trait PredictedMut: Predicted {
    fn base_mut(&mut self) -> &mut PredictionBase;

    /// Overwrite the score of the current label.
    fn set_confidence(&mut self, score: f64) {
        let base = self.base_mut();
        base.confidences.insert(base.label.clone(), score);
    }
}

/// The accept/reject state machine.
pub trait AutoReviewable: Predicted {
    fn state(&self) -> &ReviewState;
    fn state_mut(&mut self) -> &mut ReviewState;

    fn accepted(&self) -> bool {
        self.state().accepted()
    }

    fn rejected(&self) -> bool {
        self.state().rejected()
    }

    fn accept(&mut self) {
        self.state_mut().accept();
    }

    fn reject(&mut self) {
        self.state_mut().reject();
    }

    fn unaccept(&mut self) {
        self.state_mut().unaccept();
    }

    fn unreject(&mut self) {
        self.state_mut().unreject();
    }
}

/// Narrowing from the closed enum to one concrete variant.
pub trait Variant: Predicted + Sized {
    fn from_ref(prediction: &Prediction) -> Option<&Self>;
    fn from_mut(prediction: &mut Prediction) -> Option<&mut Self>;
}

// ── Reference forwarding ──

impl<T: Predicted + ?Sized> Predicted for &T {
    fn base(&self) -> &PredictionBase {
        (**self).base()
    }
    fn pages(&self) -> Vec<i64> {
        (**self).pages()
    }
    fn review_state(&self) -> Option<&ReviewState> {
        (**self).review_state()
    }
    fn checked(&self) -> Option<bool> {
        (**self).checked()
    }
    fn signed(&self) -> Option<bool> {
        (**self).signed()
    }
}

impl<T: Predicted + ?Sized> Predicted for &mut T {
    fn base(&self) -> &PredictionBase {
        (**self).base()
    }
    fn pages(&self) -> Vec<i64> {
        (**self).pages()
    }
    fn review_state(&self) -> Option<&ReviewState> {
        (**self).review_state()
    }
    fn checked(&self) -> Option<bool> {
        (**self).checked()
    }
    fn signed(&self) -> Option<bool> {
        (**self).signed()
    }
}

impl<T: PredictedMut + ?Sized> PredictedMut for &mut T {
    fn base_mut(&mut self) -> &mut PredictionBase {
        (**self).base_mut()
    }
}

impl<T: AutoReviewable + ?Sized> AutoReviewable for &mut T {
    fn state(&self) -> &ReviewState {
        (**self).state()
    }
    fn state_mut(&mut self) -> &mut ReviewState {
        (**self).state_mut()
    }
}

// ── Variant impls ──

impl Predicted for Classification {
    fn base(&self) -> &PredictionBase {
        &self.base
    }
}

impl PredictedMut for Classification {
    fn base_mut(&mut self) -> &mut PredictionBase {
        &mut self.base
    }
}

impl Predicted for Extraction {
    fn base(&self) -> &PredictionBase {
        &self.base
    }
    fn pages(&self) -> Vec<i64> {
        self.spans.iter().filter_map(|s| s.page).collect()
    }
    fn review_state(&self) -> Option<&ReviewState> {
        Some(&self.state)
    }
}

impl PredictedMut for Extraction {
    fn base_mut(&mut self) -> &mut PredictionBase {
        &mut self.base
    }
}

impl AutoReviewable for Extraction {
    fn state(&self) -> &ReviewState {
        &self.state
    }
    fn state_mut(&mut self) -> &mut ReviewState {
        &mut self.state
    }
}

impl Predicted for FormExtraction {
    fn base(&self) -> &PredictionBase {
        &self.base
    }
    fn pages(&self) -> Vec<i64> {
        self.bbox.page.into_iter().collect()
    }
    fn review_state(&self) -> Option<&ReviewState> {
        Some(&self.state)
    }
    fn checked(&self) -> Option<bool> {
        self.checked
    }
    fn signed(&self) -> Option<bool> {
        self.signed
    }
}

impl PredictedMut for FormExtraction {
    fn base_mut(&mut self) -> &mut PredictionBase {
        &mut self.base
    }
}

impl AutoReviewable for FormExtraction {
    fn state(&self) -> &ReviewState {
        &self.state
    }
    fn state_mut(&mut self) -> &mut ReviewState {
        &mut self.state
    }
}

impl Predicted for Summarization {
    fn base(&self) -> &PredictionBase {
        &self.base
    }
    fn pages(&self) -> Vec<i64> {
        self.citations.iter().filter_map(|s| s.page).collect()
    }
    fn review_state(&self) -> Option<&ReviewState> {
        Some(&self.state)
    }
}

impl PredictedMut for Summarization {
    fn base_mut(&mut self) -> &mut PredictionBase {
        &mut self.base
    }
}

impl AutoReviewable for Summarization {
    fn state(&self) -> &ReviewState {
        &self.state
    }
    fn state_mut(&mut self) -> &mut ReviewState {
        &mut self.state
    }
}

impl Predicted for Unbundling {
    fn base(&self) -> &PredictionBase {
        &self.base
    }
    fn pages(&self) -> Vec<i64> {
        self.pages.clone()
    }
}

impl PredictedMut for Unbundling {
    fn base_mut(&mut self) -> &mut PredictionBase {
        &mut self.base
    }
}

// ── The closed enum ──

impl Prediction {
    fn inner(&self) -> &dyn Predicted {
        match self {
            Self::Classification(p) => p,
            Self::Extraction(p) => p,
            Self::FormExtraction(p) => p,
            Self::Summarization(p) => p,
            Self::Unbundling(p) => p,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn PredictedMut {
        match self {
            Self::Classification(p) => p,
            Self::Extraction(p) => p,
            Self::FormExtraction(p) => p,
            Self::Summarization(p) => p,
            Self::Unbundling(p) => p,
        }
    }

    /// The task type this variant belongs to.
    pub fn task_type(&self) -> TaskType {
        match self {
            Self::Classification(_) => TaskType::Classification,
            Self::Extraction(_) => TaskType::Extraction,
            Self::FormExtraction(_) => TaskType::FormExtraction,
            Self::Summarization(_) => TaskType::Summarization,
            Self::Unbundling(_) => TaskType::Unbundling,
        }
    }

    /// The accept/reject capability, for variants that have it.
    pub fn as_reviewable_mut(&mut self) -> Option<&mut dyn AutoReviewable> {
        match self {
            Self::Extraction(p) => Some(p),
            Self::FormExtraction(p) => Some(p),
            Self::Summarization(p) => Some(p),
            Self::Classification(_) | Self::Unbundling(_) => None,
        }
    }
}

impl Predicted for Prediction {
    fn base(&self) -> &PredictionBase {
        self.inner().base()
    }
    fn pages(&self) -> Vec<i64> {
        self.inner().pages()
    }
    fn review_state(&self) -> Option<&ReviewState> {
        self.inner().review_state()
    }
    fn checked(&self) -> Option<bool> {
        self.inner().checked()
    }
    fn signed(&self) -> Option<bool> {
        self.inner().signed()
    }
}

impl PredictedMut for Prediction {
    fn base_mut(&mut self) -> &mut PredictionBase {
        self.inner_mut().base_mut()
    }
}

macro_rules! variant {
    ($ty:ident) => {
        impl Variant for $ty {
            fn from_ref(prediction: &Prediction) -> Option<&Self> {
                match prediction {
                    Prediction::$ty(p) => Some(p),
                    _ => None,
                }
            }

            fn from_mut(prediction: &mut Prediction) -> Option<&mut Self> {
                match prediction {
                    Prediction::$ty(p) => Some(p),
                    _ => None,
                }
            }
        }

        impl From<$ty> for Prediction {
            fn from(p: $ty) -> Self {
                Prediction::$ty(p)
            }
        }
    };
}

variant!(Classification);
variant!(Extraction);
variant!(FormExtraction);
variant!(Summarization);
variant!(Unbundling);

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::{ReviewType, TaskType};

    pub(crate) fn document(id: i64) -> Arc<Document> {
        Arc::new(Document {
            id,
            filename: format!("doc-{id}.pdf"),
            etl_output: format!("etl://{id}"),
            models: Vec::new(),
        })
    }

    pub(crate) fn model(id: i64, name: &str, task_type: TaskType) -> Arc<ModelGroup> {
        Arc::new(ModelGroup {
            id,
            name: name.to_string(),
            task_type,
        })
    }

    pub(crate) fn base(label: &str, confidence: Option<f64>) -> PredictionBase {
        let mut confidences = BTreeMap::new();
        if let Some(c) = confidence {
            confidences.insert(label.to_string(), c);
        }
        PredictionBase {
            document: document(1),
            model: model(10, "Fields", TaskType::Extraction),
            review: None,
            label: label.to_string(),
            confidences,
            extras: Map::new(),
        }
    }

    pub(crate) fn extraction(label: &str, confidence: f64, page: i64) -> Extraction {
        Extraction {
            base: base(label, Some(confidence)),
            text: format!("{label} text"),
            spans: vec![Span::new(0, 10, page)],
            groupings: BTreeSet::new(),
            state: ReviewState::default(),
        }
    }

    #[test]
    fn accept_clears_rejected() {
        let mut e = extraction("Total", 0.9, 0);
        e.reject();
        e.accept();
        assert!(e.accepted());
        assert!(!e.rejected());
    }

    #[test]
    fn reject_clears_accepted() {
        let mut e = extraction("Total", 0.9, 0);
        e.accept();
        e.reject();
        assert!(!e.accepted());
        assert!(e.rejected());
    }

    #[test]
    fn unaccept_and_unreject_touch_only_their_flag() {
        let mut e = extraction("Total", 0.9, 0);
        e.reject();
        e.unaccept();
        assert!(e.rejected());

        e.accept();
        e.unreject();
        assert!(e.accepted());

        e.unaccept();
        assert!(!e.accepted());
        assert!(!e.rejected());
    }

    #[test]
    fn flags_never_both_set_after_any_transition() {
        let transitions: [fn(&mut ReviewState); 4] = [
            ReviewState::accept,
            ReviewState::reject,
            ReviewState::unaccept,
            ReviewState::unreject,
        ];
        for first in transitions {
            for second in transitions {
                let mut state = ReviewState::default();
                first(&mut state);
                second(&mut state);
                assert!(!(state.accepted() && state.rejected()));
            }
        }
    }

    #[test]
    fn wire_flags_both_set_resolve_to_rejected() {
        let state = ReviewState::from_flags(true, true);
        assert!(state.rejected());
        assert!(!state.accepted());
    }

    #[test]
    fn confidence_reads_current_label() {
        let e = extraction("Total", 0.75, 0);
        assert_eq!(e.confidence().unwrap(), 0.75);
    }

    #[test]
    fn confidence_missing_is_an_error() {
        let mut e = extraction("Total", 0.75, 0);
        e.base.label = "Subtotal".into();
        let err = e.confidence().unwrap_err();
        assert!(matches!(err, PredictionError::MissingConfidence { label } if label == "Subtotal"));
    }

    #[test]
    fn set_confidence_overwrites_current_label() {
        let mut p = Prediction::from(extraction("Total", 0.2, 0));
        p.set_confidence(0.99);
        assert_eq!(p.confidence().unwrap(), 0.99);
    }

    #[test]
    fn enum_dispatches_to_variant() {
        let p = Prediction::from(extraction("Total", 0.5, 3));
        assert_eq!(p.task_type(), TaskType::Extraction);
        assert_eq!(p.pages(), vec![3]);
        assert_eq!(p.label(), "Total");
        assert!(p.review_state().is_some());
        assert!(Extraction::from_ref(&p).is_some());
        assert!(Classification::from_ref(&p).is_none());
    }

    #[test]
    fn classification_is_not_reviewable() {
        let mut p = Prediction::from(Classification {
            base: base("Invoice", Some(0.9)),
        });
        assert!(p.as_reviewable_mut().is_none());
        assert!(p.review_state().is_none());
    }

    #[test]
    fn reviewable_through_dyn_handle() {
        let mut p = Prediction::from(extraction("Total", 0.5, 0));
        if let Some(r) = p.as_reviewable_mut() {
            r.accept();
        }
        assert_eq!(p.review_state().map(|s| s.accepted()), Some(true));
    }

    #[test]
    fn review_reference_resolves() {
        let mut e = extraction("Total", 0.5, 0);
        e.base.review = Some(Arc::new(Review {
            id: 4,
            reviewer_id: 2,
            notes: String::new(),
            rejected: false,
            review_type: ReviewType::Auto,
        }));
        assert_eq!(e.review().map(|r| r.review_type), Some(ReviewType::Auto));
    }
}
