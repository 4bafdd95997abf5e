//! Named filters for [`PredictionList::filter`](crate::PredictionList::filter).
//!
//! A [`Query`] is a set of optional filters that are ANDed together. Filtering
//! with one query holding several filters gives the same list as filtering
//! once per filter, and the same list as one raw [`Query::predicate`] that
//! checks everything itself.
//!
//! Predictions that lack the capability a filter asks about (a classification
//! asked for `accepted`, a prediction without a confidence for its label asked
//! for a confidence bound) never match that filter.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::model::{DocumentId, ModelGroup, ModelGroupId, Review, ReviewId, ReviewType, TaskType};
use crate::prediction::Predicted;

/// Matches a model group by identity, task type, or display name.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelRef {
    Id(ModelGroupId),
    TaskType(TaskType),
    Name(String),
}

impl ModelRef {
    pub fn matches(&self, model: &ModelGroup) -> bool {
        match self {
            Self::Id(id) => model.id == *id,
            Self::TaskType(task_type) => model.task_type == *task_type,
            Self::Name(name) => model.name == *name,
        }
    }
}

impl From<TaskType> for ModelRef {
    fn from(task_type: TaskType) -> Self {
        Self::TaskType(task_type)
    }
}

impl From<&str> for ModelRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for ModelRef {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<&ModelGroup> for ModelRef {
    fn from(model: &ModelGroup) -> Self {
        Self::Id(model.id)
    }
}

impl From<&Arc<ModelGroup>> for ModelRef {
    fn from(model: &Arc<ModelGroup>) -> Self {
        Self::Id(model.id)
    }
}

/// Matches the review a prediction came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewRef {
    /// Only pre-review predictions (review is null).
    PreReview,
    Id(ReviewId),
    Type(ReviewType),
}

impl ReviewRef {
    pub fn matches(&self, review: Option<&Review>) -> bool {
        match (self, review) {
            (Self::PreReview, None) => true,
            (Self::Id(id), Some(r)) => r.id == *id,
            (Self::Type(t), Some(r)) => r.review_type == *t,
            _ => false,
        }
    }
}

impl From<ReviewType> for ReviewRef {
    fn from(review_type: ReviewType) -> Self {
        Self::Type(review_type)
    }
}

impl From<&Review> for ReviewRef {
    fn from(review: &Review) -> Self {
        Self::Id(review.id)
    }
}

impl From<&Arc<Review>> for ReviewRef {
    fn from(review: &Arc<Review>) -> Self {
        Self::Id(review.id)
    }
}

impl From<Option<&Review>> for ReviewRef {
    fn from(review: Option<&Review>) -> Self {
        review.map_or(Self::PreReview, Self::from)
    }
}

type Predicate<'a, P> = Box<dyn Fn(&P) -> bool + 'a>;

/// A conjunction of optional prediction filters.
pub struct Query<'a, P> {
    document: Option<DocumentId>,
    documents: Option<BTreeSet<DocumentId>>,
    model: Option<ModelRef>,
    models: Option<Vec<ModelRef>>,
    review: Option<ReviewRef>,
    reviews: Option<Vec<ReviewRef>>,
    label: Option<String>,
    labels: Option<BTreeSet<String>>,
    page: Option<i64>,
    pages: Option<BTreeSet<i64>>,
    min_confidence: Option<f64>,
    max_confidence: Option<f64>,
    accepted: Option<bool>,
    rejected: Option<bool>,
    checked: Option<bool>,
    signed: Option<bool>,
    predicates: Vec<Predicate<'a, P>>,
}

impl<P> Default for Query<'_, P> {
    fn default() -> Self {
        Self {
            document: None,
            documents: None,
            model: None,
            models: None,
            review: None,
            reviews: None,
            label: None,
            labels: None,
            page: None,
            pages: None,
            min_confidence: None,
            max_confidence: None,
            accepted: None,
            rejected: None,
            checked: None,
            signed: None,
            predicates: Vec::new(),
        }
    }
}

impl<'a, P> Query<'a, P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document(mut self, id: DocumentId) -> Self {
        self.document = Some(id);
        self
    }

    pub fn document_in(mut self, ids: impl IntoIterator<Item = DocumentId>) -> Self {
        self.documents = Some(ids.into_iter().collect());
        self
    }

    pub fn model(mut self, model: impl Into<ModelRef>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn model_in<M: Into<ModelRef>>(mut self, models: impl IntoIterator<Item = M>) -> Self {
        self.models = Some(models.into_iter().map(Into::into).collect());
        self
    }

    pub fn review(mut self, review: impl Into<ReviewRef>) -> Self {
        self.review = Some(review.into());
        self
    }

    pub fn review_in<R: Into<ReviewRef>>(mut self, reviews: impl IntoIterator<Item = R>) -> Self {
        self.reviews = Some(reviews.into_iter().map(Into::into).collect());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn label_in<S: Into<String>>(mut self, labels: impl IntoIterator<Item = S>) -> Self {
        self.labels = Some(labels.into_iter().map(Into::into).collect());
        self
    }

    pub fn page(mut self, page: i64) -> Self {
        self.page = Some(page);
        self
    }

    pub fn page_in(mut self, pages: impl IntoIterator<Item = i64>) -> Self {
        self.pages = Some(pages.into_iter().collect());
        self
    }

    /// Inclusive lower bound on the current label's confidence.
    pub fn min_confidence(mut self, min: f64) -> Self {
        self.min_confidence = Some(min);
        self
    }

    /// Inclusive upper bound on the current label's confidence.
    pub fn max_confidence(mut self, max: f64) -> Self {
        self.max_confidence = Some(max);
        self
    }

    pub fn accepted(mut self, accepted: bool) -> Self {
        self.accepted = Some(accepted);
        self
    }

    pub fn rejected(mut self, rejected: bool) -> Self {
        self.rejected = Some(rejected);
        self
    }

    pub fn checked(mut self, checked: bool) -> Self {
        self.checked = Some(checked);
        self
    }

    pub fn signed(mut self, signed: bool) -> Self {
        self.signed = Some(signed);
        self
    }

    /// Raw predicate, ANDed with everything else.
    pub fn predicate(mut self, f: impl Fn(&P) -> bool + 'a) -> Self {
        self.predicates.push(Box::new(f));
        self
    }
}

impl<P: Predicted> Query<'_, P> {
    pub fn matches(&self, prediction: &P) -> bool {
        let document = prediction.document();
        if let Some(id) = self.document
            && document.id != id
        {
            return false;
        }
        if let Some(ids) = &self.documents
            && !ids.contains(&document.id)
        {
            return false;
        }

        let model = prediction.model();
        if let Some(m) = &self.model
            && !m.matches(model)
        {
            return false;
        }
        if let Some(ms) = &self.models
            && !ms.iter().any(|m| m.matches(model))
        {
            return false;
        }

        let review = prediction.review();
        if let Some(r) = &self.review
            && !r.matches(review)
        {
            return false;
        }
        if let Some(rs) = &self.reviews
            && !rs.iter().any(|r| r.matches(review))
        {
            return false;
        }

        if let Some(label) = &self.label
            && prediction.label() != label
        {
            return false;
        }
        if let Some(labels) = &self.labels
            && !labels.contains(prediction.label())
        {
            return false;
        }

        if self.page.is_some() || self.pages.is_some() {
            let pages = prediction.pages();
            if let Some(page) = self.page
                && !pages.contains(&page)
            {
                return false;
            }
            if let Some(wanted) = &self.pages
                && !pages.iter().any(|p| wanted.contains(p))
            {
                return false;
            }
        }

        if self.min_confidence.is_some() || self.max_confidence.is_some() {
            let Ok(confidence) = prediction.confidence() else {
                return false;
            };
            if self.min_confidence.is_some_and(|min| confidence < min)
                || self.max_confidence.is_some_and(|max| confidence > max)
            {
                return false;
            }
        }

        let state = prediction.review_state();
        if let Some(wanted) = self.accepted
            && state.map(|s| s.accepted()) != Some(wanted)
        {
            return false;
        }
        if let Some(wanted) = self.rejected
            && state.map(|s| s.rejected()) != Some(wanted)
        {
            return false;
        }
        if let Some(wanted) = self.checked
            && prediction.checked() != Some(wanted)
        {
            return false;
        }
        if let Some(wanted) = self.signed
            && prediction.signed() != Some(wanted)
        {
            return false;
        }

        self.predicates.iter().all(|f| f(prediction))
    }
}
