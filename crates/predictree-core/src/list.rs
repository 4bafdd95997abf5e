//! Queryable prediction collections.
//!
//! [`PredictionList<P>`] is an ordered container over any prediction type:
//! owned [`Prediction`]s, shared references, or mutable references to one
//! concrete variant. Every filtering or narrowing operation hands back a
//! `PredictionList` again, so calls chain:
//!
//! ```ignore
//! result
//!     .final_predictions_mut()
//!     .extractions()
//!     .filter(&Query::new().label("Total").max_confidence(0.5))
//!     .reject();
//! ```

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut, Range};

use crate::PredictionError;
use crate::prediction::{
    AutoReviewable, Classification, Extraction, FormExtraction, Predicted, Prediction,
    Summarization, Unbundling, Variant,
};
use crate::query::Query;

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionList<P> {
    items: Vec<P>,
}

impl<P> Default for PredictionList<P> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<P> PredictionList<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, prediction: P) {
        self.items.push(prediction);
    }

    pub fn into_vec(self) -> Vec<P> {
        self.items
    }

    /// Borrow every element.
    pub fn view(&self) -> PredictionList<&P> {
        self.items.iter().collect()
    }

    /// Mutably borrow every element.
    pub fn view_mut(&mut self) -> PredictionList<&mut P> {
        self.items.iter_mut().collect()
    }

    /// Call `f` on every element and hand the list back.
    pub fn apply(mut self, mut f: impl FnMut(&mut P)) -> Self {
        for p in &mut self.items {
            f(p);
        }
        self
    }

    /// Group by one derived key per element. Every element lands in exactly
    /// one group. Set-valued keys work as long as the set is ordered (for
    /// example the `BTreeSet<Grouping>` of an extraction).
    pub fn groupby<K: Ord>(self, mut key: impl FnMut(&P) -> K) -> BTreeMap<K, Self> {
        let mut groups: BTreeMap<K, Self> = BTreeMap::new();
        for p in self.items {
            groups.entry(key(&p)).or_default().items.push(p);
        }
        groups
    }

    /// Group by zero or more keys per element. An element joins every group
    /// it yields a key for, and disappears if it yields none.
    pub fn groupbyiter<K, I>(self, mut keys: impl FnMut(&P) -> I) -> BTreeMap<K, Self>
    where
        K: Ord,
        I: IntoIterator<Item = K>,
        P: Clone,
    {
        let mut groups: BTreeMap<K, Self> = BTreeMap::new();
        for p in self.items {
            for k in keys(&p) {
                groups.entry(k).or_default().items.push(p.clone());
            }
        }
        groups
    }

    /// Stable sort into a new list; `self` is left as it was. Equal keys keep
    /// their original relative order in both directions.
    pub fn orderby<K: PartialOrd>(&self, mut key: impl FnMut(&P) -> K, reverse: bool) -> Self
    where
        P: Clone,
    {
        let mut keyed: Vec<(K, P)> = self.items.iter().map(|p| (key(p), p.clone())).collect();
        keyed.sort_by(|a, b| {
            let ord = a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal);
            if reverse { ord.reverse() } else { ord }
        });
        keyed.into_iter().map(|(_, p)| p).collect()
    }

    /// Elements in `range`, clamped to the list. An out-of-bounds or
    /// inverted range gives a shorter or empty list.
    pub fn slice(&self, range: Range<usize>) -> Self
    where
        P: Clone,
    {
        let len = self.items.len();
        let start = range.start.min(len);
        let end = range.end.min(len).max(start);
        self.items[start..end].to_vec().into()
    }

    /// The only element of the list.
    pub fn single(self) -> Result<P, PredictionError> {
        let count = self.items.len();
        let mut items = self.items.into_iter();
        match (items.next(), items.next()) {
            (Some(only), None) => Ok(only),
            _ => Err(PredictionError::MultipleValues { count }),
        }
    }
}

impl<P: Predicted> PredictionList<P> {
    /// Keep the elements matching every filter set on `query`.
    pub fn filter(self, query: &Query<'_, P>) -> Self {
        self.items
            .into_iter()
            .filter(|p| query.matches(p))
            .collect()
    }
}

impl<P: AutoReviewable> PredictionList<P> {
    pub fn accept(self) -> Self {
        self.apply(|p| p.accept())
    }

    pub fn reject(self) -> Self {
        self.apply(|p| p.reject())
    }

    pub fn unaccept(self) -> Self {
        self.apply(|p| p.unaccept())
    }

    pub fn unreject(self) -> Self {
        self.apply(|p| p.unreject())
    }
}

// ── Variant narrowing ──

impl PredictionList<Prediction> {
    pub fn of<V: Variant>(&self) -> PredictionList<&V> {
        self.items.iter().filter_map(V::from_ref).collect()
    }

    pub fn of_mut<V: Variant>(&mut self) -> PredictionList<&mut V> {
        self.items.iter_mut().filter_map(V::from_mut).collect()
    }

    pub fn classifications(&self) -> PredictionList<&Classification> {
        self.of()
    }

    pub fn extractions(&self) -> PredictionList<&Extraction> {
        self.of()
    }

    pub fn form_extractions(&self) -> PredictionList<&FormExtraction> {
        self.of()
    }

    pub fn summarizations(&self) -> PredictionList<&Summarization> {
        self.of()
    }

    pub fn unbundlings(&self) -> PredictionList<&Unbundling> {
        self.of()
    }

    pub fn extractions_mut(&mut self) -> PredictionList<&mut Extraction> {
        self.of_mut()
    }

    pub fn form_extractions_mut(&mut self) -> PredictionList<&mut FormExtraction> {
        self.of_mut()
    }

    pub fn summarizations_mut(&mut self) -> PredictionList<&mut Summarization> {
        self.of_mut()
    }
}

impl<'a> PredictionList<&'a Prediction> {
    pub fn of<V: Variant>(self) -> PredictionList<&'a V> {
        self.items.into_iter().filter_map(V::from_ref).collect()
    }

    pub fn classifications(self) -> PredictionList<&'a Classification> {
        self.of()
    }

    pub fn extractions(self) -> PredictionList<&'a Extraction> {
        self.of()
    }

    pub fn form_extractions(self) -> PredictionList<&'a FormExtraction> {
        self.of()
    }

    pub fn summarizations(self) -> PredictionList<&'a Summarization> {
        self.of()
    }

    pub fn unbundlings(self) -> PredictionList<&'a Unbundling> {
        self.of()
    }
}

impl<'a> PredictionList<&'a mut Prediction> {
    pub fn of<V: Variant>(self) -> PredictionList<&'a mut V> {
        self.items.into_iter().filter_map(V::from_mut).collect()
    }

    pub fn classifications(self) -> PredictionList<&'a mut Classification> {
        self.of()
    }

    pub fn extractions(self) -> PredictionList<&'a mut Extraction> {
        self.of()
    }

    pub fn form_extractions(self) -> PredictionList<&'a mut FormExtraction> {
        self.of()
    }

    pub fn summarizations(self) -> PredictionList<&'a mut Summarization> {
        self.of()
    }

    pub fn unbundlings(self) -> PredictionList<&'a mut Unbundling> {
        self.of()
    }
}

// ── std plumbing ──

impl<P> Deref for PredictionList<P> {
    type Target = [P];

    fn deref(&self) -> &[P] {
        &self.items
    }
}

impl<P> DerefMut for PredictionList<P> {
    fn deref_mut(&mut self) -> &mut [P] {
        &mut self.items
    }
}

impl<P> From<Vec<P>> for PredictionList<P> {
    fn from(items: Vec<P>) -> Self {
        Self { items }
    }
}

impl<P> FromIterator<P> for PredictionList<P> {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl<P> Extend<P> for PredictionList<P> {
    fn extend<I: IntoIterator<Item = P>>(&mut self, iter: I) {
        self.items.extend(iter);
    }
}

impl<P> IntoIterator for PredictionList<P> {
    type Item = P;
    type IntoIter = std::vec::IntoIter<P>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, P> IntoIterator for &'a PredictionList<P> {
    type Item = &'a P;
    type IntoIter = std::slice::Iter<'a, P>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<'a, P> IntoIterator for &'a mut PredictionList<P> {
    type Item = &'a mut P;
    type IntoIter = std::slice::IterMut<'a, P>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter_mut()
    }
}
