//! Field access for wire objects.
//!
//! [`Fields`] owns a copy of one JSON object and removes every key it reads,
//! so whatever is left once a prediction is built becomes its `extras`.
//! The free functions at the bottom write the same shapes back out.

use std::collections::{BTreeMap, BTreeSet};

use predictree_core::{Grouping, ReviewState, Span};
use serde_json::{Map, Value, json};

use crate::FormatError;

pub(crate) struct Fields {
    map: Map<String, Value>,
    context: String,
}

impl Fields {
    pub fn new(value: &Value, context: impl Into<String>) -> Result<Self, FormatError> {
        let context = context.into();
        match value {
            Value::Object(map) => Ok(Self {
                map: map.clone(),
                context,
            }),
            other => Err(FormatError::malformed(
                &context,
                format!("expected an object, found {}", kind(other)),
            )),
        }
    }

    /// Whether the key is present at all, null included.
    pub fn has(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Remove a key. Null and absent both read as `None`.
    pub fn take(&mut self, key: &str) -> Option<Value> {
        self.map.remove(key).filter(|v| !v.is_null())
    }

    pub fn error(&self, key: &str, reason: impl Into<String>) -> FormatError {
        FormatError::malformed(&format!("{}.{key}", self.context), reason)
    }

    pub fn str(&mut self, key: &str) -> Result<String, FormatError> {
        self.opt_str(key)?
            .ok_or_else(|| self.error(key, "missing string"))
    }

    pub fn opt_str(&mut self, key: &str) -> Result<Option<String>, FormatError> {
        match self.take(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(self.error(key, format!("expected a string, found {}", kind(&other)))),
        }
    }

    pub fn i64(&mut self, key: &str) -> Result<i64, FormatError> {
        self.opt_i64(key)?
            .ok_or_else(|| self.error(key, "missing integer"))
    }

    pub fn opt_i64(&mut self, key: &str) -> Result<Option<i64>, FormatError> {
        match self.take(key) {
            None => Ok(None),
            Some(v) => v
                .as_i64()
                .map(Some)
                .ok_or_else(|| self.error(key, format!("expected an integer, found {}", kind(&v)))),
        }
    }

    pub fn opt_f64(&mut self, key: &str) -> Result<Option<f64>, FormatError> {
        match self.take(key) {
            None => Ok(None),
            Some(v) => v
                .as_f64()
                .map(Some)
                .ok_or_else(|| self.error(key, format!("expected a number, found {}", kind(&v)))),
        }
    }

    pub fn opt_bool(&mut self, key: &str) -> Result<Option<bool>, FormatError> {
        match self.take(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(b)),
            Some(other) => Err(self.error(key, format!("expected a boolean, found {}", kind(&other)))),
        }
    }

    pub fn array(&mut self, key: &str) -> Result<Vec<Value>, FormatError> {
        match self.take(key) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => Ok(items),
            Some(other) => Err(self.error(key, format!("expected an array, found {}", kind(&other)))),
        }
    }

    pub fn object(&mut self, key: &str) -> Result<Map<String, Value>, FormatError> {
        match self.take(key) {
            None => Ok(Map::new()),
            Some(Value::Object(map)) => Ok(map),
            Some(other) => Err(self.error(key, format!("expected an object, found {}", kind(&other)))),
        }
    }

    pub fn confidences(&mut self) -> Result<BTreeMap<String, f64>, FormatError> {
        let raw = self.object("confidence")?;
        raw.into_iter()
            .map(|(label, score)| match score.as_f64() {
                Some(s) => Ok((label, s)),
                None => Err(self.error("confidence", format!("score for {label:?} is not a number"))),
            })
            .collect()
    }

    pub fn review_state(&mut self) -> Result<ReviewState, FormatError> {
        let accepted = self.opt_bool("accepted")?.unwrap_or(false);
        let rejected = self.opt_bool("rejected")?.unwrap_or(false);
        Ok(ReviewState::from_flags(accepted, rejected))
    }

    pub fn spans(&mut self, key: &str) -> Result<Vec<Span>, FormatError> {
        let context = format!("{}.{key}", self.context);
        self.array(key)?
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let mut f = Fields::new(v, format!("{context}[{i}]"))?;
                f.inline_span()
            })
            .collect()
    }

    /// A span stored directly on this object as `start`/`end`/`page_num`.
    pub fn inline_span(&mut self) -> Result<Span, FormatError> {
        Ok(Span {
            start: self.opt_i64("start")?,
            end: self.opt_i64("end")?,
            page: self.opt_i64("page_num")?,
        })
    }

    pub fn groupings(&mut self) -> Result<BTreeSet<Grouping>, FormatError> {
        let context = format!("{}.groupings", self.context);
        self.array("groupings")?
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let mut f = Fields::new(v, format!("{context}[{i}]"))?;
                Ok(Grouping {
                    id: f.i64("group_id")?,
                    name: f.opt_str("group_name")?.unwrap_or_default(),
                    index: f.opt_i64("group_index")?.unwrap_or(0),
                })
            })
            .collect()
    }

    pub fn into_extras(self) -> Map<String, Value> {
        self.map
    }
}

pub(crate) fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── Writers ──

pub(crate) fn write_span(out: &mut Map<String, Value>, span: &Span) {
    out.insert("start".into(), json!(span.start));
    out.insert("end".into(), json!(span.end));
    out.insert("page_num".into(), json!(span.page));
}

pub(crate) fn span_value(span: &Span) -> Value {
    let mut out = Map::new();
    write_span(&mut out, span);
    Value::Object(out)
}

pub(crate) fn grouping_value(grouping: &Grouping) -> Value {
    json!({
        "group_id": grouping.id,
        "group_name": grouping.name,
        "group_index": grouping.index,
    })
}

/// At most one of the two flags is emitted, and neither when both are clear.
pub(crate) fn write_review_state(out: &mut Map<String, Value>, state: &ReviewState) {
    if state.accepted() {
        out.insert("accepted".into(), Value::Bool(true));
    } else if state.rejected() {
        out.insert("rejected".into(), Value::Bool(true));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_keys_do_not_reach_extras() {
        let mut f = Fields::new(&json!({"label": "Total", "foo": 1}), "p").unwrap();
        assert_eq!(f.str("label").unwrap(), "Total");
        assert_eq!(f.into_extras(), json!({"foo": 1}).as_object().cloned().unwrap());
    }

    #[test]
    fn null_reads_as_absent_but_is_still_present() {
        let mut f = Fields::new(&json!({"text": null}), "p").unwrap();
        assert!(f.has("text"));
        assert_eq!(f.opt_str("text").unwrap(), None);
        assert!(!f.has("text"));
    }

    #[test]
    fn type_errors_carry_the_path() {
        let mut f = Fields::new(&json!({"start": "x"}), "doc.predictions[2]").unwrap();
        let err = f.opt_i64("start").unwrap_err();
        assert!(err.to_string().contains("doc.predictions[2].start"));
    }

    #[test]
    fn non_object_is_malformed() {
        assert!(matches!(
            Fields::new(&json!([1, 2]), "root"),
            Err(FormatError::Malformed { .. })
        ));
    }

    #[test]
    fn flags_read_with_defaults() {
        let mut f = Fields::new(&json!({"rejected": true}), "p").unwrap();
        let state = f.review_state().unwrap();
        assert!(state.rejected());
        assert!(!state.accepted());
    }

    #[test]
    fn review_state_writer_emits_one_key() {
        let mut state = ReviewState::default();
        let mut out = Map::new();
        write_review_state(&mut out, &state);
        assert!(out.is_empty());

        state.accept();
        write_review_state(&mut out, &state);
        assert_eq!(Value::Object(out), json!({"accepted": true}));
    }

    #[test]
    fn span_list_reads_nulls() {
        let mut f = Fields::new(
            &json!({"spans": [{"start": 1, "end": 4, "page_num": 0}, {"start": null}]}),
            "p",
        )
        .unwrap();
        let spans = f.spans("spans").unwrap();
        assert_eq!(spans, vec![Span::new(1, 4, 0), Span::NULL]);
    }
}
