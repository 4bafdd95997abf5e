//! Vertical card display for a parsed result file.
//!
//! Renders a submission as grouped, human-readable sections: documents,
//! models, reviews and final prediction counts per model and label.

use std::fmt::{self, Write};

use predictree_core::{Predicted, SubmissionResult};

const MAX_LIST_ITEMS: usize = 10;

// ── Public API ──

/// Print a result as a vertical card.
pub fn print_result_card(result: &SubmissionResult) -> anyhow::Result<()> {
    let mut out = String::new();
    write_card(&mut out, result)?;
    print!("{out}");
    Ok(())
}

pub fn write_card(out: &mut impl Write, result: &SubmissionResult) -> fmt::Result {
    writeln!(
        out,
        "=== Submission {} (format {}) ===",
        result.submission_id,
        result.version.as_wire()
    )?;
    if result.rejected() {
        writeln!(out, "rejected in review")?;
    }
    writeln!(out)?;

    section(out, "Documents", result.documents.iter(), |out, d| {
        writeln!(out, "  {:<26} {}", d.id, d.filename)
    })?;
    section(out, "Models", result.models.iter(), |out, m| {
        writeln!(out, "  {:<26} {} ({})", m.id, m.name, m.task_type.as_str())
    })?;
    section(out, "Reviews", result.reviews.iter(), |out, r| {
        let verdict = if r.rejected { "rejected" } else { "kept" };
        writeln!(
            out,
            "  {:<26} {} by {}, {verdict}",
            r.id,
            r.review_type.as_str(),
            r.reviewer_id
        )
    })?;
    if !result.errored_files.is_empty() {
        writeln!(out, "Errored files")?;
        for (id, error) in &result.errored_files {
            writeln!(out, "  {:<26} {error}", id)?;
        }
        writeln!(out)?;
    }

    write_final_counts(out, result)
}

// ── Section rendering ──

fn section<'a, T: 'a>(
    out: &mut impl Write,
    header: &str,
    items: impl ExactSizeIterator<Item = &'a T>,
    mut row: impl FnMut(&mut dyn Write, &T) -> fmt::Result,
) -> fmt::Result {
    let total = items.len();
    if total == 0 {
        return Ok(());
    }
    writeln!(out, "{header}")?;
    for item in items.take(MAX_LIST_ITEMS) {
        row(&mut *out, item)?;
    }
    if total > MAX_LIST_ITEMS {
        writeln!(out, "  ... and {} more", total - MAX_LIST_ITEMS)?;
    }
    writeln!(out)
}

fn write_final_counts(out: &mut impl Write, result: &SubmissionResult) -> fmt::Result {
    let source = match result.final_review() {
        Some(review) => format!("review {}", review.id),
        None => "pre-review".to_string(),
    };
    writeln!(out, "Final predictions ({source})")?;

    let by_model = result
        .final_predictions()
        .groupby(|p| p.model().name.clone());
    if by_model.is_empty() {
        writeln!(out, "  (none)")?;
    }
    for (model, predictions) in by_model {
        writeln!(out, "  {:<26} {}", model, predictions.len())?;
        for (label, group) in predictions.groupby(|p| p.label().to_string()) {
            writeln!(out, "    {:<24} {}", label, group.len())?;
        }
    }
    Ok(())
}
