//! Text clean-up shared by the connectors.

use tracing::debug;

/// Rendering width handed to `html2text`; lines are re-joined afterwards.
const RENDER_WIDTH: usize = 1_000;

/// Renders an HTML fragment to undecorated text, decoding entities and
/// collapsing runs of whitespace.
pub(crate) fn plain_text(raw: &str) -> String {
    match html2text::config::plain_no_decorate().string_from_read(raw.as_bytes(), RENDER_WIDTH) {
        Ok(text) => collapse_whitespace(&text),
        Err(err) => {
            debug!(error = %err, "html2text failed; keeping raw text");
            collapse_whitespace(raw)
        }
    }
}

pub(crate) fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Score in `(0, 1]` derived from a zero-based rank among `total` results.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn rank_score(rank: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    1.0 - (rank.min(total - 1) as f64 / total as f64)
}

/// Leading four-digit year of a date string such as `2021-06-01`.
pub(crate) fn year_of(date: &str) -> Option<i32> {
    let digits = date.get(..4)?;
    if digits.bytes().all(|b| b.is_ascii_digit()) {
        digits.parse().ok()
    } else {
        None
    }
}
