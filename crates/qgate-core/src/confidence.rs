use crate::error::Result;
use crate::pattern::PatternStore;
use crate::score::round_to;

pub const DEFAULT_CONFIDENCE: f64 = 0.5;
pub const MIN_CONFIDENCE: f64 = 0.1;
pub const MAX_CONFIDENCE: f64 = 0.95;
pub const SUCCESS_STEP: f64 = 0.10;
pub const FAILURE_STEP: f64 = 0.05;

/// Apply one outcome to a confidence score: +0.10 on success, -0.05 on
/// failure, clamped to [0.1, 0.95] and rounded to two decimals.
pub fn adjust_confidence(current: f64, success: bool) -> f64 {
    let next = if success {
        current + SUCCESS_STEP
    } else {
        current - FAILURE_STEP
    };
    round_to(next.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE), 2)
}

/// Record a real-world outcome for pattern `id`: bump its usage statistics,
/// then move its confidence score. Returns the new score.
pub fn update_pattern_outcome(store: &mut PatternStore, id: &str, success: bool) -> Result<f64> {
    let mut pattern = store.update_pattern_stats(id, success)?.clone();
    let current = pattern.confidence_score.unwrap_or(DEFAULT_CONFIDENCE);
    let next = adjust_confidence(current, success);
    pattern.confidence_score = Some(next);
    store.put_pattern(pattern);
    tracing::debug!(pattern = id, success, from = current, to = next, "confidence updated");
    Ok(next)
}
