/// Performance level the controller steers toward
pub const DEFAULT_TARGET_PERFORMANCE: f64 = 75.0;

const MIN_ADJUSTMENT: f64 = 0.1;
const MAX_ADJUSTMENT: f64 = 1.0;

/// Signed threshold-table step for `current - target`
/// - `> 15` → +0.10, `> 5` → +0.05
/// - `< -15` → -0.10, `< -5` → -0.05
/// - otherwise 0.0
pub fn difficulty_delta(current_performance: f64, target_performance: f64) -> f64 {
    let diff = current_performance - target_performance;
    if diff > 15.0 {
        0.1
    } else if diff > 5.0 {
        0.05
    } else if diff < -15.0 {
        -0.1
    } else if diff < -5.0 {
        -0.05
    } else {
        0.0
    }
}

/// Difficulty adjustment for the next question or session.
///
/// The table step is clamped to `[0.1, 1.0]`, which maps every step (including
/// "no change" and both decreases) to `0.1`. Callers that need the direction
/// should use [`difficulty_delta`].
pub fn adapt_difficulty(current_performance: f64, target_performance: f64) -> f64 {
    difficulty_delta(current_performance, target_performance).clamp(MIN_ADJUSTMENT, MAX_ADJUSTMENT)
}
