/// Time bonus for the lower-rated side of a pairing, in seconds.
///
/// Returns `(seconds_a, seconds_b)`. Only the lower-rated side gets a
/// non-zero value: `|a - b| / 100 * secs_per_100`. Equal ratings give `(0, 0)`.
pub fn handicap(rating_a: i32, rating_b: i32, secs_per_100: f64) -> (f64, f64) {
    let diff = rating_a - rating_b;
    let bonus = f64::from(diff.abs()) / 100.0 * secs_per_100;
    if diff > 0 {
        (0.0, bonus)
    } else if diff < 0 {
        (bonus, 0.0)
    } else {
        (0.0, 0.0)
    }
}

/// Elapsed solve time with the handicap taken off, never below zero.
pub fn adjusted_time(elapsed_secs: f64, handicap_secs: f64) -> f64 {
    (elapsed_secs - handicap_secs).max(0.0)
}
