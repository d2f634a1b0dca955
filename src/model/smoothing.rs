//! Regression to the mean.
//!
//! Small samples are noisy: a team that has won its only two matches is not a
//! 100% team. Every model shrinks observed statistics toward a population
//! mean with weight `n / (n + k)`, so the observation only dominates once the
//! sample is large relative to `k`.

/// Shrinkage constant for recent-form strings (short, streak-prone).
pub const FORM_K: f64 = 3.0;
/// Shrinkage constant for season attack/defense ratios.
pub const SEASON_K: f64 = 10.0;

/// Neutral form strength (a .500 team).
pub const NEUTRAL_FORM: f64 = 0.5;

/// Shrink `observed` toward `mean`. `sample_size = 0` returns `mean` unchanged.
pub fn regress(observed: f64, mean: f64, sample_size: f64, k: f64) -> f64 {
    let n = sample_size.max(0.0);
    let denom = n + k;
    if denom <= 0.0 {
        return mean;
    }
    let weight = n / denom;
    mean + weight * (observed - mean)
}

/// Recency-weighted form strength in `[0, 1]`, regressed toward 0.5.
///
/// `form` is most-recent-first over `W`/`D`/`L` (case-insensitive). Other
/// characters are skipped. The most recent result weighs 1.0, each older one
/// 0.1 less, floored at 0.5.
pub fn form_strength(form: &str) -> f64 {
    let mut weighted = 0.0;
    let mut total_weight = 0.0;
    let mut games = 0usize;

    for c in form.chars() {
        let points = match c.to_ascii_uppercase() {
            'W' => 1.0,
            'D' => 0.5,
            'L' => 0.0,
            _ => continue,
        };
        let weight = (1.0 - 0.1 * games as f64).max(0.5);
        weighted += points * weight;
        total_weight += weight;
        games += 1;
    }

    if games == 0 {
        return NEUTRAL_FORM;
    }

    regress(weighted / total_weight, NEUTRAL_FORM, games as f64, FORM_K)
}
