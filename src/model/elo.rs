//! Basketball and American football: Elo on per-game point differential.
//!
//! Both sports share one shape with different constants:
//!   rating = 1500 + regressed point diff per game × elo_scale + form nudge
//!   Δ      = home rating + home bonus ± H2H nudge − away rating
//!   P(home) = 1 / (1 + 10^(−Δ/400))
//!
//! NFL games can end tied (roughly 0.3% of games), so football reserves that
//! mass as a fixed draw probability and scales home/away to fit around it.

use tracing::debug;

use crate::db::models::RawProbabilities;

use super::smoothing::{form_strength, regress, SEASON_K};
use super::{HeadToHead, ModelInput, TeamStats};

pub const BASE_RATING: f64 = 1500.0;

pub const METHOD_BASKETBALL: &str = "elo-basketball";
pub const METHOD_FOOTBALL: &str = "elo-football";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EloParams {
    /// Rating points added to the home side
    pub home_advantage: f64,
    /// Rating points per point of per-game differential
    pub elo_scale: f64,
    /// Share of `form_rating_range` a perfect/awful form can move the rating
    pub form_weight: f64,
    pub form_rating_range: f64,
    /// Rating nudge for a dominant head-to-head record
    pub h2h_nudge: f64,
    /// Fixed tie probability (0 for sports without ties)
    pub draw_probability: f64,
    /// Label written to `RawProbabilities::method`
    pub method: &'static str,
}

impl EloParams {
    pub fn basketball() -> Self {
        EloParams {
            home_advantage: 70.0,
            elo_scale: 25.0,
            form_weight: 0.35,
            form_rating_range: 100.0,
            h2h_nudge: 25.0,
            draw_probability: 0.0,
            method: METHOD_BASKETBALL,
        }
    }

    pub fn football() -> Self {
        EloParams {
            home_advantage: 48.0,
            elo_scale: 25.0,
            form_weight: 0.35,
            form_rating_range: 100.0,
            h2h_nudge: 25.0,
            draw_probability: 0.003,
            method: METHOD_FOOTBALL,
        }
    }
}

/// Standard logistic Elo expectation for a rating difference.
pub fn elo_win_probability(rating_diff: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf(-rating_diff / 400.0))
}

/// Bounded rating adjustment from recent form: ±`form_weight × range`.
pub fn form_nudge(form: &str, form_weight: f64, range: f64) -> f64 {
    (form_strength(form) - 0.5) * 2.0 * form_weight * range
}

fn team_rating(stats: &TeamStats, form: &str, params: &EloParams) -> f64 {
    let diff = regress(stats.differential_per_game(), 0.0, stats.played as f64, SEASON_K);
    BASE_RATING + diff * params.elo_scale + form_nudge(form, params.form_weight, params.form_rating_range)
}

/// ±`nudge` when the home side won ≥60% / ≤40% of at least three meetings.
pub fn h2h_nudge(h2h: Option<&HeadToHead>, nudge: f64) -> f64 {
    match h2h.and_then(|h| h.home_win_rate()) {
        Some(rate) if rate >= HeadToHead::DOMINANCE => nudge,
        Some(rate) if rate <= 1.0 - HeadToHead::DOMINANCE => -nudge,
        _ => 0.0,
    }
}

pub fn predict(input: &ModelInput, params: &EloParams) -> RawProbabilities {
    let home_rating = team_rating(&input.home_stats, &input.home_form, params);
    let away_rating = team_rating(&input.away_stats, &input.away_form, params);
    let delta = home_rating + params.home_advantage + h2h_nudge(input.usable_h2h(), params.h2h_nudge)
        - away_rating;

    let p_home = elo_win_probability(delta);
    let draw = params.draw_probability.clamp(0.0, 1.0);
    let decisive = 1.0 - draw;

    debug!(
        "{}: ratings {:.0} vs {:.0} (Δ {:.0}) → P(home) {:.3}",
        params.method, home_rating, away_rating, delta, p_home
    );

    RawProbabilities {
        home: p_home * decisive,
        away: (1.0 - p_home) * decisive,
        draw: (draw > 0.0).then_some(draw),
        method: params.method.to_string(),
    }
}
