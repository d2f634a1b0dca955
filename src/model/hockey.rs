//! Ice hockey.
//!
//! The first hockey model reused the soccer Poisson machinery and measured
//! about 19.4% accuracy on real NHL games, worse than guessing. Parity and
//! goaltender variance break the independent-goals assumption.
//!
//! v2 is deliberately timid: goal differential per game on an Elo scale,
//! heavy regression (weight ≤ 0.7, reached at 40 games), a 20% form weight,
//! +15 rating points of home ice (≈52% at parity), and a final clamp of the
//! home probability to `[0.35, 0.65]`. No draws; overtime always decides.
//!
//! v1 stays callable so ledger entries stamped `hockey_v1_poisson` can be
//! reproduced; it is not used by default dispatch.

use tracing::debug;

use crate::db::models::RawProbabilities;

use super::elo::{elo_win_probability, form_nudge, BASE_RATING};
use super::soccer::outcome_probabilities;
use super::strength::team_strength;
use super::{ModelInput, TeamStats};

pub const METHOD_V1_POISSON: &str = "hockey_v1_poisson";
pub const METHOD_V2_ELO: &str = "hockey_v2_elo_conservative";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HockeyParams {
    pub home_ice: f64,
    /// Rating points per goal of per-game differential
    pub elo_scale: f64,
    pub form_weight: f64,
    pub form_rating_range: f64,
    /// Ceiling on how much of the observed differential is trusted
    pub max_regression_weight: f64,
    /// Games needed to reach `max_regression_weight`
    pub full_weight_games: f64,
    pub min_probability: f64,
    pub max_probability: f64,
    /// v1 only: multiplicative home boost on expected goals
    pub v1_home_advantage: f64,
}

impl Default for HockeyParams {
    fn default() -> Self {
        HockeyParams {
            home_ice: 15.0,
            elo_scale: 80.0,
            form_weight: 0.20,
            form_rating_range: 100.0,
            max_regression_weight: 0.7,
            full_weight_games: 40.0,
            min_probability: 0.35,
            max_probability: 0.65,
            v1_home_advantage: 0.05,
        }
    }
}

impl HockeyParams {
    /// Share of the observed goal differential kept after regression.
    pub fn regression_weight(&self, played: u32) -> f64 {
        if self.full_weight_games <= 0.0 {
            return self.max_regression_weight;
        }
        let progress = (played as f64 / self.full_weight_games).min(1.0);
        self.max_regression_weight * progress
    }
}

fn team_rating(stats: &TeamStats, form: &str, params: &HockeyParams) -> f64 {
    let diff = stats.differential_per_game() * params.regression_weight(stats.played);
    BASE_RATING + diff * params.elo_scale + form_nudge(form, params.form_weight, params.form_rating_range)
}

/// Production hockey model.
pub fn predict_v2_elo(input: &ModelInput, params: &HockeyParams) -> RawProbabilities {
    let home_rating = team_rating(&input.home_stats, &input.home_form, params);
    let away_rating = team_rating(&input.away_stats, &input.away_form, params);
    let delta = home_rating + params.home_ice - away_rating;

    let p_home =
        elo_win_probability(delta).clamp(params.min_probability, params.max_probability);

    debug!(
        "hockey v2: ratings {:.0} vs {:.0} (Δ {:.0}) → P(home) {:.3}",
        home_rating, away_rating, delta, p_home
    );

    RawProbabilities {
        home: p_home,
        away: 1.0 - p_home,
        draw: None,
        method: METHOD_V2_ELO.to_string(),
    }
}

/// Superseded Poisson model; regulation draws are split pro rata.
pub fn predict_v1_poisson(input: &ModelInput, params: &HockeyParams) -> RawProbabilities {
    let per_team = input.league_average() / 2.0;
    let home = team_strength(&input.home_stats, per_team);
    let away = team_strength(&input.away_stats, per_team);

    let lambda = home.attack * (2.0 - away.defense) * per_team * (1.0 + params.v1_home_advantage);
    let mu = away.attack * (2.0 - home.defense) * per_team;
    let p = outcome_probabilities(lambda.max(0.1), mu.max(0.1), 15, None);

    let decisive = p.home + p.away;
    let (home_p, away_p) = if decisive > 0.0 {
        (p.home / decisive, p.away / decisive)
    } else {
        (0.5, 0.5)
    };

    RawProbabilities {
        home: home_p,
        away: away_p,
        draw: None,
        method: METHOD_V1_POISSON.to_string(),
    }
}
