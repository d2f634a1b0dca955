//! Pre-match baseline models.
//!
//! Each sport gets the model that fits how its scores are generated:
//! - **Soccer**: Poisson goal model with Dixon-Coles low-score correction
//! - **Basketball / NFL**: Elo on per-game point differential
//! - **Hockey**: conservative Elo, clamped to `[0.35, 0.65]`
//!
//! Dispatch is a closed table over [`Sport`]; see [`model_for_sport`].

pub mod elo;
pub mod expected_score;
pub mod hockey;
pub mod smoothing;
pub mod soccer;
pub mod strength;

use serde::{Deserialize, Serialize};

use crate::db::models::{CalibratedProbabilities, DataQuality, RawProbabilities, Sport, Volatility};

pub use elo::EloParams;
pub use expected_score::{estimate_expected_score, ExpectedScore};
pub use hockey::HockeyParams;
pub use soccer::SoccerParams;
pub use strength::{team_strength, TeamStrength};

/// Cumulative season figures for one side
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamStats {
    pub played: u32,
    pub scored: f64,
    pub conceded: f64,
}

impl TeamStats {
    /// Whether the side has usable scoring history.
    pub fn has_stats(&self) -> bool {
        self.played > 0 && self.scored > 0.0
    }

    /// Scoring margin per game; 0 before the first game.
    pub fn differential_per_game(&self) -> f64 {
        if self.played == 0 {
            return 0.0;
        }
        (self.scored - self.conceded) / self.played as f64
    }
}

/// Head-to-head tally from the home side's perspective
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadToHead {
    pub home_wins: u32,
    pub away_wins: u32,
    pub draws: u32,
    pub total: u32,
}

impl HeadToHead {
    /// Fewer meetings than this carry no signal.
    pub const MIN_MEETINGS: u32 = 3;
    /// Win share at which a side is considered to dominate the fixture.
    pub const DOMINANCE: f64 = 0.6;

    pub fn home_win_rate(&self) -> Option<f64> {
        (self.total >= Self::MIN_MEETINGS).then(|| self.home_wins as f64 / self.total as f64)
    }

    pub fn away_win_rate(&self) -> Option<f64> {
        (self.total >= Self::MIN_MEETINGS).then(|| self.away_wins as f64 / self.total as f64)
    }
}

/// Per-match statistical snapshot fed to a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInput {
    pub sport: Sport,
    pub home_stats: TeamStats,
    pub away_stats: TeamStats,
    /// Most recent result first, e.g. "WWDLW"
    #[serde(default)]
    pub home_form: String,
    #[serde(default)]
    pub away_form: String,
    #[serde(default)]
    pub h2h: Option<HeadToHead>,
    /// Average total score per match in this league
    #[serde(default)]
    pub league_average: Option<f64>,
}

impl ModelInput {
    pub fn new(sport: Sport, home_stats: TeamStats, away_stats: TeamStats) -> Self {
        ModelInput {
            sport,
            home_stats,
            away_stats,
            home_form: String::new(),
            away_form: String::new(),
            h2h: None,
            league_average: None,
        }
    }

    pub fn with_form(mut self, home_form: &str, away_form: &str) -> Self {
        self.home_form = home_form.to_string();
        self.away_form = away_form.to_string();
        self
    }

    pub fn with_h2h(mut self, h2h: HeadToHead) -> Self {
        self.h2h = Some(h2h);
        self
    }

    /// League scoring baseline (total per match), falling back to the sport default.
    pub fn league_average(&self) -> f64 {
        self.league_average
            .filter(|v| v.is_finite() && *v > 0.0)
            .unwrap_or_else(|| default_league_average(self.sport))
    }

    /// H2H tally if it clears the minimum-meetings bar.
    pub fn usable_h2h(&self) -> Option<&HeadToHead> {
        self.h2h.as_ref().filter(|h| h.total >= HeadToHead::MIN_MEETINGS)
    }
}

/// Typical total score per match.
pub fn default_league_average(sport: Sport) -> f64 {
    match sport {
        Sport::Soccer => 2.5,
        Sport::Basketball => 224.0,
        Sport::Football => 44.0,
        Sport::Hockey => 6.0,
    }
}

/// Rough tier for how much history backs a prediction.
pub fn assess_data_quality(input: &ModelInput) -> DataQuality {
    let games = input.home_stats.played.min(input.away_stats.played);
    let form = input.home_form.len().min(input.away_form.len());
    if games >= 10 && form >= 5 {
        DataQuality::High
    } else if games >= 3 {
        DataQuality::Medium
    } else {
        DataQuality::Low
    }
}

/// How swingy the match looks: hockey is always high, otherwise it follows
/// how clear the favourite is.
pub fn assess_volatility(sport: Sport, raw: &RawProbabilities) -> Volatility {
    if sport == Sport::Hockey {
        return Volatility::High;
    }
    let (_, p) = CalibratedProbabilities::from(raw).favourite();
    if p >= 0.65 {
        Volatility::Low
    } else if p >= 0.5 {
        Volatility::Medium
    } else {
        Volatility::High
    }
}

/// Tunable constants for every sport
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelParams {
    pub soccer: SoccerParams,
    pub basketball: EloParams,
    pub football: EloParams,
    pub hockey: HockeyParams,
}

impl Default for ModelParams {
    fn default() -> Self {
        ModelParams {
            soccer: SoccerParams::default(),
            basketball: EloParams::basketball(),
            football: EloParams::football(),
            hockey: HockeyParams::default(),
        }
    }
}

pub type ModelFn = fn(&ModelInput, &ModelParams) -> RawProbabilities;

/// Production model for each sport.
pub fn model_for_sport(sport: Sport) -> ModelFn {
    match sport {
        Sport::Soccer => soccer_model,
        Sport::Basketball => basketball_model,
        Sport::Football => football_model,
        Sport::Hockey => hockey_model,
    }
}

fn soccer_model(input: &ModelInput, params: &ModelParams) -> RawProbabilities {
    soccer::predict_dixon_coles(input, &params.soccer)
}

fn basketball_model(input: &ModelInput, params: &ModelParams) -> RawProbabilities {
    elo::predict(input, &params.basketball)
}

fn football_model(input: &ModelInput, params: &ModelParams) -> RawProbabilities {
    elo::predict(input, &params.football)
}

fn hockey_model(input: &ModelInput, params: &ModelParams) -> RawProbabilities {
    hockey::predict_v2_elo(input, &params.hockey)
}

/// Outcome probabilities with default parameters.
pub fn predict(input: &ModelInput) -> RawProbabilities {
    predict_with(input, &ModelParams::default())
}

pub fn predict_with(input: &ModelInput, params: &ModelParams) -> RawProbabilities {
    model_for_sport(input.sport)(input, params)
}
