use serde::{Deserialize, Serialize};

use super::smoothing::{regress, SEASON_K};
use super::TeamStats;

pub const MIN_STRENGTH: f64 = 0.5;
pub const MAX_STRENGTH: f64 = 2.0;

/// Relative attack/defense multipliers; 1.0 is league average.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TeamStrength {
    pub attack: f64,
    pub defense: f64,
    pub overall: f64,
}

impl TeamStrength {
    pub const NEUTRAL: TeamStrength = TeamStrength {
        attack: 1.0,
        defense: 1.0,
        overall: 1.0,
    };
}

/// Attack/defense strength from cumulative season figures.
///
/// `per_team_average` is what an average team scores per game in this league.
/// Ratios are shrunk toward 1.0 by games played and clamped to `[0.5, 2.0]`,
/// so one 10-0 win cannot produce a runaway rating.
pub fn team_strength(stats: &TeamStats, per_team_average: f64) -> TeamStrength {
    if stats.played == 0 || per_team_average <= 0.0 {
        return TeamStrength::NEUTRAL;
    }

    let played = stats.played as f64;
    let scored_per_game = stats.scored.max(0.0) / played;
    let conceded_per_game = stats.conceded.max(0.0) / played;

    let raw_attack = scored_per_game / per_team_average;
    // A clean sheet record has no finite ratio; treat it as the best possible defense.
    let raw_defense = if conceded_per_game > 0.0 {
        per_team_average / conceded_per_game
    } else {
        MAX_STRENGTH
    };

    let attack = clamp_strength(regress(raw_attack, 1.0, played, SEASON_K));
    let defense = clamp_strength(regress(raw_defense, 1.0, played, SEASON_K));
    let overall = clamp_strength((attack + defense) / 2.0);

    TeamStrength {
        attack,
        defense,
        overall,
    }
}

fn clamp_strength(v: f64) -> f64 {
    v.clamp(MIN_STRENGTH, MAX_STRENGTH)
}
