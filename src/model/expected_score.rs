//! Display-only expected scorelines. Nothing here feeds the probabilities.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::models::{MatchOdds, Sport};
use crate::odds::devig_odds;

use super::soccer::{expected_goals, SoccerParams};
use super::strength::team_strength;
use super::{ModelInput, TeamStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedScoreMethod {
    /// Derived from season statistics
    Stats,
    /// Derived from market odds because neither side has history
    OddsImplied,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpectedScore {
    pub home: f64,
    pub away: f64,
    pub method: ExpectedScoreMethod,
}

impl ExpectedScore {
    /// "112-108" for points sports, "1.8-1.1" for goal sports.
    pub fn display(&self, sport: Sport) -> String {
        match sport {
            Sport::Basketball | Sport::Football => format!("{:.0}-{:.0}", self.home, self.away),
            Sport::Soccer | Sport::Hockey => format!("{:.1}-{:.1}", self.home, self.away),
        }
    }
}

/// Points-sport constants: additive home edge and plausible per-team range.
struct PointsProfile {
    home_advantage: f64,
    min: f64,
    max: f64,
}

const NBA: PointsProfile = PointsProfile {
    home_advantage: 3.0,
    min: 90.0,
    max: 140.0,
};

const NFL: PointsProfile = PointsProfile {
    home_advantage: 2.5,
    min: 10.0,
    max: 45.0,
};

const HOCKEY_HOME_ADVANTAGE: f64 = 0.05;
const HOCKEY_MIN_GOALS: f64 = 1.0;
const HOCKEY_MAX_GOALS: f64 = 5.5;

const ODDS_HOME_ADVANTAGE: f64 = 1.1;
const ODDS_HOME_RANGE: (f64, f64) = (0.5, 3.5);
const ODDS_AWAY_RANGE: (f64, f64) = (0.3, 2.5);

/// Expected scoreline for display. `odds` is only consulted for soccer when
/// neither side has any recorded games or goals.
pub fn estimate_expected_score(input: &ModelInput, odds: Option<&MatchOdds>) -> ExpectedScore {
    match input.sport {
        Sport::Basketball => points_score(input, &NBA),
        Sport::Football => points_score(input, &NFL),
        Sport::Hockey => hockey_score(input),
        Sport::Soccer => {
            let no_history = !input.home_stats.has_stats() && !input.away_stats.has_stats();
            if no_history {
                if let Some(score) = odds.and_then(|o| odds_implied_score(input.league_average(), o)) {
                    debug!(
                        "expected score from odds: {:.2}-{:.2}",
                        score.home, score.away
                    );
                    return score;
                }
            }
            let xg = expected_goals(input, &SoccerParams::default());
            ExpectedScore {
                home: xg.home,
                away: xg.away,
                method: ExpectedScoreMethod::Stats,
            }
        }
    }
}

fn per_game(total: f64, played: u32, fallback: f64) -> f64 {
    if played == 0 {
        fallback
    } else {
        total / played as f64
    }
}

fn points_score(input: &ModelInput, profile: &PointsProfile) -> ExpectedScore {
    let per_team = input.league_average() / 2.0;
    let offense = |s: &TeamStats| per_game(s.scored, s.played, per_team);
    let defense = |s: &TeamStats| per_game(s.conceded, s.played, per_team);

    let home = (offense(&input.home_stats) + defense(&input.away_stats)) / 2.0
        + profile.home_advantage / 2.0;
    let away = (offense(&input.away_stats) + defense(&input.home_stats)) / 2.0
        - profile.home_advantage / 2.0;

    ExpectedScore {
        home: home.clamp(profile.min, profile.max),
        away: away.clamp(profile.min, profile.max),
        method: ExpectedScoreMethod::Stats,
    }
}

fn hockey_score(input: &ModelInput) -> ExpectedScore {
    let per_team = input.league_average() / 2.0;
    let home = team_strength(&input.home_stats, per_team);
    let away = team_strength(&input.away_stats, per_team);
    let lambda = home.attack * (2.0 - away.defense) * per_team * (1.0 + HOCKEY_HOME_ADVANTAGE);
    let mu = away.attack * (2.0 - home.defense) * per_team;
    ExpectedScore {
        home: lambda.clamp(HOCKEY_MIN_GOALS, HOCKEY_MAX_GOALS),
        away: mu.clamp(HOCKEY_MIN_GOALS, HOCKEY_MAX_GOALS),
        method: ExpectedScoreMethod::Stats,
    }
}

/// Map de-vigged win probabilities onto plausible goal counts.
fn odds_implied_score(avg_total_goals: f64, odds: &MatchOdds) -> Option<ExpectedScore> {
    let market = devig_odds(odds)?;
    let home = avg_total_goals * (0.3 + 0.6 * market.home) * ODDS_HOME_ADVANTAGE;
    let away = avg_total_goals * (0.3 + 0.6 * market.away);
    Some(ExpectedScore {
        home: home.clamp(ODDS_HOME_RANGE.0, ODDS_HOME_RANGE.1),
        away: away.clamp(ODDS_AWAY_RANGE.0, ODDS_AWAY_RANGE.1),
        method: ExpectedScoreMethod::OddsImplied,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn stats(played: u32, scored: f64, conceded: f64) -> TeamStats {
        TeamStats {
            played,
            scored,
            conceded,
        }
    }

    fn odds() -> MatchOdds {
        MatchOdds {
            home: 1.80,
            away: 4.50,
            draw: Some(3.60),
        }
    }

    #[test]
    fn soccer_without_history_uses_odds() {
        let input = ModelInput::new(Sport::Soccer, stats(0, 0.0, 0.0), stats(0, 0.0, 0.0));
        let s = estimate_expected_score(&input, Some(&odds()));
        assert_eq!(s.method, ExpectedScoreMethod::OddsImplied);
        assert!(s.home > s.away);
        assert!((0.5..=3.5).contains(&s.home));
        assert!((0.3..=2.5).contains(&s.away));
    }

    #[test]
    fn soccer_with_history_ignores_odds() {
        let input = ModelInput::new(Sport::Soccer, stats(10, 14.0, 9.0), stats(10, 11.0, 13.0));
        let s = estimate_expected_score(&input, Some(&odds()));
        assert_eq!(s.method, ExpectedScoreMethod::Stats);
        let xg = expected_goals(&input, &SoccerParams::default());
        assert_relative_eq!(s.home, xg.home, epsilon = 1e-12);
    }

    #[test]
    fn one_side_with_history_keeps_stats_path() {
        let input = ModelInput::new(Sport::Soccer, stats(10, 14.0, 9.0), stats(0, 0.0, 0.0));
        let s = estimate_expected_score(&input, Some(&odds()));
        assert_eq!(s.method, ExpectedScoreMethod::Stats);
    }

    #[test]
    fn soccer_without_history_or_odds_is_neutral_stats() {
        let input = ModelInput::new(Sport::Soccer, stats(0, 0.0, 0.0), stats(0, 0.0, 0.0));
        let s = estimate_expected_score(&input, None);
        assert_eq!(s.method, ExpectedScoreMethod::Stats);
        // neutral strengths: 1.25 × 1.25 home, 1.25 away
        assert_relative_eq!(s.home, 1.5625, epsilon = 1e-12);
        assert_relative_eq!(s.away, 1.25, epsilon = 1e-12);
    }

    #[test]
    fn basketball_is_additive_and_clamped() {
        let input = ModelInput::new(Sport::Basketball, stats(10, 1150.0, 1100.0), stats(10, 1100.0, 1150.0));
        let s = estimate_expected_score(&input, None);
        assert_relative_eq!(s.home, 115.0 + 1.5, epsilon = 1e-9);
        assert_relative_eq!(s.away, 110.0 - 1.5, epsilon = 1e-9);

        let silly = ModelInput::new(Sport::Basketball, stats(1, 200.0, 50.0), stats(1, 50.0, 200.0));
        let s = estimate_expected_score(&silly, None);
        assert_relative_eq!(s.home, 140.0);
        assert_relative_eq!(s.away, 90.0);
    }

    #[test]
    fn football_clamps_to_nfl_range() {
        let input = ModelInput::new(Sport::Football, stats(2, 120.0, 0.0), stats(2, 0.0, 120.0));
        let s = estimate_expected_score(&input, None);
        assert_relative_eq!(s.home, 45.0);
        assert_relative_eq!(s.away, 10.0);
    }

    #[test]
    fn unplayed_points_teams_use_league_average() {
        let input = ModelInput::new(Sport::Football, TeamStats::default(), TeamStats::default());
        let s = estimate_expected_score(&input, None);
        assert_relative_eq!(s.home, 22.0 + 1.25, epsilon = 1e-12);
        assert_relative_eq!(s.away, 22.0 - 1.25, epsilon = 1e-12);
    }

    #[test]
    fn hockey_goals_in_range() {
        let input = ModelInput::new(Sport::Hockey, stats(40, 150.0, 100.0), stats(40, 100.0, 150.0));
        let s = estimate_expected_score(&input, None);
        assert!(s.home > s.away);
        assert!((1.0..=5.5).contains(&s.home));
    }

    #[test]
    fn display_formats_by_sport() {
        let s = ExpectedScore {
            home: 1.84,
            away: 1.06,
            method: ExpectedScoreMethod::Stats,
        };
        assert_eq!(s.display(Sport::Soccer), "1.8-1.1");
        let s = ExpectedScore {
            home: 112.4,
            away: 108.6,
            method: ExpectedScoreMethod::Stats,
        };
        assert_eq!(s.display(Sport::Basketball), "112-109");
    }
}
