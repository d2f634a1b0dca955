//! Soccer: independent Poisson goals with the Dixon-Coles correction.
//!
//! Expected goals per side come from attack strength × opponent defensive
//! weakness × league rate, nudged by home advantage, form and head-to-head.
//! Outcome probabilities are the double sum of the two Poisson PMFs over a
//! truncated score grid.
//!
//! Independent Poisson underweights 0-0 and 1-1 and overweights 1-0 / 0-1.
//! Dixon-Coles multiplies those four cells by τ(x, y, λ, μ, ρ) and
//! renormalises; with ρ = −0.05 the adjustment is small but consistent.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::models::RawProbabilities;

use super::smoothing::form_strength;
use super::strength::team_strength;
use super::{HeadToHead, ModelInput};

pub const METHOD_POISSON: &str = "poisson";
pub const METHOD_DIXON_COLES: &str = "dixon-coles";

/// Expected goals are clamped to this range to avoid degenerate distributions.
pub const MIN_EXPECTED_GOALS: f64 = 0.3;
pub const MAX_EXPECTED_GOALS: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoccerParams {
    /// Multiplicative boost to home expected goals (0.25 = +25%)
    pub home_advantage: f64,
    /// Scale of the form nudge: `1 + form_weight × (form − 0.5)`
    pub form_weight: f64,
    /// Boost for the side dominating the head-to-head
    pub h2h_boost: f64,
    /// Score grid is `0..=max_goals` per side
    pub max_goals: u32,
    /// Dixon-Coles dependence parameter
    pub rho: f64,
}

impl Default for SoccerParams {
    fn default() -> Self {
        SoccerParams {
            home_advantage: 0.25,
            form_weight: 0.35,
            h2h_boost: 0.05,
            max_goals: 10,
            rho: -0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpectedGoals {
    pub home: f64,
    pub away: f64,
}

/// Home/away expected goals for the match.
pub fn expected_goals(input: &ModelInput, params: &SoccerParams) -> ExpectedGoals {
    let per_team = input.league_average() / 2.0;
    let home = team_strength(&input.home_stats, per_team);
    let away = team_strength(&input.away_stats, per_team);

    let mut lambda = home.attack * (2.0 - away.defense) * per_team * (1.0 + params.home_advantage);
    let mut mu = away.attack * (2.0 - home.defense) * per_team;

    lambda *= 1.0 + params.form_weight * (form_strength(&input.home_form) - 0.5);
    mu *= 1.0 + params.form_weight * (form_strength(&input.away_form) - 0.5);

    if let Some(h2h) = input.usable_h2h() {
        if h2h.home_win_rate().unwrap_or(0.0) >= HeadToHead::DOMINANCE {
            lambda *= 1.0 + params.h2h_boost;
        } else if h2h.away_win_rate().unwrap_or(0.0) >= HeadToHead::DOMINANCE {
            mu *= 1.0 + params.h2h_boost;
        }
    }

    ExpectedGoals {
        home: lambda.clamp(MIN_EXPECTED_GOALS, MAX_EXPECTED_GOALS),
        away: mu.clamp(MIN_EXPECTED_GOALS, MAX_EXPECTED_GOALS),
    }
}

/// P(X = k) for X ~ Poisson(lambda).
pub fn poisson_pmf(k: u32, lambda: f64) -> f64 {
    if lambda <= 0.0 {
        return if k == 0 { 1.0 } else { 0.0 };
    }
    // log-space keeps k! from overflowing on wide grids
    let ln_fact: f64 = (1..=k).map(|i| (i as f64).ln()).sum();
    (k as f64 * lambda.ln() - lambda - ln_fact).exp()
}

/// Dixon-Coles dependence factor for a (home, away) scoreline.
pub fn dixon_coles_tau(home_goals: u32, away_goals: u32, lambda: f64, mu: f64, rho: f64) -> f64 {
    let tau = match (home_goals, away_goals) {
        (0, 0) => 1.0 - lambda * mu * rho,
        (0, 1) => 1.0 + lambda * rho,
        (1, 0) => 1.0 + mu * rho,
        (1, 1) => 1.0 - rho,
        _ => 1.0,
    };
    tau.max(0.0)
}

/// Home-win / draw / away-win probabilities
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutcomeProbabilities {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

/// Sum the joint score grid into outcome buckets. `rho = None` is plain
/// independent Poisson.
pub fn outcome_probabilities(
    lambda: f64,
    mu: f64,
    max_goals: u32,
    rho: Option<f64>,
) -> OutcomeProbabilities {
    let home_pmf: Vec<f64> = (0..=max_goals).map(|k| poisson_pmf(k, lambda)).collect();
    let away_pmf: Vec<f64> = (0..=max_goals).map(|k| poisson_pmf(k, mu)).collect();

    let mut home = 0.0;
    let mut draw = 0.0;
    let mut away = 0.0;
    for (h, ph) in home_pmf.iter().enumerate() {
        for (a, pa) in away_pmf.iter().enumerate() {
            let mut p = ph * pa;
            if let Some(rho) = rho {
                p *= dixon_coles_tau(h as u32, a as u32, lambda, mu, rho);
            }
            if h > a {
                home += p;
            } else if h == a {
                draw += p;
            } else {
                away += p;
            }
        }
    }

    let total = home + draw + away;
    if total <= 0.0 {
        return OutcomeProbabilities {
            home: 1.0 / 3.0,
            draw: 1.0 / 3.0,
            away: 1.0 / 3.0,
        };
    }
    OutcomeProbabilities {
        home: home / total,
        draw: draw / total,
        away: away / total,
    }
}

/// Independent Poisson, no low-score correction.
pub fn predict_poisson(input: &ModelInput, params: &SoccerParams) -> RawProbabilities {
    let xg = expected_goals(input, params);
    let p = outcome_probabilities(xg.home, xg.away, params.max_goals, None);
    debug!(
        "soccer poisson: xg {:.2}-{:.2} → H {:.3} D {:.3} A {:.3}",
        xg.home, xg.away, p.home, p.draw, p.away
    );
    to_raw(p, METHOD_POISSON)
}

/// Production soccer model.
pub fn predict_dixon_coles(input: &ModelInput, params: &SoccerParams) -> RawProbabilities {
    let xg = expected_goals(input, params);
    let p = outcome_probabilities(xg.home, xg.away, params.max_goals, Some(params.rho));
    debug!(
        "soccer dixon-coles: xg {:.2}-{:.2} → H {:.3} D {:.3} A {:.3}",
        xg.home, xg.away, p.home, p.draw, p.away
    );
    to_raw(p, METHOD_DIXON_COLES)
}

fn to_raw(p: OutcomeProbabilities, method: &str) -> RawProbabilities {
    RawProbabilities {
        home: p.home,
        away: p.away,
        draw: Some(p.draw),
        method: method.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Sport;
    use crate::model::TeamStats;
    use approx::assert_relative_eq;

    fn stats(played: u32, scored: f64, conceded: f64) -> TeamStats {
        TeamStats {
            played,
            scored,
            conceded,
        }
    }

    #[test]
    fn strong_home_side_is_favourite() {
        let input = ModelInput::new(Sport::Soccer, stats(20, 35.0, 15.0), stats(20, 20.0, 25.0))
            .with_form("WWWDW", "LDLLW");
        let p = predict_dixon_coles(&input, &SoccerParams::default());
        let draw = p.draw.unwrap();
        assert!(p.home > p.away, "home {:.3} should beat away {:.3}", p.home, p.away);
        assert!(p.home > draw, "home {:.3} should beat draw {:.3}", p.home, draw);
    }

    #[test]
    fn home_advantage_is_the_only_asymmetry() {
        let input = ModelInput::new(Sport::Soccer, stats(10, 15.0, 15.0), stats(10, 15.0, 15.0));
        let p = predict_dixon_coles(&input, &SoccerParams::default());
        assert!(p.home > p.away);
        let p = predict_poisson(&input, &SoccerParams::default());
        assert!(p.home > p.away);
    }

    #[test]
    fn neutral_inputs_are_symmetric() {
        let params = SoccerParams {
            home_advantage: 0.0,
            ..SoccerParams::default()
        };
        let input = ModelInput::new(Sport::Soccer, stats(12, 18.0, 14.0), stats(12, 18.0, 14.0))
            .with_form("WDLWW", "WDLWW");
        for p in [predict_dixon_coles(&input, &params), predict_poisson(&input, &params)] {
            assert_relative_eq!(p.home, p.away, epsilon = 1e-9);
        }
    }

    #[test]
    fn stronger_home_attack_never_lowers_home_probability() {
        let params = SoccerParams::default();
        let mut last = 0.0;
        for scored in 0..=60 {
            let input = ModelInput::new(
                Sport::Soccer,
                stats(20, scored as f64, 20.0),
                stats(20, 25.0, 25.0),
            );
            let p = predict_dixon_coles(&input, &params);
            assert!(p.home >= last - 1e-12, "home prob dropped at scored={scored}");
            last = p.home;
        }
    }

    #[test]
    fn expected_goals_are_clamped() {
        let params = SoccerParams::default();
        let input = ModelInput::new(Sport::Soccer, stats(30, 200.0, 0.0), stats(30, 0.0, 200.0));
        let xg = expected_goals(&input, &params);
        assert_relative_eq!(xg.away, MIN_EXPECTED_GOALS, epsilon = 1e-12);
        assert!(xg.home <= MAX_EXPECTED_GOALS);
    }

    #[test]
    fn h2h_dominance_boosts_home_goals() {
        let params = SoccerParams::default();
        let base = ModelInput::new(Sport::Soccer, stats(10, 12.0, 12.0), stats(10, 12.0, 12.0));
        let boosted = base.clone().with_h2h(HeadToHead {
            home_wins: 3,
            away_wins: 1,
            draws: 1,
            total: 5,
        });
        let xg_base = expected_goals(&base, &params);
        let xg_boost = expected_goals(&boosted, &params);
        assert_relative_eq!(xg_boost.home, xg_base.home * 1.05, epsilon = 1e-12);
        assert_relative_eq!(xg_boost.away, xg_base.away, epsilon = 1e-12);

        // two meetings are ignored
        let ignored = base.clone().with_h2h(HeadToHead {
            home_wins: 2,
            away_wins: 0,
            draws: 0,
            total: 2,
        });
        assert_eq!(expected_goals(&ignored, &params), xg_base);
    }

    #[test]
    fn poisson_pmf_sums_to_one() {
        let total: f64 = (0..40).map(|k| poisson_pmf(k, 2.7)).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-9);
        assert_relative_eq!(poisson_pmf(0, 1.0), (-1.0f64).exp(), epsilon = 1e-12);
        assert_relative_eq!(poisson_pmf(0, 0.0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn dixon_coles_tau_values() {
        let (l, m, rho) = (1.5, 1.1, -0.05);
        assert_relative_eq!(dixon_coles_tau(0, 0, l, m, rho), 1.0 + l * m * 0.05, epsilon = 1e-12);
        assert_relative_eq!(dixon_coles_tau(0, 1, l, m, rho), 1.0 - l * 0.05, epsilon = 1e-12);
        assert_relative_eq!(dixon_coles_tau(1, 0, l, m, rho), 1.0 - m * 0.05, epsilon = 1e-12);
        assert_relative_eq!(dixon_coles_tau(1, 1, l, m, rho), 1.05, epsilon = 1e-12);
        assert_relative_eq!(dixon_coles_tau(2, 1, l, m, rho), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn dixon_coles_raises_draws() {
        let plain = outcome_probabilities(1.3, 1.1, 10, None);
        let dc = outcome_probabilities(1.3, 1.1, 10, Some(-0.05));
        assert!(dc.draw > plain.draw);
        assert_relative_eq!(dc.home + dc.draw + dc.away, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn methods_are_labelled() {
        let input = ModelInput::new(Sport::Soccer, TeamStats::default(), TeamStats::default());
        assert_eq!(predict_poisson(&input, &SoccerParams::default()).method, "poisson");
        assert_eq!(predict_dixon_coles(&input, &SoccerParams::default()).method, "dixon-coles");
    }
}
