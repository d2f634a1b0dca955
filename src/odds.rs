//! Decimal-odds helpers: implied probabilities, margin removal and edge.
//!
//! Bookmaker prices carry a margin ("vig"), so the raw implied probabilities
//! `1 / odds` sum to more than one. The engine removes it proportionally:
//!
//!   p_i = (1 / o_i) / Σ_j (1 / o_j)
//!
//! which is what every market comparison (market skill, CLV, the odds-implied
//! expected score) works from.

use crate::db::models::{CalibratedProbabilities, EdgeResult, MarketProbabilities, MatchOdds, Outcome};

/// Raw implied probability of a decimal price. `None` for prices that cannot
/// be real (≤ 1.0, NaN, infinite).
pub fn implied_probability(decimal_odds: f64) -> Option<f64> {
    if !decimal_odds.is_finite() || decimal_odds <= 1.0 {
        return None;
    }
    Some(1.0 / decimal_odds)
}

/// Remove the margin from a set of decimal odds.
///
/// Returns `None` when any supplied price is invalid.
pub fn devig(home: f64, away: f64, draw: Option<f64>) -> Option<MarketProbabilities> {
    let ih = implied_probability(home)?;
    let ia = implied_probability(away)?;
    let id = match draw {
        Some(d) => Some(implied_probability(d)?),
        None => None,
    };

    let overround = ih + ia + id.unwrap_or(0.0);
    Some(MarketProbabilities {
        home: ih / overround,
        away: ia / overround,
        draw: id.map(|d| d / overround),
        overround,
    })
}

pub fn devig_odds(odds: &MatchOdds) -> Option<MarketProbabilities> {
    devig(odds.home, odds.away, odds.draw)
}

/// Edge of a probability estimate over a market probability.
///
/// Edge = model_prob / market_prob − 1
///
/// Positive edge means the market is underpricing the outcome.
pub fn edge(model_prob: f64, market_prob: f64) -> f64 {
    if market_prob <= 0.0 {
        return 0.0;
    }
    model_prob / market_prob - 1.0
}

/// Per-outcome edge of the calibrated model over the de-vigged market.
pub fn edge_result(model: &CalibratedProbabilities, market: &MarketProbabilities) -> EdgeResult {
    let home = edge(model.home, market.home);
    let away = edge(model.away, market.away);
    let draw = match (model.draw, market.draw) {
        (Some(m), Some(k)) => Some(edge(m, k)),
        _ => None,
    };

    let mut best: Option<(Outcome, f64)> = None;
    let candidates = [
        (Outcome::Home, Some(home)),
        (Outcome::Away, Some(away)),
        (Outcome::Draw, draw),
    ];
    for (outcome, e) in candidates {
        if let Some(e) = e {
            if e > 0.0 && best.map_or(true, |(_, b)| e > b) {
                best = Some((outcome, e));
            }
        }
    }

    EdgeResult {
        home,
        away,
        draw,
        best_outcome: best.map(|(o, _)| o),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_implied_probability() {
        assert_relative_eq!(implied_probability(2.0).unwrap(), 0.5, epsilon = 1e-12);
        assert!(implied_probability(1.0).is_none());
        assert!(implied_probability(0.0).is_none());
        assert!(implied_probability(f64::NAN).is_none());
    }

    #[test]
    fn test_devig_two_way_removes_margin() {
        // 1.91 / 1.91 is a standard -110 line: 4.7% margin split evenly
        let m = devig(1.91, 1.91, None).unwrap();
        assert_relative_eq!(m.home, 0.5, epsilon = 1e-12);
        assert_relative_eq!(m.away, 0.5, epsilon = 1e-12);
        assert!(m.overround > 1.04 && m.overround < 1.05);
        assert!(m.draw.is_none());
    }

    #[test]
    fn test_devig_three_way_sums_to_one() {
        let m = devig(2.10, 3.60, Some(3.30)).unwrap();
        assert_relative_eq!(m.home + m.away + m.draw.unwrap(), 1.0, epsilon = 1e-12);
        assert!(m.home > m.draw.unwrap());
        assert!(m.draw.unwrap() > m.away);
    }

    #[test]
    fn test_devig_rejects_invalid_draw_price() {
        assert!(devig(2.0, 2.0, Some(0.9)).is_none());
    }

    #[test]
    fn test_edge_calculation() {
        // Model 60%, market 50% → 20% edge
        assert_relative_eq!(edge(0.6, 0.5), 0.2, epsilon = 1e-9);
        assert_relative_eq!(edge(0.5, 0.5), 0.0, epsilon = 1e-9);
        assert!(edge(0.3, 0.5) < 0.0);
        assert_relative_eq!(edge(0.5, 0.0), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_edge_result_picks_best_positive_edge() {
        let model = CalibratedProbabilities {
            home: 0.50,
            away: 0.20,
            draw: Some(0.30),
        };
        let market = MarketProbabilities {
            home: 0.45,
            away: 0.30,
            draw: Some(0.25),
            overround: 1.05,
        };
        let e = edge_result(&model, &market);
        assert_eq!(e.best_outcome, Some(Outcome::Draw));
        assert!(e.away < 0.0);
    }

    #[test]
    fn test_edge_result_none_when_no_edge() {
        let model = CalibratedProbabilities {
            home: 0.5,
            away: 0.5,
            draw: None,
        };
        let market = MarketProbabilities {
            home: 0.5,
            away: 0.5,
            draw: None,
            overround: 1.0,
        };
        assert_eq!(edge_result(&model, &market).best_outcome, None);
    }
}
