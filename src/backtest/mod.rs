//! Backtest & calibration metrics over settled ledger records.
//!
//! Home and away are scored as two independent binary events per match and
//! pooled, so a draw counts as a loss for both sides. The model probability
//! for a record is always its calibrated snapshot.

pub mod clv;
pub mod report;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::db::models::{Outcome, PredictionRecord};

pub use clv::{calculate_clv, ClvBucket, ClvSummary};
pub use report::{generate_calibration_report, generate_performance_report, Report};

pub const DEFAULT_BUCKETS: usize = 10;
pub const ACCURACY_THRESHOLDS: [f64; 6] = [0.50, 0.55, 0.60, 0.65, 0.70, 0.75];
const EPS: f64 = 1e-15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBucket {
    /// `[lo, hi)`; the last bucket also takes 1.0
    pub range: (f64, f64),
    pub predictions: usize,
    pub wins: usize,
    /// Bucket midpoint
    pub expected_win_rate: f64,
    pub actual_win_rate: f64,
    pub calibration_error: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdAccuracy {
    pub threshold: f64,
    pub predictions: usize,
    pub correct: usize,
    pub accuracy: f64,
    /// Share of all settled records whose favourite met the threshold
    pub coverage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeagueBrier {
    pub league: String,
    pub predictions: usize,
    pub brier_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestMetrics {
    pub total_predictions: usize,
    pub brier_score: f64,
    pub log_loss: f64,
    /// Expected calibration error
    pub calibration_error: f64,
    pub calibration_buckets: Vec<CalibrationBucket>,
    pub accuracy_at_threshold: Vec<ThresholdAccuracy>,
    /// Settled records that carried de-vigged market probabilities
    pub market_predictions: usize,
    /// Model Brier minus market Brier on the same records; negative beats the market
    pub brier_score_vs_market: f64,
    pub by_league: Vec<LeagueBrier>,
}

/// (predicted probability, 1.0 if it happened else 0.0)
type Sample = (f64, f64);

fn hit(outcome: Outcome, side: Outcome) -> f64 {
    if outcome == side {
        1.0
    } else {
        0.0
    }
}

fn side_samples(outcome: Outcome, home: f64, away: f64) -> [Sample; 2] {
    [
        (home, hit(outcome, Outcome::Home)),
        (away, hit(outcome, Outcome::Away)),
    ]
}

fn model_samples(record: &PredictionRecord) -> Option<[Sample; 2]> {
    let outcome = record.result.as_ref()?.outcome;
    let p = &record.calibrated_probabilities;
    Some(side_samples(outcome, p.home, p.away))
}

fn market_samples(record: &PredictionRecord) -> Option<[Sample; 2]> {
    let outcome = record.result.as_ref()?.outcome;
    let m = record.market_probabilities.as_ref()?;
    Some(side_samples(outcome, m.home, m.away))
}

pub fn brier_score(samples: &[Sample]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|(p, y)| (p - y).powi(2)).sum::<f64>() / samples.len() as f64
}

pub fn log_loss(samples: &[Sample]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let total: f64 = samples
        .iter()
        .map(|(p, y)| {
            let p = p.clamp(EPS, 1.0 - EPS);
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .sum();
    total / samples.len() as f64
}

/// Equal-width buckets over `[0, 1]` and the count-weighted mean error (ECE).
pub fn calibration_buckets(samples: &[Sample], buckets: usize) -> (Vec<CalibrationBucket>, f64) {
    let n = buckets.max(1);
    let width = 1.0 / n as f64;
    let mut counts = vec![(0usize, 0usize); n];

    for (p, y) in samples {
        let idx = ((p.clamp(0.0, 1.0) * n as f64) as usize).min(n - 1);
        counts[idx].0 += 1;
        if *y > 0.5 {
            counts[idx].1 += 1;
        }
    }

    let mut weighted_error = 0.0;
    let out: Vec<CalibrationBucket> = counts
        .into_iter()
        .enumerate()
        .map(|(i, (predictions, wins))| {
            let lo = i as f64 * width;
            let hi = lo + width;
            let expected = lo + width / 2.0;
            let (actual, error) = if predictions > 0 {
                let actual = wins as f64 / predictions as f64;
                (actual, (actual - expected).abs())
            } else {
                (0.0, 0.0)
            };
            weighted_error += error * predictions as f64;
            CalibrationBucket {
                range: (lo, hi),
                predictions,
                wins,
                expected_win_rate: expected,
                actual_win_rate: actual,
                calibration_error: error,
            }
        })
        .collect();

    let ece = if samples.is_empty() {
        0.0
    } else {
        weighted_error / samples.len() as f64
    };
    (out, ece)
}

/// Accuracy of the favourite outcome among records confident enough to qualify.
pub fn accuracy_at_thresholds(settled: &[&PredictionRecord], thresholds: &[f64]) -> Vec<ThresholdAccuracy> {
    let picks: Vec<(f64, bool)> = settled
        .iter()
        .filter_map(|r| {
            let outcome = r.result.as_ref()?.outcome;
            let (favourite, p) = r.calibrated_probabilities.favourite();
            Some((p, favourite == outcome))
        })
        .collect();

    thresholds
        .iter()
        .map(|&threshold| {
            let qualifying: Vec<bool> = picks
                .iter()
                .filter(|(p, _)| *p >= threshold)
                .map(|(_, correct)| *correct)
                .collect();
            let predictions = qualifying.len();
            let correct = qualifying.iter().filter(|c| **c).count();
            ThresholdAccuracy {
                threshold,
                predictions,
                correct,
                accuracy: ratio(correct, predictions),
                coverage: ratio(predictions, picks.len()),
            }
        })
        .collect()
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

pub fn calculate_backtest_metrics(records: &[PredictionRecord]) -> BacktestMetrics {
    calculate_backtest_metrics_with(records, DEFAULT_BUCKETS)
}

/// Full metric set with a configurable number of calibration buckets.
/// Unsettled records are skipped.
pub fn calculate_backtest_metrics_with(records: &[PredictionRecord], buckets: usize) -> BacktestMetrics {
    let settled: Vec<&PredictionRecord> = records.iter().filter(|r| r.is_settled()).collect();

    let samples: Vec<Sample> = settled.iter().filter_map(|r| model_samples(r)).flatten().collect();
    let (calibration_buckets, calibration_error) = calibration_buckets(&samples, buckets);

    let mut model_vs_market = Vec::new();
    let mut market = Vec::new();
    for r in &settled {
        if let (Some(m), Some(s)) = (model_samples(r), market_samples(r)) {
            model_vs_market.extend(m);
            market.extend(s);
        }
    }
    let market_predictions = market.len() / 2;
    let brier_score_vs_market = if market.is_empty() {
        0.0
    } else {
        brier_score(&model_vs_market) - brier_score(&market)
    };

    let mut leagues: BTreeMap<&str, Vec<Sample>> = BTreeMap::new();
    for r in &settled {
        if let Some(s) = model_samples(r) {
            leagues.entry(r.league.as_str()).or_default().extend(s);
        }
    }
    let by_league = leagues
        .into_iter()
        .map(|(league, s)| LeagueBrier {
            league: league.to_string(),
            predictions: s.len() / 2,
            brier_score: brier_score(&s),
        })
        .collect();

    BacktestMetrics {
        total_predictions: settled.len(),
        brier_score: brier_score(&samples),
        log_loss: log_loss(&samples),
        calibration_error,
        calibration_buckets,
        accuracy_at_threshold: accuracy_at_thresholds(&settled, &ACCURACY_THRESHOLDS),
        market_predictions,
        brier_score_vs_market,
        by_league,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{MarketProbabilities, Sport};
    use crate::ledger::testutil::{record, settled_record};
    use approx::assert_relative_eq;

    #[test]
    fn empty_input_is_all_zeros() {
        let m = calculate_backtest_metrics(&[]);
        assert_eq!(m.total_predictions, 0);
        assert_eq!(m.brier_score, 0.0);
        assert_eq!(m.log_loss, 0.0);
        assert_eq!(m.calibration_error, 0.0);
        assert_eq!(m.brier_score_vs_market, 0.0);
        assert_eq!(m.market_predictions, 0);
        assert!(m.by_league.is_empty());
        assert_eq!(m.calibration_buckets.len(), DEFAULT_BUCKETS);
        assert!(m.calibration_buckets.iter().all(|b| b.predictions == 0));
        assert!(m
            .accuracy_at_threshold
            .iter()
            .all(|t| t.predictions == 0 && t.accuracy == 0.0 && t.coverage == 0.0));
    }

    #[test]
    fn unsettled_records_are_ignored() {
        let records = vec![
            record("m1", Sport::Soccer, "EPL"),
            settled_record("m2", Sport::Basketball, "NBA", 0.7, 110, 100),
        ];
        let m = calculate_backtest_metrics(&records);
        assert_eq!(m.total_predictions, 1);
    }

    #[test]
    fn coin_flip_brier_is_quarter() {
        let records = vec![
            settled_record("m1", Sport::Basketball, "NBA", 0.5, 100, 90),
            settled_record("m2", Sport::Basketball, "NBA", 0.5, 90, 100),
        ];
        let m = calculate_backtest_metrics(&records);
        assert_relative_eq!(m.brier_score, 0.25, epsilon = 1e-12);
        assert_relative_eq!(m.log_loss, std::f64::consts::LN_2, epsilon = 1e-12);
    }

    #[test]
    fn perfect_predictor_scores_zero() {
        let records = vec![
            settled_record("m1", Sport::Basketball, "NBA", 1.0, 100, 90),
            settled_record("m2", Sport::Basketball, "NBA", 0.0, 90, 100),
        ];
        let m = calculate_backtest_metrics(&records);
        assert_relative_eq!(m.brier_score, 0.0);
        assert_relative_eq!(m.log_loss, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn draw_is_a_loss_for_both_sides() {
        let r = settled_record("m1", Sport::Soccer, "EPL", 0.5, 1, 1);
        let m = calculate_backtest_metrics(&[r]);
        // (0.5 - 0)^2 on both sides
        assert_relative_eq!(m.brier_score, 0.25, epsilon = 1e-12);
    }

    fn calibrated_population() -> Vec<PredictionRecord> {
        (0..10)
            .map(|i| {
                let (h, a) = if i < 7 { (2, 0) } else { (0, 2) };
                settled_record(&format!("m{i}"), Sport::Hockey, "NHL", 0.65, h, a)
            })
            .collect()
    }

    #[test]
    fn buckets_and_ece() {
        let m = calculate_backtest_metrics(&calibrated_population());

        let home = &m.calibration_buckets[6];
        assert_eq!(home.predictions, 10);
        assert_eq!(home.wins, 7);
        assert_relative_eq!(home.expected_win_rate, 0.65, epsilon = 1e-9);
        assert_relative_eq!(home.actual_win_rate, 0.7, epsilon = 1e-9);

        let away = &m.calibration_buckets[3];
        assert_eq!(away.predictions, 10);
        assert_eq!(away.wins, 3);
        assert_relative_eq!(away.calibration_error, 0.05, epsilon = 1e-9);

        assert_relative_eq!(m.calibration_error, 0.05, epsilon = 1e-9);
    }

    #[test]
    fn certainty_lands_in_top_bucket() {
        let (buckets, _) = calibration_buckets(&[(1.0, 1.0), (0.0, 0.0)], 10);
        assert_eq!(buckets[9].predictions, 1);
        assert_eq!(buckets[0].predictions, 1);
    }

    #[test]
    fn accuracy_and_coverage_by_threshold() {
        let m = calculate_backtest_metrics(&calibrated_population());
        let at = |t: f64| {
            m.accuracy_at_threshold
                .iter()
                .find(|a| (a.threshold - t).abs() < 1e-9)
                .cloned()
                .unwrap()
        };
        let loose = at(0.50);
        assert_eq!(loose.predictions, 10);
        assert_eq!(loose.correct, 7);
        assert_relative_eq!(loose.accuracy, 0.7, epsilon = 1e-12);
        assert_relative_eq!(loose.coverage, 1.0);

        assert_eq!(at(0.65).predictions, 10);
        let strict = at(0.70);
        assert_eq!(strict.predictions, 0);
        assert_relative_eq!(strict.coverage, 0.0);
    }

    #[test]
    fn market_skill_compares_on_shared_records() {
        let mut r = settled_record("m1", Sport::Soccer, "EPL", 0.5, 2, 0);
        r.calibrated_probabilities.home = 0.5;
        r.calibrated_probabilities.away = 0.3;
        r.market_probabilities = Some(MarketProbabilities {
            home: 0.48,
            away: 0.30,
            draw: Some(0.22),
            overround: 1.05,
        });
        let no_market = settled_record("m2", Sport::Soccer, "EPL", 0.9, 0, 1);

        let m = calculate_backtest_metrics(&[r, no_market]);
        assert_eq!(m.market_predictions, 1);
        // model (0.25 + 0.09) / 2, market (0.2704 + 0.09) / 2
        assert_relative_eq!(m.brier_score_vs_market, 0.17 - 0.1802, epsilon = 1e-12);
    }

    #[test]
    fn per_league_breakdown() {
        let records = vec![
            settled_record("m1", Sport::Soccer, "EPL", 1.0, 1, 0),
            settled_record("m2", Sport::Soccer, "La Liga", 0.5, 1, 0),
            settled_record("m3", Sport::Soccer, "La Liga", 0.5, 0, 1),
        ];
        let m = calculate_backtest_metrics(&records);
        assert_eq!(m.by_league.len(), 2);
        assert_eq!(m.by_league[0].league, "EPL");
        assert_relative_eq!(m.by_league[0].brier_score, 0.0);
        assert_eq!(m.by_league[1].predictions, 2);
        assert_relative_eq!(m.by_league[1].brier_score, 0.25, epsilon = 1e-12);
    }

    #[test]
    fn bucket_count_is_configurable() {
        let m = calculate_backtest_metrics_with(&calibrated_population(), 4);
        assert_eq!(m.calibration_buckets.len(), 4);
        assert_relative_eq!(m.calibration_buckets[1].range.0, 0.25);
    }
}
