//! Human-facing summaries built on the raw metrics. Both reports refuse to
//! speak below a minimum number of settled predictions.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::db::models::PredictionRecord;

use super::clv::{calculate_clv, ClvSummary};
use super::{calculate_backtest_metrics, LeagueBrier, ThresholdAccuracy};

pub const MIN_CALIBRATION_SAMPLES: usize = 20;
pub const MIN_PERFORMANCE_SAMPLES: usize = 10;
/// Bucket miss (actual − expected) beyond which a bucket gets flagged
pub const CONFIDENCE_FLAG_THRESHOLD: f64 = 0.10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Report<T> {
    InsufficientData { settled: usize, required: usize },
    Ready(T),
}

impl<T> Report<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            Report::Ready(report) => Some(report),
            Report::InsufficientData { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceFlag {
    WellCalibrated,
    /// Outcomes happened more often than predicted
    Underconfident,
    /// Outcomes happened less often than predicted
    Overconfident,
}

impl ConfidenceFlag {
    fn from_diff(diff: f64) -> Self {
        if diff > CONFIDENCE_FLAG_THRESHOLD {
            ConfidenceFlag::Underconfident
        } else if diff < -CONFIDENCE_FLAG_THRESHOLD {
            ConfidenceFlag::Overconfident
        } else {
            ConfidenceFlag::WellCalibrated
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketReport {
    pub range: (f64, f64),
    pub predictions: usize,
    pub expected_win_rate: f64,
    pub actual_win_rate: f64,
    /// actual − expected
    pub diff: f64,
    pub flag: ConfidenceFlag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub settled: usize,
    pub calibration_error: f64,
    /// Non-empty buckets only
    pub buckets: Vec<BucketReport>,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub settled: usize,
    pub brier_score: f64,
    pub log_loss: f64,
    pub brier_score_vs_market: Option<f64>,
    pub accuracy_at_threshold: Vec<ThresholdAccuracy>,
    pub by_league: Vec<LeagueBrier>,
    pub clv: ClvSummary,
    pub summary: String,
}

fn settled_count(records: &[PredictionRecord]) -> usize {
    records.iter().filter(|r| r.is_settled()).count()
}

pub fn generate_calibration_report(records: &[PredictionRecord]) -> Report<CalibrationReport> {
    let settled = settled_count(records);
    if settled < MIN_CALIBRATION_SAMPLES {
        warn!(
            "Calibration report needs {} settled predictions, have {}",
            MIN_CALIBRATION_SAMPLES, settled
        );
        return Report::InsufficientData {
            settled,
            required: MIN_CALIBRATION_SAMPLES,
        };
    }

    let metrics = calculate_backtest_metrics(records);
    let buckets: Vec<BucketReport> = metrics
        .calibration_buckets
        .iter()
        .filter(|b| b.predictions > 0)
        .map(|b| {
            let diff = b.actual_win_rate - b.expected_win_rate;
            BucketReport {
                range: b.range,
                predictions: b.predictions,
                expected_win_rate: b.expected_win_rate,
                actual_win_rate: b.actual_win_rate,
                diff,
                flag: ConfidenceFlag::from_diff(diff),
            }
        })
        .collect();

    let over = buckets
        .iter()
        .filter(|b| b.flag == ConfidenceFlag::Overconfident)
        .count();
    let under = buckets
        .iter()
        .filter(|b| b.flag == ConfidenceFlag::Underconfident)
        .count();
    let summary = format!(
        "{} settled predictions, ECE {:.1}%, {} overconfident and {} underconfident buckets",
        settled,
        metrics.calibration_error * 100.0,
        over,
        under
    );

    Report::Ready(CalibrationReport {
        settled,
        calibration_error: metrics.calibration_error,
        buckets,
        summary,
    })
}

pub fn generate_performance_report(records: &[PredictionRecord]) -> Report<PerformanceReport> {
    let settled = settled_count(records);
    if settled < MIN_PERFORMANCE_SAMPLES {
        warn!(
            "Performance report needs {} settled predictions, have {}",
            MIN_PERFORMANCE_SAMPLES, settled
        );
        return Report::InsufficientData {
            settled,
            required: MIN_PERFORMANCE_SAMPLES,
        };
    }

    let metrics = calculate_backtest_metrics(records);
    let clv = calculate_clv(records);
    let vs_market = (metrics.market_predictions > 0).then_some(metrics.brier_score_vs_market);

    let mut summary = format!(
        "{} settled predictions, Brier {:.4}, log loss {:.4}",
        settled, metrics.brier_score, metrics.log_loss
    );
    if let Some(diff) = vs_market {
        let verdict = if diff < 0.0 { "beats" } else { "trails" };
        summary.push_str(&format!(", {} the market by {:.4}", verdict, diff.abs()));
    }
    if clv.records > 0 {
        summary.push_str(&format!(", mean CLV {:+.2}pp", clv.mean_clv * 100.0));
    }

    Report::Ready(PerformanceReport {
        settled,
        brier_score: metrics.brier_score,
        log_loss: metrics.log_loss,
        brier_score_vs_market: vs_market,
        accuracy_at_threshold: metrics.accuracy_at_threshold,
        by_league: metrics.by_league,
        clv,
        summary,
    })
}
