//! Closing line value: how far the model's pre-match home probability sat
//! from the de-vigged closing market. Positive means the market moved
//! toward the model.

use serde::{Deserialize, Serialize};

use crate::db::models::PredictionRecord;
use crate::odds::devig;

/// Histogram edges in probability points: `<-5%`, `-5..-2%`, `-2..+2%`, `+2..+5%`, `>+5%`
const BUCKET_EDGES: [(f64, f64); 5] = [
    (f64::NEG_INFINITY, -0.05),
    (-0.05, -0.02),
    (-0.02, 0.02),
    (0.02, 0.05),
    (0.05, f64::INFINITY),
];
const BUCKET_LABELS: [&str; 5] = ["<-5%", "-5% to -2%", "-2% to +2%", "+2% to +5%", ">+5%"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClvBucket {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClvSummary {
    /// Settled records with usable closing odds
    pub records: usize,
    pub mean_clv: f64,
    pub positive_share: f64,
    pub buckets: Vec<ClvBucket>,
}

/// `None` when the record has no closing odds or they cannot be de-vigged.
pub fn closing_line_value(record: &PredictionRecord) -> Option<f64> {
    let closing = record.closing_odds.as_ref()?;
    let market = devig(closing.home, closing.away, closing.draw)?;
    Some(record.calibrated_probabilities.home - market.home)
}

fn bucket_index(clv: f64) -> usize {
    BUCKET_EDGES
        .iter()
        .position(|&(lo, hi)| clv >= lo && clv < hi)
        .unwrap_or(BUCKET_EDGES.len() - 1)
}

pub fn calculate_clv(records: &[PredictionRecord]) -> ClvSummary {
    let values: Vec<f64> = records
        .iter()
        .filter(|r| r.is_settled())
        .filter_map(closing_line_value)
        .collect();

    let mut counts = [0usize; 5];
    for v in &values {
        counts[bucket_index(*v)] += 1;
    }

    let n = values.len();
    let (mean_clv, positive_share) = if n == 0 {
        (0.0, 0.0)
    } else {
        (
            values.iter().sum::<f64>() / n as f64,
            values.iter().filter(|v| **v > 0.0).count() as f64 / n as f64,
        )
    };

    ClvSummary {
        records: n,
        mean_clv,
        positive_share,
        buckets: BUCKET_LABELS
            .iter()
            .zip(counts)
            .map(|(label, count)| ClvBucket {
                label: label.to_string(),
                count,
            })
            .collect(),
    }
}
