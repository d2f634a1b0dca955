//! Prediction ledger.
//!
//! Every prediction is logged once as an immutable snapshot, then settled at
//! most once when the final score is known. Backtests only ever read.
//!
//! [`PredictionStore`] is the storage seam: [`PredictionLedger`] keeps an
//! append-only arena plus an index of unsettled records per match, and
//! [`crate::db::Database`] persists the same contract in SQLite.

pub mod filter;

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::db::models::{ClosingOdds, FinalScore, MatchResult, NewPrediction, Outcome, PredictionRecord};

pub use filter::PredictionFilter;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("snapshot (de)serialization failed: {0}")]
    Snapshot(#[from] serde_json::Error),
    #[error("ledger lock poisoned")]
    LockPoisoned,
    #[error("corrupt value {value:?} in column {column}")]
    Corrupt { column: &'static str, value: String },
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Storage contract for prediction records.
///
/// Implementations must guarantee that a record is settled at most once and
/// that `settle_prediction` always picks the earliest-logged unsettled record
/// for the match.
pub trait PredictionStore {
    /// Append a new record stamped with `created_at`.
    fn log_prediction_at(
        &self,
        new: NewPrediction,
        created_at: DateTime<Utc>,
    ) -> LedgerResult<PredictionRecord>;

    /// Settle the first unsettled record for `match_id`. `Ok(None)` means
    /// there was nothing left to settle.
    fn settle_prediction_at(
        &self,
        match_id: &str,
        score: FinalScore,
        closing_odds: Option<ClosingOdds>,
        settled_at: DateTime<Utc>,
    ) -> LedgerResult<Option<PredictionRecord>>;

    /// All records for a match, oldest first.
    fn find_by_match(&self, match_id: &str) -> LedgerResult<Vec<PredictionRecord>>;

    /// Every record, oldest first.
    fn all_predictions(&self) -> LedgerResult<Vec<PredictionRecord>>;

    /// Remove records created strictly before `cutoff`; returns how many went.
    fn prune_old_predictions(&self, cutoff: DateTime<Utc>) -> LedgerResult<usize>;

    fn log_prediction(&self, new: NewPrediction) -> LedgerResult<PredictionRecord> {
        self.log_prediction_at(new, Utc::now())
    }

    fn settle_prediction(
        &self,
        match_id: &str,
        score: FinalScore,
        closing_odds: Option<ClosingOdds>,
    ) -> LedgerResult<Option<PredictionRecord>> {
        self.settle_prediction_at(match_id, score, closing_odds, Utc::now())
    }

    fn get_filtered_predictions(&self, filter: &PredictionFilter) -> LedgerResult<Vec<PredictionRecord>> {
        let all = self.all_predictions()?;
        Ok(filter.apply(&all))
    }
}

/// `{match_id}_{millis}`, with a numeric suffix if that is already taken.
pub(crate) fn unique_prediction_id(
    match_id: &str,
    created_at: DateTime<Utc>,
    mut taken: impl FnMut(&str) -> LedgerResult<bool>,
) -> LedgerResult<String> {
    let base = format!("{}_{}", match_id, created_at.timestamp_millis());
    if !taken(&base)? {
        return Ok(base);
    }
    let mut n = 1u32;
    loop {
        let candidate = format!("{base}_{n}");
        if !taken(&candidate)? {
            return Ok(candidate);
        }
        n += 1;
    }
}

pub(crate) fn match_result(score: FinalScore, settled_at: DateTime<Utc>) -> MatchResult {
    MatchResult {
        home_score: score.home_score,
        away_score: score.away_score,
        outcome: Outcome::from_score(score.home_score, score.away_score),
        settled_at,
    }
}

#[derive(Default)]
struct LedgerState {
    next_seq: u64,
    /// Append-only arena keyed by insertion sequence
    records: BTreeMap<u64, PredictionRecord>,
    ids: HashMap<String, u64>,
    /// match_id → unsettled sequences, oldest first
    unsettled: HashMap<String, BTreeSet<u64>>,
}

/// In-memory store. Cheap, process-local, not durable.
#[derive(Default)]
pub struct PredictionLedger {
    state: Mutex<LedgerState>,
}

impl PredictionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> LedgerResult<MutexGuard<'_, LedgerState>> {
        self.state.lock().map_err(|_| LedgerError::LockPoisoned)
    }

    pub fn len(&self) -> LedgerResult<usize> {
        Ok(self.lock()?.records.len())
    }

    pub fn is_empty(&self) -> LedgerResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl PredictionStore for PredictionLedger {
    fn log_prediction_at(
        &self,
        new: NewPrediction,
        created_at: DateTime<Utc>,
    ) -> LedgerResult<PredictionRecord> {
        let mut state = self.lock()?;
        let id = unique_prediction_id(&new.match_id, created_at, |candidate| {
            Ok(state.ids.contains_key(candidate))
        })?;

        let record = PredictionRecord::from_new(id.clone(), new, created_at);
        let seq = state.next_seq;
        state.next_seq += 1;
        state.ids.insert(id, seq);
        state
            .unsettled
            .entry(record.match_id.clone())
            .or_default()
            .insert(seq);
        state.records.insert(seq, record.clone());

        info!(
            "Logged prediction {} ({}: {} vs {}, H {:.3} A {:.3})",
            record.id,
            record.sport,
            record.home_team,
            record.away_team,
            record.calibrated_probabilities.home,
            record.calibrated_probabilities.away
        );
        Ok(record)
    }

    fn settle_prediction_at(
        &self,
        match_id: &str,
        score: FinalScore,
        closing_odds: Option<ClosingOdds>,
        settled_at: DateTime<Utc>,
    ) -> LedgerResult<Option<PredictionRecord>> {
        let mut state = self.lock()?;
        let state = &mut *state;

        let Some(pending) = state.unsettled.get_mut(match_id) else {
            debug!("No unsettled prediction for match {}", match_id);
            return Ok(None);
        };
        let Some(seq) = pending.pop_first() else {
            debug!("No unsettled prediction for match {}", match_id);
            return Ok(None);
        };
        if pending.is_empty() {
            state.unsettled.remove(match_id);
        }

        let Some(record) = state.records.get_mut(&seq) else {
            return Ok(None);
        };
        record.result = Some(match_result(score, settled_at));
        record.closing_odds = closing_odds;

        info!(
            "Settled prediction {}: {}-{} ({})",
            record.id,
            score.home_score,
            score.away_score,
            record.result.as_ref().map(|r| r.outcome.as_str()).unwrap_or("?")
        );
        Ok(Some(record.clone()))
    }

    fn find_by_match(&self, match_id: &str) -> LedgerResult<Vec<PredictionRecord>> {
        let state = self.lock()?;
        Ok(state
            .records
            .values()
            .filter(|r| r.match_id == match_id)
            .cloned()
            .collect())
    }

    fn all_predictions(&self) -> LedgerResult<Vec<PredictionRecord>> {
        let state = self.lock()?;
        Ok(state.records.values().cloned().collect())
    }

    fn prune_old_predictions(&self, cutoff: DateTime<Utc>) -> LedgerResult<usize> {
        let mut state = self.lock()?;
        let state = &mut *state;

        let expired: Vec<u64> = state
            .records
            .iter()
            .filter(|(_, r)| r.created_at < cutoff)
            .map(|(seq, _)| *seq)
            .collect();

        for seq in &expired {
            if let Some(record) = state.records.remove(seq) {
                state.ids.remove(&record.id);
                if let Some(pending) = state.unsettled.get_mut(&record.match_id) {
                    pending.remove(seq);
                    if pending.is_empty() {
                        state.unsettled.remove(&record.match_id);
                    }
                }
            }
        }

        if !expired.is_empty() {
            info!("Pruned {} predictions created before {}", expired.len(), cutoff);
        }
        Ok(expired.len())
    }
}


#[cfg(test)]
mod tests {
    use super::testutil::{kickoff, new_prediction};
    use super::*;
    use crate::db::models::{DataQuality, Sport};
    use chrono::Duration;

    fn score(home_score: u32, away_score: u32) -> FinalScore {
        FinalScore {
            home_score,
            away_score,
        }
    }

    #[test]
    fn log_creates_unsettled_record() {
        let ledger = PredictionLedger::new();
        let r = ledger
            .log_prediction(new_prediction("m1", Sport::Soccer, "EPL"))
            .unwrap();
        assert!(r.id.starts_with("m1_"));
        assert!(!r.is_settled());
        assert_eq!(ledger.len().unwrap(), 1);
    }

    #[test]
    fn ids_are_unique_for_same_instant() {
        let ledger = PredictionLedger::new();
        let at = kickoff();
        let a = ledger
            .log_prediction_at(new_prediction("m1", Sport::Soccer, "EPL"), at)
            .unwrap();
        let b = ledger
            .log_prediction_at(new_prediction("m1", Sport::Soccer, "EPL"), at)
            .unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(b.id, format!("{}_1", a.id));
    }

    #[test]
    fn settle_derives_outcome_from_score() {
        let ledger = PredictionLedger::new();
        for (id, (h, a), expected) in [
            ("m1", (2, 1), Outcome::Home),
            ("m2", (1, 3), Outcome::Away),
            ("m3", (1, 1), Outcome::Draw),
        ] {
            ledger
                .log_prediction(new_prediction(id, Sport::Soccer, "EPL"))
                .unwrap();
            let settled = ledger.settle_prediction(id, score(h, a), None).unwrap().unwrap();
            let result = settled.result.unwrap();
            assert_eq!(result.outcome, expected);
            assert_eq!((result.home_score, result.away_score), (h, a));
        }
    }

    #[test]
    fn settling_twice_is_a_no_op() {
        let ledger = PredictionLedger::new();
        ledger
            .log_prediction(new_prediction("m1", Sport::Soccer, "EPL"))
            .unwrap();
        let first = ledger.settle_prediction("m1", score(2, 1), None).unwrap();
        assert!(first.is_some());
        let second = ledger.settle_prediction("m1", score(0, 0), None).unwrap();
        assert!(second.is_none());

        let stored = ledger.find_by_match("m1").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].result, first.unwrap().result);
        assert_eq!(stored[0].result.as_ref().unwrap().outcome, Outcome::Home);
    }

    #[test]
    fn settle_unknown_match_returns_none() {
        let ledger = PredictionLedger::new();
        assert!(ledger.settle_prediction("nope", score(1, 0), None).unwrap().is_none());
    }

    #[test]
    fn settle_picks_first_unsettled_record() {
        let ledger = PredictionLedger::new();
        let t0 = kickoff() - Duration::hours(5);
        let first = ledger
            .log_prediction_at(new_prediction("m1", Sport::Soccer, "EPL"), t0)
            .unwrap();
        let second = ledger
            .log_prediction_at(new_prediction("m1", Sport::Soccer, "EPL"), t0 + Duration::hours(1))
            .unwrap();

        let s1 = ledger.settle_prediction("m1", score(1, 0), None).unwrap().unwrap();
        assert_eq!(s1.id, first.id);
        let s2 = ledger.settle_prediction("m1", score(1, 0), None).unwrap().unwrap();
        assert_eq!(s2.id, second.id);
        assert!(ledger.settle_prediction("m1", score(1, 0), None).unwrap().is_none());
    }

    #[test]
    fn settle_attaches_closing_odds_without_touching_snapshot() {
        let ledger = PredictionLedger::new();
        let logged = ledger
            .log_prediction(new_prediction("m1", Sport::Soccer, "EPL"))
            .unwrap();
        let closing = ClosingOdds {
            home: 1.9,
            away: 4.0,
            draw: Some(3.5),
            captured_at: kickoff(),
        };
        let settled = ledger
            .settle_prediction("m1", score(0, 2), Some(closing.clone()))
            .unwrap()
            .unwrap();
        assert_eq!(settled.closing_odds, Some(closing));
        assert_eq!(settled.raw_probabilities, logged.raw_probabilities);
        assert_eq!(settled.calibrated_probabilities, logged.calibrated_probabilities);
        assert_eq!(settled.created_at, logged.created_at);
    }

    #[test]
    fn prune_removes_only_strictly_older_records() {
        let ledger = PredictionLedger::new();
        let cutoff = kickoff();
        ledger
            .log_prediction_at(new_prediction("old", Sport::Soccer, "EPL"), cutoff - Duration::days(1))
            .unwrap();
        ledger
            .log_prediction_at(new_prediction("edge", Sport::Soccer, "EPL"), cutoff)
            .unwrap();
        ledger
            .log_prediction_at(new_prediction("new", Sport::Soccer, "EPL"), cutoff + Duration::days(1))
            .unwrap();

        assert_eq!(ledger.prune_old_predictions(cutoff).unwrap(), 1);
        assert_eq!(ledger.len().unwrap(), 2);
        assert!(ledger.find_by_match("old").unwrap().is_empty());
        // pruned records are gone from the settlement index too
        assert!(ledger.settle_prediction("old", score(1, 0), None).unwrap().is_none());
        assert!(ledger.settle_prediction("edge", score(1, 0), None).unwrap().is_some());
    }

    #[test]
    fn filtered_predictions() {
        let ledger = PredictionLedger::new();
        ledger
            .log_prediction(new_prediction("m1", Sport::Soccer, "Premier League"))
            .unwrap();
        let mut nba = new_prediction("m2", Sport::Basketball, "NBA");
        nba.data_quality = DataQuality::Low;
        ledger.log_prediction(nba).unwrap();
        ledger.settle_prediction("m1", score(1, 0), None).unwrap();

        let settled = ledger.get_filtered_predictions(&PredictionFilter::settled()).unwrap();
        assert_eq!(settled.len(), 1);
        assert_eq!(settled[0].match_id, "m1");

        let quality = ledger
            .get_filtered_predictions(&PredictionFilter::new().min_data_quality(DataQuality::Medium))
            .unwrap();
        assert_eq!(quality.len(), 1);
        assert_eq!(quality[0].sport, Sport::Soccer);
    }
}
