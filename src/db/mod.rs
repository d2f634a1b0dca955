use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

pub mod models;
use models::*;

use crate::ledger::{match_result, unique_prediction_id, LedgerError, LedgerResult, PredictionStore};

/// Durable prediction ledger (single connection behind a mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> LedgerResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::from_connection(conn)
    }

    /// Private in-memory database, mostly for tests and dry runs
    pub fn open_in_memory() -> LedgerResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> LedgerResult<Self> {
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> LedgerResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    fn lock(&self) -> LedgerResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| LedgerError::LockPoisoned)
    }

    // ── Stats ─────────────────────────────────────────────────────────────────

    /// Record counts for a quick health check of the ledger
    pub fn get_stats(&self) -> LedgerResult<LedgerStats> {
        let conn = self.lock()?;
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM predictions", [], |r| r.get(0))?;
        let settled: i64 = conn.query_row(
            "SELECT COUNT(*) FROM predictions WHERE settled = 1",
            [],
            |r| r.get(0),
        )?;
        let with_closing_odds: i64 = conn.query_row(
            "SELECT COUNT(*) FROM predictions WHERE closing_odds IS NOT NULL",
            [],
            |r| r.get(0),
        )?;
        let oldest: Option<DateTime<Utc>> = conn
            .query_row("SELECT MIN(created_at) FROM predictions", [], |r| r.get(0))
            .optional()?
            .flatten();
        Ok(LedgerStats {
            total_predictions: total,
            settled_predictions: settled,
            unsettled_predictions: total - settled,
            with_closing_odds,
            oldest_prediction: oldest,
        })
    }
}

impl PredictionStore for Database {
    fn log_prediction_at(
        &self,
        new: NewPrediction,
        created_at: DateTime<Utc>,
    ) -> LedgerResult<PredictionRecord> {
        let conn = self.lock()?;
        let id = unique_prediction_id(&new.match_id, created_at, |candidate| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM predictions WHERE id = ?1)",
                params![candidate],
                |r| r.get(0),
            )?;
            Ok(exists)
        })?;
        let record = PredictionRecord::from_new(id, new, created_at);

        conn.execute(
            "INSERT INTO predictions (
                id, match_id, sport, league, home_team, away_team, kickoff,
                created_at, created_ms, raw_probabilities, calibrated_probabilities,
                market_probabilities, edge, data_quality, volatility, settled
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,0)",
            params![
                record.id,
                record.match_id,
                record.sport.as_str(),
                record.league,
                record.home_team,
                record.away_team,
                record.kickoff,
                record.created_at,
                record.created_at.timestamp_millis(),
                serde_json::to_string(&record.raw_probabilities)?,
                serde_json::to_string(&record.calibrated_probabilities)?,
                record
                    .market_probabilities
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                record.edge.as_ref().map(serde_json::to_string).transpose()?,
                record.data_quality.as_str(),
                record.volatility.as_str(),
            ],
        )?;

        info!(
            "Stored prediction {} ({}: {} vs {})",
            record.id, record.sport, record.home_team, record.away_team
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
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let seq: Option<i64> = tx
            .query_row(
                "SELECT seq FROM predictions
                 WHERE match_id = ?1 AND settled = 0
                 ORDER BY seq LIMIT 1",
                params![match_id],
                |r| r.get(0),
            )
            .optional()?;
        let Some(seq) = seq else {
            debug!("No unsettled prediction for match {}", match_id);
            return Ok(None);
        };

        let result = match_result(score, settled_at);
        let updated = tx.execute(
            "UPDATE predictions
             SET settled = 1, home_score = ?1, away_score = ?2, outcome = ?3,
                 settled_at = ?4, closing_odds = ?5
             WHERE seq = ?6 AND settled = 0",
            params![
                result.home_score,
                result.away_score,
                result.outcome.as_str(),
                result.settled_at,
                closing_odds.as_ref().map(serde_json::to_string).transpose()?,
                seq,
            ],
        )?;
        if updated != 1 {
            return Ok(None);
        }

        let record = tx
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE seq = ?1"),
                params![seq],
                map_stored_row,
            )?
            .into_record()?;
        tx.commit()?;

        info!(
            "Settled prediction {}: {}-{} ({})",
            record.id,
            score.home_score,
            score.away_score,
            result.outcome.as_str()
        );
        Ok(Some(record))
    }

    fn find_by_match(&self, match_id: &str) -> LedgerResult<Vec<PredictionRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} WHERE match_id = ?1 ORDER BY seq"))?;
        let rows = stmt
            .query_map(params![match_id], map_stored_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(StoredRow::into_record).collect()
    }

    fn all_predictions(&self) -> LedgerResult<Vec<PredictionRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY seq"))?;
        let rows = stmt
            .query_map([], map_stored_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(StoredRow::into_record).collect()
    }

    fn prune_old_predictions(&self, cutoff: DateTime<Utc>) -> LedgerResult<usize> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM predictions WHERE created_ms < ?1",
            params![cutoff.timestamp_millis()],
        )?;
        if removed > 0 {
            info!("Pruned {} predictions created before {}", removed, cutoff);
        }
        Ok(removed)
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

const SELECT_COLUMNS: &str = "SELECT id, match_id, sport, league, home_team, away_team,
        kickoff, created_at, raw_probabilities, calibrated_probabilities,
        market_probabilities, edge, data_quality, volatility,
        home_score, away_score, outcome, settled_at, closing_odds
 FROM predictions";

/// Row as stored; enum and JSON columns are decoded in `into_record`
struct StoredRow {
    id: String,
    match_id: String,
    sport: String,
    league: String,
    home_team: String,
    away_team: String,
    kickoff: DateTime<Utc>,
    created_at: DateTime<Utc>,
    raw_probabilities: String,
    calibrated_probabilities: String,
    market_probabilities: Option<String>,
    edge: Option<String>,
    data_quality: String,
    volatility: String,
    home_score: Option<u32>,
    away_score: Option<u32>,
    outcome: Option<String>,
    settled_at: Option<DateTime<Utc>>,
    closing_odds: Option<String>,
}

fn map_stored_row(row: &rusqlite::Row) -> rusqlite::Result<StoredRow> {
    Ok(StoredRow {
        id: row.get(0)?,
        match_id: row.get(1)?,
        sport: row.get(2)?,
        league: row.get(3)?,
        home_team: row.get(4)?,
        away_team: row.get(5)?,
        kickoff: row.get(6)?,
        created_at: row.get(7)?,
        raw_probabilities: row.get(8)?,
        calibrated_probabilities: row.get(9)?,
        market_probabilities: row.get(10)?,
        edge: row.get(11)?,
        data_quality: row.get(12)?,
        volatility: row.get(13)?,
        home_score: row.get(14)?,
        away_score: row.get(15)?,
        outcome: row.get(16)?,
        settled_at: row.get(17)?,
        closing_odds: row.get(18)?,
    })
}

fn parse_column<T: std::str::FromStr>(column: &'static str, value: &str) -> LedgerResult<T> {
    value.parse().map_err(|_| LedgerError::Corrupt {
        column,
        value: value.to_string(),
    })
}

impl StoredRow {
    fn into_record(self) -> LedgerResult<PredictionRecord> {
        let result = match (self.home_score, self.away_score, self.outcome, self.settled_at) {
            (Some(home_score), Some(away_score), Some(outcome), Some(settled_at)) => Some(MatchResult {
                home_score,
                away_score,
                outcome: parse_column("outcome", &outcome)?,
                settled_at,
            }),
            _ => None,
        };

        Ok(PredictionRecord {
            sport: parse_column("sport", &self.sport)?,
            data_quality: parse_column("data_quality", &self.data_quality)?,
            volatility: parse_column("volatility", &self.volatility)?,
            raw_probabilities: serde_json::from_str(&self.raw_probabilities)?,
            calibrated_probabilities: serde_json::from_str(&self.calibrated_probabilities)?,
            market_probabilities: self
                .market_probabilities
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            edge: self.edge.as_deref().map(serde_json::from_str).transpose()?,
            closing_odds: self
                .closing_odds
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            id: self.id,
            match_id: self.match_id,
            league: self.league,
            home_team: self.home_team,
            away_team: self.away_team,
            kickoff: self.kickoff,
            created_at: self.created_at,
            result,
        })
    }
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS predictions (
    seq                      INTEGER PRIMARY KEY AUTOINCREMENT,
    id                       TEXT    NOT NULL UNIQUE,
    match_id                 TEXT    NOT NULL,
    sport                    TEXT    NOT NULL,
    league                   TEXT    NOT NULL,
    home_team                TEXT    NOT NULL,
    away_team                TEXT    NOT NULL,
    kickoff                  TEXT    NOT NULL,
    created_at               TEXT    NOT NULL,
    created_ms               INTEGER NOT NULL,
    raw_probabilities        TEXT    NOT NULL,
    calibrated_probabilities TEXT    NOT NULL,
    market_probabilities     TEXT,
    edge                     TEXT,
    data_quality             TEXT    NOT NULL,
    volatility               TEXT    NOT NULL,
    settled                  INTEGER NOT NULL DEFAULT 0,
    home_score               INTEGER,
    away_score               INTEGER,
    outcome                  TEXT,
    settled_at               TEXT,
    closing_odds             TEXT
);

CREATE INDEX IF NOT EXISTS idx_predictions_match_settled ON predictions(match_id, settled);
CREATE INDEX IF NOT EXISTS idx_predictions_created ON predictions(created_ms);
"#;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total_predictions: i64,
    pub settled_predictions: i64,
    pub unsettled_predictions: i64,
    pub with_closing_odds: i64,
    pub oldest_prediction: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::testutil::{kickoff, new_prediction};
    use crate::ledger::PredictionFilter;
    use chrono::Duration;

    fn score(home_score: u32, away_score: u32) -> FinalScore {
        FinalScore {
            home_score,
            away_score,
        }
    }

    #[test]
    fn round_trips_snapshot_through_sqlite() {
        let db = Database::open_in_memory().unwrap();
        let logged = db
            .log_prediction_at(new_prediction("m1", Sport::Soccer, "EPL"), kickoff())
            .unwrap();
        let stored = db.find_by_match("m1").unwrap();
        assert_eq!(stored, vec![logged]);
    }

    #[test]
    fn settle_once_then_none() {
        let db = Database::open_in_memory().unwrap();
        db.log_prediction(new_prediction("m1", Sport::Soccer, "EPL")).unwrap();

        let closing = ClosingOdds {
            home: 2.0,
            away: 3.8,
            draw: Some(3.4),
            captured_at: kickoff(),
        };
        let settled = db
            .settle_prediction_at("m1", score(1, 3), Some(closing.clone()), kickoff() + Duration::hours(2))
            .unwrap()
            .unwrap();
        let result = settled.result.clone().unwrap();
        assert_eq!(result.outcome, Outcome::Away);
        assert_eq!(settled.closing_odds, Some(closing));

        assert!(db.settle_prediction("m1", score(1, 3), None).unwrap().is_none());
        let stored = db.find_by_match("m1").unwrap();
        assert_eq!(stored[0].result, Some(result));
    }

    #[test]
    fn settle_follows_insertion_order() {
        let db = Database::open_in_memory().unwrap();
        let a = db
            .log_prediction_at(new_prediction("m1", Sport::Hockey, "NHL"), kickoff())
            .unwrap();
        let b = db
            .log_prediction_at(new_prediction("m1", Sport::Hockey, "NHL"), kickoff())
            .unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(db.settle_prediction("m1", score(4, 2), None).unwrap().unwrap().id, a.id);
        assert_eq!(db.settle_prediction("m1", score(4, 2), None).unwrap().unwrap().id, b.id);
    }

    #[test]
    fn prune_and_stats() {
        let db = Database::open_in_memory().unwrap();
        let cutoff = kickoff();
        db.log_prediction_at(new_prediction("old", Sport::Soccer, "EPL"), cutoff - Duration::days(90))
            .unwrap();
        db.log_prediction_at(new_prediction("new", Sport::Soccer, "EPL"), cutoff)
            .unwrap();
        db.settle_prediction("new", score(2, 2), None).unwrap();

        let stats = db.get_stats().unwrap();
        assert_eq!(stats.total_predictions, 2);
        assert_eq!(stats.settled_predictions, 1);

        assert_eq!(db.prune_old_predictions(cutoff).unwrap(), 1);
        let remaining = db.all_predictions().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].match_id, "new");
    }

    #[test]
    fn filtered_predictions_use_shared_filter() {
        let db = Database::open_in_memory().unwrap();
        db.log_prediction(new_prediction("m1", Sport::Soccer, "La Liga")).unwrap();
        db.log_prediction(new_prediction("m2", Sport::Basketball, "NBA")).unwrap();
        let soccer = db
            .get_filtered_predictions(&PredictionFilter::new().sport(Sport::Soccer))
            .unwrap();
        assert_eq!(soccer.len(), 1);
        assert_eq!(soccer[0].league, "La Liga");
    }

    #[test]
    fn corrupt_enum_is_reported() {
        let db = Database::open_in_memory().unwrap();
        db.log_prediction(new_prediction("m1", Sport::Soccer, "EPL")).unwrap();
        db.lock()
            .unwrap()
            .execute("UPDATE predictions SET sport = 'curling'", [])
            .unwrap();
        let err = db.all_predictions().unwrap_err();
        assert!(matches!(err, LedgerError::Corrupt { column: "sport", .. }));
    }
}
