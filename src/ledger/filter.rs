use chrono::{DateTime, Utc};

use crate::db::models::{DataQuality, PredictionRecord, Sport};

/// Selection over ledger records. Every unset field matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionFilter {
    pub sport: Option<Sport>,
    /// Case-insensitive substring of the league name
    pub league: Option<String>,
    /// Inclusive lower bound on kickoff
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on kickoff
    pub to: Option<DateTime<Utc>>,
    pub settled: Option<bool>,
    pub min_data_quality: Option<DataQuality>,
}

impl PredictionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only settled records; what every backtest starts from.
    pub fn settled() -> Self {
        PredictionFilter {
            settled: Some(true),
            ..Self::default()
        }
    }

    pub fn sport(mut self, sport: Sport) -> Self {
        self.sport = Some(sport);
        self
    }

    pub fn league(mut self, league: impl Into<String>) -> Self {
        self.league = Some(league.into());
        self
    }

    pub fn between(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn min_data_quality(mut self, quality: DataQuality) -> Self {
        self.min_data_quality = Some(quality);
        self
    }

    pub fn matches(&self, record: &PredictionRecord) -> bool {
        if let Some(sport) = self.sport {
            if record.sport != sport {
                return false;
            }
        }
        if let Some(league) = &self.league {
            if !record.league.to_lowercase().contains(&league.to_lowercase()) {
                return false;
            }
        }
        if let Some(from) = self.from {
            if record.kickoff < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if record.kickoff > to {
                return false;
            }
        }
        if let Some(settled) = self.settled {
            if record.is_settled() != settled {
                return false;
            }
        }
        if let Some(min) = self.min_data_quality {
            if record.data_quality < min {
                return false;
            }
        }
        true
    }

    pub fn apply<'a>(&self, records: impl IntoIterator<Item = &'a PredictionRecord>) -> Vec<PredictionRecord> {
        records
            .into_iter()
            .filter(|r| self.matches(r))
            .cloned()
            .collect()
    }
}
