use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sports the engine has a baseline model for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Sport {
    Soccer,
    Basketball,
    /// American football
    Football,
    Hockey,
}

impl Sport {
    pub const ALL: [Sport; 4] = [
        Sport::Soccer,
        Sport::Basketball,
        Sport::Football,
        Sport::Hockey,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sport::Soccer => "soccer",
            Sport::Basketball => "basketball",
            Sport::Football => "football",
            Sport::Hockey => "hockey",
        }
    }

    /// Whether a regulation result can be a tie.
    pub fn supports_draw(&self) -> bool {
        matches!(self, Sport::Soccer | Sport::Football)
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "soccer" | "football_eu" => Ok(Sport::Soccer),
            "basketball" | "nba" => Ok(Sport::Basketball),
            "football" | "american_football" | "nfl" => Ok(Sport::Football),
            "hockey" | "ice_hockey" | "nhl" => Ok(Sport::Hockey),
            other => Err(format!("unknown sport: {other}")),
        }
    }
}

/// Full-time result from the home side's perspective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Home,
    Away,
    Draw,
}

impl Outcome {
    pub fn from_score(home_score: u32, away_score: u32) -> Self {
        if home_score > away_score {
            Outcome::Home
        } else if away_score > home_score {
            Outcome::Away
        } else {
            Outcome::Draw
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Home => "home",
            Outcome::Away => "away",
            Outcome::Draw => "draw",
        }
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "home" => Ok(Outcome::Home),
            "away" => Ok(Outcome::Away),
            "draw" => Ok(Outcome::Draw),
            other => Err(format!("unknown outcome: {other}")),
        }
    }
}

/// How complete the statistical inputs were when the prediction was made.
/// Ordered: `Low < Medium < High`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum DataQuality {
    Low,
    Medium,
    High,
}

impl DataQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataQuality::Low => "low",
            DataQuality::Medium => "medium",
            DataQuality::High => "high",
        }
    }
}

impl FromStr for DataQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(DataQuality::Low),
            "medium" => Ok(DataQuality::Medium),
            "high" => Ok(DataQuality::High),
            other => Err(format!("unknown data quality: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Volatility {
    Low,
    Medium,
    High,
}

impl Volatility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Volatility::Low => "low",
            Volatility::Medium => "medium",
            Volatility::High => "high",
        }
    }
}

impl FromStr for Volatility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Volatility::Low),
            "medium" => Ok(Volatility::Medium),
            "high" => Ok(Volatility::High),
            other => Err(format!("unknown volatility: {other}")),
        }
    }
}

/// Model output before any calibration layer has touched it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawProbabilities {
    pub home: f64,
    pub away: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draw: Option<f64>,
    /// Model identifier, e.g. "dixon-coles" or "hockey_v2_elo_conservative"
    pub method: String,
}

impl RawProbabilities {
    pub fn total(&self) -> f64 {
        self.home + self.away + self.draw.unwrap_or(0.0)
    }
}

/// Probabilities after the external calibration layer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibratedProbabilities {
    pub home: f64,
    pub away: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draw: Option<f64>,
}

impl CalibratedProbabilities {
    /// Probability assigned to a given outcome (0 for a draw the model never priced).
    pub fn for_outcome(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Home => self.home,
            Outcome::Away => self.away,
            Outcome::Draw => self.draw.unwrap_or(0.0),
        }
    }

    /// Highest-probability outcome and its probability. Ties favour home, then away.
    pub fn favourite(&self) -> (Outcome, f64) {
        let mut best = (Outcome::Home, self.home);
        if self.away > best.1 {
            best = (Outcome::Away, self.away);
        }
        if let Some(draw) = self.draw {
            if draw > best.1 {
                best = (Outcome::Draw, draw);
            }
        }
        best
    }
}

impl From<&RawProbabilities> for CalibratedProbabilities {
    fn from(raw: &RawProbabilities) -> Self {
        CalibratedProbabilities {
            home: raw.home,
            away: raw.away,
            draw: raw.draw,
        }
    }
}

/// De-vigged market view at prediction time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketProbabilities {
    pub home: f64,
    pub away: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draw: Option<f64>,
    /// Sum of raw implied probabilities (1.0 = no margin)
    pub overround: f64,
}

/// Edge of the model over the market, per outcome
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeResult {
    pub home: f64,
    pub away: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draw: Option<f64>,
    /// Outcome with the largest positive edge, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_outcome: Option<Outcome>,
}

/// Decimal odds for a match
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchOdds {
    pub home: f64,
    pub away: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draw: Option<f64>,
}

/// Final score as reported after the match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalScore {
    pub home_score: u32,
    pub away_score: u32,
}

/// Settled result attached to a prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub home_score: u32,
    pub away_score: u32,
    pub outcome: Outcome,
    pub settled_at: DateTime<Utc>,
}

/// Last market price before kickoff (decimal odds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosingOdds {
    pub home: f64,
    pub away: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draw: Option<f64>,
    pub captured_at: DateTime<Utc>,
}

/// Everything the caller supplies when logging a prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPrediction {
    pub match_id: String,
    pub sport: Sport,
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    pub kickoff: DateTime<Utc>,
    pub raw_probabilities: RawProbabilities,
    pub calibrated_probabilities: CalibratedProbabilities,
    pub market_probabilities: Option<MarketProbabilities>,
    pub edge: Option<EdgeResult>,
    pub data_quality: DataQuality,
    pub volatility: Volatility,
}

/// A logged prediction. Snapshot fields never change after creation; `result`
/// and `closing_odds` are written once, at settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    /// `{match_id}_{created_at millis}`, suffixed on collision
    pub id: String,
    pub match_id: String,
    pub sport: Sport,
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    pub kickoff: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub raw_probabilities: RawProbabilities,
    pub calibrated_probabilities: CalibratedProbabilities,
    pub market_probabilities: Option<MarketProbabilities>,
    pub edge: Option<EdgeResult>,
    pub data_quality: DataQuality,
    pub volatility: Volatility,
    pub result: Option<MatchResult>,
    pub closing_odds: Option<ClosingOdds>,
}

impl PredictionRecord {
    pub fn from_new(id: String, new: NewPrediction, created_at: DateTime<Utc>) -> Self {
        PredictionRecord {
            id,
            match_id: new.match_id,
            sport: new.sport,
            league: new.league,
            home_team: new.home_team,
            away_team: new.away_team,
            kickoff: new.kickoff,
            created_at,
            raw_probabilities: new.raw_probabilities,
            calibrated_probabilities: new.calibrated_probabilities,
            market_probabilities: new.market_probabilities,
            edge: new.edge,
            data_quality: new.data_quality,
            volatility: new.volatility,
            result: None,
            closing_odds: None,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.result.is_some()
    }
}
