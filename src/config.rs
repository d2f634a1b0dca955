use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use accuracy_engine::db::models::{DataQuality, Sport};

/// Pre-match accuracy engine: baseline predictions, prediction ledger and backtests
#[derive(Parser, Debug, Clone)]
#[command(name = "accuracy-engine", version, about)]
pub struct Config {
    /// SQLite database path (":memory:" for a throwaway ledger)
    #[arg(long, env = "DATABASE_PATH", default_value = "predictions.db", global = true)]
    pub database_path: String,

    /// Number of equal-width calibration buckets in backtest metrics
    #[arg(long, env = "CALIBRATION_BUCKETS", default_value = "10", global = true)]
    pub calibration_buckets: usize,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the baseline model on a JSON match input ("-" reads stdin)
    Predict {
        #[arg(long, default_value = "-")]
        input: String,

        /// Also store the prediction in the ledger (input must carry a fixture)
        #[arg(long, default_value = "false")]
        log: bool,
    },

    /// Attach the final score (and optional closing odds) to a logged prediction
    Settle {
        #[arg(long)]
        match_id: String,
        #[arg(long)]
        home_score: u32,
        #[arg(long)]
        away_score: u32,
        #[arg(long)]
        closing_home: Option<f64>,
        #[arg(long)]
        closing_away: Option<f64>,
        #[arg(long)]
        closing_draw: Option<f64>,
    },

    /// Backtest metrics and reports over the ledger
    Report {
        #[arg(long, value_enum)]
        sport: Option<Sport>,
        /// Case-insensitive league substring
        #[arg(long)]
        league: Option<String>,
        /// First kickoff date (inclusive, YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last kickoff date (inclusive, YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long, value_enum)]
        min_quality: Option<DataQuality>,
    },

    /// Delete predictions older than the given age
    Prune {
        #[arg(long, env = "PRUNE_MAX_AGE_DAYS", default_value = "365")]
        max_age_days: i64,
    },

    /// Seed the ledger with a synthetic season and report on it
    Simulate {
        #[arg(long, value_enum, default_value = "soccer")]
        sport: Sport,
        #[arg(long, default_value = "500")]
        matches: usize,
        #[arg(long, default_value = "16")]
        teams: usize,
        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(1..=100).contains(&self.calibration_buckets) {
            anyhow::bail!("calibration_buckets must be between 1 and 100");
        }
        match &self.command {
            Command::Settle {
                closing_home,
                closing_away,
                closing_draw,
                ..
            } => {
                if closing_home.is_some() != closing_away.is_some() {
                    anyhow::bail!("closing odds need both --closing-home and --closing-away");
                }
                if closing_draw.is_some() && closing_home.is_none() {
                    anyhow::bail!("--closing-draw given without home/away closing odds");
                }
                for odds in [closing_home, closing_away, closing_draw].into_iter().flatten() {
                    if *odds <= 1.0 {
                        anyhow::bail!("closing odds must be decimal prices above 1.0");
                    }
                }
            }
            Command::Report {
                from: Some(from),
                to: Some(to),
                ..
            } if from > to => {
                anyhow::bail!("--from ({from}) is after --to ({to})");
            }
            Command::Prune { max_age_days } if *max_age_days <= 0 => {
                anyhow::bail!("max_age_days must be positive");
            }
            Command::Simulate { matches, teams, .. } => {
                if *matches == 0 {
                    anyhow::bail!("simulate needs at least one match");
                }
                if *teams < 2 {
                    anyhow::bail!("simulate needs at least two teams");
                }
            }
            _ => {}
        }
        Ok(())
    }
}
