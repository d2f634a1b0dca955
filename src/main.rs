use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::io::Read;
use tracing::{info, warn};

mod config;

use accuracy_engine::backtest::{
    calculate_backtest_metrics_with, generate_calibration_report, generate_performance_report,
    report::{CalibrationReport, PerformanceReport},
    BacktestMetrics, Report,
};
use accuracy_engine::db::models::{
    CalibratedProbabilities, ClosingOdds, DataQuality, EdgeResult, FinalScore, MarketProbabilities,
    MatchOdds, NewPrediction, RawProbabilities, Volatility,
};
use accuracy_engine::db::{Database, LedgerStats};
use accuracy_engine::ledger::{PredictionFilter, PredictionStore};
use accuracy_engine::model::{
    assess_data_quality, assess_volatility, estimate_expected_score, predict, ExpectedScore,
    ModelInput,
};
use accuracy_engine::odds::{devig_odds, edge_result};
use accuracy_engine::simulate::{simulate_season, SimulationConfig, SimulationSummary};
use config::{Command, Config};

/// `predict` input: the model input plus optional market odds and fixture details
#[derive(Debug, Deserialize)]
struct PredictRequest {
    #[serde(flatten)]
    input: ModelInput,
    #[serde(default)]
    odds: Option<MatchOdds>,
    #[serde(default)]
    fixture: Option<Fixture>,
}

#[derive(Debug, Deserialize)]
struct Fixture {
    match_id: String,
    league: String,
    home_team: String,
    away_team: String,
    kickoff: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct PredictResponse {
    raw_probabilities: RawProbabilities,
    expected_score: ExpectedScore,
    expected_score_display: String,
    data_quality: DataQuality,
    volatility: Volatility,
    market_probabilities: Option<MarketProbabilities>,
    edge: Option<EdgeResult>,
    logged_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ReportOutput {
    ledger: LedgerStats,
    matched_predictions: usize,
    metrics: BacktestMetrics,
    calibration: Report<CalibrationReport>,
    performance: Report<PerformanceReport>,
}

#[derive(Debug, Serialize)]
struct SimulateOutput {
    simulation: SimulationSummary,
    report: ReportOutput,
}

fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();
    config.validate()?;

    let db = Database::open(&config.database_path)
        .with_context(|| format!("opening database {}", config.database_path))?;
    info!("Database opened: {}", config.database_path);

    match &config.command {
        Command::Predict { input, log } => run_predict(&db, input, *log),
        Command::Settle {
            match_id,
            home_score,
            away_score,
            closing_home,
            closing_away,
            closing_draw,
        } => {
            let closing_odds = match (closing_home, closing_away) {
                (Some(home), Some(away)) => Some(ClosingOdds {
                    home: *home,
                    away: *away,
                    draw: *closing_draw,
                    captured_at: Utc::now(),
                }),
                _ => None,
            };
            let score = FinalScore {
                home_score: *home_score,
                away_score: *away_score,
            };
            match db.settle_prediction(match_id, score, closing_odds)? {
                Some(record) => print_json(&record),
                None => {
                    warn!("Nothing to settle for match {}", match_id);
                    print_json(&serde_json::json!({ "settled": false, "match_id": match_id }))
                }
            }
        }
        Command::Report {
            sport,
            league,
            from,
            to,
            min_quality,
        } => {
            let mut filter = PredictionFilter::new().between(
                from.map(start_of_day),
                to.map(end_of_day),
            );
            filter.sport = *sport;
            filter.league = league.clone();
            filter.min_data_quality = *min_quality;
            print_json(&build_report(&db, &filter, config.calibration_buckets)?)
        }
        Command::Prune { max_age_days } => {
            let cutoff = Utc::now() - Duration::days(*max_age_days);
            let removed = db.prune_old_predictions(cutoff)?;
            print_json(&serde_json::json!({ "removed": removed, "cutoff": cutoff }))
        }
        Command::Simulate {
            sport,
            matches,
            teams,
            seed,
        } => {
            let sim = SimulationConfig {
                teams: *teams,
                ..SimulationConfig::new(*sport, *matches, *seed)
            };
            let simulation = simulate_season(&db, &sim)?;
            let filter = PredictionFilter::new()
                .sport(*sport)
                .league(format!("Simulated {}", sport.as_str()));
            let report = build_report(&db, &filter, config.calibration_buckets)?;
            print_json(&SimulateOutput { simulation, report })
        }
    }
}

fn run_predict(db: &Database, input: &str, log: bool) -> Result<()> {
    let raw_json = if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading match input from stdin")?;
        buf
    } else {
        std::fs::read_to_string(input).with_context(|| format!("reading {input}"))?
    };
    let request: PredictRequest =
        serde_json::from_str(&raw_json).context("parsing match input JSON")?;

    let raw = predict(&request.input);
    let expected_score = estimate_expected_score(&request.input, request.odds.as_ref());
    let calibrated = CalibratedProbabilities::from(&raw);
    let market = request.odds.as_ref().and_then(devig_odds);
    let edge = market.as_ref().map(|m| edge_result(&calibrated, m));
    let data_quality = assess_data_quality(&request.input);
    let volatility = assess_volatility(request.input.sport, &raw);

    let logged_id = if log {
        let Some(fixture) = request.fixture else {
            anyhow::bail!("--log needs a \"fixture\" object in the input");
        };
        let record = db.log_prediction(NewPrediction {
            match_id: fixture.match_id,
            sport: request.input.sport,
            league: fixture.league,
            home_team: fixture.home_team,
            away_team: fixture.away_team,
            kickoff: fixture.kickoff,
            raw_probabilities: raw.clone(),
            calibrated_probabilities: calibrated,
            market_probabilities: market,
            edge,
            data_quality,
            volatility,
        })?;
        Some(record.id)
    } else {
        None
    };

    print_json(&PredictResponse {
        expected_score_display: expected_score.display(request.input.sport),
        raw_probabilities: raw,
        expected_score,
        data_quality,
        volatility,
        market_probabilities: market,
        edge,
        logged_id,
    })
}

fn build_report(db: &Database, filter: &PredictionFilter, buckets: usize) -> Result<ReportOutput> {
    let records = db.get_filtered_predictions(filter)?;
    info!("Backtesting {} matching predictions", records.len());
    Ok(ReportOutput {
        ledger: db.get_stats()?,
        matched_predictions: records.len(),
        metrics: calculate_backtest_metrics_with(&records, buckets),
        calibration: generate_calibration_report(&records),
        performance: generate_performance_report(&records),
    })
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    start_of_day(date) + Duration::days(1) - Duration::milliseconds(1)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
