//! Synthetic season generator.
//!
//! Teams get hidden attack/defense multipliers, scores are drawn from Poisson
//! rates built on them, and the baseline model only ever sees the cumulative
//! stats and form that a real caller would have. Every match is logged before
//! kickoff and settled afterwards with closing odds, so the ledger ends up in
//! the same shape a live season would leave it.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::db::models::{
    CalibratedProbabilities, ClosingOdds, FinalScore, NewPrediction, Outcome, Sport,
};
use crate::ledger::{LedgerResult, PredictionStore};
use crate::model::{
    assess_data_quality, assess_volatility, default_league_average, predict, ModelInput,
    TeamStats,
};
use crate::odds::{devig, edge_result};

const FORM_LENGTH: usize = 5;
/// Spread of the hidden team multipliers around 1.0
const STRENGTH_SPREAD: f64 = 0.3;
/// Log-scale noise between the model view and the market view
const MARKET_NOISE: f64 = 0.15;

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub sport: Sport,
    pub matches: usize,
    pub teams: usize,
    pub seed: u64,
    /// Kickoff of the first match; later matches follow every six hours
    pub start: DateTime<Utc>,
    /// Bookmaker margin baked into generated odds
    pub margin: f64,
}

impl SimulationConfig {
    pub fn new(sport: Sport, matches: usize, seed: u64) -> Self {
        SimulationConfig {
            sport,
            matches,
            teams: 16,
            seed,
            start: Utc::now() - Duration::hours(6 * matches as i64),
            margin: 0.05,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationSummary {
    pub logged: usize,
    pub settled: usize,
    pub home_wins: usize,
    pub away_wins: usize,
    pub draws: usize,
}

struct SimTeam {
    name: String,
    attack: f64,
    defense: f64,
    stats: TeamStats,
    form: String,
}

impl SimTeam {
    fn record(&mut self, scored: u32, conceded: u32) {
        self.stats.played += 1;
        self.stats.scored += scored as f64;
        self.stats.conceded += conceded as f64;
        let c = match scored.cmp(&conceded) {
            std::cmp::Ordering::Greater => 'W',
            std::cmp::Ordering::Less => 'L',
            std::cmp::Ordering::Equal => 'D',
        };
        self.form.insert(0, c);
        self.form.truncate(FORM_LENGTH);
    }
}

fn home_boost(sport: Sport) -> f64 {
    match sport {
        Sport::Soccer => 1.10,
        Sport::Basketball => 1.015,
        Sport::Football => 1.06,
        Sport::Hockey => 1.03,
    }
}

/// Knuth's multiplication method; fine for the rates seen here (≤ ~130).
pub fn sample_poisson<R: Rng + ?Sized>(rng: &mut R, lambda: f64) -> u32 {
    if lambda <= 0.0 {
        return 0;
    }
    let limit = (-lambda).exp();
    let mut k = 0u32;
    let mut p = 1.0;
    loop {
        p *= rng.gen::<f64>();
        if p <= limit {
            return k;
        }
        k += 1;
    }
}

/// Decimal odds around `probs`, jittered and carrying `margin`.
fn market_odds<R: Rng + ?Sized>(
    rng: &mut R,
    probs: &CalibratedProbabilities,
    margin: f64,
) -> (f64, f64, Option<f64>) {
    let mut jitter = |p: f64| {
        let shift: f64 = rng.gen_range(-MARKET_NOISE..MARKET_NOISE);
        p.max(1e-3) * shift.exp()
    };
    let home = jitter(probs.home);
    let away = jitter(probs.away);
    let draw = probs.draw.map(&mut jitter);
    let total = home + away + draw.unwrap_or(0.0);
    let price = |p: f64| 1.0 / (p / total * (1.0 + margin));
    (price(home), price(away), draw.map(price))
}

/// Simulate a season into `store`. Deterministic for a given seed and start.
pub fn simulate_season(
    store: &dyn PredictionStore,
    config: &SimulationConfig,
) -> LedgerResult<SimulationSummary> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let sport = config.sport;
    let per_team = default_league_average(sport) / 2.0;
    let league = format!("Simulated {}", sport.as_str());

    let mut teams: Vec<SimTeam> = (0..config.teams.max(2))
        .map(|i| SimTeam {
            name: format!("Team {:02}", i + 1),
            attack: rng.gen_range(1.0 - STRENGTH_SPREAD..1.0 + STRENGTH_SPREAD),
            defense: rng.gen_range(1.0 - STRENGTH_SPREAD..1.0 + STRENGTH_SPREAD),
            stats: TeamStats::default(),
            form: String::new(),
        })
        .collect();

    let mut summary = SimulationSummary::default();

    for i in 0..config.matches {
        let h = rng.gen_range(0..teams.len());
        let mut a = rng.gen_range(0..teams.len() - 1);
        if a >= h {
            a += 1;
        }

        let kickoff = config.start + Duration::hours(6 * i as i64);
        let match_id = format!("sim-{}-{:05}", sport.as_str(), i);

        let input = ModelInput::new(sport, teams[h].stats, teams[a].stats)
            .with_form(&teams[h].form, &teams[a].form);
        let raw = predict(&input);
        let calibrated = CalibratedProbabilities::from(&raw);

        let (oh, oa, od) = market_odds(&mut rng, &calibrated, config.margin);
        let market = devig(oh, oa, od);
        let edge = market.as_ref().map(|m| edge_result(&calibrated, m));

        store.log_prediction_at(
            NewPrediction {
                match_id: match_id.clone(),
                sport,
                league: league.clone(),
                home_team: teams[h].name.clone(),
                away_team: teams[a].name.clone(),
                kickoff,
                data_quality: assess_data_quality(&input),
                volatility: assess_volatility(sport, &raw),
                raw_probabilities: raw,
                calibrated_probabilities: calibrated,
                market_probabilities: market,
                edge,
            },
            kickoff - Duration::hours(2),
        )?;
        summary.logged += 1;

        let home_rate = per_team * teams[h].attack / teams[a].defense * home_boost(sport);
        let away_rate = per_team * teams[a].attack / teams[h].defense;
        let mut home_score = sample_poisson(&mut rng, home_rate);
        let mut away_score = sample_poisson(&mut rng, away_rate);
        if home_score == away_score && sport != Sport::Soccer {
            // overtime
            if rng.gen_bool(0.5) {
                home_score += 1;
            } else {
                away_score += 1;
            }
        }
        debug!("{} {}-{}", match_id, home_score, away_score);

        let (ch, ca, cd) = market_odds(&mut rng, &calibrated, config.margin);
        let closing = ClosingOdds {
            home: ch,
            away: ca,
            draw: cd,
            captured_at: kickoff,
        };
        let settled = store.settle_prediction_at(
            &match_id,
            FinalScore {
                home_score,
                away_score,
            },
            Some(closing),
            kickoff + Duration::hours(3),
        )?;
        if let Some(result) = settled.and_then(|r| r.result) {
            summary.settled += 1;
            match result.outcome {
                Outcome::Home => summary.home_wins += 1,
                Outcome::Away => summary.away_wins += 1,
                Outcome::Draw => summary.draws += 1,
            }
        }

        teams[h].record(home_score, away_score);
        teams[a].record(away_score, home_score);
    }

    info!(
        "Simulated {} {} matches: {} home, {} away, {} draws",
        summary.settled, sport, summary.home_wins, summary.away_wins, summary.draws
    );
    Ok(summary)
}
