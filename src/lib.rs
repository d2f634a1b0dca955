//! Accuracy engine: per-sport baseline probabilities, an append-only
//! prediction ledger and the backtests that score the ledger against
//! results and the closing market.
//!
//! Flow: a [`model::ModelInput`] goes through [`model::predict`], the caller
//! calibrates and prices it, the snapshot is written with
//! [`ledger::PredictionStore::log_prediction`], settled once the score is in,
//! and [`backtest`] reads the settled records back.

pub mod backtest;
pub mod db;
pub mod ledger;
pub mod model;
pub mod odds;
pub mod simulate;
