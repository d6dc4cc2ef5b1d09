//! Error types for cryptodash_rs
//!
//! This module defines domain-specific error types that provide clear,
//! actionable error messages to users.

use thiserror::Error;

/// Errors from the market data provider.
///
/// Transport and decode failures both surface through reqwest. Nothing here
/// is fatal and nothing is retried.
#[derive(Debug, Error)]
pub enum MarketError {
    #[error("market data request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors from the local key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sled::Error),

    #[error("failed to encode value for storage: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Comparison set violations.
///
/// These errors are shown directly to users and should be clear and actionable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ComparisonError {
    #[error("You can compare up to {0} cryptocurrencies.")]
    Full(usize),
}
