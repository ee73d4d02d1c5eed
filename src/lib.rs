//! Alpha Dash Library
//!
//! Dashboard for Solana token overlap grading and trader ROI analyses.
//!
//! # Features
//!
//! - **Token feed**: reads graded tokens from Supabase Storage (or a local
//!   bucket directory), falling back to sample data when storage is absent
//! - **Market enrichment**: live price, volume and liquidity from DexScreener
//! - **Token monitor**: visibility-aware refresh loop with first-seen
//!   ("call") prices and filter/sort views
//! - **Trader ROI**: validated submission to the analysis backend, job
//!   polling with timeout, and a merged analysis history

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod jobs;
pub mod market;
pub mod monitor;
pub mod server;
pub mod storage;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging; `RUST_LOG` overrides `level`
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber.with(fmt::layer().json().with_writer(std::io::stderr)).try_init(),
        _ => subscriber.with(fmt::layer().with_writer(std::io::stderr)).try_init(),
    };
    installed.map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {e}")))
}
