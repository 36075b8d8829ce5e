//! AdSense MCP server library
//!
//! Exposes Google AdSense account data (earnings, sites, alerts, policy
//! issues, payments, ad units) to AI assistants over the Model Context
//! Protocol, with a persistent TTL response cache and rolling-window rate
//! limiting in front of the upstream reporting API.
//!
//! The interesting parts live in:
//!
//! - [`cache`] - SQLite-backed response cache with lazy TTL expiry
//! - [`failsafe`] - request throttle and retry-with-backoff executor
//! - [`ttl`] - TTL class table and date-range policy selection
//! - [`adsense`] - the facade composing all of the above per operation

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod adsense;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod failsafe;
pub mod protocol;
pub mod server;
pub mod ttl;
pub mod upstream;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging. Diagnostics go to stderr; stdout carries the
/// MCP protocol stream.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            subscriber
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}
