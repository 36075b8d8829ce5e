//! AdSense MCP server binary

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use adsense_mcp::{
    adsense::{AdSense, normalize_account},
    cache::CacheStore,
    cli::{CacheCommand, Cli, Command},
    config::Config,
    failsafe::{RequestThrottle, RetryPolicy},
    server::Server,
    setup_tracing,
    upstream::HttpAdSenseApi,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            if cli.account.is_some() {
                config.default_account = cli.account.clone();
            }
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::Cache(cache_cmd)) => run_cache_command(&config, cache_cmd),
        Some(Command::Serve) | None => run_server(config).await,
    }
}

/// Run cache maintenance commands
fn run_cache_command(config: &Config, cmd: CacheCommand) -> ExitCode {
    let store = match open_store(config) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to open cache: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cmd {
        CacheCommand::Stats => store.stats().map(|stats| {
            println!("entries:  {}", stats.total_entries);
            println!("size:     {} bytes", stats.total_size);
            println!("expired:  {}", stats.expired_count);
        }),
        CacheCommand::Sweep => store.clear_expired().map(|removed| {
            println!("Removed {removed} expired entries");
        }),
        CacheCommand::Clear { account, all } => match (account, all) {
            (Some(account), _) => store
                .clear_account(&normalize_account(&account))
                .map(|removed| println!("Removed {removed} entries for {account}")),
            (None, true) => store.clear_all().map(|()| println!("Cache cleared")),
            (None, false) => {
                eprintln!("Specify --account <id> or --all");
                return ExitCode::FAILURE;
            }
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Cache command failed: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Run the MCP server on stdio
async fn run_server(config: Config) -> ExitCode {
    let store = match open_store(&config) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("Failed to open cache: {e}");
            return ExitCode::FAILURE;
        }
    };

    let api = match HttpAdSenseApi::new(&config.upstream) {
        Ok(api) => Arc::new(api),
        Err(e) => {
            error!("Failed to build upstream client: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        quota_per_minute = config.rate_limit.requests_per_minute,
        default_account = config.default_account.as_deref().unwrap_or("(discover)"),
        "Starting AdSense MCP server"
    );

    // Periodic expired-entry sweep; get() never deletes, so without this
    // the store only shrinks on explicit `cache sweep` runs.
    if config.cache.sweep_interval.is_zero() {
        warn!("Cache sweep disabled; expired entries accumulate until `cache sweep`");
    } else {
        let store = Arc::clone(&store);
        let interval = config.cache.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                match store.clear_expired() {
                    Ok(removed) if removed > 0 => {
                        info!(removed, "swept expired cache entries");
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "cache sweep failed"),
                }
            }
        });
    }

    let adsense = AdSense::new(
        api,
        store,
        Arc::new(RequestThrottle::new(&config.rate_limit)),
        RetryPolicy::new(&config.retry),
        config.default_account.clone(),
    );

    if let Err(e) = Server::new(adsense).run().await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Server shutdown complete");
    ExitCode::SUCCESS
}

fn open_store(config: &Config) -> adsense_mcp::Result<CacheStore> {
    let path = config.cache.resolve_path()?;
    CacheStore::open(&path)
}
