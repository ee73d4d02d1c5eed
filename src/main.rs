//! Alpha Dash - Solana token overlap dashboard

use std::process::ExitCode;

use alpha_core::{AnalysisRequest, JobStatus};
use bytes::Bytes;
use chrono::Utc;
use clap::Parser;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};

use alpha_dash::{
    cli::{AnalyzeArgs, Cli, Command, StorageCommand, TableArgs},
    config::Config,
    jobs::SubmitOutcome,
    monitor::{FilterState, render::render_table},
    server::{Server, Services},
    setup_tracing, storage,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::Serve { no_background }) => run_server(config, no_background).await,
        None => run_server(config, false).await,
        Some(Command::Tokens(args)) => run_tokens(&config, &args).await,
        Some(Command::Watch(args)) => run_watch(&config, &args).await,
        Some(Command::Analyses { json }) => run_analyses(&config, json).await,
        Some(Command::Analyze(args)) => run_analyze(&config, args).await,
        Some(Command::Storage(cmd)) => run_storage(&config, cmd).await,
        Some(Command::Config) => print_config(config),
    }
}

/// Print the merged configuration
fn print_config(mut config: Config) -> ExitCode {
    if config.storage.key.is_some() {
        config.storage.key = Some("<redacted>".to_string());
    }
    match serde_yaml::to_string(&config) {
        Ok(yaml) => {
            print!("{yaml}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Failed to serialize configuration: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> alpha_dash::Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(ref host) = cli.host {
        config.server.host = host.clone();
    }
    if cli.no_market {
        config.market.enabled = false;
    }
    Ok(config)
}

fn services(config: &Config) -> Option<Services> {
    match Services::from_config(config) {
        Ok(s) => Some(s),
        Err(e) => {
            eprintln!("❌ Failed to initialize: {e}");
            None
        }
    }
}

fn filter_from(args: &TableArgs) -> Result<FilterState, alpha_dash::Error> {
    Ok(FilterState {
        search: args.search.trim().to_string(),
        grades: FilterState::parse_grades(&args.grades)?,
        sort: args.sort.parse()?,
        descending: !args.asc,
    })
}

/// Run the dashboard server
async fn run_server(mut config: Config, no_background: bool) -> ExitCode {
    if no_background {
        config.server.monitor_enabled = false;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        market = config.market.enabled,
        "Starting Alpha Dash"
    );

    let server = match Server::new(config) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create server: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.run().await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Server shutdown complete");
    ExitCode::SUCCESS
}

/// Print the token table once
async fn run_tokens(config: &Config, args: &TableArgs) -> ExitCode {
    let filter = match filter_from(args) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };
    let Some(services) = services(config) else {
        return ExitCode::FAILURE;
    };

    services.monitor.refresh().await;
    let view = services.monitor.view(&filter);
    if args.json {
        match serde_json::to_string_pretty(&view) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("❌ Failed to serialize to JSON: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!("{}", render_table(&view, Utc::now()));
    }
    ExitCode::SUCCESS
}

/// Redraw the token table on every refresh
async fn run_watch(config: &Config, args: &TableArgs) -> ExitCode {
    let filter = match filter_from(args) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };
    let Some(services) = services(config) else {
        return ExitCode::FAILURE;
    };

    let mut ticker = interval(config.monitor.refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                services.monitor.refresh().await;
                let view = services.monitor.view(&filter);
                // clear screen, cursor home
                print!("\x1b[2J\x1b[H");
                println!("{}", render_table(&view, Utc::now()));
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    ExitCode::SUCCESS
}

/// List saved analyses
async fn run_analyses(config: &Config, json: bool) -> ExitCode {
    let Some(services) = services(config) else {
        return ExitCode::FAILURE;
    };

    let analyses = services.analyses.history().await;
    if json {
        match serde_json::to_string_pretty(&analyses) {
            Ok(out) => println!("{out}"),
            Err(e) => {
                eprintln!("❌ Failed to serialize to JSON: {e}");
                return ExitCode::FAILURE;
            }
        }
        return ExitCode::SUCCESS;
    }

    if analyses.is_empty() {
        println!("No saved analyses.");
        return ExitCode::SUCCESS;
    }
    println!("Found {} analyses:\n", analyses.len());
    for analysis in &analyses {
        let when = analysis
            .timestamp
            .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string());
        println!(
            "  {}  {}  {} trader(s)  tokens: {}",
            when,
            analysis.id,
            analysis.records.len(),
            analysis.tokens.join(", ")
        );
    }
    ExitCode::SUCCESS
}

/// Submit an analysis and wait for it
async fn run_analyze(config: &Config, args: AnalyzeArgs) -> ExitCode {
    let Some(services) = services(config) else {
        return ExitCode::FAILURE;
    };

    let request = AnalysisRequest {
        tokens: args.tokens,
        trader_type: args.trader_type,
        min_buy: args.min_buy,
        min_num_tokens_in_profit: args.min_tokens_in_profit,
        window: args.window,
    };

    let code = match services.analyses.submit(request).await {
        Ok(SubmitOutcome::Completed(analysis)) => print_json(&analysis),
        Ok(SubmitOutcome::Queued(job)) if args.no_wait => {
            println!("Queued job {}", job.id);
            ExitCode::SUCCESS
        }
        Ok(SubmitOutcome::Queued(job)) => {
            info!(job_id = %job.id, "Waiting for analysis job");
            let tracker = services.analyses.tracker();
            tokio::select! {
                finished = tracker.wait(&job.id, config.jobs.poll_interval) => match finished {
                    Some(job) if job.status == JobStatus::Completed => match &job.result {
                        Some(result) => print_json(result),
                        None => print_json(&job),
                    },
                    Some(job) => {
                        eprintln!("❌ Analysis failed: {}", job.error.unwrap_or_default());
                        ExitCode::FAILURE
                    }
                    None => {
                        eprintln!("❌ Job {} disappeared", job.id);
                        ExitCode::FAILURE
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    eprintln!("Interrupted; job {} keeps running on the backend", job.id);
                    ExitCode::FAILURE
                }
            }
        }
        Err(e) => {
            eprintln!("❌ {e}");
            ExitCode::FAILURE
        }
    };

    services.analyses.shutdown().await;
    code
}

fn print_json<T: serde::Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Failed to serialize to JSON: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Raw bucket access
async fn run_storage(config: &Config, cmd: StorageCommand) -> ExitCode {
    let store = match storage::from_config(&config.storage) {
        Ok(Some(s)) => s,
        Ok(None) => {
            eprintln!("❌ Object storage is not configured (set SUPABASE_URL/SUPABASE_KEY or storage.local_root)");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };

    let result: alpha_dash::Result<()> = match cmd {
        StorageCommand::Download { path, output } => match store.download(&path).await {
            Ok(data) => match output {
                Some(out) => tokio::fs::write(&out, &data).await.map_err(Into::into),
                None => {
                    println!("{}", String::from_utf8_lossy(&data));
                    Ok(())
                }
            },
            Err(e) => Err(e),
        },
        StorageCommand::Upload { file, path, upsert } => match tokio::fs::read(&file).await {
            Ok(data) => storage::put_object(store.as_ref(), &path, Bytes::from(data), upsert)
                .await
                .map(|()| println!("✅ Uploaded {path}")),
            Err(e) => Err(e.into()),
        },
        StorageCommand::List { folder, limit } => store.list(&folder, limit).await.map(|entries| {
            for entry in entries {
                println!("{}", storage::join_path(&folder, &entry.name));
            }
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {e}");
            ExitCode::FAILURE
        }
    }
}
