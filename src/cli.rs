//! Command-line interface

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Solana token overlap dashboard and trader ROI client
#[derive(Parser, Debug)]
#[command(name = "alpha-dash")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "ALPHA_DASH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "ALPHA_DASH_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "ALPHA_DASH_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "ALPHA_DASH_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "ALPHA_DASH_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Disable market-data enrichment and freshness checks
    #[arg(long, global = true)]
    pub no_market: bool,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the dashboard server (default)
    Serve {
        /// Refresh the monitor per request instead of on a timer
        #[arg(long)]
        no_background: bool,
    },

    /// Print the enriched token table once
    Tokens(TableArgs),

    /// Redraw the token table on every refresh until Ctrl+C
    Watch(TableArgs),

    /// List saved ROI analyses
    Analyses {
        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },

    /// Submit an ROI analysis and wait for its result
    Analyze(AnalyzeArgs),

    /// Raw bucket access
    #[command(subcommand)]
    Storage(StorageCommand),

    /// Print the effective configuration as YAML (secrets redacted)
    Config,
}

/// Filter and sort flags shared by `tokens` and `watch`
#[derive(Args, Debug, Clone)]
pub struct TableArgs {
    /// Case-insensitive search over name and symbol
    #[arg(short, long, default_value = "")]
    pub search: String,

    /// Comma separated grades to show (default: all)
    #[arg(short, long, default_value = "")]
    pub grades: String,

    /// Sort column (discovered, grade, price, change, volume, liquidity,
    /// market_cap, since_call)
    #[arg(long, default_value = "discovered")]
    pub sort: String,

    /// Sort ascending
    #[arg(long)]
    pub asc: bool,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

/// Analysis request flags
#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Token mint addresses (1 to 3)
    #[arg(required = true, num_args = 1..)]
    pub tokens: Vec<String>,

    /// Trader classification
    #[arg(long, default_value = "all")]
    pub trader_type: String,

    /// Minimum buy size in USD
    #[arg(long, default_value_t = 0.0)]
    pub min_buy: f64,

    /// Minimum tokens a trader must be in profit on
    #[arg(long, default_value_t = 1)]
    pub min_tokens_in_profit: u32,

    /// Look-back window (`24h`, `7d`)
    #[arg(long)]
    pub window: Option<String>,

    /// Return after submission instead of waiting for a queued job
    #[arg(long)]
    pub no_wait: bool,
}

/// Bucket subcommands
#[derive(Subcommand, Debug)]
pub enum StorageCommand {
    /// Download an object to stdout or a file
    Download {
        /// Object path inside the bucket
        path: String,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Upload a local file
    Upload {
        /// Local file
        file: PathBuf,

        /// Object path inside the bucket
        path: String,

        /// Overwrite an existing object
        #[arg(long)]
        upsert: bool,
    },

    /// List a folder
    List {
        /// Folder inside the bucket
        #[arg(default_value = "")]
        folder: String,

        /// Max entries
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_server() {
        let cli = Cli::try_parse_from(["alpha-dash"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_analyze_args() {
        let cli = Cli::try_parse_from([
            "alpha-dash",
            "analyze",
            "MintA",
            "MintB",
            "--min-buy",
            "250",
            "--window",
            "24h",
        ])
        .unwrap();
        let Some(Command::Analyze(args)) = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(args.tokens, vec!["MintA", "MintB"]);
        assert_eq!(args.min_buy, 250.0);
        assert_eq!(args.window.as_deref(), Some("24h"));
        assert!(!args.no_wait);
    }

    #[test]
    fn test_tokens_filter_flags() {
        let cli = Cli::try_parse_from(["alpha-dash", "tokens", "-g", "HIGH,CRITICAL", "--sort", "volume", "--asc"])
            .unwrap();
        let Some(Command::Tokens(args)) = cli.command else {
            panic!("expected tokens");
        };
        assert_eq!(args.grades, "HIGH,CRITICAL");
        assert_eq!(args.sort, "volume");
        assert!(args.asc);
    }
}
