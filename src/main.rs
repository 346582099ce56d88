//! Trade journal - command line entry point
//!
//! Subcommands manage the journal (list, add, delete, attach, stats, clear),
//! move data in and out (import-csv, export-csv, backup, restore) and
//! provide position sizing and FX rates (risk, rates).

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

mod commands;

use commands::trades::{FilterArgs, NewTrade};

#[derive(Parser, Debug)]
#[command(name = "trade-journal")]
#[command(about = "Personal trade journal with persistent storage, CSV interchange and statistics", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "journal.json")]
    config: String,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List trades, most recent first
    List {
        /// Strategy substring (case-insensitive)
        #[arg(long)]
        strategy: Option<String>,

        /// Market type (forex, crypto, stocks)
        #[arg(long)]
        market: Option<String>,

        /// Lookback window (1W, 1M, 3M, 1Y, ALL)
        #[arg(long)]
        timeframe: Option<String>,
    },

    /// Record a new trade
    Add {
        /// Instrument, e.g. "EUR/USD"
        #[arg(long)]
        pair: String,

        /// long or short
        #[arg(long, default_value = "long")]
        direction: String,

        #[arg(long)]
        entry: f64,

        #[arg(long)]
        size: f64,

        /// Trade date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,

        /// Trade time (HH:MM)
        #[arg(long)]
        time: Option<String>,

        /// Exit price; closes the trade
        #[arg(long)]
        exit: Option<f64>,

        #[arg(long)]
        stop_loss: Option<f64>,

        #[arg(long)]
        take_profit: Option<f64>,

        /// tp, sl or manual; closes the trade
        #[arg(long)]
        exit_type: Option<String>,

        #[arg(long)]
        strategy: Option<String>,

        #[arg(long)]
        market: Option<String>,

        #[arg(long)]
        notes: Option<String>,

        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,
    },

    /// Delete a trade and its images
    Delete {
        id: String,
    },

    /// Attach a chart screenshot to a trade
    Attach {
        trade_id: String,

        /// Image file
        file: String,

        /// MIME type, detected from the file contents when omitted
        #[arg(long)]
        mime: Option<String>,
    },

    /// Show performance statistics
    Stats {
        #[arg(long)]
        strategy: Option<String>,

        #[arg(long)]
        market: Option<String>,

        #[arg(long)]
        timeframe: Option<String>,

        /// Print the cumulative PnL curve
        #[arg(long)]
        curve: bool,
    },

    /// Import trades from a CSV file
    ImportCsv {
        file: String,
    },

    /// Export trades to a CSV file
    ExportCsv {
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Write a JSON backup of the journal
    Backup {
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Merge trades from a JSON backup
    Restore {
        file: String,
    },

    /// Remove every trade and image
    Clear {
        /// Confirm the wipe
        #[arg(long)]
        yes: bool,
    },

    /// Position size for a given account risk
    Risk {
        #[arg(long, default_value = "10000")]
        balance: f64,

        /// Percent of balance at risk
        #[arg(long, default_value = "1")]
        risk_pct: f64,

        #[arg(long)]
        entry: f64,

        #[arg(long)]
        stop: f64,
    },

    /// Latest FX rates
    Rates {
        /// Base currency, defaults to the configured one
        #[arg(long)]
        base: Option<String>,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::List { .. } => "list",
            Commands::Add { .. } => "add",
            Commands::Delete { .. } => "delete",
            Commands::Attach { .. } => "attach",
            Commands::Stats { .. } => "stats",
            Commands::ImportCsv { .. } => "import_csv",
            Commands::ExportCsv { .. } => "export_csv",
            Commands::Backup { .. } => "backup",
            Commands::Restore { .. } => "restore",
            Commands::Clear { .. } => "clear",
            Commands::Risk { .. } => "risk",
            Commands::Rates { .. } => "rates",
        }
    }
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Filter out noisy external crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    // Console shows warnings only unless verbose; the file gets everything
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true)
        .with_filter(if verbose { LevelFilter::DEBUG } else { LevelFilter::WARN });

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.command.name())?;

    let config = cli.config;
    match cli.command {
        Commands::List {
            strategy,
            market,
            timeframe,
        } => {
            commands::trades::list(
                config,
                FilterArgs {
                    strategy,
                    market,
                    timeframe,
                },
            )
            .await
        }

        Commands::Add {
            pair,
            direction,
            entry,
            size,
            date,
            time,
            exit,
            stop_loss,
            take_profit,
            exit_type,
            strategy,
            market,
            notes,
            tags,
        } => {
            commands::trades::add(
                config,
                NewTrade {
                    pair,
                    direction,
                    entry,
                    size,
                    date,
                    time,
                    exit,
                    stop_loss,
                    take_profit,
                    exit_type,
                    strategy,
                    market,
                    notes,
                    tags,
                },
            )
            .await
        }

        Commands::Delete { id } => commands::trades::delete(config, id).await,

        Commands::Attach {
            trade_id,
            file,
            mime,
        } => commands::trades::attach(config, trade_id, file, mime).await,

        Commands::Stats {
            strategy,
            market,
            timeframe,
            curve,
        } => {
            commands::trades::stats(
                config,
                FilterArgs {
                    strategy,
                    market,
                    timeframe,
                },
                curve,
            )
            .await
        }

        Commands::ImportCsv { file } => commands::interchange::import_csv_file(config, file).await,

        Commands::ExportCsv { output } => commands::interchange::export_csv_file(config, output).await,

        Commands::Backup { output } => commands::interchange::backup(config, output).await,

        Commands::Restore { file } => commands::interchange::restore(config, file).await,

        Commands::Clear { yes } => commands::trades::clear(config, yes).await,

        Commands::Risk {
            balance,
            risk_pct,
            entry,
            stop,
        } => commands::tools::risk(balance, risk_pct, entry, stop),

        Commands::Rates { base } => commands::tools::rates(config, base).await,
    }
}
