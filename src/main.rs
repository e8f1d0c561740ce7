//! Kapacitor MACD batch UDF server and one-shot calculator.
//!
//! `serve` listens on a Unix socket and answers Kapacitor UDF requests until
//! SIGINT/SIGTERM. `compute` reads a price series and prints the MACD result
//! as JSON.

use anyhow::{bail, Context, Result};
use async_std::{fs, io, io::ReadExt, main, os::unix::net::UnixListener, stream::StreamExt, sync::Arc, task};
use clap::{Args, Parser, Subcommand};
use kapacitor_macd_batch_udf::{
    handler::{
        accepter::Accepter,
        config::{MacdOptions, UdfConfig},
    },
    indicators::{compute_macd, MacdParameters},
};
use kapacitor_udf::socket_server::SocketServer;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_async_std::Signals;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_SOCKET: &str = "/tmp/macd-batch.sock";

/// Command-line arguments.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Log level used when RUST_LOG is not set.
    #[clap(long, global = true, default_value = "info")]
    log_level: String,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the UDF on a Unix socket.
    Serve {
        /// Path to the Unix socket file. Overrides the config file.
        #[clap(short, long)]
        socket: Option<PathBuf>,

        /// TOML file with the socket path and default MACD options.
        #[clap(short, long)]
        config: Option<PathBuf>,
    },
    /// Compute MACD for a price series and print it as JSON.
    Compute {
        /// File with a JSON array or whitespace separated prices. Reads stdin when absent.
        #[clap(short, long)]
        input: Option<PathBuf>,

        #[clap(flatten)]
        periods: Periods,
    },
}

#[derive(Args, Debug)]
struct Periods {
    #[clap(long, default_value_t = 12)]
    short: usize,
    #[clap(long, default_value_t = 26)]
    long: usize,
    #[clap(long, default_value_t = 9)]
    signal: usize,
}

#[main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&cli.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve { socket, config } => serve(socket, config).await,
        Command::Compute { input, periods } => compute(input, periods).await,
    }
}

/// Socket path and handler defaults for `serve`, after merging the CLI with
/// the config file. A `--socket` flag wins over the file's `socket`.
fn serve_settings(socket: Option<PathBuf>, config: UdfConfig) -> (PathBuf, MacdOptions) {
    let socket_path = socket
        .or(config.socket)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET));
    (socket_path, config.defaults)
}

async fn remove_socket_file(socket_path: &PathBuf) {
    match fs::remove_file(socket_path).await {
        Ok(_) => info!("Removed socket file: {}", socket_path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No socket file at {}", socket_path.display());
        }
        Err(e) => warn!("Error removing socket file {}: {}", socket_path.display(), e),
    }
}

async fn serve(socket: Option<PathBuf>, config_path: Option<PathBuf>) -> Result<()> {
    let config = match config_path {
        Some(path) => UdfConfig::load(path).await?,
        None => UdfConfig::default(),
    };
    let (socket_path, defaults) = serve_settings(socket, config);
    info!("Handlers start from {:?}", defaults);

    remove_socket_file(&socket_path).await;
    let listener = UnixListener::bind(&socket_path)
        .await
        .with_context(|| format!("binding {}", socket_path.display()))?;

    let server = Arc::new(SocketServer::new(listener, Accepter::new(defaults)));
    let _serve_handle = task::spawn({
        let server = Arc::clone(&server);
        async move {
            if let Err(e) = server.serve().await {
                error!("Server error: {}", e);
                std::process::exit(1);
            }
        }
    });

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("installing signal handlers")?;
    let shutdown = task::spawn({
        let server = Arc::clone(&server);
        async move {
            if let Some(signal) = signals.next().await {
                info!("Received termination signal {}, stopping", signal);
                server.stop().await;
            }
        }
    });

    info!("MACD UDF server listening on {}", socket_path.display());
    let _ = futures::join!(shutdown);
    info!("Server stopped");

    remove_socket_file(&socket_path).await;
    Ok(())
}

async fn compute(input: Option<PathBuf>, periods: Periods) -> Result<()> {
    let raw = match input {
        Some(path) => fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).await.context("reading stdin")?;
            buf
        }
    };

    let prices = parse_prices(&raw)?;
    debug!("Parsed {} prices", prices.len());

    let params = MacdParameters::new(periods.short, periods.long, periods.signal);
    let result = compute_macd(&prices, params);
    if let Some(reason) = result.error() {
        warn!("{}", reason);
    }

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn parse_prices(raw: &str) -> Result<Vec<f64>> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("parsing JSON price array");
    }

    let mut prices = Vec::new();
    for token in trimmed.split(|c: char| c.is_whitespace() || c == ',') {
        if token.is_empty() {
            continue;
        }
        match token.parse::<f64>() {
            Ok(price) => prices.push(price),
            Err(_) => bail!("invalid price: {:?}", token),
        }
    }
    Ok(prices)
}
