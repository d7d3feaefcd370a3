use clap::{Parser, Subcommand};
use serde_json::Value;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::io::BufReader;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use webview_bridge::{
    BridgeConfig, BridgeError, BridgeResult, CancelableFuture, EventBus, RequestManager,
    RequestOptions,
    capture::Capture,
    config,
    dispatch::{ChannelDispatcher, Dispatcher, VersionGate},
    methods::invoke_custom_method,
    transport,
};

/// Calls a host method over stdin/stdout.
///
/// Method calls are written to stdout and host events are read from stdin, one
/// JSON message per line. The call result is printed to stderr.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Mini Apps version reported by the host, enables capability checks
    #[arg(long, global = true)]
    host_version: Option<String>,

    /// Give up after this many milliseconds
    #[arg(short, long, global = true)]
    timeout_ms: Option<u64>,

    /// Log filter, e.g. "debug" or "webview_bridge=trace"
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a method and wait for one of the given events
    Call {
        /// Method name, e.g. web_app_request_theme
        method: String,

        /// Event that may answer the call (repeatable)
        #[arg(short, long = "event", required = true)]
        events: Vec<String>,

        /// Method parameters as JSON
        #[arg(short, long)]
        params: Option<String>,

        /// Only accept payloads where key equals value (repeatable)
        #[arg(short = 'm', long = "match", value_parser = parse_match)]
        matches: Vec<(String, Value)>,
    },

    /// Invoke a custom method
    Invoke {
        /// Custom method name, e.g. getStorageValues
        method: String,

        /// Custom method parameters as JSON
        #[arg(short, long)]
        params: Option<String>,
    },
}

fn parse_match(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    // non-JSON values are compared as plain strings
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn parse_params(raw: Option<&str>) -> BridgeResult<Value> {
    match raw {
        Some(raw) => webview_bridge::payload::parse_str(raw),
        None => Ok(Value::Null),
    }
}

fn load_config(cli: &Cli) -> BridgeResult<BridgeConfig> {
    let mut config: BridgeConfig = match &cli.config {
        Some(path) => config::from_file(path)?,
        None => BridgeConfig::default(),
    };
    if let Some(version) = &cli.host_version {
        config = config.with_host_version(version);
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config = config.with_default_timeout(Duration::from_millis(timeout_ms));
    }
    config.validate()?;
    Ok(config)
}

fn start_call(cli: &Cli, manager: &RequestManager) -> BridgeResult<CancelableFuture<Value>> {
    match &cli.command {
        Commands::Call {
            method,
            events,
            params,
            matches,
        } => {
            let matches = matches.clone();
            let capture = Capture::new(move |payload| {
                matches
                    .iter()
                    .all(|(key, expected)| payload.get(key) == Some(expected))
            });
            let options = RequestOptions::new()
                .params(parse_params(params.as_deref())?)
                .capture(capture);
            manager.request(method.as_str(), events.clone(), options)
        }
        Commands::Invoke { method, params } => invoke_custom_method(
            manager,
            method,
            parse_params(params.as_deref())?,
            RequestOptions::new(),
        ),
    }
}

async fn run(cli: &Cli) -> BridgeResult<()> {
    let config = load_config(cli)?;
    debug!("config: {:?}", config);

    let bus = EventBus::new();
    let (channel, outbound) = ChannelDispatcher::channel(config.outbound_buffer);
    let writer = transport::spawn_writer(tokio::io::stdout(), outbound);
    let dispatcher: Arc<dyn Dispatcher> = match &config.host_version {
        Some(version) => Arc::new(VersionGate::new(channel, Some(version.as_str()))?),
        None => Arc::new(channel),
    };
    let manager = RequestManager::new(bus.clone(), dispatcher, &config);

    let reader_bus = bus.clone();
    let mut reader = tokio::spawn(async move {
        transport::pump_events(BufReader::new(tokio::io::stdin()), &reader_bus).await
    });

    let call = start_call(cli, &manager)?;
    info!("Waiting for the host to answer");

    let outcome = tokio::select! {
        biased;
        result = call => result,
        read = &mut reader => match read {
            Ok(Ok(count)) => Err(BridgeError::transport(format!(
                "host closed the event stream after {} events", count
            ))),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(BridgeError::transport(e.to_string())),
        },
        _ = tokio::signal::ctrl_c() => Err(BridgeError::aborted("interrupted")),
    };

    manager.cancel_waiting_requests("shutting down");
    drop(manager);
    reader.abort();
    match writer.await {
        Ok(written) => written?,
        Err(e) => return Err(BridgeError::transport(e.to_string())),
    }

    let result = outcome?;
    eprintln!(
        "{}",
        serde_json::to_string_pretty(&result).map_err(|e| BridgeError::parse(e.to_string()))?
    );
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)))
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };
    let result = runtime.block_on(run(&cli));
    // a pending stdin read never finishes while the host keeps the pipe open
    runtime.shutdown_background();

    if let Err(e) = result {
        eprintln!("Error [{}]: {}", e.code(), e);
        std::process::exit(1);
    }
}
