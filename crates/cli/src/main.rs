mod config_commands;
mod history_commands;

use std::{path::PathBuf, sync::Arc};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    tracing::{debug, info, warn},
    tracing_subscriber::{
        EnvFilter, fmt, fmt::writer::BoxMakeWriter, layer::SubscriberExt,
        util::SubscriberInitExt,
    },
};

use {
    sigline_config::{Severity, SiglineConfig},
    sigline_gateway::{GatewayServices, services::server_identity},
    sigline_mcp::McpEngine,
};

#[derive(Parser)]
#[command(name = "sigline", version, about = "Signal messaging tools for MCP clients")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file. Searched in ./ then ~/.config/sigline/ when omitted.
    #[arg(long, short, global = true, env = "SIGLINE_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind to (overrides config and environment).
    #[arg(long, global = true)]
    host: Option<String>,

    /// Port to listen on (overrides config and environment).
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Signal account, e.g. +15551234567 (overrides config and environment).
    #[arg(long, short, global = true)]
    account: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve MCP over HTTP event streams (default when no subcommand is given).
    Serve,
    /// Serve a single MCP session over stdin/stdout.
    Stdio,
    /// Local message history.
    History {
        #[command(subcommand)]
        action: history_commands::HistoryAction,
    },
    /// Configuration inspection.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    // stdout belongs to the protocol in stdio mode.
    let writer = if matches!(cli.command, Some(Commands::Stdio)) {
        BoxMakeWriter::new(std::io::stderr)
    } else {
        BoxMakeWriter::new(std::io::stdout)
    };

    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(writer),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(writer),
            )
            .init();
    }
}

/// File, then environment, then flags.
fn resolve_config(cli: &Cli) -> anyhow::Result<SiglineConfig> {
    let mut config = sigline_config::discover_and_load(cli.config.as_deref())
        .context("failed to load configuration")?;
    apply_cli_overrides(&mut config, cli);
    Ok(config)
}

fn apply_cli_overrides(config: &mut SiglineConfig, cli: &Cli) {
    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(account) = &cli.account {
        config.signal.account = Some(account.trim().to_string());
    }
}

/// Refuse to start on configuration errors; log everything else.
fn ensure_valid(config: &SiglineConfig) -> anyhow::Result<()> {
    let result = sigline_config::validate(config);
    for d in &result.diagnostics {
        match d.severity {
            Severity::Error => {},
            Severity::Warning => warn!(path = d.path, "{}", d.message),
            Severity::Info => debug!(path = d.path, "{}", d.message),
        }
    }
    if let Some(error) = result.first_error() {
        anyhow::bail!(
            "invalid configuration: {error} ({} error(s) total, run `sigline config check`)",
            result.count(Severity::Error)
        );
    }
    Ok(())
}

async fn run_stdio(config: SiglineConfig) -> anyhow::Result<()> {
    let services = GatewayServices::from_config(&config).await?;
    let engine = Arc::new(McpEngine::new(
        "stdio",
        Arc::clone(&services.registry),
        Arc::new(server_identity()),
    ));
    info!("serving MCP over stdio");
    sigline_mcp::serve_stdio(engine).await?;
    info!("stdio session ended");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    let config = resolve_config(&cli)?;
    match cli.command {
        None | Some(Commands::Serve) => {
            info!(version = env!("CARGO_PKG_VERSION"), "sigline starting");
            ensure_valid(&config)?;
            sigline_gateway::start_gateway(config).await
        },
        Some(Commands::Stdio) => {
            ensure_valid(&config)?;
            run_stdio(config).await
        },
        Some(Commands::History { action }) => history_commands::handle_history(action, &config).await,
        Some(Commands::Config { action }) => config_commands::handle_config(action, &config),
    }
}
