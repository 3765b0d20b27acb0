#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;

use std::process::ExitCode;
use std::sync::Arc;

use args::Args;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use claudeproxy_config::{AdapterKind, Config};
use claudeproxy_llm::{Adapter, GroqAdapter, XaiAdapter};
use claudeproxy_server::{PortStatus, Server, console, probe_port};
use claudeproxy_tools::ToolRegistry;

const EXIT_CONFIG: u8 = 2;
const EXIT_PORT: u8 = 3;
const EXIT_INTERNAL: u8 = 64;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let adapter_kind: AdapterKind = match args.adapter.parse() {
        Ok(kind) => kind,
        Err(error) => {
            tracing::error!(%error, "configuration error");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let config = match Config::build(adapter_kind, args.port) {
        Ok(config) => config,
        Err(error) => {
            tracing::error!(%error, "configuration error");
            return ExitCode::from(error.exit_code());
        }
    };

    match run(config).await {
        Ok(code) => code,
        Err(error) => {
            tracing::error!(%error, "fatal error");
            ExitCode::from(EXIT_INTERNAL)
        }
    }
}

async fn run(config: Config) -> anyhow::Result<ExitCode> {
    match probe_port(config.port).await {
        PortStatus::Free => {}
        PortStatus::EarlierInstance => {
            tracing::error!(
                port = config.port,
                "another claudeproxy instance is already listening; stop it first"
            );
            return Ok(ExitCode::from(EXIT_PORT));
        }
        PortStatus::ForeignProcess => {
            tracing::error!(
                port = config.port,
                "port is in use by another process; choose a different port"
            );
            return Ok(ExitCode::from(EXIT_PORT));
        }
    }

    let registry = Arc::new(ToolRegistry::for_os(config.os_family));
    let adapter: Arc<dyn Adapter> = match config.adapter {
        AdapterKind::Xai => Arc::new(XaiAdapter::new(
            config.api_key.clone(),
            Arc::clone(&registry),
            config.haiku_high_reasoning,
        )?),
        AdapterKind::Groq => Arc::new(GroqAdapter::new(
            config.api_key.clone(),
            Arc::clone(&registry),
            config.haiku_high_reasoning,
        )?),
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        os_family = %config.os_family,
        adapter = %config.adapter,
        tools = registry.len(),
        "starting claudeproxy"
    );
    tracing::info!(
        "point the client at the proxy: claude --settings '{{\"env\": {{\"ANTHROPIC_BASE_URL\": \"http://localhost:{}\", \"ANTHROPIC_API_KEY\": \"dummy_key\"}}}}'",
        config.port
    );
    tracing::info!("console commands: R = restart, Q = quit, H = help");

    // Console commands and OS signals both resolve through this token; the
    // server folds signal handling into its own shutdown path
    let shutdown = CancellationToken::new();
    console::spawn(shutdown.clone());

    let server = Server::new(adapter, config.port);
    server.serve(shutdown).await?;

    tracing::info!("claudeproxy stopped");
    Ok(ExitCode::SUCCESS)
}
