//! `impltrack-mcp`: serves the implementation-tracking tools to an MCP client over stdio.
//!
//! Configuration comes from `impltrack.toml` (or `--config`) and `SF_*` / `IMPLTRACK_*`
//! environment variables. Logs go to stderr; stdout carries the protocol.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use impltrack_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat};
use impltrack_mcp::{bootstrap, ImpltrackMcpServer};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "impltrack-mcp", version, about = "Salesforce implementation tracking over MCP")]
struct Cli {
    /// Path to a TOML config file. Must exist when given.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    log_level: Option<String>,
    /// compact, pretty or json
    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl Cli {
    fn load_options(self) -> LoadOptions {
        LoadOptions {
            require_file: self.config.is_some(),
            config_path: self.config,
            overrides: ConfigOverrides {
                log_level: self.log_level,
                log_format: self.log_format,
                ..ConfigOverrides::default()
            },
        }
    }
}

fn init_logging(config: &AppConfig) {
    use tracing::Level;
    use LogFormat::*;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(log_level);

    match config.logging.format {
        Compact => builder.compact().init(),
        Pretty => builder.pretty().init(),
        Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.load_options())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    info!(
        event_name = "system.startup.ready",
        correlation_id = "bootstrap",
        user = %app.gateway.identity().email,
        admin = app.gateway.identity().is_admin,
        manager = app.gateway.identity().is_manager,
        "impltrack-mcp ready"
    );

    ImpltrackMcpServer::new(app.gateway).run_stdio().await
}
