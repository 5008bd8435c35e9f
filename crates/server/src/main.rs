use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use toolhouse_mcp::server::McpServer;
use toolhouse_mcp::tools::ToolRegistry;

mod config;
mod http;
mod servers;

use config::ToolhouseConfig;
use servers::{calendar, cloudwatch, games, maps, postgres, s3, search};

#[derive(Parser, Debug)]
#[command(name = "toolhouse")]
#[command(about = "MCP tool servers for AWS, Google, PostgreSQL, RAWG and web search", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "toolhouse.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Serve AWS CloudWatch Logs tools
    Cloudwatch,
    /// Serve AWS S3 tools
    S3,
    /// Serve Google Calendar tools
    Calendar,
    /// Authorize Google Calendar access and store credentials
    CalendarAuth,
    /// Serve Google Maps tools
    Maps,
    /// Serve the PostgreSQL query tool
    Postgres,
    /// Serve RAWG video game tools
    Games,
    /// Serve web search and page extraction tools
    Search,
}

impl Command {
    fn server_name(self) -> &'static str {
        match self {
            Command::Cloudwatch => "cloudwatch",
            Command::S3 => "s3",
            Command::Calendar | Command::CalendarAuth => "calendar",
            Command::Maps => "google-maps",
            Command::Postgres => "postgresql",
            Command::Games => "rawg-db",
            Command::Search => "web-search",
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "toolhouse=info".into());

    // stdout carries the protocol, so logs go to stderr.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn build_registry(command: Command, config: &ToolhouseConfig) -> Result<ToolRegistry> {
    let registry = match command {
        Command::Cloudwatch => {
            let client = cloudwatch::AwsLogsClient::connect(&config.cloudwatch).await?;
            cloudwatch::registry(Arc::new(client))
        }
        Command::S3 => {
            let buckets = s3::Buckets::connect(&config.s3).await?;
            s3::registry(Arc::new(buckets))
        }
        Command::Calendar => {
            let service = calendar::CalendarService::connect(&config.calendar).await?;
            calendar::registry(Arc::new(service))
        }
        Command::Maps => maps::registry(Arc::new(maps::MapsService::from_env(&config.maps)?)),
        Command::Postgres => {
            let db = postgres::Database::connect(&config.postgres).await?;
            postgres::registry(Arc::new(db))
        }
        Command::Games => {
            let service = games::GamesService::connect(&config.games).await?;
            games::registry(Arc::new(service))
        }
        Command::Search => {
            search::registry(Arc::new(search::SearchService::from_env(&config.search)?))
        }
        Command::CalendarAuth => anyhow::bail!("calendar-auth does not serve tools"),
    };
    Ok(registry)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.json_logs);

    let config = ToolhouseConfig::load(&args.config)?;

    if args.command == Command::CalendarAuth {
        return calendar::auth::run(&config.calendar).await;
    }

    let name = args.command.server_name();
    tracing::info!(server = name, "Starting toolhouse MCP server");

    let registry = build_registry(args.command, &config)
        .await
        .with_context(|| format!("Failed to start the {} server", name))?;
    tracing::info!(server = name, tools = registry.len(), "Tools registered");

    McpServer::new(name, registry).start().await?;

    tracing::info!(server = name, "stdin closed, shutting down");
    Ok(())
}
