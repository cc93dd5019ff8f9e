mod config;
mod graph;
mod logging;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use graphd_auth::{HttpClientBuilderExt, TokenProvider};
use graphd_http::{HttpClientBuilder, HttpClientConfig};

use crate::config::{AppConfig, DEFAULT_SETTINGS_FILE, LogFormat};
use crate::graph::GraphClient;

const DEFAULT_RAW_PATH: &str = "users?$top=5&$select=displayName";

/// Graph daemon - app-only Microsoft Graph client
#[derive(Parser)]
#[command(name = "graph-daemon")]
#[command(about = "Graph daemon - calls Microsoft Graph with app-only (client credentials) auth")]
#[command(version)]
struct Cli {
    /// Path to configuration file (.json or .yaml; default: ./appsettings.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log output format (overrides config)
    #[arg(long, value_enum)]
    log_format: Option<CliLogFormat>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliLogFormat {
    Text,
    Json,
}

impl From<CliLogFormat> for LogFormat {
    fn from(value: CliLogFormat) -> Self {
        match value {
            CliLogFormat::Text => Self::Text,
            CliLogFormat::Json => Self::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List tenant users through the typed client
    Users {
        /// Maximum number of users to return
        #[arg(long, default_value_t = 5)]
        top: u32,
        /// `OData` ordering expression
        #[arg(long, default_value = "displayName desc")]
        order_by: String,
        /// Properties to return, comma-separated (e.g. `displayName,id`)
        #[arg(long, value_delimiter = ',')]
        select: Vec<String>,
    },
    /// GET a Graph path (or absolute URL) and print the raw response body
    Raw {
        #[arg(long, default_value = DEFAULT_RAW_PATH)]
        path: String,
    },
    /// Validate configuration and exit
    Check {
        /// Also acquire an access token
        #[arg(long)]
        fetch_token: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;

    let format = cli.log_format.map_or(config.logging.format, Into::into);
    logging::setup_tracing(
        logging::effective_level(&config.logging.level, cli.verbose),
        format,
    )?;

    config.validate().with_context(|| {
        format!("Missing or invalid {DEFAULT_SETTINGS_FILE} file or GRAPHD_* settings")
    })?;
    tracing::debug!(config = ?config, "configuration loaded");

    let provider = TokenProvider::new(config.oauth_config()?)?;
    let http = HttpClientBuilder::with_config(config.http_config(HttpClientConfig::default()))
        .with_bearer_auth(provider.clone())
        .build()?;
    let graph = GraphClient::new(http, &config.graph_base_url)?;

    match cli.command {
        Some(Commands::Users {
            top,
            order_by,
            select,
        }) => print_users(&graph, top, &order_by, &select).await,
        Some(Commands::Raw { path }) => print_raw(&graph, &path).await,
        Some(Commands::Check { fetch_token }) => {
            if fetch_token {
                provider.get_token().await?;
                println!("Token acquired");
            }
            println!("Configuration OK");
            Ok(())
        }
        None => {
            print_users(&graph, 5, "displayName desc", &[]).await?;
            print_raw(&graph, DEFAULT_RAW_PATH).await
        }
    }
}

async fn print_users(
    graph: &GraphClient,
    top: u32,
    order_by: &str,
    select: &[String],
) -> Result<()> {
    let users = graph
        .users()
        .top(top)
        .order_by(order_by)
        .select(select.iter().map(String::as_str))
        .get()
        .await
        .context("listing users failed")?;

    println!("** Tenant users **");
    println!("\n---Graph Service Client Result---");
    for user in &users {
        println!("{}", user.display_name.as_deref().unwrap_or_default());
    }
    Ok(())
}

async fn print_raw(graph: &GraphClient, path: &str) -> Result<()> {
    let body = graph
        .get_raw(path)
        .await
        .with_context(|| format!("GET {path} failed"))?;

    println!("\n---HTTP Result---");
    println!("{body}");
    Ok(())
}
