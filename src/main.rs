// src/main.rs
// finchat - chat gateway for the financial assistant

use anyhow::Result;
use clap::{Parser, Subcommand};
use finchat::{AppState, api, config::AppConfig, db};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "finchat")]
#[command(about = "Chat gateway for the financial assistant")]
#[command(version)]
struct Cli {
    /// Override the configured database URL
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve {
        /// Port to listen on
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,
    },

    /// Apply database migrations and exit
    Migrate,
}

fn parse_level(level: &str) -> Level {
    level.parse().unwrap_or(Level::INFO)
}

async fn run_server(config: AppConfig) -> Result<()> {
    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    db::run_migrations(&pool).await?;

    config.log_status();

    let addr = config.bind_address();
    let state = AppState::new(pool, config);
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, version = api::API_VERSION, "finchat listening");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn run_migrate(config: AppConfig) -> Result<()> {
    let pool = db::create_pool(&config.database_url, 1).await?;
    db::run_migrations(&pool).await?;
    info!(database = %config.database_url, "Database is up to date");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::from_env();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(&config.log_level))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(url) = cli.database_url {
        config.database_url = url;
    }

    match cli.command {
        None => run_server(config).await?,
        Some(Commands::Serve { port }) => {
            if let Some(port) = port {
                config.port = port;
            }
            run_server(config).await?;
        }
        Some(Commands::Migrate) => run_migrate(config).await?,
    }

    Ok(())
}
