use std::sync::Arc;

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use oculex_core::backend::VisionApiBackend;
use oculex_core::ports::NullRecordStore;
use oculex_core::{Orchestrator, RecordStore};
use oculex_server::infra::{AppState, Config, ConfigLoad, HttpFrameFetcher, MIGRATOR,
    PostgresRecordStore};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "oculex-server")]
#[command(about = "Streaming medical-frame analysis server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct ServeArgs {
    /// Bind address; overrides OCULEX_HOST
    #[arg(long)]
    host: Option<String>,

    /// Bind port; overrides OCULEX_PORT
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Database administration
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
}

#[derive(Subcommand, Debug)]
enum DbCommand {
    /// Apply embedded migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new("info,analysis::state=info,tower_http=warn")
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let ConfigLoad { config, warnings } = Config::from_env();
    for warning in &warnings {
        warn!("config: {warning}");
    }

    match cli.command {
        Some(Command::Db {
            command: DbCommand::Migrate,
        }) => migrate(&config).await,
        None => serve(config, cli.serve).await,
    }
}

async fn migrate(config: &Config) -> anyhow::Result<()> {
    let url = config
        .database
        .url
        .as_deref()
        .context("DATABASE_URL must be set to run migrations")?;
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(url)
        .await
        .context("could not connect to the database")?;
    MIGRATOR.run(&pool).await.context("migration failed")?;
    info!("migrations applied");
    Ok(())
}

async fn serve(mut config: Config, args: ServeArgs) -> anyhow::Result<()> {
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let db = match &config.database.url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(8)
                .connect(url)
                .await
                .context("could not connect to the database")?;
            Some(pool)
        }
        None => None,
    };

    let records: Arc<dyn RecordStore> = match &db {
        Some(pool) => Arc::new(PostgresRecordStore::new(pool.clone())),
        None => {
            info!("persistence disabled, using the null record store");
            Arc::new(NullRecordStore)
        }
    };

    let http = reqwest::Client::new();
    let backend = Arc::new(VisionApiBackend::new(http.clone(), config.vision_api()));
    let fetcher = Arc::new(HttpFrameFetcher::new(http));
    let orchestrator = Arc::new(
        Orchestrator::new(backend, fetcher, records)
            .with_retry(config.retry_policy())
            .with_settings(config.analysis_settings()),
    );

    let state = AppState {
        orchestrator,
        db,
        staging_dir: config.analysis.staging_dir.clone(),
        body_limit_bytes: config.server.body_limit_bytes,
    };
    let router = oculex_server::build_router(state, &config.server.cors_origins);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("could not bind {addr}"))?;
    info!(%addr, "oculex-server listening");
    axum::serve(listener, router)
        .await
        .context("server terminated")?;
    Ok(())
}
