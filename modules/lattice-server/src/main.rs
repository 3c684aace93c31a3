use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{FixedOffset, Utc};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use lattice_common::AppConfig;
use lattice_notify::{NoopMailer, WebhookMailer};
use lattice_recs::{run_on_cadence, Cadence, Mailer, RecommendationJobs, RunOrchestrator};
use lattice_server::routes;
use lattice_store::{PgDirectory, PgRunStore};

#[derive(Parser)]
#[command(name = "lattice-server", about = "Lattice member recommendation server")]
struct Cli {
    /// Override the port from the environment
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting lattice-server");

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let port = cli.port.unwrap_or(config.port);

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    tracing::info!("Connected to database");

    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Migrations complete");

    let directory = Arc::new(PgDirectory::new(pool.clone()));
    let runs = Arc::new(PgRunStore::new(pool));

    let mailer: Arc<dyn Mailer> = match (&config.mailer_webhook_url, &config.mailer_from) {
        (Some(url), Some(from)) => Arc::new(WebhookMailer::new(url.clone(), from.clone())),
        _ => {
            tracing::warn!("MAILER_WEBHOOK_URL or MAILER_FROM not set, emails are logged and dropped");
            Arc::new(NoopMailer)
        }
    };

    let orchestrator = Arc::new(RunOrchestrator::new(
        directory.clone(),
        runs.clone(),
        mailer,
    ));
    let jobs = Arc::new(RecommendationJobs::new(
        orchestrator.clone(),
        directory,
        runs,
        config.recommendations_enabled,
    ));

    let offset = FixedOffset::east_opt(config.schedule_utc_offset_hours * 3600)
        .context("SCHEDULE_UTC_OFFSET_HOURS out of range")?;

    {
        let jobs = jobs.clone();
        tokio::spawn(async move {
            run_on_cadence(
                "example",
                Cadence::DailyAt { hour: 9, minute: 0 },
                offset,
                || {
                    let jobs = jobs.clone();
                    async move { jobs.run_example_job().await }
                },
            )
            .await;
        });
    }
    {
        let jobs = jobs.clone();
        tokio::spawn(async move {
            run_on_cadence(
                "bimonthly",
                Cadence::SemiMonthlyAt { hour: 9, minute: 30 },
                offset,
                || {
                    let jobs = jobs.clone();
                    async move { jobs.run_bimonthly_job(Utc::now()).await }
                },
            )
            .await;
        });
    }

    let app = routes::build_router(routes::AppState { orchestrator, jobs });

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Listening");
    axum::serve(listener, app).await?;

    Ok(())
}
