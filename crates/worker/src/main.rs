//! UserLab background worker
//!
//! Scheduled jobs: payment retry drain, stale pending sweep, and subscription
//! period rollover.

mod retry_worker;
mod sweeps;

use std::sync::Arc;

use anyhow::Context;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use userlab_billing::HttpGateway;
use userlab_shared::db;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "userlab_worker=info,userlab_billing=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL required")?;
    let gateway_base_url = std::env::var("GATEWAY_BASE_URL")
        .unwrap_or_else(|_| "https://api.gateway.example".to_string());
    let gateway_api_key = std::env::var("GATEWAY_API_KEY").context("GATEWAY_API_KEY required")?;

    let pool = db::create_pool(&database_url)
        .await
        .context("Failed to connect to database")?;
    let gateway = Arc::new(
        HttpGateway::new(gateway_base_url, gateway_api_key)
            .map_err(|e| anyhow::anyhow!("Failed to build gateway client: {}", e))?,
    );

    let scheduler = JobScheduler::new().await?;

    // Payment retry drain every 5 minutes
    {
        let pool = pool.clone();
        let gateway = gateway.clone();
        scheduler
            .add(Job::new_async("0 */5 * * * *", move |_uuid, _lock| {
                let pool = pool.clone();
                let gateway = gateway.clone();
                Box::pin(async move {
                    retry_worker::drain_retry_queue(&pool, gateway.as_ref()).await;
                })
            })?)
            .await?;
    }

    // Stale pending payment sweep, hourly
    {
        let pool = pool.clone();
        scheduler
            .add(Job::new_async("0 10 * * * *", move |_uuid, _lock| {
                let pool = pool.clone();
                Box::pin(async move {
                    sweeps::sweep_stale_pending(&pool).await;
                })
            })?)
            .await?;
    }

    // Subscription period rollover, hourly
    {
        let pool = pool.clone();
        scheduler
            .add(Job::new_async("0 20 * * * *", move |_uuid, _lock| {
                let pool = pool.clone();
                Box::pin(async move {
                    sweeps::sweep_period_rollover(&pool).await;
                })
            })?)
            .await?;
    }

    scheduler.start().await?;
    tracing::info!("Worker scheduler started");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Worker shutting down");

    Ok(())
}
