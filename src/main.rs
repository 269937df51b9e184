use crate::config::Config;
use crate::controller::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

mod beekeeper;
mod config;
mod controller;
mod image_reference;
mod swarm;
mod updater;
mod webserver;

#[cfg(target_env = "musl")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    info!("Starting beekeeper-updater-swarm {}", env!("CARGO_PKG_VERSION"));

    let config = Config::parse();
    info!("Docker host: {}", config.docker_host);
    info!("Beekeeper URI: {}", config.beekeeper_uri);
    if let Some(tags) = &config.tags {
        info!("Tag filter: {}", tags);
    }

    let docker = swarm::create_client(&config.docker_host).await?;
    let http = beekeeper::create_client()?;
    let ctx = Context {
        docker,
        http,
        config: config.clone(),
    };

    info!("Scheduling a reconciliation pass every {} seconds", config.interval);
    // Passes are strictly sequential; a tick firing while one is still
    // running is skipped, and shutdown waits on this lock for the in-flight
    // pass to finish.
    let pass_lock = Arc::new(Mutex::new(()));
    let job_lock = pass_lock.clone();
    let mut scheduler = JobScheduler::new().await?;
    let job = Job::new_repeated_async(Duration::from_secs(config.interval), move |_uuid, _l| {
        let ctx = ctx.clone();
        let lock = job_lock.clone();
        Box::pin(async move {
            if let Some(Err(e)) = controller::run_guarded(&ctx, &lock).await {
                error!("Reconciliation pass failed: {:#}", e);
            }
        })
    })?;
    scheduler.add(job).await?;
    scheduler.start().await?;

    let app = webserver::create_app();
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting webserver on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // No new pass is scheduled past this point; the lock drains once any
    // in-flight pass has finished.
    info!("Shutdown signal received, stopping scheduler");
    scheduler.shutdown().await?;
    let _in_flight = pass_lock.lock().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
