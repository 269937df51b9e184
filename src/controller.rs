use crate::config::Config;
use crate::image_reference::ImageReference;
use crate::updater::{self, Decision};
use crate::{beekeeper, swarm};
use anyhow::{Context as _, Result};
use bollard::Docker;
use bollard::models::Service;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct Context {
    pub docker: Docker,
    pub http: reqwest::Client,
    pub config: Config,
}

/// What happened to each service over one reconciliation pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum Outcome {
    Updated,
    Unchanged,
    Skipped,
}

/// Runs a pass unless the previous one is still in flight. Passes are
/// strictly sequential; a tick that fires while one is running is dropped,
/// not queued.
pub async fn run_guarded(ctx: &Context, lock: &Mutex<()>) -> Option<Result<PassReport>> {
    let Ok(_guard) = lock.try_lock() else {
        warn!("Previous reconciliation pass still running, skipping this tick");
        return None;
    };
    Some(run(ctx).await)
}

/// Runs one full reconciliation pass. Failing to list services aborts the
/// pass; any error on an individual service is logged and counted, and the
/// loop moves on to the next service.
pub async fn run(ctx: &Context) -> Result<PassReport> {
    let services = swarm::list_update_candidates(&ctx.docker).await?;
    info!(
        "Scanning {} services labeled {}",
        services.len(),
        updater::UPDATE_LABEL
    );

    let report = process_all(ctx, &services).await;

    info!(
        "Pass complete: {} updated, {} unchanged, {} skipped, {} failed",
        report.updated, report.unchanged, report.skipped, report.failed
    );
    Ok(report)
}

async fn process_all(ctx: &Context, services: &[Service]) -> PassReport {
    let mut report = PassReport::default();
    for service in services {
        let service_id = service.id.as_deref().unwrap_or_default();
        match process_service(ctx, service).await {
            Ok(Outcome::Updated) => report.updated += 1,
            Ok(Outcome::Unchanged) => report.unchanged += 1,
            Ok(Outcome::Skipped) => report.skipped += 1,
            Err(e) => {
                report.failed += 1;
                error!("Skipping service {} after error: {:#}", service_id, e);
            }
        }
    }
    report
}

async fn process_service(ctx: &Context, service: &Service) -> Result<Outcome> {
    let service_id = service.id.as_deref().unwrap_or_default();

    if let Err(reason) = updater::eligibility(service) {
        debug!("Skipping service {}: {}", service_id, reason);
        return Ok(Outcome::Skipped);
    }

    // Eligibility guarantees the image is present.
    let current = updater::current_image(service).unwrap_or_default();
    let reference = ImageReference::parse(current)
        .with_context(|| format!("Could not determine repository for image {}", current))?;
    debug!("Service {} runs {}", service_id, reference);

    let latest = beekeeper::fetch_latest_docker_url(
        &ctx.http,
        &ctx.config.beekeeper_uri,
        &reference.owner,
        &reference.repo,
        ctx.config.tags.as_deref(),
    )
    .await
    .with_context(|| {
        format!(
            "Error getting latest docker url for {}/{}",
            reference.owner, reference.repo
        )
    })?;

    match updater::decide(service, latest.as_deref()) {
        Decision::NoAction(reason) => {
            debug!("No action for service {}: {}", service_id, reason);
            Ok(Outcome::Unchanged)
        }
        Decision::Update(target) => {
            info!("Updating service {} from {} to {}", service_id, current, target);
            let version = service
                .version
                .as_ref()
                .and_then(|v| v.index)
                .context("Service record is missing a version token")?;
            let spec = updater::build_update_spec(service, &target, Utc::now());
            swarm::update_service(&ctx.docker, service_id, version, spec).await?;
            Ok(Outcome::Updated)
        }
    }
}
