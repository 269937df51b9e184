use crate::updater::UPDATE_LABEL;
use anyhow::{Context, Result};
use bollard::models::{Service, ServiceSpec};
use bollard::service::{ListServicesOptions, UpdateServiceOptions};
use bollard::{API_DEFAULT_VERSION, Docker};
use std::collections::HashMap;
use tracing::{debug, info, warn};

static CONNECT_TIMEOUT_SECONDS: u64 = 30;

pub async fn create_client(docker_host: &str) -> Result<Docker> {
    info!("Initializing Docker client for {}", docker_host);
    let docker = if let Some(path) = docker_host.strip_prefix("unix://") {
        Docker::connect_with_unix(path, CONNECT_TIMEOUT_SECONDS, API_DEFAULT_VERSION)
    } else if let Some(addr) = docker_host.strip_prefix("tcp://") {
        // Docker convention spells plain-HTTP endpoints as tcp://.
        let addr = format!("http://{}", addr);
        Docker::connect_with_http(&addr, CONNECT_TIMEOUT_SECONDS, API_DEFAULT_VERSION)
    } else {
        Docker::connect_with_http(docker_host, CONNECT_TIMEOUT_SECONDS, API_DEFAULT_VERSION)
    }
    .with_context(|| format!("Failed to connect to Docker daemon at {}", docker_host))?;

    let version = docker
        .version()
        .await
        .context("Failed to query Docker daemon version")?;
    info!(
        "Connected to Docker daemon, version {} (API {})",
        version.version.as_deref().unwrap_or("unknown"),
        version.api_version.as_deref().unwrap_or("unknown"),
    );
    Ok(docker)
}

/// Lists services carrying the opt-in label. The filter matches on label
/// presence only; the caller re-checks the value.
pub async fn list_update_candidates(docker: &Docker) -> Result<Vec<Service>> {
    let options = ListServicesOptions {
        filters: HashMap::from([("label", vec![UPDATE_LABEL])]),
        ..Default::default()
    };
    docker
        .list_services(Some(options))
        .await
        .context("Failed to list services")
}

/// Submits a service update carrying the version token read during this
/// pass's listing. A stale token makes the daemon reject the update, which
/// the caller treats as an ordinary per-service error.
pub async fn update_service(
    docker: &Docker,
    id: &str,
    version: u64,
    spec: ServiceSpec,
) -> Result<()> {
    debug!("Submitting update for service {} at version {}", id, version);
    let options = UpdateServiceOptions {
        version,
        ..Default::default()
    };
    let response = docker
        .update_service(id, spec, options, None)
        .await
        .with_context(|| format!("Failed to update service {}", id))?;

    for warning in response.warnings.unwrap_or_default() {
        warn!("Service {} update warning: {}", id, warning);
    }
    Ok(())
}
