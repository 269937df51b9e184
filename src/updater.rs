use crate::image_reference::strip_digest;
use bollard::models::{
    Service, ServiceSpec, ServiceSpecUpdateConfig, ServiceSpecUpdateConfigFailureActionEnum,
    ServiceUpdateStatusStateEnum, TaskSpec, TaskSpecContainerSpec,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;

/// Opt-in marker; only services labeled `"true"` are ever considered.
pub static UPDATE_LABEL: &str = "octoblu.beekeeper.update";
/// Image reference applied by the previous update this process issued.
pub static LAST_DOCKER_URL_LABEL: &str = "octoblu.beekeeper.lastDockerURL";
/// RFC 3339 timestamp of that update.
pub static LAST_UPDATED_AT_LABEL: &str = "octoblu.beekeeper.lastUpdatedAt";

/// Why a service was dropped from a pass before any beekeeper lookup.
#[derive(Debug, PartialEq, Eq)]
pub enum SkipReason {
    NotOptedIn,
    NoImage,
    UpdateInFlight,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotOptedIn => write!(f, "not opted in to automatic updates"),
            SkipReason::NoImage => write!(f, "service has no image reference"),
            SkipReason::UpdateInFlight => write!(f, "an update is already in progress"),
        }
    }
}

/// Outcome of the update decision for one eligible service.
#[derive(Debug, PartialEq, Eq)]
pub enum Decision {
    NoAction(NoActionReason),
    Update(String),
}

#[derive(Debug, PartialEq, Eq)]
pub enum NoActionReason {
    NoLatestVersion,
    AlreadyCurrent,
    AlreadyFailed,
}

impl fmt::Display for NoActionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoActionReason::NoLatestVersion => write!(f, "beekeeper has no latest version yet"),
            NoActionReason::AlreadyCurrent => write!(f, "already running the latest version"),
            NoActionReason::AlreadyFailed => {
                write!(f, "last update to this version failed, not retrying")
            }
        }
    }
}

pub fn current_image(service: &Service) -> Option<&str> {
    service
        .spec
        .as_ref()
        .and_then(|spec| spec.task_template.as_ref())
        .and_then(|task| task.container_spec.as_ref())
        .and_then(|container| container.image.as_deref())
        .filter(|image| !image.is_empty())
}

fn service_label<'a>(service: &'a Service, key: &str) -> Option<&'a str> {
    service
        .spec
        .as_ref()
        .and_then(|spec| spec.labels.as_ref())
        .and_then(|labels| labels.get(key))
        .map(String::as_str)
}

fn update_state(service: &Service) -> Option<ServiceUpdateStatusStateEnum> {
    service.update_status.as_ref().and_then(|status| status.state)
}

/// Decides whether a service belongs in this pass at all. The label filter on
/// the list call narrows the candidates, but the label value is re-verified
/// here; the server-side filter only matches on presence.
pub fn eligibility(service: &Service) -> Result<(), SkipReason> {
    if service_label(service, UPDATE_LABEL) != Some("true") {
        return Err(SkipReason::NotOptedIn);
    }
    if current_image(service).is_none() {
        return Err(SkipReason::NoImage);
    }
    // Never race an update that the swarm is still rolling out.
    if update_state(service) == Some(ServiceUpdateStatusStateEnum::UPDATING) {
        return Err(SkipReason::UpdateInFlight);
    }
    Ok(())
}

/// Decides what to do with an eligible service given the beekeeper's answer.
///
/// "Already current" is checked before the paused-state bookkeeping so that a
/// paused service whose image already matches the target never re-triggers.
/// A paused service is only held back from the exact version recorded in
/// `lastDockerURL`; a genuinely new version is always worth attempting.
pub fn decide(service: &Service, latest: Option<&str>) -> Decision {
    let Some(latest) = latest.filter(|url| !url.is_empty()) else {
        return Decision::NoAction(NoActionReason::NoLatestVersion);
    };

    let current = current_image(service).unwrap_or_default();
    if strip_digest(latest) == strip_digest(current) {
        return Decision::NoAction(NoActionReason::AlreadyCurrent);
    }

    if update_state(service) == Some(ServiceUpdateStatusStateEnum::PAUSED)
        && service_label(service, LAST_DOCKER_URL_LABEL) == Some(latest)
    {
        return Decision::NoAction(NoActionReason::AlreadyFailed);
    }

    Decision::Update(latest.to_string())
}

/// One update step touches at most ~10% of replicas, and always at least one.
/// Global (non-replicated) services fall back to 1.
pub fn rollout_parallelism(spec: &ServiceSpec) -> i64 {
    let replicas = spec
        .mode
        .as_ref()
        .and_then(|mode| mode.replicated.as_ref())
        .and_then(|replicated| replicated.replicas);
    match replicas {
        Some(count) if count > 0 => count / 10 + 1,
        _ => 1,
    }
}

/// Builds the mutated spec for the update call: new image, bookkeeping
/// labels, bounded rollout parallelism and a pause-on-failure policy.
/// Everything else is carried over from the listed spec untouched, so fields
/// owned by other controllers survive the update.
pub fn build_update_spec(service: &Service, target: &str, now: DateTime<Utc>) -> ServiceSpec {
    let mut spec = service.spec.clone().unwrap_or_default();
    let parallelism = rollout_parallelism(&spec);

    let task_template = spec.task_template.get_or_insert_with(TaskSpec::default);
    let container_spec = task_template
        .container_spec
        .get_or_insert_with(TaskSpecContainerSpec::default);
    container_spec.image = Some(target.to_string());

    let labels = spec.labels.get_or_insert_with(HashMap::new);
    labels.insert(LAST_DOCKER_URL_LABEL.to_string(), target.to_string());
    labels.insert(LAST_UPDATED_AT_LABEL.to_string(), now.to_rfc3339());

    let update_config = spec
        .update_config
        .get_or_insert_with(ServiceSpecUpdateConfig::default);
    update_config.parallelism = Some(parallelism);
    update_config.failure_action = Some(ServiceSpecUpdateConfigFailureActionEnum::PAUSE);

    spec
}
