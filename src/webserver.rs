use axum::{Json, Router, routing::get};
use serde::Serialize;

/// Reported on both probes; the updater has no warm-up phase, so readiness
/// and liveness coincide once the clients are constructed and the listener
/// is up.
#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "up",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn create_app() -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/readyz", get(health))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_reports_status_and_version() {
        let Json(body) = health().await;
        assert_eq!(body.status, "up");
        assert_eq!(body.version, env!("CARGO_PKG_VERSION"));
    }
}
