use anyhow::{Context, Result, bail};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct LatestDeployment {
    docker_url: String,
}

pub fn create_client() -> Result<Client> {
    info!("Initializing beekeeper HTTP client");
    Client::builder()
        .build()
        .context("Failed to build HTTP client")
}

/// Asks beekeeper for the latest approved image reference for an owner/repo
/// pair. A 200 with an empty body means "no answer yet" and maps to
/// `Ok(None)`; any other status is an error. The tag filter is passed through
/// unchanged when configured.
pub async fn fetch_latest_docker_url(
    client: &Client,
    beekeeper_uri: &str,
    owner: &str,
    repo: &str,
    tag_filter: Option<&str>,
) -> Result<Option<String>> {
    let url = format!(
        "{}/deployments/{}/{}/latest",
        beekeeper_uri.trim_end_matches('/'),
        owner,
        repo
    );
    debug!("Fetching latest docker url from {}", url);

    let mut request = client.get(&url);
    if let Some(tags) = tag_filter {
        request = request.query(&[("tags", tags)]);
    }

    let response = request
        .send()
        .await
        .with_context(|| format!("Failed to reach beekeeper at {}", url))?;

    if response.status() != StatusCode::OK {
        bail!(
            "Beekeeper returned status {} for {}/{}",
            response.status(),
            owner,
            repo
        );
    }

    let body = response
        .bytes()
        .await
        .context("Failed to read beekeeper response body")?;
    if body.is_empty() {
        debug!("Beekeeper has no latest deployment for {}/{}", owner, repo);
        return Ok(None);
    }

    let metadata: LatestDeployment =
        serde_json::from_slice(&body).context("Failed to parse beekeeper response body")?;
    Ok(Some(metadata.docker_url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_returns_latest_docker_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/deployments/acme/widgets/latest"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({
                    "docker_url": "acme/widgets:1.3.0"
                })),
            )
            .mount(&server)
            .await;

        let client = create_client().unwrap();
        let latest = fetch_latest_docker_url(&client, &server.uri(), "acme", "widgets", None)
            .await
            .unwrap();
        assert_eq!(latest.as_deref(), Some("acme/widgets:1.3.0"));
    }

    #[tokio::test]
    async fn test_empty_body_means_no_answer_yet() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/deployments/acme/widgets/latest"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = create_client().unwrap();
        let latest = fetch_latest_docker_url(&client, &server.uri(), "acme", "widgets", None)
            .await
            .unwrap();
        assert_eq!(latest, None);
    }

    #[tokio::test]
    async fn test_tag_filter_is_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/deployments/acme/widgets/latest"))
            .and(query_param("tags", "stable"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({
                    "docker_url": "acme/widgets:1.3.0"
                })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = create_client().unwrap();
        let latest =
            fetch_latest_docker_url(&client, &server.uri(), "acme", "widgets", Some("stable"))
                .await
                .unwrap();
        assert_eq!(latest.as_deref(), Some("acme/widgets:1.3.0"));
    }

    #[tokio::test]
    async fn test_non_200_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/deployments/acme/widgets/latest"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = create_client().unwrap();
        let result = fetch_latest_docker_url(&client, &server.uri(), "acme", "widgets", None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_malformed_body_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/deployments/acme/widgets/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = create_client().unwrap();
        let result = fetch_latest_docker_url(&client, &server.uri(), "acme", "widgets", None).await;
        assert!(result.is_err());
    }
}
