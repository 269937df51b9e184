use clap::Parser;

/// Keeps swarm services labeled for automatic updates pinned to the latest
/// image reference approved by the beekeeper service.
#[derive(Parser, Debug, Clone)]
#[command(name = "beekeeper-updater-swarm", version)]
pub struct Config {
    /// Docker daemon to deploy to
    #[arg(
        short = 'd',
        long,
        env = "DOCKER_HOST",
        default_value = "unix:///var/run/docker.sock"
    )]
    pub docker_host: String,

    /// Beekeeper base URI, including any required authentication
    #[arg(long, env = "BEEKEEPER_URI")]
    pub beekeeper_uri: String,

    /// Tag filter forwarded to beekeeper latest-version lookups
    #[arg(long, env = "BEEKEEPER_TAG_FILTER")]
    pub tags: Option<String>,

    /// Seconds between reconciliation passes
    #[arg(long, env = "UPDATE_INTERVAL_SECONDS", default_value_t = 60)]
    pub interval: u64,

    /// Port the health endpoints listen on
    #[arg(long, env = "HEALTH_PORT", default_value_t = 8080)]
    pub port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from([
            "beekeeper-updater-swarm",
            "--beekeeper-uri",
            "https://beekeeper.example.com",
        ])
        .expect("config should parse");

        // DOCKER_HOST from the surrounding environment takes precedence.
        if std::env::var("DOCKER_HOST").is_err() {
            assert_eq!(config.docker_host, "unix:///var/run/docker.sock");
        }
        assert_eq!(config.beekeeper_uri, "https://beekeeper.example.com");
        assert_eq!(config.tags, None);
        assert_eq!(config.interval, 60);
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_all_flags() {
        let config = Config::try_parse_from([
            "beekeeper-updater-swarm",
            "-d",
            "tcp://swarm-manager:2375",
            "--beekeeper-uri",
            "https://beekeeper.example.com",
            "--tags",
            "stable",
            "--interval",
            "30",
            "--port",
            "9090",
        ])
        .expect("config should parse");

        assert_eq!(config.docker_host, "tcp://swarm-manager:2375");
        assert_eq!(config.tags.as_deref(), Some("stable"));
        assert_eq!(config.interval, 30);
        assert_eq!(config.port, 9090);
    }

    #[test]
    fn test_beekeeper_uri_is_required() {
        // Only meaningful when BEEKEEPER_URI is not set in the environment.
        if std::env::var("BEEKEEPER_URI").is_err() {
            assert!(Config::try_parse_from(["beekeeper-updater-swarm"]).is_err());
        }
    }
}
