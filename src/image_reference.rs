use std::fmt;

/// The owner/repo/tag triple the beekeeper service keys deployments on,
/// extracted from a docker image reference such as
/// `registry.example.com/acme/widgets:1.2.0@sha256:abc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub owner: String,
    pub repo: String,
    pub tag: String,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    MissingOwner,
    MissingRepo,
    MissingTag(String),
    InvalidFormat(String),
}

impl std::error::Error for ParseError {}
impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::MissingOwner => write!(f, "repository owner is missing"),
            ParseError::MissingRepo => write!(f, "repository name is missing"),
            ParseError::MissingTag(image) => write!(f, "image reference has no tag: {}", image),
            ParseError::InvalidFormat(image) => write!(f, "invalid image reference: {}", image),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.owner, self.repo, self.tag)
    }
}

/// Returns the reference without its content digest suffix, if any.
pub fn strip_digest(image: &str) -> &str {
    image.split('@').next().unwrap_or(image)
}

impl ImageReference {
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        // A digest pins a specific manifest; only repo and tag identity
        // matter here, so it is dropped before anything else.
        let without_digest = strip_digest(s);

        let parts: Vec<&str> = without_digest.split(':').collect();
        let (path, tag) = match parts.as_slice() {
            [path, tag] => (*path, *tag),
            [_] => return Err(ParseError::MissingTag(s.to_string())),
            // More than one colon means a registry host with a port, which
            // the beekeeper deployment namespace cannot represent.
            _ => return Err(ParseError::InvalidFormat(s.to_string())),
        };

        let segments: Vec<&str> = path.split('/').collect();
        let (owner, repo) = match segments.as_slice() {
            [owner, repo] => (*owner, *repo),
            // Three segments carry a registry host prefix; drop it.
            [_, owner, repo] => (*owner, *repo),
            _ => return Err(ParseError::InvalidFormat(s.to_string())),
        };

        if owner.is_empty() {
            return Err(ParseError::MissingOwner);
        }
        if repo.is_empty() {
            return Err(ParseError::MissingRepo);
        }

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            tag: tag.to_string(),
        })
    }
}
