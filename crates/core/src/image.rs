//! Container image references (`[registry/]repository[:tag][@digest]`).

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

const DOCKER_HUB: &str = "index.docker.io";

static COMPONENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*$").unwrap());
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w][\w.-]{0,127}$").unwrap());
static DIGEST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9]*(?:[-_+.][A-Za-z][A-Za-z0-9]*)*:[0-9a-fA-F]{32,}$").unwrap());
static REGISTRY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9.-]+(?::[0-9]+)?$").unwrap());

/// A parsed and normalized image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    registry: String,
    repository: String,
    tag: Option<String>,
    digest: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid image reference {reference:?}: {reason}")]
pub struct ImageRefError {
    pub reference: String,
    pub reason: &'static str,
}

impl ImageRef {
    /// `registry/repository`, without tag or digest.
    pub fn name(&self) -> String {
        format!("{}/{}", self.registry, self.repository)
    }

    pub fn registry(&self) -> &str {
        &self.registry
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Last path segment of the repository, e.g. `app` for `gcr.io/proj/app`.
    pub fn repository_suffix(&self) -> &str {
        self.repository.rsplit('/').next().unwrap_or(&self.repository)
    }

    /// `registry/repository@digest`.
    pub fn pinned(&self, digest: &str) -> String {
        format!("{}@{}", self.name(), digest)
    }

    /// Compare two references ignoring tag and digest. Unparseable input never matches.
    pub fn same_repository(a: &str, b: &str) -> bool {
        match (a.parse::<ImageRef>(), b.parse::<ImageRef>()) {
            (Ok(a), Ok(b)) => a.registry == b.registry && a.repository == b.repository,
            _ => false,
        }
    }
}

impl FromStr for ImageRef {
    type Err = ImageRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason| ImageRefError { reference: s.to_string(), reason };
        if s.is_empty() {
            return Err(err("empty"));
        }
        let (rest, digest) = match s.split_once('@') {
            Some((r, d)) => {
                if !DIGEST_RE.is_match(d) {
                    return Err(err("bad digest"));
                }
                (r, Some(d.to_string()))
            }
            None => (s, None),
        };
        // a ':' after the last '/' starts the tag; earlier ones belong to a registry port
        let (rest, tag) = match rest.rfind(':') {
            Some(i) if !rest[i..].contains('/') => {
                let t = &rest[i + 1..];
                if !TAG_RE.is_match(t) {
                    return Err(err("bad tag"));
                }
                (&rest[..i], Some(t.to_string()))
            }
            _ => (rest, None),
        };
        let (registry, repository) = match rest.split_once('/') {
            Some((first, repo)) if first.contains('.') || first.contains(':') || first == "localhost" => {
                if !REGISTRY_RE.is_match(first) {
                    return Err(err("bad registry"));
                }
                let registry = if first == "docker.io" { DOCKER_HUB } else { first };
                (registry.to_string(), repo.to_string())
            }
            _ => (DOCKER_HUB.to_string(), rest.to_string()),
        };
        if repository.is_empty() || !repository.split('/').all(|c| COMPONENT_RE.is_match(c)) {
            return Err(err("bad repository"));
        }
        let repository = if registry == DOCKER_HUB && !repository.contains('/') {
            format!("library/{}", repository)
        } else {
            repository
        };
        Ok(Self { registry, repository, tag, digest })
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())?;
        if let Some(t) = &self.tag {
            write!(f, ":{}", t)?;
        }
        if let Some(d) = &self.digest {
            write!(f, "@{}", d)?;
        }
        Ok(())
    }
}
