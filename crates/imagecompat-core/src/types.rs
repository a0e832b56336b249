use crate::error::{ImageCompatError, Result};
use std::fmt;

/// Registry implied when the reference names none
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Tag implied when the reference carries neither tag nor digest
pub const DEFAULT_TAG: &str = "latest";

/// Host serving the distribution API for `docker.io`
const DOCKER_HUB_HOST: &str = "registry-1.docker.io";

const MAX_REPOSITORY_LEN: usize = 255;
const MAX_TAG_LEN: usize = 128;
const MIN_DIGEST_HEX_LEN: usize = 32;

/// A parsed container image reference
///
/// The original string is kept verbatim and used as the image identity:
/// two references that normalize to the same repository but are spelled
/// differently are treated as different images.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    original: String,
    /// Registry host, optionally with port (e.g., "docker.io", "localhost:5000")
    pub registry: String,
    /// Repository path within the registry (e.g., "library/nginx")
    pub repository: String,
    /// Tag, if any
    pub tag: Option<String>,
    /// Digest in `algorithm:hex` form, if any
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse an image reference of the form `[registry/]repository[:tag][@digest]`
    pub fn parse(image: &str) -> Result<Self> {
        let trimmed = image.trim();
        if trimmed.is_empty() {
            return Err(ImageCompatError::reference_parse(image, "reference is empty"));
        }

        let (name_and_tag, digest) = match trimmed.split_once('@') {
            Some((name, digest)) => {
                validate_digest(image, digest)?;
                (name, Some(digest.to_string()))
            }
            None => (trimmed, None),
        };

        // A ':' only introduces a tag when it follows the last path separator,
        // otherwise it belongs to a registry port.
        let last_slash = name_and_tag.rfind('/');
        let (name, tag) = match name_and_tag.rfind(':') {
            Some(idx) if last_slash.map_or(true, |slash| idx > slash) => {
                (&name_and_tag[..idx], Some(&name_and_tag[idx + 1..]))
            }
            _ => (name_and_tag, None),
        };

        if let Some(tag) = tag {
            validate_tag(image, tag)?;
        }

        let (registry, repository) = match name.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first.to_string(), rest.to_string())
            }
            _ => (DEFAULT_REGISTRY.to_string(), name.to_string()),
        };

        let repository = if registry == DEFAULT_REGISTRY && !repository.contains('/') {
            format!("library/{}", repository)
        } else {
            repository
        };

        validate_repository(image, &repository)?;

        let tag = match (tag, &digest) {
            (Some(tag), _) => Some(tag.to_string()),
            (None, None) => Some(DEFAULT_TAG.to_string()),
            (None, Some(_)) => None,
        };

        Ok(Self {
            original: trimmed.to_string(),
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// The reference exactly as written in the pod spec
    pub fn identity(&self) -> &str {
        &self.original
    }

    /// Tag or digest addressing the image manifest (digest wins)
    pub fn manifest_reference(&self) -> &str {
        self.digest
            .as_deref()
            .or(self.tag.as_deref())
            .unwrap_or(DEFAULT_TAG)
    }

    /// Host to contact for distribution API calls
    pub fn registry_host(&self) -> &str {
        if self.registry == DEFAULT_REGISTRY {
            DOCKER_HUB_HOST
        } else {
            &self.registry
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

fn validate_digest(image: &str, digest: &str) -> Result<()> {
    let (algorithm, encoded) = digest.split_once(':').ok_or_else(|| {
        ImageCompatError::reference_parse(image, "digest must have the form algorithm:hex")
    })?;

    let algorithm_ok = !algorithm.is_empty()
        && algorithm
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "+._-".contains(c));
    if !algorithm_ok {
        return Err(ImageCompatError::reference_parse(
            image,
            format!("invalid digest algorithm '{}'", algorithm),
        ));
    }

    if encoded.len() < MIN_DIGEST_HEX_LEN || !encoded.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ImageCompatError::reference_parse(
            image,
            format!("invalid digest '{}'", encoded),
        ));
    }

    Ok(())
}

fn validate_tag(image: &str, tag: &str) -> Result<()> {
    let valid = !tag.is_empty()
        && tag.len() <= MAX_TAG_LEN
        && !tag.starts_with('.')
        && !tag.starts_with('-')
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-');

    if !valid {
        return Err(ImageCompatError::reference_parse(
            image,
            format!("invalid tag '{}'", tag),
        ));
    }
    Ok(())
}

fn validate_repository(image: &str, repository: &str) -> Result<()> {
    if repository.len() > MAX_REPOSITORY_LEN {
        return Err(ImageCompatError::reference_parse(
            image,
            format!("repository name exceeds {} characters", MAX_REPOSITORY_LEN),
        ));
    }

    if let Some(component) = repository
        .split('/')
        .find(|component| !is_valid_path_component(component))
    {
        return Err(ImageCompatError::reference_parse(
            image,
            format!("invalid repository component '{}'", component),
        ));
    }

    Ok(())
}

/// Lowercase alphanumerics joined by ".", "_", "__" or a run of "-"
fn is_valid_path_component(component: &str) -> bool {
    let is_alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();

    let (Some(first), Some(last)) = (component.chars().next(), component.chars().last()) else {
        return false;
    };
    if !is_alnum(first) || !is_alnum(last) {
        return false;
    }

    if !component
        .chars()
        .all(|c| is_alnum(c) || c == '.' || c == '_' || c == '-')
    {
        return false;
    }

    component
        .split(is_alnum)
        .filter(|sep| !sep.is_empty())
        .all(|sep| sep == "." || sep == "_" || sep == "__" || sep.chars().all(|c| c == '-'))
}
