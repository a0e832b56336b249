use crate::error::{ClientError, Result};
use crate::traits::{ArtifactClient, FetchOptions};
use async_trait::async_trait;
use imagecompat_core::{
    from_yaml, CompatibilitySpec, ImageReference, COMPATIBILITY_ARTIFACT_TYPE,
    COMPATIBILITY_SPEC_MEDIA_TYPE,
};
use reqwest::header::{ACCEPT, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
const DOCKER_MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
const CONTENT_DIGEST_HEADER: &str = "docker-content-digest";

/// Largest compatibility document accepted from a registry
pub const MAX_BLOB_SIZE: u64 = 1024 * 1024;

/// Content descriptor as used in OCI indexes and manifests
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Descriptor {
    #[serde(default)]
    media_type: Option<String>,
    digest: String,
    #[serde(default)]
    artifact_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Index {
    #[serde(default)]
    manifests: Vec<Descriptor>,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    layers: Vec<Descriptor>,
}

/// Artifact client speaking the OCI distribution API
///
/// Finds the compatibility artifact through the referrers API of the image
/// manifest and decodes the YAML layer it carries. Requests are anonymous.
pub struct RegistryArtifactClient {
    client: Client,
}

impl RegistryArtifactClient {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Base URL of the repository, e.g. `https://quay.io/v2/org/app`
    fn repository_url(reference: &ImageReference, options: &FetchOptions) -> String {
        let scheme = if options.plain_http { "http" } else { "https" };
        format!(
            "{}://{}/v2/{}",
            scheme,
            reference.registry_host(),
            reference.repository
        )
    }

    /// HEAD /v2/{repository}/manifests/{tag}
    async fn resolve_digest(&self, reference: &ImageReference, base: &str) -> Result<String> {
        if let Some(digest) = &reference.digest {
            return Ok(digest.clone());
        }

        let url = format!("{}/manifests/{}", base, reference.manifest_reference());
        debug!("HEAD {}", url);

        let accept = [OCI_INDEX, OCI_MANIFEST, DOCKER_MANIFEST_LIST, DOCKER_MANIFEST].join(", ");
        let resp = self
            .client
            .head(&url)
            .header(ACCEPT, accept)
            .send()
            .await
            .map_err(|e| fetch_error(reference, format!("HTTP request failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(fetch_error(
                reference,
                format!("HEAD manifest failed with status {}", resp.status()),
            ));
        }

        resp.headers()
            .get(CONTENT_DIGEST_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                fetch_error(
                    reference,
                    format!("registry did not return a {} header", CONTENT_DIGEST_HEADER),
                )
            })
    }

    /// GET /v2/{repository}/referrers/{digest}?artifactType=...
    async fn find_compatibility_manifest(
        &self,
        reference: &ImageReference,
        base: &str,
        digest: &str,
    ) -> Result<String> {
        let url = format!("{}/referrers/{}", base, digest);
        debug!("GET {}", url);

        let resp = self
            .client
            .get(&url)
            .query(&[("artifactType", COMPATIBILITY_ARTIFACT_TYPE)])
            .header(ACCEPT, HeaderValue::from_static(OCI_INDEX))
            .send()
            .await
            .map_err(|e| fetch_error(reference, format!("HTTP request failed: {}", e)))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(fetch_error(reference, "compatibility artifact not found"));
        }
        if !resp.status().is_success() {
            return Err(fetch_error(
                reference,
                format!("GET referrers failed with status {}", resp.status()),
            ));
        }

        let index: Index = resp
            .json()
            .await
            .map_err(|e| fetch_error(reference, format!("Failed to parse referrers: {}", e)))?;

        // Registries may ignore the artifactType filter
        index
            .manifests
            .into_iter()
            .find(|d| d.artifact_type.as_deref() == Some(COMPATIBILITY_ARTIFACT_TYPE))
            .map(|d| d.digest)
            .ok_or_else(|| fetch_error(reference, "compatibility artifact not found"))
    }

    /// GET /v2/{repository}/manifests/{digest}
    async fn fetch_manifest(
        &self,
        reference: &ImageReference,
        base: &str,
        digest: &str,
    ) -> Result<Manifest> {
        let url = format!("{}/manifests/{}", base, digest);
        debug!("GET {}", url);

        let resp = self
            .client
            .get(&url)
            .header(ACCEPT, HeaderValue::from_static(OCI_MANIFEST))
            .send()
            .await
            .map_err(|e| fetch_error(reference, format!("HTTP request failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(fetch_error(
                reference,
                format!("GET artifact manifest failed with status {}", resp.status()),
            ));
        }

        resp.json()
            .await
            .map_err(|e| fetch_error(reference, format!("Failed to parse manifest: {}", e)))
    }

    /// GET /v2/{repository}/blobs/{digest}
    async fn fetch_blob(&self, reference: &ImageReference, base: &str, digest: &str) -> Result<String> {
        let url = format!("{}/blobs/{}", base, digest);
        debug!("GET {}", url);

        let mut resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| fetch_error(reference, format!("HTTP request failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(fetch_error(
                reference,
                format!("GET blob failed with status {}", resp.status()),
            ));
        }

        if let Some(length) = resp.content_length() {
            if length > MAX_BLOB_SIZE {
                return Err(fetch_error(
                    reference,
                    format!("blob {} exceeds {} bytes", digest, MAX_BLOB_SIZE),
                ));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| fetch_error(reference, format!("Failed to read blob: {}", e)))?
        {
            if (body.len() + chunk.len()) as u64 > MAX_BLOB_SIZE {
                return Err(fetch_error(
                    reference,
                    format!("blob {} exceeds {} bytes", digest, MAX_BLOB_SIZE),
                ));
            }
            body.extend_from_slice(&chunk);
        }

        String::from_utf8(body)
            .map_err(|e| fetch_error(reference, format!("blob is not UTF-8: {}", e)))
    }
}

impl Default for RegistryArtifactClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactClient for RegistryArtifactClient {
    async fn fetch_compatibility_spec(
        &self,
        reference: &ImageReference,
        options: &FetchOptions,
    ) -> Result<CompatibilitySpec> {
        let base = Self::repository_url(reference, options);

        let image_digest = self.resolve_digest(reference, &base).await?;
        let manifest_digest = self
            .find_compatibility_manifest(reference, &base, &image_digest)
            .await?;
        let manifest = self
            .fetch_manifest(reference, &base, &manifest_digest)
            .await?;

        let layer = manifest
            .layers
            .iter()
            .find(|l| l.media_type.as_deref() == Some(COMPATIBILITY_SPEC_MEDIA_TYPE))
            .or_else(|| manifest.layers.first())
            .ok_or_else(|| fetch_error(reference, "compatibility artifact has no layers"))?;

        let document = self.fetch_blob(reference, &base, &layer.digest).await?;

        from_yaml(&document).map_err(|e| {
            fetch_error(reference, format!("malformed compatibility specification: {}", e))
        })
    }
}

fn fetch_error(reference: &ImageReference, message: impl Into<String>) -> ClientError {
    ClientError::artifact_fetch(reference.identity(), message)
}
