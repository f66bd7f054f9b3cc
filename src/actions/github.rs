//! GitHub Releases backend

use crate::actions::release::{PublishError, Release, ReleaseAsset, ReleasePublisher, ReleaseRequest};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_API_URL: &str = "https://api.github.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const USER_AGENT: &str = concat!("biscuit-ci/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct ReleaseResponse {
    id: u64,
    tag_name: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    body: Option<String>,
    draft: bool,
    prerelease: bool,
    html_url: String,
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct AssetResponse {
    name: String,
    #[serde(default)]
    content_type: String,
    size: u64,
    browser_download_url: String,
}

/// Publishes releases to a GitHub repository through the REST API
#[derive(Debug, Clone)]
pub struct GitHubReleasePublisher {
    client: reqwest::Client,
    api_url: String,
    repository: String,
}

impl GitHubReleasePublisher {
    /// Create a publisher for `owner/name`
    pub fn new(repository: impl Into<String>) -> Result<Self, PublishError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| PublishError::Http(e.to_string()))?;

        Ok(Self {
            client,
            api_url: DEFAULT_API_URL.to_string(),
            repository: repository.into(),
        })
    }

    /// Point at a GitHub Enterprise API
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    fn releases_url(&self) -> String {
        format!("{}/repos/{}/releases", self.api_url, self.repository)
    }
}

/// Drop the RFC 6570 query template GitHub appends to `upload_url`
pub fn strip_url_template(url: &str) -> &str {
    match url.find('{') {
        Some(idx) => &url[..idx],
        None => url,
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, PublishError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(PublishError::Api {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl ReleasePublisher for GitHubReleasePublisher {
    async fn create_release(
        &self,
        request: &ReleaseRequest,
        token: Option<&str>,
    ) -> Result<Release, PublishError> {
        let token = token.ok_or(PublishError::MissingToken)?;
        let url = self.releases_url();
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
            .json(request)
            .send()
            .await
            .map_err(|e| PublishError::Http(e.to_string()))?;

        let created: ReleaseResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PublishError::Http(e.to_string()))?;

        info!("Created GitHub release {} ({})", created.tag_name, created.html_url);
        Ok(Release {
            id: created.id.to_string(),
            name: created.name.unwrap_or_else(|| created.tag_name.clone()),
            tag_name: created.tag_name,
            body: created.body,
            draft: created.draft,
            prerelease: created.prerelease,
            html_url: created.html_url,
            upload_url: created.upload_url,
            assets: Vec::new(),
        })
    }

    async fn upload_asset(
        &self,
        upload_url: &str,
        asset_path: &Path,
        name: &str,
        content_type: &str,
        token: Option<&str>,
    ) -> Result<ReleaseAsset, PublishError> {
        let token = token.ok_or(PublishError::MissingToken)?;
        let url = strip_url_template(upload_url);
        if !url.starts_with("http") {
            return Err(PublishError::InvalidUploadUrl(upload_url.to_string()));
        }

        let bytes = tokio::fs::read(asset_path)
            .await
            .map_err(|e| PublishError::io(asset_path, e))?;
        debug!("POST {} ({} bytes)", url, bytes.len());

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .query(&[("name", name)])
            .header("Content-Type", content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| PublishError::Http(e.to_string()))?;

        let uploaded: AssetResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PublishError::Http(e.to_string()))?;

        info!("Uploaded release asset {}", uploaded.name);
        Ok(ReleaseAsset {
            name: uploaded.name,
            content_type: if uploaded.content_type.is_empty() {
                content_type.to_string()
            } else {
                uploaded.content_type
            },
            size: uploaded.size,
            download_url: uploaded.browser_download_url,
        })
    }
}
