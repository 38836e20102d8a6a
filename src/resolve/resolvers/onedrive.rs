//! OneDrive short share links (`https://1drv.ms/...`).
//!
//! Share links are encoded as `u!<base64url>` share ids and looked up through
//! the OneDrive shares API, whose drive item carries a pre-authenticated
//! download URL. When the origin rejects that URL, the `root/content`
//! redirect endpoint is offered once as a fallback.

use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use base64::Engine;
use mediafetch_common::paths::classify_path;
use mediafetch_common::Quality;
use serde::Deserialize;
use url::Url;

use crate::resolve::resolver::{Resolution, ResolveError, Resolver};
use crate::resolve::ttl_cache::TtlCache;

const DEFAULT_API_BASE: &str = "https://api.onedrive.com/v1.0/";

/// How long a share link stays without a second fallback.
const EXHAUSTION_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Deserialize)]
struct DriveItem {
    name: Option<String>,
    #[serde(rename = "@content.downloadUrl")]
    download_url: Option<String>,
    file: Option<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    #[serde(rename = "mimeType")]
    mime_type: Option<String>,
}

impl DriveItem {
    fn is_video_or_audio(&self) -> bool {
        let by_mime = self
            .file
            .as_ref()
            .and_then(|f| f.mime_type.as_deref())
            .is_some_and(|m| m.starts_with("video/") || m.starts_with("audio/"));
        let by_name = self
            .name
            .as_deref()
            .is_some_and(|n| classify_path(n).is_video_or_audio());
        by_mime || by_name
    }
}

pub struct OneDriveResolver {
    client: reqwest::Client,
    api_base: Url,
    /// Share links whose single fallback has already been handed out.
    exhausted: TtlCache<String, ()>,
}

impl OneDriveResolver {
    pub fn new(client: reqwest::Client) -> Self {
        let api_base = Url::parse(DEFAULT_API_BASE).expect("default OneDrive API base is valid");
        Self::with_api_base(client, api_base)
    }

    /// Point the resolver at a different API root (the base must end in `/`).
    pub fn with_api_base(client: reqwest::Client, api_base: Url) -> Self {
        Self {
            client,
            api_base,
            exhausted: TtlCache::new(EXHAUSTION_TTL),
        }
    }

    fn share_endpoint(&self, shared: &Url, suffix: &str) -> anyhow::Result<Url> {
        let path = format!("shares/{}/{suffix}", share_id(shared));
        self.api_base
            .join(&path)
            .with_context(|| format!("invalid OneDrive endpoint '{path}'"))
    }

    async fn drive_item(&self, shared: &Url) -> anyhow::Result<DriveItem> {
        let endpoint = self.share_endpoint(shared, "driveItem")?;
        let response = self
            .client
            .get(endpoint)
            .send()
            .await
            .context("OneDrive shares request failed")?;

        if !response.status().is_success() {
            bail!("OneDrive shares API responded with {}", response.status());
        }

        response
            .json::<DriveItem>()
            .await
            .context("failed to parse OneDrive drive item")
    }
}

#[async_trait]
impl Resolver for OneDriveResolver {
    fn platform(&self) -> &'static str {
        "OneDrive"
    }

    fn is_valid(&self, uri: &Url) -> bool {
        uri.host_str() == Some("1drv.ms")
    }

    async fn resolve(&self, uri: &Url, _quality: Option<Quality>) -> Result<Resolution, ResolveError> {
        let item = self
            .drive_item(uri)
            .await
            .map_err(|e| ResolveError::failed(uri, e))?;
        let link = item
            .download_url
            .as_deref()
            .ok_or_else(|| ResolveError::failed(uri, "drive item has no download url"))?;
        let direct = Url::parse(link).map_err(|e| ResolveError::failed(uri, e))?;

        self.exhausted.remove(&uri.to_string());
        Ok(Resolution::new(direct, item.is_video_or_audio()).with_fallback_available(true))
    }

    async fn fallback(&self, original: &Url) -> Option<Resolution> {
        if !self.exhausted.insert_if_absent(original.to_string(), ()) {
            return None;
        }
        let content = self.share_endpoint(original, "root/content").ok()?;
        tracing::debug!(uri = %original, fallback = %content, "Falling back to OneDrive content redirect");
        Some(Resolution::new(content, false))
    }
}

/// Encode a share URL into a OneDrive share id (`u!` + unpadded base64url).
fn share_id(shared: &Url) -> String {
    let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(shared.as_str());
    format!("u!{encoded}")
}
