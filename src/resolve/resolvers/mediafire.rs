//! MediaFire file pages (`https://www.mediafire.com/file/...`).
//!
//! The download page carries the direct link on its download button; newer
//! layouts hide it base64-encoded in a `data-scrambled-url` attribute.

use std::sync::LazyLock;

use anyhow::{bail, Context};
use async_trait::async_trait;
use base64::Engine;
use mediafetch_common::paths::classify_path;
use mediafetch_common::Quality;
use regex::Regex;
use reqwest::StatusCode;
use url::Url;

use crate::resolve::resolver::{Resolution, ResolveError, Resolver};

static DOWNLOAD_BUTTON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<a\s+class="input\s+popsok"\s+aria-label="Download\s+file"\s+href="([^"]+)"[^>]*>"#)
        .expect("download button pattern is valid")
});

static SCRAMBLED_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"data-scrambled-url="([^"]+)""#).expect("scrambled url pattern is valid")
});

pub struct MediaFireResolver {
    client: reqwest::Client,
}

impl MediaFireResolver {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn scrape(&self, uri: &Url) -> anyhow::Result<Url> {
        let response = self
            .client
            .get(uri.clone())
            .send()
            .await
            .context("MediaFire page request failed")?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => bail!("MediaFire file not found"),
            StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
                bail!("MediaFire refused access to the file page")
            }
            StatusCode::INTERNAL_SERVER_ERROR => bail!("MediaFire is unavailable"),
            other => bail!("unexpected MediaFire response ({other})"),
        }

        let html = response
            .text()
            .await
            .context("failed to read MediaFire page")?;
        let link = extract_download_link(&html).context("no download link found on MediaFire page")?;
        Url::parse(&link).with_context(|| format!("MediaFire returned an invalid link '{link}'"))
    }
}

#[async_trait]
impl Resolver for MediaFireResolver {
    fn platform(&self) -> &'static str {
        "Mediafire"
    }

    fn is_valid(&self, uri: &Url) -> bool {
        uri.host_str() == Some("www.mediafire.com") && uri.path().starts_with("/file/")
    }

    async fn resolve(&self, uri: &Url, _quality: Option<Quality>) -> Result<Resolution, ResolveError> {
        let direct = self
            .scrape(uri)
            .await
            .map_err(|e| ResolveError::failed(uri, e))?;
        let assumed_video = classify_path(direct.path()).is_video_or_audio();
        Ok(Resolution::new(direct, assumed_video))
    }
}

/// Pull the direct download link out of a MediaFire file page.
fn extract_download_link(html: &str) -> Option<String> {
    if let Some(captures) = DOWNLOAD_BUTTON.captures(html) {
        return Some(captures[1].to_string());
    }

    let encoded = SCRAMBLED_URL.captures(html)?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(&encoded[1])
        .ok()?;
    String::from_utf8(decoded).ok()
}
