//! `water://` scheme: filesystem locations addressed without network access.
//!
//! `water://local/<path>` is relative to the working directory,
//! `water://temp/<path>` to the temp directory. `water://user/...` is
//! reserved and always fails.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use mediafetch_common::paths::classify_path;
use mediafetch_common::Quality;
use url::Url;

use crate::resolve::resolver::{Resolution, ResolveError, Resolver};

const SCHEME: &str = "water";

pub struct LocalResolver {
    temp_dir: PathBuf,
    local_dir: Option<PathBuf>,
}

impl LocalResolver {
    pub fn new(temp_dir: PathBuf) -> Self {
        Self {
            temp_dir,
            local_dir: None,
        }
    }

    /// Pin `water://local/` to `dir` instead of the working directory.
    pub fn with_local_dir(mut self, dir: PathBuf) -> Self {
        self.local_dir = Some(dir);
        self
    }

    fn base_dir(&self, uri: &Url) -> Result<PathBuf, ResolveError> {
        match uri.host_str() {
            Some("local") => match &self.local_dir {
                Some(dir) => Ok(dir.clone()),
                None => std::env::current_dir().map_err(|e| ResolveError::failed(uri, e)),
            },
            Some("temp") => Ok(self.temp_dir.clone()),
            Some("user") => Err(ResolveError::failed(
                uri,
                "water://user/ locations are not supported",
            )),
            Some(other) => Err(ResolveError::failed(
                uri,
                format!("unknown water location '{other}'"),
            )),
            None => Err(ResolveError::failed(uri, "missing water location")),
        }
    }
}

#[async_trait]
impl Resolver for LocalResolver {
    fn platform(&self) -> &'static str {
        "Local"
    }

    fn is_valid(&self, uri: &Url) -> bool {
        uri.scheme() == SCHEME
    }

    async fn resolve(&self, uri: &Url, _quality: Option<Quality>) -> Result<Resolution, ResolveError> {
        let base = self.base_dir(uri)?;
        let relative = relative_path(uri)?;
        let path = base.join(&relative);

        let resolved = Url::from_file_path(&path).map_err(|_| {
            ResolveError::failed(uri, format!("'{}' is not an absolute path", path.display()))
        })?;
        let assumed_video = classify_path(resolved.path()).is_video_or_audio();

        tracing::debug!(uri = %uri, path = %path.display(), assumed_video, "Resolved water uri");
        Ok(Resolution::new(resolved, assumed_video))
    }
}

/// Decode the URI path into a relative path that cannot climb out of its
/// base directory.
fn relative_path(uri: &Url) -> Result<PathBuf, ResolveError> {
    let decoded = urlencoding::decode(uri.path()).map_err(|e| ResolveError::failed(uri, e))?;
    let trimmed = decoded.trim_start_matches('/');
    if trimmed.is_empty() {
        return Err(ResolveError::failed(uri, "empty water path"));
    }

    let relative = Path::new(trimmed);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(ResolveError::failed(uri, "path escapes its water location"));
    }
    Ok(relative.to_path_buf())
}
