//! Input URI parsing and the extension heuristic used for unclaimed URIs.

use std::path::Path;

use mediafetch_common::paths::classify_path;
use url::Url;

use super::resolver::{Resolution, ResolveError};

/// Schemes the fetch layer can open without a resolver.
const DIRECT_SCHEMES: &[&str] = &["http", "https", "file"];

/// Parse user input into a URL.
///
/// Existing local files are accepted as plain paths and converted into
/// `file://` URLs; anything else must already be an absolute URI.
pub fn parse_uri(input: &str) -> Result<Url, ResolveError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ResolveError::invalid_input(input, "empty uri"));
    }

    let path = Path::new(trimmed);
    if path.is_file() {
        let absolute = std::fs::canonicalize(path)
            .map_err(|e| ResolveError::invalid_input(trimmed, e.to_string()))?;
        return Url::from_file_path(&absolute)
            .map_err(|_| ResolveError::invalid_input(trimmed, "not an absolute file path"));
    }

    Url::parse(trimmed).map_err(|e| ResolveError::invalid_input(trimmed, e.to_string()))
}

/// Classify a URI that no resolver claimed.
///
/// Video and audio extensions set `assumed_video`; everything else passes
/// through so the transport content type can decide. A well-formed URI whose
/// scheme the fetch layer cannot open (`rtsp`, `rtmp`, ...) is handed to
/// playback the same way.
pub fn heuristic_resolution(uri: &Url) -> Resolution {
    if !DIRECT_SCHEMES.contains(&uri.scheme()) {
        tracing::debug!(uri = %uri, scheme = uri.scheme(), "Unfetchable scheme, delegating to playback");
        return Resolution::new(uri.clone(), true);
    }

    let kind = classify_path(uri.path());
    tracing::debug!(uri = %uri, kind = %kind, "No resolver matched, classified by extension");
    Resolution::new(uri.clone(), kind.is_video_or_audio())
}
