//! Payload classification: image, video/audio, or neither.
//!
//! The transport content type wins when present. Without one, the path
//! extension decides and an unknown extension is not an image.

use mediafetch_common::paths::classify_path;
use mediafetch_common::MediaKind;

/// Content types (or type prefixes) treated as video or audio.
pub const VIDEO_OR_AUDIO_MIME_TYPES: &[&str] = &[
    "video",
    "audio",
    "application/vnd.apple.mpegurl",
    "application/x-mpegurl",
    "video/x-matroska",
];

/// Classify a bare content type, ignoring parameters such as `charset`.
pub fn classify_content_type(content_type: &str) -> MediaKind {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if VIDEO_OR_AUDIO_MIME_TYPES
        .iter()
        .any(|prefix| essence.starts_with(prefix))
    {
        return if essence.starts_with("audio") {
            MediaKind::Audio
        } else {
            MediaKind::Video
        };
    }

    if essence.starts_with("image/") {
        MediaKind::Image
    } else {
        MediaKind::Unknown
    }
}

/// Classify a payload from its content type, falling back to the path.
pub fn classify(content_type: Option<&str>, path: &str) -> MediaKind {
    match content_type.map(str::trim).filter(|ct| !ct.is_empty()) {
        Some(ct) => classify_content_type(ct),
        None => classify_path(path),
    }
}
