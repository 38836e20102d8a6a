//! Path utilities for classifying resources by extension.
//!
//! These are used both for bare URIs that no resolver claims and as the
//! fallback classification when a transport reports no content type.

use std::path::Path;

use crate::types::MediaKind;

/// Video containers and streaming playlists.
const VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "mov", "webm", "flv", "wmv", "m4v", "mpg", "mpeg", "m3u8", "m3u", "ts",
    "m2ts", "3gp", "ogv",
];

/// Audio-only formats.
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "flac", "aac", "m4a", "wma", "opus"];

/// Image formats the decode chain understands.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

/// Classify a path (filesystem path or URL path component) by its extension.
///
/// # Examples
///
/// ```
/// use mediafetch_common::paths::classify_path;
/// use mediafetch_common::MediaKind;
///
/// assert_eq!(classify_path("/videos/clip.MKV"), MediaKind::Video);
/// assert_eq!(classify_path("song.flac"), MediaKind::Audio);
/// assert_eq!(classify_path("/img/cat.png"), MediaKind::Image);
/// assert_eq!(classify_path("/download"), MediaKind::Unknown);
/// ```
pub fn classify_path(path: &str) -> MediaKind {
    let Some(ext) = Path::new(path).extension().and_then(|ext| ext.to_str()) else {
        return MediaKind::Unknown;
    };
    let ext = ext.to_lowercase();

    if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        MediaKind::Video
    } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        MediaKind::Audio
    } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        MediaKind::Image
    } else {
        MediaKind::Unknown
    }
}
