//! Core type definitions shared by the resolver, fetch and decode layers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a resource appears to be, judged by extension or content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// A video container or streaming playlist.
    Video,
    /// An audio-only resource.
    Audio,
    /// A still or animated image.
    Image,
    /// Nothing recognisable.
    Unknown,
}

impl MediaKind {
    /// Video and audio both belong to the playback subsystem.
    pub fn is_video_or_audio(&self) -> bool {
        matches!(self, Self::Video | Self::Audio)
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Self::Image)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
            Self::Image => write!(f, "image"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Preferred quality hint passed to resolvers that can pick between
/// several renditions of the same media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Lowest,
    Low,
    Average,
    High,
    Highest,
}

impl Default for Quality {
    fn default() -> Self {
        Self::Average
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lowest => write!(f, "lowest"),
            Self::Low => write!(f, "low"),
            Self::Average => write!(f, "average"),
            Self::High => write!(f, "high"),
            Self::Highest => write!(f, "highest"),
        }
    }
}
