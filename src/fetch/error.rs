use std::fmt;

use reqwest::StatusCode;

use crate::decode::DecodeError;
use crate::resolve::{BoxError, ResolveError};

/// Every way a fetch can fail, as a flat tagged enum.
///
/// Recoverable conditions (403 with a fallback left, 304, a single decoder
/// failing) are handled inside the orchestrator and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Resolution(ResolveError),

    /// The resource is video or audio. Callers hand it to playback instead.
    #[error("not an image: {uri} is video or audio ({reason})")]
    VideoOrAudio { uri: String, reason: String },

    #[error("not an image: {uri} ({reason})")]
    NotAnImage { uri: String, reason: String },

    #[error("bad request for {uri}")]
    BadRequest { uri: String },

    #[error("access to {uri} is forbidden and no fallback is left")]
    Forbidden { uri: String },

    #[error("{uri} not found")]
    NotFound { uri: String },

    #[error("unexpected status {status} for {uri}")]
    UnexpectedStatus { uri: String, status: StatusCode },

    #[error("network error fetching {uri}: {source}")]
    Network {
        uri: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("I/O error reading {uri}: {source}")]
    Io {
        uri: String,
        #[source]
        source: std::io::Error,
    },

    /// The response body outgrew the configured size limit.
    #[error("response from {uri} exceeds {limit} bytes")]
    TooLarge { uri: String, limit: u64 },

    #[error("failed to decode {uri}: {source}")]
    Decode {
        uri: String,
        #[source]
        source: DecodeError,
    },

    /// Anything that escaped the known kinds, including worker panics.
    #[error("fatal error: {message}")]
    Fatal {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl FetchError {
    pub fn video_or_audio(uri: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::VideoOrAudio {
            uri: uri.to_string(),
            reason: reason.into(),
        }
    }

    pub fn not_an_image(uri: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::NotAnImage {
            uri: uri.to_string(),
            reason: reason.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
            source: None,
        }
    }

    /// Whether the caller should redirect the URI to media playback.
    pub fn is_video_or_audio(&self) -> bool {
        matches!(self, Self::VideoOrAudio { .. })
    }

    /// Transport failures degrade to previously cached bytes when any exist.
    /// Classification and decode failures never do.
    pub fn allows_stale_fallback(&self) -> bool {
        matches!(
            self,
            Self::BadRequest { .. }
                | Self::Forbidden { .. }
                | Self::NotFound { .. }
                | Self::UnexpectedStatus { .. }
                | Self::Network { .. }
                | Self::Io { .. }
        )
    }

    /// Short machine-readable kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::Resolution(_) => "resolution",
            Self::VideoOrAudio { .. } => "video_or_audio",
            Self::NotAnImage { .. } => "not_an_image",
            Self::BadRequest { .. } => "bad_request",
            Self::Forbidden { .. } => "forbidden",
            Self::NotFound { .. } => "not_found",
            Self::UnexpectedStatus { .. } => "unexpected_status",
            Self::Network { .. } => "network",
            Self::Io { .. } => "io",
            Self::TooLarge { .. } => "too_large",
            Self::Decode { .. } => "decode",
            Self::Fatal { .. } => "fatal",
        }
    }
}

impl From<ResolveError> for FetchError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::InvalidInput { uri, reason } => {
                Self::InvalidInput(format!("'{uri}': {reason}"))
            }
            other => Self::Resolution(other),
        }
    }
}

/// A failed fetch, always paired with the caller's original input.
#[derive(Debug, thiserror::Error)]
#[error("{uri}: {error}")]
pub struct FetchFailure {
    pub uri: String,
    #[source]
    pub error: FetchError,
}

impl FetchFailure {
    pub fn new(uri: impl Into<String>, error: FetchError) -> Self {
        Self {
            uri: uri.into(),
            error,
        }
    }

    pub fn is_video_or_audio(&self) -> bool {
        self.error.is_video_or_audio()
    }
}
