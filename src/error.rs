//! Error taxonomy for the recorder.
//!
//! Only a handful of situations are reported as errors. Everything that has a
//! sensible empty-state fallback (an empty route, missing geometry) is returned
//! as `Option::None` instead.

use thiserror::Error;

/// Errors surfaced by the recorder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error))]
#[cfg_attr(feature = "ffi", uniffi(flat_error))]
pub enum RecorderError {
    /// Tracking was requested without location authorization.
    /// The session stays idle and permission can be requested again.
    #[error("location permission denied")]
    PermissionDenied,

    /// Neither a best-fix capture nor the recent-fix buffer produced a usable fix.
    #[error("no location fix available")]
    NoFixAvailable,

    /// A fix with non-positive horizontal accuracy or out-of-range coordinates.
    #[error("invalid location fix")]
    InvalidFix,

    /// A best-fix capture is already running for this session.
    #[error("a best-fix capture is already in flight")]
    CaptureInFlight,

    /// The recorder task has shut down.
    #[error("recorder task is no longer running")]
    RecorderClosed,

    /// Configuration could not be parsed or serialized.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<serde_json::Error> for RecorderError {
    fn from(err: serde_json::Error) -> Self {
        RecorderError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RecorderError>;
