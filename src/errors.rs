//! Error types for the measurement engine.
//!
//! Every user-visible failure renders as a short human-readable message;
//! raw causes stay in the log, never in the presentation layer.

use std::error::Error;
use std::fmt;

use crate::transfer::SampleKind;

/// Exit codes for the application.
pub mod exit_codes {
    /// Successful execution.
    pub const SUCCESS: i32 = 0;
    /// Transfer error (connection failed, bad status, stream error).
    pub const TRANSFER_ERROR: i32 = 1;
    /// Measurement error (no usable samples, degenerate statistics).
    pub const MEASUREMENT_ERROR: i32 = 2;
    /// Test was cancelled by the user.
    pub const CANCELLED: i32 = 3;
    /// Slow-connection watchdog fired.
    pub const SLOW_CONNECTION: i32 = 4;
    /// Unknown/unexpected error.
    pub const UNKNOWN_ERROR: i32 = 99;
}

/// Failures produced by the measurement engine.
#[derive(Debug)]
pub enum EngineError {
    /// Non-2xx response, stream error, or an abort mid-transfer.
    Transfer(String),
    /// Non-positive duration or byte count; guards against clock
    /// anomalies and zero-length bodies ever reaching the statistics.
    InvalidMeasurement(String),
    /// Upload endpoint replied without usable throughput metrics.
    InvalidServerResponse(String),
    /// Every sample in a phase failed or was filtered out.
    AllSamplesFailed(SampleKind),
    /// The summarizer was left with no in-range data.
    EmptyFilteredSet(SampleKind),
    /// Outer cancellation, user-initiated.
    Cancelled,
    /// The slow-connection watchdog aborted the run.
    SlowConnection,
}

impl EngineError {
    /// True for user-initiated stops, which the presentation layer
    /// should not style as errors.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }

    /// Get the exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::Transfer(_) => exit_codes::TRANSFER_ERROR,
            EngineError::InvalidMeasurement(_)
            | EngineError::InvalidServerResponse(_)
            | EngineError::AllSamplesFailed(_)
            | EngineError::EmptyFilteredSet(_) => {
                exit_codes::MEASUREMENT_ERROR
            }
            EngineError::Cancelled => exit_codes::CANCELLED,
            EngineError::SlowConnection => exit_codes::SLOW_CONNECTION,
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Transfer(msg) => {
                write!(f, "Transfer failed: {}", msg)
            }
            EngineError::InvalidMeasurement(msg) => {
                write!(f, "Invalid measurement: {}", msg)
            }
            EngineError::InvalidServerResponse(msg) => {
                write!(f, "Server returned no usable metrics: {}", msg)
            }
            EngineError::AllSamplesFailed(kind) => {
                write!(f, "All {} samples failed", kind)
            }
            EngineError::EmptyFilteredSet(kind) => {
                write!(f, "No {} samples survived outlier filtering", kind)
            }
            EngineError::Cancelled => write!(f, "Test cancelled"),
            EngineError::SlowConnection => {
                write!(f, "Connection too slow to finish the test; aborting")
            }
        }
    }
}

impl Error for EngineError {}

impl From<reqwest::Error> for EngineError {
    fn from(error: reqwest::Error) -> Self {
        EngineError::Transfer(error.to_string())
    }
}
