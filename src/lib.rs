//! Network speed and latency measurement engine.
//!
//! Measures download and upload throughput plus ping round-trip time
//! against a self-hosted speed-test server, with per-sample timeouts,
//! IQR outlier rejection, and a slow-connection watchdog. The binary in
//! `main.rs` is one consumer; everything here is UI-agnostic.

pub mod engine;
pub mod errors;
pub mod payload;
pub mod progress;
pub mod results;
pub mod sampling;
pub mod server;
pub mod stats;
pub mod transfer;

pub use engine::{TestConfig, TestEngine, TestPhase};
pub use errors::EngineError;
pub use results::TestReport;
