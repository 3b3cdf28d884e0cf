//! Progress event types and observer interface.
//!
//! The engine emits events synchronously, in sample order, with
//! monotonically non-decreasing progress within a phase. Rate limiting
//! or debouncing is the consumer's business, not the engine's.

use crate::transfer::SampleKind;

/// Progress events emitted during test execution.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A phase has started.
    PhaseStarted(SampleKind),
    /// One sample was recorded.
    SampleRecorded {
        kind: SampleKind,
        /// Mbps for transfers, milliseconds for pings.
        value: f64,
        /// Phase progress, 0-100.
        progress: u8,
    },
    /// A phase finished and its settled average is known.
    PhaseSettled {
        kind: SampleKind,
        /// Mbps for transfers, milliseconds for pings.
        average: f64,
    },
    /// The live speed indicator should drop back to zero between the
    /// download and upload phases.
    LiveSpeedReset,
    /// The slow-connection watchdog fired; the run will be aborted
    /// after the announced recovery delay. A warning, not an error.
    SlowConnectionWarning {
        /// Seconds until the run is torn down.
        recovery_delay_secs: u64,
    },
}

/// Observer interface for progress updates.
///
/// Implementations must be non-blocking to avoid skewing measurements.
pub trait ProgressObserver: Send + Sync {
    /// Called for every progress event, in emission order.
    fn on_event(&self, event: ProgressEvent);
}

/// Observer that discards every event.
pub struct NullObserver;

impl ProgressObserver for NullObserver {
    fn on_event(&self, _event: ProgressEvent) {}
}
