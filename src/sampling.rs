//! Repeated sampling for one phase of a test run.
//!
//! The controller runs N timed transfers one at a time, applies the
//! per-sample timeout and the absolute valid-speed range, and tolerates
//! individual failures. It never computes averages; that belongs to the
//! summarizer. The per-sample operation is injected so phases can run
//! against fakes in tests.

use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use crate::errors::EngineError;
use crate::progress::{ProgressEvent, ProgressObserver};
use crate::stats::{MAX_REASONABLE_SPEED, MIN_VALID_SPEED};
use crate::transfer::{Sample, SampleKind};

/// Knobs for one phase of repeated sampling.
#[derive(Debug, Clone)]
pub struct PhaseConfig {
    pub iterations: usize,
    pub per_sample_timeout: Duration,
    pub inter_sample_delay: Duration,
    /// Samples below this are discarded as measurement noise.
    pub min_valid_speed: f64,
    /// Samples above this are discarded as measurement noise.
    pub max_reasonable_speed: f64,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            per_sample_timeout: Duration::from_secs(10),
            inter_sample_delay: Duration::from_millis(100),
            min_valid_speed: MIN_VALID_SPEED,
            max_reasonable_speed: MAX_REASONABLE_SPEED,
        }
    }
}

/// Run one phase: `iterations` samples, strictly sequential.
///
/// Per-sample timeouts and transient errors skip the iteration; outer
/// cancellation is the one error that propagates. An empty sample set
/// after all iterations is `AllSamplesFailed`.
pub async fn run_phase<F, Fut>(
    kind: SampleKind,
    config: &PhaseConfig,
    cancel: &CancellationToken,
    observer: &dyn ProgressObserver,
    mut op: F,
) -> Result<Vec<Sample>, EngineError>
where
    F: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = Result<Sample, EngineError>>,
{
    let mut samples: Vec<Sample> = Vec::with_capacity(config.iterations);

    for i in 0..config.iterations {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        // Per-sample scope: a child of the outer token, aborted by the
        // timeout below or by outer cancellation, whichever fires first.
        let sample_token = cancel.child_token();

        match timeout(config.per_sample_timeout, op(sample_token.clone()))
            .await
        {
            Ok(Ok(sample)) => {
                if sample.value >= config.min_valid_speed
                    && sample.value <= config.max_reasonable_speed
                {
                    samples.push(sample);
                    let progress =
                        ((i + 1) * 100 / config.iterations) as u8;
                    observer.on_event(ProgressEvent::SampleRecorded {
                        kind,
                        value: sample.value,
                        progress,
                    });
                } else {
                    debug!(
                        "{} sample {}/{} out of valid range ({:.4}), discarded",
                        kind,
                        i + 1,
                        config.iterations,
                        sample.value
                    );
                }
            }
            Ok(Err(e)) => {
                if cancel.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }
                warn!(
                    "{} sample {}/{} failed: {}. Continuing.",
                    kind,
                    i + 1,
                    config.iterations,
                    e
                );
            }
            Err(_elapsed) => {
                sample_token.cancel();
                if cancel.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }
                warn!(
                    "{} sample {}/{} timed out after {:?}. Continuing.",
                    kind,
                    i + 1,
                    config.iterations,
                    config.per_sample_timeout
                );
            }
        }

        // Decorrelate successive samples; skipped after the last one.
        if i + 1 < config.iterations {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                _ = sleep(config.inter_sample_delay) => {}
            }
        }
    }

    if samples.is_empty() {
        return Err(EngineError::AllSamplesFailed(kind));
    }

    Ok(samples)
}
