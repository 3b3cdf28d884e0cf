//! Test orchestration: ping, download, and upload phases in sequence,
//! plus the slow-connection watchdog and the run lifecycle.
//!
//! All per-run mutable state lives in one place, owned by the engine
//! for the duration of the run and externalized as an immutable
//! `TestReport` the instant the run terminates. At most one run is
//! active at a time.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::errors::EngineError;
use crate::payload::{self, PayloadStrategy};
use crate::progress::{ProgressEvent, ProgressObserver};
use crate::results::{NetworkIdentity, ResultStore, TestReport};
use crate::sampling::{run_phase, PhaseConfig};
use crate::server::requests::ip::IpInfo;
use crate::server::Client;
use crate::stats::{
    mean, summarize, OutlierFilter, DEFAULT_IQR_MULTIPLIER,
    MAX_REASONABLE_SPEED, MIN_VALID_SPEED,
};
use crate::transfer::{
    single_download_test, single_ping_test, single_upload_test, SampleKind,
};

/// Lifecycle of a test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TestPhase {
    Idle = 0,
    Ping = 1,
    Download = 2,
    Upload = 3,
    Completed = 4,
    Failed = 5,
    Cancelled = 6,
}

impl TestPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => TestPhase::Ping,
            2 => TestPhase::Download,
            3 => TestPhase::Upload,
            4 => TestPhase::Completed,
            5 => TestPhase::Failed,
            6 => TestPhase::Cancelled,
            _ => TestPhase::Idle,
        }
    }
}

/// Configuration for a test run, fixed at construction.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Ping samples per run.
    pub ping_iterations: usize,
    pub download_iterations: usize,
    pub upload_iterations: usize,
    pub per_sample_timeout: Duration,
    pub inter_sample_delay: Duration,
    /// Upload body size in bytes.
    pub upload_payload_size: usize,
    pub payload_strategy: PayloadStrategy,
    pub min_valid_speed: f64,
    pub max_reasonable_speed: f64,
    pub iqr_multiplier: f64,
    /// Grace period before the slow-connection watchdog checks progress.
    pub watchdog_grace: Duration,
    /// Delay between the slow-connection warning and the forced abort.
    pub watchdog_recovery_delay: Duration,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            ping_iterations: 5,
            download_iterations: 10,
            upload_iterations: 10,
            per_sample_timeout: Duration::from_secs(10),
            inter_sample_delay: Duration::from_millis(100),
            upload_payload_size: 1024 * 1024,
            payload_strategy: PayloadStrategy::default(),
            min_valid_speed: MIN_VALID_SPEED,
            max_reasonable_speed: MAX_REASONABLE_SPEED,
            iqr_multiplier: DEFAULT_IQR_MULTIPLIER,
            watchdog_grace: Duration::from_secs(20),
            watchdog_recovery_delay: Duration::from_secs(5),
        }
    }
}

/// Per-run mutable state, shared with the watchdog task.
#[derive(Debug, Default)]
struct RunState {
    phase: AtomicU8,
    download_progress: AtomicU8,
    upload_progress: AtomicU8,
}

impl RunState {
    fn reset(&self) {
        self.phase.store(TestPhase::Idle as u8, Ordering::Relaxed);
        self.download_progress.store(0, Ordering::Relaxed);
        self.upload_progress.store(0, Ordering::Relaxed);
    }

    fn set_phase(&self, phase: TestPhase) {
        self.phase.store(phase as u8, Ordering::Relaxed);
    }

    fn phase(&self) -> TestPhase {
        TestPhase::from_u8(self.phase.load(Ordering::Relaxed))
    }

    fn transfer_progress_below(&self, threshold: u8) -> bool {
        self.download_progress.load(Ordering::Relaxed) < threshold
            && self.upload_progress.load(Ordering::Relaxed) < threshold
    }
}

/// Observer wrapper that mirrors phase progress into the run state for
/// the watchdog before forwarding every event.
struct ProgressTracker {
    inner: Arc<dyn ProgressObserver>,
    state: Arc<RunState>,
}

impl ProgressObserver for ProgressTracker {
    fn on_event(&self, event: ProgressEvent) {
        if let ProgressEvent::SampleRecorded { kind, progress, .. } = &event {
            match kind {
                SampleKind::Download => self
                    .state
                    .download_progress
                    .store(*progress, Ordering::Relaxed),
                SampleKind::Upload => self
                    .state
                    .upload_progress
                    .store(*progress, Ordering::Relaxed),
                SampleKind::Ping => {}
            }
        }

        self.inner.on_event(event);
    }
}

/// Orchestrates complete test runs against one server.
pub struct TestEngine {
    config: TestConfig,
    client: Client,
    state: Arc<RunState>,
}

impl TestEngine {
    pub fn new(client: Client, config: TestConfig) -> Self {
        Self { config, client, state: Arc::new(RunState::default()) }
    }

    /// Phase of the current or most recent run.
    pub fn phase(&self) -> TestPhase {
        self.state.phase()
    }

    /// Run ping, download, and upload phases in sequence and persist
    /// the final snapshot.
    ///
    /// On every exit path the watchdog task and any in-flight transfer
    /// are torn down; nothing outlives the returned future.
    pub async fn run(
        &self,
        observer: Arc<dyn ProgressObserver>,
        store: &dyn ResultStore,
        cancel: &CancellationToken,
    ) -> Result<TestReport, EngineError> {
        self.state.reset();

        // The run token is a child of the caller's: the user can cancel
        // the run, and the watchdog can cancel it without touching the
        // caller's token.
        let run_token = cancel.child_token();
        let slow_connection = Arc::new(AtomicBool::new(false));

        let tracker = Arc::new(ProgressTracker {
            inner: Arc::clone(&observer),
            state: Arc::clone(&self.state),
        });

        let watchdog = tokio::spawn(watchdog_task(
            Arc::clone(&self.state),
            Arc::clone(&observer),
            run_token.clone(),
            Arc::clone(&slow_connection),
            self.config.watchdog_grace,
            self.config.watchdog_recovery_delay,
        ));

        let result = self.run_phases(tracker, &run_token).await;

        // Release the watchdog timer regardless of how the run ended.
        watchdog.abort();

        match result {
            Ok(report) => {
                if let Err(e) = store.save(&report) {
                    warn!("failed to persist result snapshot: {}", e);
                }
                self.state.set_phase(TestPhase::Completed);
                info!(
                    "test complete: down {:.2} Mbps, up {:.2} Mbps, ping {:.1} ms",
                    report.download_mbps, report.upload_mbps, report.ping_ms
                );
                Ok(report)
            }
            Err(EngineError::Cancelled) => {
                if slow_connection.load(Ordering::Relaxed) {
                    self.state.set_phase(TestPhase::Failed);
                    Err(EngineError::SlowConnection)
                } else {
                    self.state.set_phase(TestPhase::Cancelled);
                    Err(EngineError::Cancelled)
                }
            }
            Err(e) => {
                self.state.set_phase(TestPhase::Failed);
                Err(e)
            }
        }
    }

    async fn run_phases(
        &self,
        observer: Arc<ProgressTracker>,
        run_token: &CancellationToken,
    ) -> Result<TestReport, EngineError> {
        // Identity lookup is best-effort: a missing or broken endpoint
        // degrades every field to "Unknown".
        let identity = tokio::select! {
            biased;
            _ = run_token.cancelled() => return Err(EngineError::Cancelled),
            reply = tokio::time::timeout(
                self.config.per_sample_timeout,
                self.client.send(IpInfo),
            ) => match reply {
                Ok(Ok(reply)) => NetworkIdentity::from_reply(reply),
                Ok(Err(e)) => {
                    warn!("identity lookup failed: {}", e);
                    NetworkIdentity::default()
                }
                Err(_) => {
                    warn!("identity lookup timed out");
                    NetworkIdentity::default()
                }
            }
        };

        let filter = OutlierFilter {
            iqr_multiplier: self.config.iqr_multiplier,
            min_valid: self.config.min_valid_speed,
            max_valid: self.config.max_reasonable_speed,
        };

        // Ping phase. The average is a raw mean and jitter is the full
        // spread; pings are deliberately not outlier-filtered.
        self.state.set_phase(TestPhase::Ping);
        observer.on_event(ProgressEvent::PhaseStarted(SampleKind::Ping));

        let ping_samples = run_phase(
            SampleKind::Ping,
            &self.phase_config(self.config.ping_iterations),
            run_token,
            observer.as_ref(),
            |token| {
                let client = self.client.clone();
                async move { single_ping_test(&client, &token).await }
            },
        )
        .await?;

        let pings: Vec<f64> = ping_samples.iter().map(|s| s.value).collect();
        let ping_ms = mean(&pings);
        let jitter_ms = spread(&pings);
        observer.on_event(ProgressEvent::PhaseSettled {
            kind: SampleKind::Ping,
            average: ping_ms,
        });
        info!("ping: {:.1} ms avg, {:.1} ms jitter", ping_ms, jitter_ms);

        // Download phase.
        self.state.set_phase(TestPhase::Download);
        observer.on_event(ProgressEvent::PhaseStarted(SampleKind::Download));

        let download_samples = run_phase(
            SampleKind::Download,
            &self.phase_config(self.config.download_iterations),
            run_token,
            observer.as_ref(),
            |token| {
                let client = self.client.clone();
                async move { single_download_test(&client, &token).await }
            },
        )
        .await?;

        let values: Vec<f64> =
            download_samples.iter().map(|s| s.value).collect();
        let download_stats =
            summarize(&values, &filter, SampleKind::Download)?;
        observer.on_event(ProgressEvent::PhaseSettled {
            kind: SampleKind::Download,
            average: download_stats.average,
        });
        info!("download: {:.2} Mbps avg", download_stats.average);

        // Upload phase, with the live indicator dropped back to zero
        // first.
        observer.on_event(ProgressEvent::LiveSpeedReset);
        self.state.set_phase(TestPhase::Upload);
        observer.on_event(ProgressEvent::PhaseStarted(SampleKind::Upload));

        let body = Arc::new(payload::generate(
            self.config.upload_payload_size,
            self.config.payload_strategy,
        ));

        let upload_samples = run_phase(
            SampleKind::Upload,
            &self.phase_config(self.config.upload_iterations),
            run_token,
            observer.as_ref(),
            |token| {
                let client = self.client.clone();
                let body = Arc::clone(&body);
                async move {
                    single_upload_test(&client, &body, &token).await
                }
            },
        )
        .await?;

        let values: Vec<f64> =
            upload_samples.iter().map(|s| s.value).collect();
        let upload_stats = summarize(&values, &filter, SampleKind::Upload)?;
        observer.on_event(ProgressEvent::PhaseSettled {
            kind: SampleKind::Upload,
            average: upload_stats.average,
        });
        info!("upload: {:.2} Mbps avg", upload_stats.average);

        Ok(TestReport {
            timestamp: chrono::Utc::now(),
            download_mbps: download_stats.average,
            upload_mbps: upload_stats.average,
            ping_ms,
            jitter_ms,
            download_stats,
            upload_stats,
            identity,
        })
    }

    fn phase_config(&self, iterations: usize) -> PhaseConfig {
        PhaseConfig {
            iterations,
            per_sample_timeout: self.config.per_sample_timeout,
            inter_sample_delay: self.config.inter_sample_delay,
            min_valid_speed: self.config.min_valid_speed,
            max_reasonable_speed: self.config.max_reasonable_speed,
        }
    }
}

/// Jitter: the spread (max - min) of a non-empty value set.
fn spread(values: &[f64]) -> f64 {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    max - min
}

/// Last-resort recovery from a hung transport: if neither transfer
/// phase is near completion after the grace period, warn, wait out the
/// recovery delay, then abort the run. The run maps the resulting
/// cancellation to `SlowConnectionTimeout` via the shared flag.
async fn watchdog_task(
    state: Arc<RunState>,
    observer: Arc<dyn ProgressObserver>,
    run_token: CancellationToken,
    slow_connection: Arc<AtomicBool>,
    grace: Duration,
    recovery_delay: Duration,
) {
    tokio::select! {
        _ = run_token.cancelled() => return,
        _ = tokio::time::sleep(grace) => {}
    }

    if !state.transfer_progress_below(90) {
        return;
    }

    warn!(
        "slow connection: transfer progress below 90% after {:?}, \
         aborting in {:?}",
        grace, recovery_delay
    );
    observer.on_event(ProgressEvent::SlowConnectionWarning {
        recovery_delay_secs: recovery_delay.as_secs(),
    });

    tokio::select! {
        _ = run_token.cancelled() => return,
        _ = tokio::time::sleep(recovery_delay) => {}
    }

    if state.transfer_progress_below(90) {
        slow_connection.store(true, Ordering::Relaxed);
        run_token.cancel();
    }
}
