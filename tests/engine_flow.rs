//! End-to-end flows through the public API: sampling feeding the
//! summarizer, and full engine runs against an unreachable server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use url::Url;

use speedprobe::errors::EngineError;
use speedprobe::progress::NullObserver;
use speedprobe::results::{JsonFileStore, ResultStore};
use speedprobe::sampling::{run_phase, PhaseConfig};
use speedprobe::server::Client;
use speedprobe::stats::{summarize, OutlierFilter};
use speedprobe::transfer::{Sample, SampleKind};
use speedprobe::{TestConfig, TestEngine, TestPhase};

// TEST-NET-1, guaranteed unroutable.
fn dead_client() -> Client {
    Client::new(Url::parse("http://192.0.2.1:9/").unwrap())
}

fn temp_store(tag: &str) -> JsonFileStore {
    JsonFileStore::new(std::env::temp_dir().join(format!(
        "speedprobe-flow-{}-{}.json",
        tag,
        std::process::id()
    )))
}

#[tokio::test(start_paused = true)]
async fn sampling_and_summary_pipeline() {
    // A download phase with two sub-threshold stalls and one absurd
    // spike: the stalls never reach the sample set, the spike survives
    // sampling but falls to the IQR fence.
    let readings = Arc::new(Mutex::new(vec![
        94.0, 0.02, 91.5, 96.0, 0.05, 93.0, 95.5, 92.0, 890.0, 94.5,
    ]));

    let config = PhaseConfig {
        iterations: 10,
        per_sample_timeout: Duration::from_millis(500),
        inter_sample_delay: Duration::from_millis(10),
        ..PhaseConfig::default()
    };

    let samples = run_phase(
        SampleKind::Download,
        &config,
        &CancellationToken::new(),
        &NullObserver,
        |_token| {
            let readings = readings.clone();
            async move {
                Ok(Sample {
                    value: readings.lock().unwrap().remove(0),
                    timestamp: tokio::time::Instant::now(),
                    kind: SampleKind::Download,
                })
            }
        },
    )
    .await
    .unwrap();

    assert_eq!(samples.len(), 8);

    let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
    let stats = summarize(
        &values,
        &OutlierFilter::default(),
        SampleKind::Download,
    )
    .unwrap();

    assert_eq!(stats.valid_count, 8);
    assert_eq!(stats.filtered_count, 7);
    assert!(stats.max < 890.0);
    assert!(stats.average > 90.0 && stats.average < 100.0);
}

#[tokio::test]
async fn unreachable_server_fails_the_ping_phase() {
    let config = TestConfig {
        per_sample_timeout: Duration::from_millis(200),
        inter_sample_delay: Duration::from_millis(1),
        ..TestConfig::default()
    };
    let engine = TestEngine::new(dead_client(), config);
    let store = temp_store("unreachable");

    let result = engine
        .run(Arc::new(NullObserver), &store, &CancellationToken::new())
        .await;

    assert!(matches!(
        result,
        Err(EngineError::AllSamplesFailed(SampleKind::Ping))
    ));
    assert_eq!(engine.phase(), TestPhase::Failed);
    assert!(store.load_last().is_none());
}

#[tokio::test]
async fn interrupt_mid_run_terminates_as_cancelled() {
    let config = TestConfig {
        per_sample_timeout: Duration::from_secs(5),
        inter_sample_delay: Duration::from_millis(100),
        ..TestConfig::default()
    };
    let engine = TestEngine::new(dead_client(), config);
    let store = temp_store("interrupt");

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });
    }

    let result =
        engine.run(Arc::new(NullObserver), &store, &cancel).await;

    assert!(matches!(result, Err(EngineError::Cancelled)));
    assert_eq!(engine.phase(), TestPhase::Cancelled);
}
