use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use clap_verbosity_flag::Verbosity;
use colored::Colorize;
use log::debug;
use tokio_util::sync::CancellationToken;
use url::Url;

use speedprobe::errors::exit_codes;
use speedprobe::payload::PayloadStrategy;
use speedprobe::progress::{ProgressEvent, ProgressObserver};
use speedprobe::results::{JsonFileStore, ResultStore};
use speedprobe::server::Client;
use speedprobe::transfer::SampleKind;
use speedprobe::{TestConfig, TestEngine, TestReport};

#[derive(Parser)]
#[command(author, version = build_version(), about, long_about = None)]
struct Cli {
    /// Base URL of the speed-test server.
    #[arg(long, default_value = "http://localhost:3000/")]
    server: Url,

    /// Samples per transfer phase.
    #[arg(long, default_value_t = 10)]
    iterations: usize,

    /// Upload payload size in bytes.
    #[arg(long, default_value_t = 1024 * 1024)]
    payload_size: usize,

    /// How the upload payload is filled.
    #[arg(long, value_enum, default_value = "pattern")]
    payload_strategy: PayloadStrategy,

    /// Per-sample timeout in seconds.
    #[arg(long, default_value_t = 10)]
    sample_timeout: u64,

    /// Delay between samples in milliseconds.
    #[arg(long, default_value_t = 100)]
    sample_delay: u64,

    /// Where the most recent result is cached.
    #[arg(long, default_value = "speedprobe-last.json")]
    cache_file: PathBuf,

    /// Print the cached result of the previous run and exit.
    #[arg(long)]
    show_last: bool,

    #[command(flatten)]
    verbosity: Verbosity,
}

fn build_version() -> String {
    match option_env!("SPEEDPROBE_BUILD_GIT_HASH") {
        Some(rev) => format!("{} (rev {})", env!("CARGO_PKG_VERSION"), rev),
        None => env!("CARGO_PKG_VERSION").to_string(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.verbosity.log_level_filter())
        .init();

    std::process::exit(run(cli).await);
}

async fn run(cli: Cli) -> i32 {
    let store = JsonFileStore::new(cli.cache_file.clone());

    if cli.show_last {
        return match store.load_last() {
            Some(report) => {
                println!("{}", "Previous result".bold().white());
                print_report(&report);
                exit_codes::SUCCESS
            }
            None => {
                eprintln!("No cached result at {}", cli.cache_file.display());
                exit_codes::MEASUREMENT_ERROR
            }
        };
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("interrupt received, cancelling test");
                cancel.cancel();
            }
        });
    }

    let config = TestConfig {
        download_iterations: cli.iterations,
        upload_iterations: cli.iterations,
        per_sample_timeout: Duration::from_secs(cli.sample_timeout),
        inter_sample_delay: Duration::from_millis(cli.sample_delay),
        upload_payload_size: cli.payload_size,
        payload_strategy: cli.payload_strategy,
        ..TestConfig::default()
    };

    println!(
        "{} {}",
        "Testing against:".bold().white(),
        cli.server.as_str().bright_blue()
    );

    let engine = TestEngine::new(Client::new(cli.server), config);

    match engine.run(Arc::new(ConsoleObserver), &store, &cancel).await {
        Ok(report) => {
            print_report(&report);
            exit_codes::SUCCESS
        }
        Err(e) if e.is_cancellation() => {
            println!("{}", e.to_string().yellow());
            e.exit_code()
        }
        Err(e) => {
            eprintln!("{}", e.to_string().bright_red());
            e.exit_code()
        }
    }
}

fn print_report(report: &TestReport) {
    println!(
        "{} {} {}",
        "Your IP:".bold().white(),
        report.identity.ip.bright_blue(),
        format!(
            "({}, {}, {})",
            report.identity.city, report.identity.region,
            report.identity.country
        )
        .bright_blue()
    );
    println!(
        "{} {}",
        "ISP:".bold().white(),
        report.identity.isp.bright_blue()
    );
    println!("{} {:.1} ms", "Ping:".bold().white(), report.ping_ms);
    println!("{} {:.1} ms", "Jitter:".bold().white(), report.jitter_ms);
    println!(
        "{} {}",
        "Download:".bold().white(),
        format!("{:.2} Mbps", report.download_mbps).bright_cyan()
    );
    println!(
        "{} {}",
        "Upload:".bold().white(),
        format!("{:.2} Mbps", report.upload_mbps).bright_cyan()
    );
}

/// Streams progress to stdout as it happens.
struct ConsoleObserver;

impl ProgressObserver for ConsoleObserver {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::PhaseStarted(kind) => {
                println!(
                    "{}",
                    format!("Testing {}...", kind).bold().white()
                );
            }
            ProgressEvent::SampleRecorded { kind, value, progress } => {
                println!(
                    "  [{:>3}%] {:.2} {}",
                    progress,
                    value,
                    unit_for(kind)
                );
            }
            ProgressEvent::PhaseSettled { kind, average } => {
                println!(
                    "{} {}",
                    format!("{} settled:", kind).bold().white(),
                    format!("{:.2} {}", average, unit_for(kind))
                        .bright_cyan()
                );
            }
            ProgressEvent::LiveSpeedReset => {}
            ProgressEvent::SlowConnectionWarning { recovery_delay_secs } => {
                eprintln!(
                    "{}",
                    format!(
                        "Connection is very slow; aborting in {}s unless it \
                         recovers",
                        recovery_delay_secs
                    )
                    .yellow()
                );
            }
        }
    }
}

fn unit_for(kind: SampleKind) -> &'static str {
    match kind {
        SampleKind::Ping => "ms",
        SampleKind::Download | SampleKind::Upload => "Mbps",
    }
}
