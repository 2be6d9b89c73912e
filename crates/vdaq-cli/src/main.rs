//! Virtual Cognionics Quick-20 - synthetic acquisition device
//!
//! Usage: `vdaq-sim [WAVEFORM] [SAMPLE_RATE]`

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};
use vdaq_core::{GeneratorConfig, MonotonicClock, Waveform, DEVICE_NAME};
use vdaq_processing::analyze;
use vdaq_simulation::{LoopbackTransport, SignalGenerator, Subscription};

#[derive(Debug, Parser)]
#[command(name = "vdaq-sim", about = "Emulated multi-channel EEG device")]
struct Args {
    /// Waveform to emit: random, sinusoid or noisy_sin
    #[arg(default_value = "random")]
    waveform: Waveform,

    /// Samples per second
    #[arg(default_value_t = 500.0)]
    sample_rate: f64,
}

/// Largest monitor window in samples
const MAX_MONITOR_WINDOW: usize = 1 << 16;

/// One second of samples, bounded to `2..=MAX_MONITOR_WINDOW`
fn monitor_window(sample_rate: f64) -> usize {
    (sample_rate.round() as usize).clamp(2, MAX_MONITOR_WINDOW)
}

/// In-process consumer reporting achieved rate and dominant frequency per window
async fn monitor(mut subscription: Subscription, sample_rate: f64) {
    let window = monitor_window(sample_rate);

    loop {
        let (timestamps, samples) = match subscription.collect(window).await {
            Ok(captured) => captured,
            Err(_) => break,
        };

        let span = timestamps[window - 1] - timestamps[0];
        let achieved = (window - 1) as f64 / span;
        let channel0: Vec<f64> = samples.iter().map(|s| s[0] as f64).collect();

        match analyze(&timestamps, &channel0) {
            Ok(spectrum) => info!(
                achieved_rate_hz = achieved,
                peak_hz = ?spectrum.peak_frequency(),
                "monitor window"
            ),
            Err(e) => warn!(error = %e, "monitor could not analyze window"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = GeneratorConfig::with_waveform(args.waveform, args.sample_rate);

    let transport = LoopbackTransport::new();
    let mut generator = SignalGenerator::new(config, &transport, MonotonicClock::new())
        .context("failed to start virtual device")?;

    let subscription = transport.subscribe(DEVICE_NAME)?;
    tokio::spawn(monitor(subscription, args.sample_rate));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
        }
        let _ = shutdown_tx.send(true);
    });

    info!("Now sending data...");
    let stats = generator.run(shutdown_rx).await.context("emission loop failed")?;
    info!(ticks = stats.ticks, emitted = stats.emitted, "virtual device stopped");

    Ok(())
}
