//! Acquisition multiplexer demo - Main Entry Point
//!
//! Opens a simulated two-channel device, attaches a raw and a float consumer,
//! runs them for a moment and tears everything down again.

use acqmux::backend::{AcquisitionManager, MockContext, MockDataPattern, MockDevice};
use acqmux::config::{config_path, AcquisitionConfig};
use acqmux::pipeline::{ChainSpec, ChannelSink};
use acqmux::ManagerRegistry;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEVICE: &str = "m2k-adc";

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,acqmux=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting acquisition multiplexer demo");

    let config = config_path()
        .map(AcquisitionConfig::load_or_default)
        .unwrap_or_default();
    let registry = ManagerRegistry::with_config(config.clone());

    let context = MockContext::new().with_device(
        MockDevice::new(DEVICE, 2)
            .with_pattern(MockDataPattern::Sine {
                frequency: 1_000.0,
                amplitude: 2_000.0,
                offset: 0.0,
            })
            .with_period(Duration::from_millis(10)),
    );

    let manager = registry
        .get_or_create(&context, DEVICE, config.default_buffer_size)
        .context("opening demo device")?;
    let events = manager.subscribe();

    let (scope, scope_rx) = ChannelSink::new("scope", config.sink_capacity);
    let (spectrum, spectrum_rx) = ChannelSink::new("spectrum", config.sink_capacity);
    let scope_tap = manager.attach(0, &ChainSpec::direct(Arc::new(scope), 0), 1024)?;
    let spectrum_tap = manager.attach(
        1,
        &ChainSpec::direct(Arc::new(spectrum), 0).to_float(),
        4096,
    )?;

    manager.start(scope_tap)?;
    manager.start(spectrum_tap)?;
    tracing::info!(
        "Running with buffer size {} ({} edges)",
        manager.buffer_size(),
        manager.edge_count()
    );
    println!("{}", manager.topology().to_json()?);

    for block in scope_rx.iter().take(3) {
        tracing::info!("scope: seq {} with {} raw samples", block.seq, block.len());
    }
    for block in spectrum_rx.iter().take(3) {
        let peak = block
            .samples
            .to_f32()
            .into_iter()
            .fold(0.0f32, |acc, v| acc.max(v.abs()));
        tracing::info!("spectrum: seq {} peak {:.1}", block.seq, peak);
    }

    manager.stop(spectrum_tap)?;
    tracing::info!("Spectrum stopped, buffer size now {}", manager.buffer_size());
    manager.stop_all()?;

    manager.detach(scope_tap)?;
    manager.detach(spectrum_tap)?;
    tracing::info!(
        "Detached all taps ({} edges left, running: {})",
        manager.edge_count(),
        manager.is_running()
    );

    for event in events.try_iter() {
        tracing::debug!("Event: {:?}", event);
    }

    drop(manager);
    tracing::info!("Shutting down... ({} live managers)", registry.len());
    Ok(())
}
