//! Mock Acquisition Source for Testing
//!
//! This module provides a mock source context that can be used to run the
//! multiplexer without hardware. Each mock device runs a worker thread that
//! produces one block per channel per period, filled from a waveform.
//!
//! # Data Patterns
//!
//! - [`MockDataPattern::Constant`] - Fixed value
//! - [`MockDataPattern::Sine`] - Sinusoidal wave with configurable frequency/amplitude
//! - [`MockDataPattern::Counter`] - Incrementing counter with wrap-around
//! - [`MockDataPattern::Sawtooth`] - Linear ramp that resets periodically
//! - [`MockDataPattern::Square`] - Square wave alternating between two values
//! - [`MockDataPattern::Triangle`] - Triangle wave
//!
//! # Fault injection
//!
//! [`MockFaults`] makes the next `start`/`stop` of a device's source fail,
//! and a device created with [`MockDevice::stalled`] never produces data and
//! reports a timeout instead.
//!
//! # Example
//!
//! ```ignore
//! use acqmux::backend::mock_source::{MockContext, MockDevice, MockDataPattern};
//!
//! let context = MockContext::new()
//!     .with_device(MockDevice::new("m2k-adc", 2).with_pattern(MockDataPattern::Counter {
//!         step: 1.0,
//!         min: 0.0,
//!         max: 1000.0,
//!     }));
//!
//! let manager = AcquisitionManager::get_or_create(&context, "m2k-adc", 1024)?;
//! ```
//!
//! # Enabling
//!
//! The mock source is only available when the `mock-source` feature is enabled
//! (it is by default).

use crate::backend::source::{AcquisitionSource, SourceOutput, SourceProvider};
use crate::config::DEFAULT_TIMEOUT_MS;
use crate::error::{AcqError, Result};
use crate::pipeline::Block;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

/// Shortest wait of a stalled device between timeout reports
const MIN_STALL_WAIT: Duration = Duration::from_millis(1);

/// Pattern for generating mock samples
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockDataPattern {
    /// Constant value
    Constant(f64),
    /// Sine wave with frequency (Hz) and amplitude
    Sine {
        frequency: f64,
        amplitude: f64,
        offset: f64,
    },
    /// Counter that increments once per sample
    Counter { step: f64, min: f64, max: f64 },
    /// Sawtooth wave
    Sawtooth { period: f64, amplitude: f64 },
    /// Square wave
    Square { period: f64, amplitude: f64 },
    /// Triangle wave
    Triangle { period: f64, amplitude: f64 },
}

impl Default for MockDataPattern {
    fn default() -> Self {
        MockDataPattern::Sine {
            frequency: 1000.0,
            amplitude: 1000.0,
            offset: 0.0,
        }
    }
}

/// Per-channel waveform state
#[derive(Debug, Clone)]
struct WaveGenerator {
    pattern: MockDataPattern,
    counter_value: f64,
    sample_index: u64,
}

impl WaveGenerator {
    fn new(pattern: MockDataPattern) -> Self {
        let counter_value = match pattern {
            MockDataPattern::Counter { min, step, .. } => min - step,
            _ => 0.0,
        };
        Self {
            pattern,
            counter_value,
            sample_index: 0,
        }
    }

    fn next_value(&mut self, sample_rate: f64) -> f64 {
        let t = self.sample_index as f64 / sample_rate;
        self.sample_index += 1;

        match self.pattern {
            MockDataPattern::Constant(v) => v,
            MockDataPattern::Sine {
                frequency,
                amplitude,
                offset,
            } => offset + amplitude * (2.0 * std::f64::consts::PI * frequency * t).sin(),
            MockDataPattern::Counter { step, min, max } => {
                self.counter_value += step;
                if self.counter_value > max {
                    self.counter_value = min;
                } else if self.counter_value < min {
                    self.counter_value = max;
                }
                self.counter_value
            }
            MockDataPattern::Sawtooth { period, amplitude } => {
                let t = t % period;
                amplitude * (t / period)
            }
            MockDataPattern::Square { period, amplitude } => {
                let t = t % period;
                if t < period / 2.0 {
                    amplitude
                } else {
                    -amplitude
                }
            }
            MockDataPattern::Triangle { period, amplitude } => {
                let t = t % period;
                let half = period / 2.0;
                if t < half {
                    amplitude * (2.0 * t / half - 1.0)
                } else {
                    amplitude * (1.0 - 2.0 * (t - half) / half)
                }
            }
        }
    }

    fn fill(&mut self, len: usize, sample_rate: f64) -> Vec<i16> {
        (0..len)
            .map(|_| {
                self.next_value(sample_rate)
                    .round()
                    .clamp(i16::MIN as f64, i16::MAX as f64) as i16
            })
            .collect()
    }
}

/// Description of one simulated device
#[derive(Debug, Clone)]
pub struct MockDevice {
    pub name: String,
    pub channels: usize,
    pub pattern: MockDataPattern,
    /// Time between two buffers
    pub period: Duration,
    /// Simulated sample rate used to evaluate time-based patterns
    pub sample_rate: f64,
    /// Never produce data; report a timeout every timeout interval instead
    pub stall: bool,
    /// Simulated time to open the device
    pub open_delay: Duration,
}

impl MockDevice {
    pub fn new(name: impl Into<String>, channels: usize) -> Self {
        Self {
            name: name.into(),
            channels,
            pattern: MockDataPattern::default(),
            period: Duration::from_millis(5),
            sample_rate: 100_000.0,
            stall: false,
            open_delay: Duration::ZERO,
        }
    }

    pub fn with_pattern(mut self, pattern: MockDataPattern) -> Self {
        self.pattern = pattern;
        self
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// A device whose hardware never delivers
    pub fn stalled(mut self) -> Self {
        self.stall = true;
        self
    }
}

/// Fault injection switches shared between a context and its sources
#[derive(Debug, Clone, Default)]
pub struct MockFaults {
    fail_next_start: Arc<AtomicBool>,
    fail_next_stop: Arc<AtomicBool>,
}

impl MockFaults {
    /// Make the next `start` fail
    pub fn fail_next_start(&self) {
        self.fail_next_start.store(true, Ordering::SeqCst);
    }

    /// Make the next `stop` fail (the worker keeps running)
    pub fn fail_next_stop(&self) {
        self.fail_next_stop.store(true, Ordering::SeqCst);
    }

    fn take_start_fault(&self) -> bool {
        self.fail_next_start.swap(false, Ordering::SeqCst)
    }

    fn take_stop_fault(&self) -> bool {
        self.fail_next_stop.swap(false, Ordering::SeqCst)
    }
}

/// Observable state of a mock source, shared with the context for assertions
#[derive(Debug, Default)]
pub struct MockSourceState {
    running: AtomicBool,
    released: AtomicBool,
    buffer_size: AtomicUsize,
    timeout_ms: AtomicU64,
    kernel_buffers: AtomicU32,
    blocks_emitted: AtomicU64,
    timeouts_reported: AtomicU64,
    starts: AtomicU64,
    stops: AtomicU64,
}

impl MockSourceState {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Whether the source has been dropped
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size.load(Ordering::SeqCst)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::SeqCst))
    }

    pub fn kernel_buffers(&self) -> u32 {
        self.kernel_buffers.load(Ordering::SeqCst)
    }

    /// Blocks pushed to the engine, summed over channels
    pub fn blocks_emitted(&self) -> u64 {
        self.blocks_emitted.load(Ordering::SeqCst)
    }

    /// Timeouts reported by a stalled device
    pub fn timeouts_reported(&self) -> u64 {
        self.timeouts_reported.load(Ordering::SeqCst)
    }

    /// Successful `start` calls that spawned a worker
    pub fn start_count(&self) -> u64 {
        self.starts.load(Ordering::SeqCst)
    }

    /// Successful `stop` calls that joined a worker
    pub fn stop_count(&self) -> u64 {
        self.stops.load(Ordering::SeqCst)
    }
}

struct Worker {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// A running or idle simulated device
pub struct MockSource {
    device: MockDevice,
    output: SourceOutput,
    state: Arc<MockSourceState>,
    faults: MockFaults,
    worker: Option<Worker>,
}

impl MockSource {
    fn new(
        device: MockDevice,
        buffer_size: usize,
        output: SourceOutput,
        faults: MockFaults,
    ) -> Self {
        let state = Arc::new(MockSourceState::default());
        state.buffer_size.store(buffer_size, Ordering::SeqCst);
        state.timeout_ms.store(DEFAULT_TIMEOUT_MS, Ordering::SeqCst);
        state.kernel_buffers.store(1, Ordering::SeqCst);
        Self {
            device,
            output,
            state,
            faults,
            worker: None,
        }
    }

    pub fn state(&self) -> Arc<MockSourceState> {
        self.state.clone()
    }

    fn run_worker(
        device: MockDevice,
        output: SourceOutput,
        state: Arc<MockSourceState>,
        stop_rx: Receiver<()>,
    ) {
        let mut generators: Vec<WaveGenerator> = (0..device.channels)
            .map(|_| WaveGenerator::new(device.pattern))
            .collect();
        let mut seq = 0u64;

        loop {
            let wait = if device.stall {
                state.timeout().max(MIN_STALL_WAIT)
            } else {
                device.period
            };
            match stop_rx.recv_timeout(wait) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }

            if device.stall {
                output.report_timeout();
                state.timeouts_reported.fetch_add(1, Ordering::SeqCst);
                continue;
            }

            let buffer_size = state.buffer_size();
            for (channel, generator) in generators.iter_mut().enumerate() {
                let samples = generator.fill(buffer_size, device.sample_rate);
                output.push(channel, Block::raw(channel, seq, samples));
                state.blocks_emitted.fetch_add(1, Ordering::SeqCst);
            }
            seq += 1;
        }

        tracing::trace!("Mock source worker for {} exited", device.name);
    }
}

impl AcquisitionSource for MockSource {
    fn channel_count(&self) -> usize {
        self.device.channels
    }

    fn buffer_size(&self) -> usize {
        self.state.buffer_size()
    }

    fn set_buffer_size(&mut self, size: usize) -> Result<()> {
        if size == 0 {
            return Err(AcqError::Source("buffer size must be non-zero".to_string()));
        }
        self.state.buffer_size.store(size, Ordering::SeqCst);
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.state.timeout()
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        let ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.state.timeout_ms.store(ms, Ordering::SeqCst);
        Ok(())
    }

    fn set_kernel_buffer_count(&mut self, count: u32) -> Result<()> {
        if self.worker.is_some() {
            return Err(AcqError::Source(
                "kernel buffers cannot change while running".to_string(),
            ));
        }
        self.state.kernel_buffers.store(count, Ordering::SeqCst);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        if self.faults.take_start_fault() {
            return Err(AcqError::SourceStartFailed(format!(
                "{}: injected start failure",
                self.device.name
            )));
        }

        let (stop_tx, stop_rx) = bounded(1);
        let device = self.device.clone();
        let output = self.output.clone();
        let state = self.state.clone();
        let handle = std::thread::Builder::new()
            .name(format!("mock-source-{}", self.device.name))
            .spawn(move || Self::run_worker(device, output, state, stop_rx))
            .map_err(|e| AcqError::SourceStartFailed(e.to_string()))?;

        self.worker = Some(Worker { stop_tx, handle });
        self.state.running.store(true, Ordering::SeqCst);
        self.state.starts.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("Mock source {} started", self.device.name);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if self.faults.take_stop_fault() {
            return Err(AcqError::SourceStopFailed(format!(
                "{}: injected stop failure",
                self.device.name
            )));
        }
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        let _ = worker.stop_tx.send(());
        let joined = worker.handle.join();
        self.state.running.store(false, Ordering::SeqCst);
        self.state.stops.fetch_add(1, Ordering::SeqCst);
        joined.map_err(|_| {
            AcqError::SourceStopFailed(format!("{}: worker panicked", self.device.name))
        })?;
        tracing::debug!("Mock source {} stopped", self.device.name);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for MockSource {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            let _ = worker.handle.join();
            self.state.running.store(false, Ordering::SeqCst);
        }
        self.state.released.store(true, Ordering::SeqCst);
    }
}

/// A [`SourceProvider`] serving a fixed set of simulated devices
#[derive(Default)]
pub struct MockContext {
    devices: HashMap<String, MockDevice>,
    faults: HashMap<String, MockFaults>,
    sources: Mutex<HashMap<String, Vec<Arc<MockSourceState>>>>,
    opened: AtomicUsize,
}

impl MockContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, device: MockDevice) -> Self {
        self.faults.entry(device.name.clone()).or_default();
        self.devices.insert(device.name.clone(), device);
        self
    }

    /// Fault switches for `device`
    pub fn faults(&self, device: &str) -> Option<MockFaults> {
        self.faults.get(device).cloned()
    }

    /// Total number of sources opened through this context
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of sources opened for `device`
    pub fn opened_for(&self, device: &str) -> usize {
        self.sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(device)
            .map_or(0, Vec::len)
    }

    /// State of the most recently opened source for `device`
    pub fn source_state(&self, device: &str) -> Option<Arc<MockSourceState>> {
        self.sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(device)
            .and_then(|states| states.last().cloned())
    }
}

impl SourceProvider for MockContext {
    fn open(
        &self,
        device: &str,
        buffer_size: usize,
        output: SourceOutput,
    ) -> Result<Box<dyn AcquisitionSource>> {
        let Some(config) = self.devices.get(device) else {
            return Err(AcqError::DeviceNotFound(device.to_string()));
        };
        if !config.open_delay.is_zero() {
            std::thread::sleep(config.open_delay);
        }

        let faults = self.faults.get(device).cloned().unwrap_or_default();
        let source = MockSource::new(config.clone(), buffer_size, output, faults);
        self.sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(device.to_string())
            .or_default()
            .push(source.state());
        self.opened.fetch_add(1, Ordering::SeqCst);

        tracing::info!(
            "Mock source opened: {} ({} channels)",
            device,
            config.channels
        );
        Ok(Box::new(source))
    }
}
