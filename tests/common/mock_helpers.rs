//! Mock construction helpers

use acqmux::backend::{MockContext, MockDataPattern, MockDevice};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

static NEXT_DEVICE: AtomicUsize = AtomicUsize::new(0);

/// Device name no other test in this binary uses
pub fn unique_device(prefix: &str) -> String {
    format!("{}-{}", prefix, NEXT_DEVICE.fetch_add(1, Ordering::Relaxed))
}

/// A device producing a counter pattern every millisecond
pub fn fast_device(name: &str, channels: usize) -> MockDevice {
    MockDevice::new(name, channels)
        .with_pattern(MockDataPattern::Counter {
            step: 1.0,
            min: 0.0,
            max: 1000.0,
        })
        .with_period(Duration::from_millis(1))
}

/// A context serving one fast device
pub fn create_test_context(name: &str, channels: usize) -> MockContext {
    MockContext::new().with_device(fast_device(name, channels))
}
