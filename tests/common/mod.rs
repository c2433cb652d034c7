//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use serial_capture::{CaptureSettings, Packet};
use std::time::{Duration, Instant};

/// Upper bound for anything that waits on the worker thread
pub fn test_timeout() -> Duration {
    Duration::from_secs(2)
}

/// Capture settings with short periods so tests finish quickly
pub fn fast_capture(output_dir: impl Into<std::path::PathBuf>) -> CaptureSettings {
    CaptureSettings {
        frame_rate_hz: 200,
        handshake_timeout_ms: 250,
        lock_timeout_ms: 20,
        idle_poll_ms: 1,
        output_dir: output_dir.into(),
        log_dir: None,
    }
}

/// Poll `condition` every millisecond until it holds or the timeout passes
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + test_timeout();
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// `(series, value)` of each packet rendered as strings
pub fn series_values(packets: &[Packet]) -> Vec<(String, String)> {
    packets
        .iter()
        .map(|p| (p.series.to_string(), p.value.to_string()))
        .collect()
}
