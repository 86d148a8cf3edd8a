#![allow(dead_code)]
//! Test harness utilities for pianotutor-core integration tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pianotutor_core::protocol::Command;
use pianotutor_core::{ManualScheduler, TestDevice, Tutor, TutorSettings};

pub struct Harness {
    pub tutor: Tutor,
    pub device: TestDevice,
    pub scheduler: Arc<ManualScheduler>,
}

/// A tutor on an in-memory device with manually driven flushes.
pub fn harness() -> Harness {
    harness_with(&TutorSettings::default())
}

pub fn harness_with(settings: &TutorSettings) -> Harness {
    let device = TestDevice::new();
    let scheduler = Arc::new(ManualScheduler::new());
    let tutor = Tutor::with_settings(device.connector(), scheduler.clone(), settings);
    Harness {
        tutor,
        device,
        scheduler,
    }
}

/// Wire lines of pixel writes only.
pub fn pixel_lines(device: &TestDevice) -> Vec<String> {
    device
        .commands()
        .iter()
        .filter(|c| matches!(c, Command::SetPixel { .. }))
        .map(|c| c.to_string())
        .collect()
}

pub fn flush_count(device: &TestDevice) -> usize {
    device
        .commands()
        .iter()
        .filter(|c| **c == Command::Flush)
        .count()
}

/// Poll `check` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    check()
}
