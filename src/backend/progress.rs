//! Combined load progress.
//!
//! Transfer and unpack progress are folded into one monotonic 0..=1 value with
//! a reserved tail that is only released by [`ProgressTracker::complete`].

use super::ProgressCallback;
use crate::config::ProgressWeights;
use parking_lot::Mutex;
use std::sync::Arc;

/// Highest value reported before completion
const UNFINISHED_CAP: f64 = 0.99;

#[derive(Debug, Default)]
struct ProgressState {
    transfer: f64,
    unpack: f64,
    completed: bool,
    reported: f64,
}

/// Weighted combination of transfer and unpack progress.
pub struct ProgressTracker {
    weights: ProgressWeights,
    state: Mutex<ProgressState>,
    sink: Arc<dyn Fn(f64) + Send + Sync>,
}

impl ProgressTracker {
    pub fn new(weights: ProgressWeights, sink: Arc<dyn Fn(f64) + Send + Sync>) -> Arc<Self> {
        Arc::new(Self {
            weights,
            state: Mutex::new(ProgressState::default()),
            sink,
        })
    }

    /// Callback to hand to a backend for byte transfer progress.
    pub fn transfer_callback(self: &Arc<Self>) -> ProgressCallback {
        let tracker = Arc::clone(self);
        Arc::new(move |done: u64, total: u64| {
            tracker.update(|state| state.transfer = fraction(done, total))
        })
    }

    /// Callback for unpack/fold progress reported by the model loader.
    pub fn unpack_callback(self: &Arc<Self>) -> ProgressCallback {
        let tracker = Arc::clone(self);
        Arc::new(move |done: u64, total: u64| {
            tracker.update(|state| state.unpack = fraction(done, total))
        })
    }

    /// Release the reserved tail and report 1.0.
    pub fn complete(&self) {
        self.update(|state| state.completed = true);
    }

    /// Last reported value.
    pub fn value(&self) -> f64 {
        self.state.lock().reported
    }

    fn update(&self, apply: impl FnOnce(&mut ProgressState)) {
        let report = {
            let mut state = self.state.lock();
            apply(&mut state);
            let value = if state.completed {
                1.0
            } else {
                (state.transfer * self.weights.transfer + state.unpack * self.weights.unpack)
                    .min(UNFINISHED_CAP)
            };
            if value > state.reported {
                state.reported = value;
                Some(value)
            } else {
                None
            }
        };
        if let Some(value) = report {
            (self.sink)(value);
        }
    }
}

fn fraction(done: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (done as f64 / total as f64).clamp(0.0, 1.0)
}
