//! Busy indicator fed by scanning code and drained by a timer.
//!
//! Hot loops call [`BusySpinner::tick`] once per line; that is a single relaxed
//! atomic add, so scanning never contends with the coordinator. A background
//! ticker drains the counter at a fixed interval and reports state transitions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Progress indicator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpinnerState {
    #[default]
    Idle,
    /// Work was observed during the last interval
    Busy,
    /// Was busy, nothing observed during the last interval
    BusyIdle,
}

impl SpinnerState {
    /// Transition after one drain interval
    pub fn next(self, worked: bool) -> SpinnerState {
        match (self, worked) {
            (_, true) => SpinnerState::Busy,
            (SpinnerState::Busy, false) => SpinnerState::BusyIdle,
            (SpinnerState::BusyIdle, false) | (SpinnerState::Idle, false) => SpinnerState::Idle,
        }
    }
}

/// Coalesced progress signal
#[derive(Debug, Default)]
pub struct BusySpinner {
    ticks: AtomicU64,
}

impl BusySpinner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one unit of work
    #[inline]
    pub fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Take the work count accumulated since the previous drain
    pub fn drain(&self) -> u64 {
        self.ticks.swap(0, Ordering::Relaxed)
    }
}

/// Drain `spinner` every `interval`, calling `on_change` on each transition
/// until `cancellation_token` fires.
pub fn spawn_ticker<F>(
    spinner: Arc<BusySpinner>,
    interval: Duration,
    cancellation_token: CancellationToken,
    mut on_change: F,
) -> JoinHandle<()>
where
    F: FnMut(SpinnerState) + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(interval);
        let mut state = SpinnerState::Idle;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let next = state.next(spinner.drain() > 0);
                    if next != state {
                        state = next;
                        on_change(state);
                    }
                },
                _ = cancellation_token.cancelled() => break,
            }
        }
    })
}
