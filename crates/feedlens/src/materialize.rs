//! Materialization loop: force the host to render its whole backlog.
//!
//! The host only materializes entries near the viewport, so "load
//! everything" is a drive-by: scroll to the end, give the host a settle
//! interval to render, re-scan, repeat until the registry stops growing.

use crate::surface::{FeedSurface, NodeId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

/// Tunables for the scroll-and-settle loop.
#[derive(Debug, Clone)]
pub struct MaterializeConfig {
    /// Wait after each scroll for the host to render.
    pub settle: Duration,
    /// Stop after this many consecutive iterations without registry growth.
    pub max_no_growth: usize,
    /// Absolute iteration cap, guarding against hosts that keep reflowing.
    pub max_iterations: usize,
}

impl Default for MaterializeConfig {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(1000),
            max_no_growth: 5,
            max_iterations: 50,
        }
    }
}

/// Outcome of one full materialization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    /// Total known entries when the run ended.
    pub total: usize,
    /// True when the run was stopped externally rather than converging.
    pub stopped: bool,
}

/// Single-flight state for the loop.
///
/// `try_begin` must be called synchronously, before any suspension point:
/// the flag is the only cross-invocation hazard in the engine.
#[derive(Debug, Default)]
pub struct AutoScroll {
    running: AtomicBool,
    stop: AtomicBool,
}

impl AutoScroll {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the loop. Returns false when a run is already active, in
    /// which case the caller should treat its request as a stop request.
    pub fn try_begin(&self) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        self.stop.store(false, Ordering::SeqCst);
        true
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Release the loop after a run ends, whatever the cause.
    pub fn finish(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.stop.store(false, Ordering::SeqCst);
    }
}

/// Drive `target` to its maximum extent until `rescan` stops reporting
/// growth, the iteration cap is hit, or an external stop arrives.
///
/// The stop flag is polled at the top of every iteration and nowhere else,
/// so cancellation latency is bounded by one iteration (scroll + settle +
/// scan). Scrolls back to the start on any termination.
pub async fn run_full<S, F, P>(
    surface: &S,
    target: NodeId,
    config: &MaterializeConfig,
    scroll: &AutoScroll,
    mut rescan: F,
    mut on_progress: P,
) -> LoadSummary
where
    S: FeedSurface + ?Sized,
    F: FnMut() -> usize,
    P: FnMut(usize),
{
    let mut previous = 0usize;
    let mut no_growth = 0usize;
    let mut iterations = 0usize;
    let mut total = 0usize;
    let mut stopped = false;

    loop {
        if scroll.stop_requested() {
            stopped = true;
            break;
        }
        if iterations >= config.max_iterations {
            debug!(iterations, "materialization hit iteration cap");
            break;
        }
        iterations += 1;

        surface.scroll_to(target, surface.scroll_extent(target));
        sleep(config.settle).await;

        total = rescan();
        on_progress(total);

        if total == previous {
            no_growth += 1;
            if no_growth >= config.max_no_growth {
                break;
            }
        } else {
            no_growth = 0;
        }
        previous = total;
    }

    surface.scroll_to(target, 0.0);
    info!(total, stopped, iterations, "materialization finished");
    LoadSummary { total, stopped }
}
