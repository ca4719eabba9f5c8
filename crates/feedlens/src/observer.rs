//! Change observer: debounced reaction to host churn.
//!
//! The host only reports generic structural-change notifications, and it
//! reports them in bursts. Each burst collapses into a single re-scan +
//! re-filter pass fired after the burst quiesces; scroll events get their
//! own, independent window because the host loads more entries on scroll.

use crate::session::FeedSession;
use crate::surface::FeedSurface;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Debounce windows for the two event classes.
#[derive(Debug, Clone)]
pub struct DebounceConfig {
    /// Window for structural-mutation bursts.
    pub structural: Duration,
    /// Window for scroll events.
    pub scroll: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            structural: Duration::from_millis(300),
            scroll: Duration::from_millis(500),
        }
    }
}

/// A change notification from the host surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedEvent {
    /// The visual tree was structurally mutated.
    Structural,
    /// The list (or its container) was scrolled.
    Scrolled,
}

/// One resettable debounce window: every poke pushes the deadline out.
#[derive(Debug, Default)]
pub struct Debounce {
    deadline: Option<Instant>,
}

impl Debounce {
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)arm the window to fire `window` from now.
    pub fn poke(&mut self, window: Duration) {
        self.deadline = Some(Instant::now() + window);
    }

    pub fn armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    /// Resolve when the armed deadline passes. Only call while armed.
    pub async fn expired(&self) {
        if let Some(deadline) = self.deadline {
            sleep_until(deadline).await;
        }
    }
}

/// Sleep until an optional deadline. Pending-forever when `None`; gated by
/// the select preconditions below so that case is never polled.
async fn maybe_sleep(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

/// Consume host events until the channel closes, firing debounced re-scan
/// passes on the session. Structural passes also refresh search markers;
/// scroll passes only re-scan and re-filter.
pub async fn run_observer<S>(
    session: Arc<FeedSession<S>>,
    mut events: mpsc::UnboundedReceiver<FeedEvent>,
    config: DebounceConfig,
) where
    S: FeedSurface + 'static,
{
    let mut structural = Debounce::new();
    let mut scroll = Debounce::new();

    loop {
        let structural_deadline = structural.deadline();
        let scroll_deadline = scroll.deadline();
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(FeedEvent::Structural) => structural.poke(config.structural),
                    Some(FeedEvent::Scrolled) => scroll.poke(config.scroll),
                    None => break,
                }
            }
            _ = maybe_sleep(structural_deadline), if structural_deadline.is_some() => {
                structural.disarm();
                debug!("structural burst quiesced; re-scanning");
                session.rescan_and_refilter(true);
            }
            _ = maybe_sleep(scroll_deadline), if scroll_deadline.is_some() => {
                scroll.disarm();
                session.rescan_and_refilter(false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{advance, Duration};

    #[tokio::test(start_paused = true)]
    async fn poke_resets_the_window() {
        let window = Duration::from_millis(300);
        let mut debounce = Debounce::new();
        debounce.poke(window);

        advance(Duration::from_millis(200)).await;
        // A new event inside the window pushes the deadline out.
        debounce.poke(window);
        advance(Duration::from_millis(200)).await;

        let fired = tokio::select! {
            _ = debounce.expired(), if debounce.armed() => true,
            _ = tokio::time::sleep(Duration::from_millis(50)) => false,
        };
        assert!(!fired, "window must not fire 200ms after the second poke");

        advance(Duration::from_millis(100)).await;
        let fired = tokio::select! {
            _ = debounce.expired(), if debounce.armed() => true,
            _ = tokio::time::sleep(Duration::from_millis(1000)) => false,
        };
        assert!(fired);
    }

    #[tokio::test(start_paused = true)]
    async fn disarmed_window_never_fires() {
        let debounce = Debounce::new();
        assert!(!debounce.armed());
    }
}
