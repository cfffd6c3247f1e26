//! Position poller
//!
//! A [`SessionWatch`] is held by whatever is showing the session. While it
//! lives, the device position is queried on a fixed interval as long as the
//! session is playing or paused. Dropping the watch ends the loop; stopping
//! the session ends every loop. Neither touches playback itself.
//!
//! Updates are skipped while the position control is dragged. Releasing the
//! drag triggers an immediate poll instead of waiting for the next tick.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::session::{CastController, CastEvent};

/// Default interval between position queries
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Observer handle for the cast session
pub struct SessionWatch {
    controller: CastController,
    events: broadcast::Receiver<CastEvent>,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SessionWatch {
    pub(crate) fn spawn(controller: CastController, token: CancellationToken, interval: Duration) -> Self {
        let events = controller.subscribe();
        let task = tokio::spawn(poll_loop(controller.clone(), token.clone(), interval));
        Self {
            controller,
            events,
            token,
            task: Some(task),
        }
    }

    /// Next session event; `None` once the controller is gone
    pub async fn next_event(&mut self) -> Option<CastEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "Session watch lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Event already queued, without waiting
    pub fn try_next_event(&mut self) -> Option<CastEvent> {
        loop {
            match self.events.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// The volume control became visible: ask the device once
    pub async fn refresh_volume(&self) -> Option<u8> {
        self.controller.refresh_volume().await
    }

    pub fn set_position_drag(&self, dragging: bool) {
        self.controller.set_position_drag(dragging);
    }

    pub fn set_volume_drag(&self, dragging: bool) {
        self.controller.set_volume_drag(dragging);
    }

    /// Whether the poll loop is still running
    pub fn is_polling(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for SessionWatch {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn poll_loop(controller: CastController, token: CancellationToken, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::debug!(?period, "Position poller started");
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
            _ = controller.wake().notified() => {}
        }
        if token.is_cancelled() {
            break;
        }
        if let Some((position, duration)) = controller.poll_position().await {
            tracing::trace!(position, duration, "Position polled");
        }
    }
    tracing::debug!("Position poller stopped");
}
