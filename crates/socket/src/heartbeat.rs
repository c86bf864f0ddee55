//! Heartbeat supervision for one open connection.
//!
//! The supervisor exists only while its connection is open; dropping it
//! cancels both timers. Each interval tick sends a probe and arms the reply
//! deadline, and the reply clears it. Because the deadline is shorter than
//! the interval, probes never overlap.

use std::pin::Pin;
use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};
use tracing::trace;

/// Supervisor phase.
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeartbeatState {
    /// Waiting for the next interval tick.
    Probing,
    /// Probe sent, reply deadline armed.
    AwaitingReply,
}

pub(crate) struct Heartbeat {
    pub(crate) interval: Interval,
    pub(crate) deadline: Option<Pin<Box<Sleep>>>,
    timeout: Duration,
}

impl Heartbeat {
    /// Starts supervision. The first probe goes out one full period after
    /// the connection opened.
    pub(crate) fn start(period: Duration, timeout: Duration) -> Self {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval,
            deadline: None,
            timeout,
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> HeartbeatState {
        if self.deadline.is_some() {
            HeartbeatState::AwaitingReply
        } else {
            HeartbeatState::Probing
        }
    }

    /// Arms the reply deadline after a probe was sent.
    pub(crate) fn arm(&mut self) {
        self.deadline = Some(Box::pin(tokio::time::sleep(self.timeout)));
    }

    /// Clears the reply deadline.
    pub(crate) fn on_reply(&mut self) {
        if self.deadline.take().is_none() {
            trace!("liveness reply without outstanding probe");
        }
    }

    /// Resolves when the armed deadline elapses; never resolves while no
    /// probe is outstanding. Takes the field, not `&mut self`, so it can sit
    /// next to `interval.tick()` in the same `select!`.
    pub(crate) async fn expired(deadline: &mut Option<Pin<Box<Sleep>>>) {
        match deadline {
            Some(sleep) => sleep.as_mut().await,
            None => std::future::pending().await,
        }
    }
}
