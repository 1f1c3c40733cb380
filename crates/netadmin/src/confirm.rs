//! Waiting for a submitted configuration to be applied.
//!
//! Persisting a configuration is asynchronous: the store writes it and the
//! engine's update pass later posts [`NETWORK_CONFIG_CHANGE_TOPIC`]. The gate
//! marks a submission pending, then waits for that event, polling the pending
//! flag at a fixed interval until a deadline. Expiry is a soft failure: it is
//! logged and the caller proceeds.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::error::Result;
use crate::services::{Event, EventBus, NETWORK_CONFIG_CHANGE_TOPIC};

/// Default interval between pending-flag checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default bound on the wait.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed { elapsed: Duration },
    TimedOut,
}

impl Confirmation {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }
}

/// Blocks a submission until its confirmation event arrives or times out.
#[derive(Debug)]
pub struct ChangeConfirmationGate {
    pending: AtomicBool,
    poll_interval: Duration,
    timeout: Duration,
}

impl Default for ChangeConfirmationGate {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT)
    }
}

impl ChangeConfirmationGate {
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            pending: AtomicBool::new(false),
            poll_interval,
            timeout,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    /// Clear the pending flag if `event` is a confirmation. Matching is by
    /// topic only.
    pub fn handle_event(&self, event: &Event) -> bool {
        if event.topic != NETWORK_CONFIG_CHANGE_TOPIC {
            return false;
        }
        self.pending.store(false, Ordering::SeqCst);
        true
    }

    /// Run `submit`, then wait for confirmation.
    ///
    /// An error from `submit` clears the pending flag and is returned. The
    /// wait itself never fails.
    pub async fn submit<F>(&self, bus: &EventBus, submit: F) -> Result<Confirmation>
    where
        F: Future<Output = Result<()>>,
    {
        // subscribe before submitting so a fast confirmation is not missed
        let mut events = bus.subscribe();
        self.pending.store(true, Ordering::SeqCst);

        if let Err(e) = submit.await {
            self.pending.store(false, Ordering::SeqCst);
            return Err(e);
        }
        Ok(self.wait(&mut events).await)
    }

    async fn wait(&self, events: &mut broadcast::Receiver<Event>) -> Confirmation {
        let start = Instant::now();
        let deadline = tokio::time::sleep_until(start + self.timeout);
        tokio::pin!(deadline);

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut bus_open = true;

        loop {
            if !self.is_pending() {
                let elapsed = start.elapsed();
                debug!(?elapsed, "configuration change confirmed");
                return Confirmation::Confirmed { elapsed };
            }

            tokio::select! {
                received = events.recv(), if bus_open => match received {
                    Ok(event) => {
                        self.handle_event(&event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "confirmation receiver lagged");
                    }
                    Err(RecvError::Closed) => bus_open = false,
                },
                _ = ticker.tick() => {}
                _ = &mut deadline => {
                    warn!(timeout = ?self.timeout, "did not receive a network configuration change event");
                    self.pending.store(false, Ordering::SeqCst);
                    return Confirmation::TimedOut;
                }
            }
        }
    }
}
