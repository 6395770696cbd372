//! Blocking wait for a session to reach a terminal status.
//!
//! Waiters subscribe to the session's status channel and sleep until it
//! changes, with a periodic re-check against the store in case a
//! notification is missed. Any number of waiters may watch the same
//! session; each holds its own receiver. A timeout never mutates state.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::debug;

use super::session_store::SessionStore;
use crate::models::session::Session;
use crate::{AppError, Result};

/// Waits for sessions held by a [`SessionStore`].
#[derive(Clone)]
pub struct Waiter {
    store: Arc<SessionStore>,
    poll_interval: Duration,
}

impl Waiter {
    /// Construct a waiter with the given fallback re-check interval.
    #[must_use]
    pub fn new(store: Arc<SessionStore>, poll_interval: Duration) -> Self {
        Self {
            store,
            poll_interval,
        }
    }

    /// Wait until the session is terminal or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown session and
    /// `AppError::Timeout` with the last observed status on deadline.
    pub async fn wait(&self, session_id: &str, timeout: Duration) -> Result<Session> {
        self.wait_with_interval(session_id, timeout, self.poll_interval)
            .await
    }

    /// Like [`wait`](Self::wait) with an explicit fallback re-check interval.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown session and
    /// `AppError::Timeout` with the last observed status on deadline.
    pub async fn wait_with_interval(
        &self,
        session_id: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Session> {
        let mut status_rx = self.store.subscribe(session_id).await?;
        let now = Instant::now();
        // Durations past the representable instant range mean "never".
        let deadline = now.checked_add(timeout);
        let period = poll_interval.max(Duration::from_millis(1));
        let mut poll = now.checked_add(period.saturating_mul(2)).map(|_| {
            let mut poll = tokio::time::interval_at(now + period, period);
            poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
            poll
        });
        let mut notifications_open = true;

        loop {
            let status = *status_rx.borrow_and_update();
            if status.is_terminal() {
                return self.store.get(session_id).await;
            }

            tokio::select! {
                () = sleep_until_deadline(deadline) => {
                    let last_status = self.store.status(session_id).await.unwrap_or(status);
                    if last_status.is_terminal() {
                        return self.store.get(session_id).await;
                    }
                    debug!(session_id, %last_status, "wait timed out");
                    return Err(AppError::Timeout {
                        session_id: session_id.to_owned(),
                        last_status,
                    });
                }
                changed = status_rx.changed(), if notifications_open => {
                    if changed.is_err() {
                        notifications_open = false;
                    }
                }
                () = next_tick(poll.as_mut()) => {
                    let session = self.store.get(session_id).await?;
                    if session.status.is_terminal() {
                        return Ok(session);
                    }
                }
            }
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn next_tick(poll: Option<&mut Interval>) {
    match poll {
        Some(poll) => {
            poll.tick().await;
        }
        None => std::future::pending().await,
    }
}
