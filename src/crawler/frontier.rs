//! Frontier queue
//!
//! A FIFO of URLs owned by a single actor task. Every state change goes
//! through a command channel, so callers never see a torn state. A URL is
//! `Queued` until polled, `Active` until acknowledged, then forgotten.
//!
//! Once the cancellation signal fires (or its sender is dropped) the actor
//! stops: blocked and later `poll` calls return `None`, `push` fails with
//! `FrontierError::Closed`, `count` is 0 and `active` is false.

use std::collections::{HashMap, VecDeque};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::trace;

/// Errors returned by frontier operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrontierError {
    #[error("frontier is closed")]
    Closed,
}

enum Command {
    Push(String),
    Poll(oneshot::Sender<String>),
    Ack(String),
    Count(oneshot::Sender<usize>),
    Active(oneshot::Sender<bool>),
}

/// State owned by the actor task
#[derive(Default)]
struct FrontierState {
    queued: VecDeque<String>,
    pollers: VecDeque<oneshot::Sender<String>>,
    /// Delivered but not yet acknowledged, with occurrence counts
    in_flight: HashMap<String, usize>,
}

impl FrontierState {
    fn push(&mut self, mut url: String) {
        while let Some(poller) = self.pollers.pop_front() {
            let delivered = url.clone();
            match poller.send(url) {
                Ok(()) => {
                    self.deliver(&delivered);
                    return;
                }
                // The poller went away, try the next one
                Err(returned) => url = returned,
            }
        }
        self.queued.push_back(url);
    }

    fn deliver(&mut self, url: &str) {
        *self.in_flight.entry(url.to_string()).or_insert(0) += 1;
    }

    fn poll(&mut self, reply: oneshot::Sender<String>) {
        match self.queued.pop_front() {
            Some(url) => {
                let delivered = url.clone();
                match reply.send(url) {
                    Ok(()) => self.deliver(&delivered),
                    Err(url) => self.queued.push_front(url),
                }
            }
            None => self.pollers.push_back(reply),
        }
    }

    fn ack(&mut self, url: &str) {
        if let Some(count) = self.in_flight.get_mut(url) {
            *count -= 1;
            if *count == 0 {
                self.in_flight.remove(url);
            }
        }
    }

    fn active(&self) -> bool {
        !self.queued.is_empty() || !self.in_flight.is_empty()
    }
}

async fn run(mut commands: mpsc::UnboundedReceiver<Command>, mut cancel: watch::Receiver<bool>) {
    let mut state = FrontierState::default();

    loop {
        tokio::select! {
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    break;
                }
            }
            command = commands.recv() => {
                let Some(command) = command else { break };
                match command {
                    Command::Push(url) => {
                        trace!("Queued {}", url);
                        state.push(url);
                    }
                    Command::Poll(reply) => state.poll(reply),
                    Command::Ack(url) => state.ack(&url),
                    Command::Count(reply) => {
                        let _ = reply.send(state.queued.len());
                    }
                    Command::Active(reply) => {
                        let _ = reply.send(state.active());
                    }
                }
            }
        }
    }

    // Dropping the waiting pollers releases their callers with `None`
    trace!(
        "Frontier stopped with {} queued and {} in flight",
        state.queued.len(),
        state.in_flight.len()
    );
}

/// Handle to the frontier actor, cheap to clone
#[derive(Clone)]
pub struct Frontier {
    commands: mpsc::UnboundedSender<Command>,
    cancel: watch::Receiver<bool>,
}

impl Frontier {
    /// Spawns the actor task, which runs until `cancel` becomes true
    pub fn spawn(cancel: watch::Receiver<bool>) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx, cancel.clone()));
        Self { commands, cancel }
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Appends a URL to the queue
    pub fn push(&self, url: impl Into<String>) -> Result<(), FrontierError> {
        if self.is_cancelled() {
            return Err(FrontierError::Closed);
        }
        self.commands
            .send(Command::Push(url.into()))
            .map_err(|_| FrontierError::Closed)
    }

    /// Waits for the next URL in push order and marks it active
    ///
    /// Returns `None` once the frontier is cancelled.
    pub async fn poll(&self) -> Option<String> {
        if self.is_cancelled() {
            return None;
        }
        let (reply, rx) = oneshot::channel();
        self.commands.send(Command::Poll(reply)).ok()?;
        rx.await.ok()
    }

    /// Marks the most recently delivered occurrence of `url` as done
    ///
    /// Unknown URLs are ignored.
    pub fn ack(&self, url: &str) {
        let _ = self.commands.send(Command::Ack(url.to_string()));
    }

    /// Number of queued URLs not yet delivered
    pub async fn count(&self) -> usize {
        if self.is_cancelled() {
            return 0;
        }
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Count(reply)).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// True while any URL is queued or delivered but unacknowledged
    pub async fn active(&self) -> bool {
        if self.is_cancelled() {
            return false;
        }
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Active(reply)).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn frontier() -> (Frontier, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        (Frontier::spawn(rx), tx)
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (frontier, _cancel) = frontier();
        frontier.push("a").unwrap();
        frontier.push("b").unwrap();
        assert_eq!(frontier.count().await, 2);
        assert_eq!(frontier.poll().await.as_deref(), Some("a"));
        assert_eq!(frontier.poll().await.as_deref(), Some("b"));
        assert_eq!(frontier.count().await, 0);
    }

    #[tokio::test]
    async fn test_active_until_acked() {
        let (frontier, _cancel) = frontier();
        assert!(!frontier.active().await);

        frontier.push("x").unwrap();
        assert!(frontier.active().await);

        let url = frontier.poll().await.unwrap();
        assert_eq!(frontier.count().await, 0);
        assert!(frontier.active().await);

        frontier.ack(&url);
        assert!(!frontier.active().await);
    }

    #[tokio::test]
    async fn test_ack_counts_occurrences() {
        let (frontier, _cancel) = frontier();
        frontier.push("x").unwrap();
        frontier.push("x").unwrap();
        frontier.poll().await.unwrap();
        frontier.poll().await.unwrap();

        frontier.ack("x");
        assert!(frontier.active().await);
        frontier.ack("x");
        assert!(!frontier.active().await);
    }

    #[tokio::test]
    async fn test_unknown_ack_is_ignored() {
        let (frontier, _cancel) = frontier();
        frontier.ack("never-pushed");
        frontier.push("a").unwrap();
        assert_eq!(frontier.count().await, 1);
    }

    #[tokio::test]
    async fn test_poll_waits_for_push() {
        let (frontier, _cancel) = frontier();
        let waiter = {
            let frontier = frontier.clone();
            tokio::spawn(async move { frontier.poll().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        frontier.push("late").unwrap();

        let got = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.as_deref(), Some("late"));
        assert!(frontier.active().await);
    }

    #[tokio::test]
    async fn test_handoff_to_waiting_poller_stays_active_until_ack() {
        let (frontier, _cancel) = frontier();
        let waiters: Vec<_> = (0..2)
            .map(|_| {
                let frontier = frontier.clone();
                tokio::spawn(async move { frontier.poll().await })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(20)).await;

        frontier.push("https://example.com/").unwrap();
        frontier.push("https://example.com/a").unwrap();
        for waiter in waiters {
            let got = tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .unwrap()
                .unwrap();
            assert!(got.is_some());
        }

        assert_eq!(frontier.count().await, 0);
        assert!(frontier.active().await);
        frontier.ack("https://example.com/");
        assert!(frontier.active().await);
        frontier.ack("https://example.com/a");
        assert!(!frontier.active().await);
    }

    #[tokio::test]
    async fn test_cancel_releases_pollers() {
        let (frontier, cancel) = frontier();
        let waiter = {
            let frontier = frontier.clone();
            tokio::spawn(async move { frontier.poll().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.send(true).unwrap();

        let got = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn test_operations_after_cancel() {
        let (frontier, cancel) = frontier();
        frontier.push("a").unwrap();
        cancel.send(true).unwrap();

        assert_eq!(frontier.push("b"), Err(FrontierError::Closed));
        assert_eq!(frontier.poll().await, None);
        assert_eq!(frontier.count().await, 0);
        assert!(!frontier.active().await);
        frontier.ack("a");
    }
}
