//! Ephemeral per-run status channels.
//!
//! A run publishes free-text status lines under its run id; a listener (the
//! SSE endpoint, the CLI) subscribes to the same id and reads until the
//! [`END_TOKEN`]. Channels exist only while someone is subscribed, so
//! publishing to a run nobody listens to is a no-op and never blocks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::crawl::{CrawlEvent, CrawlReporter};

/// Payload that terminates a progress stream.
pub const END_TOKEN: &str = "END";

/// Bounded wait for a single poll.
pub const DEFAULT_POLL_WAIT: Duration = Duration::from_secs(10);

/// Pause between polls that came back empty.
pub const DEFAULT_IDLE_SLEEP: Duration = Duration::from_millis(250);

/// Consecutive empty polls after which a listener gives up on a run.
pub const DEFAULT_MAX_IDLE_POLLS: u32 = 30;

const DEFAULT_CAPACITY: usize = 256;

/// How a long-lived listener polls its subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressPacing {
    pub poll_wait: Duration,
    pub idle_sleep: Duration,
    /// A run silent for this many polls in a row is treated as ended.
    pub max_idle_polls: u32,
}

impl Default for ProgressPacing {
    fn default() -> Self {
        Self {
            poll_wait: DEFAULT_POLL_WAIT,
            idle_sleep: DEFAULT_IDLE_SLEEP,
            max_idle_polls: DEFAULT_MAX_IDLE_POLLS,
        }
    }
}

/// Fresh identifier for a run that did not bring its own.
pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Registry of live progress channels, keyed by run id.
#[derive(Clone)]
pub struct ProgressHub {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<String>>>>,
    capacity: usize,
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ProgressHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, broadcast::Sender<String>>> {
        self.channels.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Send `message` to every current subscriber of `run_id`.
    pub fn publish(&self, run_id: &str, message: impl Into<String>) {
        let message = message.into();
        let channels = self.lock();
        match channels.get(run_id) {
            Some(sender) => {
                // Err only means every receiver is gone; the message is dropped.
                let _ = sender.send(message);
            }
            None => {
                tracing::trace!(%run_id, %message, "No progress subscriber, dropping message");
            }
        }
    }

    /// Publish the termination token.
    pub fn finish(&self, run_id: &str) {
        self.publish(run_id, END_TOKEN);
    }

    /// Start listening to `run_id`, opening its channel if needed.
    pub fn subscribe(&self, run_id: &str) -> ProgressSubscription {
        let mut channels = self.lock();
        let receiver = match channels.get(run_id) {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, receiver) = broadcast::channel(self.capacity);
                channels.insert(run_id.to_string(), sender);
                receiver
            }
        };

        ProgressSubscription {
            hub: self.clone(),
            run_id: run_id.to_string(),
            receiver: Some(receiver),
        }
    }

    /// Close the channel of `run_id` once nobody listens to it any more.
    pub fn release(&self, run_id: &str) {
        let mut channels = self.lock();
        if channels
            .get(run_id)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            channels.remove(run_id);
            tracing::debug!(%run_id, "Progress channel released");
        }
    }

    pub fn is_open(&self, run_id: &str) -> bool {
        self.lock().contains_key(run_id)
    }

    /// A [`CrawlReporter`] that publishes into `run_id`.
    pub fn reporter(&self, run_id: impl Into<String>) -> ProgressReporter {
        ProgressReporter {
            hub: self.clone(),
            run_id: run_id.into(),
        }
    }
}

/// Result of one bounded poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressPoll {
    Message(String),
    /// Nothing arrived within the wait.
    Idle,
    /// The run has finished (or the channel was torn down).
    End,
}

/// A listener on one run's channel. Dropping it releases the channel.
pub struct ProgressSubscription {
    hub: ProgressHub,
    run_id: String,
    receiver: Option<broadcast::Receiver<String>>,
}

impl ProgressSubscription {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Wait up to `wait` for the next message.
    pub async fn next(&mut self, wait: Duration) -> ProgressPoll {
        let Some(receiver) = self.receiver.as_mut() else {
            return ProgressPoll::End;
        };

        match tokio::time::timeout(wait, receiver.recv()).await {
            Err(_) => ProgressPoll::Idle,
            Ok(Ok(message)) if message == END_TOKEN => ProgressPoll::End,
            Ok(Ok(message)) => ProgressPoll::Message(message),
            Ok(Err(RecvError::Lagged(skipped))) => {
                ProgressPoll::Message(format!("({skipped} progress messages skipped)"))
            }
            Ok(Err(RecvError::Closed)) => ProgressPoll::End,
        }
    }
}

impl Drop for ProgressSubscription {
    fn drop(&mut self) {
        drop(self.receiver.take());
        self.hub.release(&self.run_id);
    }
}

/// Turns crawl events into status lines on a progress channel, and logs them.
#[derive(Clone)]
pub struct ProgressReporter {
    hub: ProgressHub,
    run_id: String,
}

impl ProgressReporter {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn publish(&self, message: impl Into<String>) {
        self.hub.publish(&self.run_id, message);
    }

    pub fn finish(&self) {
        self.hub.finish(&self.run_id);
    }
}

impl CrawlReporter for ProgressReporter {
    fn report(&self, event: CrawlEvent<'_>) {
        let run_id = self.run_id.as_str();
        let message = match event {
            CrawlEvent::SessionOpened { source } => {
                tracing::info!(%run_id, %source, "Browser session opened");
                format!("Browser session opened for {source}")
            }
            CrawlEvent::SessionRestored { source, cookies } => {
                tracing::info!(%run_id, %source, %cookies, "Reusing stored session");
                format!("Reusing stored session ({cookies} cookies)")
            }
            CrawlEvent::Authenticating { source } => {
                tracing::info!(%run_id, %source, "Authenticating");
                format!("Logging into {source}")
            }
            CrawlEvent::Authenticated { source } => {
                tracing::info!(%run_id, %source, "Authenticated");
                "Logged in, session saved".to_string()
            }
            CrawlEvent::SessionExpired { source, url } => {
                tracing::warn!(%run_id, %source, %url, "Session expired mid-crawl");
                "Session expired, logging in again".to_string()
            }
            CrawlEvent::PageProcessed {
                url,
                page,
                rows,
                queued,
            } => {
                tracing::info!(%run_id, %url, %page, %rows, %queued, "Page processed");
                format!("Page {page}: {rows} rows ({queued} pages left)")
            }
            CrawlEvent::Finished { pages, rows } => {
                tracing::info!(%run_id, %pages, %rows, "Crawl finished");
                format!("Crawl finished: {pages} pages, {rows} rows")
            }
            CrawlEvent::Failed { error } => {
                tracing::warn!(%run_id, %error, "Crawl failed");
                format!("Crawl failed: {error}")
            }
        };
        self.publish(message);
    }
}
