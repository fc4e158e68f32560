//! Per-run log buffering and fan-out.
//!
//! Each run gets a channel: a bounded replay buffer for late subscribers
//! plus a broadcast sender for live delivery. Subscribers receive copies of
//! events, never shared references, and the `complete` sentinel is always
//! the last event on a stream.

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::warn;

use crate::pipeline::RunEvent;

/// Broadcast channel capacity per run.
const CHANNEL_CAPACITY: usize = 1024;

/// Maximum buffered events per run; oldest events drop first.
const BUFFER_CAPACITY: usize = 10_000;

/// Completed run channels retained for late subscribers.
const COMPLETED_RETAINED: usize = 8;

/// A snapshot handed to a new subscriber: buffered history plus a live
/// receiver. For an already-complete run the history ends with the sentinel
/// and the receiver yields nothing further.
pub struct LogSubscription {
    pub snapshot: Vec<RunEvent>,
    pub receiver: broadcast::Receiver<RunEvent>,
}

struct RunChannel {
    buffer: Vec<RunEvent>,
    sender: broadcast::Sender<RunEvent>,
    complete: bool,
}

struct BusInner {
    channels: HashMap<i64, RunChannel>,
    /// Channel creation order, for pruning old completed runs.
    order: Vec<i64>,
}

/// Log bus for one project's runs.
pub struct RunLogBus {
    project_id: i64,
    inner: Mutex<BusInner>,
}

impl RunLogBus {
    /// Creates a bus bound to a project.
    pub fn new(project_id: i64) -> Self {
        Self {
            project_id,
            inner: Mutex::new(BusInner {
                channels: HashMap::new(),
                order: Vec::new(),
            }),
        }
    }

    /// The project this bus belongs to.
    pub fn project_id(&self) -> i64 {
        self.project_id
    }

    /// Opens the channel for a new run and prunes old completed channels.
    pub fn open(&self, run_id: i64) {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        let mut inner = self.inner.lock().unwrap();
        inner.channels.insert(
            run_id,
            RunChannel {
                buffer: Vec::new(),
                sender,
                complete: false,
            },
        );
        inner.order.push(run_id);
        prune_completed(&mut inner);
    }

    /// Publishes an event produced for `(project_id, run_id)`.
    ///
    /// Events for a different project, an unknown run, or an already
    /// complete run are dropped on ingress: stale contexts must not leak
    /// into live streams.
    pub fn publish(&self, project_id: i64, event: RunEvent) {
        if project_id != self.project_id {
            warn!(
                "Dropping event for foreign project {project_id} (bus is project {})",
                self.project_id
            );
            return;
        }

        let mut inner = self.inner.lock().unwrap();
        let run_id = event.run_id();
        let Some(channel) = inner.channels.get_mut(&run_id) else {
            warn!("Dropping event for unknown run {run_id}");
            return;
        };
        if channel.complete {
            warn!("Dropping event for completed run {run_id}");
            return;
        }

        if channel.buffer.len() >= BUFFER_CAPACITY {
            channel.buffer.remove(0);
        }
        channel.buffer.push(event.clone());
        // No subscribers is fine
        let _ = channel.sender.send(event);
    }

    /// Publishes the terminal sentinel and closes the run's channel to new
    /// events. Always the last event a subscriber sees.
    pub fn complete(&self, run_id: i64) {
        let mut inner = self.inner.lock().unwrap();
        let Some(channel) = inner.channels.get_mut(&run_id) else {
            return;
        };
        if channel.complete {
            return;
        }

        let sentinel = RunEvent::complete(run_id);
        if channel.buffer.len() >= BUFFER_CAPACITY {
            channel.buffer.remove(0);
        }
        channel.buffer.push(sentinel.clone());
        let _ = channel.sender.send(sentinel);
        channel.complete = true;
    }

    /// Subscribes to a run's stream: buffered snapshot plus live events.
    ///
    /// Returns `None` for a run this bus has never seen.
    pub fn subscribe(&self, run_id: i64) -> Option<LogSubscription> {
        let inner = self.inner.lock().unwrap();
        let channel = inner.channels.get(&run_id)?;
        Some(LogSubscription {
            snapshot: channel.buffer.clone(),
            receiver: channel.sender.subscribe(),
        })
    }
}

/// Drops the oldest completed channels beyond the retention window.
fn prune_completed(inner: &mut BusInner) {
    let completed: Vec<i64> = inner
        .order
        .iter()
        .copied()
        .filter(|id| inner.channels.get(id).is_some_and(|c| c.complete))
        .collect();

    if completed.len() <= COMPLETED_RETAINED {
        return;
    }
    for id in &completed[..completed.len() - COMPLETED_RETAINED] {
        inner.channels.remove(id);
        inner.order.retain(|o| o != id);
    }
}
