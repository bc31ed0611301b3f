use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;

use crate::types::RedisError;

/// Lifecycle and error notifications emitted by a cluster connection.
///
/// Events complement the per-call results: a command always reports its
/// own outcome through its return value, while the event stream carries
/// cluster-wide state changes that have no single caller to report to.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum ClusterEvent {
    /// The first node came up; the cluster can route commands.
    Ready,
    /// All nodes are down after the cluster had been ready.
    Unready,
    /// The cluster has quit and every pooled connection has been
    /// terminated.
    End,
    /// A node connection broke or became uncertain.  The entry was
    /// tombstoned and a slot refresh was triggered.
    ConnectionError {
        /// Canonical `host:port` of the affected node.
        addr: String,
        /// The underlying failure.
        err: RedisError,
    },
    /// An error that had no caller left to receive it, for example from
    /// a fire-style dispatch.
    Error(RedisError),
}

/// Fans events out to every subscriber.  Subscribers whose receiving
/// side has been dropped are pruned on the next publish.
pub(crate) struct EventBus {
    subscribers: Mutex<Vec<Sender<ClusterEvent>>>,
}

impl EventBus {
    pub(crate) fn new() -> EventBus {
        EventBus {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn subscribe(&self) -> Receiver<ClusterEvent> {
        let (tx, rx) = channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    pub(crate) fn publish(&self, event: ClusterEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
