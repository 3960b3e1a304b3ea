//! Fan-out of outbound frames to connected browsers
//!
//! Each client owns two queues. The fast queue is bounded and carries
//! control value updates; a full queue drops the frame. The reliable queue
//! is unbounded and carries structural state, which must never be lost.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Capacity of each client's fast queue
pub const FAST_QUEUE_CAPACITY: usize = 64;

pub type ClientId = u64;

struct ClientHandle {
    fast: mpsc::Sender<String>,
    reliable: mpsc::UnboundedSender<String>,
}

/// Receiving ends handed to a connection's writer task
pub struct ClientQueues {
    pub fast: mpsc::Receiver<String>,
    pub reliable: mpsc::UnboundedReceiver<String>,
}

#[derive(Default)]
pub struct ClientHub {
    clients: Mutex<HashMap<ClientId, ClientHandle>>,
    next_id: AtomicU64,
}

impl ClientHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self) -> (ClientId, ClientQueues) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (fast_tx, fast_rx) = mpsc::channel(FAST_QUEUE_CAPACITY);
        let (reliable_tx, reliable_rx) = mpsc::unbounded_channel();

        self.clients.lock().insert(
            id,
            ClientHandle {
                fast: fast_tx,
                reliable: reliable_tx,
            },
        );
        debug!(client = id, "Client registered");

        (
            id,
            ClientQueues {
                fast: fast_rx,
                reliable: reliable_rx,
            },
        )
    }

    pub fn unregister(&self, id: ClientId) {
        if self.clients.lock().remove(&id).is_some() {
            debug!(client = id, "Client unregistered");
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Queue a frame for one client on its reliable queue
    pub fn send_to(&self, id: ClientId, frame: String) -> bool {
        let mut clients = self.clients.lock();
        let delivered = clients
            .get(&id)
            .is_some_and(|c| c.reliable.send(frame).is_ok());
        if !delivered {
            clients.remove(&id);
        }
        delivered
    }

    /// Best-effort broadcast; never waits on a slow client
    pub fn broadcast_fast(&self, frame: &str) {
        self.clients.lock().retain(|id, client| {
            match client.fast.try_send(frame.to_string()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    trace!(client = id, "Client queue full, dropping update");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }

    /// Broadcast that reaches every live client
    pub fn broadcast_reliable(&self, frame: &str) {
        self.clients
            .lock()
            .retain(|_, client| client.reliable.send(frame.to_string()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fast_queue_drops_when_full() {
        let hub = ClientHub::new();
        let (_, mut queues) = hub.register();

        for i in 0..FAST_QUEUE_CAPACITY + 10 {
            hub.broadcast_fast(&format!("v{}", i));
        }

        let mut received = 0;
        while queues.fast.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, FAST_QUEUE_CAPACITY);
        assert_eq!(hub.client_count(), 1);
    }

    #[test]
    fn test_reliable_queue_never_drops() {
        let hub = ClientHub::new();
        let (_, mut queues) = hub.register();

        for i in 0..FAST_QUEUE_CAPACITY * 4 {
            hub.broadcast_reliable(&format!("s{}", i));
        }

        let mut received = 0;
        while queues.reliable.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, FAST_QUEUE_CAPACITY * 4);
    }

    #[test]
    fn test_closed_clients_are_pruned() {
        let hub = ClientHub::new();
        let (_, queues) = hub.register();
        let (keep, mut kept) = hub.register();
        drop(queues);

        hub.broadcast_reliable("state");
        assert_eq!(hub.client_count(), 1);
        assert_eq!(kept.reliable.try_recv().unwrap(), "state");

        assert!(hub.send_to(keep, "hello".into()));
        assert!(!hub.send_to(999, "nobody".into()));
    }
}
