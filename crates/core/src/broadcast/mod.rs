use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::{compositor::Frame, session::LiveStatus, PiLitesError, Result};

/// Everything a session sends to its observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Frame(Frame),
    Status(LiveStatus),
    Done,
    Error { message: String },
}

impl Message {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A connected consumer of serialized messages, e.g. a websocket.
pub trait Observer: Send + Sync {
    /// Delivers one JSON message. An error marks the observer unreachable.
    fn deliver(&self, text: &str) -> Result<()>;
}

/// A full queue counts as unreachable: an observer that stopped reading is
/// pruned instead of buffering frames forever.
impl Observer for mpsc::Sender<String> {
    fn deliver(&self, text: &str) -> Result<()> {
        self.try_send(text.to_owned()).map_err(|err| match err {
            TrySendError::Full(_) => PiLitesError::Delivery("observer is not keeping up".into()),
            TrySendError::Closed(_) => PiLitesError::Delivery("observer channel closed".into()),
        })
    }
}

pub type ObserverId = u64;

/// Messages an in-process subscriber may fall behind by, a few seconds of
/// frames at typical rates.
pub const SUBSCRIPTION_CAPACITY: usize = 256;

/// Receiving end of [`Broadcaster::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    pub id: ObserverId,
    receiver: mpsc::Receiver<String>,
}

impl Subscription {
    /// Next raw JSON message, or `None` once the broadcaster dropped us.
    pub async fn recv_text(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    /// Next decoded message. Undecodable payloads are skipped.
    pub async fn recv(&mut self) -> Option<Message> {
        loop {
            let text = self.receiver.recv().await?;
            match serde_json::from_str(&text) {
                Ok(message) => return Some(message),
                Err(err) => warn!(%err, "skipping undecodable message"),
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<Message> {
        loop {
            let text = self.receiver.try_recv().ok()?;
            if let Ok(message) = serde_json::from_str(&text) {
                return Some(message);
            }
        }
    }
}

/// Fan-out of messages to the currently connected observers.
///
/// Safe to share between a session task and connection handlers. Delivery
/// happens outside the lock; an observer that fails is removed and the rest
/// still receive the message.
pub struct Broadcaster {
    name: &'static str,
    observers: Mutex<HashMap<ObserverId, Arc<dyn Observer>>>,
    next_id: AtomicU64,
}

impl Broadcaster {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            observers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn connect(&self, observer: Arc<dyn Observer>) -> Result<ObserverId> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock()?.insert(id, observer);
        debug!(broadcaster = self.name, id, "observer connected");
        Ok(id)
    }

    /// Connects an in-process channel observer.
    pub fn subscribe(&self) -> Result<Subscription> {
        self.subscribe_with_capacity(SUBSCRIPTION_CAPACITY)
    }

    pub fn subscribe_with_capacity(&self, capacity: usize) -> Result<Subscription> {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let id = self.connect(Arc::new(sender))?;
        Ok(Subscription { id, receiver })
    }

    /// Returns whether the observer was connected.
    pub fn disconnect(&self, id: ObserverId) -> Result<bool> {
        Ok(self.lock()?.remove(&id).is_some())
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    /// Sends `message` to every observer and returns how many received it.
    pub fn broadcast(&self, message: &Message) -> Result<usize> {
        let text = message.to_json()?;
        let snapshot: Vec<(ObserverId, Arc<dyn Observer>)> = self
            .lock()?
            .iter()
            .map(|(id, observer)| (*id, Arc::clone(observer)))
            .collect();

        let mut dead = Vec::new();
        for (id, observer) in &snapshot {
            if let Err(err) = observer.deliver(&text) {
                warn!(broadcaster = self.name, id, %err, "dropping unreachable observer");
                dead.push(*id);
            }
        }

        if !dead.is_empty() {
            let mut observers = self.lock()?;
            for id in &dead {
                observers.remove(id);
            }
        }
        Ok(snapshot.len() - dead.len())
    }

    /// Sends to one observer only, pruning it on failure.
    pub fn send_to(&self, id: ObserverId, message: &Message) -> Result<()> {
        let Some(observer) = self.lock()?.get(&id).cloned() else {
            return Err(PiLitesError::NotFound(format!("observer {id}")));
        };
        let result = observer.deliver(&message.to_json()?);
        if result.is_err() {
            self.disconnect(id)?;
        }
        result
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<ObserverId, Arc<dyn Observer>>>> {
        self.observers
            .lock()
            .map_err(|_| PiLitesError::msg("observer set has been poisoned"))
    }
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("name", &self.name)
            .field("observers", &self.count().unwrap_or_default())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::Rgb;

    struct Unreachable;

    impl Observer for Unreachable {
        fn deliver(&self, _text: &str) -> Result<()> {
            Err(PiLitesError::Delivery("socket closed".into()))
        }
    }

    #[test]
    fn messages_use_type_tags() {
        let done = serde_json::to_value(Message::Done).unwrap();
        assert_eq!(done, serde_json::json!({"type": "done"}));

        let error = serde_json::to_value(Message::error("boom")).unwrap();
        assert_eq!(error, serde_json::json!({"type": "error", "message": "boom"}));

        let frame = Message::Frame(Frame {
            timestamp: 12.5,
            channels: BTreeMap::from([("ch-1".to_string(), vec![Rgb::WHITE, Rgb::BLACK])]),
        });
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"type": "frame", "timestamp": 12.5, "channels": {"ch-1": ["#ffffff", "#000000"]}})
        );
        let back: Message = serde_json::from_value(value).unwrap();
        assert_eq!(back, frame);
    }

    #[tokio::test]
    async fn fans_out_to_every_subscriber() {
        let broadcaster = Broadcaster::new("test");
        let mut a = broadcaster.subscribe().unwrap();
        let mut b = broadcaster.subscribe().unwrap();

        assert_eq!(broadcaster.broadcast(&Message::Done).unwrap(), 2);
        assert_eq!(a.recv().await, Some(Message::Done));
        assert_eq!(b.recv().await, Some(Message::Done));
    }

    #[tokio::test]
    async fn prunes_unreachable_observers() {
        let broadcaster = Broadcaster::new("test");
        let mut live = vec![broadcaster.subscribe().unwrap(), broadcaster.subscribe().unwrap()];
        broadcaster.connect(Arc::new(Unreachable)).unwrap();
        let dropped = broadcaster.subscribe().unwrap();
        drop(dropped);
        assert_eq!(broadcaster.count().unwrap(), 4);

        let delivered = broadcaster.broadcast(&Message::error("x")).unwrap();
        assert_eq!(delivered, 2);
        assert_eq!(broadcaster.count().unwrap(), 2);
        for sub in &mut live {
            assert_eq!(sub.recv().await, Some(Message::error("x")));
        }
    }

    #[test]
    fn stalled_subscriber_is_pruned_when_its_queue_fills() {
        let broadcaster = Broadcaster::new("test");
        let mut stalled = broadcaster.subscribe_with_capacity(2).unwrap();
        let mut reader = broadcaster.subscribe().unwrap();

        assert_eq!(broadcaster.broadcast(&Message::Done).unwrap(), 2);
        assert_eq!(broadcaster.broadcast(&Message::Done).unwrap(), 2);
        assert_eq!(broadcaster.broadcast(&Message::Done).unwrap(), 1);
        assert_eq!(broadcaster.count().unwrap(), 1);

        assert_eq!(stalled.try_recv(), Some(Message::Done));
        assert_eq!(stalled.try_recv(), Some(Message::Done));
        for _ in 0..3 {
            assert_eq!(reader.try_recv(), Some(Message::Done));
        }
    }

    #[test]
    fn disconnect_removes_once() {
        let broadcaster = Broadcaster::new("test");
        let sub = broadcaster.subscribe().unwrap();
        assert!(broadcaster.disconnect(sub.id).unwrap());
        assert!(!broadcaster.disconnect(sub.id).unwrap());
        assert_eq!(broadcaster.broadcast(&Message::Done).unwrap(), 0);
    }

    #[test]
    fn send_to_targets_a_single_observer() {
        let broadcaster = Broadcaster::new("test");
        let mut a = broadcaster.subscribe().unwrap();
        let mut b = broadcaster.subscribe().unwrap();
        broadcaster.send_to(a.id, &Message::Done).unwrap();

        assert_eq!(a.try_recv(), Some(Message::Done));
        assert_eq!(b.try_recv(), None);
        assert!(broadcaster.send_to(999, &Message::Done).is_err());
    }

    #[test]
    fn concurrent_connects_and_broadcasts() {
        let broadcaster = Arc::new(Broadcaster::new("test"));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let broadcaster = Arc::clone(&broadcaster);
                std::thread::spawn(move || {
                    let sub = broadcaster.subscribe().unwrap();
                    broadcaster.broadcast(&Message::Done).unwrap();
                    broadcaster.disconnect(sub.id).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(broadcaster.count().unwrap(), 0);
    }
}
