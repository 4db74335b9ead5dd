//! Events delivered to the consumer
//!
//! Sessions push events into an [`EventSink`]. The [`EventHub`] sink fans
//! them out to any number of [`Subscription`]s, each optionally restricted to
//! one device. Events of one session arrive in the order they were produced.

use std::sync::mpsc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::device::DeviceId;

/// Notification emitted outside of any pending call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialEvent {
    /// Bytes arrived on an open session
    ReceivedData {
        /// Source device
        device_id: DeviceId,
        /// Payload decoded as UTF-8 (invalid sequences replaced)
        data: String,
        /// Raw payload
        bytes: Vec<u8>,
    },
    /// The read loop of a session hit an I/O error and stopped
    Error {
        /// Source device
        device_id: DeviceId,
        /// Error description
        message: String,
    },
    /// The host answered a permission request
    PermissionResult {
        /// Device the request was for
        device_id: DeviceId,
        /// Whether access was granted
        granted: bool,
    },
}

impl SerialEvent {
    /// Build a data event from raw bytes
    pub fn received(device_id: DeviceId, bytes: &[u8]) -> Self {
        SerialEvent::ReceivedData {
            device_id,
            data: String::from_utf8_lossy(bytes).into_owned(),
            bytes: bytes.to_vec(),
        }
    }

    /// Bridge event name
    pub fn name(&self) -> &'static str {
        match self {
            SerialEvent::ReceivedData { .. } => "onReceivedData",
            SerialEvent::Error { .. } => "onError",
            SerialEvent::PermissionResult { .. } => "onPermissionResult",
        }
    }

    /// Device the event belongs to
    pub fn device_id(&self) -> DeviceId {
        match self {
            SerialEvent::ReceivedData { device_id, .. }
            | SerialEvent::Error { device_id, .. }
            | SerialEvent::PermissionResult { device_id, .. } => *device_id,
        }
    }
}

/// Ordered delivery channel for events
pub trait EventSink: Send + Sync {
    /// Deliver one event; must not block for long
    fn emit(&self, event: SerialEvent);
}

struct Subscriber {
    filter: Option<DeviceId>,
    tx: mpsc::Sender<SerialEvent>,
}

/// Fan-out event sink
#[derive(Default)]
pub struct EventHub {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl EventHub {
    /// Create a hub with no subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive the events of every device
    pub fn subscribe(&self) -> Subscription {
        self.add(None)
    }

    /// Receive only the events of `device_id`
    pub fn subscribe_device(&self, device_id: DeviceId) -> Subscription {
        self.add(Some(device_id))
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    fn add(&self, filter: Option<DeviceId>) -> Subscription {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().push(Subscriber { filter, tx });
        Subscription { rx }
    }
}

impl EventSink for EventHub {
    fn emit(&self, event: SerialEvent) {
        let device_id = event.device_id();
        let mut subscribers = self.subscribers.lock();
        // Dropped subscriptions are pruned on the next delivery attempt
        subscribers.retain(|sub| match sub.filter {
            Some(filter) if filter != device_id => true,
            _ => sub.tx.send(event.clone()).is_ok(),
        });
    }
}

/// Receiving end of an [`EventHub`] subscription
///
/// Dropping it unsubscribes.
pub struct Subscription {
    rx: mpsc::Receiver<SerialEvent>,
}

impl Subscription {
    /// Block until the next event
    ///
    /// Returns `None` once the hub is gone.
    pub fn recv(&self) -> Option<SerialEvent> {
        self.rx.recv().ok()
    }

    /// Wait at most `timeout` for the next event
    pub fn recv_timeout(&self, timeout: Duration) -> Option<SerialEvent> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Next event if one is already queued
    pub fn try_recv(&self) -> Option<SerialEvent> {
        self.rx.try_recv().ok()
    }

    /// Drain everything queued right now
    pub fn drain(&self) -> Vec<SerialEvent> {
        self.rx.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_received_decodes_utf8() {
        let event = SerialEvent::received(DeviceId(1), &[0x68, 0x69]);
        match event {
            SerialEvent::ReceivedData { data, bytes, .. } => {
                assert_eq!(data, "hi");
                assert_eq!(bytes, vec![0x68, 0x69]);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_received_replaces_invalid_utf8() {
        let event = SerialEvent::received(DeviceId(1), &[0x61, 0xff]);
        match event {
            SerialEvent::ReceivedData { data, .. } => assert_eq!(data, "a\u{fffd}"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_hub_filters_by_device() {
        let hub = EventHub::new();
        let all = hub.subscribe();
        let only_two = hub.subscribe_device(DeviceId(2));

        hub.emit(SerialEvent::received(DeviceId(1), b"a"));
        hub.emit(SerialEvent::received(DeviceId(2), b"b"));

        assert_eq!(all.drain().len(), 2);
        let filtered = only_two.drain();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].device_id(), DeviceId(2));
    }

    #[test]
    fn test_hub_preserves_order() {
        let hub = EventHub::new();
        let sub = hub.subscribe();
        for i in 0..10u8 {
            hub.emit(SerialEvent::received(DeviceId(1), &[b'0' + i]));
        }
        let data: String = sub
            .drain()
            .into_iter()
            .map(|e| match e {
                SerialEvent::ReceivedData { data, .. } => data,
                _ => String::new(),
            })
            .collect();
        assert_eq!(data, "0123456789");
    }

    #[test]
    fn test_dropped_subscription_is_pruned() {
        let hub = EventHub::new();
        let sub = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);
        drop(sub);
        hub.emit(SerialEvent::Error {
            device_id: DeviceId(1),
            message: "gone".into(),
        });
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn test_event_names() {
        let event = SerialEvent::PermissionResult {
            device_id: DeviceId(5),
            granted: true,
        };
        assert_eq!(event.name(), "onPermissionResult");
        assert_eq!(event.device_id(), DeviceId(5));
    }
}
