//! Event infrastructure for collab-core.
//!
//! `EventBus<T>` is the handler registry behind every notification in the
//! crate: editor change notifications, remote-change notifications on the
//! document channel, and the `SessionEvent` stream used for monitoring.
//!
//! A session runs on one logical thread, so the bus is `Rc`/`RefCell` based.

use crate::session::SessionState;
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// Events emitted by a session for real-time monitoring.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    /// The session moved between synchronization states.
    StateChanged {
        #[serde(rename = "documentId")]
        document_id: String,
        from: SessionState,
        to: SessionState,
        /// Milliseconds since Unix epoch.
        timestamp: f64,
    },
    /// A user edit was transmitted.
    ChangeSent {
        #[serde(rename = "documentId")]
        document_id: String,
        /// Number of ops in the delta.
        ops: usize,
        timestamp: f64,
    },
    /// A remote change was applied to the local replica.
    ChangeApplied {
        #[serde(rename = "documentId")]
        document_id: String,
        ops: usize,
        timestamp: f64,
    },
    /// A remote change could not be applied and was dropped.
    ChangeRejected {
        #[serde(rename = "documentId")]
        document_id: String,
        reason: String,
        timestamp: f64,
    },
    /// Full content was sent for persistence.
    SaveRequested {
        #[serde(rename = "documentId")]
        document_id: String,
        /// Document length in characters.
        length: usize,
        timestamp: f64,
    },
    /// The connection to the coordination endpoint dropped.
    ChannelLost {
        #[serde(rename = "documentId")]
        document_id: String,
        timestamp: f64,
    },
}

/// Current time in milliseconds since Unix epoch.
pub fn now_ms() -> f64 {
    web_time::SystemTime::now()
        .duration_since(web_time::UNIX_EPOCH)
        .map(|d| d.as_millis() as f64)
        .unwrap_or(0.0)
}

trait Unsubscribe {
    fn unsubscribe(&self, id: usize);
}

/// Subscription handle that unsubscribes automatically when dropped.
///
/// Follows the disposer pattern: hold this value to keep receiving events,
/// drop it (or let it go out of scope) to unsubscribe.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    bus: Weak<dyn Unsubscribe>,
    id: usize,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Event bus for publishing events to subscribers.
///
/// Wrap in `Rc` to enable subscriptions.
pub struct EventBus<T = SessionEvent> {
    callbacks: RefCell<Vec<(usize, Rc<dyn Fn(&T)>)>>,
    next_id: Cell<usize>,
}

impl<T> Default for EventBus<T> {
    fn default() -> Self {
        Self {
            callbacks: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }
}

impl<T: 'static> EventBus<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events. Returns `Subscription` that unsubscribes on drop.
    pub fn subscribe(self: &Rc<Self>, callback: impl Fn(&T) + 'static) -> Subscription {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.callbacks.borrow_mut().push((id, Rc::new(callback)));
        let bus: Rc<dyn Unsubscribe> = self.clone();
        Subscription {
            bus: Rc::downgrade(&bus),
            id,
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: &T) {
        // Clone the callback list so a callback may subscribe or unsubscribe.
        let callbacks: Vec<_> = self
            .callbacks
            .borrow()
            .iter()
            .map(|(_, cb)| Rc::clone(cb))
            .collect();

        for callback in callbacks {
            callback(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.callbacks.borrow().len()
    }

    /// Drop every subscriber at once.
    pub fn clear(&self) {
        self.callbacks.borrow_mut().clear();
    }
}

impl<T> Unsubscribe for EventBus<T> {
    fn unsubscribe(&self, id: usize) {
        self.callbacks.borrow_mut().retain(|(i, _)| *i != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> SessionEvent {
        SessionEvent::ChangeSent {
            document_id: "doc-1".into(),
            ops: 2,
            timestamp: 1000.0,
        }
    }

    #[test]
    fn test_subscribe_and_emit() {
        let bus = Rc::new(EventBus::new());
        let count = Rc::new(Cell::new(0));
        let count_clone = Rc::clone(&count);

        let _sub = bus.subscribe(move |_event: &SessionEvent| {
            count_clone.set(count_clone.get() + 1);
        });

        bus.emit(&sample_event());

        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_subscription_unsubscribes_on_drop() {
        let bus = Rc::new(EventBus::new());
        let count = Rc::new(Cell::new(0));
        let count_clone = Rc::clone(&count);

        {
            let _sub = bus.subscribe(move |_event: &SessionEvent| {
                count_clone.set(count_clone.get() + 1);
            });
            bus.emit(&sample_event());
            assert_eq!(count.get(), 1);
        }

        bus.emit(&sample_event());
        assert_eq!(count.get(), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_partial_unsubscribe() {
        let bus: Rc<EventBus<u32>> = Rc::new(EventBus::new());
        let seen1 = Rc::new(RefCell::new(Vec::new()));
        let seen2 = Rc::new(RefCell::new(Vec::new()));

        let seen1_clone = Rc::clone(&seen1);
        let seen2_clone = Rc::clone(&seen2);
        let sub1 = bus.subscribe(move |v| seen1_clone.borrow_mut().push(*v));
        let _sub2 = bus.subscribe(move |v| seen2_clone.borrow_mut().push(*v));

        bus.emit(&1);
        drop(sub1);
        bus.emit(&2);

        assert_eq!(*seen1.borrow(), vec![1]);
        assert_eq!(*seen2.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_subscribe_during_emit() {
        let bus: Rc<EventBus<u32>> = Rc::new(EventBus::new());
        let late = Rc::new(RefCell::new(None));

        let bus_clone = Rc::clone(&bus);
        let late_clone = Rc::clone(&late);
        let _sub = bus.subscribe(move |_| {
            if late_clone.borrow().is_none() {
                *late_clone.borrow_mut() = Some(bus_clone.subscribe(|_| {}));
            }
        });

        bus.emit(&1);
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn test_clear_and_drop_after_clear() {
        let bus: Rc<EventBus<u32>> = Rc::new(EventBus::new());
        let sub = bus.subscribe(|_| {});
        bus.clear();
        assert_eq!(bus.subscriber_count(), 0);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_subscription_outlives_bus() {
        let bus: Rc<EventBus<u32>> = Rc::new(EventBus::new());
        let sub = bus.subscribe(|_| {});
        drop(bus);
        drop(sub);
    }

    #[test]
    fn test_session_event_serialization() {
        let event = SessionEvent::StateChanged {
            document_id: "doc-42".into(),
            from: SessionState::AwaitingLoad,
            to: SessionState::Live,
            timestamp: 1234567890.0,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"stateChanged\""));
        assert!(json.contains("\"documentId\":\"doc-42\""));
        assert!(json.contains("\"from\":\"awaitingLoad\""));
        assert!(json.contains("\"to\":\"live\""));
    }
}
