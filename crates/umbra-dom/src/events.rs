//! Document event bus.
//!
//! Mutation observation is an explicit publish/subscribe surface: the
//! document publishes structural and attribute changes, watchers
//! subscribe and classify them. Subscriptions are plain ids so a
//! watcher can detach on pause without dropping the bus.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::document::NodeId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomEvent {
    /// Child list of `parent` changed.
    ChildrenChanged {
        parent: NodeId,
        added: Vec<NodeId>,
        removed: Vec<NodeId>,
    },
    /// One attribute of `node` changed or was removed.
    AttributeChanged {
        node: NodeId,
        name: String,
        old_value: Option<String>,
        new_value: Option<String>,
    },
    /// Text content of `node` changed.
    TextChanged { node: NodeId },
    /// A shadow root was attached to `host`.
    ShadowAttached { host: NodeId },
    /// A custom element name became defined.
    CustomElementDefined { name: String },
}

type Listener = Rc<dyn Fn(&DomEvent)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct BusInner {
    listeners: RefCell<HashMap<SubscriptionId, Listener>>,
    next_id: RefCell<u64>,
}

#[derive(Clone, Default)]
pub struct EventBus {
    inner: Rc<BusInner>,
}

impl EventBus {
    pub fn new() -> EventBus {
        EventBus::default()
    }

    pub fn subscribe(&self, listener: impl Fn(&DomEvent) + 'static) -> SubscriptionId {
        let mut next = self.inner.next_id.borrow_mut();
        let id = SubscriptionId(*next);
        *next += 1;
        self.inner
            .listeners
            .borrow_mut()
            .insert(id, Rc::new(listener));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.listeners.borrow_mut().remove(&id);
    }

    pub fn publish(&self, event: &DomEvent) {
        // Listeners may subscribe or unsubscribe while handling an
        // event, so the set is snapshotted first.
        let listeners: Vec<Listener> = self.inner.listeners.borrow().values().cloned().collect();
        for listener in listeners {
            listener(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_subscribe_and_publish() {
        let bus = EventBus::new();
        let seen = Rc::new(Cell::new(0));
        let s = Rc::clone(&seen);
        bus.subscribe(move |event| {
            if matches!(event, DomEvent::CustomElementDefined { .. }) {
                s.set(s.get() + 1);
            }
        });
        bus.publish(&DomEvent::CustomElementDefined { name: "x-a".into() });
        bus.publish(&DomEvent::ShadowAttached { host: NodeId(1) });
        assert_eq!(seen.get(), 1);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let seen = Rc::new(Cell::new(0));
        let s = Rc::clone(&seen);
        let id = bus.subscribe(move |_| s.set(s.get() + 1));
        bus.publish(&DomEvent::CustomElementDefined { name: "x-a".into() });
        bus.unsubscribe(id);
        bus.publish(&DomEvent::CustomElementDefined { name: "x-a".into() });
        assert_eq!(seen.get(), 1);
    }

    #[test]
    fn test_listener_may_unsubscribe_during_publish() {
        let bus = EventBus::new();
        let seen = Rc::new(Cell::new(0));
        let s = Rc::clone(&seen);
        let bus_handle = bus.clone();
        let id = Rc::new(Cell::new(None));
        let id_handle = Rc::clone(&id);
        let sub = bus.subscribe(move |_| {
            s.set(s.get() + 1);
            if let Some(own) = id_handle.get() {
                bus_handle.unsubscribe(own);
            }
        });
        id.set(Some(sub));
        bus.publish(&DomEvent::ShadowAttached { host: NodeId(0) });
        bus.publish(&DomEvent::ShadowAttached { host: NodeId(0) });
        assert_eq!(seen.get(), 1);
    }
}
