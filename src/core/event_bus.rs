//! Typed Pub/Sub event bus for stream and player lifecycle notifications.
//!
//! Architecture:
//! - Events are plain structs; the event type is the subscription key
//! - emit() invokes every callback for that type synchronously, on the
//!   emitting task, before returning
//! - Callback order: FIFO (first-subscribed, first-called) within one event type
//!
//! The subscriber list is snapshotted before delivery, so a callback may
//! subscribe or unsubscribe without deadlocking; changes apply to the next emit.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Anything that can travel on the bus.
pub trait Event: Any + Send + Sync {}

impl<T: Any + Send + Sync> Event for T {}

/// Type-erased callback
type Callback = Arc<dyn Fn(&dyn Any) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe a single callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId {
    type_id: TypeId,
    seq: u64,
}

/// Pub/Sub event bus. Cheap to clone; clones share subscribers.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<RwLock<HashMap<TypeId, Vec<(u64, Callback)>>>>,
    next_seq: Arc<AtomicU64>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_types", &self.subscribers.read().map(|s| s.len()).unwrap_or(0))
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events of type E.
    ///
    /// # Example
    /// ```ignore
    /// let id = stream.events().subscribe::<FullLoadEvent, _>(|e| {
    ///     log::info!("all {} frames cached", e.frame_count);
    /// });
    /// stream.events().unsubscribe(id);
    /// ```
    pub fn subscribe<E, F>(&self, callback: F) -> SubscriptionId
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let type_id = TypeId::of::<E>();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let wrapped: Callback = Arc::new(move |any: &dyn Any| {
            if let Some(event) = any.downcast_ref::<E>() {
                callback(event);
            }
        });
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(type_id)
            .or_default()
            .push((seq, wrapped));
        SubscriptionId { type_id, seq }
    }

    /// Remove one subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        let Some(list) = subs.get_mut(&id.type_id) else {
            return false;
        };
        let before = list.len();
        list.retain(|(seq, _)| *seq != id.seq);
        let removed = list.len() != before;
        if list.is_empty() {
            subs.remove(&id.type_id);
        }
        removed
    }

    /// Clear subscribers for type E
    pub fn unsubscribe_all<E: Event>(&self) {
        self.subscribers.write().unwrap_or_else(|e| e.into_inner()).remove(&TypeId::of::<E>());
    }

    /// Clear all subscribers
    pub fn clear(&self) {
        self.subscribers.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Deliver `event` to every subscriber of its type, in subscription order.
    pub fn emit<E: Event>(&self, event: E) {
        let callbacks: Vec<Callback> = {
            let subs = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
            match subs.get(&TypeId::of::<E>()) {
                Some(list) => list.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
                None => return,
            }
        };
        for cb in callbacks {
            cb(&event);
        }
    }

    /// Check if there are subscribers for event type E
    pub fn has_subscribers<E: Event>(&self) -> bool {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&TypeId::of::<E>())
            .map(|v| !v.is_empty())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicI32;

    #[derive(Clone, Debug)]
    struct TestEvent {
        value: i32,
    }

    #[derive(Clone, Debug)]
    struct OtherEvent;

    #[test]
    fn test_subscribe_emit_immediate() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicI32::new(0));
        let c = Arc::clone(&counter);

        bus.subscribe::<TestEvent, _>(move |e| {
            c.fetch_add(e.value, Ordering::SeqCst);
        });

        bus.emit(TestEvent { value: 10 });
        // Callback was invoked immediately
        assert_eq!(counter.load(Ordering::SeqCst), 10);

        bus.emit(TestEvent { value: 5 });
        assert_eq!(counter.load(Ordering::SeqCst), 15);

        // Other types don't reach it
        bus.emit(OtherEvent);
        assert_eq!(counter.load(Ordering::SeqCst), 15);
    }

    #[test]
    fn test_registration_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let log = Arc::clone(&log);
            bus.subscribe::<OtherEvent, _>(move |_| log.lock().unwrap().push(tag));
        }

        bus.emit(OtherEvent);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_unsubscribe_by_id() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicI32::new(0));

        let c1 = Arc::clone(&counter);
        let id = bus.subscribe::<TestEvent, _>(move |e| {
            c1.fetch_add(e.value, Ordering::SeqCst);
        });
        let c2 = Arc::clone(&counter);
        bus.subscribe::<TestEvent, _>(move |e| {
            c2.fetch_add(e.value * 100, Ordering::SeqCst);
        });

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));

        bus.emit(TestEvent { value: 1 });
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_unsubscribe_all() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicI32::new(0));
        let c = Arc::clone(&counter);

        bus.subscribe::<TestEvent, _>(move |e| {
            c.fetch_add(e.value, Ordering::SeqCst);
        });
        assert!(bus.has_subscribers::<TestEvent>());

        bus.unsubscribe_all::<TestEvent>();
        assert!(!bus.has_subscribers::<TestEvent>());

        bus.emit(TestEvent { value: 10 });
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_subscribe_from_callback_does_not_deadlock() {
        let bus = EventBus::new();
        let inner_bus = bus.clone();
        let hits = Arc::new(AtomicI32::new(0));
        let h = Arc::clone(&hits);

        bus.subscribe::<OtherEvent, _>(move |_| {
            let h = Arc::clone(&h);
            inner_bus.subscribe::<TestEvent, _>(move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            });
        });

        bus.emit(OtherEvent);
        bus.emit(TestEvent { value: 0 });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
