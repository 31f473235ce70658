//! Type-indexed publish/subscribe bus.
//!
//! Components emit events without knowing who handles them and subscribe
//! without knowing who emits them. Dispatch is synchronous on the emitting
//! thread, in subscription order. The handler list for the target type is
//! copied under the read lock and the lock dropped before any handler runs,
//! so handlers may freely subscribe, unsubscribe, or re-emit.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::error;

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type BoxedHandler = Arc<dyn Fn(&dyn Any) + Send + Sync>;

#[derive(Default)]
struct Registry {
    handlers: HashMap<TypeId, Vec<(SubscriptionId, BoxedHandler)>>,
    next_id: u64,
}

/// Thread-safe event bus keyed by concrete event type.
#[derive(Default)]
pub struct EventBus {
    registry: RwLock<Registry>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for events of type `E`.
    ///
    /// Handlers run on whichever thread emits; they must not assume any
    /// particular one.
    pub fn subscribe<E, F>(&self, handler: F) -> SubscriptionId
    where
        E: Any,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut registry = self.write();
        let id = SubscriptionId(registry.next_id);
        registry.next_id += 1;

        let erased: BoxedHandler = Arc::new(move |event: &dyn Any| {
            if let Some(event) = event.downcast_ref::<E>() {
                handler(event);
            }
        });

        registry
            .handlers
            .entry(TypeId::of::<E>())
            .or_default()
            .push((id, erased));
        id
    }

    /// Remove a handler for events of type `E`. Unknown ids are a no-op.
    pub fn unsubscribe<E: Any>(&self, id: SubscriptionId) {
        let mut registry = self.write();
        if let Some(list) = registry.handlers.get_mut(&TypeId::of::<E>()) {
            list.retain(|(entry_id, _)| *entry_id != id);
        }
    }

    /// Deliver `event` to every subscriber of its type, in subscription
    /// order. No subscribers is a no-op. A panicking handler is logged and
    /// the remaining handlers still run.
    pub fn emit<E: Any>(&self, event: E) {
        let handlers: Vec<BoxedHandler> = {
            let registry = self.read();
            match registry.handlers.get(&TypeId::of::<E>()) {
                Some(list) => list.iter().map(|(_, handler)| Arc::clone(handler)).collect(),
                None => return,
            }
        };

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                error!(
                    event_type = std::any::type_name::<E>(),
                    "event handler panicked; continuing with remaining handlers"
                );
            }
        }
    }

    /// Number of handlers registered for events of type `E`.
    #[must_use]
    pub fn subscriber_count<E: Any>(&self) -> usize {
        self.read()
            .handlers
            .get(&TypeId::of::<E>())
            .map_or(0, Vec::len)
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        self.write().handlers.clear();
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Registry> {
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug)]
    struct Ping(u32);
    #[derive(Debug)]
    struct Pong;

    #[test]
    fn delivers_to_matching_type_only() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_clone = Arc::clone(&hits);
        bus.subscribe::<Ping, _>(move |event| {
            assert_eq!(event.0, 7);
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(Ping(7));
        bus.emit(Pong); // no subscribers, no-op
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handlers_run_in_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in 0..3 {
            let order = Arc::clone(&order);
            bus.subscribe::<Ping, _>(move |_| order.lock().unwrap().push(tag));
        }

        bus.emit(Ping(0));
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn unsubscribe_stops_delivery_and_tolerates_unknown_ids() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_clone = Arc::clone(&hits);
        let id = bus.subscribe::<Ping, _>(move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(Ping(0));
        bus.unsubscribe::<Ping>(id);
        bus.unsubscribe::<Ping>(id); // second time is a no-op
        bus.emit(Ping(0));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count::<Ping>(), 0);
    }

    #[test]
    fn panicking_handler_does_not_stop_the_rest() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        bus.subscribe::<Ping, _>(|_| panic!("bad handler"));
        let hits_clone = Arc::clone(&hits);
        bus.subscribe::<Ping, _>(move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(Ping(0));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handler_may_subscribe_during_dispatch() {
        let bus = Arc::new(EventBus::new());
        let hits = Arc::new(AtomicUsize::new(0));

        let bus_clone = Arc::clone(&bus);
        let hits_clone = Arc::clone(&hits);
        bus.subscribe::<Ping, _>(move |_| {
            let hits_inner = Arc::clone(&hits_clone);
            bus_clone.subscribe::<Pong, _>(move |_| {
                hits_inner.fetch_add(1, Ordering::SeqCst);
            });
        });

        bus.emit(Ping(0)); // must not deadlock
        bus.emit(Pong);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reentrant_emission() {
        let bus = Arc::new(EventBus::new());
        let hits = Arc::new(AtomicUsize::new(0));

        let bus_clone = Arc::clone(&bus);
        bus.subscribe::<Ping, _>(move |event| {
            if event.0 > 0 {
                bus_clone.emit(Ping(event.0 - 1));
            }
        });
        let hits_clone = Arc::clone(&hits);
        bus.subscribe::<Ping, _>(move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(Ping(3));
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn clear_removes_everything() {
        let bus = EventBus::new();
        bus.subscribe::<Ping, _>(|_| {});
        bus.subscribe::<Pong, _>(|_| {});
        bus.clear();
        assert_eq!(bus.subscriber_count::<Ping>(), 0);
        assert_eq!(bus.subscriber_count::<Pong>(), 0);
    }

    #[test]
    fn concurrent_emit_and_subscribe() {
        let bus = Arc::new(EventBus::new());
        let hits = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let bus = Arc::clone(&bus);
            let hits = Arc::clone(&hits);
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    if i % 10 == 0 {
                        let hits = Arc::clone(&hits);
                        bus.subscribe::<Ping, _>(move |_| {
                            hits.fetch_add(1, Ordering::SeqCst);
                        });
                    }
                    bus.emit(Ping(i));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(hits.load(Ordering::SeqCst) > 0);
    }
}
