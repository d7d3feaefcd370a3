//! # Event Bus Implementation
//!
//! The EventBus is the single broadcast channel through which host events reach
//! the bridge. The transport layer calls [`EventBus::emit`] whenever the host
//! reports an event; everything else only subscribes.
//!
//! ## Features
//!
//! - **Named Listeners**: callbacks keyed by event name, invoked in registration order
//! - **Global Listeners**: callbacks receiving every event, after the named ones
//! - **Snapshot Dispatch**: an emission iterates over the listeners present when it
//!   started, so (un)subscribing from inside a callback never disturbs it
//! - **Scoped Subscriptions**: [`Subscription`] removes its listener when dropped
//!
//! ## Design Decisions
//!
//! Emission is synchronous. The listener table is a `DashMap` and the shard
//! lock is released before any callback runs, which lets callbacks freely
//! subscribe, unsubscribe or emit again.
//!
//! `EventBus` is a cheap handle: clones share the same listener table. Build one
//! per running client with [`EventBus::new`] and pass it to whoever needs it;
//! [`EventBus::clear`] is the matching teardown.

use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, Weak,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, trace};

use super::event_registry::EventName;

pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;
pub type GlobalListener = Arc<dyn Fn(&str, &Value) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct Entry {
    id: SubscriptionId,
    listener: Listener,
}

struct GlobalEntry {
    id: SubscriptionId,
    listener: GlobalListener,
}

#[derive(Default)]
struct BusInner {
    listeners: DashMap<String, Vec<Entry>>,
    global: Mutex<Vec<GlobalEntry>>,
    next_id: AtomicU64,
}

impl BusInner {
    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn global(&self) -> MutexGuard<'_, Vec<GlobalEntry>> {
        self.global.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, event: &str, id: SubscriptionId, listener: Listener) {
        self.listeners
            .entry(event.to_string())
            .or_default()
            .push(Entry { id, listener });
    }

    fn remove(&self, event: &str, id: SubscriptionId) -> bool {
        let removed = match self.listeners.get_mut(event) {
            Some(mut entries) => {
                let before = entries.len();
                entries.retain(|entry| entry.id != id);
                entries.len() != before
            }
            None => false,
        };
        self.listeners.remove_if(event, |_, entries| entries.is_empty());
        removed
    }

    fn remove_global(&self, id: SubscriptionId) -> bool {
        let mut global = self.global();
        let before = global.len();
        global.retain(|entry| entry.id != id);
        global.len() != before
    }
}

/// # EventBus
///
/// Process-wide publish/subscribe registry keyed by event name.
///
/// ```rust,no_run
/// use serde_json::json;
/// use webview_bridge::event_bus::EventBus;
///
/// let bus = EventBus::new();
/// let subscription = bus.on("invoice_closed", |payload| {
///     println!("invoice closed: {}", payload["status"]);
/// });
/// bus.emit("invoice_closed", &json!({"slug": "abc", "status": "paid"}));
/// subscription.unsubscribe();
/// ```
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Default::default()
    }

    /// Registers `callback` for `event`. The returned [`Subscription`] removes
    /// the listener when dropped or explicitly unsubscribed.
    pub fn on<E, F>(&self, event: E, callback: F) -> Subscription
    where
        E: Into<EventName>,
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let event = event.into().to_string();
        let id = self.inner.next_id();
        self.inner.insert(&event, id, Arc::new(callback));
        trace!("Subscribed {:?} to {}", id, event);
        Subscription::named(&self.inner, event, id)
    }

    /// Like [`EventBus::on`], but the listener is removed before its first
    /// invocation.
    pub fn once<E, F>(&self, event: E, callback: F) -> Subscription
    where
        E: Into<EventName>,
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let event = event.into().to_string();
        let id = self.inner.next_id();
        let fired = AtomicBool::new(false);
        let bus = Arc::downgrade(&self.inner);
        let name = event.clone();
        self.inner.insert(
            &event,
            id,
            Arc::new(move |payload: &Value| {
                if fired.swap(true, Ordering::SeqCst) {
                    return;
                }
                if let Some(bus) = bus.upgrade() {
                    bus.remove(&name, id);
                }
                callback(payload);
            }),
        );
        Subscription::named(&self.inner, event, id)
    }

    /// Removes a listener by id. Removing twice is a no-op returning `false`.
    pub fn off<E: Into<EventName>>(&self, event: E, id: SubscriptionId) -> bool {
        self.inner.remove(event.into().as_str(), id)
    }

    /// Registers a listener for every event. Global listeners run after the
    /// named listeners of each emission.
    pub fn subscribe_all<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        let id = self.inner.next_id();
        self.inner.global().push(GlobalEntry {
            id,
            listener: Arc::new(callback),
        });
        Subscription::global(&self.inner, id)
    }

    /// Delivers `payload` to a snapshot of the current listeners of `event`.
    pub fn emit<E: Into<EventName>>(&self, event: E, payload: &Value) {
        let event = event.into();
        let name = event.as_str();
        debug_event("Emitting", &event, payload);

        let snapshot: Vec<Listener> = self
            .inner
            .listeners
            .get(name)
            .map(|entries| entries.iter().map(|entry| entry.listener.clone()).collect())
            .unwrap_or_default();
        let global: Vec<GlobalListener> = self
            .inner
            .global()
            .iter()
            .map(|entry| entry.listener.clone())
            .collect();

        for listener in snapshot {
            listener(payload);
        }
        for listener in global {
            listener(name, payload);
        }
    }

    pub fn subscriber_count<E: Into<EventName>>(&self, event: E) -> usize {
        self.inner
            .listeners
            .get(event.into().as_str())
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    /// Named plus global listeners.
    pub fn total_subscribers(&self) -> usize {
        let named: usize = self
            .inner
            .listeners
            .iter()
            .map(|entries| entries.len())
            .sum();
        named + self.inner.global().len()
    }

    /// Removes every listener. Outstanding [`Subscription`]s become no-ops.
    pub fn clear(&self) {
        debug!("Clearing event bus");
        self.inner.listeners.clear();
        self.inner.global().clear();
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.total_subscribers())
            .finish()
    }
}

// viewport and theme updates arrive in bursts while the user resizes
fn debug_event(prefix: &str, event: &EventName, payload: &Value) {
    match event {
        EventName::ViewportChanged | EventName::ThemeChanged => {
            trace!("{} Event: {} {}", prefix, event, payload)
        }
        _ => debug!("{} Event: {} {}", prefix, event, payload),
    }
}

/// Handle to a registered listener.
#[must_use = "dropping a Subscription unsubscribes its listener"]
pub struct Subscription {
    bus: Weak<BusInner>,
    event: Option<String>,
    id: SubscriptionId,
    active: AtomicBool,
}

impl Subscription {
    fn named(bus: &Arc<BusInner>, event: String, id: SubscriptionId) -> Self {
        Self {
            bus: Arc::downgrade(bus),
            event: Some(event),
            id,
            active: AtomicBool::new(true),
        }
    }

    fn global(bus: &Arc<BusInner>, id: SubscriptionId) -> Self {
        Self {
            bus: Arc::downgrade(bus),
            event: None,
            id,
            active: AtomicBool::new(true),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// `None` for global subscriptions.
    pub fn event(&self) -> Option<&str> {
        self.event.as_deref()
    }

    /// Removes the listener. Idempotent.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        let Some(bus) = self.bus.upgrade() else {
            return;
        };
        match &self.event {
            Some(event) => {
                bus.remove(event, self.id);
            }
            None => {
                bus.remove_global(self.id);
            }
        }
    }

    /// Keeps the listener registered for the lifetime of the bus.
    pub fn detach(self) -> SubscriptionId {
        self.active.store(false, Ordering::SeqCst);
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("id", &self.id)
            .field("active", &self.active.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Box<dyn Fn(&Value) + Send + Sync>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let make = move |tag: &str| {
            let sink = sink.clone();
            let tag = tag.to_string();
            Box::new(move |_: &Value| sink.lock().unwrap().push(tag.clone()))
                as Box<dyn Fn(&Value) + Send + Sync>
        };
        (log, make)
    }

    #[test]
    fn test_emit_in_registration_order() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let _a = bus.on("invoice_closed", make("a"));
        let _b = bus.on("invoice_closed", make("b"));
        let _c = bus.on("viewport_changed", make("c"));

        bus.emit("invoice_closed", &json!({}));
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_subscribe_unsubscribe_restores_count() {
        let bus = EventBus::new();
        let before = bus.subscriber_count("invoice_closed");
        let sub = bus.on("invoice_closed", |_| {});
        assert_eq!(bus.subscriber_count("invoice_closed"), before + 1);
        sub.unsubscribe();
        sub.unsubscribe();
        assert_eq!(bus.subscriber_count("invoice_closed"), before);
        assert_eq!(bus.total_subscribers(), 0);
    }

    #[test]
    fn test_drop_unsubscribes_and_detach_keeps() {
        let bus = EventBus::new();
        {
            let _sub = bus.on("theme_changed", |_| {});
            assert_eq!(bus.subscriber_count("theme_changed"), 1);
        }
        assert_eq!(bus.subscriber_count("theme_changed"), 0);

        let id = bus.on("theme_changed", |_| {}).detach();
        assert_eq!(bus.subscriber_count("theme_changed"), 1);
        assert!(bus.off("theme_changed", id));
        assert!(!bus.off("theme_changed", id));
        assert_eq!(bus.subscriber_count("theme_changed"), 0);
    }

    #[test]
    fn test_once_fires_a_single_time() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let _sub = bus.once("custom_method_invoked", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit("custom_method_invoked", &json!({}));
        bus.emit("custom_method_invoked", &json!({}));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count("custom_method_invoked"), 0);
    }

    #[test]
    fn test_snapshot_ignores_listeners_added_during_emit() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let late = Arc::new(Mutex::new(Vec::new()));

        let inner_bus = bus.clone();
        let counter = calls.clone();
        let keep = late.clone();
        let _sub = bus.on("invoice_closed", move |_| {
            let counter = counter.clone();
            keep.lock().unwrap().push(inner_bus.on("invoice_closed", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        });

        bus.emit("invoice_closed", &json!({}));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(bus.subscriber_count("invoice_closed"), 2);
    }

    #[test]
    fn test_snapshot_still_calls_listener_removed_during_emit() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let victim: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let slot = victim.clone();
        let _first = bus.on("invoice_closed", move |_| {
            if let Some(sub) = slot.lock().unwrap().take() {
                sub.unsubscribe();
            }
        });
        let counter = calls.clone();
        *victim.lock().unwrap() = Some(bus.on("invoice_closed", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        bus.emit("invoice_closed", &json!({}));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        bus.emit("invoice_closed", &json!({}));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_global_listener_sees_every_event_after_named() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let sink = log.clone();
        let global = bus.subscribe_all(move |name, _| sink.lock().unwrap().push(format!("*{name}")));
        let _named = bus.on("viewport_changed", make("named"));

        bus.emit("viewport_changed", &json!({"height": 100}));
        bus.emit("popup_closed", &json!({}));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["named", "*viewport_changed", "*popup_closed"]
        );

        global.unsubscribe();
        assert_eq!(bus.total_subscribers(), 1);
    }

    #[test]
    fn test_clear_and_stale_subscription() {
        let bus = EventBus::new();
        let sub = bus.on("invoice_closed", |_| {});
        let _global = bus.subscribe_all(|_, _| {});
        bus.clear();
        assert_eq!(bus.total_subscribers(), 0);
        sub.unsubscribe();
        assert_eq!(bus.total_subscribers(), 0);
    }
}
