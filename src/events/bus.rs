//! Synchronous, in-process publish/subscribe hub.

use std::cell::Cell;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};
use tokio::sync::mpsc;

use super::types::{BusEvent, Topic};

type Callback = Box<dyn Fn(&BusEvent) + Send + Sync>;

thread_local! {
    /// Callbacks currently running on this thread.
    static DISPATCH_DEPTH: Cell<usize> = const { Cell::new(0) };
}

struct Subscriber {
    id: u64,
    topic: Topic,
    active: AtomicBool,
    /// Held for the duration of each invocation. Re-entrant so a callback
    /// may publish again on its own topic.
    gate: ReentrantMutex<()>,
    callback: Callback,
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    topics: Mutex<HashMap<Topic, Vec<Arc<Subscriber>>>>,
}

/// Typed event bus shared by the watcher, the configuration store and
/// any transport that forwards events to clients.
///
/// Delivery is synchronous and follows registration order per topic.
/// Nothing is buffered: subscribers only see events published while they
/// are registered.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `topic`.
    ///
    /// Callbacks run on the publishing thread and must not block; hand long
    /// work to another task.
    pub fn subscribe<F>(&self, topic: Topic, callback: F) -> Subscription
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let subscriber = Arc::new(Subscriber {
            id,
            topic,
            active: AtomicBool::new(true),
            gate: ReentrantMutex::new(()),
            callback: Box::new(callback),
        });

        self.inner
            .topics
            .lock()
            .entry(topic)
            .or_default()
            .push(subscriber.clone());

        crate::debug_event!("bus", "subscribed", "#{id} to {topic}");

        Subscription {
            subscriber,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Subscribe and receive events through an unbounded channel.
    ///
    /// Convenient for async consumers; the channel closes once the
    /// subscription is cancelled and the bus drops the sender.
    pub fn subscribe_channel(&self, topic: Topic) -> (Subscription, mpsc::UnboundedReceiver<BusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(topic, move |event| {
            let _ = tx.send(event.clone());
        });
        (subscription, rx)
    }

    /// Deliver `event` to every current subscriber of its topic.
    ///
    /// Returns the number of callbacks that completed. A panicking callback
    /// is logged and does not stop delivery to the others.
    pub fn publish(&self, event: BusEvent) -> usize {
        let topic = event.topic();
        let subscribers: Vec<Arc<Subscriber>> = self
            .inner
            .topics
            .lock()
            .get(&topic)
            .cloned()
            .unwrap_or_default();

        let mut delivered = 0;
        for subscriber in subscribers {
            let _gate = subscriber.gate.lock();
            if !subscriber.active.load(Ordering::Acquire) {
                continue;
            }

            DISPATCH_DEPTH.with(|depth| depth.set(depth.get() + 1));
            let outcome = catch_unwind(AssertUnwindSafe(|| (subscriber.callback)(&event)));
            DISPATCH_DEPTH.with(|depth| depth.set(depth.get() - 1));

            match outcome {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    tracing::error!(
                        "[bus] subscriber #{} panicked on {topic}: {}",
                        subscriber.id,
                        panic_message(panic.as_ref())
                    );
                }
            }
        }

        crate::debug_event!("bus", "published", "{topic} to {delivered} subscribers");
        delivered
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.inner
            .topics
            .lock()
            .get(&topic)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Handle for one registered callback.
///
/// Dropping the handle keeps the callback registered; call
/// [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    subscriber: Arc<Subscriber>,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn topic(&self) -> Topic {
        self.subscriber.topic
    }

    pub fn is_active(&self) -> bool {
        self.subscriber.active.load(Ordering::Acquire)
    }

    /// Stop delivery to this callback. Idempotent.
    ///
    /// No invocation starts after this returns. Called outside any bus
    /// callback, it also waits for an invocation already running on another
    /// thread to finish. Called from inside a callback it does not wait,
    /// since two callbacks unsubscribing each other would deadlock.
    pub fn unsubscribe(&self) {
        if !self.subscriber.active.swap(false, Ordering::AcqRel) {
            return;
        }

        if let Some(bus) = self.bus.upgrade() {
            let mut topics = bus.topics.lock();
            if let Some(list) = topics.get_mut(&self.subscriber.topic) {
                list.retain(|s| s.id != self.subscriber.id);
            }
        }

        if DISPATCH_DEPTH.with(Cell::get) == 0 {
            drop(self.subscriber.gate.lock());
        }

        crate::debug_event!(
            "bus",
            "unsubscribed",
            "#{} from {}",
            self.subscriber.id,
            self.subscriber.topic
        );
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.subscriber.id)
            .field("topic", &self.subscriber.topic)
            .field("active", &self.is_active())
            .finish()
    }
}
