//! Ordered listener lists keyed by a routing selector.
//!
//! Handlers are plain synchronous callbacks. They run on the connection task, in the order the
//! frames arrived, so anything long-running must be handed off (e.g. to `tokio::spawn`).

use std::any::Any;
use std::fmt::{self, Debug};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

/// Values that can be routed to handlers registered for a specific key.
pub trait Routable {
    /// Discriminator compared against [`Selector::Exact`] registrations.
    type Key: PartialEq + Debug + Send + Sync + 'static;

    /// The key this value is routed under.
    fn route_key(&self) -> Self::Key;
}

/// Which values a handler receives.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector<K> {
    /// Only values whose route key equals `K`
    Exact(K),
    /// Every dispatched value
    Wildcard,
}

impl<K> From<K> for Selector<K> {
    fn from(key: K) -> Self {
        Self::Exact(key)
    }
}

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Entry<T: Routable> {
    id: u64,
    selector: Selector<T::Key>,
    handler: Handler<T>,
    active: Arc<AtomicBool>,
}

struct RegistryInner<T: Routable> {
    next_id: AtomicU64,
    entries: RwLock<Vec<Entry<T>>>,
}

impl<T: Routable> RegistryInner<T> {
    fn remove(&self, id: u64) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|entry| entry.id != id);
    }
}

/// Handle returned by every registration.
///
/// Calling [`Unsubscribe::unsubscribe`] removes exactly the registration that produced it;
/// further calls are no-ops. Dropping the handle does *not* remove the handler.
#[must_use = "keep the handle to be able to remove the handler later"]
#[derive(Clone)]
pub struct Unsubscribe {
    id: u64,
    active: Arc<AtomicBool>,
    detach: Arc<dyn Fn(u64) + Send + Sync>,
}

impl Unsubscribe {
    /// Remove the registration. Returns `true` only for the call that actually removed it.
    pub fn unsubscribe(&self) -> bool {
        if self.active.swap(false, Ordering::AcqRel) {
            (self.detach)(self.id);
            true
        } else {
            false
        }
    }

    /// Whether the registration is still live.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

/// Per-key and wildcard handler lists with panic-isolated dispatch.
pub struct SubscriberRegistry<T: Routable> {
    inner: Arc<RegistryInner<T>>,
}

impl<T: Routable + 'static> SubscriberRegistry<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                next_id: AtomicU64::new(0),
                entries: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Register `handler` for values matching `selector`.
    pub fn on<S, F>(&self, selector: S, handler: F) -> Unsubscribe
    where
        S: Into<Selector<T::Key>>,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));

        self.inner
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Entry {
                id,
                selector: selector.into(),
                handler: Arc::new(handler),
                active: Arc::clone(&active),
            });

        let registry: Weak<RegistryInner<T>> = Arc::downgrade(&self.inner);
        Unsubscribe {
            id,
            active,
            detach: Arc::new(move |id| {
                if let Some(registry) = registry.upgrade() {
                    registry.remove(id);
                }
            }),
        }
    }

    /// Invoke every handler registered for the exact route key, then every wildcard handler,
    /// each group in registration order. Returns the number of handlers invoked.
    ///
    /// A panicking handler is logged and skipped; the remaining handlers still run.
    pub fn dispatch(&self, value: &T) -> usize {
        let key = value.route_key();

        let targets: Vec<(Handler<T>, Arc<AtomicBool>)> = {
            let entries = self
                .inner
                .entries
                .read()
                .unwrap_or_else(PoisonError::into_inner);

            let exact = entries
                .iter()
                .filter(|entry| matches!(&entry.selector, Selector::Exact(k) if *k == key));
            let wildcard = entries
                .iter()
                .filter(|entry| matches!(entry.selector, Selector::Wildcard));

            exact
                .chain(wildcard)
                .map(|entry| (Arc::clone(&entry.handler), Arc::clone(&entry.active)))
                .collect()
        };

        let mut invoked = 0;
        for (handler, active) in targets {
            // Removed (or cleared) while an earlier handler of this dispatch was running.
            if !active.load(Ordering::Acquire) {
                continue;
            }

            invoked += 1;
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(value))) {
                let reason = panic_message(panic.as_ref());
                #[cfg(feature = "tracing")]
                tracing::error!(?key, %reason, "Handler panicked during dispatch");
                #[cfg(not(feature = "tracing"))]
                let _ = (&key, reason);
            }
        }

        invoked
    }

    /// Remove every registration at once.
    pub fn clear(&self) {
        let mut entries = self
            .inner
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        for entry in entries.drain(..) {
            entry.active.store(false, Ordering::Release);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Routable + 'static> Default for SubscriberRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Routable> Debug for SubscriberRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self
            .inner
            .entries
            .read()
            .map_or(0, |entries| entries.len());
        f.debug_struct("SubscriberRegistry")
            .field("handlers", &len)
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
