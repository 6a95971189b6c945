use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// Something that wants to hear about query state changes.
///
/// The query calls [`notify`](Subscriber::notify) once per state change. The
/// subscriber reads the new state itself.
///
/// Any `Fn()` closure is a subscriber:
///
/// ```
/// use std::sync::Arc;
/// use querent::Subscriber;
///
/// let subscriber: Arc<dyn Subscriber> = Arc::new(|| println!("changed"));
/// subscriber.notify();
/// ```
pub trait Subscriber: Send + Sync {
    fn notify(&self);
}

impl<F> Subscriber for F
where
    F: Fn() + Send + Sync,
{
    fn notify(&self) {
        self();
    }
}

/// Identity of one registration. Never reused within a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// The set of targets registered with one query.
#[derive(Default)]
pub(crate) struct Subscribers {
    next_id: AtomicU64,
    entries: Mutex<Vec<(SubscriberId, Arc<dyn Subscriber>)>>,
}

impl Subscribers {
    pub(crate) fn insert(self: &Arc<Self>, subscriber: Arc<dyn Subscriber>) -> Unsubscribe {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().push((id, subscriber));
        Unsubscribe {
            subscribers: Arc::downgrade(self),
            id,
        }
    }

    fn remove(&self, id: SubscriberId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Calls every subscriber registered at this moment, exactly once.
    ///
    /// The list is copied first so callbacks may subscribe or unsubscribe.
    pub(crate) fn notify_all(&self) {
        let targets: Vec<_> = self
            .entries
            .lock()
            .iter()
            .map(|(_, subscriber)| Arc::clone(subscriber))
            .collect();
        for target in targets {
            target.notify();
        }
    }
}

impl fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribers")
            .field("len", &self.len())
            .finish()
    }
}

/// Handle returned by a subscription; detaches exactly that registration.
#[must_use = "keep the handle to unsubscribe later"]
pub struct Unsubscribe {
    subscribers: Weak<Subscribers>,
    id: SubscriberId,
}

impl Unsubscribe {
    /// Removes the registration. Later calls do nothing.
    pub fn unsubscribe(&self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers.remove(self.id);
        }
    }

    #[must_use]
    pub const fn id(&self) -> SubscriberId {
        self.id
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, Arc<dyn Subscriber>) {
        let count = Arc::new(AtomicUsize::new(0));
        let target: Arc<dyn Subscriber> = {
            let count = Arc::clone(&count);
            Arc::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        (count, target)
    }

    #[test]
    fn test_notify_all_reaches_every_subscriber_once() {
        let subscribers = Arc::new(Subscribers::default());
        let (a, target_a) = counter();
        let (b, target_b) = counter();
        let _ua = subscribers.insert(target_a);
        let _ub = subscribers.insert(target_b);

        subscribers.notify_all();

        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_removes_only_its_target() {
        let subscribers = Arc::new(Subscribers::default());
        let (a, target_a) = counter();
        let (b, target_b) = counter();
        let ua = subscribers.insert(target_a);
        let _ub = subscribers.insert(target_b);

        ua.unsubscribe();
        subscribers.notify_all();

        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 1);
        assert_eq!(subscribers.len(), 1);
    }

    #[test]
    fn test_unsubscribe_twice_is_noop() {
        let subscribers = Arc::new(Subscribers::default());
        let (_, target) = counter();
        let handle = subscribers.insert(target);

        handle.unsubscribe();
        handle.unsubscribe();
        assert_eq!(subscribers.len(), 0);
    }

    #[test]
    fn test_same_target_registered_twice_gets_distinct_ids() {
        let subscribers = Arc::new(Subscribers::default());
        let (count, target) = counter();
        let first = subscribers.insert(Arc::clone(&target));
        let second = subscribers.insert(target);
        assert_ne!(first.id(), second.id());

        first.unsubscribe();
        subscribers.notify_all();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_after_owner_dropped() {
        let subscribers = Arc::new(Subscribers::default());
        let (_, target) = counter();
        let handle = subscribers.insert(target);
        drop(subscribers);

        handle.unsubscribe();
    }

    #[test]
    fn test_callback_may_unsubscribe_during_notify() {
        let subscribers = Arc::new(Subscribers::default());
        let slot: Arc<Mutex<Option<Unsubscribe>>> = Arc::new(Mutex::new(None));
        let handle = {
            let slot = Arc::clone(&slot);
            subscribers.insert(Arc::new(move || {
                if let Some(handle) = slot.lock().take() {
                    handle.unsubscribe();
                }
            }))
        };
        *slot.lock() = Some(handle);

        subscribers.notify_all();
        assert_eq!(subscribers.len(), 0);
    }
}
