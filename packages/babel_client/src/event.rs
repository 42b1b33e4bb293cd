//! Typed publish/subscribe where publishing waits for every observer.
//!
//! Unlike a broadcast channel, [`Event::fire`] runs observers one after the
//! other and returns only once the last one has finished, so a publisher that
//! awaits `fire` never has two values in flight at once.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::trace;

type Observer<T> = Arc<dyn Fn(T) -> BoxFuture<'static, ()> + Send + Sync>;

/// Handle returned by [`Event::add_observer`], used to remove the observer again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

pub struct Event<T> {
    name: &'static str,
    next_id: AtomicU64,
    observers: RwLock<Vec<(ObserverId, Observer<T>)>>,
}

impl<T> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("observers", &self.observer_count())
            .finish()
    }
}

impl<T: Clone + Send + 'static> Event<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            next_id: AtomicU64::new(1),
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn add_observer<F, Fut>(&self, observer: F) -> ObserverId
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let observer: Observer<T> = Arc::new(move |value| observer(value).boxed());
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, observer));
        id
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let mut observers = self
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    /// Deliver `value` to every observer in registration order, awaiting each.
    ///
    /// Observers added while a fire is in progress see the next value.
    pub async fn fire(&self, value: T) {
        let observers: Vec<Observer<T>> = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        trace!(event = self.name, observers = observers.len(), "firing event");
        for observer in observers {
            observer(value.clone()).await;
        }
    }
}

impl<T> Event<T> {
    pub fn observer_count(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn observers_run_in_registration_order() {
        let event = Event::<u32>::new("test");
        let log = Arc::new(Mutex::new(Vec::new()));

        let slow = log.clone();
        event.add_observer(move |value| {
            let log = slow.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                log.lock().unwrap().push(("slow", value));
            }
        });
        let fast = log.clone();
        event.add_observer(move |value| {
            let log = fast.clone();
            async move {
                log.lock().unwrap().push(("fast", value));
            }
        });

        event.fire(1).await;
        event.fire(2).await;

        assert_eq!(
            *log.lock().unwrap(),
            vec![("slow", 1), ("fast", 1), ("slow", 2), ("fast", 2)]
        );
    }

    #[tokio::test]
    async fn removed_observer_is_not_called() {
        let event = Event::<()>::new("test");
        let calls = Arc::new(AtomicU64::new(0));
        let counter = calls.clone();
        let id = event.add_observer(move |()| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        event.fire(()).await;
        assert!(event.remove_observer(id));
        assert!(!event.remove_observer(id));
        event.fire(()).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(event.observer_count(), 0);
    }

    #[tokio::test]
    async fn fire_without_observers_is_a_no_op() {
        let event = Event::<String>::new("empty");
        event.fire("nothing".to_string()).await;
        assert_eq!(event.name(), "empty");
    }
}
