//! Callback registries used by the in-memory store.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::contract::HookResult;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Invoke every callback, returning the first error after all have run.
pub(crate) fn deliver<C: ?Sized>(
    callbacks: Vec<Arc<C>>,
    mut invoke: impl FnMut(&C) -> HookResult,
) -> HookResult {
    let mut first_error = None;
    for callback in callbacks {
        if let Err(e) = invoke(&callback) {
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

/// Unkeyed list of callbacks, notified on every event.
pub struct Listeners<C: ?Sized> {
    callbacks: Mutex<Vec<Arc<C>>>,
}

impl<C: ?Sized> Listeners<C> {
    pub fn new() -> Self {
        Self {
            callbacks: Mutex::new(Vec::new()),
        }
    }

    pub fn add(&self, callback: Arc<C>) {
        lock(&self.callbacks).push(callback);
    }

    /// Copy of the registered callbacks, taken under the lock.
    pub fn snapshot(&self) -> Vec<Arc<C>> {
        lock(&self.callbacks).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.callbacks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<C: ?Sized> Default for Listeners<C> {
    fn default() -> Self {
        Self::new()
    }
}

struct ObservedContext<C: ?Sized> {
    observers: Vec<Arc<C>>,
    last_notified: Option<Instant>,
}

/// Callbacks keyed by the entity they observe, with an optional cool-down.
///
/// While an entity is in its cool-down window, notifications for it are
/// dropped. A zero cool-down delivers everything.
pub struct Observer<K, C: ?Sized> {
    observed: Mutex<HashMap<K, ObservedContext<C>>>,
    cooldown: Duration,
}

impl<K: Eq + Hash, C: ?Sized> Observer<K, C> {
    pub fn new() -> Self {
        Self::with_cooldown(Duration::ZERO)
    }

    pub fn with_cooldown(cooldown: Duration) -> Self {
        Self {
            observed: Mutex::new(HashMap::new()),
            cooldown,
        }
    }

    pub fn observe(&self, key: K, callback: Arc<C>) {
        lock(&self.observed)
            .entry(key)
            .or_insert_with(|| ObservedContext {
                observers: Vec::new(),
                last_notified: None,
            })
            .observers
            .push(callback);
    }

    /// Callbacks to notify for `key` now, or nothing if it is cooling down.
    pub fn due<Q>(&self, key: &Q) -> Vec<Arc<C>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut observed = lock(&self.observed);
        let Some(context) = observed.get_mut(key) else {
            return Vec::new();
        };

        let now = Instant::now();
        if let Some(last) = context.last_notified {
            if now.duration_since(last) < self.cooldown {
                return Vec::new();
            }
        }
        context.last_notified = Some(now);
        context.observers.clone()
    }

    pub fn observer_count<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        lock(&self.observed)
            .get(key)
            .map_or(0, |context| context.observers.len())
    }
}

impl<K: Eq + Hash, C: ?Sized> Default for Observer<K, C> {
    fn default() -> Self {
        Self::new()
    }
}
