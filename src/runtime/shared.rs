// Per-query shared operator state.
//
// Stateful parallel operators (hash join, hash group) need one shared
// instance per operator site, while every worker builds its own operator
// tree. The manager maps a site id to a lazily created shared state object;
// it lives for one query and is dropped with it.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Default)]
pub struct SharedStateManager {
    states: Mutex<HashMap<u32, Arc<dyn Any + Send + Sync>>>,
}

impl SharedStateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the shared state for `site`, creating it on first use. All
    /// callers for one site must agree on the type.
    pub fn get_or_init<T: Default + Send + Sync + 'static>(&self, site: u32) -> Arc<T> {
        let mut states = self.states.lock();
        let entry = states
            .entry(site)
            .or_insert_with(|| Arc::new(T::default()) as Arc<dyn Any + Send + Sync>);
        entry
            .clone()
            .downcast::<T>()
            .expect("shared state type mismatch at operator site")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        value: AtomicUsize,
    }

    #[test]
    fn same_site_yields_same_instance() {
        let mgr = SharedStateManager::new();
        let a = mgr.get_or_init::<Counter>(7);
        let b = mgr.get_or_init::<Counter>(7);
        a.value.fetch_add(1, Ordering::SeqCst);
        assert_eq!(b.value.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn different_sites_are_independent() {
        let mgr = SharedStateManager::new();
        let a = mgr.get_or_init::<Counter>(1);
        let b = mgr.get_or_init::<Counter>(2);
        a.value.fetch_add(1, Ordering::SeqCst);
        assert_eq!(b.value.load(Ordering::SeqCst), 0);
    }
}
