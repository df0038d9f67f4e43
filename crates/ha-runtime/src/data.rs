//! Typed per-instance storage, the counterpart of `hass.data`
//!
//! Each type gets one slot. Integrations define their own types for what
//! they store, so slots never collide.

use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::sync::Arc;

#[derive(Default)]
pub struct HassData {
    values: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl HassData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the value stored for `T`
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|value| value.value().clone().downcast::<T>().ok())
    }

    /// Get the value stored for `T`, inserting one built by `init` if absent
    pub fn get_or_insert_with<T: Any + Send + Sync>(&self, init: impl FnOnce() -> T) -> Arc<T> {
        if let Some(value) = self.get::<T>() {
            return value;
        }

        let value = Arc::new(init());
        let stored = self
            .values
            .entry(TypeId::of::<T>())
            .or_insert_with(|| value.clone() as Arc<dyn Any + Send + Sync>)
            .value()
            .clone();
        stored.downcast::<T>().unwrap_or(value)
    }

    /// Replace the value stored for `T`
    pub fn insert<T: Any + Send + Sync>(&self, value: T) {
        self.values.insert(TypeId::of::<T>(), Arc::new(value));
    }

    /// Remove the value stored for `T`
    pub fn remove<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.values
            .remove(&TypeId::of::<T>())
            .and_then(|(_, value)| value.downcast::<T>().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter(AtomicUsize);

    struct Secret(String);

    #[test]
    fn test_get_or_insert_keeps_first_value() {
        let data = HassData::new();

        let first = data.get_or_insert_with(Counter::default);
        first.0.fetch_add(1, Ordering::SeqCst);

        let second = data.get_or_insert_with(Counter::default);
        assert_eq!(second.0.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_slots_are_per_type() {
        let data = HassData::new();
        data.insert(Secret("abc".into()));

        assert!(data.get::<Counter>().is_none());
        assert_eq!(data.get::<Secret>().unwrap().0, "abc");

        assert!(data.remove::<Secret>().is_some());
        assert!(data.get::<Secret>().is_none());
    }
}
