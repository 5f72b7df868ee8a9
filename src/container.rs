//! Injection container for handler services.
//!
//! The application owns a root container populated at startup. Every
//! request works on a [`branch`](Container::branch): lookups fall through to
//! the parent, writes land only in the branch, so one request can never
//! leak values into another.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type Service = Arc<dyn Any + Send + Sync>;

/// Identifies a service by type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    id: TypeId,
    name: &'static str,
}

impl ServiceKey {
    pub fn of<T: Any>() -> Self {
        Self { id: TypeId::of::<T>(), name: type_name::<T>() }
    }

    pub fn type_name(&self) -> &'static str { self.name }
}

#[derive(Clone, Default)]
pub struct Container {
    parent: Option<Arc<Container>>,
    values: HashMap<TypeId, Service>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// A child container reading through to `parent`.
    pub fn branch(parent: &Arc<Container>) -> Self {
        Self { parent: Some(Arc::clone(parent)), values: HashMap::new() }
    }

    /// Stores `value` in this container only.
    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) {
        self.values.insert(TypeId::of::<T>(), Arc::new(value));
    }

    pub fn insert_arc<T: Any + Send + Sync>(&mut self, value: Arc<T>) {
        self.values.insert(TypeId::of::<T>(), value);
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.get_key(&ServiceKey::of::<T>())
            .and_then(|s| s.downcast::<T>().ok())
    }

    pub fn contains(&self, key: &ServiceKey) -> bool {
        self.get_key(key).is_some()
    }

    pub(crate) fn get_key(&self, key: &ServiceKey) -> Option<Service> {
        match self.values.get(&key.id) {
            Some(service) => Some(Arc::clone(service)),
            None => self.parent.as_ref()?.get_key(key),
        }
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("values", &self.values.len())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}
