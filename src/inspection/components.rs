use std::any::{Any, TypeId};
use std::collections::HashMap;

/// Per-session singleton, for example a view or a manager that exists at most once.
pub trait Component: Any {
    /// Release resources, called once when the session ends.
    fn close(&mut self) {}

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Registry of session components keyed by their type.
///
/// Components are created lazily on first request and closed explicitly by [`Components::close_all`].
#[derive(Default)]
pub struct Components {
    instances: HashMap<TypeId, Box<dyn Component>>,
    /// Creation order, components are closed in reverse.
    order: Vec<TypeId>,
}

impl Components {
    /// Return component of type `T`, create it with `make` if it does not exist yet.
    pub fn get_or_create<T, F>(&mut self, make: F) -> &mut T
    where
        T: Component,
        F: FnOnce() -> T,
    {
        let key = TypeId::of::<T>();
        if !self.instances.contains_key(&key) {
            self.order.push(key);
        }
        self.instances
            .entry(key)
            .or_insert_with(|| Box::new(make()))
            .as_any_mut()
            .downcast_mut::<T>()
            .expect("component type matches its key")
    }

    pub fn get<T: Component>(&self) -> Option<&T> {
        self.instances
            .get(&TypeId::of::<T>())
            .and_then(|c| c.as_any().downcast_ref::<T>())
    }

    pub fn contains<T: Component>(&self) -> bool {
        self.instances.contains_key(&TypeId::of::<T>())
    }

    /// Close and forget a single component.
    pub fn close<T: Component>(&mut self) {
        let key = TypeId::of::<T>();
        if let Some(mut component) = self.instances.remove(&key) {
            component.close();
            self.order.retain(|k| *k != key);
        }
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Close all components in reverse creation order.
    pub fn close_all(&mut self) {
        for key in self.order.drain(..).rev() {
            if let Some(mut component) = self.instances.remove(&key) {
                component.close();
            }
        }
    }
}
