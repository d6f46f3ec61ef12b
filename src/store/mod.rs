//! Store
//!
//! Synchronous shared state with memoized derived values. The backing state is
//! owned by the store and only lent to its own getters (`&S`) and setters
//! (`&mut S`). Getter results are memoized per getter name and argument list
//! until a setter reports a change, at which point every memoized result is
//! dropped and `update` is emitted.

pub mod cache;
pub mod gate;

pub use cache::GetterCache;
pub use gate::Mutation;

use crate::error::StoreError;
use crate::key::ArgsKey;
use crate::notify::NotificationChannel;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, trace};

/// Name of the event emitted after every state change
pub const UPDATE_EVENT: &str = "update";

pub type GetterFn<S> = Rc<dyn Fn(&S, &[Value]) -> Value>;
pub type SetterFn<S> = Rc<dyn Fn(&mut S, &[Value]) -> Mutation>;

/// Payload delivered to store listeners
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreEvent {
    pub name: String,
    /// Setter that caused the event; `None` for manual emission.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setter: Option<String>,
}

pub struct Store<S> {
    state: RefCell<S>,
    getters: RefCell<HashMap<String, GetterFn<S>>>,
    setters: RefCell<HashMap<String, SetterFn<S>>>,
    cache: RefCell<GetterCache>,
    channel: NotificationChannel<StoreEvent>,
}

impl<S> fmt::Debug for Store<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut getters: Vec<String> = self.getters.borrow().keys().cloned().collect();
        let mut setters: Vec<String> = self.setters.borrow().keys().cloned().collect();
        getters.sort();
        setters.sort();
        f.debug_struct("Store")
            .field("getters", &getters)
            .field("setters", &setters)
            .field("cached_entries", &self.cache.borrow().len())
            .finish()
    }
}

fn box_getter<S: 'static, F>(getter: F) -> GetterFn<S>
where
    F: Fn(&S, &[Value]) -> Value + 'static,
{
    Rc::new(getter)
}

fn box_setter<S: 'static, F, R>(setter: F) -> SetterFn<S>
where
    F: Fn(&mut S, &[Value]) -> R + 'static,
    R: Into<Mutation>,
{
    Rc::new(move |state: &mut S, args: &[Value]| setter(state, args).into())
}

impl<S: 'static> Store<S> {
    /// Start collecting setters and getters around `state`.
    pub fn builder(state: S) -> StoreBuilder<S> {
        StoreBuilder {
            state,
            setters: Vec::new(),
            getters: Vec::new(),
        }
    }

    /// A store with no getters or setters yet.
    pub fn new(state: S) -> Self {
        Self {
            state: RefCell::new(state),
            getters: RefCell::new(HashMap::new()),
            setters: RefCell::new(HashMap::new()),
            cache: RefCell::new(GetterCache::new()),
            channel: NotificationChannel::new(),
        }
    }

    /// Add a getter after construction. Names must be unique among getters.
    pub fn register_getter<F>(&self, name: impl Into<String>, getter: F) -> Result<(), StoreError>
    where
        F: Fn(&S, &[Value]) -> Value + 'static,
    {
        self.insert_getter(name.into(), box_getter(getter))
    }

    /// Add a setter after construction. Names must be unique among setters.
    ///
    /// The setter may return [`Mutation`] or `()` (always a change).
    pub fn register_setter<F, R>(&self, name: impl Into<String>, setter: F) -> Result<(), StoreError>
    where
        F: Fn(&mut S, &[Value]) -> R + 'static,
        R: Into<Mutation>,
    {
        self.insert_setter(name.into(), box_setter(setter))
    }

    fn insert_getter(&self, name: String, getter: GetterFn<S>) -> Result<(), StoreError> {
        let mut getters = self.getters.borrow_mut();
        if getters.contains_key(&name) {
            return Err(StoreError::DuplicateGetter(name));
        }
        debug!(getter = %name, "Registered getter");
        getters.insert(name, getter);
        Ok(())
    }

    fn insert_setter(&self, name: String, setter: SetterFn<S>) -> Result<(), StoreError> {
        let mut setters = self.setters.borrow_mut();
        if setters.contains_key(&name) {
            return Err(StoreError::DuplicateSetter(name));
        }
        debug!(setter = %name, "Registered setter");
        setters.insert(name, setter);
        Ok(())
    }
}

impl<S> Store<S> {
    /// Call a setter by name.
    ///
    /// Unless the setter reports [`Mutation::Unchanged`], the whole getter cache
    /// is dropped and exactly one `update` event is emitted.
    pub fn set(&self, name: &str, args: &[Value]) -> Result<Mutation, StoreError> {
        let setter = self
            .setters
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::UnknownSetter(name.to_string()))?;

        let mutation = {
            let mut state = self.state.borrow_mut();
            setter(&mut *state, args)
        };

        let announce = gate::commit(name, mutation, &mut self.cache.borrow_mut());
        if announce {
            self.channel.emit(
                UPDATE_EVENT,
                &StoreEvent {
                    name: UPDATE_EVENT.to_string(),
                    setter: Some(name.to_string()),
                },
            );
        }
        Ok(mutation)
    }

    /// Call a getter by name.
    ///
    /// The first call for a given argument list since the last change computes
    /// the result; later calls return the same `Rc` without recomputing.
    pub fn get(&self, name: &str, args: &[Value]) -> Result<Rc<Value>, StoreError> {
        let getter = self
            .getters
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::UnknownGetter(name.to_string()))?;

        let key = ArgsKey::from_values(args);
        if let Some(hit) = self.cache.borrow().get(name, &key) {
            trace!(getter = name, args = %key, "Getter cache hit");
            return Ok(hit);
        }

        let value = {
            let state = self.state.borrow();
            Rc::new(getter(&*state, args))
        };
        trace!(getter = name, args = %key, "Getter cache miss, computed");
        self.cache
            .borrow_mut()
            .insert(name, key, Rc::clone(&value));
        Ok(value)
    }

    /// Emit an arbitrary event to the store's listeners.
    pub fn emit(&self, event: &str) -> usize {
        self.channel.emit(
            event,
            &StoreEvent {
                name: event.to_string(),
                setter: None,
            },
        )
    }

    /// Subscription handle shared by all getters and setters of this store.
    pub fn events(&self) -> &NotificationChannel<StoreEvent> {
        &self.channel
    }

    pub fn has_getter(&self, name: &str) -> bool {
        self.getters.borrow().contains_key(name)
    }

    pub fn has_setter(&self, name: &str) -> bool {
        self.setters.borrow().contains_key(name)
    }

    /// Number of memoized getter results currently held.
    pub fn cached_entries(&self) -> usize {
        self.cache.borrow().len()
    }
}

/// Collects the setter and getter mappings for [`Store::builder`]
pub struct StoreBuilder<S> {
    state: S,
    setters: Vec<(String, SetterFn<S>)>,
    getters: Vec<(String, GetterFn<S>)>,
}

impl<S: 'static> StoreBuilder<S> {
    pub fn setter<F, R>(mut self, name: impl Into<String>, setter: F) -> Self
    where
        F: Fn(&mut S, &[Value]) -> R + 'static,
        R: Into<Mutation>,
    {
        self.setters.push((name.into(), box_setter(setter)));
        self
    }

    pub fn getter<F>(mut self, name: impl Into<String>, getter: F) -> Self
    where
        F: Fn(&S, &[Value]) -> Value + 'static,
    {
        self.getters.push((name.into(), box_getter(getter)));
        self
    }

    /// Fails on the first name that appears twice in either mapping.
    pub fn build(self) -> Result<Store<S>, StoreError> {
        let store = Store::new(self.state);
        for (name, setter) in self.setters {
            store.insert_setter(name, setter)?;
        }
        for (name, getter) in self.getters {
            store.insert_getter(name, getter)?;
        }
        Ok(store)
    }
}
