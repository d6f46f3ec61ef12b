//! Keyed Registry
//!
//! Maps canonical argument keys to shared per-key slots. Slots are created on
//! first access and only ever removed all at once.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::key::ArgsKey;

pub struct KeyedRegistry<V> {
    slots: RefCell<HashMap<ArgsKey, Rc<V>>>,
}

impl<V> Default for KeyedRegistry<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for KeyedRegistry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

impl<V> KeyedRegistry<V> {
    pub fn new() -> Self {
        Self {
            slots: RefCell::new(HashMap::new()),
        }
    }

    /// Slot for `key`, creating it with `init` if this is the first access.
    pub fn get_or_create(&self, key: &ArgsKey, init: impl FnOnce() -> V) -> Rc<V> {
        if let Some(slot) = self.slots.borrow().get(key) {
            return Rc::clone(slot);
        }
        let slot = Rc::new(init());
        self.slots
            .borrow_mut()
            .insert(key.clone(), Rc::clone(&slot));
        slot
    }

    pub fn get(&self, key: &ArgsKey) -> Option<Rc<V>> {
        self.slots.borrow().get(key).map(Rc::clone)
    }

    pub fn contains(&self, key: &ArgsKey) -> bool {
        self.slots.borrow().contains_key(key)
    }

    /// Registered keys in sorted order.
    pub fn keys(&self) -> Vec<ArgsKey> {
        let mut keys: Vec<ArgsKey> = self.slots.borrow().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }

    /// Drop every slot. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut slots = self.slots.borrow_mut();
        let dropped = slots.len();
        slots.clear();
        dropped
    }
}
