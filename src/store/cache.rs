//! Memoized getter results, keyed by getter name and canonical arguments.

use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use crate::key::ArgsKey;

#[derive(Debug, Default)]
pub struct GetterCache {
    entries: HashMap<String, HashMap<ArgsKey, Rc<Value>>>,
}

impl GetterCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, getter: &str, key: &ArgsKey) -> Option<Rc<Value>> {
        self.entries.get(getter)?.get(key).map(Rc::clone)
    }

    pub fn insert(&mut self, getter: &str, key: ArgsKey, value: Rc<Value>) {
        self.entries
            .entry(getter.to_string())
            .or_default()
            .insert(key, value);
    }

    /// Drop every memoized result. Returns how many were dropped.
    pub fn invalidate_all(&mut self) -> usize {
        let dropped = self.len();
        self.entries.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
