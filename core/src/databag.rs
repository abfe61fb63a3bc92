//! Named client-side key/value stores sent back to the server on demand.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{RwLock, PoisonError};

/// Contents of one bag.
pub type Bag = Map<String, Value>;

/// Thread-safe collection of named bags.
#[derive(Debug, Default)]
pub struct DataBags {
    bags: RwLock<BTreeMap<String, Bag>>,
}

impl DataBags {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one key of a bag, creating the bag if needed.
    pub fn set(&self, bag: &str, key: impl Into<String>, value: Value) {
        self.bags
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(bag.to_string())
            .or_default()
            .insert(key.into(), value);
    }

    /// Merge several keys into a bag.
    pub fn merge(&self, bag: &str, values: Bag) {
        let mut bags = self.bags.write().unwrap_or_else(PoisonError::into_inner);
        bags.entry(bag.to_string()).or_default().extend(values);
    }

    /// A copy of a bag's contents.
    #[must_use]
    pub fn get(&self, bag: &str) -> Option<Bag> {
        self.bags
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(bag)
            .cloned()
    }

    /// Remove a bag.
    pub fn clear(&self, bag: &str) {
        self.bags
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(bag);
    }

    /// The named bags as one JSON object; unknown bags are sent empty.
    #[must_use]
    pub fn snapshot(&self, names: &[String]) -> Value {
        let bags = self.bags.read().unwrap_or_else(PoisonError::into_inner);
        let object = names
            .iter()
            .map(|name| {
                let contents = bags.get(name).cloned().unwrap_or_default();
                (name.clone(), Value::Object(contents))
            })
            .collect();
        Value::Object(object)
    }
}
