//! Deduplication tables referenced by ID from the charges

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Values stored in a [`DedupTable`]
pub trait TableValue: Clone {
    /// Structural equality used to find an existing representative
    fn table_equal(&self, other: &Self) -> bool;

    /// Empty values are never stored and map to the empty ID
    fn is_empty_value(&self) -> bool {
        false
    }
}

/// Short content-independent identifier
pub fn new_table_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// One representative per distinct value, addressed by an opaque ID.
///
/// Lookup is a linear scan with [`TableValue::table_equal`], not hashing,
/// so each value type decides what "the same" means.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DedupTable<T> {
    entries: BTreeMap<String, T>,
}

impl<T> Default for DedupTable<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T: TableValue> DedupTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// ID of an existing equal entry
    pub fn find_id(&self, value: &T) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, v)| v.table_equal(value))
            .map(|(k, _)| k.as_str())
    }

    /// Return the ID of `value`, inserting it under a fresh ID if new
    pub fn get_id_with_set(&mut self, value: T) -> String {
        if value.is_empty_value() {
            return String::new();
        }
        if let Some(id) = self.find_id(&value) {
            return id.to_string();
        }
        let id = self.unused_id();
        self.entries.insert(id.clone(), value);
        id
    }

    fn unused_id(&self) -> String {
        loop {
            let id = new_table_id();
            if !self.entries.contains_key(&id) {
                return id;
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.entries.get(id)
    }

    /// Store under a fixed ID, replacing what was there
    pub fn insert(&mut self, id: impl Into<String>, value: T) {
        self.entries.insert(id.into(), value);
    }

    pub fn remove(&mut self, id: &str) -> Option<T> {
        self.entries.remove(id)
    }

    pub fn contains_key(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &T)> {
        self.entries.iter()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.values_mut()
    }

    /// Keep only the IDs accepted by `keep`
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.entries.retain(|k, _| keep(k));
    }

    /// Re-key entries so values also present in `reference` use its IDs.
    ///
    /// Returns the old to new ID mapping for every entry that moved. An
    /// entry whose ID would collide with one taken from `reference` gets a
    /// fresh ID.
    pub fn rekey(&mut self, reference: &DedupTable<T>) -> HashMap<String, String> {
        let mut target: BTreeMap<String, T> = BTreeMap::new();
        let mut moved = HashMap::new();
        let mut unmatched = Vec::new();

        for (id, value) in std::mem::take(&mut self.entries) {
            match reference.find_id(&value) {
                Some(ref_id) if !target.contains_key(ref_id) => {
                    if ref_id != id {
                        moved.insert(id, ref_id.to_string());
                    }
                    target.insert(ref_id.to_string(), value);
                }
                _ => unmatched.push((id, value)),
            }
        }
        for (id, value) in unmatched {
            if target.contains_key(&id) || reference.contains_key(&id) {
                let fresh = loop {
                    let candidate = new_table_id();
                    if !target.contains_key(&candidate) && !reference.contains_key(&candidate) {
                        break candidate;
                    }
                };
                moved.insert(id, fresh.clone());
                target.insert(fresh, value);
            } else {
                target.insert(id, value);
            }
        }
        self.entries = target;
        moved
    }
}
