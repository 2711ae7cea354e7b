//! Open-addressed hash table keyed by interned strings.
//!
//! Keys are [`ObjRef`] handles to interned string objects, so key equality
//! is handle equality; probing uses the string's precomputed FNV-1a hash,
//! which callers pass in explicitly (it lives on the heap object and the
//! table deliberately does not hold a heap reference). Deleted entries
//! become tombstones (no key, value `true`) so probe chains stay intact.

use crate::object::ObjRef;
use crate::value::Value;

const MAX_LOAD_NUM: usize = 3;
const MAX_LOAD_DEN: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct Entry {
    pub key: Option<ObjRef>,
    pub hash: u32,
    pub value: Value,
}

impl Entry {
    const EMPTY: Entry = Entry {
        key: None,
        hash: 0,
        value: Value::Null,
    };

    fn is_tombstone(&self) -> bool {
        self.key.is_none() && !matches!(self.value, Value::Null)
    }
}

/// Outcome of [`Table::set_existing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetResult {
    Updated,
    Undefined,
}

#[derive(Debug, Default)]
pub struct Table {
    /// Capacity is always zero or a power of two.
    entries: Vec<Entry>,
    /// Live entries plus tombstones.
    count: usize,
}

impl Table {
    pub fn new() -> Table {
        Table::default()
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    fn find_slot(&self, key: ObjRef, hash: u32) -> usize {
        let mask = self.entries.len() - 1;
        let mut index = hash as usize & mask;
        let mut tombstone = None;

        loop {
            let entry = &self.entries[index];
            match entry.key {
                None => {
                    if entry.is_tombstone() {
                        if tombstone.is_none() {
                            tombstone = Some(index);
                        }
                    } else {
                        // A truly empty slot terminates the probe chain.
                        return tombstone.unwrap_or(index);
                    }
                }
                Some(existing) if existing == key => return index,
                Some(_) => {}
            }
            index = (index + 1) & mask;
        }
    }

    fn grow(&mut self) {
        let new_capacity = if self.entries.is_empty() {
            8
        } else {
            self.entries.len() * 2
        };

        let old = std::mem::replace(&mut self.entries, vec![Entry::EMPTY; new_capacity]);
        self.count = 0;

        // Tombstones are dropped on rehash.
        for entry in old {
            if let Some(key) = entry.key {
                let slot = self.find_slot(key, entry.hash);
                self.entries[slot] = entry;
                self.count += 1;
            }
        }
    }

    fn ensure_room(&mut self) {
        if (self.count + 1) * MAX_LOAD_DEN > self.entries.len() * MAX_LOAD_NUM {
            self.grow();
        }
    }

    /// Insert a new binding. Fails (returning `false`) if the key is
    /// already present.
    pub fn define(&mut self, key: ObjRef, hash: u32, value: Value) -> bool {
        self.ensure_room();
        let slot = self.find_slot(key, hash);
        let entry = &mut self.entries[slot];
        if entry.key.is_some() {
            return false;
        }
        if !entry.is_tombstone() {
            self.count += 1;
        }
        *entry = Entry {
            key: Some(key),
            hash,
            value,
        };
        true
    }

    /// Insert or overwrite unconditionally.
    pub fn set(&mut self, key: ObjRef, hash: u32, value: Value) {
        self.ensure_room();
        let slot = self.find_slot(key, hash);
        let entry = &mut self.entries[slot];
        if entry.key.is_none() && !entry.is_tombstone() {
            self.count += 1;
        }
        *entry = Entry {
            key: Some(key),
            hash,
            value,
        };
    }

    /// Overwrite an existing binding; fails if the key is absent.
    pub fn set_existing(&mut self, key: ObjRef, hash: u32, value: Value) -> SetResult {
        if self.count == 0 {
            return SetResult::Undefined;
        }
        let slot = self.find_slot(key, hash);
        let entry = &mut self.entries[slot];
        if entry.key.is_none() {
            return SetResult::Undefined;
        }
        entry.value = value;
        SetResult::Updated
    }

    pub fn get(&self, key: ObjRef, hash: u32) -> Option<Value> {
        if self.count == 0 {
            return None;
        }
        let slot = self.find_slot(key, hash);
        let entry = &self.entries[slot];
        entry.key.map(|_| entry.value)
    }

    /// Remove a binding, leaving a tombstone. Returns whether it existed.
    pub fn delete(&mut self, key: ObjRef, hash: u32) -> bool {
        if self.count == 0 {
            return false;
        }
        let slot = self.find_slot(key, hash);
        let entry = &mut self.entries[slot];
        if entry.key.is_none() {
            return false;
        }
        entry.key = None;
        entry.hash = 0;
        entry.value = Value::Bool(true);
        true
    }

    /// Probe by raw content hash, testing candidate keys with `matches`.
    /// Used by the heap to intern strings before a key handle exists.
    pub fn find_key(&self, hash: u32, mut matches: impl FnMut(ObjRef) -> bool) -> Option<ObjRef> {
        if self.count == 0 {
            return None;
        }
        let mask = self.entries.len() - 1;
        let mut index = hash as usize & mask;
        loop {
            let entry = &self.entries[index];
            match entry.key {
                None => {
                    if !entry.is_tombstone() {
                        return None;
                    }
                }
                Some(key) => {
                    if entry.hash == hash && matches(key) {
                        return Some(key);
                    }
                }
            }
            index = (index + 1) & mask;
        }
    }

    /// Drop every binding whose key fails the predicate (tombstoning it).
    pub fn remove_where(&mut self, mut keep: impl FnMut(ObjRef) -> bool) {
        for entry in &mut self.entries {
            if let Some(key) = entry.key
                && !keep(key)
            {
                entry.key = None;
                entry.hash = 0;
                entry.value = Value::Bool(true);
            }
        }
    }

    /// Iterate live `(key, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (ObjRef, Value)> + '_ {
        self.entries
            .iter()
            .filter_map(|e| e.key.map(|k| (k, e.value)))
    }
}

/// 32-bit FNV-1a.
pub fn hash_bytes(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 2166136261;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(i: u32) -> ObjRef {
        ObjRef(i)
    }

    #[test]
    fn define_rejects_duplicates() {
        let mut table = Table::new();
        assert!(table.define(key(1), 42, Value::Number(1.0)));
        assert!(!table.define(key(1), 42, Value::Number(2.0)));
        assert_eq!(table.get(key(1), 42), Some(Value::Number(1.0)));
    }

    #[test]
    fn set_existing_requires_presence() {
        let mut table = Table::new();
        assert_eq!(
            table.set_existing(key(1), 7, Value::Bool(true)),
            SetResult::Undefined
        );
        table.define(key(1), 7, Value::Null);
        assert_eq!(
            table.set_existing(key(1), 7, Value::Bool(true)),
            SetResult::Updated
        );
        assert_eq!(table.get(key(1), 7), Some(Value::Bool(true)));
    }

    #[test]
    fn delete_leaves_probe_chain_intact() {
        let mut table = Table::new();
        // Three keys colliding on the same bucket.
        for i in 0..3 {
            assert!(table.define(key(i), 16, Value::Number(i as f64)));
        }
        assert!(table.delete(key(1), 16));
        assert_eq!(table.get(key(1), 16), None);
        // The key past the tombstone must still be reachable.
        assert_eq!(table.get(key(2), 16), Some(Value::Number(2.0)));
        // And the tombstone slot is reused.
        assert!(table.define(key(3), 16, Value::Number(3.0)));
        assert_eq!(table.get(key(3), 16), Some(Value::Number(3.0)));
    }

    #[test]
    fn survives_growth() {
        let mut table = Table::new();
        for i in 0..100 {
            assert!(table.define(key(i), i.wrapping_mul(31), Value::Number(i as f64)));
        }
        for i in 0..100 {
            assert_eq!(
                table.get(key(i), i.wrapping_mul(31)),
                Some(Value::Number(i as f64))
            );
        }
        assert_eq!(table.iter().count(), 100);
    }
}
