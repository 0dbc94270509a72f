//! Open-addressing hash table backing struct members.
//!
//! Linear probing over a power-of-two capacity. Deleted entries leave
//! tombstones so probe sequences stay intact; tombstones count towards the
//! load factor and are dropped on growth.

use smol_str::SmolStr;

use super::{hash_str, ObjectRef, Str, Value};
use crate::gc::{GcTracer, Trace};

const MIN_CAPACITY: usize = 8;

/// A string key. Keys match when both the hash and the text are equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableKey {
    /// The string object the key was made from
    pub object: ObjectRef,
    pub hash: u32,
    pub text: SmolStr,
}

impl TableKey {
    pub fn new(object: ObjectRef, s: &Str) -> Self {
        TableKey {
            object,
            hash: s.hash,
            text: s.text.clone(),
        }
    }

    fn matches(&self, hash: u32, text: &str) -> bool {
        self.hash == hash && self.text == text
    }
}

#[derive(Debug, Clone)]
enum Entry {
    Empty,
    Tombstone,
    Occupied(TableKey, Value),
}

#[derive(Debug, Clone, Default)]
pub struct Table {
    entries: Vec<Entry>,
    /// Live entries
    count: usize,
    /// Live entries plus tombstones
    used: usize,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Index of the entry holding the key, or of the slot it should be
    /// inserted into. The table must not be empty.
    fn find_slot(&self, hash: u32, text: &str) -> usize {
        let mask = self.entries.len() - 1;
        let mut idx = hash as usize & mask;
        let mut first_tombstone = None;
        loop {
            match &self.entries[idx] {
                Entry::Empty => return first_tombstone.unwrap_or(idx),
                Entry::Tombstone => {
                    first_tombstone.get_or_insert(idx);
                }
                Entry::Occupied(k, _) if k.matches(hash, text) => return idx,
                Entry::Occupied(..) => {}
            }
            idx = (idx + 1) & mask;
        }
    }

    fn lookup(&self, hash: u32, text: &str) -> Option<Value> {
        if self.entries.is_empty() {
            return None;
        }
        match &self.entries[self.find_slot(hash, text)] {
            Entry::Occupied(_, v) => Some(*v),
            _ => None,
        }
    }

    fn grow(&mut self) {
        let capacity = (self.entries.len() * 2).max(MIN_CAPACITY);
        let old = std::mem::replace(&mut self.entries, vec![Entry::Empty; capacity]);
        self.used = self.count;
        for entry in old {
            if let Entry::Occupied(k, v) = entry {
                let slot = self.find_slot(k.hash, &k.text);
                self.entries[slot] = Entry::Occupied(k, v);
            }
        }
    }

    /// Insert or overwrite. Returns `true` if the key was not present.
    pub fn set(&mut self, key: TableKey, value: Value) -> bool {
        if (self.used + 1) * 4 > self.entries.len() * 3 {
            self.grow();
        }
        let slot = self.find_slot(key.hash, &key.text);
        let is_new = match &mut self.entries[slot] {
            Entry::Occupied(_, v) => {
                *v = value;
                return false;
            }
            Entry::Empty => {
                self.used += 1;
                true
            }
            Entry::Tombstone => true,
        };
        self.count += 1;
        self.entries[slot] = Entry::Occupied(key, value);
        is_new
    }

    pub fn get(&self, key: &TableKey) -> Option<Value> {
        self.lookup(key.hash, &key.text)
    }

    /// Look a member up by name.
    pub fn get_str(&self, name: &str) -> Option<Value> {
        self.lookup(hash_str(name), name)
    }

    pub fn find(&self, key: &TableKey) -> bool {
        self.get(key).is_some()
    }

    /// Remove a key, leaving a tombstone. Returns `true` if it was present.
    pub fn delete(&mut self, key: &TableKey) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let slot = self.find_slot(key.hash, &key.text);
        if let Entry::Occupied(..) = self.entries[slot] {
            self.entries[slot] = Entry::Tombstone;
            self.count -= 1;
            true
        } else {
            false
        }
    }

    /// Live entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (&TableKey, Value)> + '_ {
        self.entries.iter().filter_map(|e| match e {
            Entry::Occupied(k, v) => Some((k, *v)),
            _ => None,
        })
    }
}

impl Trace for Table {
    fn trace(&self, tracer: &mut dyn GcTracer) {
        for (k, v) in self.iter() {
            tracer.trace(k.object);
            v.trace(tracer);
        }
    }
}
