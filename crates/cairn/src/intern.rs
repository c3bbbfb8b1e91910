//! Reference-counted string interning for stack values and property keys.
//!
//! Every string the engine holds lives in one [`StringTable`] and is named by
//! a [`StringId`]. Equal text always maps to the same id, so key lookups and
//! string equality are integer comparisons. Unlike an append-only interner,
//! entries are reference counted: each `Value::Str` and each property key
//! owns one reference, and a slot is recycled once the last owner drops it.

use std::rc::Rc;

use ahash::AHashMap;

use crate::limits::{LimitError, Limits};

/// Index into the string table's slot storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct StringId(u32);

impl StringId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
struct StrEntry {
    /// Shared with the dedup map's key.
    text: Rc<str>,
    /// Number of values and property keys naming this entry.
    refs: usize,
}

/// Owner of every string the engine holds.
///
/// Slots are recycled through a free list, and the dedup map guarantees one
/// slot per distinct text. All refcount traffic goes through [`Self::retain`]
/// and [`Self::release`]; the context is responsible for pairing them with
/// value clones and drops.
#[derive(Debug, Default)]
pub(crate) struct StringTable {
    slots: Vec<Option<StrEntry>>,
    by_text: AHashMap<Rc<str>, StringId>,
    free: Vec<StringId>,
}

impl StringTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Interns `text` and takes one reference on the entry.
    pub(crate) fn intern(&mut self, text: &str, limits: &Limits) -> Result<StringId, LimitError> {
        if let Some(&id) = self.by_text.get(text) {
            let entry = self.slots[id.index()]
                .as_mut()
                .expect("dedup map points at a free slot");
            entry.refs += 1;
            return Ok(id);
        }

        limits.check_interned_strings(self.by_text.len())?;
        let shared: Rc<str> = Rc::from(text);
        let entry = StrEntry {
            text: Rc::clone(&shared),
            refs: 1,
        };
        let id = match self.free.pop() {
            Some(id) => {
                self.slots[id.index()] = Some(entry);
                id
            }
            None => {
                let index = u32::try_from(self.slots.len()).expect("string table overflowed u32");
                self.slots.push(Some(entry));
                StringId(index)
            }
        };
        self.by_text.insert(shared, id);
        Ok(id)
    }

    /// Takes one more reference on an existing entry.
    pub(crate) fn retain(&mut self, id: StringId) {
        let entry = self.slots[id.index()].as_mut().expect("retain of a free string slot");
        entry.refs += 1;
    }

    /// Drops one reference, recycling the slot when the last owner is gone.
    pub(crate) fn release(&mut self, id: StringId) {
        let entry = self.slots[id.index()].as_mut().expect("release of a free string slot");
        entry.refs -= 1;
        if entry.refs == 0 {
            let entry = self.slots[id.index()].take().expect("slot vanished during release");
            self.by_text.remove(&entry.text);
            self.free.push(id);
        }
    }

    pub(crate) fn get(&self, id: StringId) -> &str {
        self.slots[id.index()].as_ref().expect("lookup of a free string slot").text.as_ref()
    }

    /// Id of an already-interned string, without touching reference counts.
    pub(crate) fn find(&self, text: &str) -> Option<StringId> {
        self.by_text.get(text).copied()
    }

    /// Number of distinct live strings.
    pub(crate) fn live(&self) -> usize {
        self.by_text.len()
    }
}
