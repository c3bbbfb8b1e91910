//! The reference-counted object heap.
//!
//! Objects, arrays, buffers, host functions and enumerators live in slot
//! entries indexed by [`HeapId`]. Each `Value::Ref` on the stack or inside a
//! container owns exactly one reference; `inc_ref`/`dec_ref` keep the counts
//! balanced and a freed slot goes on a free list for reuse.
//!
//! Reclamation is reference counting only. A value that is unreachable but
//! cyclic stays live until the owning context is torn down, at which point
//! every remaining finalizer runs and the arena is dropped wholesale.

use indexmap::IndexMap;

use crate::{
    buffer::FixedBuffer,
    call::HostFnEntry,
    intern::{StringId, StringTable},
    limits::{LimitError, Limits},
    tracer::EngineTracer,
    value::Value,
};

/// Index into the heap's slot storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct HeapId(u32);

impl HeapId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A host-held pin on a heap object.
///
/// Obtained from `Context::heap_ref`, pushed back with
/// `Context::push_heap_ref`, and released with `Context::release_ref`. The
/// pinned object cannot be collected while the pin exists; dropping the pin
/// without releasing it leaks the object until context teardown.
#[must_use = "release this pin through Context::release_ref or the object leaks"]
#[derive(Debug)]
pub struct HeapRef {
    pub(crate) id: HeapId,
}

/// One named property slot.
///
/// `value` owns one heap/string reference; the key id in the owning table
/// owns one string reference.
#[derive(Debug)]
pub(crate) struct Prop {
    pub(crate) value: Value,
    pub(crate) enumerable: bool,
}

pub(crate) type PropTable = IndexMap<StringId, Prop>;

#[derive(Debug, Default)]
pub(crate) struct ObjectData {
    pub(crate) props: PropTable,
    /// Prototype link; owns one reference when set.
    pub(crate) proto: Option<HeapId>,
}

#[derive(Debug, Default)]
pub(crate) struct ArrayData {
    pub(crate) items: Vec<Value>,
}

#[derive(Debug)]
pub(crate) struct HostFnData<Tr: EngineTracer> {
    pub(crate) entry: HostFnEntry<Tr>,
    pub(crate) name: Option<StringId>,
    pub(crate) props: PropTable,
}

/// Key snapshot taken by `Context::enumerate`.
///
/// `target` owns one heap reference and each key owns one string reference,
/// so the snapshot stays valid even if the target is mutated or dropped
/// while enumeration is in progress.
#[derive(Debug)]
pub(crate) struct EnumeratorData {
    pub(crate) target: HeapId,
    pub(crate) keys: Vec<StringId>,
    pub(crate) pos: usize,
}

#[derive(Debug)]
pub(crate) enum HeapData<Tr: EngineTracer> {
    Object(ObjectData),
    Array(ArrayData),
    Buffer(FixedBuffer),
    HostFn(HostFnData<Tr>),
    Enumerator(EnumeratorData),
}

#[derive(Debug)]
struct HeapEntry<Tr: EngineTracer> {
    refs: usize,
    /// `None` only transiently while the entry is being freed.
    data: Option<HeapData<Tr>>,
    /// Finalizer callback, run once when the entry's count first reaches
    /// zero and at context teardown. Owns one reference to the callback.
    finalizer: Option<Value>,
}

/// A finalizer waiting to run.
///
/// Holds the last reference to `target` (kept alive so the callback can see
/// the object) and owns the callback value. Both are consumed when the
/// context flushes its finalizer queue.
#[derive(Debug)]
pub(crate) struct PendingFinalizer {
    pub(crate) target: HeapId,
    pub(crate) callback: Value,
}

#[derive(Debug)]
pub(crate) struct Heap<Tr: EngineTracer> {
    entries: Vec<Option<HeapEntry<Tr>>>,
    free_list: Vec<HeapId>,
    live: usize,
}

impl<Tr: EngineTracer> Heap<Tr> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            free_list: Vec::new(),
            live: 0,
        }
    }

    /// Allocates a new heap entry with a reference count of one.
    pub(crate) fn allocate(
        &mut self,
        data: HeapData<Tr>,
        limits: &Limits,
    ) -> Result<HeapId, LimitError> {
        limits.check_heap_objects(self.live)?;
        let new_entry = HeapEntry {
            refs: 1,
            data: Some(data),
            finalizer: None,
        };

        let id = if let Some(id) = self.free_list.pop() {
            self.entries[id.index()] = Some(new_entry);
            id
        } else {
            let index = u32::try_from(self.entries.len()).expect("heap slot count overflowed u32");
            let id = HeapId(index);
            self.entries.push(Some(new_entry));
            id
        };
        self.live += 1;
        Ok(id)
    }

    /// Increments the reference count for an existing heap entry.
    ///
    /// # Panics
    /// Panics if the id is invalid or the entry has already been freed.
    pub(crate) fn inc_ref(&mut self, id: HeapId) {
        let entry = self
            .entries
            .get_mut(id.index())
            .expect("Heap::inc_ref: slot missing")
            .as_mut()
            .expect("Heap::inc_ref: object already freed");
        entry.refs += 1;
    }

    /// Decrements the reference count and frees the entry (plus children)
    /// once it hits zero.
    ///
    /// An entry with a finalizer is not freed on its first trip to zero:
    /// the callback is moved onto `pending` together with the entry's last
    /// reference, and the entry is freed when the context flushes the queue
    /// and the argument reference unwinds. Children are released with an
    /// explicit worklist so deep ownership chains cannot overflow the host
    /// stack.
    ///
    /// # Panics
    /// Panics if the id is invalid or the entry has already been freed.
    pub(crate) fn dec_ref(
        &mut self,
        id: HeapId,
        strings: &mut StringTable,
        pending: &mut Vec<PendingFinalizer>,
    ) {
        let mut work = vec![id];
        while let Some(id) = work.pop() {
            let entry = self
                .entries
                .get_mut(id.index())
                .expect("Heap::dec_ref: slot missing")
                .as_mut()
                .expect("Heap::dec_ref: object already freed");
            if entry.refs > 1 {
                entry.refs -= 1;
                continue;
            }

            if let Some(callback) = entry.finalizer.take() {
                // The queue takes over the last reference; refs stays at 1.
                pending.push(PendingFinalizer { target: id, callback });
                continue;
            }

            let entry = self.entries[id.index()]
                .take()
                .expect("Heap::dec_ref: object already freed");
            self.free_list.push(id);
            self.live -= 1;
            if let Some(data) = entry.data {
                Self::release_data(data, strings, &mut work);
            }
        }
    }

    fn release_data(data: HeapData<Tr>, strings: &mut StringTable, work: &mut Vec<HeapId>) {
        match data {
            HeapData::Object(object) => {
                if let Some(proto) = object.proto {
                    work.push(proto);
                }
                Self::release_props(object.props, strings, work);
            }
            HeapData::Array(array) => {
                for item in array.items {
                    Self::release_value(item, strings, work);
                }
            }
            HeapData::Buffer(_) => {}
            HeapData::HostFn(host_fn) => {
                if let Some(name) = host_fn.name {
                    strings.release(name);
                }
                Self::release_props(host_fn.props, strings, work);
            }
            HeapData::Enumerator(enumerator) => {
                work.push(enumerator.target);
                for key in enumerator.keys {
                    strings.release(key);
                }
            }
        }
    }

    fn release_props(props: PropTable, strings: &mut StringTable, work: &mut Vec<HeapId>) {
        for (key, prop) in props {
            strings.release(key);
            Self::release_value(prop.value, strings, work);
        }
    }

    fn release_value(value: Value, strings: &mut StringTable, work: &mut Vec<HeapId>) {
        match value {
            Value::Str(id) => strings.release(id),
            Value::Ref(id) => work.push(id),
            _ => {}
        }
    }

    /// Returns the heap data stored at the given id.
    ///
    /// # Panics
    /// Panics if the id is invalid or the entry has already been freed.
    pub(crate) fn data(&self, id: HeapId) -> &HeapData<Tr> {
        self.entries
            .get(id.index())
            .expect("Heap::data: slot missing")
            .as_ref()
            .expect("Heap::data: object already freed")
            .data
            .as_ref()
            .expect("Heap::data: data taken")
    }

    pub(crate) fn data_mut(&mut self, id: HeapId) -> &mut HeapData<Tr> {
        self.entries
            .get_mut(id.index())
            .expect("Heap::data_mut: slot missing")
            .as_mut()
            .expect("Heap::data_mut: object already freed")
            .data
            .as_mut()
            .expect("Heap::data_mut: data taken")
    }

    /// Installs or clears the finalizer callback, returning the previous one
    /// so the caller can drop it through the context.
    pub(crate) fn set_finalizer(&mut self, id: HeapId, callback: Option<Value>) -> Option<Value> {
        let entry = self
            .entries
            .get_mut(id.index())
            .expect("Heap::set_finalizer: slot missing")
            .as_mut()
            .expect("Heap::set_finalizer: object already freed");
        std::mem::replace(&mut entry.finalizer, callback)
    }

    pub(crate) fn has_finalizer(&self, id: HeapId) -> bool {
        self.entries
            .get(id.index())
            .expect("Heap::has_finalizer: slot missing")
            .as_ref()
            .expect("Heap::has_finalizer: object already freed")
            .finalizer
            .is_some()
    }

    /// Unretained peek at the installed finalizer callback.
    pub(crate) fn finalizer_peek(&self, id: HeapId) -> Option<Value> {
        self.entries
            .get(id.index())
            .expect("Heap::finalizer_peek: slot missing")
            .as_ref()
            .expect("Heap::finalizer_peek: object already freed")
            .finalizer
            .as_ref()
            .map(Value::raw_copy)
    }

    #[cfg(test)]
    pub(crate) fn refs(&self, id: HeapId) -> usize {
        self.entries
            .get(id.index())
            .expect("Heap::refs: slot missing")
            .as_ref()
            .expect("Heap::refs: object already freed")
            .refs
    }

    /// Number of live entries.
    pub(crate) fn live(&self) -> usize {
        self.live
    }

    /// Number of recycled slots awaiting reuse.
    pub(crate) fn free_slots(&self) -> usize {
        self.free_list.len()
    }

    /// Teardown pass one: queue every remaining finalizer, including those on
    /// entries that are still referenced or unreachable through cycles.
    ///
    /// Each queued entry gets an artificial reference for the queue to own,
    /// mirroring the steady-state handoff in `dec_ref`.
    pub(crate) fn queue_all_finalizers(&mut self, pending: &mut Vec<PendingFinalizer>) {
        for (index, slot) in self.entries.iter_mut().enumerate() {
            if let Some(entry) = slot
                && let Some(callback) = entry.finalizer.take()
            {
                entry.refs += 1;
                let id = HeapId(u32::try_from(index).expect("heap slot count overflowed u32"));
                pending.push(PendingFinalizer { target: id, callback });
            }
        }
    }

    /// Teardown pass two: drop every remaining entry without refcount
    /// discipline. Cyclic structures are reclaimed here.
    pub(crate) fn clear_all(&mut self) {
        self.entries.clear();
        self.free_list.clear();
        self.live = 0;
    }
}
