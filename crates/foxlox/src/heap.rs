//! Arena storage for GC-managed objects.
//!
//! Tuples, instances, and dicts live in per-type slabs with stable `u32`
//! ids and free-list reuse; each object carries a mark bit for the
//! collector. Runtime classes live in a separate monotonically-growing pool
//! owned by the VM (classes are never freed, only unmarked after a sweep).
//!
//! The heap tracks an estimated byte footprint; the VM compares it against
//! the GC threshold at every safepoint.

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::bytecode::SubrRef;
use crate::intern::StrId;
use crate::value::Value;

const TUPLE_OVERHEAD: usize = 32;
const INSTANCE_OVERHEAD: usize = 64;
const DICT_OVERHEAD: usize = 64;
const FIELD_ENTRY_SIZE: usize = std::mem::size_of::<(StrId, Value)>();
const DICT_ENTRY_SIZE: usize = std::mem::size_of::<(DictKey, Value)>();

/// Index of a tuple in the heap's tuple arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TupleId(u32);

/// Index of an instance in the heap's instance arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(u32);

/// Index of a dict in the heap's dict arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DictId(u32);

/// Index of a runtime class in the VM's class pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(pub(crate) u32);

#[derive(Debug)]
pub(crate) struct TupleObj {
    pub(crate) items: Box<[Value]>,
    pub(crate) mark: bool,
}

#[derive(Debug)]
pub(crate) struct InstanceObj {
    pub(crate) class: ClassId,
    pub(crate) fields: AHashMap<StrId, Value>,
    pub(crate) mark: bool,
}

#[derive(Debug)]
pub(crate) struct DictObj {
    /// Insertion-ordered so module dicts enumerate deterministically.
    pub(crate) entries: IndexMap<DictKey, Value>,
    pub(crate) mark: bool,
}

/// A method-table entry: the subroutine plus how many superclass layers the
/// entry was inherited through (0 for a direct method).
#[derive(Debug, Clone, Copy)]
pub(crate) struct MethodEntry {
    pub(crate) super_level: u8,
    pub(crate) subr: SubrRef,
}

/// A runtime class instantiated from a chunk's compile-time descriptor.
#[derive(Debug)]
pub(crate) struct ClassObj {
    pub(crate) name: StrId,
    pub(crate) superclass: Option<ClassId>,
    pub(crate) methods: AHashMap<StrId, MethodEntry>,
    pub(crate) mark: bool,
}

/// A hashable projection of a [`Value`] for dict keys.
///
/// Float keys hash by bit pattern; string keys compare by intern id, which
/// is exactly content equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum DictKey {
    Nil,
    Bool(bool),
    Int(i64),
    FloatBits(u64),
    Str(StrId),
    Tuple(TupleId),
    Class(ClassId),
    Instance(InstanceId),
    Dict(DictId),
    Subr(SubrRef),
}

impl DictKey {
    /// The core only produces string keys (module dicts); the general
    /// projection exists for host-built dicts.
    #[expect(dead_code, reason = "dict keys beyond interned strings are host-only")]
    pub(crate) fn from_value(v: Value) -> Option<Self> {
        match v {
            Value::Nil => Some(Self::Nil),
            Value::Bool(b) => Some(Self::Bool(b)),
            Value::Int(i) => Some(Self::Int(i)),
            Value::Float(f) => Some(Self::FloatBits(f.to_bits())),
            Value::Str(id) => Some(Self::Str(id)),
            Value::Tuple(id) => Some(Self::Tuple(id)),
            Value::Class(id) => Some(Self::Class(id)),
            Value::Instance(id) => Some(Self::Instance(id)),
            Value::Dict(id) => Some(Self::Dict(id)),
            Value::Subr(s) => Some(Self::Subr(s)),
            Value::HostFn(_) | Value::Method(_) => None,
        }
    }

    pub(crate) fn to_value(self) -> Value {
        match self {
            Self::Nil => Value::Nil,
            Self::Bool(b) => Value::Bool(b),
            Self::Int(i) => Value::Int(i),
            Self::FloatBits(bits) => Value::Float(f64::from_bits(bits)),
            Self::Str(id) => Value::Str(id),
            Self::Tuple(id) => Value::Tuple(id),
            Self::Class(id) => Value::Class(id),
            Self::Instance(id) => Value::Instance(id),
            Self::Dict(id) => Value::Dict(id),
            Self::Subr(s) => Value::Subr(s),
        }
    }
}

#[derive(Debug)]
struct Slab<T> {
    slots: Vec<Option<T>>,
    free: Vec<u32>,
}

impl<T> Slab<T> {
    fn new() -> Self {
        Self { slots: Vec::new(), free: Vec::new() }
    }

    fn insert(&mut self, value: T) -> u32 {
        match self.free.pop() {
            Some(i) => {
                self.slots[i as usize] = Some(value);
                i
            }
            None => {
                self.slots.push(Some(value));
                u32::try_from(self.slots.len() - 1).expect("heap arena exceeds u32 ids")
            }
        }
    }

    fn get(&self, idx: u32) -> &T {
        self.slots[idx as usize].as_ref().expect("use of collected object id")
    }

    fn get_mut(&mut self, idx: u32) -> &mut T {
        self.slots[idx as usize].as_mut().expect("use of collected object id")
    }
}

/// The GC-managed object heap.
#[derive(Debug)]
pub(crate) struct Heap {
    tuples: Slab<TupleObj>,
    instances: Slab<InstanceObj>,
    dicts: Slab<DictObj>,
    bytes: usize,
}

impl Heap {
    pub(crate) fn new() -> Self {
        Self {
            tuples: Slab::new(),
            instances: Slab::new(),
            dicts: Slab::new(),
            bytes: 0,
        }
    }

    /// Estimated bytes held by live arena objects.
    pub(crate) fn bytes_in_use(&self) -> usize {
        self.bytes
    }

    // === allocation ===

    pub(crate) fn alloc_tuple(&mut self, items: Box<[Value]>) -> TupleId {
        self.bytes += TUPLE_OVERHEAD + items.len() * std::mem::size_of::<Value>();
        TupleId(self.tuples.insert(TupleObj { items, mark: false }))
    }

    pub(crate) fn alloc_instance(&mut self, class: ClassId) -> InstanceId {
        self.bytes += INSTANCE_OVERHEAD;
        InstanceId(self.instances.insert(InstanceObj {
            class,
            fields: AHashMap::new(),
            mark: false,
        }))
    }

    pub(crate) fn alloc_dict(&mut self) -> DictId {
        self.bytes += DICT_OVERHEAD;
        DictId(self.dicts.insert(DictObj {
            entries: IndexMap::new(),
            mark: false,
        }))
    }

    // === access ===

    pub(crate) fn tuple(&self, id: TupleId) -> &TupleObj {
        self.tuples.get(id.0)
    }

    pub(crate) fn instance(&self, id: InstanceId) -> &InstanceObj {
        self.instances.get(id.0)
    }

    pub(crate) fn dict(&self, id: DictId) -> &DictObj {
        self.dicts.get(id.0)
    }

    pub(crate) fn tuple_mut(&mut self, id: TupleId) -> &mut TupleObj {
        self.tuples.get_mut(id.0)
    }

    pub(crate) fn instance_mut(&mut self, id: InstanceId) -> &mut InstanceObj {
        self.instances.get_mut(id.0)
    }

    pub(crate) fn dict_mut(&mut self, id: DictId) -> &mut DictObj {
        self.dicts.get_mut(id.0)
    }

    /// Writes an instance field, charging the heap when the key is new.
    pub(crate) fn instance_set_field(&mut self, id: InstanceId, name: StrId, value: Value) {
        let obj = self.instances.get_mut(id.0);
        if obj.fields.insert(name, value).is_none() {
            self.bytes += FIELD_ENTRY_SIZE;
        }
    }

    /// Writes a dict entry, charging the heap when the key is new.
    pub(crate) fn dict_set(&mut self, id: DictId, key: DictKey, value: Value) {
        let obj = self.dicts.get_mut(id.0);
        if obj.entries.insert(key, value).is_none() {
            self.bytes += DICT_ENTRY_SIZE;
        }
    }

    // === sweep ===

    /// Frees every unmarked object and clears the mark bit on survivors.
    /// Returns (tuples, instances, dicts) freed.
    pub(crate) fn sweep(&mut self) -> (usize, usize, usize) {
        let mut freed = (0, 0, 0);
        for (i, slot) in self.tuples.slots.iter_mut().enumerate() {
            match slot {
                Some(t) if t.mark => t.mark = false,
                Some(_) => {
                    let t = slot.take().expect("checked above");
                    self.bytes -= TUPLE_OVERHEAD + t.items.len() * std::mem::size_of::<Value>();
                    self.tuples.free.push(i as u32);
                    freed.0 += 1;
                }
                None => {}
            }
        }
        for (i, slot) in self.instances.slots.iter_mut().enumerate() {
            match slot {
                Some(o) if o.mark => o.mark = false,
                Some(_) => {
                    let o = slot.take().expect("checked above");
                    self.bytes -= INSTANCE_OVERHEAD + o.fields.len() * FIELD_ENTRY_SIZE;
                    self.instances.free.push(i as u32);
                    freed.1 += 1;
                }
                None => {}
            }
        }
        for (i, slot) in self.dicts.slots.iter_mut().enumerate() {
            match slot {
                Some(d) if d.mark => d.mark = false,
                Some(_) => {
                    let d = slot.take().expect("checked above");
                    self.bytes -= DICT_OVERHEAD + d.entries.len() * DICT_ENTRY_SIZE;
                    self.dicts.free.push(i as u32);
                    freed.2 += 1;
                }
                None => {}
            }
        }
        freed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_sweep_accounting() {
        let mut heap = Heap::new();
        let t = heap.alloc_tuple(vec![Value::Int(1), Value::Int(2)].into_boxed_slice());
        let before = heap.bytes_in_use();
        assert!(before > 0);
        heap.tuple_mut(t).mark = true;
        heap.sweep();
        assert_eq!(heap.bytes_in_use(), before, "marked object survives");
        assert!(!heap.tuple(t).mark, "mark cleared after sweep");
        heap.sweep();
        assert_eq!(heap.bytes_in_use(), 0, "unmarked object freed");
    }

    #[test]
    fn slab_reuses_freed_slots() {
        let mut heap = Heap::new();
        let a = heap.alloc_tuple(Box::new([]));
        heap.sweep();
        let b = heap.alloc_tuple(Box::new([]));
        assert_eq!(a, b);
    }
}
