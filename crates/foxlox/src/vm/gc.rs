//! Mark-and-sweep collection over the VM's arenas and intern pool.
//!
//! Tri-color via per-object mark bits plus an explicit gray worklist.
//! Roots: the operand stack, every pending frame's subroutine, the current
//! subroutine, the const-string pool, and cached module dicts. Subroutines
//! root the static slots they reference, so captured statics stay alive
//! exactly as long as some reachable subroutine mentions them.

use smallvec::SmallVec;

use crate::bytecode::SubrRef;
use crate::heap::{ClassId, DictId, InstanceId, TupleId};
use crate::value::Value;
use crate::vm::{FIRST_GC_HEAP_SIZE, GC_HEAP_GROW_FACTOR, Vm};

/// An object whose own mark is set but whose referents still need tracing.
#[derive(Debug, Clone, Copy)]
pub(crate) enum GrayItem {
    Tuple(TupleId),
    Instance(InstanceId),
    Dict(DictId),
}

impl Vm {
    /// Estimated live heap bytes (arenas + intern pool).
    pub(crate) fn heap_in_use(&self) -> usize {
        self.heap.bytes_in_use() + self.strings.bytes_in_use()
    }

    /// GC safepoint: collects when the heap outgrew the threshold (always,
    /// under the `gc-stress` feature).
    pub(crate) fn collect_garbage(&mut self) {
        let do_gc = cfg!(feature = "gc-stress") || self.heap_in_use() > self.next_gc_heap_size;
        if !do_gc {
            return;
        }
        let before = self.heap_in_use();
        self.mark_roots();
        self.trace_references();
        self.sweep();
        let after = self.heap_in_use();
        self.next_gc_heap_size = (after * GC_HEAP_GROW_FACTOR).max(FIRST_GC_HEAP_SIZE);
        tracing::debug!(
            collected = before - after,
            heap = after,
            next_gc = self.next_gc_heap_size,
            "gc cycle"
        );
    }

    fn mark_roots(&mut self) {
        for i in 0..self.stack.len() {
            let v = self.stack[i];
            self.mark_value(v);
        }
        let pending: SmallVec<[SubrRef; 16]> = self.frames.iter().map(|f| f.subr).collect();
        for subr in pending {
            self.mark_subroutine(subr);
        }
        let current = self.current;
        self.mark_subroutine(current);
        for i in 0..self.const_strings.len() {
            let id = self.const_strings[i];
            self.strings.mark(id);
        }
        let cached: SmallVec<[DictId; 8]> = self.module_cache.values().copied().collect();
        for dict in cached {
            self.mark_value(Value::Dict(dict));
        }
    }

    fn mark_subroutine(&mut self, subr: SubrRef) {
        let chunk = &mut self.chunks[usize::from(subr.chunk)];
        let sub = chunk.subroutine_mut(subr.index);
        if sub.mark {
            return;
        }
        sub.mark = true;
        let slots: SmallVec<[u16; 8]> = sub.referenced_statics().iter().copied().collect();
        let base = chunk.static_value_idx_base();
        for slot in slots {
            let v = self.static_values[base + usize::from(slot)];
            self.mark_value(v);
        }
    }

    fn mark_class(&mut self, class: ClassId) {
        let obj = &mut self.classes[class.0 as usize];
        if obj.mark {
            return;
        }
        obj.mark = true;
        let name = obj.name;
        let entries: SmallVec<[SubrRef; 8]> = obj.methods.values().map(|e| e.subr).collect();
        let superclass = obj.superclass;
        self.strings.mark(name);
        for subr in entries {
            self.mark_subroutine(subr);
        }
        if let Some(superclass) = superclass {
            self.mark_class(superclass);
        }
    }

    fn mark_value(&mut self, v: Value) {
        match v {
            Value::Str(id) => self.strings.mark(id),
            Value::Tuple(id) => {
                let obj = self.heap.tuple_mut(id);
                if !obj.mark {
                    obj.mark = true;
                    self.gray.push(GrayItem::Tuple(id));
                }
            }
            Value::Instance(id) => {
                let obj = self.heap.instance_mut(id);
                if !obj.mark {
                    obj.mark = true;
                    self.gray.push(GrayItem::Instance(id));
                }
            }
            Value::Dict(id) => {
                let obj = self.heap.dict_mut(id);
                if !obj.mark {
                    obj.mark = true;
                    self.gray.push(GrayItem::Dict(id));
                }
            }
            Value::Class(id) => self.mark_class(id),
            Value::Subr(subr) => self.mark_subroutine(subr),
            Value::Method(m) => {
                self.mark_value(Value::Instance(m.instance));
                self.mark_subroutine(m.subr);
            }
            Value::Nil | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::HostFn(_) => {}
        }
    }

    fn trace_references(&mut self) {
        while let Some(item) = self.gray.pop() {
            match item {
                GrayItem::Tuple(id) => {
                    for i in 0..self.heap.tuple(id).items.len() {
                        let v = self.heap.tuple(id).items[i];
                        self.mark_value(v);
                    }
                }
                GrayItem::Instance(id) => {
                    let class = self.heap.instance(id).class;
                    let fields: SmallVec<[Value; 8]> =
                        self.heap.instance(id).fields.values().copied().collect();
                    for v in fields {
                        self.mark_value(v);
                    }
                    self.mark_class(class);
                }
                GrayItem::Dict(id) => {
                    let entries: SmallVec<[(Value, Value); 8]> = self
                        .heap
                        .dict(id)
                        .entries
                        .iter()
                        .map(|(k, v)| (k.to_value(), *v))
                        .collect();
                    for (k, v) in entries {
                        self.mark_value(k);
                        self.mark_value(v);
                    }
                }
            }
        }
    }

    fn sweep(&mut self) {
        let freed_strings = self.strings.sweep();
        let (tuples, instances, dicts) = self.heap.sweep();
        // whiten all subroutines and classes for the next cycle
        for chunk in &mut self.chunks {
            for sub in chunk.subroutines_mut() {
                sub.mark = false;
            }
        }
        for class in &mut self.classes {
            class.mark = false;
        }
        tracing::trace!(freed_strings, tuples, instances, dicts, "gc sweep");
    }
}
