//! Precise, stop-the-world, tri-color mark-sweep collection.
//!
//! Every object starts white (mark bit clear). The caller marks its roots,
//! which pushes them onto the gray stack; [`Heap::trace_references`] then
//! drains the stack, blackening each object by marking everything it can
//! reach. [`Heap::sweep`] frees whatever stayed white and clears the mark
//! bit on survivors for the next cycle.
//!
//! The heap never initiates a collection on its own: only the VM knows its
//! roots (value stack, environment chain, call frames), so it drives the
//! three phases from its allocation wrapper. Interning entries are weak —
//! a white string is evicted from the interning table just before the
//! sweep so the sweep can free it.

use crate::object::{Heap, Obj, ObjRef, freed_size};
use crate::table::Table;
use crate::value::Value;

impl Heap {
    pub fn mark_value(&mut self, value: Value) {
        if let Value::Obj(r) = value {
            self.mark_object(r);
        }
    }

    /// Turn a white object gray.
    pub fn mark_object(&mut self, r: ObjRef) {
        let slot = &mut self.slots[r.0 as usize];
        if slot.obj.is_none() || slot.marked {
            return;
        }
        slot.marked = true;
        self.gray.push(r);
    }

    pub fn mark_table(&mut self, table: &Table) {
        // The table lives outside the heap (environments), so iterating
        // it while marking is borrow-safe.
        let pairs: Vec<(ObjRef, Value)> = table.iter().collect();
        for (key, value) in pairs {
            self.mark_object(key);
            self.mark_value(value);
        }
    }

    /// Drain the gray stack, blackening objects until everything reachable
    /// from the roots is marked.
    pub fn trace_references(&mut self) {
        while let Some(r) = self.gray.pop() {
            self.blacken(r);
        }
    }

    /// Mark everything a gray object points at.
    fn blacken(&mut self, r: ObjRef) {
        // Outgoing references are gathered first; marking mutates other
        // slots and must not overlap a borrow of this one.
        let mut outgoing: Vec<ObjRef> = Vec::new();
        let mut outgoing_values: Vec<Value> = Vec::new();

        match self.get(r) {
            Obj::String(_) | Obj::Native(_) => {}
            Obj::Function(f) => {
                if let Some(name) = f.name {
                    outgoing.push(name);
                }
                outgoing_values.extend_from_slice(&f.chunk.constants);
            }
            Obj::Class(c) => {
                outgoing.push(c.name);
                if let Some(parent) = c.parent {
                    outgoing.push(parent);
                }
                for (key, value) in c.methods.iter() {
                    outgoing.push(key);
                    outgoing_values.push(value);
                }
            }
            Obj::Instance(i) => {
                outgoing.push(i.class);
                for (key, value) in i.fields.iter() {
                    outgoing.push(key);
                    outgoing_values.push(value);
                }
            }
            Obj::BoundMethod(b) => {
                outgoing.push(b.receiver);
                outgoing.push(b.method);
            }
            Obj::List(l) => {
                outgoing_values.extend_from_slice(&l.items);
            }
        }

        for o in outgoing {
            self.mark_object(o);
        }
        for v in outgoing_values {
            self.mark_value(v);
        }
    }

    /// Evict interning entries whose strings are still white. Must run
    /// after tracing and before [`Heap::sweep`].
    pub fn remove_white_strings(&mut self) {
        let mut strings = std::mem::take(&mut self.strings);
        strings.remove_where(|key| self.slots[key.0 as usize].marked);
        self.strings = strings;
    }

    /// Free every white object and clear the mark bit on survivors.
    /// Rescales the collection threshold from the surviving footprint.
    pub fn sweep(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            match (&slot.obj, slot.marked) {
                (Some(obj), false) => {
                    self.bytes_allocated = self.bytes_allocated.saturating_sub(freed_size(obj));
                    slot.obj = None;
                    self.free.push(index as u32);
                }
                (Some(_), true) => slot.marked = false,
                (None, _) => {}
            }
        }
        self.rescale_threshold();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjList;

    #[test]
    fn unrooted_objects_are_swept() {
        let mut heap = Heap::new();
        let kept = heap.alloc(Obj::List(ObjList::default()));
        let dropped = heap.alloc(Obj::List(ObjList::default()));

        heap.mark_object(kept);
        heap.trace_references();
        heap.remove_white_strings();
        heap.sweep();

        assert_eq!(heap.live_objects(), 1);
        assert!(matches!(heap.get(kept), Obj::List(_)));
        assert!(heap.slots[dropped.0 as usize].obj.is_none());
    }

    #[test]
    fn reachable_graph_survives_through_containers() {
        let mut heap = Heap::new();
        let name = heap.intern("x");
        let list = heap.alloc(Obj::List(ObjList {
            items: vec![Value::Obj(name)],
        }));

        heap.mark_object(list);
        heap.trace_references();
        heap.remove_white_strings();
        heap.sweep();

        // The string is only reachable through the list, and survives.
        assert_eq!(heap.string(name).chars, "x");
        // It is still interned: re-interning returns the same handle.
        assert_eq!(heap.intern("x"), name);
    }

    #[test]
    fn white_strings_leave_the_interning_table() {
        let mut heap = Heap::new();
        let doomed = heap.intern("ephemeral");

        heap.trace_references();
        heap.remove_white_strings();
        heap.sweep();

        assert!(heap.slots[doomed.0 as usize].obj.is_none());
        // A fresh intern of the same text allocates a new object.
        let fresh = heap.intern("ephemeral");
        assert_eq!(heap.string(fresh).chars, "ephemeral");
    }

    #[test]
    fn sweep_clears_marks_for_the_next_cycle() {
        let mut heap = Heap::new();
        let r = heap.alloc(Obj::List(ObjList::default()));
        heap.mark_object(r);
        heap.trace_references();
        heap.sweep();
        assert!(!heap.slots[r.0 as usize].marked);
    }
}
