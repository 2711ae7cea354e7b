//! Heap objects and the heap itself.
//!
//! Every non-trivial runtime value lives in a [`Heap`] slot and is reached
//! through an [`ObjRef`] handle. Handles are stable for the lifetime of the
//! object (objects never move); identity comparison is handle comparison.
//! The heap also owns the string-interning table, so exactly one string
//! object exists per distinct byte sequence, and the allocation accounting
//! that decides when the collector in [`crate::gc`] should run.

use crate::chunk::Chunk;
use crate::natives::NativeFn;
use crate::table::{Table, hash_bytes};
use crate::value::{Value, format_number};

/// Collection threshold for a fresh heap.
const FIRST_GC_AT: usize = 1024 * 1024;
/// After a collection the threshold becomes `bytes_allocated * GROW_FACTOR`.
const GC_HEAP_GROW_FACTOR: usize = 2;

/// Handle to a heap object. Plain index into the heap's slot arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjRef(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Script,
    Function,
    Method,
    Initializer,
}

#[derive(Debug)]
pub struct ObjString {
    pub chars: String,
    /// Precomputed FNV-1a hash, used by every table this string keys.
    pub hash: u32,
}

#[derive(Debug)]
pub struct ObjFunction {
    /// `None` for the top-level script.
    pub name: Option<ObjRef>,
    pub arity: u8,
    pub kind: FunctionKind,
    pub chunk: Chunk,
}

pub struct ObjNative {
    pub function: NativeFn,
}

impl std::fmt::Debug for ObjNative {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<native fn>")
    }
}

#[derive(Debug)]
pub struct ObjClass {
    pub name: ObjRef,
    pub methods: Table,
    pub parent: Option<ObjRef>,
}

#[derive(Debug)]
pub struct ObjInstance {
    pub class: ObjRef,
    pub fields: Table,
}

#[derive(Debug)]
pub struct ObjBoundMethod {
    pub receiver: ObjRef,
    pub method: ObjRef,
}

#[derive(Debug, Default)]
pub struct ObjList {
    pub items: Vec<Value>,
}

#[derive(Debug)]
pub enum Obj {
    String(ObjString),
    Function(ObjFunction),
    Native(ObjNative),
    Class(ObjClass),
    Instance(ObjInstance),
    BoundMethod(ObjBoundMethod),
    List(ObjList),
}

#[derive(Debug)]
pub(crate) struct Slot {
    pub(crate) marked: bool,
    pub(crate) obj: Option<Obj>,
}

/// The object heap: a slot arena with a free list, plus the interning
/// table and the byte accounting that paces garbage collection.
#[derive(Debug, Default)]
pub struct Heap {
    pub(crate) slots: Vec<Slot>,
    pub(crate) free: Vec<u32>,
    pub(crate) strings: Table,
    pub(crate) bytes_allocated: usize,
    pub(crate) next_gc: usize,
    pub(crate) gray: Vec<ObjRef>,
}

impl Heap {
    pub fn new() -> Heap {
        Heap {
            next_gc: FIRST_GC_AT,
            ..Heap::default()
        }
    }

    /// Claim a slot for `obj`. Never collects; callers that may hold the
    /// only reference to live objects decide when to run the collector.
    pub fn alloc(&mut self, obj: Obj) -> ObjRef {
        self.bytes_allocated += approximate_size(&obj);

        match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Slot {
                    marked: false,
                    obj: Some(obj),
                };
                ObjRef(index)
            }
            None => {
                self.slots.push(Slot {
                    marked: false,
                    obj: Some(obj),
                });
                ObjRef((self.slots.len() - 1) as u32)
            }
        }
    }

    /// Whether enough has been allocated to warrant a collection.
    pub fn should_collect(&self) -> bool {
        if cfg!(feature = "stress-gc") {
            return true;
        }
        self.bytes_allocated > self.next_gc
    }

    pub(crate) fn rescale_threshold(&mut self) {
        self.next_gc = (self.bytes_allocated * GC_HEAP_GROW_FACTOR).max(FIRST_GC_AT);
    }

    pub fn get(&self, r: ObjRef) -> &Obj {
        self.slots[r.0 as usize]
            .obj
            .as_ref()
            .expect("use of freed object")
    }

    pub fn get_mut(&mut self, r: ObjRef) -> &mut Obj {
        self.slots[r.0 as usize]
            .obj
            .as_mut()
            .expect("use of freed object")
    }

    /// Number of live objects, for tests and diagnostics.
    pub fn live_objects(&self) -> usize {
        self.slots.iter().filter(|s| s.obj.is_some()).count()
    }

    // -----------------------------------------------------------------------
    // Interning
    // -----------------------------------------------------------------------

    /// Return the canonical string object for `chars`, allocating it on
    /// first sight. The interning table holds its entries weakly: the
    /// collector drops any entry whose string is otherwise unreachable.
    pub fn intern(&mut self, chars: &str) -> ObjRef {
        let hash = hash_bytes(chars.as_bytes());

        let found = self.strings.find_key(hash, |key| {
            match &self.slots[key.0 as usize].obj {
                Some(Obj::String(s)) => s.chars == chars,
                _ => false,
            }
        });
        if let Some(existing) = found {
            return existing;
        }

        let r = self.alloc(Obj::String(ObjString {
            chars: chars.to_string(),
            hash,
        }));
        self.strings.set(r, hash, Value::Null);
        r
    }

    // -----------------------------------------------------------------------
    // Typed accessors
    // -----------------------------------------------------------------------

    pub fn string(&self, r: ObjRef) -> &ObjString {
        match self.get(r) {
            Obj::String(s) => s,
            other => panic!("expected string object, found {:?}", other),
        }
    }

    /// The FNV-1a hash of an interned string, for table operations.
    pub fn str_hash(&self, r: ObjRef) -> u32 {
        self.string(r).hash
    }

    pub fn function(&self, r: ObjRef) -> &ObjFunction {
        match self.get(r) {
            Obj::Function(f) => f,
            other => panic!("expected function object, found {:?}", other),
        }
    }

    pub fn class(&self, r: ObjRef) -> &ObjClass {
        match self.get(r) {
            Obj::Class(c) => c,
            other => panic!("expected class object, found {:?}", other),
        }
    }

    pub fn class_mut(&mut self, r: ObjRef) -> &mut ObjClass {
        match self.get_mut(r) {
            Obj::Class(c) => c,
            other => panic!("expected class object, found {:?}", other),
        }
    }

    pub fn instance(&self, r: ObjRef) -> &ObjInstance {
        match self.get(r) {
            Obj::Instance(i) => i,
            other => panic!("expected instance object, found {:?}", other),
        }
    }

    pub fn instance_mut(&mut self, r: ObjRef) -> &mut ObjInstance {
        match self.get_mut(r) {
            Obj::Instance(i) => i,
            other => panic!("expected instance object, found {:?}", other),
        }
    }

    pub fn list(&self, r: ObjRef) -> &ObjList {
        match self.get(r) {
            Obj::List(l) => l,
            other => panic!("expected list object, found {:?}", other),
        }
    }

    pub fn list_mut(&mut self, r: ObjRef) -> &mut ObjList {
        match self.get_mut(r) {
            Obj::List(l) => l,
            other => panic!("expected list object, found {:?}", other),
        }
    }

    // -----------------------------------------------------------------------
    // Method resolution
    // -----------------------------------------------------------------------

    /// Look `name` up through `class` and its parent chain. Returns the
    /// method value and the class that defines it (the latter anchors
    /// `base` resolution inside the method).
    pub fn find_method(&self, class: ObjRef, name: ObjRef) -> Option<(Value, ObjRef)> {
        let hash = self.str_hash(name);
        let mut current = Some(class);
        while let Some(c) = current {
            let class_obj = self.class(c);
            if let Some(method) = class_obj.methods.get(name, hash) {
                return Some((method, c));
            }
            current = class_obj.parent;
        }
        None
    }

    // -----------------------------------------------------------------------
    // Printing
    // -----------------------------------------------------------------------

    pub(crate) fn object_to_print_string(&self, r: ObjRef) -> String {
        match self.get(r) {
            Obj::String(s) => s.chars.clone(),
            Obj::Function(f) => self.function_name(f),
            Obj::Native(_) => "<native fn>".to_string(),
            Obj::Class(c) => format!("{} class", self.string(c.name).chars),
            Obj::Instance(i) => {
                format!("{} instance", self.string(self.class(i.class).name).chars)
            }
            Obj::BoundMethod(b) => match self.get(b.method) {
                Obj::Function(f) => self.function_name(f),
                _ => "<native fn>".to_string(),
            },
            Obj::List(l) => {
                let items: Vec<String> = l
                    .items
                    .iter()
                    .map(|v| match v {
                        Value::Null => "null".to_string(),
                        Value::Bool(b) => b.to_string(),
                        Value::Number(n) => format_number(*n),
                        Value::Obj(r) => self.object_to_print_string(*r),
                    })
                    .collect();
                format!("{{ {} }}", items.join(", "))
            }
        }
    }

    fn function_name(&self, f: &ObjFunction) -> String {
        match f.name {
            Some(name) => format!("<fn {}>", self.string(name).chars),
            None => "<script>".to_string(),
        }
    }
}

/// Rough per-object footprint for pacing the collector. Exact byte counts
/// are not required, only monotone growth with real memory use.
fn approximate_size(obj: &Obj) -> usize {
    let base = std::mem::size_of::<Obj>();
    base + match obj {
        Obj::String(s) => s.chars.len(),
        Obj::Function(f) => {
            f.chunk.code.len() + f.chunk.lines.len() * 2 + f.chunk.constants.len() * 16
        }
        Obj::Native(_) => 0,
        Obj::Class(c) => c.methods.capacity() * 24,
        Obj::Instance(i) => i.fields.capacity() * 24,
        Obj::BoundMethod(_) => 0,
        Obj::List(l) => l.items.capacity() * 16,
    }
}

pub(crate) fn freed_size(obj: &Obj) -> usize {
    approximate_size(obj)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_yields_one_object_per_byte_sequence() {
        let mut heap = Heap::new();
        let a = heap.intern("hello");
        let b = heap.intern("hello");
        let c = heap.intern("world");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(heap.string(a).chars, "hello");
    }

    #[test]
    fn find_method_walks_the_parent_chain() {
        let mut heap = Heap::new();
        let parent_name = heap.intern("Parent");
        let child_name = heap.intern("Child");
        let greet = heap.intern("greet");
        let hash = heap.str_hash(greet);

        let parent = heap.alloc(Obj::Class(ObjClass {
            name: parent_name,
            methods: Table::new(),
            parent: None,
        }));
        let method = heap.alloc(Obj::Function(ObjFunction {
            name: Some(greet),
            arity: 0,
            kind: FunctionKind::Method,
            chunk: Chunk::new(),
        }));
        heap.class_mut(parent)
            .methods
            .define(greet, hash, Value::Obj(method));

        let child = heap.alloc(Obj::Class(ObjClass {
            name: child_name,
            methods: Table::new(),
            parent: Some(parent),
        }));

        let (found, defining) = heap.find_method(child, greet).unwrap();
        assert_eq!(found, Value::Obj(method));
        assert_eq!(defining, parent);
    }
}
