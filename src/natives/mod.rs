//! Host standard library.
//!
//! Native functions implement the callable ABI the VM understands: they
//! receive a [`NativeCtx`] (heap, output sink, the outermost environment's
//! table, and the RNG), the source line of the call site for error
//! messages, and their evaluated arguments. The VM pushes the returned
//! value; a returned error unwinds like any other runtime error.
//!
//! Modules are classes full of native methods, bound as an instance under
//! the module's name in the outermost environment when user code calls
//! `include("...")`.

pub mod core;
pub mod list;
pub mod math;
pub mod os;
pub mod random;

use std::io::Write;

use rand::rngs::StdRng;

use crate::error::{Error, Result};
use crate::object::{Heap, Obj, ObjClass, ObjInstance, ObjNative, ObjRef};
use crate::table::Table;
use crate::value::Value;

/// Everything a native function may touch.
pub struct NativeCtx<'a> {
    pub heap: &'a mut Heap,
    pub out: &'a mut dyn Write,
    /// The outermost environment's bindings; `include` installs modules
    /// here.
    pub natives: &'a mut Table,
    pub rng: &'a mut StdRng,
}

/// The native callable ABI. The argument count of the original interface
/// is carried by the slice length.
pub type NativeFn = fn(&mut NativeCtx, u16, &[Value]) -> Result<Value>;

pub fn native_error(line: u16, message: impl AsRef<str>) -> Error {
    Error::Runtime(format!(
        "[line {}] Native Function Error: {}",
        line,
        message.as_ref()
    ))
}

pub fn check_arity(name: &str, line: u16, expected: usize, args: &[Value]) -> Result<()> {
    if args.len() == expected {
        return Ok(());
    }
    Err(native_error(
        line,
        format!(
            "'{}' expected {} arguments but got {}.",
            name,
            expected,
            args.len()
        ),
    ))
}

pub fn number_arg(name: &str, line: u16, args: &[Value], index: usize) -> Result<f64> {
    match args.get(index) {
        Some(Value::Number(n)) => Ok(*n),
        _ => Err(native_error(
            line,
            format!("'{}' expected a number as argument {}.", name, index + 1),
        )),
    }
}

pub fn string_arg(
    ctx: &NativeCtx<'_>,
    name: &str,
    line: u16,
    args: &[Value],
    index: usize,
) -> Result<String> {
    match args.get(index) {
        Some(Value::Obj(r)) => {
            if let Obj::String(s) = ctx.heap.get(*r) {
                return Ok(s.chars.clone());
            }
            Err(native_error(
                line,
                format!("'{}' expected a string as argument {}.", name, index + 1),
            ))
        }
        _ => Err(native_error(
            line,
            format!("'{}' expected a string as argument {}.", name, index + 1),
        )),
    }
}

pub fn list_arg(
    ctx: &NativeCtx<'_>,
    name: &str,
    line: u16,
    args: &[Value],
    index: usize,
) -> Result<ObjRef> {
    match args.get(index) {
        Some(Value::Obj(r)) if matches!(ctx.heap.get(*r), Obj::List(_)) => Ok(*r),
        _ => Err(native_error(
            line,
            format!("'{}' expected a list as argument {}.", name, index + 1),
        )),
    }
}

/// Bind a native function into `table` under `name`.
pub fn define_native_fn(heap: &mut Heap, table: &mut Table, name: &str, function: NativeFn) {
    let name = heap.intern(name);
    let hash = heap.str_hash(name);
    let native = heap.alloc(Obj::Native(ObjNative { function }));
    table.define(name, hash, Value::Obj(native));
}

/// Build a module: a class holding native methods, bound as an instance
/// under the module's name. Re-including an already present module is a
/// no-op.
pub fn define_module(
    heap: &mut Heap,
    table: &mut Table,
    name: &str,
    methods: &[(&str, NativeFn)],
) {
    let module_name = heap.intern(name);
    let hash = heap.str_hash(module_name);
    if table.get(module_name, hash).is_some() {
        return;
    }

    let class = heap.alloc(Obj::Class(ObjClass {
        name: module_name,
        methods: Table::new(),
        parent: None,
    }));

    for (method_name, function) in methods {
        let method_name = heap.intern(method_name);
        let method_hash = heap.str_hash(method_name);
        let native = heap.alloc(Obj::Native(ObjNative { function: *function }));
        heap.class_mut(class)
            .methods
            .define(method_name, method_hash, Value::Obj(native));
    }

    let instance = heap.alloc(Obj::Instance(ObjInstance {
        class,
        fields: Table::new(),
    }));
    table.define(module_name, hash, Value::Obj(instance));
}
