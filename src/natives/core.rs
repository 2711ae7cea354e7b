//! Bootstrapped natives: available before any `include`.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Result;
use crate::natives::{
    NativeCtx, NativeFn, check_arity, define_module, define_native_fn, list, math, os, random,
    string_arg,
};
use crate::object::Heap;
use crate::table::Table;
use crate::value::Value;

/// Install `print`, `type`, `include`, and `clock` into the outermost
/// environment's table.
pub fn define_core(heap: &mut Heap, table: &mut Table) {
    define_native_fn(heap, table, "print", print_native);
    define_native_fn(heap, table, "type", type_native);
    define_native_fn(heap, table, "include", include_native);
    define_native_fn(heap, table, "clock", clock_native);
}

fn print_native(ctx: &mut NativeCtx, line: u16, args: &[Value]) -> Result<Value> {
    check_arity("print", line, 1, args)?;
    let text = args[0].to_print_string(ctx.heap);
    let _ = writeln!(ctx.out, "{}", text);
    Ok(Value::Null)
}

fn type_native(ctx: &mut NativeCtx, line: u16, args: &[Value]) -> Result<Value> {
    check_arity("type", line, 1, args)?;
    let name = args[0].type_name(ctx.heap);
    Ok(Value::Obj(ctx.heap.intern(name)))
}

/// `include(name)`: install a host module into the outermost environment.
/// Unknown module names are ignored.
fn include_native(ctx: &mut NativeCtx, line: u16, args: &[Value]) -> Result<Value> {
    check_arity("include", line, 1, args)?;
    let name = string_arg(ctx, "include", line, args, 0)?;

    let methods: &[(&str, NativeFn)] = match name.as_str() {
        "math" => math::METHODS,
        "os" => os::METHODS,
        "random" => random::METHODS,
        "list" => list::METHODS,
        _ => return Ok(Value::Null),
    };

    define_module(ctx.heap, ctx.natives, &name, methods);
    Ok(Value::Null)
}

fn clock_native(_ctx: &mut NativeCtx, _line: u16, _args: &[Value]) -> Result<Value> {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    Ok(Value::Number(seconds))
}
