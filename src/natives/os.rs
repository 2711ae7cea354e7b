//! The `os` module: file access and wall-clock time.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Result;
use crate::natives::{NativeCtx, NativeFn, check_arity, native_error, string_arg};
use crate::value::Value;

pub const METHODS: &[(&str, NativeFn)] = &[
    ("fileRead", file_read_native),
    ("fileWrite", file_write_native),
    ("fileExists", file_exists_native),
    ("time", time_native),
];

fn file_read_native(ctx: &mut NativeCtx, line: u16, args: &[Value]) -> Result<Value> {
    check_arity("fileRead", line, 1, args)?;
    let path = string_arg(ctx, "fileRead", line, args, 0)?;

    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(Value::Obj(ctx.heap.intern(&content))),
        Err(_) => Err(native_error(
            line,
            format!("Could not read file '{}'.", path),
        )),
    }
}

fn file_write_native(ctx: &mut NativeCtx, line: u16, args: &[Value]) -> Result<Value> {
    check_arity("fileWrite", line, 2, args)?;
    let path = string_arg(ctx, "fileWrite", line, args, 0)?;
    let content = args[1].to_coerced_string(ctx.heap);

    match std::fs::write(&path, content) {
        Ok(()) => Ok(Value::Null),
        Err(_) => Err(native_error(
            line,
            format!("Could not write file '{}'.", path),
        )),
    }
}

fn file_exists_native(ctx: &mut NativeCtx, line: u16, args: &[Value]) -> Result<Value> {
    check_arity("fileExists", line, 1, args)?;
    let path = string_arg(ctx, "fileExists", line, args, 0)?;
    Ok(Value::Bool(std::path::Path::new(&path).exists()))
}

fn time_native(_ctx: &mut NativeCtx, line: u16, args: &[Value]) -> Result<Value> {
    check_arity("time", line, 0, args)?;
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    Ok(Value::Number(seconds))
}
