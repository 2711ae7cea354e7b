//! The `list` module: operations on list values (and `join` on strings).

use crate::error::Result;
use crate::natives::{NativeCtx, NativeFn, check_arity, list_arg, native_error};
use crate::object::Obj;
use crate::value::Value;

pub const METHODS: &[(&str, NativeFn)] = &[
    ("append", append_native),
    ("remove", remove_native),
    ("count", count_native),
    ("join", join_native),
];

fn append_native(ctx: &mut NativeCtx, line: u16, args: &[Value]) -> Result<Value> {
    check_arity("append", line, 2, args)?;
    let list = list_arg(ctx, "append", line, args, 0)?;
    ctx.heap.list_mut(list).items.push(args[1]);
    Ok(Value::Null)
}

fn remove_native(ctx: &mut NativeCtx, line: u16, args: &[Value]) -> Result<Value> {
    check_arity("remove", line, 2, args)?;
    let list = list_arg(ctx, "remove", line, args, 0)?;
    let index = match args[1] {
        Value::Number(n) if n >= 0.0 && n.fract() == 0.0 => n as usize,
        _ => {
            return Err(native_error(
                line,
                "'remove' expected a non-negative integer index.",
            ));
        }
    };

    let items = &mut ctx.heap.list_mut(list).items;
    if index >= items.len() {
        return Err(native_error(
            line,
            format!("'remove' index {} is out of range.", index),
        ));
    }
    items.remove(index);
    Ok(Value::Null)
}

fn count_native(ctx: &mut NativeCtx, line: u16, args: &[Value]) -> Result<Value> {
    check_arity("count", line, 1, args)?;
    let list = list_arg(ctx, "count", line, args, 0)?;
    Ok(Value::Number(ctx.heap.list(list).items.len() as f64))
}

/// `join(a, b)`: concatenate two strings, or extend list `a` with the
/// items of list `b` (returning `a`).
fn join_native(ctx: &mut NativeCtx, line: u16, args: &[Value]) -> Result<Value> {
    check_arity("join", line, 2, args)?;

    if let (Some(Value::Obj(a)), Some(Value::Obj(b))) = (args.first(), args.get(1))
        && let (Obj::String(a), Obj::String(b)) = (ctx.heap.get(*a), ctx.heap.get(*b))
    {
        let joined = format!("{}{}", a.chars, b.chars);
        return Ok(Value::Obj(ctx.heap.intern(&joined)));
    }

    let a = list_arg(ctx, "join", line, args, 0)?;
    let b = list_arg(ctx, "join", line, args, 1)?;
    let tail = ctx.heap.list(b).items.clone();
    ctx.heap.list_mut(a).items.extend(tail);
    Ok(Value::Obj(a))
}
