//! The `random` module. State lives in the VM's RNG, reachable through
//! the native context.

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::error::Result;
use crate::natives::{NativeCtx, NativeFn, check_arity, native_error, number_arg};
use crate::value::Value;

pub const METHODS: &[(&str, NativeFn)] = &[
    ("seed", seed_native),
    ("integer", integer_native),
    ("integerBetween", integer_between_native),
    ("float", float_native),
    ("chance", chance_native),
];

fn seed_native(ctx: &mut NativeCtx, line: u16, args: &[Value]) -> Result<Value> {
    check_arity("seed", line, 1, args)?;
    let seed = number_arg("seed", line, args, 0)?;
    *ctx.rng = StdRng::seed_from_u64(seed as u64);
    Ok(Value::Null)
}

fn integer_native(ctx: &mut NativeCtx, line: u16, args: &[Value]) -> Result<Value> {
    check_arity("integer", line, 0, args)?;
    Ok(Value::Number(ctx.rng.gen_range(0..=i32::MAX) as f64))
}

fn integer_between_native(ctx: &mut NativeCtx, line: u16, args: &[Value]) -> Result<Value> {
    check_arity("integerBetween", line, 2, args)?;
    let min = number_arg("integerBetween", line, args, 0)? as i64;
    let max = number_arg("integerBetween", line, args, 1)? as i64;
    if min > max {
        return Err(native_error(
            line,
            format!("'integerBetween' range is empty: {} > {}.", min, max),
        ));
    }
    Ok(Value::Number(ctx.rng.gen_range(min..=max) as f64))
}

fn float_native(ctx: &mut NativeCtx, line: u16, args: &[Value]) -> Result<Value> {
    check_arity("float", line, 0, args)?;
    Ok(Value::Number(ctx.rng.r#gen::<f64>()))
}

/// `chance(p)`: true with probability `p`, where `p` is in `0..=1`.
fn chance_native(ctx: &mut NativeCtx, line: u16, args: &[Value]) -> Result<Value> {
    check_arity("chance", line, 1, args)?;
    let p = number_arg("chance", line, args, 0)?;
    if !(0.0..=1.0).contains(&p) {
        return Err(native_error(
            line,
            format!(
                "'chance' probability {} is outside the 0-1 range. Use 0 for never and 1 for always.",
                p
            ),
        ));
    }
    Ok(Value::Bool(ctx.rng.r#gen::<f64>() < p))
}
