//! The `math` module.

use crate::error::Result;
use crate::natives::{NativeCtx, NativeFn, check_arity, number_arg};
use crate::value::Value;

pub const METHODS: &[(&str, NativeFn)] = &[
    ("abs", abs_native),
    ("round", round_native),
    ("floor", floor_native),
    ("ceil", ceil_native),
    ("sqrt", sqrt_native),
    ("exp", exp_native),
    ("sin", sin_native),
    ("cos", cos_native),
    ("tan", tan_native),
    ("asin", asin_native),
    ("acos", acos_native),
    ("atan", atan_native),
    ("atan2", atan2_native),
    ("min", min_native),
    ("max", max_native),
    ("mod", mod_native),
    ("degreesToRadians", degrees_to_radians_native),
    ("radiansToDegrees", radians_to_degrees_native),
];

macro_rules! unary_math {
    ($rust_name:ident, $name:literal, $op:expr) => {
        fn $rust_name(_ctx: &mut NativeCtx, line: u16, args: &[Value]) -> Result<Value> {
            check_arity($name, line, 1, args)?;
            let x = number_arg($name, line, args, 0)?;
            let f: fn(f64) -> f64 = $op;
            Ok(Value::Number(f(x)))
        }
    };
}

macro_rules! binary_math {
    ($rust_name:ident, $name:literal, $op:expr) => {
        fn $rust_name(_ctx: &mut NativeCtx, line: u16, args: &[Value]) -> Result<Value> {
            check_arity($name, line, 2, args)?;
            let a = number_arg($name, line, args, 0)?;
            let b = number_arg($name, line, args, 1)?;
            let f: fn(f64, f64) -> f64 = $op;
            Ok(Value::Number(f(a, b)))
        }
    };
}

unary_math!(abs_native, "abs", f64::abs);
unary_math!(round_native, "round", f64::round);
unary_math!(floor_native, "floor", f64::floor);
unary_math!(ceil_native, "ceil", f64::ceil);
unary_math!(sqrt_native, "sqrt", f64::sqrt);
unary_math!(exp_native, "exp", f64::exp);
unary_math!(sin_native, "sin", f64::sin);
unary_math!(cos_native, "cos", f64::cos);
unary_math!(tan_native, "tan", f64::tan);
unary_math!(asin_native, "asin", f64::asin);
unary_math!(acos_native, "acos", f64::acos);
unary_math!(atan_native, "atan", f64::atan);
unary_math!(degrees_to_radians_native, "degreesToRadians", f64::to_radians);
unary_math!(radians_to_degrees_native, "radiansToDegrees", f64::to_degrees);

binary_math!(atan2_native, "atan2", f64::atan2);
binary_math!(min_native, "min", f64::min);
binary_math!(max_native, "max", f64::max);
binary_math!(mod_native, "mod", |a, b| a % b);
