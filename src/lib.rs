//! Kestrel — an embeddable scripting language.
//!
//! Kestrel is a small, dynamically-typed imperative language with
//! first-class functions, classes with single inheritance, lists, and a
//! handful of host modules. Source code is scanned, parsed into a syntax
//! tree, lowered to bytecode, and executed on a stack-based virtual
//! machine with a precise mark-sweep garbage collector.
//!
//! # Quick Start
//!
//! ```
//! use kestrel::Vm;
//!
//! let mut vm = Vm::new();
//! vm.capture_output();
//!
//! vm.run_source(r#"
//!     function fib(n) {
//!         if (n < 2) return n;
//!         return fib(n - 1) + fib(n - 2);
//!     }
//!     print(fib(10));
//! "#).unwrap();
//!
//! assert_eq!(vm.take_output(), "55\n");
//! ```
//!
//! # The Language
//!
//! ## Values
//! - `null`, booleans, IEEE-754 numbers, interned strings
//! - lists: `[1, 2, 3]` with `xs[i]` subscripting
//! - functions, classes, instances, bound methods
//!
//! ## Statements
//! - `var x = expr;` declarations, block scopes
//! - `if`/`else`, `while`, `for`, `switch`/`case`/`default`
//! - `break` and `continue`
//! - `function name(params) { ... }`
//! - `class Name : Parent { init(...) { ... } method(...) { ... } }`
//!
//! ## Expressions
//! - arithmetic, comparison, `&&`/`||` (or `and`/`or`), `!`
//! - ternary `cond ? a : b`
//! - compound assignment `+=` `-=` `*=` `/=`, postfix `++`/`--`
//! - `this`, `base.method(...)`, property access, calls
//! - `+` concatenates when either operand is a string
//!
//! ## Host modules
//! - `include("math")`, `include("os")`, `include("random")`,
//!   `include("list")` install module instances with native methods
//! - `print`, `type`, `include`, and `clock` are always available
//!
//! # Embedding
//!
//! A [`Vm`] is fully self-contained; several can coexist in one process.
//! Native functions are plain function pointers following the
//! [`natives::NativeFn`] ABI and can be registered with
//! [`Vm::define_native`]. Exit-code semantics for a command-line embedder
//! live in [`Vm::interpret`]: 0 for success, 65 for compile errors, 70
//! for runtime errors.

pub mod ast;
pub mod chunk;
pub mod debug;
pub mod emitter;
pub mod env;
pub mod error;
pub mod gc;
pub mod natives;
pub mod object;
pub mod parser;
pub mod scanner;
pub mod table;
pub mod value;
pub mod vm;

pub use error::{EXIT_COMPILE_ERROR, EXIT_RUNTIME_ERROR, Error, Result};
pub use object::{Heap, Obj, ObjRef};
pub use value::Value;
pub use vm::Vm;
