//! Stack-based bytecode virtual machine.
//!
//! The VM owns all runtime state: the value stack, the call-frame stack,
//! the environment chain, the heap, the RNG backing the `random` module,
//! and the output sink `print` writes to. One `Vm` can run any number of
//! sources; globals persist between runs, which is what the REPL leans on.
//!
//! Dispatch is a plain fetch-decode-execute loop. Runtime errors build a
//! stack trace (innermost frame first), reset the machine, and unwind to
//! the embedder as [`Error::Runtime`]. Garbage collection runs inside the
//! VM's allocation helpers when the heap's byte threshold is crossed; the
//! roots are the value stack, every environment table, the call frames,
//! and the interned `init`/`this` names.

use std::io::{self, Write};

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::chunk::OpCode;
use crate::emitter;
use crate::env::{AssignError, EnvSnapshot, EnvStack};
use crate::error::{Error, Result};
use crate::natives::{self, NativeCtx, NativeFn};
use crate::object::{FunctionKind, Heap, Obj, ObjBoundMethod, ObjInstance, ObjList, ObjRef};
use crate::table::Table;
use crate::value::Value;

pub const FRAMES_MAX: usize = 64;
pub const STACK_MAX: usize = FRAMES_MAX * 256;

/// One active function call.
struct CallFrame {
    function: ObjRef,
    /// Index of the next byte to execute in the function's chunk.
    ip: usize,
    /// The value-stack slot holding the callee (or the receiver); the
    /// stack is truncated back to here on return.
    base: usize,
    /// `this`, for method and initializer frames.
    receiver: Option<ObjRef>,
    /// The class that defines the executing method; anchors `base`.
    method_class: Option<ObjRef>,
    /// Environment-chain restore point for the return.
    env: EnvSnapshot,
}

/// Where `print` output goes.
enum Output {
    Stdout(io::Stdout),
    Capture(Vec<u8>),
}

impl Output {
    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Output::Stdout(out) => out,
            Output::Capture(buffer) => buffer,
        }
    }
}

pub struct Vm {
    heap: Heap,
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    envs: EnvStack,
    /// The script-global environment; function bodies chain to it.
    globals_env: usize,
    /// Restore point after a runtime error: natives + globals only.
    base_env: EnvSnapshot,
    rng: StdRng,
    output: Output,
    init_string: ObjRef,
    this_string: ObjRef,
}

impl Vm {
    /// Initialize a fresh interpreter: empty heap, bootstrapped natives
    /// (`print`, `type`, `include`, `clock`) in the outermost environment,
    /// and an empty global scope above it.
    pub fn new() -> Vm {
        let mut heap = Heap::new();
        let mut envs = EnvStack::new();

        let init_string = heap.intern("init");
        let this_string = heap.intern("this");

        natives::core::define_core(&mut heap, envs.native_table_mut());
        let globals_env = envs.push(0);
        let base_env = envs.current_snapshot();

        Vm {
            heap,
            stack: Vec::with_capacity(256),
            frames: Vec::with_capacity(FRAMES_MAX),
            envs,
            globals_env,
            base_env,
            rng: StdRng::from_entropy(),
            output: Output::Stdout(io::stdout()),
            init_string,
            this_string,
        }
    }

    /// Redirect `print` into an in-memory buffer, drained by
    /// [`Vm::take_output`].
    pub fn capture_output(&mut self) {
        self.output = Output::Capture(Vec::new());
    }

    /// Take everything printed since the last call. Empty for a VM still
    /// writing to stdout.
    pub fn take_output(&mut self) -> String {
        match &mut self.output {
            Output::Stdout(_) => String::new(),
            Output::Capture(buffer) => {
                String::from_utf8_lossy(&std::mem::take(buffer)).into_owned()
            }
        }
    }

    /// Register an extra native function in the outermost environment.
    pub fn define_native(&mut self, name: &str, function: NativeFn) {
        natives::define_native_fn(&mut self.heap, self.envs.native_table_mut(), name, function);
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Compile and run `source`, mapping the outcome to a process exit
    /// code: 0 on success (or the script's numeric result), 65 for
    /// compile errors, 70 for runtime errors. Errors are printed to
    /// stderr.
    pub fn interpret(&mut self, source: &str) -> i32 {
        match self.run_source(source) {
            Ok(Value::Number(n)) => n as i32,
            Ok(_) => 0,
            Err(error) => {
                eprintln!("{}", error);
                error.exit_code()
            }
        }
    }

    /// Compile and run `source`, returning the script's result value.
    pub fn run_source(&mut self, source: &str) -> Result<Value> {
        let script = emitter::compile(source, &mut self.heap)?;

        self.push(Value::Obj(script))?;
        self.frames.push(CallFrame {
            function: script,
            ip: 0,
            base: self.stack.len() - 1,
            receiver: None,
            method_class: None,
            env: self.envs.current_snapshot(),
        });

        self.run()
    }

    // -----------------------------------------------------------------------
    // Stack primitives (also the embedder API for natives)
    // -----------------------------------------------------------------------

    pub fn push(&mut self, value: Value) -> Result<()> {
        if self.stack.len() >= STACK_MAX {
            return Err(self.runtime_error("Stack overflow."));
        }
        self.stack.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> Value {
        self.stack.pop().unwrap_or(Value::Null)
    }

    fn peek(&self, distance: usize) -> Value {
        self.stack
            .len()
            .checked_sub(1 + distance)
            .and_then(|i| self.stack.get(i).copied())
            .unwrap_or(Value::Null)
    }

    // -----------------------------------------------------------------------
    // Allocation: every VM-side allocation may trigger a collection
    // -----------------------------------------------------------------------

    fn alloc(&mut self, obj: Obj) -> ObjRef {
        if self.heap.should_collect() {
            self.collect_garbage();
        }
        self.heap.alloc(obj)
    }

    fn intern(&mut self, chars: &str) -> ObjRef {
        if self.heap.should_collect() {
            self.collect_garbage();
        }
        self.heap.intern(chars)
    }

    /// Mark the roots, then let the heap trace and sweep.
    fn collect_garbage(&mut self) {
        for value in &self.stack {
            self.heap.mark_value(*value);
        }
        for frame in &self.frames {
            self.heap.mark_object(frame.function);
            if let Some(receiver) = frame.receiver {
                self.heap.mark_object(receiver);
            }
            if let Some(class) = frame.method_class {
                self.heap.mark_object(class);
            }
        }
        for table in self.envs.tables() {
            self.heap.mark_table(table);
        }
        self.heap.mark_object(self.init_string);
        self.heap.mark_object(self.this_string);

        self.heap.trace_references();
        self.heap.remove_white_strings();
        self.heap.sweep();
    }

    // -----------------------------------------------------------------------
    // Errors
    // -----------------------------------------------------------------------

    /// Build a runtime error with a stack trace and reset the machine so
    /// the embedder can keep using it.
    fn runtime_error(&mut self, message: impl Into<String>) -> Error {
        let mut text = message.into();

        for frame in self.frames.iter().rev() {
            let function = self.heap.function(frame.function);
            let instruction = frame.ip.saturating_sub(1);
            let line = function.chunk.lines.get(instruction).copied().unwrap_or(0);
            match function.name {
                Some(name) => {
                    text.push_str(&format!(
                        "\n[line {}] in {}()",
                        line,
                        self.heap.string(name).chars
                    ));
                }
                None => text.push_str(&format!("\n[line {}] in script", line)),
            }
        }

        self.stack.clear();
        self.frames.clear();
        self.envs.restore(self.base_env);

        Error::Runtime(text)
    }

    fn name_text(&self, name: ObjRef) -> String {
        self.heap.string(name).chars.clone()
    }

    // -----------------------------------------------------------------------
    // Instruction decoding
    // -----------------------------------------------------------------------

    fn read_byte(&mut self) -> u8 {
        let frame = self.frames.last_mut().expect("no active frame");
        let byte = self.heap.function(frame.function).chunk.code[frame.ip];
        frame.ip += 1;
        byte
    }

    fn read_short(&mut self) -> u16 {
        let high = self.read_byte() as u16;
        let low = self.read_byte() as u16;
        (high << 8) | low
    }

    fn read_constant(&mut self) -> Value {
        let index = self.read_byte() as usize;
        let frame = self.frames.last().expect("no active frame");
        self.heap.function(frame.function).chunk.constants[index]
    }

    /// Read a constant the emitter guarantees to be an interned string.
    fn read_string_constant(&mut self) -> ObjRef {
        match self.read_constant() {
            Value::Obj(r) => r,
            other => panic!("expected string constant, found {:?}", other),
        }
    }

    /// Source line of the instruction that starts `operand_bytes + 1`
    /// bytes before the current ip.
    fn current_line(&self, operand_bytes: usize) -> u16 {
        let frame = self.frames.last().expect("no active frame");
        let offset = frame.ip.saturating_sub(operand_bytes + 1);
        self.heap
            .function(frame.function)
            .chunk
            .lines
            .get(offset)
            .copied()
            .unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // The dispatch loop
    // -----------------------------------------------------------------------

    fn run(&mut self) -> Result<Value> {
        loop {
            #[cfg(feature = "trace")]
            {
                let frame = self.frames.last().expect("no active frame");
                let chunk = &self.heap.function(frame.function).chunk;
                let mut dump = String::from("          ");
                for value in &self.stack {
                    dump.push_str(&format!("[ {} ]", value.to_print_string(&self.heap)));
                }
                eprintln!("{}", dump);
                eprintln!(
                    "{}",
                    crate::debug::disassemble_instruction(&self.heap, chunk, frame.ip)
                );
            }

            let byte = self.read_byte();
            let op = OpCode::from_byte(byte)
                .unwrap_or_else(|| panic!("undecodable opcode {}", byte));

            match op {
                // --- Literals ---
                OpCode::Constant => {
                    let value = self.read_constant();
                    self.push(value)?;
                }
                OpCode::Null => self.push(Value::Null)?,
                OpCode::True => self.push(Value::Bool(true))?,
                OpCode::False => self.push(Value::Bool(false))?,

                // --- Stack ---
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::PopN => {
                    let n = self.read_byte();
                    for _ in 0..n {
                        self.pop();
                    }
                }

                // --- Unary ---
                OpCode::Negate => {
                    match self.peek(0) {
                        Value::Number(n) => {
                            self.pop();
                            self.push(Value::Number(-n))?;
                        }
                        _ => return Err(self.runtime_error("Operand must be a number.")),
                    }
                }
                OpCode::Not => {
                    let value = self.pop();
                    self.push(Value::Bool(value.is_falsey()))?;
                }

                // --- Arithmetic ---
                OpCode::Add => {
                    let (a, b) = (self.peek(1), self.peek(0));
                    if a.is_string(&self.heap) || b.is_string(&self.heap) {
                        // Stringify before popping: the interning below
                        // may collect, and the operands' slots are their
                        // roots.
                        let joined =
                            a.to_coerced_string(&self.heap) + &b.to_coerced_string(&self.heap);
                        let result = self.intern(&joined);
                        self.pop();
                        self.pop();
                        self.push(Value::Obj(result))?;
                    } else if let (Value::Number(a), Value::Number(b)) = (a, b) {
                        self.pop();
                        self.pop();
                        self.push(Value::Number(a + b))?;
                    } else {
                        return Err(self.runtime_error(
                            "Operands must be either two numbers or two strings.",
                        ));
                    }
                }
                OpCode::Subtract => {
                    let (a, b) = self.pop_numbers()?;
                    self.push(Value::Number(a - b))?;
                }
                OpCode::Multiply => {
                    let (a, b) = self.pop_numbers()?;
                    self.push(Value::Number(a * b))?;
                }
                OpCode::Divide => {
                    // Division by zero follows IEEE-754: inf/nan, not an
                    // error.
                    let (a, b) = self.pop_numbers()?;
                    self.push(Value::Number(a / b))?;
                }

                // --- Comparison ---
                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a == b))?;
                }
                OpCode::NotEqual => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a != b))?;
                }
                OpCode::SwitchEqual => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(a)?;
                    self.push(Value::Bool(a == b))?;
                }
                OpCode::Greater => {
                    let (a, b) = self.pop_numbers()?;
                    self.push(Value::Bool(a > b))?;
                }
                OpCode::GreaterEqual => {
                    let (a, b) = self.pop_numbers()?;
                    self.push(Value::Bool(a >= b))?;
                }
                OpCode::Less => {
                    let (a, b) = self.pop_numbers()?;
                    self.push(Value::Bool(a < b))?;
                }
                OpCode::LessEqual => {
                    let (a, b) = self.pop_numbers()?;
                    self.push(Value::Bool(a <= b))?;
                }

                // --- Control flow ---
                OpCode::Jump => {
                    let offset = self.read_short() as usize;
                    self.frames.last_mut().expect("no active frame").ip += offset;
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_short() as usize;
                    if self.peek(0).is_falsey() {
                        self.frames.last_mut().expect("no active frame").ip += offset;
                    }
                }
                OpCode::JumpIfTrue => {
                    let offset = self.read_short() as usize;
                    if !self.peek(0).is_falsey() {
                        self.frames.last_mut().expect("no active frame").ip += offset;
                    }
                }
                OpCode::Loop => {
                    let offset = self.read_short() as usize;
                    self.frames.last_mut().expect("no active frame").ip -= offset;
                }
                OpCode::Ternary => {
                    let else_branch = self.pop();
                    let then_branch = self.pop();
                    let condition = self.pop();
                    self.push(if condition.is_falsey() {
                        else_branch
                    } else {
                        then_branch
                    })?;
                }

                // --- Scopes ---
                OpCode::ScopeStart => self.envs.begin_scope(),
                OpCode::ScopeEnd => self.envs.end_scope(),

                // --- Variables ---
                OpCode::DefineVariable => {
                    let name = self.read_string_constant();
                    let value = self.peek(0);
                    if !self.envs.define(&self.heap, name, value) {
                        let text = self.name_text(name);
                        return Err(self.runtime_error(format!(
                            "Tried to redefine variable '{}'.",
                            text
                        )));
                    }
                    self.pop();
                }
                OpCode::DefineArgument => {
                    let name = self.read_string_constant();
                    let value = self.pop();
                    if !self.envs.define(&self.heap, name, value) {
                        let text = self.name_text(name);
                        return Err(self.runtime_error(format!(
                            "Tried to redefine variable '{}'.",
                            text
                        )));
                    }
                }
                OpCode::GetVariable => {
                    let name = self.read_string_constant();
                    match self.envs.get(&self.heap, name) {
                        Some(value) => self.push(value)?,
                        None => {
                            let text = self.name_text(name);
                            return Err(self
                                .runtime_error(format!("Undefined variable '{}'.", text)));
                        }
                    }
                }
                OpCode::SetVariable => {
                    let name = self.read_string_constant();
                    let value = self.peek(0);
                    match self.envs.assign(&self.heap, name, value) {
                        Ok(()) => {}
                        Err(AssignError::Undefined) => {
                            let text = self.name_text(name);
                            return Err(self
                                .runtime_error(format!("Undefined variable '{}'.", text)));
                        }
                        Err(AssignError::Function) => {
                            return Err(self.runtime_error(
                                "Changing the value of a function is illegal.",
                            ));
                        }
                    }
                }

                // --- Calls and returns ---
                OpCode::Call => {
                    let argc = self.read_byte() as usize;
                    let line = self.current_line(1);
                    let callee = self.peek(argc);
                    self.call_value(callee, argc, line)?;
                }
                OpCode::Return => {
                    let mut result = self.pop();
                    let frame = self.frames.pop().expect("return without a frame");

                    // An initializer always hands back the new instance.
                    if self.heap.function(frame.function).kind == FunctionKind::Initializer {
                        result = Value::Obj(
                            frame.receiver.expect("initializer frame without receiver"),
                        );
                    }

                    self.envs.restore(frame.env);
                    self.stack.truncate(frame.base);

                    if self.frames.is_empty() {
                        return Ok(result);
                    }
                    self.push(result)?;
                }

                // --- Definitions ---
                OpCode::DefineFunction => {
                    let value = self.pop();
                    let function = match value {
                        Value::Obj(r) => r,
                        _ => panic!("define_function on a non-function"),
                    };
                    let name = self
                        .heap
                        .function(function)
                        .name
                        .expect("function definition without a name");
                    if !self.envs.define(&self.heap, name, value) {
                        let text = self.name_text(name);
                        return Err(self.runtime_error(format!(
                            "Tried to redefine variable '{}'.",
                            text
                        )));
                    }
                }
                OpCode::DefineMethod => {
                    let method = self.pop();
                    let function = match method {
                        Value::Obj(r) => r,
                        _ => panic!("define_method on a non-function"),
                    };
                    let class = match self.peek(0) {
                        Value::Obj(r) if matches!(self.heap.get(r), Obj::Class(_)) => r,
                        _ => panic!("define_method without a class under construction"),
                    };
                    let name = self
                        .heap
                        .function(function)
                        .name
                        .expect("method without a name");
                    let hash = self.heap.str_hash(name);
                    self.heap.class_mut(class).methods.set(name, hash, method);
                }
                OpCode::DefineClass => {
                    let value = self.peek(0);
                    let class = match value {
                        Value::Obj(r) if matches!(self.heap.get(r), Obj::Class(_)) => r,
                        _ => panic!("define_class on a non-class"),
                    };
                    let name = self.heap.class(class).name;
                    if !self.envs.define(&self.heap, name, value) {
                        let text = self.name_text(name);
                        return Err(self.runtime_error(format!(
                            "Tried to redefine variable '{}'.",
                            text
                        )));
                    }
                }
                OpCode::Inherit => {
                    let parent = self.pop();
                    let class = self.peek(0);
                    match (class, parent) {
                        (Value::Obj(c), Value::Obj(p))
                            if matches!(self.heap.get(c), Obj::Class(_))
                                && matches!(self.heap.get(p), Obj::Class(_)) =>
                        {
                            self.heap.class_mut(c).parent = Some(p);
                        }
                        _ => {
                            return Err(
                                self.runtime_error("Parent of a class must be a class.")
                            );
                        }
                    }
                }

                // --- Properties ---
                OpCode::GetProperty => {
                    let name = self.read_string_constant();
                    let target = self.peek(0);

                    let instance = match target {
                        Value::Obj(r) if matches!(self.heap.get(r), Obj::Instance(_)) => r,
                        _ => {
                            return Err(
                                self.runtime_error("Only instances have properties.")
                            );
                        }
                    };

                    let hash = self.heap.str_hash(name);
                    if let Some(value) = self.heap.instance(instance).fields.get(name, hash) {
                        self.pop();
                        self.push(value)?;
                    } else {
                        let class = self.heap.instance(instance).class;
                        match self.heap.find_method(class, name) {
                            Some((Value::Obj(method), _)) => {
                                // The instance stays on the stack while the
                                // bound method is allocated.
                                let bound = self.alloc(Obj::BoundMethod(ObjBoundMethod {
                                    receiver: instance,
                                    method,
                                }));
                                self.pop();
                                self.push(Value::Obj(bound))?;
                            }
                            _ => {
                                let text = self.name_text(name);
                                return Err(self.runtime_error(format!(
                                    "Undefined property '{}'.",
                                    text
                                )));
                            }
                        }
                    }
                }
                OpCode::SetProperty => {
                    let name = self.read_string_constant();
                    let value = self.peek(0);
                    let target = self.peek(1);

                    let instance = match target {
                        Value::Obj(r) if matches!(self.heap.get(r), Obj::Instance(_)) => r,
                        _ => {
                            return Err(self.runtime_error("Only instances have fields."));
                        }
                    };

                    let hash = self.heap.str_hash(name);
                    self.heap
                        .instance_mut(instance)
                        .fields
                        .set(name, hash, value);

                    self.pop();
                    self.pop();
                    self.push(value)?;
                }
                OpCode::Invoke => {
                    let name = self.read_string_constant();
                    let argc = self.read_byte() as usize;
                    let line = self.current_line(2);
                    self.invoke(name, argc, line)?;
                }
                OpCode::GetBase => {
                    let name = self.read_string_constant();
                    let frame = self.frames.last().expect("no active frame");

                    let (Some(method_class), Some(receiver)) =
                        (frame.method_class, frame.receiver)
                    else {
                        return Err(
                            self.runtime_error("Can't use 'base' outside of a method.")
                        );
                    };
                    let Some(parent) = self.heap.class(method_class).parent else {
                        return Err(self.runtime_error("Class has no parent class."));
                    };

                    match self.heap.find_method(parent, name) {
                        Some((Value::Obj(method), _)) => {
                            let bound = self.alloc(Obj::BoundMethod(ObjBoundMethod {
                                receiver,
                                method,
                            }));
                            self.push(Value::Obj(bound))?;
                        }
                        _ => {
                            let text = self.name_text(name);
                            return Err(self
                                .runtime_error(format!("Undefined property '{}'.", text)));
                        }
                    }
                }

                // --- Lists ---
                OpCode::BuildList => {
                    let count = match self.read_constant() {
                        Value::Number(n) => n as usize,
                        other => panic!("build_list count is {:?}", other),
                    };
                    let start = self.stack.len() - count;
                    let items = self.stack[start..].to_vec();
                    // The items stay on the stack during allocation.
                    let list = self.alloc(Obj::List(ObjList { items }));
                    self.stack.truncate(start);
                    self.push(Value::Obj(list))?;
                }
                OpCode::ListGet => {
                    let index = self.pop();
                    let target = self.pop();
                    let value = self.subscript_get(target, index)?;
                    self.push(value)?;
                }
                OpCode::ListStore => {
                    let value = self.pop();
                    let index = self.pop();
                    let target = self.pop();

                    let list = match target {
                        Value::Obj(r) if matches!(self.heap.get(r), Obj::List(_)) => r,
                        _ => {
                            return Err(
                                self.runtime_error("Can only assign into list elements.")
                            );
                        }
                    };
                    let len = self.heap.list(list).items.len();
                    let index = self.list_index_of(index, len)?;
                    self.heap.list_mut(list).items[index] = value;
                    self.push(value)?;
                }
            }
        }
    }

    fn pop_numbers(&mut self) -> Result<(f64, f64)> {
        match (self.peek(1), self.peek(0)) {
            (Value::Number(a), Value::Number(b)) => {
                self.pop();
                self.pop();
                Ok((a, b))
            }
            _ => Err(self.runtime_error("Both operands must be numbers.")),
        }
    }

    // -----------------------------------------------------------------------
    // Calls
    // -----------------------------------------------------------------------

    fn call_value(&mut self, callee: Value, argc: usize, line: u16) -> Result<()> {
        if let Value::Obj(r) = callee {
            match self.heap.get(r) {
                Obj::Function(_) => {
                    return self.call_function(r, argc, None, None);
                }
                Obj::Native(native) => {
                    let function = native.function;
                    return self.call_native(function, argc, line);
                }
                Obj::Class(_) => {
                    return self.call_class(r, argc);
                }
                Obj::BoundMethod(bound) => {
                    let receiver = bound.receiver;
                    let method = bound.method;
                    let base = self.stack.len() - argc - 1;
                    self.stack[base] = Value::Obj(receiver);
                    return match self.heap.get(method) {
                        Obj::Native(native) => {
                            let function = native.function;
                            self.call_native(function, argc, line)
                        }
                        _ => {
                            let defining = self.defining_class_of(receiver, method);
                            self.call_function(method, argc, Some(receiver), defining)
                        }
                    };
                }
                _ => {}
            }
        }
        Err(self.runtime_error("Can only call functions and classes."))
    }

    /// Push a frame for a user function. The callee (or receiver) sits
    /// `argc` slots below the stack top and becomes the frame's base; the
    /// function's `define_argument` prologue pops the arguments into the
    /// fresh call environment.
    fn call_function(
        &mut self,
        function: ObjRef,
        argc: usize,
        receiver: Option<ObjRef>,
        method_class: Option<ObjRef>,
    ) -> Result<()> {
        let arity = self.heap.function(function).arity as usize;
        if argc != arity {
            return Err(self.runtime_error(format!(
                "Expected {} arguments but got {}.",
                arity, argc
            )));
        }
        if self.frames.len() == FRAMES_MAX {
            return Err(self.runtime_error("Stack overflow."));
        }

        let env = self.envs.enter_call(self.globals_env);
        if let Some(receiver) = receiver {
            self.envs
                .define(&self.heap, self.this_string, Value::Obj(receiver));
        }

        self.frames.push(CallFrame {
            function,
            ip: 0,
            base: self.stack.len() - argc - 1,
            receiver,
            method_class,
            env,
        });
        Ok(())
    }

    /// Run a native in place: the callee and arguments are replaced by
    /// the returned value, and no frame is pushed.
    fn call_native(&mut self, function: NativeFn, argc: usize, line: u16) -> Result<()> {
        let start = self.stack.len() - argc;
        let args: Vec<Value> = self.stack[start..].to_vec();

        let result = {
            let mut ctx = NativeCtx {
                heap: &mut self.heap,
                out: self.output.writer(),
                natives: self.envs.native_table_mut(),
                rng: &mut self.rng,
            };
            function(&mut ctx, line, &args)
        };

        match result {
            Ok(value) => {
                self.stack.truncate(start - 1);
                self.push(value)
            }
            Err(Error::Runtime(message)) => Err(self.runtime_error(message)),
            Err(other) => Err(other),
        }
    }

    /// Calling a class constructs an instance and runs `init` if the
    /// class (chain) has one.
    fn call_class(&mut self, class: ObjRef, argc: usize) -> Result<()> {
        let base = self.stack.len() - argc - 1;
        let instance = self.alloc(Obj::Instance(ObjInstance {
            class,
            fields: Table::new(),
        }));
        self.stack[base] = Value::Obj(instance);

        match self.heap.find_method(class, self.init_string) {
            Some((Value::Obj(init), defining))
                if matches!(self.heap.get(init), Obj::Function(_)) =>
            {
                self.call_function(init, argc, Some(instance), Some(defining))
            }
            Some(_) => Err(self.runtime_error("Class initializer must be a function.")),
            None if argc != 0 => Err(self.runtime_error(format!(
                "Expected 0 arguments but got {}.",
                argc
            ))),
            None => Ok(()),
        }
    }

    /// Fused property access + call: looks at fields first (a callable
    /// field wins), then the method table, avoiding the bound-method
    /// allocation of `get_property` + `call`.
    fn invoke(&mut self, name: ObjRef, argc: usize, line: u16) -> Result<()> {
        let receiver = match self.peek(argc) {
            Value::Obj(r) if matches!(self.heap.get(r), Obj::Instance(_)) => r,
            _ => return Err(self.runtime_error("Only instances have methods.")),
        };

        let hash = self.heap.str_hash(name);
        if let Some(field) = self.heap.instance(receiver).fields.get(name, hash) {
            let base = self.stack.len() - argc - 1;
            self.stack[base] = field;
            return self.call_value(field, argc, line);
        }

        let class = self.heap.instance(receiver).class;
        match self.heap.find_method(class, name) {
            Some((Value::Obj(method), defining)) => match self.heap.get(method) {
                Obj::Function(_) => {
                    self.call_function(method, argc, Some(receiver), Some(defining))
                }
                Obj::Native(native) => {
                    let function = native.function;
                    self.call_native(function, argc, line)
                }
                _ => Err(self.runtime_error("Can only call functions and classes.")),
            },
            _ => {
                let text = self.name_text(name);
                Err(self.runtime_error(format!("Undefined property '{}'.", text)))
            }
        }
    }

    /// The class in the receiver's chain that defines `method`. Used to
    /// anchor `base` when a bound method is called later.
    fn defining_class_of(&self, instance: ObjRef, method: ObjRef) -> Option<ObjRef> {
        let mut current = Some(self.heap.instance(instance).class);
        while let Some(c) = current {
            let class = self.heap.class(c);
            if class.methods.iter().any(|(_, v)| v == Value::Obj(method)) {
                return Some(c);
            }
            current = class.parent;
        }
        None
    }

    // -----------------------------------------------------------------------
    // Subscripts
    // -----------------------------------------------------------------------

    fn subscript_get(&mut self, target: Value, index: Value) -> Result<Value> {
        let r = match target {
            Value::Obj(r) => r,
            _ => return Err(self.runtime_error("Can only subscript lists and strings.")),
        };

        if matches!(self.heap.get(r), Obj::List(_)) {
            let len = self.heap.list(r).items.len();
            let index = self.list_index_of(index, len)?;
            return Ok(self.heap.list(r).items[index]);
        }

        if matches!(self.heap.get(r), Obj::String(_)) {
            let len = self.heap.string(r).chars.chars().count();
            let index = self.list_index_of(index, len)?;
            let ch: String = self
                .heap
                .string(r)
                .chars
                .chars()
                .nth(index)
                .map(String::from)
                .unwrap_or_default();
            return Ok(Value::Obj(self.intern(&ch)));
        }

        Err(self.runtime_error("Can only subscript lists and strings."))
    }

    fn list_index_of(&mut self, index: Value, len: usize) -> Result<usize> {
        let n = match index {
            Value::Number(n) if n >= 0.0 && n.fract() == 0.0 => n as usize,
            Value::Number(_) => {
                return Err(self.runtime_error("Index must be a non-negative integer."));
            }
            _ => return Err(self.runtime_error("Index must be a number.")),
        };
        if n >= len {
            return Err(self.runtime_error(format!("Index {} is out of range.", n)));
        }
        Ok(n)
    }
}

impl Default for Vm {
    fn default() -> Self {
        Vm::new()
    }
}
