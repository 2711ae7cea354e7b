//! Bytecode emitter: syntax tree to chunks.
//!
//! The emitter walks the tree once, producing one chunk per function. A
//! stack of in-flight function builders mirrors the nesting of function
//! declarations; the top of the stack receives all emitted bytes. Forward
//! jumps are emitted with a `0xffff` placeholder and patched once the
//! target offset is known; `break` and `continue` jumps are collected per
//! loop and patched when the loop closes.
//!
//! In-flight functions are plain builder structs: they only become heap
//! objects when their chunk is complete, so nothing the emitter is still
//! building can ever be collected out from under it.

use crate::ast::{
    BinaryOp, Expr, ExprKind, FunctionDecl, LogicalOp, Stmt, StmtKind, UnaryOp,
};
use crate::chunk::{Chunk, OpCode};
use crate::error::{Error, Result};
use crate::object::{FunctionKind, Heap, Obj, ObjClass, ObjFunction, ObjRef};
use crate::parser;
use crate::table::Table;
use crate::value::Value;

/// Parse and lower `source`, returning the top-level script function.
pub fn compile(source: &str, heap: &mut Heap) -> Result<ObjRef> {
    let statements = parser::parse(source, heap)?;
    emit(&statements, heap)
}

/// Lower a parsed program, returning the top-level script function.
pub fn emit(statements: &[Stmt], heap: &mut Heap) -> Result<ObjRef> {
    let mut emitter = Emitter {
        heap,
        compilers: Vec::new(),
        classes: Vec::new(),
        errors: Vec::new(),
        had_error: false,
    };

    emitter.begin_function(None, 0, FunctionKind::Script);

    let mut last_line = 0;
    for stmt in statements {
        emitter.statement(stmt);
        last_line = stmt.line;
    }

    let script = emitter.end_function(true, last_line);

    if emitter.had_error {
        Err(Error::Compile(emitter.errors.join("\n")))
    } else {
        Ok(script)
    }
}

/// One in-flight function. Becomes an [`ObjFunction`] when finished.
struct FunctionState {
    name: Option<ObjRef>,
    arity: u8,
    kind: FunctionKind,
    chunk: Chunk,
    /// Innermost-last stack of loops, for break/continue patching.
    loops: Vec<LoopState>,
}

#[derive(Default)]
struct LoopState {
    breaks: Vec<usize>,
    continues: Vec<usize>,
}

/// Class context while methods compile, for `base` validation.
struct ClassState {
    has_parent: bool,
}

struct Emitter<'h> {
    heap: &'h mut Heap,
    compilers: Vec<FunctionState>,
    classes: Vec<ClassState>,
    errors: Vec<String>,
    had_error: bool,
}

impl<'h> Emitter<'h> {
    fn error(&mut self, message: &str, line: u16) {
        self.errors
            .push(format!("[line {}] Emitter Error: {}", line, message));
        self.had_error = true;
    }

    // -----------------------------------------------------------------------
    // Byte emission
    // -----------------------------------------------------------------------

    fn current(&mut self) -> &mut FunctionState {
        self.compilers.last_mut().expect("no function under emission")
    }

    fn chunk(&mut self) -> &mut Chunk {
        &mut self.current().chunk
    }

    fn emit_byte(&mut self, byte: u8, line: u16) {
        self.chunk().write(byte, line);
    }

    fn emit_op(&mut self, op: OpCode, line: u16) {
        self.chunk().write_op(op, line);
    }

    fn make_constant(&mut self, value: Value, line: u16) -> u8 {
        // Reuse an existing identical constant; string payloads are
        // interned so handle equality covers them.
        if let Some(existing) = self
            .chunk()
            .constants
            .iter()
            .position(|c| *c == value)
        {
            return existing as u8;
        }

        let index = self.chunk().add_constant(value);
        if index > u8::MAX as usize {
            self.error("Too many constants in one chunk.", line);
            return 0;
        }
        index as u8
    }

    fn emit_constant(&mut self, value: Value, line: u16) {
        let index = self.make_constant(value, line);
        self.emit_op(OpCode::Constant, line);
        self.emit_byte(index, line);
    }

    /// Emit a jump with a placeholder offset; returns the offset of the
    /// placeholder for later patching.
    fn emit_jump(&mut self, op: OpCode, line: u16) -> usize {
        self.emit_op(op, line);
        self.emit_byte(0xff, line);
        self.emit_byte(0xff, line);
        self.chunk().code.len() - 2
    }

    /// Point a previously emitted jump at the current offset.
    fn patch_jump(&mut self, offset: usize, line: u16) {
        // -2 adjusts for the operand bytes themselves.
        let jump = self.chunk().code.len() - offset - 2;

        if jump > u16::MAX as usize {
            self.error("Too much code to jump over.", line);
        }

        self.chunk().code[offset] = ((jump >> 8) & 0xff) as u8;
        self.chunk().code[offset + 1] = (jump & 0xff) as u8;
    }

    fn patch_loop_jumps(&mut self, jumps: Vec<usize>, line: u16) {
        for offset in jumps {
            self.patch_jump(offset, line);
        }
    }

    /// Emit a backward jump to `loop_start`.
    fn emit_loop(&mut self, loop_start: usize, line: u16) {
        self.emit_op(OpCode::Loop, line);

        let offset = self.chunk().code.len() + 2 - loop_start;
        if offset > u16::MAX as usize {
            self.error("Loop body too large.", line);
        }

        self.emit_byte(((offset >> 8) & 0xff) as u8, line);
        self.emit_byte((offset & 0xff) as u8, line);
    }

    // -----------------------------------------------------------------------
    // Function lifecycle
    // -----------------------------------------------------------------------

    fn begin_function(&mut self, name: Option<ObjRef>, arity: u8, kind: FunctionKind) {
        self.compilers.push(FunctionState {
            name,
            arity,
            kind,
            chunk: Chunk::new(),
            loops: Vec::new(),
        });
    }

    /// Seal the current function: append the implicit return if the body
    /// needs one, then allocate the finished function on the heap.
    fn end_function(&mut self, needs_implicit_return: bool, line: u16) -> ObjRef {
        if needs_implicit_return {
            self.emit_op(OpCode::Null, line);
            self.emit_op(OpCode::Return, line);
        }

        let state = self.compilers.pop().expect("no function under emission");
        self.heap.alloc(Obj::Function(ObjFunction {
            name: state.name,
            arity: state.arity,
            kind: state.kind,
            chunk: state.chunk,
        }))
    }

    fn function(&mut self, decl: &FunctionDecl, is_method: bool) {
        let line = decl.line;

        let kind = if !is_method {
            FunctionKind::Function
        } else if self.heap.string(decl.name).chars == "init" {
            FunctionKind::Initializer
        } else {
            FunctionKind::Method
        };

        self.begin_function(Some(decl.name), decl.params.len().min(255) as u8, kind);

        // Arguments are popped off the stack back to front.
        for param in decl.params.iter().rev() {
            let index = self.make_constant(Value::Obj(*param), line);
            self.emit_op(OpCode::DefineArgument, line);
            self.emit_byte(index, line);
        }

        for stmt in &decl.body {
            self.statement(stmt);
        }

        let ends_with_return = matches!(
            decl.body.last(),
            Some(Stmt {
                kind: StmtKind::Return { .. },
                ..
            })
        );
        let function = self.end_function(!ends_with_return, line);

        self.emit_constant(Value::Obj(function), line);
        self.emit_op(
            if is_method {
                OpCode::DefineMethod
            } else {
                OpCode::DefineFunction
            },
            line,
        );
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    fn statement(&mut self, stmt: &Stmt) {
        let line = stmt.line;

        match &stmt.kind {
            StmtKind::Expression(expr) => {
                self.expression(expr);
                self.emit_op(OpCode::Pop, line);
            }

            StmtKind::Block(statements) => {
                self.emit_op(OpCode::ScopeStart, line);
                for stmt in statements {
                    self.statement(stmt);
                }
                self.emit_op(OpCode::ScopeEnd, line);
            }

            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.expression(condition);

                let then_jump = self.emit_jump(OpCode::JumpIfFalse, line);
                self.emit_op(OpCode::Pop, line);
                self.statement(then_branch);

                let else_jump = self.emit_jump(OpCode::Jump, line);
                self.patch_jump(then_jump, line);
                self.emit_op(OpCode::Pop, line);

                if let Some(else_branch) = else_branch {
                    self.statement(else_branch);
                }
                self.patch_jump(else_jump, line);
            }

            StmtKind::While { condition, body } => {
                let loop_start = self.chunk().code.len();

                self.expression(condition);
                let exit_jump = self.emit_jump(OpCode::JumpIfFalse, line);
                self.emit_op(OpCode::Pop, line);

                self.current().loops.push(LoopState::default());
                self.statement(body);
                let state = self.current().loops.pop().expect("loop state");

                self.patch_loop_jumps(state.continues, line);
                self.emit_loop(loop_start, line);

                self.patch_jump(exit_jump, line);
                self.emit_op(OpCode::Pop, line);
                // Breaks land past the condition pop: a break leaves no
                // condition value on the stack.
                self.patch_loop_jumps(state.breaks, line);
            }

            StmtKind::For {
                initializer,
                condition,
                increment,
                body,
            } => {
                self.emit_op(OpCode::ScopeStart, line);

                if let Some(initializer) = initializer {
                    self.statement(initializer);
                }

                let loop_start = self.chunk().code.len();

                match condition {
                    Some(condition) => self.expression(condition),
                    None => self.emit_op(OpCode::True, line),
                }

                let exit_jump = self.emit_jump(OpCode::JumpIfFalse, line);
                self.emit_op(OpCode::Pop, line);

                self.current().loops.push(LoopState::default());
                self.statement(body);
                let state = self.current().loops.pop().expect("loop state");

                self.patch_loop_jumps(state.continues, line);
                if let Some(increment) = increment {
                    self.expression(increment);
                    self.emit_op(OpCode::Pop, line);
                }
                self.emit_loop(loop_start, line);

                self.patch_jump(exit_jump, line);
                self.emit_op(OpCode::Pop, line);
                self.patch_loop_jumps(state.breaks, line);

                self.emit_op(OpCode::ScopeEnd, line);
            }

            StmtKind::Switch {
                value,
                cases,
                default,
            } => {
                self.expression(value);

                let mut end_jumps = Vec::new();
                for (condition, body) in cases {
                    let line = condition.line;
                    self.expression(condition);
                    self.emit_op(OpCode::SwitchEqual, line);

                    let next_case = self.emit_jump(OpCode::JumpIfFalse, line);
                    self.emit_op(OpCode::Pop, line); // comparison result
                    self.emit_op(OpCode::Pop, line); // scrutinee
                    self.statement(body);
                    end_jumps.push(self.emit_jump(OpCode::Jump, line));

                    self.patch_jump(next_case, line);
                    self.emit_op(OpCode::Pop, line); // comparison result
                }

                // No case matched: discard the scrutinee, run the default.
                self.emit_op(OpCode::Pop, line);
                if let Some(default) = default {
                    self.statement(default);
                }

                self.patch_loop_jumps(end_jumps, line);
            }

            StmtKind::Variable { name, initializer } => {
                match initializer {
                    Some(initializer) => self.expression(initializer),
                    None => self.emit_op(OpCode::Null, line),
                }
                let index = self.make_constant(Value::Obj(*name), line);
                self.emit_op(OpCode::DefineVariable, line);
                self.emit_byte(index, line);
            }

            StmtKind::Function(decl) => {
                self.function(decl, false);
            }

            StmtKind::Class {
                name,
                parent,
                methods,
            } => {
                let class = self.heap.alloc(Obj::Class(ObjClass {
                    name: *name,
                    methods: Table::new(),
                    parent: None,
                }));
                self.emit_constant(Value::Obj(class), line);

                self.classes.push(ClassState {
                    has_parent: parent.is_some(),
                });
                for method in methods {
                    self.function(method, true);
                }
                self.classes.pop();

                self.emit_op(OpCode::DefineClass, line);

                if let Some(parent) = parent {
                    let index = self.make_constant(Value::Obj(*parent), line);
                    self.emit_op(OpCode::GetVariable, line);
                    self.emit_byte(index, line);
                    self.emit_op(OpCode::Inherit, line);
                }

                self.emit_op(OpCode::Pop, line);
            }

            StmtKind::Return { value } => {
                match self.current().kind {
                    FunctionKind::Script => {
                        self.error("Can't return from top-level code.", line);
                    }
                    FunctionKind::Initializer if value.is_some() => {
                        self.error(
                            "Can't return a value from an initializer. It always returns the new instance.",
                            line,
                        );
                    }
                    _ => {}
                }

                match value {
                    Some(value) => self.expression(value),
                    None => self.emit_op(OpCode::Null, line),
                }
                self.emit_op(OpCode::Return, line);
            }

            StmtKind::Break => {
                if self.current().loops.is_empty() {
                    self.error("Can't break from top-level code.", line);
                    return;
                }
                let jump = self.emit_jump(OpCode::Jump, line);
                self.current().loops.last_mut().expect("loop state").breaks.push(jump);
            }

            StmtKind::Continue => {
                if self.current().loops.is_empty() {
                    self.error("Can't 'continue' from top-level code.", line);
                    return;
                }
                let jump = self.emit_jump(OpCode::Jump, line);
                self.current()
                    .loops
                    .last_mut()
                    .expect("loop state")
                    .continues
                    .push(jump);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    fn expression(&mut self, expr: &Expr) {
        let line = expr.line;

        match &expr.kind {
            ExprKind::Literal(value) => match value {
                Value::Null => self.emit_op(OpCode::Null, line),
                Value::Bool(true) => self.emit_op(OpCode::True, line),
                Value::Bool(false) => self.emit_op(OpCode::False, line),
                Value::Number(_) | Value::Obj(_) => self.emit_constant(*value, line),
            },

            ExprKind::Binary { left, op, right } => {
                self.expression(left);
                self.expression(right);
                let op = match op {
                    BinaryOp::Add => OpCode::Add,
                    BinaryOp::Subtract => OpCode::Subtract,
                    BinaryOp::Multiply => OpCode::Multiply,
                    BinaryOp::Divide => OpCode::Divide,
                    BinaryOp::Equal => OpCode::Equal,
                    BinaryOp::NotEqual => OpCode::NotEqual,
                    BinaryOp::Greater => OpCode::Greater,
                    BinaryOp::GreaterEqual => OpCode::GreaterEqual,
                    BinaryOp::Less => OpCode::Less,
                    BinaryOp::LessEqual => OpCode::LessEqual,
                };
                self.emit_op(op, line);
            }

            ExprKind::Unary { op, target } => {
                self.expression(target);
                let op = match op {
                    UnaryOp::Negate => OpCode::Negate,
                    UnaryOp::Not => OpCode::Not,
                };
                self.emit_op(op, line);
            }

            ExprKind::Logical { left, op, right } => match op {
                LogicalOp::And => {
                    self.expression(left);
                    let end_jump = self.emit_jump(OpCode::JumpIfFalse, line);
                    self.emit_op(OpCode::Pop, line);
                    self.expression(right);
                    self.patch_jump(end_jump, line);
                }
                LogicalOp::Or => {
                    self.expression(left);
                    let end_jump = self.emit_jump(OpCode::JumpIfTrue, line);
                    self.emit_op(OpCode::Pop, line);
                    self.expression(right);
                    self.patch_jump(end_jump, line);
                }
            },

            ExprKind::Ternary {
                condition,
                then_branch,
                else_branch,
            } => {
                self.expression(condition);
                self.expression(then_branch);
                self.expression(else_branch);
                self.emit_op(OpCode::Ternary, line);
            }

            ExprKind::Variable { name } => {
                let index = self.make_constant(Value::Obj(*name), line);
                self.emit_op(OpCode::GetVariable, line);
                self.emit_byte(index, line);
            }

            ExprKind::Assign { name, value } => {
                self.expression(value);
                let index = self.make_constant(Value::Obj(*name), line);
                self.emit_op(OpCode::SetVariable, line);
                self.emit_byte(index, line);
            }

            ExprKind::Call { callee, args } => {
                self.expression(callee);
                for arg in args {
                    self.expression(arg);
                }
                self.emit_op(OpCode::Call, line);
                self.emit_byte(args.len().min(255) as u8, line);
            }

            ExprKind::Dot {
                instance,
                field,
                value,
                args,
            } => {
                self.expression(instance);

                if let Some(args) = args {
                    for arg in args {
                        self.expression(arg);
                    }
                    let index = self.make_constant(Value::Obj(*field), line);
                    self.emit_op(OpCode::Invoke, line);
                    self.emit_byte(index, line);
                    self.emit_byte(args.len().min(255) as u8, line);
                } else if let Some(value) = value {
                    self.expression(value);
                    let index = self.make_constant(Value::Obj(*field), line);
                    self.emit_op(OpCode::SetProperty, line);
                    self.emit_byte(index, line);
                } else {
                    let index = self.make_constant(Value::Obj(*field), line);
                    self.emit_op(OpCode::GetProperty, line);
                    self.emit_byte(index, line);
                }
            }

            ExprKind::Base { method } => {
                match self.classes.last() {
                    None => self.error("Can't use 'base' outside of a class.", line),
                    Some(class) if !class.has_parent => {
                        self.error("Can't use 'base' in a class with no parent class.", line);
                    }
                    _ => {}
                }
                let index = self.make_constant(Value::Obj(*method), line);
                self.emit_op(OpCode::GetBase, line);
                self.emit_byte(index, line);
            }

            ExprKind::List { items } => {
                for item in items {
                    self.expression(item);
                }
                // The count rides in the constant pool as a number, which
                // is how a 256-element literal stays representable.
                let index = self.make_constant(Value::Number(items.len() as f64), line);
                self.emit_op(OpCode::BuildList, line);
                self.emit_byte(index, line);
            }

            ExprKind::Subscript {
                target,
                index,
                value,
            } => {
                self.expression(target);
                self.expression(index);
                match value {
                    Some(value) => {
                        self.expression(value);
                        self.emit_op(OpCode::ListStore, line);
                    }
                    None => self.emit_op(OpCode::ListGet, line),
                }
            }
        }
    }
}
