//! Bytecode chunks.
//!
//! A chunk is a flat byte buffer of instructions, a parallel table of
//! originating source lines (one per byte, so errors can always be
//! attributed), and an append-only constant pool. Opcodes are one byte,
//! followed by zero, one, or two bytes of inline operands; jump operands
//! are unsigned 16-bit big-endian offsets relative to the instruction
//! following the operand.

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    // Literals
    Constant,
    Null,
    True,
    False,

    // Stack
    Pop,
    PopN,

    // Unary
    Negate,
    Not,

    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,

    // Comparison
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    SwitchEqual,

    // Control flow
    Jump,
    JumpIfFalse,
    JumpIfTrue,
    Loop,
    Ternary,

    // Scopes
    ScopeStart,
    ScopeEnd,

    // Variables
    DefineVariable,
    GetVariable,
    SetVariable,
    DefineArgument,

    // Functions and classes
    Call,
    Return,
    DefineFunction,
    DefineMethod,
    DefineClass,
    Inherit,

    // Properties
    GetProperty,
    SetProperty,
    Invoke,
    GetBase,

    // Lists
    BuildList,
    ListGet,
    ListStore,
}

/// Every opcode in discriminant order, for byte decoding.
const OPCODES: [OpCode; 43] = [
    OpCode::Constant,
    OpCode::Null,
    OpCode::True,
    OpCode::False,
    OpCode::Pop,
    OpCode::PopN,
    OpCode::Negate,
    OpCode::Not,
    OpCode::Add,
    OpCode::Subtract,
    OpCode::Multiply,
    OpCode::Divide,
    OpCode::Equal,
    OpCode::NotEqual,
    OpCode::Greater,
    OpCode::GreaterEqual,
    OpCode::Less,
    OpCode::LessEqual,
    OpCode::SwitchEqual,
    OpCode::Jump,
    OpCode::JumpIfFalse,
    OpCode::JumpIfTrue,
    OpCode::Loop,
    OpCode::Ternary,
    OpCode::ScopeStart,
    OpCode::ScopeEnd,
    OpCode::DefineVariable,
    OpCode::GetVariable,
    OpCode::SetVariable,
    OpCode::DefineArgument,
    OpCode::Call,
    OpCode::Return,
    OpCode::DefineFunction,
    OpCode::DefineMethod,
    OpCode::DefineClass,
    OpCode::Inherit,
    OpCode::GetProperty,
    OpCode::SetProperty,
    OpCode::Invoke,
    OpCode::GetBase,
    OpCode::BuildList,
    OpCode::ListGet,
    OpCode::ListStore,
];

impl OpCode {
    pub fn from_byte(byte: u8) -> Option<OpCode> {
        OPCODES.get(byte as usize).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            OpCode::Constant => "CONSTANT",
            OpCode::Null => "NULL",
            OpCode::True => "TRUE",
            OpCode::False => "FALSE",
            OpCode::Pop => "POP",
            OpCode::PopN => "POP_N",
            OpCode::Negate => "NEGATE",
            OpCode::Not => "NOT",
            OpCode::Add => "ADD",
            OpCode::Subtract => "SUBTRACT",
            OpCode::Multiply => "MULTIPLY",
            OpCode::Divide => "DIVIDE",
            OpCode::Equal => "EQUAL",
            OpCode::NotEqual => "NOT_EQUAL",
            OpCode::Greater => "GREATER",
            OpCode::GreaterEqual => "GREATER_EQUAL",
            OpCode::Less => "LESS",
            OpCode::LessEqual => "LESS_EQUAL",
            OpCode::SwitchEqual => "SWITCH_EQUAL",
            OpCode::Jump => "JUMP",
            OpCode::JumpIfFalse => "JUMP_IF_FALSE",
            OpCode::JumpIfTrue => "JUMP_IF_TRUE",
            OpCode::Loop => "LOOP",
            OpCode::Ternary => "TERNARY",
            OpCode::ScopeStart => "SCOPE_START",
            OpCode::ScopeEnd => "SCOPE_END",
            OpCode::DefineVariable => "DEFINE_VARIABLE",
            OpCode::GetVariable => "GET_VARIABLE",
            OpCode::SetVariable => "SET_VARIABLE",
            OpCode::DefineArgument => "DEFINE_ARGUMENT",
            OpCode::Call => "CALL",
            OpCode::Return => "RETURN",
            OpCode::DefineFunction => "DEFINE_FUNCTION",
            OpCode::DefineMethod => "DEFINE_METHOD",
            OpCode::DefineClass => "DEFINE_CLASS",
            OpCode::Inherit => "INHERIT",
            OpCode::GetProperty => "GET_PROPERTY",
            OpCode::SetProperty => "SET_PROPERTY",
            OpCode::Invoke => "INVOKE",
            OpCode::GetBase => "GET_BASE",
            OpCode::BuildList => "BUILD_LIST",
            OpCode::ListGet => "LIST_GET",
            OpCode::ListStore => "LIST_STORE",
        }
    }
}

#[derive(Debug, Default)]
pub struct Chunk {
    pub code: Vec<u8>,
    /// Source line for the instruction byte at the same offset.
    pub lines: Vec<u16>,
    pub constants: Vec<Value>,
}

impl Chunk {
    pub fn new() -> Chunk {
        Chunk::default()
    }

    pub fn write(&mut self, byte: u8, line: u16) {
        self.code.push(byte);
        self.lines.push(line);
    }

    pub fn write_op(&mut self, op: OpCode, line: u16) {
        self.write(op as u8, line);
    }

    /// Append `value` to the constant pool and return its index. Indices
    /// are stable: the pool is append-only during emission.
    pub fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_bytes_round_trip() {
        for byte in 0..=OpCode::ListStore as u8 {
            let op = OpCode::from_byte(byte).unwrap();
            assert_eq!(op as u8, byte);
        }
        assert_eq!(OpCode::from_byte(OpCode::ListStore as u8 + 1), None);
    }

    #[test]
    fn lines_parallel_code() {
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::Null, 3);
        chunk.write_op(OpCode::Return, 4);
        assert_eq!(chunk.code.len(), chunk.lines.len());
        assert_eq!(chunk.lines[0], 3);
    }
}
