//! Chunk disassembler.
//!
//! Renders bytecode one instruction per line for the `trace` feature and
//! for tests that need to reason about instruction boundaries.

use crate::chunk::{Chunk, OpCode};
use crate::object::Heap;

/// Total width in bytes of the instruction whose opcode byte is `byte`,
/// including the opcode itself.
pub fn instruction_width(byte: u8) -> usize {
    match OpCode::from_byte(byte) {
        Some(op) => match op {
            OpCode::Constant
            | OpCode::PopN
            | OpCode::DefineVariable
            | OpCode::GetVariable
            | OpCode::SetVariable
            | OpCode::DefineArgument
            | OpCode::Call
            | OpCode::GetProperty
            | OpCode::SetProperty
            | OpCode::GetBase
            | OpCode::BuildList => 2,
            OpCode::Jump
            | OpCode::JumpIfFalse
            | OpCode::JumpIfTrue
            | OpCode::Loop
            | OpCode::Invoke => 3,
            _ => 1,
        },
        None => 1,
    }
}

/// Render a whole chunk.
pub fn disassemble_chunk(heap: &Heap, chunk: &Chunk, name: &str) -> String {
    let mut out = format!("== {} ==\n", name);
    let mut offset = 0;
    while offset < chunk.code.len() {
        out.push_str(&disassemble_instruction(heap, chunk, offset));
        out.push('\n');
        offset += instruction_width(chunk.code[offset]);
    }
    out
}

/// Render the single instruction at `offset`.
pub fn disassemble_instruction(heap: &Heap, chunk: &Chunk, offset: usize) -> String {
    let line = if offset > 0 && chunk.lines[offset] == chunk.lines[offset - 1] {
        "   |".to_string()
    } else {
        format!("{:4}", chunk.lines[offset])
    };

    let Some(op) = OpCode::from_byte(chunk.code[offset]) else {
        return format!("{:04} {} <bad opcode {}>", offset, line, chunk.code[offset]);
    };

    let body = match op {
        OpCode::Constant
        | OpCode::DefineVariable
        | OpCode::GetVariable
        | OpCode::SetVariable
        | OpCode::DefineArgument
        | OpCode::GetProperty
        | OpCode::SetProperty
        | OpCode::GetBase
        | OpCode::BuildList => {
            let index = chunk.code[offset + 1];
            let constant = chunk.constants[index as usize];
            format!(
                "{:<16} {:4} '{}'",
                op.name(),
                index,
                constant.to_print_string(heap)
            )
        }
        OpCode::PopN | OpCode::Call => {
            format!("{:<16} {:4}", op.name(), chunk.code[offset + 1])
        }
        OpCode::Invoke => {
            let index = chunk.code[offset + 1];
            let argc = chunk.code[offset + 2];
            let constant = chunk.constants[index as usize];
            format!(
                "{:<16} {:4} '{}' ({} args)",
                op.name(),
                index,
                constant.to_print_string(heap),
                argc
            )
        }
        OpCode::Jump | OpCode::JumpIfFalse | OpCode::JumpIfTrue => {
            let jump = ((chunk.code[offset + 1] as usize) << 8) | chunk.code[offset + 2] as usize;
            format!("{:<16} {:4} -> {}", op.name(), offset, offset + 3 + jump)
        }
        OpCode::Loop => {
            let jump = ((chunk.code[offset + 1] as usize) << 8) | chunk.code[offset + 2] as usize;
            format!("{:<16} {:4} -> {}", op.name(), offset, offset + 3 - jump)
        }
        _ => op.name().to_string(),
    };

    format!("{:04} {} {}", offset, line, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter;

    #[test]
    fn disassembles_without_panicking() {
        let mut heap = Heap::new();
        let script = emitter::compile(
            "var x = 1; while (x < 10) { x = x + 1; } print(x);",
            &mut heap,
        )
        .unwrap();
        let chunk = &heap.function(script).chunk;
        let text = disassemble_chunk(&heap, chunk, "<script>");
        assert!(text.contains("DEFINE_VARIABLE"));
        assert!(text.contains("LOOP"));
        assert!(text.contains("CALL"));
    }
}
