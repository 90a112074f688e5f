//! Bytecode disassembler
//!
//! Converts a program back to a human-readable assembly-like listing.
//! Used for debugging, testing, and tooling output.

use super::Program;
use crate::value::Value;
use std::fmt::Write;

/// Disassemble a program to human-readable format
///
/// # Format
/// ```text
/// === Constants ===
/// 0: 42
/// 1: "hello"
///
/// === Functions ===
/// factorial -> 0003
///
/// === Instructions ===
/// 0000  PUSH 5
/// 0001  CALL factorial 1
/// 0002  HALT
/// ```
///
/// Function and label tables are emitted in name order so the output is
/// stable across runs.
pub fn disassemble(program: &Program) -> String {
    let mut output = String::new();

    if !program.constants.is_empty() {
        writeln!(output, "=== Constants ===").unwrap();
        for (idx, constant) in program.constants.iter().enumerate() {
            writeln!(output, "{}: {}", idx, format_value(constant)).unwrap();
        }
        writeln!(output).unwrap();
    }

    if !program.functions.is_empty() {
        writeln!(output, "=== Functions ===").unwrap();
        let mut names: Vec<_> = program.functions.keys().collect();
        names.sort();
        for name in names {
            writeln!(output, "{} -> {:04}", name, program.functions[name]).unwrap();
        }
        writeln!(output).unwrap();
    }

    if !program.labels.is_empty() {
        writeln!(output, "=== Labels ===").unwrap();
        let mut names: Vec<_> = program.labels.keys().collect();
        names.sort();
        for name in names {
            writeln!(output, "{} -> {:04}", name, program.labels[name]).unwrap();
        }
        writeln!(output).unwrap();
    }

    writeln!(output, "=== Instructions ===").unwrap();
    for instruction in &program.instructions {
        writeln!(output, "{}", instruction).unwrap();
    }

    output
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Str(s) => format!("{:?}", s.as_ref()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Opcode, Operand, Program};

    #[test]
    fn test_disassemble_listing() {
        let mut program = Program::new();
        program.add_constant(Value::Int(42));
        program.add_constant(Value::string("hello"));
        program.emit1(Opcode::Push, Operand::value(42));
        program.emit(Opcode::Halt);

        let listing = disassemble(&program);
        assert!(listing.contains("=== Constants ==="));
        assert!(listing.contains("0: 42"));
        assert!(listing.contains("1: \"hello\""));
        assert!(listing.contains("0000  PUSH 42"));
        assert!(listing.contains("0001  HALT"));
    }

    #[test]
    fn test_disassemble_tables_sorted() {
        let mut program = Program::new();
        program.register_function("zeta", 9);
        program.register_function("alpha", 2);
        program.emit(Opcode::Halt);

        let listing = disassemble(&program);
        let alpha = listing.find("alpha -> 0002").unwrap();
        let zeta = listing.find("zeta -> 0009").unwrap();
        assert!(alpha < zeta);
    }

    #[test]
    fn test_disassemble_empty_sections_omitted() {
        let mut program = Program::new();
        program.emit(Opcode::Nop);
        let listing = disassemble(&program);
        assert!(!listing.contains("=== Constants ==="));
        assert!(!listing.contains("=== Functions ==="));
        assert!(listing.contains("=== Instructions ==="));
    }
}
