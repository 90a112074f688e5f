//! Bytecode program container
//!
//! Structured instructions (opcode plus up to two operands) with a
//! value-deduplicating constant pool, a function table, and a label table.
//! Labels are symbolic until `resolve_labels` rewrites them into concrete
//! instruction addresses; resolution must run before execution.

mod opcode;

pub mod disasm;
pub mod validator;

pub use disasm::disassemble;
pub use opcode::Opcode;
pub use validator::validate;

use crate::value::Value;
use std::collections::HashMap;
use std::fmt;

/// Instruction operand
///
/// Either a literal value, a symbolic name (variable, array, function, or
/// unresolved label), or a concrete instruction address.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Literal value
    Value(Value),
    /// Symbolic name
    Name(String),
    /// Instruction address
    Addr(usize),
}

impl Operand {
    pub fn value(v: impl Into<Value>) -> Self {
        Operand::Value(v.into())
    }

    pub fn name(n: impl Into<String>) -> Self {
        Operand::Name(n.into())
    }

    pub fn addr(a: usize) -> Self {
        Operand::Addr(a)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Value(Value::Str(s)) => write!(f, "{:?}", s.as_ref()),
            Operand::Value(v) => write!(f, "{}", v),
            Operand::Name(n) => write!(f, "{}", n),
            Operand::Addr(a) => write!(f, "@{}", a),
        }
    }
}

/// A single bytecode instruction
///
/// Immutable after construction except for the one-time label-resolution
/// rewrite of `op1`. `addr` is the instruction's own index in the program,
/// stamped by [`Program::add_instruction`].
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub op1: Option<Operand>,
    pub op2: Option<Operand>,
    /// Originating source line (0 when synthesized)
    pub line: u32,
    /// Own index in the instruction stream
    pub addr: usize,
}

impl Instruction {
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            op1: None,
            op2: None,
            line: 0,
            addr: 0,
        }
    }

    pub fn with_op1(mut self, operand: Operand) -> Self {
        self.op1 = Some(operand);
        self
    }

    pub fn with_op2(mut self, operand: Operand) -> Self {
        self.op2 = Some(operand);
        self
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.line = line;
        self
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}  {}", self.addr, self.opcode.mnemonic())?;
        if let Some(op1) = &self.op1 {
            write!(f, " {}", op1)?;
        }
        if let Some(op2) = &self.op2 {
            write!(f, " {}", op2)?;
        }
        Ok(())
    }
}

/// Bytecode program
///
/// Built once by an upstream code generator, label-resolved, then handed to
/// the VM. Immutable from the VM's perspective.
#[derive(Debug, Clone, Default)]
pub struct Program {
    /// Ordered instruction stream
    pub instructions: Vec<Instruction>,
    /// Constant pool, deduplicated by value equality
    pub constants: Vec<Value>,
    /// Function name -> entry address (last registration wins)
    pub functions: HashMap<String, usize>,
    /// Label name -> address
    pub labels: HashMap<String, usize>,
}

impl Program {
    /// Create a new empty program
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an instruction, stamping its address as its position
    ///
    /// Returns the address so a code generator can backpatch forward jump
    /// targets later.
    pub fn add_instruction(&mut self, instruction: Instruction) -> usize {
        let addr = self.instructions.len();
        let mut instruction = instruction;
        instruction.addr = addr;
        self.instructions.push(instruction);
        addr
    }

    /// Emit an operand-less instruction
    pub fn emit(&mut self, opcode: Opcode) -> usize {
        self.add_instruction(Instruction::new(opcode))
    }

    /// Emit an instruction with one operand
    pub fn emit1(&mut self, opcode: Opcode, op1: Operand) -> usize {
        self.add_instruction(Instruction::new(opcode).with_op1(op1))
    }

    /// Emit an instruction with two operands
    pub fn emit2(&mut self, opcode: Opcode, op1: Operand, op2: Operand) -> usize {
        self.add_instruction(Instruction::new(opcode).with_op1(op1).with_op2(op2))
    }

    /// Add a constant to the pool and return its index
    ///
    /// Deduplicates by value equality: adding an existing value returns the
    /// existing index.
    pub fn add_constant(&mut self, value: Value) -> usize {
        if let Some(idx) = self.constants.iter().position(|c| c == &value) {
            return idx;
        }
        self.constants.push(value);
        self.constants.len() - 1
    }

    /// Register a function entry point (last registration wins)
    pub fn register_function(&mut self, name: impl Into<String>, entry: usize) {
        self.functions.insert(name.into(), entry);
    }

    /// Record a label at the current address and emit its LABEL marker
    ///
    /// Returns the labelled address.
    pub fn mark_label(&mut self, name: impl Into<String>) -> usize {
        let name = name.into();
        let addr = self.emit1(Opcode::Label, Operand::Name(name.clone()));
        self.labels.insert(name, addr);
        addr
    }

    /// Resolve symbolic label operands into concrete addresses
    ///
    /// Single pass over the instruction stream rewriting every primary
    /// operand that is a `Name` matching a known label. Idempotent:
    /// already-resolved `Addr` operands are left untouched, as are names
    /// that do not match any label (variable, array, and function operands).
    pub fn resolve_labels(&mut self) {
        for instruction in &mut self.instructions {
            if let Some(Operand::Name(name)) = &instruction.op1 {
                if let Some(&addr) = self.labels.get(name) {
                    instruction.op1 = Some(Operand::Addr(addr));
                }
            }
        }
    }

    /// Number of instructions
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Instruction at the given address
    pub fn get(&self, addr: usize) -> Option<&Instruction> {
        self.instructions.get(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_instruction_stamps_address() {
        let mut program = Program::new();
        let a0 = program.emit(Opcode::Nop);
        let a1 = program.emit1(Opcode::Push, Operand::value(1));
        assert_eq!(a0, 0);
        assert_eq!(a1, 1);
        assert_eq!(program.instructions[0].addr, 0);
        assert_eq!(program.instructions[1].addr, 1);
    }

    #[test]
    fn test_constant_pool_dedup() {
        let mut program = Program::new();
        let a = program.add_constant(Value::Int(42));
        let b = program.add_constant(Value::string("hi"));
        let c = program.add_constant(Value::Int(42));
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(c, 0);
        assert_eq!(program.constants.len(), 2);
    }

    #[test]
    fn test_function_table_last_wins() {
        let mut program = Program::new();
        program.register_function("f", 3);
        program.register_function("f", 7);
        assert_eq!(program.functions["f"], 7);
    }

    #[test]
    fn test_mark_label_records_address() {
        let mut program = Program::new();
        program.emit(Opcode::Nop);
        let addr = program.mark_label("loop");
        assert_eq!(addr, 1);
        assert_eq!(program.labels["loop"], 1);
        assert_eq!(program.instructions[1].opcode, Opcode::Label);
    }

    #[test]
    fn test_resolve_labels_rewrites_jump() {
        let mut program = Program::new();
        let target = program.mark_label("L");
        program.emit(Opcode::Nop);
        program.emit1(Opcode::Jmp, Operand::name("L"));
        program.resolve_labels();
        assert_eq!(program.instructions[2].op1, Some(Operand::Addr(target)));
    }

    #[test]
    fn test_resolve_labels_idempotent() {
        let mut program = Program::new();
        program.mark_label("L");
        program.emit1(Opcode::Jmp, Operand::name("L"));
        program.resolve_labels();
        let snapshot = program.instructions.clone();
        program.resolve_labels();
        assert_eq!(program.instructions, snapshot);
    }

    #[test]
    fn test_resolve_labels_leaves_variable_names() {
        let mut program = Program::new();
        program.mark_label("x_label");
        // LOAD of a plain variable name must not be rewritten
        program.emit1(Opcode::Load, Operand::name("x"));
        program.resolve_labels();
        assert_eq!(program.instructions[1].op1, Some(Operand::name("x")));
    }

    #[test]
    fn test_instruction_display() {
        let mut program = Program::new();
        program.emit2(
            Opcode::Call,
            Operand::name("factorial"),
            Operand::value(1),
        );
        assert_eq!(
            program.instructions[0].to_string(),
            "0000  CALL factorial 1"
        );
        program.emit1(Opcode::Push, Operand::value("a"));
        assert_eq!(program.instructions[1].to_string(), "0001  PUSH \"a\"");
    }
}
