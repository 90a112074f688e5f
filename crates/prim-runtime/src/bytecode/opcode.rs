//! Bytecode instruction set
//!
//! Closed enumeration of opcodes grouped by category. Operands live on
//! the instruction record itself (structured operands, not an inline byte
//! stream), so the dispatch loop never decodes raw bytes.

use std::fmt;

/// Bytecode opcode
///
/// The enumeration is exhaustive on purpose: the VM dispatch is a closed
/// match, so adding an opcode without dispatch behavior fails to compile
/// rather than silently falling through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ===== Stack =====
    /// Push the literal operand
    Push,
    /// Pop and discard top of stack
    Pop,
    /// Duplicate top of stack
    Dup,
    /// Exchange the two topmost values
    Swap,

    // ===== Memory =====
    /// Load named variable (frame locals first, then globals)
    Load,
    /// Pop and store to named variable
    Store,
    /// Pop index, push element of the named array
    ALoad,
    /// Pop index, pop value, write into the named array (auto-extends)
    AStore,
    /// Reserved: index-based local load (no dispatch behavior)
    LoadLocal,
    /// Reserved: index-based local store (no dispatch behavior)
    StoreLocal,

    // ===== Arithmetic =====
    /// Pop b, pop a, push a + b (text concatenation when either is text)
    Add,
    /// Pop b, pop a, push a - b
    Sub,
    /// Pop b, pop a, push a * b
    Mul,
    /// Pop b, pop a, push a / b (truncating when both Int)
    Div,
    /// Pop b, pop a, push a % b
    Mod,
    /// Pop a, push -a
    Neg,
    /// Pop a, push a + 1
    Inc,
    /// Pop a, push a - 1
    Dec,

    // ===== Comparison =====
    /// Pop b, pop a, push a == b (epsilon-tolerant for doubles)
    Eq,
    /// Pop b, pop a, push a != b
    Ne,
    /// Pop b, pop a, push a < b
    Lt,
    /// Pop b, pop a, push a <= b
    Le,
    /// Pop b, pop a, push a > b
    Gt,
    /// Pop b, pop a, push a >= b
    Ge,

    // ===== Logical =====
    /// Pop b, pop a, push truthy(a) && truthy(b), no short-circuit
    And,
    /// Pop b, pop a, push truthy(a) || truthy(b), no short-circuit
    Or,
    /// Pop a, push !truthy(a)
    Not,

    // ===== Control flow =====
    /// Unconditional jump to the address operand
    Jmp,
    /// Pop condition, jump if falsy
    JmpF,
    /// Pop condition, jump if truthy
    JmpT,
    /// Label marker: run-time no-op, consumed during label resolution
    Label,

    // ===== Functions =====
    /// Call named function with argc arguments
    Call,
    /// Call named built-in with argc arguments
    CallBuiltin,
    /// Return without a value (outermost return halts the program)
    Ret,
    /// Pop return value, return, re-push it for the caller
    RetVal,
    /// Reserved: argument push (no dispatch behavior)
    PushArg,

    // ===== I/O =====
    /// Pop and write to the output channel, no trailing newline
    Print,
    /// Pop and write to the output channel with a trailing newline
    PrintLn,
    /// Read one line from the input channel, push as text
    Input,

    // ===== Conversion =====
    /// Pop, push truncated integer
    ToInt,
    /// Pop, push double
    ToDouble,
    /// Pop, push canonical textual form
    ToString,
    /// Pop, push truthiness
    ToBool,

    // ===== Special =====
    /// No effect
    Nop,
    /// Clear the running flag without touching the call stack
    Halt,
}

impl Opcode {
    /// Assembly spelling used by the disassembler and fault messages
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Push => "PUSH",
            Opcode::Pop => "POP",
            Opcode::Dup => "DUP",
            Opcode::Swap => "SWAP",
            Opcode::Load => "LOAD",
            Opcode::Store => "STORE",
            Opcode::ALoad => "ALOAD",
            Opcode::AStore => "ASTORE",
            Opcode::LoadLocal => "LOAD_LOCAL",
            Opcode::StoreLocal => "STORE_LOCAL",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Mod => "MOD",
            Opcode::Neg => "NEG",
            Opcode::Inc => "INC",
            Opcode::Dec => "DEC",
            Opcode::Eq => "EQ",
            Opcode::Ne => "NE",
            Opcode::Lt => "LT",
            Opcode::Le => "LE",
            Opcode::Gt => "GT",
            Opcode::Ge => "GE",
            Opcode::And => "AND",
            Opcode::Or => "OR",
            Opcode::Not => "NOT",
            Opcode::Jmp => "JMP",
            Opcode::JmpF => "JMPF",
            Opcode::JmpT => "JMPT",
            Opcode::Label => "LABEL",
            Opcode::Call => "CALL",
            Opcode::CallBuiltin => "CALL_BUILTIN",
            Opcode::Ret => "RET",
            Opcode::RetVal => "RET_VAL",
            Opcode::PushArg => "PUSH_ARG",
            Opcode::Print => "PRINT",
            Opcode::PrintLn => "PRINTLN",
            Opcode::Input => "INPUT",
            Opcode::ToInt => "TO_INT",
            Opcode::ToDouble => "TO_DOUBLE",
            Opcode::ToString => "TO_STRING",
            Opcode::ToBool => "TO_BOOL",
            Opcode::Nop => "NOP",
            Opcode::Halt => "HALT",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mnemonics() {
        assert_eq!(Opcode::Push.mnemonic(), "PUSH");
        assert_eq!(Opcode::CallBuiltin.mnemonic(), "CALL_BUILTIN");
        assert_eq!(Opcode::RetVal.mnemonic(), "RET_VAL");
        assert_eq!(Opcode::ToDouble.mnemonic(), "TO_DOUBLE");
        assert_eq!(Opcode::Halt.mnemonic(), "HALT");
    }

    #[test]
    fn test_display_matches_mnemonic() {
        assert_eq!(Opcode::JmpF.to_string(), "JMPF");
        assert_eq!(Opcode::AStore.to_string(), "ASTORE");
    }
}
