//! Pre-execution bytecode validation
//!
//! Structural checks a code generator can run after label resolution to
//! surface malformed programs before they reach the VM: operand presence per
//! opcode, resolved jump operands, and in-range jump/function targets.
//!
//! The VM itself does not require validation (it re-checks targets during
//! dispatch), but a validated program cannot fault structurally at run time.

use super::{Instruction, Opcode, Operand, Program};
use crate::value::RuntimeError;

/// Validate a label-resolved program
///
/// Checks, per instruction:
/// - PUSH carries a literal operand
/// - LOAD/STORE/ALOAD/ASTORE carry a name operand
/// - JMP/JMPF/JMPT carry a resolved address inside `[0, len)`
/// - CALL names a registered function and carries an argument count
/// - CALL_BUILTIN carries a name and an argument count
///
/// Function table entries must also point inside the instruction stream.
/// Returns the first violation found.
pub fn validate(program: &Program) -> Result<(), RuntimeError> {
    for instruction in &program.instructions {
        validate_instruction(program, instruction)?;
    }

    for (name, &entry) in &program.functions {
        if entry >= program.len() {
            return Err(RuntimeError::InvalidJumpTarget {
                target: entry,
                len: program.len(),
            })
            .map_err(|e| annotate(e, name));
        }
    }

    Ok(())
}

// Function-table faults have no instruction to point at; keep the name.
fn annotate(err: RuntimeError, name: &str) -> RuntimeError {
    match err {
        RuntimeError::InvalidJumpTarget { target, len } => RuntimeError::InstructionFault {
            addr: target,
            instruction: format!("function table entry `{}`", name),
            source: Box::new(RuntimeError::InvalidJumpTarget { target, len }),
        },
        other => other,
    }
}

fn validate_instruction(program: &Program, instruction: &Instruction) -> Result<(), RuntimeError> {
    let mnemonic = instruction.opcode.mnemonic();
    match instruction.opcode {
        Opcode::Push => match instruction.op1 {
            Some(Operand::Value(_)) => Ok(()),
            _ => Err(RuntimeError::MissingOperand { mnemonic }),
        },
        Opcode::Load | Opcode::Store | Opcode::ALoad | Opcode::AStore => {
            match instruction.op1 {
                Some(Operand::Name(_)) => Ok(()),
                _ => Err(RuntimeError::MissingOperand { mnemonic }),
            }
        }
        Opcode::Jmp | Opcode::JmpF | Opcode::JmpT => match &instruction.op1 {
            Some(Operand::Addr(target)) => {
                if *target < program.len() {
                    Ok(())
                } else {
                    Err(RuntimeError::InvalidJumpTarget {
                        target: *target,
                        len: program.len(),
                    })
                }
            }
            Some(Operand::Name(name)) => Err(RuntimeError::UnresolvedLabel {
                name: name.clone(),
            }),
            _ => Err(RuntimeError::MissingOperand { mnemonic }),
        },
        Opcode::Call => match (&instruction.op1, &instruction.op2) {
            (Some(Operand::Name(name)), Some(Operand::Value(_))) => {
                if program.functions.contains_key(name) {
                    Ok(())
                } else {
                    Err(RuntimeError::UnknownFunction { name: name.clone() })
                }
            }
            _ => Err(RuntimeError::MissingOperand { mnemonic }),
        },
        Opcode::CallBuiltin => match (&instruction.op1, &instruction.op2) {
            (Some(Operand::Name(_)), Some(Operand::Value(_))) => Ok(()),
            _ => Err(RuntimeError::MissingOperand { mnemonic }),
        },
        // Everything else is operand-free or checks its operands at dispatch
        _ => Ok(()),
    }
}
