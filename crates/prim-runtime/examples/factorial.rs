//! Minimal embedding example
//!
//! Assembles a recursive factorial program by hand, prints its disassembly,
//! and runs it on the VM.
//!
//! Run with: cargo run --example factorial -p prim-runtime

use prim_runtime::{disassemble, Opcode, Operand, Program, VM};

fn main() {
    let mut program = Program::new();

    // main: push the argument, call factorial, halt
    program.emit1(Opcode::Push, Operand::value(5));
    program.emit2(Opcode::Call, Operand::name("factorial"), Operand::value(1));
    program.emit(Opcode::Halt);

    // factorial(n): if n <= 1 return 1 else return n * factorial(n - 1)
    let entry = program.len();
    program.register_function("factorial", entry);
    program.emit1(Opcode::Load, Operand::name("arg0"));
    program.emit1(Opcode::Push, Operand::value(1));
    program.emit(Opcode::Le);
    program.emit1(Opcode::JmpF, Operand::name("recurse"));
    program.emit1(Opcode::Push, Operand::value(1));
    program.emit(Opcode::RetVal);
    program.mark_label("recurse");
    program.emit1(Opcode::Load, Operand::name("arg0"));
    program.emit1(Opcode::Load, Operand::name("arg0"));
    program.emit1(Opcode::Push, Operand::value(1));
    program.emit(Opcode::Sub);
    program.emit2(Opcode::Call, Operand::name("factorial"), Operand::value(1));
    program.emit(Opcode::Mul);
    program.emit(Opcode::RetVal);
    program.resolve_labels();

    println!("{}", disassemble(&program));

    let mut vm = VM::new();
    vm.execute(&program).expect("execution failed");

    println!("factorial(5) = {}", vm.stack().last().expect("no result"));
    // Output: factorial(5) = 120
}
