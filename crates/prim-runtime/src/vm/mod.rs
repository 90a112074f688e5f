//! Stack-based virtual machine
//!
//! Executes a label-resolved [`Program`] with an operand stack, call frames,
//! global variables, and named arrays.
//! - Values are dynamically typed; arithmetic promotes Int to Double
//! - Variable writes target the active frame's locals, else globals
//! - A fixed executed-instruction ceiling contains runaway loops
//! - The first fault terminates execution and surfaces to the caller

mod dump;
mod frame;

pub use dump::{FrameDump, VmStateDump, DUMP_VERSION};
pub use frame::CallFrame;

use crate::builtins::{self, InputReader, OutputWriter};
use crate::bytecode::{Instruction, Opcode, Operand, Program};
use crate::value::{values_equal, RuntimeError, Value};
use std::collections::HashMap;
use std::io::Write;

/// Default executed-instruction ceiling
pub const DEFAULT_INSTRUCTION_LIMIT: u64 = 1_000_000;

/// Ceiling on any single array's length
///
/// One ASTORE can grow an array to an arbitrary index within a single
/// dispatched instruction, where the instruction ceiling cannot intervene;
/// this bounds the memory that one instruction can claim.
pub const MAX_ARRAY_LEN: usize = 10_000_000;

/// Where execution continues after one dispatched instruction
///
/// `Jump` carries the exact landing address. This reproduces the original
/// conventions (JMP compensates the post-dispatch increment, RET resumes one
/// past the stored CALL address) without address arithmetic that could
/// underflow at target 0.
enum Flow {
    /// Advance to the next instruction
    Continue,
    /// Land exactly on the given address
    Jump(usize),
    /// Clear the running flag
    Halt,
}

/// Virtual machine state
///
/// One instance runs one instruction stream to completion on the calling
/// thread. Instances are reusable: `execute` resets all owned state before
/// running. A single instance must never be driven from two threads.
pub struct VM {
    /// Operand stack
    stack: Vec<Value>,
    /// Call frames (for function calls)
    frames: Vec<CallFrame>,
    /// Global variables
    globals: HashMap<String, Value>,
    /// Named arrays (namespace disjoint from scalar variables)
    arrays: HashMap<String, Vec<Value>>,
    /// Instruction pointer
    ip: usize,
    /// Running flag
    running: bool,
    /// Executed-instruction counter (monotonic per run)
    executed: u64,
    /// Ceiling for the executed counter
    instruction_limit: u64,
    /// Output channel for PRINT/PRINTLN and the print builtin
    output: OutputWriter,
    /// Input channel for INPUT and the input builtin
    input: InputReader,
}

impl VM {
    /// Create a new VM with the default instruction ceiling and stdio channels
    pub fn new() -> Self {
        Self {
            stack: Vec::with_capacity(256),
            frames: Vec::new(),
            globals: HashMap::new(),
            arrays: HashMap::new(),
            ip: 0,
            running: false,
            executed: 0,
            instruction_limit: DEFAULT_INSTRUCTION_LIMIT,
            output: builtins::stdout_writer(),
            input: builtins::stdin_reader(),
        }
    }

    /// Create a new VM with a custom executed-instruction ceiling
    pub fn with_instruction_limit(limit: u64) -> Self {
        let mut vm = Self::new();
        vm.instruction_limit = limit;
        vm
    }

    /// Redirect PRINT/PRINTLN and the print builtin
    pub fn set_output_writer(&mut self, writer: OutputWriter) {
        self.output = writer;
    }

    /// Redirect INPUT and the input builtin
    pub fn set_input_reader(&mut self, reader: InputReader) {
        self.input = reader;
    }

    /// Clear all owned state
    ///
    /// Invoked automatically at the start of every `execute` call; callers
    /// only need it to reclaim memory between runs.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.globals.clear();
        self.arrays.clear();
        self.ip = 0;
        self.executed = 0;
        self.running = false;
    }

    /// Execute a label-resolved program to completion
    ///
    /// Resets state, then fetches and dispatches one instruction at a time
    /// until the running flag clears, the pointer passes the last
    /// instruction, a fault surfaces, or the instruction ceiling trips.
    ///
    /// The program must already be label-resolved; a jump operand still
    /// carrying a symbolic name faults as `UnresolvedLabel`.
    pub fn execute(&mut self, program: &Program) -> Result<(), RuntimeError> {
        self.reset();
        self.running = true;

        while self.running && self.ip < program.len() {
            let addr = self.ip;
            let flow = self
                .step(program, addr)
                .map_err(|e| contain(e, &program.instructions[addr]))?;

            match flow {
                Flow::Continue => self.ip = addr + 1,
                Flow::Jump(target) => self.ip = target,
                Flow::Halt => self.running = false,
            }

            self.executed += 1;
            if self.executed > self.instruction_limit {
                self.running = false;
                return Err(RuntimeError::InstructionLimitExceeded {
                    limit: self.instruction_limit,
                });
            }
        }

        self.running = false;
        Ok(())
    }

    /// Dispatch the instruction at `addr`
    fn step(&mut self, program: &Program, addr: usize) -> Result<Flow, RuntimeError> {
        let instruction = &program.instructions[addr];

        match instruction.opcode {
            // ===== Stack =====
            Opcode::Push => {
                let value = literal_operand(instruction)?;
                self.push(value.clone());
                Ok(Flow::Continue)
            }
            Opcode::Pop => {
                self.pop()?;
                Ok(Flow::Continue)
            }
            Opcode::Dup => {
                let top = self
                    .stack
                    .last()
                    .cloned()
                    .ok_or(RuntimeError::StackUnderflow)?;
                self.push(top);
                Ok(Flow::Continue)
            }
            Opcode::Swap => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(b);
                self.push(a);
                Ok(Flow::Continue)
            }

            // ===== Memory =====
            Opcode::Load => {
                let name = name_operand(instruction)?;
                let value = self
                    .frames
                    .last()
                    .and_then(|frame| frame.locals.get(name))
                    .or_else(|| self.globals.get(name))
                    .cloned()
                    .ok_or_else(|| RuntimeError::UndefinedVariable {
                        name: name.to_string(),
                    })?;
                self.push(value);
                Ok(Flow::Continue)
            }
            Opcode::Store => {
                let name = name_operand(instruction)?;
                let value = self.pop()?;
                // A live frame always receives the write: globals are
                // shadowed, never promoted.
                match self.frames.last_mut() {
                    Some(frame) => {
                        frame.locals.insert(name.to_string(), value);
                    }
                    None => {
                        self.globals.insert(name.to_string(), value);
                    }
                }
                Ok(Flow::Continue)
            }
            Opcode::ALoad => {
                let name = name_operand(instruction)?;
                let index = self.pop()?.as_int();
                let array =
                    self.arrays
                        .get(name)
                        .ok_or_else(|| RuntimeError::UndefinedArray {
                            name: name.to_string(),
                        })?;
                if index < 0 || index as usize >= array.len() {
                    return Err(RuntimeError::IndexOutOfBounds {
                        index,
                        len: array.len(),
                    });
                }
                let value = array[index as usize].clone();
                self.push(value);
                Ok(Flow::Continue)
            }
            Opcode::AStore => {
                let name = name_operand(instruction)?;
                // Index was pushed after the value, so it pops first
                let index = self.pop()?.as_int();
                let value = self.pop()?;
                if index < 0 {
                    let len = self.arrays.get(name).map_or(0, Vec::len);
                    return Err(RuntimeError::IndexOutOfBounds { index, len });
                }
                if index as u64 >= MAX_ARRAY_LEN as u64 {
                    return Err(RuntimeError::ArrayLimitExceeded {
                        index,
                        limit: MAX_ARRAY_LEN,
                    });
                }
                let array = self.arrays.entry(name.to_string()).or_default();
                if array.len() <= index as usize {
                    array.resize(index as usize + 1, Value::Null);
                }
                array[index as usize] = value;
                Ok(Flow::Continue)
            }
            Opcode::LoadLocal | Opcode::StoreLocal => {
                // Reserved fast-path local opcodes: declared but never
                // dispatched, and never aliased to LOAD/STORE.
                Err(RuntimeError::UnsupportedOpcode {
                    mnemonic: instruction.opcode.mnemonic(),
                })
            }

            // ===== Arithmetic =====
            Opcode::Add => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(add_values(a, b));
                Ok(Flow::Continue)
            }
            Opcode::Sub => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(sub_values(a, b));
                Ok(Flow::Continue)
            }
            Opcode::Mul => {
                let b = self.pop()?;
                let a = self.pop()?;
                let result = match (&a, &b) {
                    (Value::Int(x), Value::Int(y)) => match x.checked_mul(*y) {
                        Some(product) => Value::Int(product),
                        None => Value::Double(*x as f64 * *y as f64),
                    },
                    _ => Value::Double(a.as_double() * b.as_double()),
                };
                self.push(result);
                Ok(Flow::Continue)
            }
            Opcode::Div => {
                let b = self.pop()?;
                let a = self.pop()?;
                let divisor = b.as_double();
                if divisor.abs() < f64::EPSILON {
                    return Err(RuntimeError::DivideByZero);
                }
                let result = match (&a, &b) {
                    // The divisor is nonzero here, so checked_div only
                    // refuses i64::MIN / -1, which leaves the integer range
                    (Value::Int(x), Value::Int(y)) => match x.checked_div(*y) {
                        Some(quotient) => Value::Int(quotient),
                        None => Value::Double(*x as f64 / *y as f64),
                    },
                    _ => Value::Double(a.as_double() / divisor),
                };
                self.push(result);
                Ok(Flow::Continue)
            }
            Opcode::Mod => {
                let b = self.pop()?;
                let a = self.pop()?;
                let result = match (&a, &b) {
                    (Value::Int(x), Value::Int(y)) => {
                        if *y == 0 {
                            return Err(RuntimeError::ModuloByZero);
                        }
                        // wrapping covers i64::MIN % -1, which is 0
                        Value::Int(x.wrapping_rem(*y))
                    }
                    _ => Value::Double(a.as_double() % b.as_double()),
                };
                self.push(result);
                Ok(Flow::Continue)
            }
            Opcode::Neg => {
                let value = self.pop()?;
                let result = match value {
                    Value::Int(n) => match n.checked_neg() {
                        Some(negated) => Value::Int(negated),
                        None => Value::Double(-(n as f64)),
                    },
                    other => Value::Double(-other.as_double()),
                };
                self.push(result);
                Ok(Flow::Continue)
            }
            Opcode::Inc => {
                let value = self.pop()?;
                self.push(add_values(value, Value::Int(1)));
                Ok(Flow::Continue)
            }
            Opcode::Dec => {
                let value = self.pop()?;
                self.push(sub_values(value, Value::Int(1)));
                Ok(Flow::Continue)
            }

            // ===== Comparison =====
            Opcode::Eq => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::Bool(values_equal(&a, &b)));
                Ok(Flow::Continue)
            }
            Opcode::Ne => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::Bool(!values_equal(&a, &b)));
                Ok(Flow::Continue)
            }
            Opcode::Lt => self.binary_compare(i64::lt, f64::lt),
            Opcode::Le => self.binary_compare(i64::le, f64::le),
            Opcode::Gt => self.binary_compare(i64::gt, f64::gt),
            Opcode::Ge => self.binary_compare(i64::ge, f64::ge),

            // ===== Logical =====
            // Both operands are already on the stack: no short-circuit here.
            // Short-circuiting is encoded upstream via explicit jumps.
            Opcode::And => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::Bool(a.is_truthy() && b.is_truthy()));
                Ok(Flow::Continue)
            }
            Opcode::Or => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::Bool(a.is_truthy() || b.is_truthy()));
                Ok(Flow::Continue)
            }
            Opcode::Not => {
                let value = self.pop()?;
                self.push(Value::Bool(!value.is_truthy()));
                Ok(Flow::Continue)
            }

            // ===== Control flow =====
            Opcode::Jmp => {
                let target = self.jump_target(program, instruction)?;
                Ok(Flow::Jump(target))
            }
            Opcode::JmpF => {
                let target = self.jump_target(program, instruction)?;
                let condition = self.pop()?;
                if condition.is_truthy() {
                    Ok(Flow::Continue)
                } else {
                    Ok(Flow::Jump(target))
                }
            }
            Opcode::JmpT => {
                let target = self.jump_target(program, instruction)?;
                let condition = self.pop()?;
                if condition.is_truthy() {
                    Ok(Flow::Jump(target))
                } else {
                    Ok(Flow::Continue)
                }
            }
            Opcode::Label => Ok(Flow::Continue),

            // ===== Functions =====
            Opcode::Call => {
                let name = name_operand(instruction)?;
                let argc = argc_operand(instruction)?;
                let entry = *program.functions.get(name).ok_or_else(|| {
                    RuntimeError::UnknownFunction {
                        name: name.to_string(),
                    }
                })?;
                if entry >= program.len() {
                    return Err(RuntimeError::InvalidJumpTarget {
                        target: entry,
                        len: program.len(),
                    });
                }

                // Pop in reverse: the last-pushed argument becomes the
                // highest arg index.
                let mut args = vec![Value::Null; argc];
                for slot in args.iter_mut().rev() {
                    *slot = self.pop()?;
                }

                self.frames.push(CallFrame::new(name, addr, args));
                Ok(Flow::Jump(entry))
            }
            Opcode::CallBuiltin => {
                let name = name_operand(instruction)?;
                let argc = argc_operand(instruction)?;
                let mut args = vec![Value::Null; argc];
                for slot in args.iter_mut().rev() {
                    *slot = self.pop()?;
                }

                // length of a named array needs the VM's array store; every
                // other builtin goes through the registry.
                if name == "length" {
                    if let Some(Value::Str(s)) = args.first() {
                        if let Some(array) = self.arrays.get(s.as_str()) {
                            self.push(Value::Int(array.len() as i64));
                            return Ok(Flow::Continue);
                        }
                    }
                }

                if let Some(result) =
                    builtins::call_builtin(name, &args, &self.output, &self.input)?
                {
                    self.push(result);
                }
                Ok(Flow::Continue)
            }
            Opcode::Ret => match self.frames.pop() {
                // Outermost return: halt the whole program
                None => Ok(Flow::Halt),
                Some(frame) => Ok(Flow::Jump(frame.return_addr + 1)),
            },
            Opcode::RetVal => {
                let value = self.pop()?;
                match self.frames.pop() {
                    None => {
                        self.push(value);
                        Ok(Flow::Halt)
                    }
                    Some(frame) => {
                        self.push(value);
                        Ok(Flow::Jump(frame.return_addr + 1))
                    }
                }
            }
            Opcode::PushArg => Err(RuntimeError::UnsupportedOpcode {
                mnemonic: instruction.opcode.mnemonic(),
            }),

            // ===== I/O =====
            Opcode::Print => {
                let value = self.pop()?;
                self.write_output(&value.to_string())?;
                Ok(Flow::Continue)
            }
            Opcode::PrintLn => {
                let value = self.pop()?;
                let mut text = value.to_string();
                text.push('\n');
                self.write_output(&text)?;
                Ok(Flow::Continue)
            }
            Opcode::Input => {
                let line = builtins::read_line(&self.input)?;
                self.push(Value::string(line));
                Ok(Flow::Continue)
            }

            // ===== Conversion =====
            Opcode::ToInt => {
                let value = self.pop()?;
                self.push(Value::Int(value.as_int()));
                Ok(Flow::Continue)
            }
            Opcode::ToDouble => {
                let value = self.pop()?;
                self.push(Value::Double(value.as_double()));
                Ok(Flow::Continue)
            }
            Opcode::ToString => {
                let value = self.pop()?;
                self.push(Value::string(value.to_string()));
                Ok(Flow::Continue)
            }
            Opcode::ToBool => {
                let value = self.pop()?;
                self.push(Value::Bool(value.is_truthy()));
                Ok(Flow::Continue)
            }

            // ===== Special =====
            Opcode::Nop => Ok(Flow::Continue),
            Opcode::Halt => Ok(Flow::Halt),
        }
    }

    #[inline]
    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    #[inline]
    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow)
    }

    fn binary_compare(
        &mut self,
        int_cmp: fn(&i64, &i64) -> bool,
        double_cmp: fn(&f64, &f64) -> bool,
    ) -> Result<Flow, RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let result = match (&a, &b) {
            (Value::Int(x), Value::Int(y)) => int_cmp(x, y),
            _ => double_cmp(&a.as_double(), &b.as_double()),
        };
        self.push(Value::Bool(result));
        Ok(Flow::Continue)
    }

    fn jump_target(
        &self,
        program: &Program,
        instruction: &Instruction,
    ) -> Result<usize, RuntimeError> {
        match &instruction.op1 {
            Some(Operand::Addr(target)) => {
                if *target < program.len() {
                    Ok(*target)
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
            _ => Err(RuntimeError::MissingOperand {
                mnemonic: instruction.opcode.mnemonic(),
            }),
        }
    }

    fn write_output(&self, text: &str) -> Result<(), RuntimeError> {
        let mut out = self.output.lock().map_err(|_| RuntimeError::Io {
            message: "output channel poisoned".to_string(),
        })?;
        out.write_all(text.as_bytes())?;
        out.flush()?;
        Ok(())
    }

    // ── Diagnostics surface ──────────────────────────────────────────────

    /// Current instruction pointer
    pub fn current_ip(&self) -> usize {
        self.ip
    }

    /// Running flag
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Executed-instruction count for the last/current run
    pub fn executed_count(&self) -> u64 {
        self.executed
    }

    /// Operand-stack depth
    pub fn stack_size(&self) -> usize {
        self.stack.len()
    }

    /// Call-stack depth (number of active frames)
    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    /// Operand stack, bottom to top
    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    /// Global variable by name
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Named array contents
    pub fn array(&self, name: &str) -> Option<&[Value]> {
        self.arrays.get(name).map(Vec::as_slice)
    }

    /// Snapshot the full VM state for external tooling
    pub fn dump_state(&self) -> VmStateDump {
        VmStateDump::capture(
            self.ip,
            self.running,
            self.executed,
            &self.stack,
            &self.frames,
            &self.globals,
            &self.arrays,
        )
    }
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrap unexpected failures with the offending instruction
///
/// Recognized VM faults pass through unwrapped; host I/O failures pick up
/// the instruction's address and rendered form, original retained as source.
fn contain(err: RuntimeError, instruction: &Instruction) -> RuntimeError {
    match err {
        RuntimeError::Io { .. } => RuntimeError::InstructionFault {
            addr: instruction.addr,
            instruction: instruction.to_string(),
            source: Box::new(err),
        },
        recognized => recognized,
    }
}

/// ADD semantics shared with INC
///
/// Text concatenation when either operand is text (Null renders empty),
/// integer fast path, double fallback via coercion. Integer overflow
/// promotes the result to Double, the same promotion mixed-type operands get.
fn add_values(a: Value, b: Value) -> Value {
    match (&a, &b) {
        (Value::Str(_), _) | (_, Value::Str(_)) => {
            let mut text = a.concat_text();
            text.push_str(&b.concat_text());
            Value::string(text)
        }
        (Value::Int(x), Value::Int(y)) => match x.checked_add(*y) {
            Some(sum) => Value::Int(sum),
            None => Value::Double(*x as f64 + *y as f64),
        },
        _ => Value::Double(a.as_double() + b.as_double()),
    }
}

/// SUB semantics shared with DEC: integer fast path, double fallback,
/// overflow promoting to Double
fn sub_values(a: Value, b: Value) -> Value {
    match (&a, &b) {
        (Value::Int(x), Value::Int(y)) => match x.checked_sub(*y) {
            Some(difference) => Value::Int(difference),
            None => Value::Double(*x as f64 - *y as f64),
        },
        _ => Value::Double(a.as_double() - b.as_double()),
    }
}

fn literal_operand(instruction: &Instruction) -> Result<&Value, RuntimeError> {
    match &instruction.op1 {
        Some(Operand::Value(value)) => Ok(value),
        _ => Err(RuntimeError::MissingOperand {
            mnemonic: instruction.opcode.mnemonic(),
        }),
    }
}

fn name_operand(instruction: &Instruction) -> Result<&str, RuntimeError> {
    match &instruction.op1 {
        Some(Operand::Name(name)) => Ok(name),
        _ => Err(RuntimeError::MissingOperand {
            mnemonic: instruction.opcode.mnemonic(),
        }),
    }
}

fn argc_operand(instruction: &Instruction) -> Result<usize, RuntimeError> {
    match &instruction.op2 {
        Some(Operand::Value(value)) => Ok(value.as_int().max(0) as usize),
        _ => Err(RuntimeError::MissingOperand {
            mnemonic: instruction.opcode.mnemonic(),
        }),
    }
}
