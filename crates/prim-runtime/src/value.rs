//! Runtime value representation
//!
//! Shared value representation for the VM and upstream tooling.
//! - Int, Double, Bool, Null: Immediate values (stack-allocated)
//! - Strings: Heap-allocated, reference-counted (Arc<String>), immutable
//!
//! All coercions are total: every value maps to a double, a boolean, and a
//! textual rendering. Arithmetic promotes Int to Double when mixed with a
//! Double operand; `+` concatenates whenever either operand is text.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A dynamically-typed Prim value
#[derive(Debug, Clone)]
pub enum Value {
    /// Integer value (64-bit signed)
    Int(i64),
    /// Double-precision floating point value
    Double(f64),
    /// String value (reference-counted, immutable)
    Str(Arc<String>),
    /// Boolean value
    Bool(bool),
    /// Null value
    Null,
}

impl Value {
    /// Convenience constructor for string values
    pub fn string(s: impl Into<String>) -> Self {
        Value::Str(Arc::new(s.into()))
    }

    /// Total numeric coercion to double
    ///
    /// - Null -> 0.0
    /// - Int -> its value
    /// - Double -> itself
    /// - Bool -> 1.0 / 0.0
    /// - Str -> parsed numeric value, or 0.0 if unparsable
    pub fn as_double(&self) -> f64 {
        match self {
            Value::Int(n) => *n as f64,
            Value::Double(d) => *d,
            Value::Str(s) => s.trim().parse::<f64>().unwrap_or(0.0),
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Null => 0.0,
        }
    }

    /// Total numeric coercion to integer (truncating)
    pub fn as_int(&self) -> i64 {
        match self {
            Value::Int(n) => *n,
            _ => self.as_double() as i64,
        }
    }

    /// Total truthiness coercion
    ///
    /// - Null -> false
    /// - Bool -> itself
    /// - Int -> nonzero
    /// - Double -> magnitude exceeds machine epsilon
    /// - Str -> non-empty
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Double(d) => d.abs() > f64::EPSILON,
            Value::Str(s) => !s.is_empty(),
        }
    }

    /// Textual rendering used by `+` concatenation: Null renders as empty
    /// text, everything else as its canonical form.
    pub fn concat_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    /// Type name for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::Str(_) => "string",
            Value::Bool(_) => "bool",
            Value::Null => "null",
        }
    }
}

/// Value equality as observed by EQ/NE
///
/// Int-vs-Int is exact, Str-vs-Str is textual, Null equals only Null.
/// Every other pairing falls back to numeric coercion with an
/// epsilon-tolerant comparison, so `0.1 + 0.2 == 0.3` holds.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        _ => (a.as_double() - b.as_double()).abs() < f64::EPSILON,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        // Structural equality: used by the constant-pool deduplication.
        // Runtime EQ/NE goes through `values_equal` instead.
        match (self, other) {
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Double(x), Value::Double(y)) => x == y,
            (Value::Str(x), Value::Str(y)) => x == y,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Null, Value::Null) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Double(d) => write!(f, "{}", d),
            Value::Str(s) => write!(f, "{}", s.as_ref()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Null => write!(f, "null"),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::string(s)
    }
}

/// Runtime fault raised by the VM
///
/// Every variant is unrecoverable at the VM level: the first fault terminates
/// `execute` and surfaces to the caller. Recognized VM faults propagate as-is;
/// any other failure raised while executing a single instruction is rewrapped
/// as `InstructionFault` with that instruction's address and rendered form,
/// the original failure retained as source.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Executed-instruction counter exceeded the ceiling
    #[error("instruction limit exceeded ({limit} instructions executed): likely infinite loop")]
    InstructionLimitExceeded { limit: u64 },
    /// Unknown variable (LOAD)
    #[error("undefined variable: {name}")]
    UndefinedVariable { name: String },
    /// Unknown array (ALOAD)
    #[error("undefined array: {name}")]
    UndefinedArray { name: String },
    /// Unknown function (CALL)
    #[error("unknown function: {name}")]
    UnknownFunction { name: String },
    /// Unknown built-in (CALL_BUILTIN)
    #[error("unknown builtin: {name}")]
    UnknownBuiltin { name: String },
    /// Array index outside [0, length)
    #[error("array index {index} out of bounds (length {len})")]
    IndexOutOfBounds { index: i64, len: usize },
    /// Array write index beyond the per-array capacity ceiling
    #[error("array index {index} exceeds the array capacity limit ({limit})")]
    ArrayLimitExceeded { index: i64, limit: usize },
    /// Division by zero (or near-zero divisor)
    #[error("division by zero")]
    DivideByZero,
    /// Integer modulo by zero
    #[error("modulo by zero")]
    ModuloByZero,
    /// Popping an empty operand stack
    #[error("stack underflow")]
    StackUnderflow,
    /// Jump or call target outside the instruction stream
    #[error("jump target {target} out of range (program has {len} instructions)")]
    InvalidJumpTarget { target: usize, len: usize },
    /// Jump operand still carries a symbolic label name
    #[error("unresolved label: {name}")]
    UnresolvedLabel { name: String },
    /// Opcode with no dispatch behavior (reserved or unrecognized)
    #[error("unsupported opcode: {mnemonic}")]
    UnsupportedOpcode { mnemonic: &'static str },
    /// Instruction is missing a required operand, or the operand has the
    /// wrong shape for its opcode
    #[error("missing or malformed operand for {mnemonic}")]
    MissingOperand { mnemonic: &'static str },
    /// Host I/O failure on the output or input channel
    #[error("I/O error: {message}")]
    Io { message: String },
    /// Unexpected failure wrapped with the offending instruction
    #[error("fault at {addr:04} `{instruction}`: {source}")]
    InstructionFault {
        addr: usize,
        instruction: String,
        #[source]
        source: Box<RuntimeError>,
    },
}

impl From<std::io::Error> for RuntimeError {
    fn from(err: std::io::Error) -> Self {
        RuntimeError::Io {
            message: err.to_string(),
        }
    }
}
