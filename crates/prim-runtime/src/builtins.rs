//! Built-in functions
//!
//! Fixed catalog of VM-provided functions invoked by name and argument count
//! via CALL_BUILTIN. Math functions operate on double-coerced operands and
//! return doubles. The I/O channel types defined here are shared with the
//! VM's PRINT/PRINTLN/INPUT opcodes.
//!
//! `length` has one extra behavior the registry cannot provide on its own:
//! when the argument is text naming a live array, the VM intercepts the call
//! and answers with the element count (arrays live in VM-owned storage and
//! never flow across the stack).

use crate::value::{RuntimeError, Value};
use std::io::{BufRead, BufReader, Write};
use std::sync::{Arc, Mutex};

/// Output channel for PRINT/PRINTLN and the `print` builtin
pub type OutputWriter = Arc<Mutex<dyn Write + Send>>;

/// Input channel for INPUT and the `input` builtin
pub type InputReader = Arc<Mutex<dyn BufRead + Send>>;

/// Default output channel (stdout)
pub fn stdout_writer() -> OutputWriter {
    Arc::new(Mutex::new(std::io::stdout()))
}

/// Default input channel (stdin)
pub fn stdin_reader() -> InputReader {
    Arc::new(Mutex::new(BufReader::new(std::io::stdin())))
}

/// Clonable in-memory output sink
///
/// Install with `vm.set_output_writer(Arc::new(Mutex::new(buffer.clone())))`
/// and read captured output back through `contents()`. Used by tests and by
/// embedders that redirect program output.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Captured output as UTF-8 text (lossy)
    pub fn contents(&self) -> String {
        let bytes = self.inner.lock().expect("output buffer poisoned");
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Wrap this buffer as an installable output channel
    pub fn writer(&self) -> OutputWriter {
        Arc::new(Mutex::new(self.clone()))
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner
            .lock()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "output buffer poisoned"))?
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Check if a name is a registered builtin
pub fn is_builtin(name: &str) -> bool {
    matches!(
        name,
        "print"
            | "sqrt"
            | "abs"
            | "exp"
            | "log"
            | "sin"
            | "cos"
            | "tan"
            | "pow"
            | "min"
            | "max"
            | "floor"
            | "ceil"
            | "round"
            | "length"
            | "input"
            | "parseInt"
            | "parseDouble"
            | "toString"
    )
}

/// Invoke a builtin by name
///
/// Returns `Ok(None)` for builtins with no return value (`print`); the VM
/// pushes the result only when one is produced. An unregistered name is a
/// fatal fault.
pub fn call_builtin(
    name: &str,
    args: &[Value],
    output: &OutputWriter,
    input: &InputReader,
) -> Result<Option<Value>, RuntimeError> {
    match name {
        "print" => {
            let joined = args
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            let mut out = output.lock().map_err(|_| RuntimeError::Io {
                message: "output channel poisoned".to_string(),
            })?;
            writeln!(out, "{}", joined)?;
            Ok(None)
        }

        // ===== Math (double-coerced, returning double) =====
        "sqrt" => Ok(Some(Value::Double(arg_double(args, 0).sqrt()))),
        "abs" => Ok(Some(Value::Double(arg_double(args, 0).abs()))),
        "exp" => Ok(Some(Value::Double(arg_double(args, 0).exp()))),
        "log" => Ok(Some(Value::Double(arg_double(args, 0).ln()))),
        "sin" => Ok(Some(Value::Double(arg_double(args, 0).sin()))),
        "cos" => Ok(Some(Value::Double(arg_double(args, 0).cos()))),
        "tan" => Ok(Some(Value::Double(arg_double(args, 0).tan()))),
        "floor" => Ok(Some(Value::Double(arg_double(args, 0).floor()))),
        "ceil" => Ok(Some(Value::Double(arg_double(args, 0).ceil()))),
        "round" => Ok(Some(Value::Double(arg_double(args, 0).round()))),
        "pow" => Ok(Some(Value::Double(
            arg_double(args, 0).powf(arg_double(args, 1)),
        ))),
        "min" => Ok(Some(Value::Double(
            arg_double(args, 0).min(arg_double(args, 1)),
        ))),
        "max" => Ok(Some(Value::Double(
            arg_double(args, 0).max(arg_double(args, 1)),
        ))),

        "length" => {
            // Array-name arguments are intercepted by the VM before this
            // registry is consulted.
            let len = match args.first() {
                Some(Value::Str(s)) => s.chars().count() as i64,
                _ => 0,
            };
            Ok(Some(Value::Int(len)))
        }

        "input" => {
            let line = read_line(input)?;
            Ok(Some(Value::string(line)))
        }

        "parseInt" => {
            let n = match args.first() {
                Some(Value::Int(n)) => *n,
                Some(Value::Str(s)) => s
                    .trim()
                    .parse::<i64>()
                    .unwrap_or_else(|_| s.trim().parse::<f64>().unwrap_or(0.0) as i64),
                Some(other) => other.as_int(),
                None => 0,
            };
            Ok(Some(Value::Int(n)))
        }
        "parseDouble" => {
            let d = args.first().map(Value::as_double).unwrap_or(0.0);
            Ok(Some(Value::Double(d)))
        }
        "toString" => {
            let s = args
                .first()
                .map(|v| v.to_string())
                .unwrap_or_default();
            Ok(Some(Value::string(s)))
        }

        _ => Err(RuntimeError::UnknownBuiltin {
            name: name.to_string(),
        }),
    }
}

/// Read one line from the input channel, without the trailing newline
///
/// End of input yields an empty line.
pub fn read_line(input: &InputReader) -> Result<String, RuntimeError> {
    let mut reader = input.lock().map_err(|_| RuntimeError::Io {
        message: "input channel poisoned".to_string(),
    })?;
    let mut line = String::new();
    reader.read_line(&mut line)?;
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(line)
}

fn arg_double(args: &[Value], index: usize) -> f64 {
    args.get(index).map(Value::as_double).unwrap_or(0.0)
}
