//! Call frame implementation for function calls

use crate::value::Value;
use std::collections::HashMap;

/// Call frame for function calls
///
/// Each CALL creates a frame; RET/RET_VAL destroys it. Positional arguments
/// are bound as locals named `arg0..arg{n-1}` (the last-pushed argument gets
/// the highest index). While any frame is active, variable writes always
/// target its locals; a same-named global is shadowed, never promoted.
///
/// `return_addr` stores the address of the CALL instruction itself; the
/// dispatch loop resumes one past it, the same compensation the post-dispatch
/// increment applies everywhere else.
#[derive(Debug, Clone)]
pub struct CallFrame {
    /// Function name (for diagnostics and state dumps)
    pub function_name: String,
    /// Address of the CALL instruction to resume past
    pub return_addr: usize,
    /// Local variable storage, seeded from the bound arguments
    pub locals: HashMap<String, Value>,
}

impl CallFrame {
    /// Create a frame with arguments already popped in reverse order
    /// (`args[0]` is the first-pushed argument).
    pub fn new(function_name: impl Into<String>, return_addr: usize, args: Vec<Value>) -> Self {
        let locals = args
            .into_iter()
            .enumerate()
            .map(|(i, v)| (format!("arg{}", i), v))
            .collect();
        Self {
            function_name: function_name.into(),
            return_addr,
            locals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arguments_bound_positionally() {
        let frame = CallFrame::new("f", 7, vec![Value::Int(10), Value::string("x")]);
        assert_eq!(frame.locals["arg0"], Value::Int(10));
        assert_eq!(frame.locals["arg1"], Value::string("x"));
        assert_eq!(frame.return_addr, 7);
        assert_eq!(frame.function_name, "f");
    }

    #[test]
    fn test_zero_arity_frame() {
        let frame = CallFrame::new("g", 0, Vec::new());
        assert!(frame.locals.is_empty());
    }
}
