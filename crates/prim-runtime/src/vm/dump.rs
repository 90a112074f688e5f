//! JSON state dump for external tooling
//!
//! Snapshots the VM's observable state (instruction pointer, flags, operand
//! stack, call frames, globals, arrays) into a serde-serializable structure.
//! Values are rendered in their canonical display form so consumers never
//! need this crate's value model; maps are captured as BTreeMaps for stable
//! output ordering.

use super::frame::CallFrame;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Dump format version, bumped on breaking layout changes
pub const DUMP_VERSION: u32 = 1;

/// One call frame in a state dump
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDump {
    /// Function name
    pub function: String,
    /// Address of the originating CALL instruction
    pub return_addr: usize,
    /// Locals, rendered and name-sorted
    pub locals: BTreeMap<String, String>,
}

/// Complete VM state snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmStateDump {
    /// Dump format version
    pub dump_version: u32,
    /// Instruction pointer at capture time
    pub ip: usize,
    /// Running flag
    pub running: bool,
    /// Executed-instruction count
    pub executed: u64,
    /// Operand stack, bottom to top, rendered
    pub stack: Vec<String>,
    /// Call frames, outermost first
    pub frames: Vec<FrameDump>,
    /// Global variables, rendered and name-sorted
    pub globals: BTreeMap<String, String>,
    /// Named arrays, elements rendered in index order
    pub arrays: BTreeMap<String, Vec<String>>,
}

impl VmStateDump {
    pub(super) fn capture(
        ip: usize,
        running: bool,
        executed: u64,
        stack: &[Value],
        frames: &[CallFrame],
        globals: &HashMap<String, Value>,
        arrays: &HashMap<String, Vec<Value>>,
    ) -> Self {
        Self {
            dump_version: DUMP_VERSION,
            ip,
            running,
            executed,
            stack: stack.iter().map(Value::to_string).collect(),
            frames: frames
                .iter()
                .map(|frame| FrameDump {
                    function: frame.function_name.clone(),
                    return_addr: frame.return_addr,
                    locals: frame
                        .locals
                        .iter()
                        .map(|(name, value)| (name.clone(), value.to_string()))
                        .collect(),
                })
                .collect(),
            globals: globals
                .iter()
                .map(|(name, value)| (name.clone(), value.to_string()))
                .collect(),
            arrays: arrays
                .iter()
                .map(|(name, elements)| {
                    (
                        name.clone(),
                        elements.iter().map(Value::to_string).collect(),
                    )
                })
                .collect(),
        }
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}
