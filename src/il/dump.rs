//! IL dump utility
//!
//! Pretty-prints IL in a human-readable format. The optimizer driver emits
//! these dumps after each effective pass when its CFG trace is enabled, and
//! tests use them for failure output.

use super::cfg::ControlFlowGraph;
use super::modules::{FunctionLayout, IlModule};
use std::fmt::Write;

/// Dump an entire module to a string.
pub fn dump_module(module: &IlModule) -> String {
    let mut out = String::new();
    writeln!(out, "; Functions: {}", module.functions.len()).unwrap();
    writeln!(out).unwrap();
    for function in &module.functions {
        writeln!(out, "{}", dump_function(function)).unwrap();
    }
    out
}

/// Dump a single function to a string.
pub fn dump_function(function: &FunctionLayout) -> String {
    let mut out = String::new();
    let params: Vec<String> = function
        .signature
        .params
        .iter()
        .map(|ty| ty.to_string())
        .collect();
    writeln!(
        out,
        "fn @{}({}) -> {} {{",
        function.name,
        params.join(", "),
        function.signature.return_type
    )
    .unwrap();
    if function.context.is_empty() {
        writeln!(out, "  ; declaration").unwrap();
    } else {
        write!(out, "{}", dump_cfg(&function.context.cfg)).unwrap();
    }
    writeln!(out, "}}").unwrap();
    out
}

/// Dump a CFG to a string, blocks in arena order.
pub fn dump_cfg(cfg: &ControlFlowGraph) -> String {
    let mut out = String::new();
    for block in cfg.blocks() {
        write!(out, "{}:", block.id).unwrap();
        if !block.predecessors.is_empty() {
            let preds: Vec<String> = block.predecessors.iter().map(|p| p.to_string()).collect();
            write!(out, "  ; preds: {}", preds.join(" ")).unwrap();
        }
        writeln!(out).unwrap();
        for instr in &block.instructions {
            writeln!(out, "  {}", instr).unwrap();
        }
        if !block.successors.is_empty() {
            let succs: Vec<String> = block.successors.iter().map(|s| s.to_string()).collect();
            writeln!(out, "  ; -> {}", succs.join(" ")).unwrap();
        }
    }
    out
}
