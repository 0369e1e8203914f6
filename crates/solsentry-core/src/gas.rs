//! Heuristic gas estimator.
//!
//! Figures come from fixed per-construct constants, not from compiled
//! bytecode. They are useful for comparing revisions of the same contract
//! and for surfacing common optimizations, and should not be quoted as
//! on-chain costs.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ScanError;
use crate::scanner::DEFAULT_MAX_SOURCE_BYTES;
use crate::source::{self, EXTERNAL_CALL, FunctionBlock, StateVar, re};

pub const TX_BASE_GAS: u64 = 21_000;
pub const CONTRACT_CREATION_GAS: u64 = 32_000;
pub const CODE_DEPOSIT_GAS_PER_BYTE: u64 = 200;
pub const FUNCTION_DISPATCH_GAS: u64 = 2_000;
pub const FUNCTION_CALL_BASE_GAS: u64 = 21_000;
pub const STORAGE_WRITE_GAS: u64 = 20_000;
pub const EXTERNAL_CALL_GAS: u64 = 2_600;
pub const EVENT_EMIT_GAS: u64 = 1_500;
pub const LOOP_GAS: u64 = 5_000;

/// Longest `require` message that still fits in one word.
const MAX_REQUIRE_MESSAGE_BYTES: usize = 32;

static EMIT: LazyLock<Regex> = LazyLock::new(|| re(r"\bemit\s+[A-Za-z_]\w*\s*\("));
static LOOP: LazyLock<Regex> = LazyLock::new(|| re(r"\b(?:for|while)\s*\(|\bdo\s*\{"));
static LOOP_HEAD: LazyLock<Regex> = LazyLock::new(|| re(r"\b(?:for|while)\s*\("));
static LENGTH_IN_LOOP: LazyLock<Regex> =
    LazyLock::new(|| re(r"\bfor\s*\([^;]*;[^;]*\b([A-Za-z_][\w.]*)\.length\b"));
static REQUIRE_MESSAGE: LazyLock<Regex> =
    LazyLock::new(|| re(r#"\brequire\s*\([^;"]*,\s*"((?:[^"\\]|\\.)*)"\s*\)"#));
static SMALL_INT: LazyLock<Regex> = LazyLock::new(|| re(r"^u?int(?:8|16)$"));

/// Estimated cost of calling one function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionGas {
    pub name: String,
    pub visibility: String,
    pub mutability: String,
    pub estimated_gas: u64,
}

/// An optimization hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasSuggestion {
    pub rule: String,
    pub message: String,
    pub line: Option<usize>,
}

/// Result of a gas estimate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasReport {
    pub deployment_gas: u64,
    pub estimated_bytecode_bytes: u64,
    pub functions: Vec<FunctionGas>,
    /// Sum of every function estimate.
    pub total_execution_gas: u64,
    /// Deployment plus one call of every function.
    pub total_gas: u64,
    pub suggestions: Vec<GasSuggestion>,
}

impl GasReport {
    /// One-line human summary.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Estimated deployment gas {} ({} bytes of bytecode), {} function(s) totalling {} gas, {} suggestion(s).",
            self.deployment_gas,
            self.estimated_bytecode_bytes,
            self.functions.len(),
            self.total_execution_gas,
            self.suggestions.len(),
        )
    }
}

/// Estimate gas for a source file.
///
/// # Errors
///
/// Returns a [`ScanError`] for empty or oversized input.
pub fn estimate(source: &str) -> Result<GasReport, ScanError> {
    estimate_with_limit(source, DEFAULT_MAX_SOURCE_BYTES)
}

/// Estimate gas, rejecting sources larger than `max_bytes`.
///
/// # Errors
///
/// Returns a [`ScanError`] for empty or oversized input.
pub fn estimate_with_limit(source: &str, max_bytes: usize) -> Result<GasReport, ScanError> {
    source::validate_source(source, max_bytes)?;

    let code = source::strip_comments(source);
    let functions = source::functions(&code);
    let state_vars = source::state_variables(&code);

    let estimated_bytecode_bytes = bytecode_bytes(&code);
    let deployment_gas = TX_BASE_GAS
        + CONTRACT_CREATION_GAS
        + estimated_bytecode_bytes.saturating_mul(CODE_DEPOSIT_GAS_PER_BYTE);

    let function_gas: Vec<FunctionGas> = functions
        .iter()
        .filter(|f| f.body.is_some())
        .map(|f| function_estimate(&code, f, &state_vars))
        .collect();
    let total_execution_gas = function_gas.iter().map(|f| f.estimated_gas).sum::<u64>();

    Ok(GasReport {
        deployment_gas,
        estimated_bytecode_bytes,
        total_execution_gas,
        total_gas: deployment_gas.saturating_add(total_execution_gas),
        functions: function_gas,
        suggestions: suggestions(&code, &functions, &state_vars),
    })
}

/// Estimate a single function by name. `None` if the source is unusable or
/// no function with a body has that name.
#[must_use]
pub fn estimate_function_gas(source: &str, name: &str) -> Option<FunctionGas> {
    estimate(source)
        .ok()?
        .functions
        .into_iter()
        .find(|f| f.name == name)
}

/// Half a byte of bytecode per non-whitespace source byte, rounded up.
fn bytecode_bytes(code: &str) -> u64 {
    let significant = code.bytes().filter(|b| !b.is_ascii_whitespace()).count();
    u64::try_from(significant.div_ceil(2)).unwrap_or(u64::MAX)
}

fn function_estimate(code: &str, func: &FunctionBlock, state_vars: &[StateVar]) -> FunctionGas {
    let body = func.body_text(code);

    // Internal and private functions are never a transaction entry point.
    let entry = matches!(func.visibility.as_str(), "public" | "external");
    let mut gas = if entry {
        FUNCTION_CALL_BASE_GAS + FUNCTION_DISPATCH_GAS
    } else {
        0
    };

    let writes: usize = state_vars
        .iter()
        .filter(|v| !v.constant)
        .map(|v| source::count_state_writes(body, &v.name))
        .sum();
    gas += per(writes, STORAGE_WRITE_GAS);
    gas += per(EXTERNAL_CALL.find_iter(body).count(), EXTERNAL_CALL_GAS);
    gas += per(EMIT.find_iter(body).count(), EVENT_EMIT_GAS);
    gas += per(LOOP.find_iter(body).count(), LOOP_GAS);

    FunctionGas {
        name: func.name.clone(),
        visibility: func.visibility.clone(),
        mutability: func.mutability.clone(),
        estimated_gas: gas,
    }
}

fn per(count: usize, cost: u64) -> u64 {
    u64::try_from(count).unwrap_or(u64::MAX).saturating_mul(cost)
}

fn suggestions(code: &str, functions: &[FunctionBlock], state_vars: &[StateVar]) -> Vec<GasSuggestion> {
    let mut out = Vec::new();

    for func in functions {
        if func.visibility != "public" || matches!(func.name.as_str(), "constructor" | "receive" | "fallback") {
            continue;
        }
        let call = re(&format!(r"\b{}\s*\(", regex::escape(&func.name)));
        // The declaration itself is one match; anything more is an internal call.
        if call.find_iter(code).count() <= 1 {
            out.push(GasSuggestion {
                rule: "public-to-external".to_owned(),
                message: format!(
                    "function '{}' is public but never called internally; declare it external",
                    func.name
                ),
                line: Some(func.line),
            });
        }
    }

    for caps in LENGTH_IN_LOOP.captures_iter(code) {
        let (Some(whole), Some(array)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push(GasSuggestion {
            rule: "cache-array-length".to_owned(),
            message: format!(
                "loop condition reads {}.length on every iteration; cache it in a local variable",
                array.as_str()
            ),
            line: Some(source::line_at(code, whole.start())),
        });
    }

    for var in state_vars {
        if !var.constant && SMALL_INT.is_match(&var.type_name) {
            out.push(GasSuggestion {
                rule: "small-uint-state".to_owned(),
                message: format!(
                    "state variable '{}' is {}; unless packed with neighbours, uint256 is cheaper",
                    var.name, var.type_name
                ),
                line: Some(var.line),
            });
        }
        if var.constant && var.type_name == "string" {
            out.push(GasSuggestion {
                rule: "string-constant".to_owned(),
                message: format!(
                    "constant '{}' is a string; bytes32 is cheaper for values of 32 bytes or less",
                    var.name
                ),
                line: Some(var.line),
            });
        }
    }

    for caps in REQUIRE_MESSAGE.captures_iter(code) {
        let (Some(whole), Some(msg)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if msg.as_str().len() > MAX_REQUIRE_MESSAGE_BYTES {
            out.push(GasSuggestion {
                rule: "long-require-message".to_owned(),
                message: format!(
                    "require message is {} bytes; keep it within {MAX_REQUIRE_MESSAGE_BYTES} bytes or use a custom error",
                    msg.as_str().len()
                ),
                line: Some(source::line_at(code, whole.start())),
            });
        }
    }

    out.extend(repeated_storage_reads(code, state_vars));
    out.sort_by_key(|s| s.line);
    out
}

/// State variables referenced more than once inside a single loop body.
fn repeated_storage_reads(code: &str, state_vars: &[StateVar]) -> Vec<GasSuggestion> {
    let mut out = Vec::new();

    for head in LOOP_HEAD.find_iter(code) {
        let Some(close_paren) = matching_paren(code, head.end() - 1) else {
            continue;
        };
        let rest = &code[close_paren + 1..];
        let Some(open) = rest.find(|c: char| !c.is_whitespace()) else {
            continue;
        };
        if !rest[open..].starts_with('{') {
            continue;
        }
        let open = close_paren + 1 + open;
        let Some(close) = source::matching_brace(code, open) else {
            continue;
        };
        let body = &code[open + 1..close];

        for var in state_vars.iter().filter(|v| !v.constant) {
            let pattern = re(&format!(r"\b{}\b", regex::escape(&var.name)));
            if pattern.find_iter(body).count() >= 2 {
                out.push(GasSuggestion {
                    rule: "cache-storage-read".to_owned(),
                    message: format!(
                        "'{}' is read from storage repeatedly inside a loop; copy it to memory first",
                        var.name
                    ),
                    line: Some(source::line_at(code, head.start())),
                });
            }
        }
    }

    out
}

fn matching_paren(code: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in code.as_bytes().iter().enumerate().skip(open) {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}
