//! Heuristic vulnerability scanner.
//!
//! Rules run over comment-stripped source, so commented-out code never
//! produces a finding. Each rule yields one finding per distinct line it
//! fires on; the risk score weights each rule once, however many lines hit.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ScanError;
use crate::source::{self, EXTERNAL_CALL, FunctionBlock, StateVar, re};

/// Default upper bound on accepted source size (200 KiB).
pub const DEFAULT_MAX_SOURCE_BYTES: usize = 200 * 1024;

/// Finding severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Contribution of one rule at this severity to the risk score.
    #[must_use]
    pub const fn weight(self) -> u32 {
        match self {
            Self::Info => 0,
            Self::Low => 5,
            Self::Medium => 15,
            Self::High => 30,
            Self::Critical => 50,
        }
    }

    /// Lenient parse used for AI output ("HIGH", "moderate", ...).
    #[must_use]
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Self::Critical,
            "high" => Self::High,
            "medium" | "moderate" => Self::Medium,
            "low" => Self::Low,
            _ => Self::Info,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Where a finding came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingSource {
    Heuristic,
    Ai,
}

/// A single issue located in the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub rule_id: String,
    pub title: String,
    pub severity: Severity,
    /// 1-based line, when the issue has a location.
    pub line: Option<usize>,
    pub description: String,
    pub recommendation: String,
    pub source: FindingSource,
}

/// Structural counts collected during a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractMetrics {
    pub contracts: usize,
    pub interfaces: usize,
    pub libraries: usize,
    pub functions: usize,
    pub modifiers: usize,
    pub events: usize,
    pub payable_functions: usize,
    pub external_calls: usize,
    pub lines_of_code: usize,
    pub pragma: Option<String>,
}

/// Result of a heuristic scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    /// 0 to 100.
    pub risk_score: u32,
    /// Sorted by severity (highest first), then line.
    pub findings: Vec<Finding>,
    pub metrics: ContractMetrics,
    pub source_hash: String,
}

impl ScanReport {
    /// Highest severity among the findings.
    #[must_use]
    pub fn max_severity(&self) -> Option<Severity> {
        self.findings.iter().map(|f| f.severity).max()
    }

    /// Number of findings at `severity`.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }

    /// One-line human summary.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.findings.is_empty() {
            return "No issues detected by heuristic analysis.".to_owned();
        }
        format!(
            "{} finding(s): {} critical, {} high, {} medium, {} low, {} info. Risk score {}/100.",
            self.findings.len(),
            self.count(Severity::Critical),
            self.count(Severity::High),
            self.count(Severity::Medium),
            self.count(Severity::Low),
            self.count(Severity::Info),
            self.risk_score,
        )
    }
}

/// Static description of a rule.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub id: &'static str,
    pub title: &'static str,
    pub severity: Severity,
    pub description: &'static str,
    pub recommendation: &'static str,
}

/// Everything a detector may look at.
struct Unit<'a> {
    raw: &'a str,
    code: &'a str,
    functions: &'a [FunctionBlock],
    state_vars: &'a [StateVar],
    pragma: Option<&'a str>,
}

enum Detector {
    Pattern(&'static LazyLock<Regex>),
    Custom(fn(&Unit<'_>) -> Vec<usize>),
}

static TX_ORIGIN: LazyLock<Regex> = LazyLock::new(|| re(r"\btx\.origin\b"));
static DELEGATECALL: LazyLock<Regex> = LazyLock::new(|| re(r"\bdelegatecall\s*\("));
static SELFDESTRUCT: LazyLock<Regex> = LazyLock::new(|| re(r"\b(?:selfdestruct|suicide)\s*\("));
static LOW_LEVEL_CALL: LazyLock<Regex> =
    LazyLock::new(|| re(r"\.call\s*(?:\{[^}]*\})?\s*(?:\.value\s*\([^)]*\)\s*)?\("));
static TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| re(r"\bblock\.timestamp\b|\bnow\b"));
static RANDOMNESS: LazyLock<Regex> = LazyLock::new(|| {
    re(r"\b(?:block\.blockhash|blockhash|block\.difficulty|block\.prevrandao)\b")
});
static ASSEMBLY: LazyLock<Regex> =
    LazyLock::new(|| re(r#"\bassembly\s*(?:\(\s*"[^"]*"\s*\)\s*)?\{"#));
static SEND: LazyLock<Regex> = LazyLock::new(|| re(r"\.send\s*\("));
static SEND_RESULT_USED: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?:[=(!,?:&|<>]|\breturn)\s*$"));
static VALUE_CALL: LazyLock<Regex> =
    LazyLock::new(|| re(r"\.call\s*\{[^}]*\bvalue\s*:|\.call\.value\s*\("));
static LENGTH_LOOP: LazyLock<Regex> =
    LazyLock::new(|| re(r"\bfor\s*\([^;]*;[^;]*<=?\s*([A-Za-z_]\w*)\.length"));
static VERSION_MINOR: LazyLock<Regex> = LazyLock::new(|| re(r"0\.(\d+)"));
static KIND_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| re(r"\b(?:abstract\s+)?(contract|interface|library)\s+[A-Za-z_]\w*"));
static MODIFIER: LazyLock<Regex> = LazyLock::new(|| re(r"\bmodifier\s+[A-Za-z_]\w*"));
static EVENT: LazyLock<Regex> = LazyLock::new(|| re(r"\bevent\s+[A-Za-z_]\w*\s*\("));

static RULES: &[(Rule, Detector)] = &[
    (
        Rule {
            id: "tx-origin",
            title: "Authorization through tx.origin",
            severity: Severity::High,
            description: "tx.origin is the externally owned account that started the transaction; a malicious contract in the call chain passes checks based on it.",
            recommendation: "Use msg.sender for authorization checks.",
        },
        Detector::Pattern(&TX_ORIGIN),
    ),
    (
        Rule {
            id: "delegatecall",
            title: "Use of delegatecall",
            severity: Severity::High,
            description: "delegatecall runs foreign code against this contract's storage; an untrusted or user-controlled target can take over the contract.",
            recommendation: "Only delegatecall to trusted, immutable implementations and never to user-supplied addresses.",
        },
        Detector::Pattern(&DELEGATECALL),
    ),
    (
        Rule {
            id: "selfdestruct",
            title: "Use of selfdestruct",
            severity: Severity::High,
            description: "selfdestruct can remove contract code and force-send its balance; unprotected use destroys the contract.",
            recommendation: "Remove selfdestruct or guard it behind strict access control.",
        },
        Detector::Pattern(&SELFDESTRUCT),
    ),
    (
        Rule {
            id: "low-level-call",
            title: "Low-level call",
            severity: Severity::Medium,
            description: "Low-level calls bypass type checking and do not revert on failure.",
            recommendation: "Check the returned success flag and prefer typed interface calls.",
        },
        Detector::Pattern(&LOW_LEVEL_CALL),
    ),
    (
        Rule {
            id: "unchecked-send",
            title: "Unchecked send",
            severity: Severity::Medium,
            description: "send returns false on failure instead of reverting; ignoring the result silently loses funds.",
            recommendation: "Wrap send in require(...) or use call with an explicit success check.",
        },
        Detector::Custom(unchecked_send),
    ),
    (
        Rule {
            id: "timestamp-dependence",
            title: "Block timestamp dependence",
            severity: Severity::Low,
            description: "Validators can skew block.timestamp by several seconds.",
            recommendation: "Do not use block.timestamp for randomness or tight timing windows.",
        },
        Detector::Pattern(&TIMESTAMP),
    ),
    (
        Rule {
            id: "block-randomness",
            title: "Weak randomness from block data",
            severity: Severity::Medium,
            description: "blockhash, difficulty and prevrandao are predictable or influenceable by block producers.",
            recommendation: "Use a verifiable randomness source such as a VRF oracle or commit-reveal.",
        },
        Detector::Pattern(&RANDOMNESS),
    ),
    (
        Rule {
            id: "floating-pragma",
            title: "Floating pragma",
            severity: Severity::Info,
            description: "The compiler version is not pinned, so the deployed bytecode may differ from the tested build.",
            recommendation: "Pin an exact compiler version, e.g. pragma solidity 0.8.24;",
        },
        Detector::Custom(floating_pragma),
    ),
    (
        Rule {
            id: "outdated-compiler",
            title: "Outdated compiler version",
            severity: Severity::Medium,
            description: "Compiler versions before 0.8 lack built-in overflow checks and carry known bugs.",
            recommendation: "Upgrade to a recent 0.8.x compiler.",
        },
        Detector::Custom(outdated_compiler),
    ),
    (
        Rule {
            id: "inline-assembly",
            title: "Inline assembly",
            severity: Severity::Low,
            description: "Inline assembly bypasses Solidity's safety checks.",
            recommendation: "Keep assembly minimal, documented, and covered by tests.",
        },
        Detector::Pattern(&ASSEMBLY),
    ),
    (
        Rule {
            id: "reentrancy",
            title: "Possible reentrancy",
            severity: Severity::High,
            description: "State is written after an external call that forwards value, so the callee can re-enter before the update.",
            recommendation: "Follow checks-effects-interactions or use a reentrancy guard.",
        },
        Detector::Custom(reentrancy),
    ),
    (
        Rule {
            id: "unbounded-loop",
            title: "Loop over unbounded storage array",
            severity: Severity::Low,
            description: "Iterating a storage array whose length grows with usage can exceed the block gas limit.",
            recommendation: "Bound the iteration or paginate the work.",
        },
        Detector::Custom(unbounded_loop),
    ),
    (
        Rule {
            id: "missing-license",
            title: "Missing SPDX license identifier",
            severity: Severity::Info,
            description: "The source does not declare an SPDX license identifier.",
            recommendation: "Add a '// SPDX-License-Identifier: <license>' header.",
        },
        Detector::Custom(missing_license),
    ),
];

/// The full rule catalogue, in evaluation order.
pub fn rules() -> impl Iterator<Item = &'static Rule> {
    RULES.iter().map(|(rule, _)| rule)
}

/// Scan a source file with the default size limit.
///
/// # Errors
///
/// Returns a [`ScanError`] for empty or oversized input.
pub fn scan(source: &str) -> Result<ScanReport, ScanError> {
    scan_with_limit(source, DEFAULT_MAX_SOURCE_BYTES)
}

/// Scan a source file, rejecting anything larger than `max_bytes`.
///
/// # Errors
///
/// Returns a [`ScanError`] for empty or oversized input.
pub fn scan_with_limit(source: &str, max_bytes: usize) -> Result<ScanReport, ScanError> {
    source::validate_source(source, max_bytes)?;

    let code = source::strip_comments(source);
    let functions = source::functions(&code);
    let state_vars = source::state_variables(&code);
    let pragma = source::parse_pragma(source);

    let unit = Unit {
        raw: source,
        code: &code,
        functions: &functions,
        state_vars: &state_vars,
        pragma: pragma.as_deref(),
    };

    let mut findings = Vec::new();
    let mut fired = 0u32;

    for (rule, detector) in RULES {
        let lines: BTreeSet<usize> = match detector {
            Detector::Pattern(regex) => regex
                .find_iter(&code)
                .map(|m| source::line_at(&code, m.start()))
                .collect(),
            Detector::Custom(detect) => detect(&unit).into_iter().collect(),
        };
        if lines.is_empty() {
            continue;
        }
        fired = fired.saturating_add(rule.severity.weight());
        findings.extend(lines.into_iter().map(|line| Finding {
            rule_id: rule.id.to_owned(),
            title: rule.title.to_owned(),
            severity: rule.severity,
            line: Some(line),
            description: rule.description.to_owned(),
            recommendation: rule.recommendation.to_owned(),
            source: FindingSource::Heuristic,
        }));
    }

    sort_findings(&mut findings);

    Ok(ScanReport {
        risk_score: fired.min(100),
        findings,
        metrics: metrics(&unit),
        source_hash: source::source_hash(source),
    })
}

/// Highest severity first, then by line, then by rule id.
pub fn sort_findings(findings: &mut [Finding]) {
    findings.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.line.cmp(&b.line))
            .then_with(|| a.rule_id.cmp(&b.rule_id))
    });
}

fn metrics(unit: &Unit<'_>) -> ContractMetrics {
    let mut m = ContractMetrics {
        lines_of_code: source::lines_of_code(unit.code),
        pragma: unit.pragma.map(str::to_owned),
        ..ContractMetrics::default()
    };

    for caps in KIND_KEYWORD.captures_iter(unit.code) {
        match caps.get(1).map(|k| k.as_str()) {
            Some("contract") => m.contracts += 1,
            Some("interface") => m.interfaces += 1,
            Some("library") => m.libraries += 1,
            _ => {}
        }
    }

    m.functions = unit.functions.len();
    m.payable_functions = unit
        .functions
        .iter()
        .filter(|f| f.mutability == "payable")
        .count();
    m.modifiers = MODIFIER.find_iter(unit.code).count();
    m.events = EVENT.find_iter(unit.code).count();
    m.external_calls = EXTERNAL_CALL.find_iter(unit.code).count();
    m
}

// ── Custom detectors ────────────────────────────────────────────────

fn unchecked_send(unit: &Unit<'_>) -> Vec<usize> {
    let code = unit.code;
    SEND.find_iter(code)
        .filter(|m| {
            let recv = receiver_start(code, m.start());
            let stmt_start = code[..recv].rfind([';', '{', '}']).map_or(0, |i| i + 1);
            !SEND_RESULT_USED.is_match(code[stmt_start..recv].trim_end())
        })
        .map(|m| source::line_at(code, m.start()))
        .collect()
}

/// Walk back from `end` over the receiver expression of a member call,
/// e.g. `balances[i].to` or `payable(owner)`.
fn receiver_start(code: &str, end: usize) -> usize {
    let bytes = code.as_bytes();
    let mut i = end;
    while let Some(&b) = i.checked_sub(1).and_then(|j| bytes.get(j)) {
        if b.is_ascii_alphanumeric() || matches!(b, b'_' | b'$' | b'.') {
            i -= 1;
            continue;
        }
        let open = match b {
            b')' => b'(',
            b']' => b'[',
            _ => break,
        };
        let mut depth = 0usize;
        let mut matched = None;
        for j in (0..i).rev() {
            if bytes[j] == b {
                depth += 1;
            } else if bytes[j] == open {
                depth -= 1;
                if depth == 0 {
                    matched = Some(j);
                    break;
                }
            }
        }
        match matched {
            Some(j) => i = j,
            None => break,
        }
    }
    i
}

fn floating_pragma(unit: &Unit<'_>) -> Vec<usize> {
    match unit.pragma {
        Some(v) if v.contains('^') || v.contains('>') || v.contains('~') => {
            pragma_line(unit.code).into_iter().collect()
        }
        _ => Vec::new(),
    }
}

fn outdated_compiler(unit: &Unit<'_>) -> Vec<usize> {
    let Some(version) = unit.pragma else {
        return Vec::new();
    };
    let minor = VERSION_MINOR
        .captures(version)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok());
    match minor {
        Some(minor) if minor < 8 => pragma_line(unit.code).into_iter().collect(),
        _ => Vec::new(),
    }
}

fn pragma_line(code: &str) -> Option<usize> {
    code.find("pragma solidity")
        .map(|offset| source::line_at(code, offset))
}

fn reentrancy(unit: &Unit<'_>) -> Vec<usize> {
    let mutable: Vec<&StateVar> = unit.state_vars.iter().filter(|v| !v.constant).collect();
    if mutable.is_empty() {
        return Vec::new();
    }

    let mut lines = Vec::new();
    for func in unit.functions {
        let Some((start, _)) = func.body else { continue };
        let body = func.body_text(unit.code);
        let Some(call) = VALUE_CALL.find(body) else {
            continue;
        };
        let after = &body[call.end()..];
        if mutable.iter().any(|v| source::count_state_writes(after, &v.name) > 0) {
            lines.push(source::line_at(unit.code, start + call.start()));
        }
    }
    lines
}

fn unbounded_loop(unit: &Unit<'_>) -> Vec<usize> {
    LENGTH_LOOP
        .captures_iter(unit.code)
        .filter(|caps| {
            caps.get(1).is_some_and(|arr| {
                unit.state_vars
                    .iter()
                    .any(|v| v.name == arr.as_str() && v.type_name.ends_with(']'))
            })
        })
        .filter_map(|caps| caps.get(0))
        .map(|m| source::line_at(unit.code, m.start()))
        .collect()
}

fn missing_license(unit: &Unit<'_>) -> Vec<usize> {
    if unit.raw.contains("SPDX-License-Identifier") {
        Vec::new()
    } else {
        vec![1]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ids(report: &ScanReport) -> Vec<&str> {
        let mut ids: Vec<&str> = report.findings.iter().map(|f| f.rule_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    const CLEAN: &str = r"// SPDX-License-Identifier: MIT
pragma solidity 0.8.24;

contract Counter {
    uint256 public count;

    event Incremented(uint256 value);

    function increment() external {
        count += 1;
        emit Incremented(count);
    }
}
";

    const VULNERABLE: &str = r#"pragma solidity ^0.6.12;

contract Bank {
    mapping(address => uint256) public balances;
    address public owner;
    address[] public depositors;

    function withdraw() public {
        uint256 amount = balances[msg.sender];
        (bool ok, ) = msg.sender.call{value: amount}("");
        require(ok);
        balances[msg.sender] = 0;
    }

    function kill() public {
        require(tx.origin == owner);
        selfdestruct(payable(owner));
    }

    function pay(address payable to) public {
        to.send(1 ether);
    }

    function lottery() public view returns (uint256) {
        return uint256(blockhash(block.number - 1)) % 10;
    }

    function everyone() public view returns (uint256 n) {
        for (uint256 i = 0; i < depositors.length; i++) {
            n += 1;
        }
    }
}
"#;

    #[test]
    fn clean_contract_has_no_findings() {
        let report = scan(CLEAN).unwrap();
        assert!(report.findings.is_empty(), "{:?}", report.findings);
        assert_eq!(report.risk_score, 0);
        assert_eq!(report.metrics.contracts, 1);
        assert_eq!(report.metrics.functions, 1);
        assert_eq!(report.metrics.events, 1);
        assert_eq!(report.metrics.pragma.as_deref(), Some("0.8.24"));
        assert_eq!(report.summary(), "No issues detected by heuristic analysis.");
    }

    #[test]
    fn vulnerable_contract_triggers_expected_rules() {
        let report = scan(VULNERABLE).unwrap();
        let ids = ids(&report);
        for expected in [
            "block-randomness",
            "floating-pragma",
            "low-level-call",
            "missing-license",
            "outdated-compiler",
            "reentrancy",
            "selfdestruct",
            "tx-origin",
            "unbounded-loop",
            "unchecked-send",
        ] {
            assert!(ids.contains(&expected), "missing {expected}: {ids:?}");
        }
        assert!(!ids.contains(&"delegatecall"));
        assert_eq!(report.risk_score, 100);
        assert_eq!(report.max_severity(), Some(Severity::High));
    }

    #[test]
    fn findings_carry_line_numbers() {
        let report = scan(VULNERABLE).unwrap();
        let line_of = |id: &str| {
            report
                .findings
                .iter()
                .find(|f| f.rule_id == id)
                .and_then(|f| f.line)
        };
        assert_eq!(line_of("reentrancy"), Some(10));
        assert_eq!(line_of("tx-origin"), Some(16));
        assert_eq!(line_of("selfdestruct"), Some(17));
        assert_eq!(line_of("unchecked-send"), Some(21));
        assert_eq!(line_of("missing-license"), Some(1));
    }

    #[test]
    fn findings_are_sorted_by_severity() {
        let report = scan(VULNERABLE).unwrap();
        let severities: Vec<Severity> = report.findings.iter().map(|f| f.severity).collect();
        let mut sorted = severities.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(severities, sorted);
    }

    #[test]
    fn commented_code_is_ignored() {
        let src = r"// SPDX-License-Identifier: MIT
pragma solidity 0.8.24;
contract A {
    // selfdestruct(payable(msg.sender));
    /* require(tx.origin == msg.sender); */
    function f() external {}
}
";
        let report = scan(src).unwrap();
        assert!(report.findings.is_empty(), "{:?}", report.findings);
    }

    #[test]
    fn checked_send_is_not_flagged() {
        let src = r"// SPDX-License-Identifier: MIT
pragma solidity 0.8.24;
contract A {
    function f(address payable to) external {
        require(to.send(1));
        bool ok = to.send(1);
        if (!to.send(1)) { revert(); }
    }
}
";
        let report = scan(src).unwrap();
        assert!(!ids(&report).contains(&"unchecked-send"));
    }

    #[test]
    fn bare_send_statements_are_flagged() {
        for stmt in [
            "to.send(1);",
            "gift.send(1);",
            "notify.send(1);",
            "boolean.send(1);",
            "payable(shift).send(1);",
            "if (c) to.send(1);",
            "if (c) { to.send(1); } else to.send(2);",
            "returnee.send(1);",
        ] {
            let src = format!(
                "// SPDX-License-Identifier: MIT\npragma solidity 0.8.24;\ncontract A {{\n    function f(address payable to, address payable gift, address payable notify, address payable boolean, address shift, address payable returnee, bool c) external {{\n        {stmt}\n    }}\n}}\n"
            );
            let report = scan(&src).unwrap();
            let send = report.findings.iter().find(|f| f.rule_id == "unchecked-send");
            assert_eq!(send.and_then(|f| f.line), Some(5), "not flagged: {stmt}");
        }
    }

    #[test]
    fn used_send_results_are_not_flagged() {
        for stmt in [
            "require(payable(shift).send(1));",
            "return gift.send(1);",
            "ok = notify.send(1);",
            "if (c && to.send(1)) { ok = true; }",
            "ok = c ? to.send(1) : false;",
        ] {
            let src = format!(
                "// SPDX-License-Identifier: MIT\npragma solidity 0.8.24;\ncontract A {{\n    function f(address payable to, address payable gift, address payable notify, address shift, bool c) external returns (bool ok) {{\n        {stmt}\n    }}\n}}\n"
            );
            let report = scan(&src).unwrap();
            assert!(!ids(&report).contains(&"unchecked-send"), "flagged: {stmt}");
        }
    }

    #[test]
    fn effects_before_interaction_is_not_reentrancy() {
        let src = r#"// SPDX-License-Identifier: MIT
pragma solidity 0.8.24;
contract A {
    mapping(address => uint256) balances;
    function withdraw() external {
        uint256 amount = balances[msg.sender];
        balances[msg.sender] = 0;
        (bool ok, ) = msg.sender.call{value: amount}("");
        require(ok, "send failed");
    }
}
"#;
        let report = scan(src).unwrap();
        let ids = ids(&report);
        assert!(!ids.contains(&"reentrancy"), "{ids:?}");
        assert!(ids.contains(&"low-level-call"));
    }

    #[test]
    fn risk_score_weights_each_rule_once() {
        let src = r"// SPDX-License-Identifier: MIT
pragma solidity 0.8.24;
contract A {
    function a() external view returns (uint256) { return block.timestamp; }
    function b() external view returns (uint256) { return block.timestamp; }
}
";
        let report = scan(src).unwrap();
        assert_eq!(report.findings.len(), 2);
        assert_eq!(report.risk_score, Severity::Low.weight());
    }

    #[test]
    fn metrics_count_declarations() {
        let src = r"// SPDX-License-Identifier: MIT
pragma solidity 0.8.24;
interface IERC20 { function transfer(address, uint256) external returns (bool); }
library Math { function max(uint a, uint b) internal pure returns (uint) { return a > b ? a : b; } }
abstract contract Base {
    modifier onlyOwner() { _; }
}
contract Vault is Base {
    event Deposit(address who, uint256 amount);
    function deposit() external payable { emit Deposit(msg.sender, msg.value); }
    receive() external payable {}
}
";
        let m = scan(src).unwrap().metrics;
        assert_eq!(m.interfaces, 1);
        assert_eq!(m.libraries, 1);
        assert_eq!(m.contracts, 2);
        assert_eq!(m.modifiers, 1);
        assert_eq!(m.events, 1);
        assert_eq!(m.functions, 4);
        assert_eq!(m.payable_functions, 2);
    }

    #[test]
    fn empty_and_oversized_are_rejected() {
        assert!(matches!(scan(""), Err(ScanError::EmptySource)));
        assert!(matches!(
            scan_with_limit(CLEAN, 10),
            Err(ScanError::TooLarge { .. })
        ));
    }

    #[test]
    fn severity_lenient_parse() {
        assert_eq!(Severity::parse_lenient("HIGH"), Severity::High);
        assert_eq!(Severity::parse_lenient("moderate"), Severity::Medium);
        assert_eq!(Severity::parse_lenient("whatever"), Severity::Info);
    }

    #[test]
    fn every_rule_has_unique_id() {
        let mut ids: Vec<&str> = rules().map(|r| r.id).collect();
        let total = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }
}
