//! `SolSentry` CLI: command-line client for the `SolSentry` review server.
//!
//! Most commands talk to the server over its REST API. `scan` and `gas` run
//! the heuristic scanner and gas estimator locally and need no server.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Value, json};
use solsentry_core::gas::{self, FunctionGas, GasReport};
use solsentry_core::scanner::{self, ScanReport, Severity};

// ── ANSI color helpers ───────────────────────────────────────────────

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const BLUE: &str = "\x1b[34m";
const MAGENTA: &str = "\x1b[35m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";
const BG_RED: &str = "\x1b[41m";

const BANNER_SMALL: &str = "◆ SolSentry";

/// Exit code for `scan --fail-on-high` when high or critical issues exist.
const EXIT_HIGH_FINDINGS: u8 = 2;

// ── CLI structure ────────────────────────────────────────────────────

/// SolSentry: AI-assisted Solidity security review.
#[derive(Parser)]
#[command(
    name = "solsentry",
    version,
    about = "SolSentry CLI: submit Solidity contracts for review, or scan them locally",
    long_about = None,
    after_help = format!(
        "{DIM}Environment variables:{RESET}\n  \
         SOLSENTRY_ADDR    Server address (default: http://127.0.0.1:8080)\n  \
         SOLSENTRY_TOKEN   Bearer token from 'solsentry login'\n\n\
         {DIM}Examples:{RESET}\n  \
         solsentry scan Bank.sol --fail-on-high\n  \
         solsentry gas Bank.sol --function withdraw\n  \
         solsentry contracts submit Bank.sol --name Bank\n  \
         solsentry analyze <contract-id> --wait"
    ),
)]
struct Cli {
    /// SolSentry server address.
    #[arg(long, env = "SOLSENTRY_ADDR", default_value = "http://127.0.0.1:8080")]
    addr: String,

    /// Bearer token.
    #[arg(long, env = "SOLSENTRY_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show server health.
    Status,
    /// Create an account and print its token.
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: String,
        #[arg(long, env = "SOLSENTRY_PASSWORD")]
        password: String,
    },
    /// Log in and print a token.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "SOLSENTRY_PASSWORD")]
        password: String,
    },
    /// Show the account the token belongs to.
    Whoami,
    /// Stored contract operations.
    Contracts {
        #[command(subcommand)]
        action: ContractCommands,
    },
    /// Start a security or gas analysis of a stored contract.
    Analyze {
        /// Contract ID.
        id: String,
        #[arg(long, value_enum, default_value = "security")]
        kind: KindArg,
        /// Wait for the result instead of returning once queued.
        #[arg(long, default_value = "false")]
        wait: bool,
    },
    /// Ask the AI provider for a fixed version of a stored contract.
    Rewrite {
        /// Contract ID.
        id: String,
        /// Extra guidance for the model.
        #[arg(long)]
        instructions: Option<String>,
        /// Write the rewritten source here instead of stdout.
        #[arg(long, short)]
        output: Option<String>,
    },
    /// List the analyses of a stored contract.
    Analyses {
        /// Contract ID.
        id: String,
    },
    /// Show notifications, or mark them all read.
    Notifications {
        /// Only unread notifications.
        #[arg(long, default_value = "false")]
        unread: bool,
        #[command(subcommand)]
        action: Option<NotificationCommands>,
    },
    /// Scan a Solidity file locally (no server needed).
    Scan {
        /// Path to a .sol file.
        file: String,
        /// Print the report as JSON.
        #[arg(long, default_value = "false")]
        json: bool,
        /// Exit with code 2 if any high or critical issue is found.
        #[arg(long, default_value = "false")]
        fail_on_high: bool,
    },
    /// Estimate gas for a Solidity file locally (no server needed).
    Gas {
        /// Path to a .sol file.
        file: String,
        /// Only this function.
        #[arg(long)]
        function: Option<String>,
        /// Print the estimate as JSON.
        #[arg(long, default_value = "false")]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ContractCommands {
    /// List your contracts (auditors and admins see all).
    List,
    /// Show a contract including its source.
    Get {
        id: String,
    },
    /// Upload a Solidity file.
    Submit {
        /// Path to a .sol file.
        file: String,
        /// Contract name (default: file stem).
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a contract and its analyses.
    Delete {
        id: String,
    },
}

#[derive(Subcommand)]
enum NotificationCommands {
    /// Mark every notification read.
    ReadAll,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Security,
    Gas,
}

impl KindArg {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Security => "security",
            Self::Gas => "gas",
        }
    }
}

// ── Pretty output helpers ────────────────────────────────────────────

fn header(icon: &str, title: &str) {
    println!("{BOLD}{CYAN}{icon} {title}{RESET}");
    println!("{DIM}─────────────────────────────────────────{RESET}");
}

fn kv_line(key: &str, value: &str) {
    println!("  {DIM}{key:<20}{RESET} {WHITE}{value}{RESET}");
}

fn success(msg: &str) {
    println!("{GREEN}{BOLD}✓{RESET} {msg}");
}

fn warning(msg: &str) {
    println!("{YELLOW}{BOLD}⚠{RESET} {YELLOW}{msg}{RESET}");
}

fn severity_badge(severity: &str) -> String {
    match severity {
        "critical" => format!("{BG_RED}{WHITE}{BOLD} CRITICAL {RESET}"),
        "high" => format!("{RED}{BOLD}HIGH{RESET}"),
        "medium" => format!("{YELLOW}{BOLD}MEDIUM{RESET}"),
        "low" => format!("{BLUE}LOW{RESET}"),
        _ => format!("{DIM}INFO{RESET}"),
    }
}

fn risk_colored(score: u64) -> String {
    let color = match score {
        0..=24 => GREEN,
        25..=59 => YELLOW,
        _ => RED,
    };
    format!("{color}{BOLD}{score}/100{RESET}")
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("-")
}

fn print_json(value: &Value) {
    if value.is_null() {
        return;
    }
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("failed to format JSON: {e}"),
    }
}

/// Findings as JSON objects, whether from a local report or the API.
fn print_findings(findings: &[Value]) {
    if findings.is_empty() {
        success("No issues found.");
        return;
    }
    for finding in findings {
        let severity = str_field(finding, "severity");
        let line = finding
            .get("line")
            .and_then(Value::as_u64)
            .map(|l| format!(" {DIM}line {l}{RESET}"))
            .unwrap_or_default();
        let source = match str_field(finding, "source") {
            "ai" => format!(" {MAGENTA}[ai]{RESET}"),
            _ => String::new(),
        };
        println!(
            "  {} {BOLD}{}{RESET}{line}{source}",
            severity_badge(severity),
            str_field(finding, "title"),
        );
        println!("      {DIM}{}{RESET}", str_field(finding, "rule_id"));
        println!("      {}", str_field(finding, "description"));
        println!("      {GREEN}→{RESET} {}", str_field(finding, "recommendation"));
    }
}

fn print_scan_report(path: &str, report: &ScanReport) {
    header("🔍", &format!("Scan: {path}"));
    kv_line("Risk score", &risk_colored(u64::from(report.risk_score)));
    kv_line("Lines of code", &report.metrics.lines_of_code.to_string());
    kv_line("Functions", &report.metrics.functions.to_string());
    kv_line(
        "Pragma",
        report.metrics.pragma.as_deref().unwrap_or("none"),
    );
    println!();
    let findings: Vec<Value> = report
        .findings
        .iter()
        .filter_map(|f| serde_json::to_value(f).ok())
        .collect();
    print_findings(&findings);
    println!();
    println!("  {DIM}{}{RESET}", report.summary());
    println!();
}

fn print_gas_report(path: &str, report: &GasReport) {
    header("⛽", &format!("Gas estimate: {path}"));
    kv_line("Deployment", &report.deployment_gas.to_string());
    kv_line("Bytecode (approx.)", &format!("{} bytes", report.estimated_bytecode_bytes));
    kv_line("All functions", &report.total_execution_gas.to_string());
    kv_line("Total", &report.total_gas.to_string());
    println!();
    for f in &report.functions {
        print_function_gas(f);
    }
    if !report.suggestions.is_empty() {
        println!();
        println!("  {BOLD}Suggestions{RESET}");
        for s in &report.suggestions {
            let line = s.line.map(|l| format!(" {DIM}(line {l}){RESET}")).unwrap_or_default();
            println!("  {CYAN}•{RESET} {}{line}", s.message);
        }
    }
    println!();
    warning("Estimates are heuristic; compile and profile for exact figures.");
}

fn print_function_gas(f: &FunctionGas) {
    println!(
        "  {BOLD}{:<24}{RESET} {DIM}{:<9} {:<11}{RESET} {WHITE}{:>10}{RESET}",
        f.name, f.visibility, f.mutability, f.estimated_gas
    );
}

fn print_session(resp: &Value) {
    let user = resp.get("user").unwrap_or(&Value::Null);
    success(&format!("Signed in as {}", str_field(user, "email")));
    kv_line("Role", str_field(user, "role"));
    kv_line("Expires", str_field(resp, "expires_at"));
    println!();
    println!("  {DIM}export SOLSENTRY_TOKEN={RESET}{}", str_field(resp, "token"));
    println!();
}

fn print_contract_list(resp: &Value) {
    header("📄", "Contracts");
    let Some(items) = resp.as_array().filter(|a| !a.is_empty()) else {
        println!("  {DIM}(none){RESET}");
        println!();
        return;
    };
    for c in items {
        println!(
            "  {CYAN}{}{RESET}  {BOLD}{}{RESET}  {DIM}{}{RESET}",
            str_field(c, "id"),
            str_field(c, "name"),
            c.get("compiler_version")
                .and_then(Value::as_str)
                .unwrap_or("no pragma"),
        );
    }
    println!();
}

fn print_contract(resp: &Value) {
    header("📄", str_field(resp, "name"));
    kv_line("ID", str_field(resp, "id"));
    kv_line("Owner", str_field(resp, "owner_id"));
    kv_line(
        "Compiler",
        resp.get("compiler_version")
            .and_then(Value::as_str)
            .unwrap_or("no pragma"),
    );
    kv_line("SHA-256", str_field(resp, "source_hash"));
    kv_line("Updated", str_field(resp, "updated_at"));
    let description = str_field(resp, "description");
    if !description.is_empty() && description != "-" {
        kv_line("Description", description);
    }
    println!();
    if let Some(source) = resp.get("source").and_then(Value::as_str) {
        println!("{source}");
    }
}

fn print_analysis(resp: &Value) {
    let status = str_field(resp, "status");
    let status_colored = match status {
        "completed" => format!("{GREEN}{status}{RESET}"),
        "failed" => format!("{RED}{status}{RESET}"),
        _ => format!("{YELLOW}{status}{RESET}"),
    };
    header("🛡", &format!("{} analysis", str_field(resp, "kind")));
    kv_line("ID", str_field(resp, "id"));
    kv_line("Status", &status_colored);
    if status == "completed" {
        let score = resp.get("risk_score").and_then(Value::as_u64).unwrap_or(0);
        kv_line("Risk score", &risk_colored(score));
    }
    if let Some(model) = resp.get("model").and_then(Value::as_str) {
        kv_line("Model", model);
    }
    if let Some(err) = resp.get("error").and_then(Value::as_str) {
        warning(err);
    }
    let summary = str_field(resp, "summary");
    if !summary.is_empty() && summary != "-" {
        println!();
        println!("  {summary}");
    }
    let findings = resp
        .get("findings")
        .and_then(Value::as_array)
        .filter(|_| status == "completed");
    if let Some(findings) = findings {
        println!();
        print_findings(findings);
    }
    println!();
}

fn print_analysis_list(resp: &Value) {
    header("🛡", "Analyses");
    let Some(items) = resp.as_array().filter(|a| !a.is_empty()) else {
        println!("  {DIM}(none){RESET}");
        println!();
        return;
    };
    for a in items {
        let score = a
            .get("risk_score")
            .and_then(Value::as_u64)
            .map(risk_colored)
            .unwrap_or_default();
        println!(
            "  {CYAN}{}{RESET}  {:<8} {:<9} {score}  {DIM}{}{RESET}",
            str_field(a, "id"),
            str_field(a, "kind"),
            str_field(a, "status"),
            str_field(a, "created_at"),
        );
    }
    println!();
}

fn print_notifications(resp: &Value) {
    header("🔔", "Notifications");
    let Some(items) = resp.as_array().filter(|a| !a.is_empty()) else {
        println!("  {DIM}(none){RESET}");
        println!();
        return;
    };
    for n in items {
        let marker = if n.get("read_at").is_some_and(Value::is_null) {
            format!("{CYAN}{BOLD}●{RESET}")
        } else {
            " ".to_owned()
        };
        println!("  {marker} {BOLD}{}{RESET}", str_field(n, "title"));
        println!("    {}", str_field(n, "body"));
        if let Some(link) = n.get("link").and_then(Value::as_str) {
            println!("    {DIM}{link}{RESET}");
        }
    }
    println!();
}

// ── HTTP client ──────────────────────────────────────────────────────

struct Client {
    http: reqwest::Client,
    addr: String,
    token: Option<String>,
}

impl Client {
    fn new(addr: &str, token: Option<String>) -> Self {
        let http = reqwest::Client::new();
        Self {
            http,
            addr: addr.trim_end_matches('/').to_owned(),
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.addr)
    }

    fn bearer(&self) -> Result<&str> {
        self.token
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("no token provided, set SOLSENTRY_TOKEN or use --token"))
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let resp = self
            .http
            .get(self.url(path))
            .bearer_auth(self.bearer()?)
            .send()
            .await
            .context("request failed")?;
        handle_response(resp).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let resp = self
            .http
            .post(self.url(path))
            .bearer_auth(self.bearer()?)
            .json(body)
            .send()
            .await
            .context("request failed")?;
        handle_response(resp).await
    }

    async fn post_no_auth(&self, path: &str, body: &Value) -> Result<Value> {
        let resp = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .context("request failed")?;
        handle_response(resp).await
    }

    async fn delete(&self, path: &str) -> Result<Value> {
        let resp = self
            .http
            .delete(self.url(path))
            .bearer_auth(self.bearer()?)
            .send()
            .await
            .context("request failed")?;
        handle_response(resp).await
    }

    async fn get_no_auth(&self, path: &str) -> Result<Value> {
        let resp = self
            .http
            .get(self.url(path))
            .send()
            .await
            .context("request failed")?;
        handle_response(resp).await
    }
}

async fn handle_response(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    if status == reqwest::StatusCode::NO_CONTENT {
        return Ok(Value::Null);
    }
    let body = resp.text().await.context("failed to read response body")?;
    if !status.is_success() {
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_owned))
            .unwrap_or(body);
        bail!("server returned {status}: {message}");
    }
    if body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).context("failed to parse response JSON")
}

// ── Command dispatch ─────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let client = Client::new(&cli.addr, cli.token);

    match run(client, cli.command).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!();
            eprintln!("  {RED}{BOLD}✗ Error:{RESET} {e:#}");
            eprintln!();
            ExitCode::FAILURE
        }
    }
}

async fn run(client: Client, cmd: Commands) -> Result<ExitCode> {
    match cmd {
        Commands::Scan {
            file,
            json,
            fail_on_high,
        } => return cmd_scan(&file, json, fail_on_high).await,
        Commands::Gas {
            file,
            function,
            json,
        } => cmd_gas(&file, function.as_deref(), json).await?,
        Commands::Status => cmd_status(&client).await?,
        Commands::Register {
            email,
            username,
            password,
        } => cmd_register(&client, &email, &username, &password).await?,
        Commands::Login { email, password } => cmd_login(&client, &email, &password).await?,
        Commands::Whoami => cmd_whoami(&client).await?,
        Commands::Contracts { action } => cmd_contracts(&client, action).await?,
        Commands::Analyze { id, kind, wait } => cmd_analyze(&client, &id, kind, wait).await?,
        Commands::Rewrite {
            id,
            instructions,
            output,
        } => cmd_rewrite(&client, &id, instructions.as_deref(), output.as_deref()).await?,
        Commands::Analyses { id } => {
            let resp = client.get(&format!("/v1/contracts/{id}/analyses")).await?;
            print_analysis_list(&resp);
        }
        Commands::Notifications { unread, action } => {
            cmd_notifications(&client, unread, action).await?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

// ── Local commands ───────────────────────────────────────────────────

async fn read_source(file: &str) -> Result<String> {
    tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("cannot read '{file}'"))
}

async fn cmd_scan(file: &str, json: bool, fail_on_high: bool) -> Result<ExitCode> {
    let source = read_source(file).await?;
    let report = scanner::scan(&source).with_context(|| format!("cannot scan '{file}'"))?;

    if json {
        print_json(&serde_json::to_value(&report)?);
    } else {
        print_scan_report(file, &report);
    }

    let high = report
        .max_severity()
        .is_some_and(|s| s >= Severity::High);
    if fail_on_high && high {
        return Ok(ExitCode::from(EXIT_HIGH_FINDINGS));
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_gas(file: &str, function: Option<&str>, json: bool) -> Result<()> {
    let source = read_source(file).await?;
    let report = gas::estimate(&source).with_context(|| format!("cannot estimate '{file}'"))?;

    let Some(name) = function else {
        if json {
            print_json(&serde_json::to_value(&report)?);
        } else {
            print_gas_report(file, &report);
        }
        return Ok(());
    };

    let Some(f) = report.functions.iter().find(|f| f.name == name) else {
        bail!("function '{name}' not found in '{file}'");
    };
    if json {
        print_json(&serde_json::to_value(f)?);
    } else {
        print_function_gas(f);
    }
    Ok(())
}

// ── Account commands ─────────────────────────────────────────────────

async fn cmd_status(client: &Client) -> Result<()> {
    println!();
    println!("  {BANNER_SMALL} {DIM}checking health...{RESET}");
    println!();
    let resp = client.get_no_auth("/v1/sys/health").await?;
    header("💓", "Server Status");
    let status = str_field(&resp, "status");
    let colored = if status == "ok" {
        format!("{GREEN}{status}{RESET}")
    } else {
        format!("{RED}{status}{RESET}")
    };
    kv_line("Status", &colored);
    kv_line("Version", str_field(&resp, "version"));
    kv_line("Database", str_field(&resp, "database"));
    let ai = resp.get("ai_enabled").and_then(Value::as_bool).unwrap_or(false);
    kv_line("AI review", if ai { "enabled" } else { "disabled" });
    println!();
    Ok(())
}

async fn cmd_register(client: &Client, email: &str, username: &str, password: &str) -> Result<()> {
    let body = json!({ "email": email, "username": username, "password": password });
    let resp = client.post_no_auth("/v1/auth/register", &body).await?;
    print_session(&resp);
    Ok(())
}

async fn cmd_login(client: &Client, email: &str, password: &str) -> Result<()> {
    let body = json!({ "email": email, "password": password });
    let resp = client.post_no_auth("/v1/auth/login", &body).await?;
    print_session(&resp);
    Ok(())
}

async fn cmd_whoami(client: &Client) -> Result<()> {
    let resp = client.get("/v1/auth/me").await?;
    header("👤", str_field(&resp, "username"));
    kv_line("ID", str_field(&resp, "id"));
    kv_line("Email", str_field(&resp, "email"));
    kv_line("Role", str_field(&resp, "role"));
    println!();
    Ok(())
}

// ── Contract and analysis commands ───────────────────────────────────

async fn cmd_contracts(client: &Client, action: ContractCommands) -> Result<()> {
    match action {
        ContractCommands::List => {
            let resp = client.get("/v1/contracts").await?;
            print_contract_list(&resp);
        }
        ContractCommands::Get { id } => {
            let resp = client.get(&format!("/v1/contracts/{id}")).await?;
            print_contract(&resp);
        }
        ContractCommands::Submit {
            file,
            name,
            description,
        } => {
            let source = read_source(&file).await?;
            let name = match name {
                Some(n) => n,
                None => default_name(&file)?,
            };
            let body = json!({
                "name": name,
                "description": description.unwrap_or_default(),
                "source": source,
            });
            let resp = client.post("/v1/contracts", &body).await?;
            success(&format!(
                "Submitted {} as {CYAN}{}{RESET}",
                str_field(&resp, "name"),
                str_field(&resp, "id")
            ));
        }
        ContractCommands::Delete { id } => {
            client.delete(&format!("/v1/contracts/{id}")).await?;
            success(&format!("Deleted contract {id}"));
        }
    }
    Ok(())
}

/// Contract name from a file path: `contracts/Bank.sol` gives `Bank`.
fn default_name(file: &str) -> Result<String> {
    Path::new(file)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| anyhow::anyhow!("cannot derive a name from '{file}', pass --name"))
}

async fn cmd_analyze(client: &Client, id: &str, kind: KindArg, wait: bool) -> Result<()> {
    if wait {
        println!("  {BANNER_SMALL} {DIM}analyzing, this can take a while...{RESET}");
    }
    let resp = client
        .post(
            &format!("/v1/contracts/{id}/analyze?wait={wait}"),
            &json!({ "kind": kind.as_str() }),
        )
        .await?;
    print_analysis(&resp);
    if !wait {
        println!(
            "  {DIM}queued; check later with 'solsentry analyses {id}'{RESET}"
        );
    }
    Ok(())
}

async fn cmd_rewrite(
    client: &Client,
    id: &str,
    instructions: Option<&str>,
    output: Option<&str>,
) -> Result<()> {
    println!("  {BANNER_SMALL} {DIM}rewriting, this can take a while...{RESET}");
    let resp = client
        .post(
            &format!("/v1/contracts/{id}/rewrite?wait=true"),
            &json!({ "instructions": instructions }),
        )
        .await?;

    if str_field(&resp, "status") != "completed" {
        print_analysis(&resp);
        bail!("rewrite failed");
    }
    let Some(source) = resp.get("rewritten_source").and_then(Value::as_str) else {
        bail!("server returned no rewritten source");
    };

    match output {
        Some(path) => {
            tokio::fs::write(path, source)
                .await
                .with_context(|| format!("cannot write '{path}'"))?;
            print_analysis(&resp);
            success(&format!("Rewritten source written to {path}"));
        }
        None => {
            eprintln!("  {DIM}{}{RESET}", str_field(&resp, "summary"));
            println!("{source}");
        }
    }
    Ok(())
}

async fn cmd_notifications(
    client: &Client,
    unread: bool,
    action: Option<NotificationCommands>,
) -> Result<()> {
    match action {
        Some(NotificationCommands::ReadAll) => {
            let resp = client.post("/v1/notifications/read-all", &json!({})).await?;
            let updated = resp.get("updated").and_then(Value::as_u64).unwrap_or(0);
            success(&format!("Marked {updated} notification(s) read"));
        }
        None => {
            let resp = client
                .get(&format!("/v1/notifications?unread={unread}"))
                .await?;
            print_notifications(&resp);
        }
    }
    Ok(())
}
