use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::{
    step::Params, CompletedStep, EnvironmentFacts, ErrorKind, FileMetadata, PlanItemStatus,
    StepResult, TaskPlan, Tool,
};

use super::ledger::ConversationLedger;

const MAX_RECENT_STEPS_IN_PROMPT: usize = 10;
const MAX_LOOP_WINDOW: usize = 5;
const MAX_FILE_LIST_IN_PROMPT: usize = 30;
const MAX_LARGEST_FILES: usize = 10;

static SIZE_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(\d+(?:\.\d+)?)\s*(B|KiB|MiB|GiB|TiB)?$").unwrap()
});
static TOTAL_FOOTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)TOTAL:\s*(\d+)\s*items?\s*\((\d+)\s*dirs?,\s*(\d+)\s*files?\)").unwrap());

static GIT_BRANCH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(?:On branch (\S+)|\* (\S+))$").unwrap());
static PYTHON_VERSION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Python (\d+\.\d+\.\d+)").unwrap());
static NODE_VERSION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^v(\d+\.\d+\.\d+)$").unwrap());
static PWD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^(/[^\s]*)$").unwrap());

/// Ground-truth record of everything observed in one session. This is the
/// entire mechanism by which the LLM learns state: it never sees raw tool
/// output beyond what `format_for_prompt` chooses to surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub scanned_paths: BTreeSet<String>,
    pub files: Vec<String>,
    pub dirs: Vec<String>,
    pub file_metadata: BTreeMap<String, FileMetadata>,
    pub read_files: BTreeSet<String>,
    pub edited_files: BTreeSet<String>,
    pub completed_steps: Vec<CompletedStep>,
    pub environment_facts: EnvironmentFacts,
    pub ledger: ConversationLedger,
    pub discovered_agents: Vec<String>,
    pub queried_agents: BTreeSet<String>,
    pub agents_verified: bool,
    pub task_plan: Option<TaskPlan>,
    pub user_info: BTreeMap<String, String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears observations but preserves `user_info` and `ledger` — the
    /// cross-task memory within one session id.
    pub fn reset(&mut self) {
        self.scanned_paths.clear();
        self.files.clear();
        self.dirs.clear();
        self.file_metadata.clear();
        self.read_files.clear();
        self.edited_files.clear();
        self.completed_steps.clear();
        self.environment_facts = EnvironmentFacts::default();
        self.discovered_agents.clear();
        self.queried_agents.clear();
        self.agents_verified = false;
        self.task_plan = None;
        // ledger and user_info intentionally preserved
    }

    // ---- queries ----

    pub fn has_read(&self, path: &str) -> bool {
        self.read_files.contains(path)
    }

    pub fn has_edited(&self, path: &str) -> bool {
        self.edited_files.contains(path)
    }

    pub fn has_scanned(&self, path: &str) -> bool {
        self.scanned_paths.contains(path)
    }

    pub fn get_editable_files(&self) -> Vec<&str> {
        self.files.iter().map(String::as_str).collect()
    }

    pub fn get_unread_files(&self) -> Vec<&str> {
        self.files
            .iter()
            .filter(|f| !self.read_files.contains(f.as_str()))
            .map(String::as_str)
            .collect()
    }

    /// Unique file whose path ends with `suffix`, or `None` if zero or
    /// more than one match (path-correction must never guess).
    pub fn find_unique_suffix_match(&self, suffix: &str) -> Option<&str> {
        let mut matches = self.files.iter().filter(|f| f.ends_with(suffix));
        let first = matches.next()?;
        if matches.next().is_some() {
            None
        } else {
            Some(first.as_str())
        }
    }

    // ---- mutation ----

    /// Produces exactly one new `CompletedStep`, mutates observation sets
    /// atomically, and extracts new ledger key/value pairs. Never panics
    /// on malformed tool output.
    pub fn update_from_step(
        &mut self,
        step_id: &str,
        tool: &Tool,
        params: &Params,
        result: &StepResult,
    ) {
        let path = params.get("path").and_then(|v| v.as_str()).map(str::to_owned);
        let command = params.get("command").and_then(|v| v.as_str()).map(str::to_owned);
        let agent_id = params.get("agent_id").and_then(|v| v.as_str()).map(str::to_owned);

        if result.success {
            match tool {
                Tool::ScanWorkspace => self.ingest_scan_output(&result.output),
                Tool::ReadFile => {
                    if let Some(p) = &path {
                        self.read_files.insert(p.clone());
                    }
                }
                Tool::WriteFile | Tool::ReplaceInFile | Tool::InsertInFile | Tool::AppendToFile => {
                    if let Some(p) = &path {
                        self.edited_files.insert(p.clone());
                        if !self.files.iter().any(|f| f == p) {
                            self.files.push(p.clone());
                        }
                    }
                }
                Tool::ExecuteShell => self.extract_shell_facts(&result.output),
                Tool::ListAgents => {
                    self.agents_verified = true;
                }
                Tool::Execute => {
                    if let Some(a) = &agent_id {
                        self.queried_agents.insert(a.clone());
                    }
                }
                _ => {}
            }
            self.detect_project_type();
            self.ledger.extract_from_output(&result.output, command.as_deref());
        }

        let (error_kind, error_message) = if result.success {
            (None, None)
        } else {
            match result.error_kind {
                Some(kind) => (Some(kind), result.error_message.clone()),
                None => {
                    let kind = Self::classify_error(&result.output);
                    let message: String = result.output.chars().take(200).collect();
                    (Some(kind), Some(message))
                }
            }
        };

        self.completed_steps.push(CompletedStep {
            step_id: step_id.to_owned(),
            tool: tool.clone(),
            agent_id,
            path,
            command,
            output_summary: CompletedStep::output_summary_of(&result.output),
            success: result.success,
            error_kind,
            error_message,
            timestamp: Utc::now(),
        });
    }

    /// Scan output is a fixed text table (`NAME TYPE SIZE MODIFIED`).
    /// Unparseable rows are skipped silently; a `TOTAL:` footer updates
    /// environment totals.
    fn ingest_scan_output(&mut self, output: &str) {
        for line in output.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(caps) = TOTAL_FOOTER_RE.captures(line) {
                self.environment_facts.total_dirs = caps[2].parse().unwrap_or(0);
                self.environment_facts.total_files = caps[3].parse().unwrap_or(0);
                continue;
            }
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 2 {
                continue;
            }
            let name = cols[0];
            let kind = cols[1];
            match kind.to_lowercase().as_str() {
                "file" => {
                    if !self.files.iter().any(|f| f == name) {
                        self.files.push(name.to_owned());
                    }
                    if let Some(size_tok) = cols.get(2) {
                        if let Some(bytes) = Self::parse_size_token(size_tok) {
                            self.environment_facts.total_bytes += bytes;
                            self.file_metadata.insert(
                                name.to_owned(),
                                FileMetadata {
                                    size_bytes: bytes,
                                    human_size: FileMetadata::human_readable(bytes),
                                    modified: cols.get(3).map(|s| s.to_string()),
                                    file_type: std::path::Path::new(name)
                                        .extension()
                                        .map(|e| e.to_string_lossy().into_owned()),
                                    line_count: None,
                                },
                            );
                        }
                    }
                }
                "dir" | "directory" => {
                    if !self.dirs.iter().any(|d| d == name) {
                        self.dirs.push(name.to_owned());
                    }
                }
                _ => continue,
            }
        }
    }

    fn parse_size_token(token: &str) -> Option<u64> {
        let caps = SIZE_TOKEN_RE.captures(token)?;
        let value: f64 = caps[1].parse().ok()?;
        let multiplier = match caps.get(2).map(|m| m.as_str().to_uppercase()) {
            None | Some(ref u) if u.as_deref() == Some("B") || u.is_none() => 1.0,
            Some(ref u) if u == "KIB" => 1024.0,
            Some(ref u) if u == "MIB" => 1024.0 * 1024.0,
            Some(ref u) if u == "GIB" => 1024.0 * 1024.0 * 1024.0,
            Some(ref u) if u == "TIB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
            _ => return None,
        };
        Some((value * multiplier) as u64)
    }

    fn detect_project_type(&mut self) {
        let has_ext = |ext: &str| self.files.iter().any(|f| f.ends_with(ext));
        let has_name = |name: &str| self.files.iter().any(|f| f.ends_with(name));

        if has_ext(".py") || has_name("requirements.txt") || has_name("pyproject.toml") || has_name("setup.py") {
            self.environment_facts.add_project_type("python");
        }
        if self.files.iter().any(|f| f.ends_with("Dockerfile"))
            || self.files.iter().any(|f| {
                let lower = f.to_lowercase();
                lower.ends_with("docker-compose.yml") || lower.ends_with("docker-compose.yaml")
            })
        {
            self.environment_facts.add_project_type("docker");
        }
        if has_name("package.json") || has_ext(".js") || has_ext(".ts") {
            self.environment_facts.add_project_type("node");
        }

        if self.files.iter().any(|f| f.to_lowercase().contains("uvicorn") || f.to_lowercase().contains("fastapi")) {
            self.environment_facts.add_framework("fastapi");
        }
        if has_name("pytest.ini") || self.files.iter().any(|f| {
            let base = std::path::Path::new(f)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            base.starts_with("test_") && base.ends_with(".py")
        }) {
            self.environment_facts.add_framework("pytest");
        }
    }

    fn extract_shell_facts(&mut self, output: &str) {
        if self.environment_facts.git_branch.is_none() {
            if let Some(caps) = GIT_BRANCH_RE.captures(output) {
                let branch = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str().to_owned());
                self.environment_facts.git_branch = branch;
            }
        }
        if let Some(caps) = PYTHON_VERSION_RE.captures(output) {
            let v = format!("python {}", &caps[1]);
            if !self.environment_facts.runtime_versions.iter().any(|r| r == &v) {
                self.environment_facts.runtime_versions.push(v);
            }
        }
        if let Some(caps) = NODE_VERSION_RE.captures(output) {
            let v = format!("node {}", &caps[1]);
            if !self.environment_facts.runtime_versions.iter().any(|r| r == &v) {
                self.environment_facts.runtime_versions.push(v);
            }
        }
        if self.environment_facts.working_directory.is_none() {
            if let Some(caps) = PWD_RE.captures(output.trim()) {
                self.environment_facts.working_directory = Some(caps[1].to_owned());
            }
        }
        if output.contains("CONTAINER ID") || output.contains("Server Version") {
            self.environment_facts.docker_running = Some(true);
        }
    }

    /// Ordered rule list; first match wins. Output is lowercased before
    /// matching; only a gRPC/agent-reported structured error code takes
    /// priority over this fallback (see the dispatcher's error mapping).
    pub fn classify_error(output: &str) -> ErrorKind {
        let lower = output.to_lowercase();
        let rules: &[(&str, ErrorKind)] = &[
            ("syntax error", ErrorKind::SyntaxError),
            ("unexpected token", ErrorKind::SyntaxError),
            ("parse error", ErrorKind::SyntaxError),
            ("timed out", ErrorKind::Timeout),
            ("timeout", ErrorKind::Timeout),
            ("permission denied", ErrorKind::PermissionDenied),
            ("access is denied", ErrorKind::PermissionDenied),
            ("not found", ErrorKind::NotFound),
            ("no such file", ErrorKind::NotFound),
            ("cannot find", ErrorKind::NotFound),
            ("connection refused", ErrorKind::ConnectionError),
            ("connection reset", ErrorKind::ConnectionError),
            ("could not connect", ErrorKind::ConnectionError),
            ("out of memory", ErrorKind::ResourceError),
            ("disk full", ErrorKind::ResourceError),
            ("no space left", ErrorKind::ResourceError),
        ];
        for (needle, kind) in rules {
            if lower.contains(needle) {
                return *kind;
            }
        }
        ErrorKind::ExecutionError
    }

    /// Whether the most recent `window` steps show a loop: for `execute`,
    /// the same (tool, agent) pair twice; for idempotent tools, any tool
    /// appearing twice.
    fn has_loop_warning(&self) -> bool {
        let window = self.recent(MAX_LOOP_WINDOW);
        let mut seen_execute: BTreeSet<(String, Option<String>)> = BTreeSet::new();
        let mut seen_idempotent: BTreeSet<String> = BTreeSet::new();
        for step in window {
            if step.tool.is_remote_dispatch() {
                let key = (step.tool.as_str().to_owned(), step.agent_id.clone());
                if !seen_execute.insert(key) {
                    return true;
                }
            } else if step.tool.is_idempotent() {
                if !seen_idempotent.insert(step.tool.as_str().to_owned()) {
                    return true;
                }
            }
        }
        false
    }

    fn recent(&self, n: usize) -> &[CompletedStep] {
        let len = self.completed_steps.len();
        &self.completed_steps[len.saturating_sub(n)..]
    }

    /// Emits a bounded context block; this is the entire mechanism by
    /// which the LLM learns state. Deterministic, no randomness, bounded
    /// by truncation to the documented per-list caps.
    pub fn format_for_prompt(&self) -> String {
        let mut out = String::new();

        if let Some(plan) = &self.task_plan {
            out.push_str("## Task Plan\n");
            for item in &plan.items {
                let marker = match item.status {
                    PlanItemStatus::Completed => "[x]",
                    PlanItemStatus::Skipped => "[-]",
                    PlanItemStatus::InProgress => "[>]",
                    PlanItemStatus::Pending => "[ ]",
                };
                let current = plan
                    .current()
                    .map(|c| c.index == item.index)
                    .unwrap_or(false);
                let flag = if current { " <-- current" } else { "" };
                out.push_str(&format!("{marker} {}. {}{flag}\n", item.index + 1, item.description));
            }
            out.push('\n');
        }

        out.push_str(&format!(
            "Workspace scanned: {}\n",
            if self.scanned_paths.is_empty() { "no" } else { "yes" }
        ));

        let remaining = self
            .discovered_agents
            .iter()
            .filter(|a| !self.queried_agents.contains(a.as_str()))
            .count();
        out.push_str(&format!(
            "Agents verified: {} (queried {}/{}, remaining {})\n\n",
            self.agents_verified,
            self.queried_agents.len(),
            self.discovered_agents.len(),
            remaining
        ));

        out.push_str("## Recent steps\n");
        for step in self.recent(MAX_RECENT_STEPS_IN_PROMPT) {
            let mark = if step.success { "OK" } else { "FAIL" };
            out.push_str(&format!(
                "- [{mark}] {} {}\n",
                step.tool.as_str(),
                step.output_summary
            ));
        }
        if self.has_loop_warning() {
            out.push_str("\n*** LOOP WARNING: the same action was repeated recently. Change approach. ***\n");
        }

        let failures: Vec<&CompletedStep> = self
            .recent(MAX_LOOP_WINDOW)
            .iter()
            .filter(|s| !s.success)
            .collect();
        if !failures.is_empty() {
            out.push_str("\n## Recent failures\n");
            for f in &failures {
                let kind = f.error_kind.map(|k| format!("{k:?}")).unwrap_or_else(|| "unknown".into());
                out.push_str(&format!(
                    "- {} failed ({}): {}\n",
                    f.tool.as_str(),
                    kind,
                    f.error_message.clone().unwrap_or_default()
                ));
            }
        }

        out.push_str(&format!(
            "\nTop-level: {} files, {} dirs\n",
            self.files.len(),
            self.dirs.len()
        ));

        out.push_str("\nRead files: ");
        out.push_str(&Self::truncated_list(&self.read_files.iter().cloned().collect::<Vec<_>>(), MAX_FILE_LIST_IN_PROMPT));
        out.push_str("\nEdited files: ");
        out.push_str(&Self::truncated_list(&self.edited_files.iter().cloned().collect::<Vec<_>>(), MAX_FILE_LIST_IN_PROMPT));
        out.push('\n');

        if !self.user_info.is_empty() {
            out.push_str("\n## User info\n");
            for (k, v) in &self.user_info {
                out.push_str(&format!("- {k}: {v}\n"));
            }
        }

        out.push_str(&format!(
            "\n## Environment\nproject types: {:?}\nframeworks: {:?}\ngit branch: {:?}\nruntimes: {:?}\n",
            self.environment_facts.project_types,
            self.environment_facts.frameworks,
            self.environment_facts.git_branch,
            self.environment_facts.runtime_versions,
        ));

        let mut by_size: Vec<(&String, &FileMetadata)> = self.file_metadata.iter().collect();
        by_size.sort_by(|a, b| b.1.size_bytes.cmp(&a.1.size_bytes));
        if !by_size.is_empty() {
            out.push_str("\n## Largest files\n");
            for (path, meta) in by_size.into_iter().take(MAX_LARGEST_FILES) {
                out.push_str(&format!("- {path} ({})\n", meta.human_size));
            }
        }

        if !self.ledger.extracted_values.is_empty() {
            out.push_str("\n## Ledger\n");
            for (k, v) in &self.ledger.extracted_values {
                out.push_str(&format!("- {k}: {v}\n"));
            }
        }
        if !self.ledger.recent_requests.is_empty() {
            out.push_str("\n## Recent requests\n");
            for r in &self.ledger.recent_requests {
                out.push_str(&format!("- {r}\n"));
            }
        }

        out.push_str("\n=== END STATE ===\n");
        out
    }

    fn truncated_list(items: &[String], limit: usize) -> String {
        if items.len() <= limit {
            items.join(", ")
        } else {
            format!("{} (+{} more)", items[..limit].join(", "), items.len() - limit)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StepResult;

    #[test]
    fn scan_with_zero_rows_does_not_throw() {
        let mut state = SessionState::new();
        state.ingest_scan_output("");
        assert!(state.files.is_empty());
    }

    #[test]
    fn update_from_step_appends_exactly_one_completed_step() {
        let mut state = SessionState::new();
        let params = Params::new();
        state.update_from_step("s1", &Tool::Think, &params, &StepResult::ok("thinking"));
        assert_eq!(state.completed_steps.len(), 1);
        state.update_from_step("s2", &Tool::Think, &params, &StepResult::ok("thinking"));
        assert_eq!(state.completed_steps.len(), 2);
    }

    #[test]
    fn edited_implies_has_edited() {
        let mut state = SessionState::new();
        let mut params = Params::new();
        params.insert("path".into(), serde_json::json!("notes.txt"));
        state.update_from_step("s1", &Tool::WriteFile, &params, &StepResult::ok("wrote"));
        assert!(state.has_edited("notes.txt"));
    }

    #[test]
    fn reset_preserves_user_info_and_ledger() {
        let mut state = SessionState::new();
        state.user_info.insert("name".into(), "ian".into());
        state.ledger.record_request("hello");
        state.files.push("a.txt".into());
        state.reset();
        assert!(state.files.is_empty());
        assert_eq!(state.user_info.get("name").unwrap(), "ian");
        assert_eq!(state.ledger.recent_requests.len(), 1);
    }

    #[test]
    fn unique_suffix_match_requires_uniqueness() {
        let mut state = SessionState::new();
        state.files.push("src/main.rs".into());
        assert_eq!(state.find_unique_suffix_match("main.rs"), Some("src/main.rs"));
        state.files.push("tests/main.rs".into());
        assert_eq!(state.find_unique_suffix_match("main.rs"), None);
    }

    #[test]
    fn classify_error_matches_first_rule() {
        assert_eq!(SessionState::classify_error("Permission denied"), ErrorKind::PermissionDenied);
        assert_eq!(SessionState::classify_error("file not found"), ErrorKind::NotFound);
        assert_eq!(SessionState::classify_error("totally unexpected"), ErrorKind::ExecutionError);
    }
}
