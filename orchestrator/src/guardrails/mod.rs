pub mod powershell;
pub mod targeting;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::{step::Params, ErrorKind, Step, Tool};
use crate::session::SessionState;

use powershell::ScriptValidator;
use targeting::{AgentTargetExtractor, CommandRedirector};

const DUPLICATE_WINDOW: usize = 10;
const LOOP_WINDOW: usize = 5;

static WINDOWS_PATH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z]:\\[^\s]*").unwrap());
static LARGEST_FILES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)here are the top \d+ largest files").unwrap());

fn looks_like_completion_hallucination(answer: &str) -> bool {
    let lower = answer.to_lowercase();
    WINDOWS_PATH_RE.is_match(answer)
        || LARGEST_FILES_RE.is_match(answer)
        || lower.contains("explorer.exe")
}

/// Pure, ordered, fixed-point transformation over a proposed step. Never
/// performs I/O. `apply(apply(s, S), S) == apply(s, S)` must hold for
/// every step `s` and state `S`.
pub struct GuardrailEngine;

impl GuardrailEngine {
    pub fn apply(step: Step, state: &SessionState) -> Step {
        if let Some(rewritten) = Self::execute_validation(&step, state) {
            return rewritten;
        }
        if let Some(rewritten) = Self::force_remote_after_discovery(&step, state) {
            return rewritten;
        }
        if let Some(rewritten) = Self::completion_validity(&step, state) {
            return rewritten;
        }
        if let Some(rewritten) = Self::duplicate_detection(&step, state) {
            return rewritten;
        }
        if let Some(rewritten) = Self::loop_detection(&step, state) {
            return rewritten;
        }
        if let Some(rewritten) = Self::dump_state_once(&step, state) {
            return rewritten;
        }
        if let Some(rewritten) = Self::replace_failure_escalation(&step, state) {
            return rewritten;
        }
        if let Some(rewritten) = Self::re_read_veto(&step, state) {
            return rewritten;
        }
        if let Some(rewritten) = Self::path_correction(&step, state) {
            return rewritten;
        }
        step
    }

    fn recent(state: &SessionState, n: usize) -> &[crate::domain::CompletedStep] {
        let len = state.completed_steps.len();
        &state.completed_steps[len.saturating_sub(n)..]
    }

    /// Rule 1.
    fn execute_validation(step: &Step, state: &SessionState) -> Option<Step> {
        if !step.tool.is_remote_dispatch() {
            return None;
        }
        let agent_id = step.param_str("agent_id").unwrap_or("").to_owned();

        if agent_id == "localhost" {
            return None;
        }

        if state.discovered_agents.is_empty() {
            let mut params = Params::new();
            params.insert("agent_id".into(), serde_json::json!("localhost"));
            params.insert("command".into(), serde_json::json!("discover-peers"));
            return Some(Step::new(Tool::Execute, params));
        }

        if !state.discovered_agents.iter().any(|a| a == &agent_id) {
            let available = state.discovered_agents.join(", ");
            return Some(Step::complete(
                None,
                Some(&format!("unknown agent '{agent_id}'; available agents: {available}")),
            ));
        }

        if let Some(command) = step.param_str("command") {
            let validation = ScriptValidator::validate(command);
            if !validation.valid {
                if let Some(fixed) = validation.fixed_command {
                    let mut params = step.params.clone();
                    params.insert("command".into(), serde_json::json!(fixed));
                    return Some(Step {
                        step_id: step.step_id.clone(),
                        tool: step.tool.clone(),
                        params,
                        batch_id: step.batch_id.clone(),
                        reasoning: step.reasoning.clone(),
                    });
                }
            }
        }

        None
    }

    /// Rule 2.
    fn force_remote_after_discovery(step: &Step, state: &SessionState) -> Option<Step> {
        if state.discovered_agents.is_empty() {
            return None;
        }
        if !matches!(step.tool, Tool::ScanWorkspace | Tool::ExecuteShell) {
            return None;
        }

        let user_request = step.param_str("user_request").unwrap_or(&step.reasoning);
        let target = AgentTargetExtractor::extract_target_agent(user_request, &state.discovered_agents);

        let agent_id = match target {
            Some(found) => found,
            None => state.discovered_agents[0].clone(),
        };

        let command = step
            .param_str("command")
            .map(str::to_owned)
            .or_else(|| step.param_str("path").map(|p| format!("ls {p}")))
            .unwrap_or_else(|| "ls".to_owned());

        if let Some(redirected) = CommandRedirector::redirect_workspace_command(&command, None) {
            return Some(redirected);
        }

        let mut params = Params::new();
        params.insert("agent_id".into(), serde_json::json!(agent_id));
        params.insert("command".into(), serde_json::json!(command));
        Some(Step::new(Tool::Execute, params))
    }

    /// Rule 3.
    fn completion_validity(step: &Step, state: &SessionState) -> Option<Step> {
        if step.tool != Tool::Complete {
            return None;
        }
        let answer = step.param_str("answer")?;
        let any_succeeded = state
            .completed_steps
            .iter()
            .any(|s| s.success && s.tool != Tool::Think);

        if looks_like_completion_hallucination(answer) && !any_succeeded {
            return Some(Step::complete(
                None,
                Some("refusing to finalize: answer appears to fabricate results with no successful steps"),
            ));
        }

        if answer.len() > 50 && state.discovered_agents.is_empty() {
            return Some(Step::complete(
                None,
                Some("no agents are available to answer this request"),
            ));
        }

        None
    }

    /// Rule 4.
    fn duplicate_detection(step: &Step, state: &SessionState) -> Option<Step> {
        if !step.tool.is_remote_dispatch() {
            return None;
        }
        let agent_id = step.param_str("agent_id").unwrap_or("");
        let command = step.param_str("command").unwrap_or("");

        let duplicate = Self::recent(state, DUPLICATE_WINDOW).iter().any(|s| {
            s.success
                && s.tool.is_remote_dispatch()
                && s.agent_id.as_deref() == Some(agent_id)
                && s.command.as_deref() == Some(command)
        });

        if duplicate {
            return Some(Step::complete(
                Some("already retrieved this result; no further action needed"),
                None,
            ));
        }
        None
    }

    /// Rule 5. `execute`/`remote_bash` are exempt (rule 4 covers them).
    fn loop_detection(step: &Step, state: &SessionState) -> Option<Step> {
        if step.tool.is_remote_dispatch() {
            return None;
        }
        let window = Self::recent(state, LOOP_WINDOW);

        if step.tool.is_file_mutation() {
            let path = step.param_str("path").unwrap_or("");
            let count = window
                .iter()
                .filter(|s| s.tool == step.tool && s.path.as_deref() == Some(path))
                .count();
            if count >= 2 {
                return Some(Step::complete(None, Some("loop detected: repeated file mutation on the same path")));
            }
            return None;
        }

        if step.tool.is_idempotent() {
            let count = window.iter().filter(|s| s.tool == step.tool).count();
            if count >= 1 {
                return Some(Step::complete(None, Some("loop detected: repeated idempotent step")));
            }
            return None;
        }

        let count = window.iter().filter(|s| s.tool == step.tool).count();
        if count >= 2 {
            return Some(Step::complete(None, Some("loop detected: repeated step")));
        }
        None
    }

    /// Rule 6.
    fn dump_state_once(step: &Step, state: &SessionState) -> Option<Step> {
        if step.tool != Tool::DumpState {
            return None;
        }
        let already_used = state.completed_steps.iter().any(|s| s.tool == Tool::DumpState);
        if already_used {
            return Some(Step::complete(None, Some("dump_state already used this session")));
        }
        None
    }

    /// Rule 7.
    fn replace_failure_escalation(step: &Step, state: &SessionState) -> Option<Step> {
        if step.tool != Tool::ReplaceInFile {
            return None;
        }
        let path = step.param_str("path").unwrap_or("");
        let failures = Self::recent(state, LOOP_WINDOW)
            .iter()
            .filter(|s| s.tool == Tool::ReplaceInFile && s.path.as_deref() == Some(path) && !s.success)
            .count();

        if failures >= 2 {
            let mut params = step.params.clone();
            params.insert("position".into(), serde_json::json!("start"));
            return Some(Step {
                step_id: step.step_id.clone(),
                tool: Tool::InsertInFile,
                params,
                batch_id: step.batch_id.clone(),
                reasoning: step.reasoning.clone(),
            });
        }
        None
    }

    /// Rule 8.
    fn re_read_veto(step: &Step, state: &SessionState) -> Option<Step> {
        if step.tool != Tool::ReadFile {
            return None;
        }
        let path = step.param_str("path")?;
        if state.has_read(path) {
            return Some(Step::complete(None, Some(&format!("{path} was already read this session"))));
        }
        None
    }

    /// Rule 9.
    fn path_correction(step: &Step, state: &SessionState) -> Option<Step> {
        if !step.tool.is_file_mutation() {
            return None;
        }
        let path = step.param_str("path")?;
        if state.files.iter().any(|f| f == path) {
            return None;
        }
        let corrected = state.find_unique_suffix_match(path)?;
        let corrected = corrected.to_owned();
        let mut params = step.params.clone();
        params.insert("path".into(), serde_json::json!(corrected));
        Some(Step {
            step_id: step.step_id.clone(),
            tool: step.tool.clone(),
            params,
            batch_id: step.batch_id.clone(),
            reasoning: step.reasoning.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StepResult;

    fn step(tool: Tool, params: Vec<(&str, serde_json::Value)>) -> Step {
        let mut p = Params::new();
        for (k, v) in params {
            p.insert(k.to_owned(), v);
        }
        Step::new(tool, p)
    }

    #[test]
    fn localhost_always_allowed() {
        let state = SessionState::new();
        let s = step(Tool::Execute, vec![("agent_id", serde_json::json!("localhost")), ("command", serde_json::json!("echo hi"))]);
        let result = GuardrailEngine::apply(s.clone(), &state);
        assert_eq!(result.tool, Tool::Execute);
        assert_eq!(result.param_str("agent_id"), Some("localhost"));
    }

    #[test]
    fn execute_without_discovery_bootstraps() {
        let state = SessionState::new();
        let s = step(Tool::Execute, vec![("agent_id", serde_json::json!("domain02")), ("command", serde_json::json!("whoami"))]);
        let result = GuardrailEngine::apply(s, &state);
        assert_eq!(result.param_str("agent_id"), Some("localhost"));
        assert_eq!(result.param_str("command"), Some("discover-peers"));
    }

    #[test]
    fn unknown_agent_forces_complete() {
        let mut state = SessionState::new();
        state.discovered_agents.push("domain02".into());
        let s = step(Tool::Execute, vec![("agent_id", serde_json::json!("ghost")), ("command", serde_json::json!("whoami"))]);
        let result = GuardrailEngine::apply(s, &state);
        assert_eq!(result.tool, Tool::Complete);
    }

    #[test]
    fn guardrails_are_a_fixed_point() {
        let mut state = SessionState::new();
        state.discovered_agents.push("domain02".into());
        let s = step(Tool::Execute, vec![("agent_id", serde_json::json!("domain02")), ("command", serde_json::json!("whoami"))]);
        let once = GuardrailEngine::apply(s, &state);
        let twice = GuardrailEngine::apply(once.clone(), &state);
        assert_eq!(once.tool, twice.tool);
        assert_eq!(once.params, twice.params);
    }

    #[test]
    fn re_read_is_vetoed() {
        let mut state = SessionState::new();
        let mut params = Params::new();
        params.insert("path".into(), serde_json::json!("a.txt"));
        state.update_from_step("s1", &Tool::ReadFile, &params, &StepResult::ok("contents"));
        let s = step(Tool::ReadFile, vec![("path", serde_json::json!("a.txt"))]);
        let result = GuardrailEngine::apply(s, &state);
        assert_eq!(result.tool, Tool::Complete);
    }

    #[test]
    fn path_correction_requires_unique_suffix() {
        let mut state = SessionState::new();
        state.files.push("src/main.rs".into());
        let s = step(Tool::WriteFile, vec![("path", serde_json::json!("main.rs")), ("content", serde_json::json!("x"))]);
        let result = GuardrailEngine::apply(s, &state);
        assert_eq!(result.param_str("path"), Some("src/main.rs"));
    }

    #[test]
    fn dump_state_allowed_once() {
        let mut state = SessionState::new();
        let s1 = step(Tool::DumpState, vec![]);
        let once = GuardrailEngine::apply(s1, &state);
        assert_eq!(once.tool, Tool::DumpState);
        state.update_from_step("s1", &Tool::DumpState, &Params::new(), &StepResult::ok("state"));
        let s2 = step(Tool::DumpState, vec![]);
        let twice = GuardrailEngine::apply(s2, &state);
        assert_eq!(twice.tool, Tool::Complete);
    }
}
