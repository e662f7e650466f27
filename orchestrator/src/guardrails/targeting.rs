use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::{step::Params, Step, Tool};

static QUOTED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"['"]([^'"]+)['"]"#).unwrap());
static ACTION_PATTERNS: Lazy<[Regex; 2]> = Lazy::new(|| {
    [
        Regex::new(r"(?i)(?:reboot|restart|shutdown|stop|start|check|query|scan)\s+['\x22]?(\S+?)['\x22]?(?:\s|$)").unwrap(),
        Regex::new(r"(?i)(?:on|to|from)\s+['\x22]?(\S+?)['\x22]?(?:\s|$)").unwrap(),
    ]
});
static WORKSTATION_HINT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z]+s?-[a-z0-9]+$").unwrap());

const PERSONAL_PHRASES: [&str; 8] = [
    "my workstation",
    "my pc",
    "my machine",
    "my computer",
    "my desktop",
    "my laptop",
    "workstation",
    "personal machine",
];
const WORKSTATION_INDICATORS: [&str; 6] = ["workstation", "desktop", "laptop", "ians", "ian-", "-pc"];

/// Extracts the target agent named in a user request by matching against
/// the list of currently discovered agent ids. Strategies run in order;
/// the first match wins.
pub struct AgentTargetExtractor;

impl AgentTargetExtractor {
    pub fn extract_target_agent(user_request: &str, discovered_agents: &[String]) -> Option<String> {
        if user_request.is_empty() || discovered_agents.is_empty() {
            return None;
        }
        let lower = user_request.to_lowercase();

        // Strategy 0: contextual personal-machine references.
        if PERSONAL_PHRASES.iter().any(|p| lower.contains(p)) {
            if let Some(hit) = discovered_agents
                .iter()
                .find(|a| WORKSTATION_INDICATORS.iter().any(|ind| a.to_lowercase().contains(ind)))
            {
                return Some(hit.clone());
            }
            if let Some(hit) = discovered_agents
                .iter()
                .find(|a| WORKSTATION_HINT_RE.is_match(&a.to_lowercase()))
            {
                return Some(hit.clone());
            }
        }

        // Strategy 1: exact substring match.
        if let Some(hit) = discovered_agents.iter().find(|a| lower.contains(&a.to_lowercase())) {
            return Some(hit.clone());
        }

        // Strategy 2: quoted target.
        for caps in QUOTED_RE.captures_iter(user_request) {
            let quoted = caps[1].to_lowercase();
            if let Some(hit) = discovered_agents
                .iter()
                .find(|a| a.to_lowercase() == quoted || quoted.contains(&a.to_lowercase()))
            {
                return Some(hit.clone());
            }
        }

        // Strategy 3: action-verb target.
        for pattern in ACTION_PATTERNS.iter() {
            for caps in pattern.captures_iter(&lower) {
                let candidate = caps[1].trim_end_matches(['.', ',', '!', '?']);
                if let Some(hit) = discovered_agents
                    .iter()
                    .find(|a| a.to_lowercase() == candidate || candidate.contains(&a.to_lowercase()))
                {
                    return Some(hit.clone());
                }
            }
        }

        None
    }
}

/// Translates a bash/shell-shaped command into one of the canonical
/// workspace tools, used when no agent is known yet and a proposed
/// `execute_shell`/`scan_workspace` needs routing to a local handler.
pub struct CommandRedirector;

impl CommandRedirector {
    pub fn redirect_workspace_command(command: &str, code: Option<&str>) -> Option<Step> {
        if let Some(code) = code {
            if code.contains("import ") || code.contains("def ") || code.contains("class ") {
                let filename = if code.to_lowercase().contains("django") {
                    "manage.py"
                } else {
                    "app.py"
                };
                let mut params = Params::new();
                params.insert("path".into(), serde_json::json!(filename));
                params.insert("content".into(), serde_json::json!(code));
                return Some(Step::new(Tool::WriteFile, params));
            }
        }

        if let Some(rest) = command.strip_prefix("touch ") {
            let first_file = rest.trim().replace("/workspace/", "");
            let first_file = first_file.split_whitespace().next().unwrap_or("unnamed.txt");
            let mut params = Params::new();
            params.insert("path".into(), serde_json::json!(first_file));
            params.insert("content".into(), serde_json::json!(""));
            return Some(Step::new(Tool::WriteFile, params));
        }

        if command.starts_with("echo ") && command.contains(" > ") {
            let mut parts = command.splitn(2, " > ");
            let content_part = parts.next().unwrap_or_default();
            let filename = parts.next().unwrap_or_default().trim().replace("/workspace/", "");
            let content = content_part
                .trim_start_matches("echo ")
                .trim_start_matches("-n ")
                .trim()
                .trim_matches(['"', '\''])
                .to_owned();
            let mut params = Params::new();
            params.insert("path".into(), serde_json::json!(filename));
            params.insert("content".into(), serde_json::json!(content));
            return Some(Step::new(Tool::WriteFile, params));
        }

        if let Some(rest) = command.strip_prefix("cat ") {
            let filename = rest.trim().replace("/workspace/", "");
            let mut params = Params::new();
            params.insert("path".into(), serde_json::json!(filename));
            return Some(Step::new(Tool::ReadFile, params));
        }

        if command.starts_with("find ") || command.starts_with("ls ") {
            let mut params = Params::new();
            params.insert("path".into(), serde_json::json!("."));
            return Some(Step::new(Tool::ScanWorkspace, params));
        }

        if command.starts_with("mkdir ") {
            let mut params = Params::new();
            params.insert("command".into(), serde_json::json!(command));
            return Some(Step::new(Tool::ExecuteShell, params));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_wins() {
        let agents = vec!["domain02".to_owned(), "ians-r16".to_owned()];
        assert_eq!(
            AgentTargetExtractor::extract_target_agent("reboot domain02", &agents),
            Some("domain02".to_owned())
        );
    }

    #[test]
    fn personal_phrase_matches_workstation_indicator() {
        let agents = vec!["domain02".to_owned(), "ians-r16".to_owned()];
        assert_eq!(
            AgentTargetExtractor::extract_target_agent("create a file on my workstation", &agents),
            Some("ians-r16".to_owned())
        );
    }

    #[test]
    fn touch_redirects_to_write_file() {
        let step = CommandRedirector::redirect_workspace_command("touch /workspace/a.txt", None).unwrap();
        assert_eq!(step.tool, Tool::WriteFile);
        assert_eq!(step.param_str("path"), Some("a.txt"));
    }
}
