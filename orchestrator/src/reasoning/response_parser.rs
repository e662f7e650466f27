use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::{step::Params, Step, Tool};
use crate::error::ReasoningError;

const KNOWN_TOOLS: &[&str] = &[
    "think",
    "complete",
    "list_agents",
    "execute",
    "remote_bash",
    "scan_workspace",
    "read_file",
    "write_file",
    "replace_in_file",
    "insert_in_file",
    "append_to_file",
    "execute_shell",
    "dump_state",
    "none",
];

/// Keys that may carry the tool name, in priority order. `instruction` is
/// shared with the reasoning-text alias list below; whichever role it does
/// not end up filling is resolved at lift time.
const TOOL_KEYS: &[&str] = &["tool", "action", "step", "task", "instruction"];
const REASONING_KEYS: &[&str] = &["reasoning", "note", "description", "instruction"];
const CONVENIENCE_KEYS: &[&str] = &["path", "file_path", "command", "answer"];

static GOT_N_RESULTS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)got \d+ results?").unwrap());
static CODE_FENCE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```").unwrap());

/// Five raw-response patterns the original implementation treats as the
/// model narrating instead of emitting a step.
fn raw_hallucination_patterns(text_outside_think: &str) -> bool {
    let lower = text_outside_think.to_lowercase();
    lower.contains("**tool output:**")
        || GOT_N_RESULTS_RE.is_match(text_outside_think)
        || lower.contains("command executed successfully")
        || lower.contains("script executed successfully")
        || CODE_FENCE_RE.is_match(text_outside_think)
}

/// Scans for the first balanced `{...}`, tracking string/escape state so
/// braces inside string literals don't affect depth.
pub fn extract_balanced_json(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        let c = b as char;
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Last-resort fix for models that emit a literal backslash that isn't a
/// valid JSON escape (e.g. a bare Windows path): doubles any `\` not
/// followed by one of `\nrt"`.
pub fn autofix_lone_backslashes(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' {
            let next = chars.get(i + 1).copied();
            let is_valid_escape = matches!(next, Some('\\') | Some('n') | Some('r') | Some('t') | Some('"'));
            if is_valid_escape {
                out.push(c);
            } else {
                out.push('\\');
                out.push('\\');
            }
        } else {
            out.push(c);
        }
        i += 1;
    }
    out
}

fn lift_tool_and_reasoning(obj: &serde_json::Map<String, serde_json::Value>) -> (Option<String>, Option<String>, Option<String>) {
    let mut used_key: Option<&str> = None;
    let tool_raw = TOOL_KEYS.iter().find_map(|&k| {
        obj.get(k).and_then(|v| v.as_str()).map(|s| {
            used_key = Some(k);
            s.to_owned()
        })
    });
    let reasoning = REASONING_KEYS
        .iter()
        .filter(|&&k| Some(k) != used_key)
        .find_map(|&k| obj.get(k).and_then(|v| v.as_str()).map(str::to_owned));
    let batch_id = obj.get("batch_id").and_then(|v| v.as_str()).map(str::to_owned);
    (tool_raw, reasoning, batch_id)
}

/// `tool` strings longer than 30 chars are the original's heuristic for "the
/// model dumped prose into the tool field"; fuzzy-recover by substring
/// matching the closed vocabulary before giving up.
fn recover_tool(raw: &str) -> Option<Tool> {
    if raw.len() <= 30 {
        return Some(Tool::from_str(raw));
    }
    let lower = raw.to_lowercase();
    KNOWN_TOOLS.iter().find(|&&name| lower.contains(name)).map(|&name| Tool::from_str(name))
}

/// Parses the text following `</think>` into a `Step`. Runs raw-response
/// hallucination detection first; a hit (or an unparseable step) is
/// surfaced identically as `ReasoningError::Hallucination`.
pub fn parse_step_from_response(raw_response: &str, post_think: &str) -> Result<Step, ReasoningError> {
    if raw_hallucination_patterns(raw_response) {
        return Err(ReasoningError::Hallucination("response matched a known hallucination pattern".into()));
    }

    let json_str = match extract_balanced_json(post_think) {
        Some(s) => s.to_owned(),
        None => {
            if post_think.trim().chars().count() > 100 {
                return Err(ReasoningError::Hallucination(
                    "post-think text exceeded 100 characters without a JSON step".into(),
                ));
            }
            return Err(ReasoningError::NoJsonObject);
        }
    };

    let value: serde_json::Value = match serde_json::from_str(&json_str) {
        Ok(v) => v,
        Err(_) => {
            let fixed = autofix_lone_backslashes(&json_str);
            serde_json::from_str(&fixed)?
        }
    };

    let obj = value.as_object().ok_or(ReasoningError::NoJsonObject)?;
    let (tool_raw, reasoning, batch_id) = lift_tool_and_reasoning(obj);
    let tool_raw = tool_raw.ok_or(ReasoningError::NoJsonObject)?;
    let tool = recover_tool(&tool_raw).ok_or_else(|| ReasoningError::Hallucination(format!("unparseable tool name '{tool_raw}'")))?;

    let mut params: Params = obj
        .get("params")
        .and_then(|v| v.as_object())
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();

    if params.is_empty() {
        for key in CONVENIENCE_KEYS {
            if let Some(v) = obj.get(*key) {
                params.insert((*key).to_owned(), v.clone());
            }
        }
    }

    let mut step = Step::new(tool, params);
    step.batch_id = batch_id;
    step.reasoning = reasoning.unwrap_or_default();
    Ok(step)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_balanced_object_ignoring_braces_in_strings() {
        let text = r#"prose {"tool":"think","reasoning":"uses { and } inside"} trailing"#;
        let extracted = extract_balanced_json(text).unwrap();
        assert!(extracted.starts_with('{') && extracted.ends_with('}'));
        let value: serde_json::Value = serde_json::from_str(extracted).unwrap();
        assert_eq!(value["tool"], "think");
    }

    #[test]
    fn autofix_doubles_lone_backslash() {
        let fixed = autofix_lone_backslashes(r#"{"tool":"read_file","path":"C:\Users\ian"}"#);
        assert!(serde_json::from_str::<serde_json::Value>(&fixed).is_ok());
    }

    #[test]
    fn convenience_keys_lift_into_params() {
        let step = parse_step_from_response("", r#"{"tool":"read_file","path":"a.txt"}"#).unwrap();
        assert_eq!(step.tool, Tool::ReadFile);
        assert_eq!(step.param_str("path"), Some("a.txt"));
    }

    #[test]
    fn oversized_tool_name_recovers_by_substring() {
        let long = format!("the model should call {} right now please", "write_file");
        let raw = format!(r#"{{"tool":"{long}","path":"a.txt","content":"x"}}"#);
        let step = parse_step_from_response("", &raw).unwrap();
        assert_eq!(step.tool, Tool::WriteFile);
    }

    #[test]
    fn raw_hallucination_pattern_blocks_before_parsing() {
        let err = parse_step_from_response("**Tool Output:** done", r#"{"tool":"think"}"#).unwrap_err();
        assert!(matches!(err, ReasoningError::Hallucination(_)));
    }

    #[test]
    fn long_prose_without_json_is_hallucination() {
        let prose = "a".repeat(150);
        let err = parse_step_from_response("", &prose).unwrap_err();
        assert!(matches!(err, ReasoningError::Hallucination(_)));
    }
}
