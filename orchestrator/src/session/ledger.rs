use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const MAX_REQUESTS: usize = 20;
const MAX_URLS_PER_STEP: usize = 3;
const MAX_URL_LEN: usize = 100;
const MAX_TIMELINE: usize = 50;

static IPV4_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").unwrap());
static HTTPS_URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https://[^\s'\"<>]+").unwrap());
static PORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:port|listening on|:)\s*(\d{2,5})\b").unwrap()
});
static GIT_SHA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[0-9a-f]{7,12}\b").unwrap());
static CONTAINER_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[0-9a-f]{12,64}\b").unwrap());
static RESERVED_IPS: [&str; 3] = ["0.0.0.0", "127.0.0.1", "255.255.255.255"];

/// The per-session record of user requests, key/value extractions, and
/// recent actions surfaced into every LLM prompt. Extraction is
/// deliberately conservative (whitelist of patterns, caps on entries per
/// step) to prevent prompt blow-up — do not extend without re-bounding
/// `format_for_prompt`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationLedger {
    pub recent_requests: Vec<String>,
    pub extracted_values: BTreeMap<String, String>,
    pub timeline: Vec<String>,
}

impl ConversationLedger {
    pub fn record_request(&mut self, request: &str) {
        self.recent_requests.push(request.to_owned());
        if self.recent_requests.len() > MAX_REQUESTS {
            self.recent_requests.remove(0);
        }
    }

    pub fn record_timeline(&mut self, entry: impl Into<String>) {
        self.timeline.push(entry.into());
        if self.timeline.len() > MAX_TIMELINE {
            self.timeline.remove(0);
        }
    }

    fn set_idempotent(&mut self, key: &str, value: String) {
        self.extracted_values.entry(key.to_owned()).or_insert(value);
    }

    /// Runs on every successful step's output; extracts the whitelisted
    /// patterns only. `command` is the originating shell command, used to
    /// gate the git-sha and container-id extractors.
    pub fn extract_from_output(&mut self, output: &str, command: Option<&str>) {
        if let Some(ip) = IPV4_RE
            .find_iter(output)
            .map(|m| m.as_str())
            .find(|ip| !RESERVED_IPS.contains(ip))
        {
            self.set_idempotent("ip_address", ip.to_owned());
        }

        for (i, m) in HTTPS_URL_RE.find_iter(output).take(MAX_URLS_PER_STEP).enumerate() {
            let truncated: String = m.as_str().chars().take(MAX_URL_LEN).collect();
            self.set_idempotent(&format!("url_{i}"), truncated);
        }

        if let Some(caps) = PORT_RE.captures(output) {
            self.set_idempotent("port", caps[1].to_owned());
        }

        let is_git = command.map(|c| c.trim_start().starts_with("git")).unwrap_or(false);
        if is_git {
            if let Some(m) = GIT_SHA_RE.find(output) {
                self.set_idempotent("git_sha", m.as_str().to_owned());
            }
        }

        let is_docker = command.map(|c| c.trim_start().starts_with("docker")).unwrap_or(false);
        if is_docker {
            if let Some(m) = CONTAINER_ID_RE.find(output) {
                self.set_idempotent("container_id", m.as_str().to_owned());
            }
        }

        if let Some(last_error_line) = output.lines().rev().find(|l| {
            let lower = l.to_lowercase();
            lower.contains("error") || lower.contains("exception") || lower.contains("fail")
        }) {
            self.set_idempotent("last_error_line", last_error_line.trim().to_owned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_reserved_addresses() {
        let mut ledger = ConversationLedger::default();
        ledger.extract_from_output("bound to 127.0.0.1 and 10.0.0.5", None);
        assert_eq!(ledger.extracted_values.get("ip_address").unwrap(), "10.0.0.5");
    }

    #[test]
    fn caps_urls_at_three() {
        let mut ledger = ConversationLedger::default();
        let output = "https://a.example https://b.example https://c.example https://d.example";
        ledger.extract_from_output(output, None);
        let url_keys = ledger
            .extracted_values
            .keys()
            .filter(|k| k.starts_with("url_"))
            .count();
        assert_eq!(url_keys, 3);
    }

    #[test]
    fn git_sha_requires_git_command() {
        let mut ledger = ConversationLedger::default();
        ledger.extract_from_output("commit abc1234de is ready", Some("echo hi"));
        assert!(!ledger.extracted_values.contains_key("git_sha"));
        ledger.extract_from_output("commit abc1234de is ready", Some("git log -1"));
        assert!(ledger.extracted_values.contains_key("git_sha"));
    }

    #[test]
    fn request_log_bounded() {
        let mut ledger = ConversationLedger::default();
        for i in 0..30 {
            ledger.record_request(&format!("request {i}"));
        }
        assert_eq!(ledger.recent_requests.len(), MAX_REQUESTS);
        assert_eq!(ledger.recent_requests[0], "request 10");
    }
}
