pub mod prompts;
pub mod response_parser;
pub mod stream_parser;

use std::sync::Arc;

use llm_client::clients::types::{
    LLMClient, LLMClientCompletionRequest, LLMClientMessage, LLMClientRole, LLMType,
};
use llm_client::provider::LLMProviderAPIKeys;
use tokio::sync::mpsc::UnboundedSender;

use crate::domain::Step;
use crate::error::ReasoningError;
use crate::session::SessionState;

use stream_parser::ThinkingStreamParser;

/// Steps beyond which the engine refuses to keep reasoning unless recent
/// progress (a successful edit) justifies it.
const LOOP_BUDGET_WINDOW: usize = 5;

static NUMBERED_OR_DASH_RE: once_cell::sync::Lazy<regex::Regex> =
    once_cell::sync::Lazy::new(|| regex::Regex::new(r"^\s*(?:\d+[.)]|[-*])\s*(.+)$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Conversational,
    Task,
}

#[derive(Debug, Clone)]
pub struct IntentClassification {
    pub intent: Intent,
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestedAction {
    Complete,
    Continue,
}

#[derive(Debug, Clone)]
pub struct GoalSatisfaction {
    pub satisfied: bool,
    pub confidence: f32,
    pub reason: String,
    pub suggested_action: SuggestedAction,
}

/// One item yielded while generating the next step: either a chunk of
/// `<think>` text, or (always last) the parsed step.
pub enum StepEvent {
    Thinking(String),
    Step(Step),
}

/// Builds prompts, drives the LLM, and turns its streamed response into a
/// `Step`. Provider-agnostic: holds a `dyn LLMClient` so the binary can
/// wire in Ollama (default) or an OpenAI-compatible endpoint without this
/// module depending on either SDK directly.
pub struct ReasoningEngine {
    llm: Arc<dyn LLMClient + Send + Sync>,
    api_key: LLMProviderAPIKeys,
    model: LLMType,
    max_reasoning_steps: usize,
}

impl ReasoningEngine {
    pub fn new(
        llm: Arc<dyn LLMClient + Send + Sync>,
        api_key: LLMProviderAPIKeys,
        model: impl Into<String>,
        max_reasoning_steps: usize,
    ) -> Self {
        Self {
            llm,
            api_key,
            model: LLMType::Custom(model.into()),
            max_reasoning_steps,
        }
    }

    fn user_message(&self, content: String) -> LLMClientMessage {
        LLMClientMessage::new(LLMClientRole::User, content, vec![])
    }

    async fn complete(&self, prompt: String) -> Result<String, ReasoningError> {
        let request = LLMClientCompletionRequest::new(self.model.clone(), vec![self.user_message(prompt)], 0.2, None);
        let raw = self.llm.completion(self.api_key.clone(), request).await?;
        Ok(strip_think_block(&raw))
    }

    /// Single LLM call with a short instruction; on error, defaults to
    /// "task" at low confidence rather than stalling the driver.
    pub async fn classify_intent(&self, text: &str) -> IntentClassification {
        match self.complete(prompts::classify_intent_prompt(text)).await {
            Ok(response) => {
                let lower = response.to_lowercase();
                let has_conversational = lower.contains("conversational");
                let has_task = lower.contains("task");
                let intent = if has_task {
                    Intent::Task
                } else if has_conversational {
                    Intent::Conversational
                } else {
                    Intent::Task
                };
                IntentClassification { intent, confidence: 0.9 }
            }
            Err(_) => IntentClassification {
                intent: Intent::Task,
                confidence: 0.5,
            },
        }
    }

    pub async fn answer_conversational(&self, text: &str, memory: Option<&str>) -> Result<String, ReasoningError> {
        self.complete(prompts::conversational_prompt(text, memory)).await
    }

    /// Accepts a numbered list, a dash list, or a JSON array/object with a
    /// `steps`/`plan` key. Falls back to a single catch-all step.
    pub async fn generate_task_plan(&self, task: &str) -> Vec<String> {
        let response = match self.complete(prompts::task_plan_prompt(task)).await {
            Ok(r) => r,
            Err(_) => return vec!["Execute task".to_owned()],
        };
        let steps = parse_plan_response(&response);
        if steps.is_empty() {
            vec!["Execute task".to_owned()]
        } else {
            steps
        }
    }

    pub async fn check_goal_satisfaction(&self, goal: &str, state: &SessionState) -> GoalSatisfaction {
        let fallback = GoalSatisfaction {
            satisfied: false,
            confidence: 0.0,
            reason: "unable to evaluate goal satisfaction".to_owned(),
            suggested_action: SuggestedAction::Continue,
        };
        let response = match self.complete(prompts::goal_satisfaction_prompt(goal, state)).await {
            Ok(r) => r,
            Err(_) => return fallback,
        };
        let Some(json_str) = response_parser::extract_balanced_json(&response) else {
            return fallback;
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(json_str) else {
            return fallback;
        };
        GoalSatisfaction {
            satisfied: value.get("satisfied").and_then(|v| v.as_bool()).unwrap_or(false),
            confidence: value.get("confidence").and_then(|v| v.as_f64()).unwrap_or(0.0) as f32,
            reason: value.get("reason").and_then(|v| v.as_str()).unwrap_or_default().to_owned(),
            suggested_action: match value.get("suggested_action").and_then(|v| v.as_str()) {
                Some("complete") => SuggestedAction::Complete,
                _ => SuggestedAction::Continue,
            },
        }
    }

    /// On total failure, a safe one-item plan ("Report to user") rather
    /// than leaving the driver with nothing to do.
    pub async fn generate_replan(&self, goal: &str, state: &SessionState, error: Option<&str>) -> Vec<String> {
        match self.complete(prompts::replan_prompt(goal, state, error)).await {
            Ok(response) => {
                let steps = parse_plan_response(&response);
                if steps.is_empty() {
                    vec!["Report to user".to_owned()]
                } else {
                    steps
                }
            }
            Err(_) => vec!["Report to user".to_owned()],
        }
    }

    /// Streams the LLM response for the next action, splitting `<think>`
    /// content from the trailing JSON step. Before calling the LLM, applies
    /// the reasoning-step budget: if the session has accumulated
    /// `max_reasoning_steps` completed steps and none of the last
    /// `LOOP_BUDGET_WINDOW` was a successful edit, immediately returns a
    /// `complete` step carrying a "Too many steps" error.
    pub async fn generate_next_step_streaming(
        &self,
        task: &str,
        state: &SessionState,
        status_cb: Option<UnboundedSender<String>>,
    ) -> Result<Vec<StepEvent>, ReasoningError> {
        if state.completed_steps.len() >= self.max_reasoning_steps {
            let window_len = state.completed_steps.len().min(LOOP_BUDGET_WINDOW);
            let recent_edit = state.completed_steps[state.completed_steps.len() - window_len..]
                .iter()
                .any(|s| s.success && s.tool.is_file_mutation());
            if !recent_edit {
                return Ok(vec![StepEvent::Step(Step::complete(None, Some("Too many steps")))]);
            }
        }

        let prompt = prompts::next_step_prompt(task, state);
        let request = LLMClientCompletionRequest::new(self.model.clone(), vec![self.user_message(prompt)], 0.2, None);

        let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();
        let llm = self.llm.clone();
        let api_key = self.api_key.clone();
        let handle = tokio::spawn(async move { llm.stream_completion(api_key, request, sender).await });

        let mut parser = ThinkingStreamParser::new();
        let mut events = Vec::new();
        let mut raw_response = String::new();

        while let Some(chunk) = receiver.recv().await {
            if let Some(delta) = chunk.delta() {
                raw_response.push_str(delta);
                let safe = parser.push(delta);
                if !safe.is_empty() {
                    if let Some(cb) = &status_cb {
                        let _ = cb.send(safe.clone());
                    }
                    events.push(StepEvent::Thinking(safe));
                }
            }
        }
        let _ = handle.await;

        let (tail, post_think) = parser.finish();
        if !tail.is_empty() {
            events.push(StepEvent::Thinking(tail));
        }

        let step = match response_parser::parse_step_from_response(&raw_response, &post_think) {
            Ok(step) => step,
            Err(ReasoningError::Hallucination(reason)) => Step::complete(None, Some(&format!("INVALID FORMAT: {reason}"))),
            Err(ReasoningError::NoJsonObject) => Step::complete(None, Some("INVALID FORMAT: no step found in response")),
            Err(other) => return Err(other),
        };
        events.push(StepEvent::Step(step));
        Ok(events)
    }
}

fn strip_think_block(raw: &str) -> String {
    match (raw.find("<think>"), raw.find("</think>")) {
        (Some(start), Some(end)) if end > start => {
            let before = &raw[..start];
            let after = &raw[end + "</think>".len()..];
            format!("{before}{after}").trim().to_owned()
        }
        _ => raw.trim().to_owned(),
    }
}

fn parse_plan_response(response: &str) -> Vec<String> {
    let text = strip_think_block(response);

    if let Some(json_str) = response_parser::extract_balanced_json(&text) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(json_str) {
            if let Some(steps) = value.get("steps").or_else(|| value.get("plan")).and_then(|v| v.as_array()) {
                return dedup_preserve_order(steps.iter().filter_map(|v| v.as_str().map(str::to_owned)));
            }
        }
    }
    if let Ok(serde_json::Value::Array(items)) = serde_json::from_str::<serde_json::Value>(text.trim()) {
        return dedup_preserve_order(items.into_iter().filter_map(|v| v.as_str().map(str::to_owned)));
    }

    let items: Vec<String> = text
        .lines()
        .filter_map(|line| NUMBERED_OR_DASH_RE.captures(line).map(|c| c[1].trim().to_owned()))
        .filter(|s| !s.is_empty())
        .collect();
    dedup_preserve_order(items)
}

fn dedup_preserve_order(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for item in items {
        if seen.insert(item.clone()) {
            out.push(item);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numbered_list() {
        let steps = parse_plan_response("1. scan the workspace\n2. read config.toml\n2. read config.toml");
        assert_eq!(steps, vec!["scan the workspace".to_owned(), "read config.toml".to_owned()]);
    }

    #[test]
    fn parses_dash_list() {
        let steps = parse_plan_response("- do the first thing\n- do the second thing");
        assert_eq!(steps.len(), 2);
    }

    #[test]
    fn parses_json_steps_key() {
        let steps = parse_plan_response(r#"{"steps": ["a", "b", "a"]}"#);
        assert_eq!(steps, vec!["a".to_owned(), "b".to_owned()]);
    }

    #[test]
    fn strip_think_block_removes_only_first_block() {
        let raw = "<think>internal</think>the answer";
        assert_eq!(strip_think_block(raw), "the answer");
    }
}
