use std::collections::BTreeMap;

use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

/// The closed set of operations the LLM may request. `Other` carries the
/// raw string the parser could not map onto a known variant (see
/// `ReasoningEngine`'s tool-name recovery) so guardrails can still treat
/// it uniformly as "unrecognized" without losing the original text.
///
/// (De)serialized as its bare tool-name string rather than a tagged
/// variant, since the wire shape is a single JSON string field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tool {
    Think,
    Complete,
    ListAgents,
    Execute,
    RemoteBash,
    ScanWorkspace,
    ReadFile,
    WriteFile,
    ReplaceInFile,
    InsertInFile,
    AppendToFile,
    ExecuteShell,
    DumpState,
    None,
    Other(String),
}

impl Serialize for Tool {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Tool {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer).map_err(D::Error::custom)?;
        Ok(Tool::from_str(&s))
    }
}

impl Tool {
    pub fn as_str(&self) -> &str {
        match self {
            Tool::Think => "think",
            Tool::Complete => "complete",
            Tool::ListAgents => "list_agents",
            Tool::Execute => "execute",
            Tool::RemoteBash => "remote_bash",
            Tool::ScanWorkspace => "scan_workspace",
            Tool::ReadFile => "read_file",
            Tool::WriteFile => "write_file",
            Tool::ReplaceInFile => "replace_in_file",
            Tool::InsertInFile => "insert_in_file",
            Tool::AppendToFile => "append_to_file",
            Tool::ExecuteShell => "execute_shell",
            Tool::DumpState => "dump_state",
            Tool::None => "none",
            Tool::Other(s) => s.as_str(),
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "think" => Tool::Think,
            "complete" => Tool::Complete,
            "list_agents" => Tool::ListAgents,
            "execute" => Tool::Execute,
            "remote_bash" => Tool::RemoteBash,
            "scan_workspace" => Tool::ScanWorkspace,
            "read_file" => Tool::ReadFile,
            "write_file" => Tool::WriteFile,
            "replace_in_file" => Tool::ReplaceInFile,
            "insert_in_file" => Tool::InsertInFile,
            "append_to_file" => Tool::AppendToFile,
            "execute_shell" => Tool::ExecuteShell,
            "dump_state" => Tool::DumpState,
            "none" => Tool::None,
            other => Tool::Other(other.to_owned()),
        }
    }

    /// File-mutation tools per the loop-detection and path-correction rules.
    pub fn is_file_mutation(&self) -> bool {
        matches!(
            self,
            Tool::WriteFile | Tool::ReplaceInFile | Tool::InsertInFile | Tool::AppendToFile
        )
    }

    /// Idempotent/no-progress tools per the loop-detection rule.
    pub fn is_idempotent(&self) -> bool {
        matches!(self, Tool::ListAgents | Tool::DumpState | Tool::ScanWorkspace)
    }

    pub fn is_remote_dispatch(&self) -> bool {
        matches!(self, Tool::Execute | Tool::RemoteBash)
    }
}

pub type Params = BTreeMap<String, serde_json::Value>;

/// One unit of LLM-proposed action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub step_id: String,
    pub tool: Tool,
    #[serde(default)]
    pub params: Params,
    pub batch_id: Option<String>,
    #[serde(default)]
    pub reasoning: String,
}

impl Step {
    pub fn new(tool: Tool, params: Params) -> Self {
        Self {
            step_id: uuid::Uuid::new_v4().to_string(),
            tool,
            params,
            batch_id: None,
            reasoning: String::new(),
        }
    }

    pub fn complete(answer: Option<&str>, error: Option<&str>) -> Self {
        let mut params = Params::new();
        if let Some(a) = answer {
            params.insert("answer".to_owned(), serde_json::Value::String(a.to_owned()));
        }
        if let Some(e) = error {
            params.insert("error".to_owned(), serde_json::Value::String(e.to_owned()));
        }
        Self::new(Tool::Complete, params)
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }
}

/// The closed set of error classifications used throughout the system
/// (session-state error classification, dispatcher error mapping,
/// guardrail-forced completions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SyntaxError,
    Timeout,
    PermissionDenied,
    NotFound,
    ConnectionError,
    ResourceError,
    ExecutionError,
    GrpcError,
    Hallucination,
    LoopDetected,
    UnknownAgent,
}

/// Result of executing one `Step`, whether via a local handler or the
/// gRPC dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    pub output: String,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
}

impl StepResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error_kind: None,
            error_message: None,
        }
    }

    pub fn err(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            output: String::new(),
            error_kind: Some(kind),
            error_message: Some(message.chars().take(200).collect()),
        }
    }
}
