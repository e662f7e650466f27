use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::step::{ErrorKind, Tool};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    pub size_bytes: u64,
    pub human_size: String,
    pub modified: Option<String>,
    pub file_type: Option<String>,
    pub line_count: Option<usize>,
}

impl FileMetadata {
    pub fn human_readable(bytes: u64) -> String {
        const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
        let mut value = bytes as f64;
        let mut unit = 0;
        while value >= 1024.0 && unit < UNITS.len() - 1 {
            value /= 1024.0;
            unit += 1;
        }
        if unit == 0 {
            format!("{bytes} B")
        } else {
            format!("{value:.1} {}", UNITS[unit])
        }
    }
}

/// One append-only record of a finished OODA step. Params are stripped of
/// large content fields (e.g. `content` for `write_file`) before storage
/// so the session state stays bounded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedStep {
    pub step_id: String,
    pub tool: Tool,
    pub agent_id: Option<String>,
    pub path: Option<String>,
    pub command: Option<String>,
    pub output_summary: String,
    pub success: bool,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CompletedStep {
    pub fn output_summary_of(output: &str) -> String {
        const LIMIT: usize = 80;
        let collapsed: String = output.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.chars().count() > LIMIT {
            collapsed.chars().take(LIMIT).collect::<String>() + "..."
        } else {
            collapsed
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanItemStatus {
    Pending,
    InProgress,
    Completed,
    Skipped,
}

impl PlanItemStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PlanItemStatus::Completed | PlanItemStatus::Skipped)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPlanItem {
    pub index: usize,
    pub description: String,
    pub status: PlanItemStatus,
    pub tool_hint: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPlan {
    pub items: Vec<TaskPlanItem>,
}

impl TaskPlan {
    pub fn from_descriptions(descriptions: Vec<String>) -> Self {
        let items = descriptions
            .into_iter()
            .enumerate()
            .map(|(index, description)| TaskPlanItem {
                index,
                description,
                status: PlanItemStatus::Pending,
                tool_hint: None,
            })
            .collect();
        Self { items }
    }

    /// The first item that is not yet terminal; `None` once every item is
    /// completed or skipped.
    pub fn current(&self) -> Option<&TaskPlanItem> {
        self.items.iter().find(|item| !item.status.is_terminal())
    }

    pub fn current_mut(&mut self) -> Option<&mut TaskPlanItem> {
        self.items.iter_mut().find(|item| !item.status.is_terminal())
    }

    pub fn all_terminal(&self) -> bool {
        self.items.iter().all(|item| item.status.is_terminal())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentFacts {
    pub total_files: usize,
    pub total_dirs: usize,
    pub total_bytes: u64,
    pub project_types: Vec<String>,
    pub frameworks: Vec<String>,
    pub git_branch: Option<String>,
    pub runtime_versions: Vec<String>,
    pub working_directory: Option<String>,
    pub docker_running: Option<bool>,
    /// Free-form bounded observation list (<= 20 entries).
    pub observations: Vec<String>,
}

impl EnvironmentFacts {
    pub const MAX_OBSERVATIONS: usize = 20;

    pub fn push_observation(&mut self, note: impl Into<String>) {
        let note = note.into();
        if self.observations.iter().any(|o| o == &note) {
            return;
        }
        if self.observations.len() >= Self::MAX_OBSERVATIONS {
            self.observations.remove(0);
        }
        self.observations.push(note);
    }

    pub fn add_project_type(&mut self, tag: &str) {
        if !self.project_types.iter().any(|t| t == tag) {
            self.project_types.push(tag.to_owned());
        }
    }

    pub fn add_framework(&mut self, tag: &str) {
        if !self.frameworks.iter().any(|t| t == tag) {
            self.frameworks.push(tag.to_owned());
        }
    }
}
