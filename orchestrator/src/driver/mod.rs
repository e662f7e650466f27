use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::discovery::SharedDiscoveryService;
use crate::domain::{CompletedStep, ErrorKind, Step, StepResult, TaskPlan, Tool};
use crate::grpc::{AgentDispatcher, TaskType};
use crate::guardrails::GuardrailEngine;
use crate::handlers::LocalHandlers;
use crate::reasoning::{GoalSatisfaction, ReasoningEngine, StepEvent, SuggestedAction};
use crate::session::Session;

/// Every few OODA iterations, ask the reasoning engine whether the goal
/// already looks satisfied.
const GOAL_CHECK_INTERVAL: usize = 3;
const DEFAULT_REMOTE_TIMEOUT_SECONDS: u32 = 60;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Plan,
    Thinking,
    Status,
    Result,
    Complete,
}

/// One entry of the append-only SSE-style stream. `done` is `false` on
/// every event except the terminal `complete`, so a UI client can key a
/// single boolean off the stream.
#[derive(Debug, Clone, Serialize)]
pub struct DriverEvent {
    pub event_type: EventType,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_num: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl DriverEvent {
    fn plan(steps: &[String]) -> Self {
        Self {
            event_type: EventType::Plan,
            done: false,
            step_num: None,
            tool: None,
            content: Some(serde_json::to_string(steps).unwrap_or_default()),
            result: None,
            status: None,
        }
    }

    fn thinking(step_num: usize, content: String) -> Self {
        Self {
            event_type: EventType::Thinking,
            done: false,
            step_num: Some(step_num),
            tool: None,
            content: Some(content),
            result: None,
            status: None,
        }
    }

    fn status(status: String) -> Self {
        Self {
            event_type: EventType::Status,
            done: false,
            step_num: None,
            tool: None,
            content: None,
            result: None,
            status: Some(status),
        }
    }

    fn result(step_num: usize, tool: &Tool, result: &StepResult) -> Self {
        Self {
            event_type: EventType::Result,
            done: false,
            step_num: Some(step_num),
            tool: Some(tool.as_str().to_owned()),
            content: None,
            result: Some(if result.success {
                result.output.clone()
            } else {
                result.error_message.clone().unwrap_or_default()
            }),
            status: None,
        }
    }

    fn complete(answer: Option<String>, error: Option<String>) -> Self {
        Self {
            event_type: EventType::Complete,
            done: true,
            step_num: None,
            tool: None,
            content: None,
            result: answer.or(error),
            status: None,
        }
    }
}

/// Drives one OODA loop for one task against one session. Holds no state
/// of its own beyond its dependencies; all progress lives in the
/// `Session`'s `SessionState`, mutated under its lock for the duration of
/// each iteration.
pub struct TaskDriver {
    reasoning: Arc<ReasoningEngine>,
    dispatcher: Arc<AgentDispatcher>,
    discovery: SharedDiscoveryService,
    handlers: Arc<LocalHandlers>,
    max_driver_steps: usize,
}

impl TaskDriver {
    pub fn new(
        reasoning: Arc<ReasoningEngine>,
        dispatcher: Arc<AgentDispatcher>,
        discovery: SharedDiscoveryService,
        handlers: Arc<LocalHandlers>,
        max_driver_steps: usize,
    ) -> Self {
        Self {
            reasoning,
            dispatcher,
            discovery,
            handlers,
            max_driver_steps,
        }
    }

    pub async fn run(&self, task: &str, session: Arc<Session>, events: UnboundedSender<DriverEvent>) {
        let plan = self.reasoning.generate_task_plan(task).await;
        let _ = events.send(DriverEvent::plan(&plan));
        {
            let mut state = session.state.lock().await;
            state.task_plan = Some(TaskPlan::from_descriptions(plan));
        }

        for step_num in 0..self.max_driver_steps {
            let snapshot = session.state.lock().await.clone();

            let (status_tx, mut status_rx) = tokio::sync::mpsc::unbounded_channel();
            let events_for_status = events.clone();
            let status_relay = tokio::spawn(async move {
                while let Some(chunk) = status_rx.recv().await {
                    let _ = events_for_status.send(DriverEvent::status(chunk));
                }
            });

            let step_events = match self.reasoning.generate_next_step_streaming(task, &snapshot, Some(status_tx)).await {
                Ok(events) => events,
                Err(err) => {
                    let _ = events.send(DriverEvent::complete(None, Some(format!("reasoning failure: {err}"))));
                    status_relay.abort();
                    return;
                }
            };
            status_relay.abort();

            let mut proposed = None;
            for event in step_events {
                match event {
                    StepEvent::Thinking(chunk) => {
                        let _ = events.send(DriverEvent::thinking(step_num, chunk));
                    }
                    StepEvent::Step(step) => proposed = Some(step),
                }
            }
            let Some(proposed) = proposed else {
                continue;
            };

            let step = {
                let state = session.state.lock().await;
                GuardrailEngine::apply(proposed, &state)
            };

            if step.tool == Tool::Complete {
                let _ = events.send(DriverEvent::complete(
                    step.param_str("answer").map(str::to_owned),
                    step.param_str("error").map(str::to_owned),
                ));
                return;
            }

            let result = self.execute_step(&step).await;
            {
                let mut state = session.state.lock().await;
                state.update_from_step(&step.step_id, &step.tool, &step.params, &result);
            }
            let _ = events.send(DriverEvent::result(step_num, &step.tool, &result));

            if step_num > 0 && step_num % GOAL_CHECK_INTERVAL == 0 {
                let state = session.state.lock().await.clone();
                let satisfaction = self.reasoning.check_goal_satisfaction(task, &state).await;
                if let GoalSatisfaction {
                    satisfied: true,
                    suggested_action: SuggestedAction::Complete,
                    reason,
                    ..
                } = satisfaction
                {
                    let _ = events.send(DriverEvent::complete(Some(reason), None));
                    return;
                }
                if has_recent_failure_pattern(&state.completed_steps) {
                    let replan = self.reasoning.generate_replan(task, &state, last_error(&state.completed_steps)).await;
                    let mut state = session.state.lock().await;
                    state.task_plan = Some(TaskPlan::from_descriptions(replan));
                }
            }
        }

        let _ = events.send(DriverEvent::complete(None, Some("step limit reached".to_owned())));
    }

    async fn execute_step(&self, step: &Step) -> StepResult {
        match &step.tool {
            Tool::Think | Tool::DumpState | Tool::None => StepResult::ok(String::new()),
            Tool::ListAgents => {
                let agents = self.discovery.list_agents().await;
                StepResult::ok(serde_json::to_string(&agents).unwrap_or_default())
            }
            Tool::Execute | Tool::RemoteBash => self.execute_remote(step).await,
            Tool::ScanWorkspace => self.handlers.scan_workspace(&step.params).await,
            Tool::ReadFile => self.handlers.read_file(&step.params).await,
            Tool::WriteFile => self.handlers.write_file(&step.params).await,
            Tool::ReplaceInFile => self.handlers.replace_in_file(&step.params).await,
            Tool::InsertInFile => self.handlers.insert_in_file(&step.params).await,
            Tool::AppendToFile => self.handlers.append_to_file(&step.params).await,
            Tool::ExecuteShell => self.handlers.execute_shell(&step.params).await,
            Tool::Complete => unreachable!("complete is handled before dispatch"),
            Tool::Other(name) => StepResult::err(ErrorKind::ExecutionError, format!("unrecognized tool: {name}")),
        }
    }

    async fn execute_remote(&self, step: &Step) -> StepResult {
        let Some(agent_id) = step.param_str("agent_id") else {
            return StepResult::err(ErrorKind::UnknownAgent, "execute requires an agent_id");
        };
        // `localhost` is the discovery-bootstrap sentinel guardrail rule 1
        // rewrites a step to when no agents are known yet; it never
        // dispatches to a real shell, it just forces a fresh broadcast.
        if agent_id == "localhost" {
            let agents = self.discovery.discover(true).await;
            return StepResult::ok(format!("discovered {} agent(s)", agents.len()));
        }
        let Some(command) = step.param_str("command") else {
            return StepResult::err(ErrorKind::ExecutionError, "execute requires a command");
        };

        let task_type = match step.param_str("task_type") {
            Some("powershell") => TaskType::PowerShell,
            _ => TaskType::Shell,
        };

        match self
            .dispatcher
            .execute(agent_id, task_type, command, DEFAULT_REMOTE_TIMEOUT_SECONDS, false, "", Default::default())
            .await
        {
            Ok(task) if task.success => StepResult::ok(format!("{}{}", task.stdout, task.stderr)),
            Ok(task) => StepResult::err(
                task.error_kind.unwrap_or(ErrorKind::ExecutionError),
                format!("exit {}: {}{}", task.exit_code, task.stdout, task.stderr),
            ),
            Err(err) => {
                let kind = match &err {
                    crate::error::DispatchError::Status(status) => crate::grpc::map_status(status),
                    _ => ErrorKind::GrpcError,
                };
                StepResult::err(kind, err.to_string())
            }
        }
    }
}

/// True if the last `GOAL_CHECK_INTERVAL`-or-more steps contain any
/// failure — a cue to request a replan rather than keep repeating the
/// same approach.
fn has_recent_failure_pattern(completed_steps: &[CompletedStep]) -> bool {
    let window = completed_steps.len().min(5);
    completed_steps[completed_steps.len() - window..].iter().any(|s| !s.success)
}

fn last_error(completed_steps: &[CompletedStep]) -> Option<&str> {
    completed_steps.iter().rev().find(|s| !s.success).and_then(|s| s.error_message.as_deref())
}
