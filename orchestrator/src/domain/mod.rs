pub mod agent;
pub mod session;
pub mod step;

pub use agent::AgentCapabilities;
pub use session::{CompletedStep, EnvironmentFacts, FileMetadata, PlanItemStatus, TaskPlan, TaskPlanItem};
pub use step::{ErrorKind, Params, Step, StepResult, Tool};
