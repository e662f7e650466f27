use crate::session::SessionState;

const TOOL_CATALOG: &str = "\
think - reason out loud, no side effects
complete(answer?, error?) - finish the task
list_agents() - enumerate discovered remote agents
execute(agent_id, command) - run a shell/PowerShell command on a remote agent
scan_workspace(path) - list files/dirs under path
read_file(path) - read a file in the local workspace
write_file(path, content) - write/overwrite a file in the local workspace
replace_in_file(path, search, replace) - replace text in a file
insert_in_file(path, content, position) - insert text into a file
append_to_file(path, content) - append to a file
execute_shell(command) - run a shell command against the local workspace
dump_state() - dump the full session state (at most once)";

pub fn classify_intent_prompt(text: &str) -> String {
    format!(
        "Classify the following user message as either \"conversational\" or \"task\". \
         Respond with exactly one of those two words.\n\nMessage: {text}"
    )
}

pub fn conversational_prompt(text: &str, memory: Option<&str>) -> String {
    match memory {
        Some(facts) => format!("Known facts about the user:\n{facts}\n\nRespond conversationally to: {text}"),
        None => format!("Respond conversationally to: {text}"),
    }
}

pub fn task_plan_prompt(task: &str) -> String {
    format!(
        "Break the following task into a short ordered list of concrete steps. \
         Respond as a numbered list.\n\nTask: {task}"
    )
}

pub fn goal_satisfaction_prompt(goal: &str, state: &SessionState) -> String {
    format!(
        "Goal: {goal}\n\n{}\n\nHas the goal been satisfied? Respond as JSON: \
         {{\"satisfied\": bool, \"confidence\": number, \"reason\": string, \"suggested_action\": \"complete\"|\"continue\"}}",
        state.format_for_prompt()
    )
}

pub fn replan_prompt(goal: &str, state: &SessionState, error: Option<&str>) -> String {
    let error_block = error.map(|e| format!("\nMost recent failure: {e}\n")).unwrap_or_default();
    format!(
        "Goal: {goal}\n{error_block}\n{}\n\nPropose a revised ordered list of steps to reach the goal.",
        state.format_for_prompt()
    )
}

pub fn next_step_prompt(task: &str, state: &SessionState) -> String {
    format!(
        "You control a remote command execution orchestrator. Think step by step inside \
         <think>...</think>, then emit exactly one JSON object describing the next action.\n\n\
         Available tools:\n{TOOL_CATALOG}\n\n\
         Task: {task}\n\n{}\n\n\
         Respond with <think>...</think> followed by a single JSON object: \
         {{\"tool\": string, \"params\": object, \"reasoning\": string}}",
        state.format_for_prompt()
    )
}
