use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use serde_json::{Value, json};

use super::{AgentContext, BuiltinProfile, ChatAgent, configured_assistant};
use crate::todos::TodoManager;
use crate::tools::{FilteredWorkbench, FunctionTool, StaticWorkbench, empty_args_schema, string_arg, string_arg_schema};

pub const AGENT_NAME: &str = "task_organizer";
pub const CONFIG_KEY: &str = "task_organizer";
pub const TERMINATE_KEYWORD: &str = "TERMINATE";
pub const INITIAL_TASK: &str =
    "Check the git branch and create a new one if needed. Avoid working on 'main' or 'master'.";

const SYSTEM_MESSAGE: &str = "You are the Task Organizer: the project manager of a team of specialist agents. You own the project's TODO list and direct the team.

How you work:
1. Understand the goal. When a goal arrives, break it into concrete, actionable steps.
2. Build the TODO list. Call `add_todo` once per step with a short, clear description.
3. Direct the team. After building the list, and whenever you are asked what comes next:
   a. call `list_todos` to see the current state;
   b. find the first open task (the first line with `- [ ]`);
   c. announce it to the team, for example \"The next task is: <task>\". That is your reply.
4. Track progress. When the team finishes a task, call `mark_task_done` with its number.
5. Finish. After marking a task, check the list again. When every task shows `- [x]`, call `finalize_and_terminate`.

Every reply is either the next task for the team or the result of `finalize_and_terminate`.";

fn task_number_arg(arguments: &Value) -> Result<i64> {
    match arguments.get("task_number") {
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| anyhow::anyhow!("task_number must be an integer")),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| anyhow::anyhow!("task_number must be an integer, got '{s}'")),
        _ => anyhow::bail!("missing required integer argument 'task_number'"),
    }
}

/// The four TODO tools bound to one manager.
pub fn todo_tools(manager: TodoManager) -> StaticWorkbench {
    let add = {
        let manager = manager.clone();
        FunctionTool::new(
            "add_todo",
            "Adds a new task to the TODO list.",
            string_arg_schema("task", "Description of the task to add"),
            move |args| {
                let manager = manager.clone();
                async move { Ok::<_, anyhow::Error>(manager.add_todo(&string_arg(&args, "task")?)) }
            },
        )
    };
    let list = {
        let manager = manager.clone();
        FunctionTool::new(
            "list_todos",
            "Lists all tasks in the TODO list.",
            empty_args_schema(),
            move |_args| {
                let manager = manager.clone();
                async move { Ok::<_, anyhow::Error>(manager.list_todos()) }
            },
        )
    };
    let mark = {
        let manager = manager.clone();
        FunctionTool::new(
            "mark_task_done",
            "Marks a task as done by its number (1-based).",
            json!({
                "type": "object",
                "properties": {
                    "task_number": { "type": "integer", "description": "1-based task number" }
                },
                "required": ["task_number"]
            }),
            move |args| {
                let manager = manager.clone();
                async move { Ok::<_, anyhow::Error>(manager.mark_task_done(task_number_arg(&args)?)) }
            },
        )
    };
    let finalize = FunctionTool::new(
        "finalize_and_terminate",
        "Deletes the TODO file and returns the TERMINATE keyword. Call only when every task is done.",
        empty_args_schema(),
        move |_args| {
            let manager = manager.clone();
            async move {
                let outcome = manager.delete_todo_file();
                tracing::info!(outcome = %outcome, "TODO list finalized");
                Ok::<_, anyhow::Error>(TERMINATE_KEYWORD.to_string())
            }
        },
    );
    StaticWorkbench::new(vec![add, list, mark, finalize])
}

/// Starts from a clean TODO file seeded with the branch check.
pub fn prepare_todo_list(repo_dir: &Path) -> TodoManager {
    let manager = TodoManager::new(repo_dir);
    let deleted = manager.delete_todo_file();
    tracing::debug!(outcome = %deleted, "cleared previous TODO list");
    let seeded = manager.add_todo(INITIAL_TASK);
    tracing::debug!(outcome = %seeded, "seeded TODO list");
    manager
}

pub async fn create_agent(ctx: &AgentContext, repo_dir: &Path) -> Result<Arc<dyn ChatAgent>> {
    let cfg = ctx.agent_config(CONFIG_KEY)?;
    let model = ctx.model_for(CONFIG_KEY)?;
    let manager = prepare_todo_list(repo_dir);
    let workbench = FilteredWorkbench::wrap(
        Arc::new(todo_tools(manager)),
        cfg.allow_tools.as_deref(),
        cfg.deny_tools.as_deref(),
    );

    let builtin = BuiltinProfile {
        system_message: SYSTEM_MESSAGE.to_string(),
        description: "An agent that plans the work and manages the team's TODO list.".to_string(),
        max_tool_iterations: 20,
    };

    let agent = configured_assistant(AGENT_NAME, model, &cfg, Some(repo_dir), builtin)
        .with_workbench(workbench);
    tracing::info!(agent = AGENT_NAME, directory = %repo_dir.display(), "created task organizer agent");
    Ok(Arc::new(agent))
}
