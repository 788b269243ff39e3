//! Markdown TODO list shared by the repository team.
//!
//! The list lives in `TODO-AI.md` at the repository root. Every operation
//! returns a user-facing string, errors included, since results go straight
//! back to the model as tool output.

use std::io::Write as _;
use std::path::{Path, PathBuf};

pub const TODO_FILE_NAME: &str = "TODO-AI.md";
pub const TODO_HEADER: &str = "# AI-Managed TODO List\n\n";

const ITEM_PREFIX: &str = "- [";
const OPEN_MARK: &str = "- [ ]";
const DONE_MARK: &str = "- [x]";

#[derive(Debug, Clone)]
pub struct TodoManager {
    todo_file: PathBuf,
}

impl TodoManager {
    pub fn new(working_directory: &Path) -> Self {
        Self {
            todo_file: working_directory.join(TODO_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.todo_file
    }

    pub fn add_todo(&self, task: &str) -> String {
        match self.append_task(task) {
            Ok(()) => format!("Successfully added task: '{task}'"),
            Err(err) => format!("Error adding task: {err}"),
        }
    }

    fn append_task(&self, task: &str) -> std::io::Result<()> {
        if let Some(parent) = self.todo_file.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.todo_file)?;
        if file.metadata()?.len() == 0 {
            file.write_all(TODO_HEADER.as_bytes())?;
        }
        writeln!(file, "{OPEN_MARK} {task}")
    }

    pub fn list_todos(&self) -> String {
        match std::fs::read_to_string(&self.todo_file) {
            Ok(content) if content.trim().is_empty() => "TODO list is empty.".to_string(),
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                "TODO list not found. It will be created when you add the first task.".to_string()
            }
            Err(err) => format!("Error reading TODO list: {err}"),
        }
    }

    /// Marks the `task_number`-th item (1-based, counting `- [` lines) as done.
    pub fn mark_task_done(&self, task_number: i64) -> String {
        let content = match std::fs::read_to_string(&self.todo_file) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return "TODO list not found.".to_string();
            }
            Err(err) => return format!("Error marking task as done: {err}"),
        };

        let mut lines = content.split_inclusive('\n').map(str::to_string).collect::<Vec<_>>();
        let items = lines
            .iter()
            .enumerate()
            .filter(|(_, line)| line.trim_start().starts_with(ITEM_PREFIX))
            .map(|(idx, _)| idx)
            .collect::<Vec<_>>();

        if task_number < 1 || task_number as usize > items.len() {
            return format!(
                "Error: Invalid task number {task_number}. Please provide a number between 1 and {}.",
                items.len()
            );
        }

        let line_idx = items[(task_number - 1) as usize];
        if lines[line_idx].trim_start().starts_with(DONE_MARK) {
            return format!("Task {task_number} is already marked as done.");
        }
        lines[line_idx] = lines[line_idx].replacen(OPEN_MARK, DONE_MARK, 1);

        match std::fs::write(&self.todo_file, lines.concat()) {
            Ok(()) => format!("Successfully marked task {task_number} as done."),
            Err(err) => format!("Error marking task as done: {err}"),
        }
    }

    pub fn delete_todo_file(&self) -> String {
        if !self.todo_file.exists() {
            return "TODO list file not found, nothing to delete.".to_string();
        }
        match std::fs::remove_file(&self.todo_file) {
            Ok(()) => "TODO list file deleted successfully.".to_string(),
            Err(err) => format!("Error deleting TODO list file: {err}"),
        }
    }
}
