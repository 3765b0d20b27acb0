//! The tool catalog
//!
//! Definitions are deliberately minimal. Backends with strict validators
//! reject schemas carrying `additionalProperties`, mixed-type unions or
//! null defaults, so none appear here.

use serde_json::{Value, json};

use crate::{OsFamily, ToolEntry};

/// Shell examples shown to the model, per OS family
struct ShellFlavor {
    system: &'static str,
    examples: &'static str,
}

const fn shell_flavor(os: OsFamily) -> ShellFlavor {
    match os {
        OsFamily::Windows => ShellFlavor {
            system: "Windows",
            examples: "dir, cd /d C:\\project, type file.txt",
        },
        OsFamily::Unix => ShellFlavor {
            system: "Linux",
            examples: "ls, cd project, cat file.txt",
        },
        OsFamily::Darwin => ShellFlavor {
            system: "macOS",
            examples: "ls, cd project, cat file.txt",
        },
    }
}

fn entry(
    name: &'static str,
    description: String,
    properties: Value,
    required: &'static [&'static str],
    renames: &'static [(&'static str, &'static str)],
    todo_list_property: Option<&'static str>,
) -> ToolEntry {
    ToolEntry {
        name,
        description,
        parameters: json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }),
        required,
        renames,
        todo_list_property,
    }
}

const FILE_PATH_RENAMES: &[(&str, &str)] = &[("path", "file_path")];

/// Build the full catalog for one OS family, in stable order
pub(crate) fn entries(os: OsFamily) -> Vec<ToolEntry> {
    let shell = shell_flavor(os);

    vec![
        entry(
            "read_file",
            "Read contents of a file".to_owned(),
            json!({
                "file_path": {"type": "string", "description": "Path to the file"},
                "limit": {"type": "integer", "description": "Lines to read (optional)"},
                "offset": {"type": "integer", "description": "Start line (optional)"},
            }),
            &["file_path"],
            FILE_PATH_RENAMES,
            None,
        ),
        entry(
            "write_file",
            "Write content to a file".to_owned(),
            json!({
                "file_path": {"type": "string", "description": "Path to the file"},
                "content": {"type": "string", "description": "File content"},
            }),
            &["file_path", "content"],
            FILE_PATH_RENAMES,
            None,
        ),
        entry(
            "edit_file",
            "Edit a file by replacing text".to_owned(),
            json!({
                "file_path": {"type": "string", "description": "Path to the file"},
                "old_string": {"type": "string", "description": "Text to replace"},
                "new_string": {"type": "string", "description": "New text"},
                "replace_all": {"type": "boolean", "description": "Replace all occurrences"},
            }),
            &["file_path", "old_string", "new_string"],
            FILE_PATH_RENAMES,
            None,
        ),
        entry(
            "multi_edit_file",
            "Make multiple edits to a file".to_owned(),
            json!({
                "file_path": {"type": "string", "description": "Path to the file"},
                "edits": {"type": "array", "description": "Array of edit operations"},
            }),
            &["file_path", "edits"],
            FILE_PATH_RENAMES,
            None,
        ),
        entry(
            "run_bash",
            format!(
                "Run {} shell commands. Examples: {}",
                shell.system, shell.examples
            ),
            json!({
                "command": {"type": "string", "description": "Command to execute"},
                "timeout": {"type": "integer", "description": "Timeout in milliseconds"},
                "run_in_background": {"type": "boolean", "description": "Run command in background"},
            }),
            &["command"],
            &[],
            None,
        ),
        entry(
            "grep_search",
            "Search for text patterns in files".to_owned(),
            json!({
                "pattern": {"type": "string", "description": "Text pattern to search"},
                "path": {"type": "string", "description": "Path to search"},
                "glob": {"type": "string", "description": "File filter like *.py"},
            }),
            &["pattern"],
            &[],
            None,
        ),
        entry(
            "search_files",
            "Search for files using glob patterns".to_owned(),
            json!({
                "pattern": {"type": "string", "description": "Glob pattern like *.py"},
                "path": {"type": "string", "description": "Directory to search"},
            }),
            &["pattern"],
            &[],
            None,
        ),
        entry(
            "web_fetch",
            "Fetch content from a web URL".to_owned(),
            json!({
                "url": {"type": "string", "description": "URL to fetch"},
                "prompt": {"type": "string", "description": "Prompt for processing content"},
            }),
            &["url", "prompt"],
            &[],
            None,
        ),
        entry(
            "web_search",
            "Search the web for current information".to_owned(),
            json!({
                "query": {"type": "string", "description": "Search query"},
            }),
            &["query"],
            &[],
            None,
        ),
        entry(
            "manage_todos",
            "Create and manage task lists for project tracking".to_owned(),
            json!({
                "todos": {"type": "array", "description": "The updated todo list"},
            }),
            &["todos"],
            &[("tasks", "todos")],
            Some("todos"),
        ),
        entry(
            "edit_notebook",
            "Edit a Jupyter notebook cell".to_owned(),
            json!({
                "notebook_path": {"type": "string", "description": "Path to notebook"},
                "new_source": {"type": "string", "description": "New cell content"},
                "cell_type": {"type": "string", "description": "Cell type: code or markdown"},
            }),
            &["notebook_path", "new_source"],
            &[("path", "notebook_path")],
            None,
        ),
        entry(
            "get_bash_output",
            "Get output from background shell process".to_owned(),
            json!({
                "bash_id": {"type": "string", "description": "Background process ID"},
            }),
            &["bash_id"],
            &[],
            None,
        ),
        entry(
            "kill_bash_shell",
            "Kill a background shell process".to_owned(),
            json!({
                "shell_id": {"type": "string", "description": "Shell process ID to kill"},
            }),
            &["shell_id"],
            &[],
            None,
        ),
        entry(
            "delegate_task",
            "Delegate task to specialized agent".to_owned(),
            json!({
                "description": {"type": "string", "description": "Task description"},
                "prompt": {"type": "string", "description": "Detailed task prompt"},
                "subagent_type": {"type": "string", "description": "Agent type: general-purpose etc"},
            }),
            &["description", "prompt", "subagent_type"],
            &[],
            None,
        ),
        entry(
            "exit_plan_mode",
            "Exit planning mode with implementation plan".to_owned(),
            json!({
                "plan": {"type": "string", "description": "Implementation plan details"},
            }),
            &["plan"],
            &[],
            None,
        ),
    ]
}
