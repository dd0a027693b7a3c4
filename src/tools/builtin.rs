//! Reference tools shipped with the server.
//!
//! | Tool | Risk | Effect |
//! |---|---|---|
//! | `file_list` | 1 | list a directory |
//! | `file_read` | 1 | read a UTF-8 file |
//! | `file_write` | 2 | create or overwrite a file |
//! | `shell_exec` | 3 | run `sh -c <command>` |
//!
//! The file tools only touch paths inside the workspace root handed to each
//! constructor. Relative paths resolve against it; absolute paths must
//! already point inside it. `..` and symlinks that lead out are rejected.
//! `shell_exec` starts in the root but is not confined; it is always gated.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::LoopError;
use crate::tools::registry::ToolRegistry;
use crate::tools::tool::{AgentTool, Tool, ToolExecutionContext};
use crate::tools::types::{RiskLevel, ToolParameters};

const SHELL_OUTPUT_MAX_BYTES: usize = 32_768;
const READ_FILE_MAX_BYTES: usize = 65_536;
const SHELL_TIMEOUT: Duration = Duration::from_secs(30);

fn truncate_utf8(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }

    let mut cutoff = max_bytes;
    while cutoff > 0 && !s.is_char_boundary(cutoff) {
        cutoff -= 1;
    }
    s[..cutoff].to_string()
}

/// Map a requested path to a real path inside `root`.
async fn resolve(tool: &str, root: &Path, path: &str) -> Result<PathBuf, LoopError> {
    let root = tokio::fs::canonicalize(root).await.map_err(|e| {
        LoopError::tool(tool, format!("workspace root {}: {e}", root.display()))
    })?;

    let requested = Path::new(path);
    let joined = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        root.join(requested)
    };
    let mut normal = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                normal.pop();
            }
            Component::CurDir => {}
            other => normal.push(other),
        }
    }

    // Canonicalize the longest existing prefix so symlinks are followed.
    let mut existing = normal.as_path();
    let mut missing: Vec<OsString> = Vec::new();
    let resolved = loop {
        match tokio::fs::canonicalize(existing).await {
            Ok(real) => break missing.iter().rev().fold(real, |acc, part| acc.join(part)),
            Err(_) => match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    missing.push(name.to_os_string());
                    existing = parent;
                }
                _ => break normal.clone(),
            },
        }
    };

    if !resolved.starts_with(&root) {
        return Err(LoopError::tool(
            tool,
            format!("{path}: outside the workspace root"),
        ));
    }
    Ok(resolved)
}

/// `file_list`: sorted directory entries with type and size.
pub fn file_list_tool(root: &Path) -> Arc<dyn Tool> {
    let root = root.to_path_buf();
    Arc::new(AgentTool::new(
        "file_list",
        "List files and directories in a given path",
        ToolParameters::object()
            .string("path", "Directory to list", true)
            .boolean("include_hidden", "Include entries starting with '.'", false)
            .build(),
        RiskLevel::Low,
        move |args, _ctx: ToolExecutionContext| {
            let root = root.clone();
            async move {
                let path = args.get_str("path")?;
                let include_hidden = args.get_bool_opt("include_hidden").unwrap_or(false);
                let dir = resolve("file_list", &root, path).await?;
                let fail = |e: std::io::Error| LoopError::tool("file_list", format!("{path}: {e}"));

                let mut read_dir = tokio::fs::read_dir(&dir).await.map_err(fail)?;
                let mut entries = Vec::new();
                while let Some(entry) = read_dir.next_entry().await.map_err(fail)? {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    if !include_hidden && name.starts_with('.') {
                        continue;
                    }
                    let metadata = entry.metadata().await.map_err(fail)?;
                    let kind = if metadata.is_dir() {
                        "dir"
                    } else if metadata.is_file() {
                        "file"
                    } else {
                        "other"
                    };
                    entries.push((name, kind, metadata.len()));
                }
                entries.sort_by(|a, b| a.0.cmp(&b.0));

                let count = entries.len();
                let entries: Vec<_> = entries
                    .into_iter()
                    .map(|(name, kind, size)| {
                        serde_json::json!({ "name": name, "type": kind, "size": size })
                    })
                    .collect();
                Ok(serde_json::json!({
                    "path": path,
                    "entries": entries,
                    "count": count,
                }))
            }
        },
    ))
}

/// `file_read`: file contents, capped at 64 KB.
pub fn file_read_tool(root: &Path) -> Arc<dyn Tool> {
    let root = root.to_path_buf();
    Arc::new(AgentTool::new(
        "file_read",
        "Read a file's contents as UTF-8 text",
        ToolParameters::object()
            .string("path", "Path to the file to read", true)
            .build(),
        RiskLevel::Low,
        move |args, _ctx: ToolExecutionContext| {
            let root = root.clone();
            async move {
                let path = args.get_str("path")?;
                let target = resolve("file_read", &root, path).await?;
                let content = tokio::fs::read_to_string(&target)
                    .await
                    .map_err(|e| LoopError::tool("file_read", format!("{path}: {e}")))?;

                let total_bytes = content.len();
                let truncated = total_bytes > READ_FILE_MAX_BYTES;
                let content = if truncated {
                    let mut s = truncate_utf8(&content, READ_FILE_MAX_BYTES);
                    s.push_str("\n... (truncated)");
                    s
                } else {
                    content
                };

                Ok(serde_json::json!({
                    "content": content,
                    "bytes": total_bytes,
                    "truncated": truncated,
                }))
            }
        },
    ))
}

/// `file_write`: writes content, creating parent directories.
pub fn file_write_tool(root: &Path) -> Arc<dyn Tool> {
    let root = root.to_path_buf();
    Arc::new(AgentTool::new(
        "file_write",
        "Write content to a file, creating parent directories if needed",
        ToolParameters::object()
            .string("path", "Path to the file to write", true)
            .string("content", "Content to write", true)
            .build(),
        RiskLevel::Medium,
        move |args, _ctx: ToolExecutionContext| {
            let root = root.clone();
            async move {
                let path = args.get_str("path")?;
                let content = args.get_str("content")?;
                let target = resolve("file_write", &root, path).await?;

                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        LoopError::tool("file_write", format!("failed to create directories for {path}: {e}"))
                    })?;
                }
                tokio::fs::write(&target, content)
                    .await
                    .map_err(|e| LoopError::tool("file_write", format!("{path}: {e}")))?;

                Ok(serde_json::json!({
                    "path": path,
                    "bytes_written": content.len(),
                }))
            }
        },
    ))
}

/// `shell_exec`: runs a command with a 30 second timeout.
///
/// A non-zero exit code is still a successful execution; the model sees the
/// code and the combined output.
pub fn shell_exec_tool(root: &Path) -> Arc<dyn Tool> {
    let root = root.to_path_buf();
    Arc::new(AgentTool::new(
        "shell_exec",
        "Execute a shell command and return its output",
        ToolParameters::object()
            .string("command", "The shell command to execute", true)
            .build(),
        RiskLevel::High,
        move |args, _ctx: ToolExecutionContext| {
            let root = root.clone();
            async move {
                let command = args.get_str("command")?;

                let result = tokio::time::timeout(
                    SHELL_TIMEOUT,
                    tokio::process::Command::new("sh")
                        .arg("-c")
                        .arg(command)
                        .current_dir(&root)
                        .kill_on_drop(true)
                        .output(),
                )
                .await;

                let output = match result {
                    Ok(Ok(output)) => output,
                    Ok(Err(e)) => return Err(LoopError::tool("shell_exec", e.to_string())),
                    Err(_) => {
                        return Err(LoopError::tool(
                            "shell_exec",
                            format!("command timed out after {}s", SHELL_TIMEOUT.as_secs()),
                        ));
                    }
                };

                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                let mut combined = format!("{stdout}{stderr}");
                let truncated = combined.len() > SHELL_OUTPUT_MAX_BYTES;
                if truncated {
                    combined = truncate_utf8(&combined, SHELL_OUTPUT_MAX_BYTES);
                    combined.push_str("\n... (truncated)");
                }

                Ok(serde_json::json!({
                    "exit_code": output.status.code(),
                    "output": combined,
                    "truncated": truncated,
                }))
            }
        },
    ))
}

/// All reference tools rooted at `root`.
pub fn all_tools(root: &Path) -> Vec<Arc<dyn Tool>> {
    vec![
        file_list_tool(root),
        file_read_tool(root),
        file_write_tool(root),
        shell_exec_tool(root),
    ]
}

/// Registry pre-populated with [`all_tools`].
pub fn default_registry(root: &Path) -> Result<ToolRegistry, LoopError> {
    let registry = ToolRegistry::new();
    for tool in all_tools(root) {
        registry.register(tool)?;
    }
    Ok(registry)
}
