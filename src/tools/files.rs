//! File system tools: read, write, list, open, delete, copy, move, mkdir.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;

use super::error::{optional_str, required_str};
use super::{truncate_output, Tool, ToolContext, ToolError};

/// Characters returned by `read_file` before truncation.
const READ_LIMIT: usize = 10_000;

pub(super) fn all() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(ReadFile),
        Arc::new(WriteFile),
        Arc::new(ListFiles),
        Arc::new(OpenFile),
        Arc::new(DeleteFile),
        Arc::new(CopyFile),
        Arc::new(MoveFile),
        Arc::new(CreateDirectory),
    ]
}

fn path_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "path": {
                "type": "string",
                "description": description
            }
        },
        "required": ["path"]
    })
}

fn src_dst_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "src": {
                "type": "string",
                "description": "Source path"
            },
            "dst": {
                "type": "string",
                "description": "Destination path"
            }
        },
        "required": ["src", "dst"]
    })
}

/// Create the parent directory of `path` if it has one.
async fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent).await,
        _ => Ok(()),
    }
}

/// Human-readable file size.
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    if bytes < KB {
        format!("{} B", bytes)
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    }
}

/// Read a text file.
pub struct ReadFile;

#[async_trait]
impl Tool for ReadFile {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a text file."
    }

    fn parameters_schema(&self) -> Value {
        path_schema("Path to the file")
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let path = ctx.resolve(required_str(args, "path")?);

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| ToolError::io(format!("Read error ({})", path.display()), e))?;

        // Non-UTF-8 files still come back readable rather than failing.
        let content = String::from_utf8_lossy(&bytes);
        Ok(truncate_output(&content, READ_LIMIT))
    }
}

/// Write text to a file.
pub struct WriteFile;

#[async_trait]
impl Tool for WriteFile {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write text to a file. Creates parent directories if needed."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file"
                },
                "content": {
                    "type": "string",
                    "description": "Text to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let path = ctx.resolve(required_str(args, "path")?);
        let content = required_str(args, "content")?;

        ensure_parent(&path)
            .await
            .map_err(|e| ToolError::io("Write error", e))?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| ToolError::io(format!("Write error ({})", path.display()), e))?;

        Ok(format!(
            "Saved: {} ({} chars)",
            path.display(),
            content.chars().count()
        ))
    }
}

/// List a directory.
pub struct ListFiles;

#[async_trait]
impl Tool for ListFiles {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files and folders in a directory with sizes."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "directory": {
                    "type": "string",
                    "description": "Directory to list (default: current directory)"
                }
            }
        })
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let dir = ctx.resolve(optional_str(args, "directory").unwrap_or("."));

        let mut reader = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| ToolError::io(format!("List error ({})", dir.display()), e))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| ToolError::io("List error", e))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            let line = match entry.metadata().await {
                Ok(meta) if meta.is_dir() => format!("📁 {}/", name),
                Ok(meta) => format!("📄 {} ({})", name, format_size(meta.len())),
                Err(_) => format!("📄 {}", name),
            };
            entries.push((name, line));
        }

        if entries.is_empty() {
            return Ok("Empty.".to_string());
        }

        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries
            .into_iter()
            .map(|(_, line)| line)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// Open a file with the platform's default application.
pub struct OpenFile;

#[async_trait]
impl Tool for OpenFile {
    fn name(&self) -> &str {
        "open_file"
    }

    fn description(&self) -> &str {
        "Open a file in its default application."
    }

    fn parameters_schema(&self) -> Value {
        path_schema("Path to the file")
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let path = ctx.resolve(required_str(args, "path")?);

        if !path.exists() {
            return Ok(format!("Not found: {}", path.display()));
        }

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", "start", ""]);
            c
        } else if cfg!(target_os = "macos") {
            Command::new("open")
        } else {
            Command::new("xdg-open")
        };

        cmd.arg(&path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ToolError::io("Open error", e))?;

        Ok(format!("Opened: {}", path.display()))
    }
}

/// Delete a file or a folder tree.
pub struct DeleteFile;

#[async_trait]
impl Tool for DeleteFile {
    fn name(&self) -> &str {
        "delete_file"
    }

    fn description(&self) -> &str {
        "Delete a file or folder."
    }

    fn parameters_schema(&self) -> Value {
        path_schema("Path to the file or folder")
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let path = ctx.resolve(required_str(args, "path")?);

        let meta = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(format!("Not found: {}", path.display()));
            }
            Err(e) => return Err(ToolError::io("Delete error", e)),
        };

        if meta.is_dir() {
            tokio::fs::remove_dir_all(&path)
                .await
                .map_err(|e| ToolError::io("Delete error", e))?;
            Ok(format!("Deleted folder: {}", path.display()))
        } else {
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| ToolError::io("Delete error", e))?;
            Ok(format!("Deleted: {}", path.display()))
        }
    }
}

/// Copy a file.
pub struct CopyFile;

#[async_trait]
impl Tool for CopyFile {
    fn name(&self) -> &str {
        "copy_file"
    }

    fn description(&self) -> &str {
        "Copy a file to a new location."
    }

    fn parameters_schema(&self) -> Value {
        src_dst_schema()
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let src = ctx.resolve(required_str(args, "src")?);
        let dst = ctx.resolve(required_str(args, "dst")?);

        ensure_parent(&dst)
            .await
            .map_err(|e| ToolError::io("Copy error", e))?;
        tokio::fs::copy(&src, &dst)
            .await
            .map_err(|e| ToolError::io("Copy error", e))?;

        Ok(format!("Copied: {} -> {}", src.display(), dst.display()))
    }
}

/// Move or rename a file.
pub struct MoveFile;

#[async_trait]
impl Tool for MoveFile {
    fn name(&self) -> &str {
        "move_file"
    }

    fn description(&self) -> &str {
        "Move or rename a file."
    }

    fn parameters_schema(&self) -> Value {
        src_dst_schema()
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let src = ctx.resolve(required_str(args, "src")?);
        let dst = ctx.resolve(required_str(args, "dst")?);

        ensure_parent(&dst)
            .await
            .map_err(|e| ToolError::io("Move error", e))?;

        if tokio::fs::rename(&src, &dst).await.is_err() {
            // rename fails across filesystems; fall back to copy + delete.
            tokio::fs::copy(&src, &dst)
                .await
                .map_err(|e| ToolError::io("Move error", e))?;
            tokio::fs::remove_file(&src)
                .await
                .map_err(|e| ToolError::io("Move error", e))?;
        }

        Ok(format!("Moved: {} -> {}", src.display(), dst.display()))
    }
}

/// Create a directory and its parents.
pub struct CreateDirectory;

#[async_trait]
impl Tool for CreateDirectory {
    fn name(&self) -> &str {
        "create_directory"
    }

    fn description(&self) -> &str {
        "Create a folder recursively."
    }

    fn parameters_schema(&self) -> Value {
        path_schema("Folder to create")
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let path = ctx.resolve(required_str(args, "path")?);

        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| ToolError::io("mkdir error", e))?;

        Ok(format!("Created: {}", path.display()))
    }
}
