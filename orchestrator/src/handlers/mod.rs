use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use ignore::WalkBuilder;
use tokio::process::Command;

use crate::domain::{step::Params, ErrorKind, StepResult};

/// Directories never worth descending into when scanning a workspace.
const SCAN_IGNORE: &[&str] = &[
    "node_modules", "__pycache__", "env", "venv", ".venv", "target", "dist", "out", "vendor", ".git",
];
const SCAN_FILE_LIMIT: usize = 500;
const LOCAL_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

fn param_str<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

fn resolve(workspace_root: &Path, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        workspace_root.join(candidate)
    }
}

/// Runs the local (non-remote) tools the driver dispatches directly
/// rather than through the gRPC layer: filesystem scans/edits against
/// `workspace_root`, and a local shell escape hatch.
pub struct LocalHandlers {
    workspace_root: PathBuf,
}

impl LocalHandlers {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self { workspace_root }
    }

    /// Lists entries under `path` (default: the workspace root) as the
    /// fixed `NAME TYPE SIZE MODIFIED` table `SessionState::ingest_scan_output`
    /// expects, capped at `SCAN_FILE_LIMIT` entries with a `TOTAL:` footer.
    pub async fn scan_workspace(&self, params: &Params) -> StepResult {
        let rel = param_str(params, "path").unwrap_or(".");
        let root = resolve(&self.workspace_root, rel);

        let mut rows = Vec::new();
        let mut dirs = 0usize;
        let mut files = 0usize;
        let mut truncated = false;

        let walker = WalkBuilder::new(&root).hidden(false).standard_filters(true).build();
        for entry in walker {
            let Ok(entry) = entry else { continue };
            let path = entry.path();
            if path == root {
                continue;
            }
            if path
                .components()
                .any(|c| SCAN_IGNORE.contains(&c.as_os_str().to_string_lossy().as_ref()))
            {
                continue;
            }
            let Ok(rel_path) = path.strip_prefix(&self.workspace_root) else { continue };
            let name = rel_path.to_string_lossy().replace('\\', "/");

            let Ok(metadata) = entry.metadata() else { continue };
            if metadata.is_dir() {
                dirs += 1;
                rows.push(format!("{name} DIR"));
            } else {
                files += 1;
                if rows.len() >= SCAN_FILE_LIMIT {
                    truncated = true;
                    continue;
                }
                let modified = metadata
                    .modified()
                    .ok()
                    .map(DateTime::<Utc>::from)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default();
                rows.push(format!("{name} FILE {} {modified}", metadata.len()));
            }
        }

        if truncated {
            rows.push(format!("... truncated at {SCAN_FILE_LIMIT} files"));
        }
        rows.push(format!("TOTAL: {} items ({dirs} dirs, {files} files)", dirs + files));
        StepResult::ok(rows.join("\n"))
    }

    pub async fn read_file(&self, params: &Params) -> StepResult {
        let Some(path) = param_str(params, "path") else {
            return StepResult::err(ErrorKind::ExecutionError, "read_file requires a path");
        };
        match tokio::fs::read_to_string(resolve(&self.workspace_root, path)).await {
            Ok(content) => StepResult::ok(content),
            Err(e) => StepResult::err(classify_io_error(&e), format!("failed to read {path}: {e}")),
        }
    }

    pub async fn write_file(&self, params: &Params) -> StepResult {
        let Some(path) = param_str(params, "path") else {
            return StepResult::err(ErrorKind::ExecutionError, "write_file requires a path");
        };
        let content = param_str(params, "content").unwrap_or_default();
        let target = resolve(&self.workspace_root, path);
        if let Some(parent) = target.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return StepResult::err(classify_io_error(&e), format!("failed to create {}: {e}", parent.display()));
            }
        }
        match tokio::fs::write(&target, content).await {
            Ok(()) => StepResult::ok(format!("wrote {} bytes to {path}", content.len())),
            Err(e) => StepResult::err(classify_io_error(&e), format!("failed to write {path}: {e}")),
        }
    }

    pub async fn replace_in_file(&self, params: &Params) -> StepResult {
        let (Some(path), Some(search), Some(replace)) = (
            param_str(params, "path"),
            param_str(params, "search"),
            param_str(params, "replace"),
        ) else {
            return StepResult::err(ErrorKind::ExecutionError, "replace_in_file requires path, search and replace");
        };
        let target = resolve(&self.workspace_root, path);
        let content = match tokio::fs::read_to_string(&target).await {
            Ok(c) => c,
            Err(e) => return StepResult::err(classify_io_error(&e), format!("failed to read {path}: {e}")),
        };
        if !content.contains(search) {
            return StepResult::err(ErrorKind::NotFound, format!("search text not found in {path}"));
        }
        let updated = content.replacen(search, replace, 1);
        match tokio::fs::write(&target, &updated).await {
            Ok(()) => StepResult::ok(format!("replaced text in {path}")),
            Err(e) => StepResult::err(classify_io_error(&e), format!("failed to write {path}: {e}")),
        }
    }

    pub async fn insert_in_file(&self, params: &Params) -> StepResult {
        let Some(path) = param_str(params, "path") else {
            return StepResult::err(ErrorKind::ExecutionError, "insert_in_file requires a path");
        };
        let content = param_str(params, "content").unwrap_or_default();
        let position = param_str(params, "position").unwrap_or("end");
        let target = resolve(&self.workspace_root, path);
        let existing = tokio::fs::read_to_string(&target).await.unwrap_or_default();
        let updated = match position {
            "start" => format!("{content}{existing}"),
            _ => format!("{existing}{content}"),
        };
        match tokio::fs::write(&target, updated).await {
            Ok(()) => StepResult::ok(format!("inserted into {path} at {position}")),
            Err(e) => StepResult::err(classify_io_error(&e), format!("failed to write {path}: {e}")),
        }
    }

    pub async fn append_to_file(&self, params: &Params) -> StepResult {
        let Some(path) = param_str(params, "path") else {
            return StepResult::err(ErrorKind::ExecutionError, "append_to_file requires a path");
        };
        let content = param_str(params, "content").unwrap_or_default();
        let target = resolve(&self.workspace_root, path);
        use tokio::io::AsyncWriteExt;
        let file = tokio::fs::OpenOptions::new().create(true).append(true).open(&target).await;
        match file {
            Ok(mut f) => match f.write_all(content.as_bytes()).await {
                Ok(()) => StepResult::ok(format!("appended {} bytes to {path}", content.len())),
                Err(e) => StepResult::err(classify_io_error(&e), format!("failed to append to {path}: {e}")),
            },
            Err(e) => StepResult::err(classify_io_error(&e), format!("failed to open {path}: {e}")),
        }
    }

    /// Runs a shell command against the local workspace, enforcing
    /// `LOCAL_COMMAND_TIMEOUT` and capturing combined stdout/stderr.
    pub async fn execute_shell(&self, params: &Params) -> StepResult {
        let Some(command) = param_str(params, "command") else {
            return StepResult::err(ErrorKind::ExecutionError, "execute_shell requires a command");
        };

        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(command);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(command);
            c
        };
        cmd.current_dir(&self.workspace_root);

        let output = tokio::time::timeout(LOCAL_COMMAND_TIMEOUT, cmd.output()).await;
        match output {
            Ok(Ok(output)) => {
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&output.stderr));
                if output.status.success() {
                    StepResult::ok(combined)
                } else {
                    StepResult::err(ErrorKind::ExecutionError, combined)
                }
            }
            Ok(Err(e)) => StepResult::err(ErrorKind::ExecutionError, format!("failed to spawn command: {e}")),
            Err(_elapsed) => StepResult::err(ErrorKind::Timeout, format!("local command timed out after {LOCAL_COMMAND_TIMEOUT:?}")),
        }
    }
}

fn classify_io_error(e: &std::io::Error) -> ErrorKind {
    match e.kind() {
        std::io::ErrorKind::NotFound => ErrorKind::NotFound,
        std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
        _ => ErrorKind::ExecutionError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), serde_json::Value::String((*v).to_owned())))
            .collect()
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let handlers = LocalHandlers::new(dir.path().to_path_buf());

        let write = handlers.write_file(&params(&[("path", "a.txt"), ("content", "hello")])).await;
        assert!(write.success);

        let read = handlers.read_file(&params(&[("path", "a.txt")])).await;
        assert!(read.success);
        assert_eq!(read.output, "hello");
    }

    #[tokio::test]
    async fn replace_in_file_requires_match() {
        let dir = tempfile::tempdir().unwrap();
        let handlers = LocalHandlers::new(dir.path().to_path_buf());
        handlers.write_file(&params(&[("path", "a.txt"), ("content", "hello world")])).await;

        let missing = handlers
            .replace_in_file(&params(&[("path", "a.txt"), ("search", "nope"), ("replace", "x")]))
            .await;
        assert!(!missing.success);
        assert_eq!(missing.error_kind, Some(ErrorKind::NotFound));

        let replaced = handlers
            .replace_in_file(&params(&[("path", "a.txt"), ("search", "world"), ("replace", "rust")]))
            .await;
        assert!(replaced.success);
        let read = handlers.read_file(&params(&[("path", "a.txt")])).await;
        assert_eq!(read.output, "hello rust");
    }

    #[tokio::test]
    async fn execute_shell_captures_output() {
        let dir = tempfile::tempdir().unwrap();
        let handlers = LocalHandlers::new(dir.path().to_path_buf());
        let command = if cfg!(windows) { "echo hi" } else { "echo hi" };
        let result = handlers.execute_shell(&params(&[("command", command)])).await;
        assert!(result.success);
        assert!(result.output.contains("hi"));
    }
}
