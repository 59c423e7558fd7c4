/// Sandbox Executor - runs one submission against its inputs
///
/// **Core Responsibility:**
/// Build and run source code once per input and capture raw outputs.
///
/// **Boundary:**
/// - Knows HOW to execute (working directory, compiler, process runner)
/// - Does NOT know expected outputs or verdicts (evaluator's job)
/// - Never returns an error: every path ends in an `ExecuteCodeResponse`
///
/// **Isolation unit:**
/// Each call gets a fresh, uniquely named working directory that is removed
/// before `execute` returns, on every path.

use crate::config::{Toolchains, WorkerConfig};
use crate::language::{adapter_for, LanguageAdapter};
use crate::runner::{self, RunOutcome};
use judge_common::types::{
    ExecuteCodeRequest, ExecuteCodeResponse, ExecuteMessage, ExecuteStatus, JudgeInfo,
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, instrument, warn};

/// Oversized sources are rejected before anything is written to disk
pub const MAX_SOURCE_CODE_BYTES: usize = 1024 * 1024;

/// Working directory guard - guarantees removal on drop.
/// Removal happens even when execution panics or returns early.
/// The normal path calls `remove` so a large build tree is deleted off the
/// async worker threads; `Drop` is the synchronous fallback.
pub struct Workspace {
    path: PathBuf,
}

impl Workspace {
    /// Create `<root>/<uuid>`. `create_dir` fails on an existing path, so a
    /// directory is never shared with another execution.
    pub fn create(root: &Path) -> io::Result<Self> {
        fs::create_dir_all(root)?;
        let path = root.join(uuid::Uuid::new_v4().to_string());
        fs::create_dir(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the directory on the blocking pool and disarm the guard
    pub async fn remove(mut self) {
        let path = std::mem::take(&mut self.path);
        let fallback = path.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || remove_tree(&path)).await {
            warn!(error = %e, "Working directory removal task failed");
            remove_tree(&fallback);
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        // Empty once `remove` has run
        if !self.path.as_os_str().is_empty() {
            remove_tree(&self.path);
        }
    }
}

fn remove_tree(path: &Path) {
    match fs::remove_dir_all(path) {
        Ok(()) => debug!(path = %path.display(), "Working directory removed"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            path = %path.display(),
            error = %e,
            "Failed to remove working directory"
        ),
    }
}

pub struct SandboxExecutor {
    workspace_root: PathBuf,
    run_timeout_ms: u64,
    compile_timeout_ms: u64,
    toolchains: Toolchains,
}

impl SandboxExecutor {
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            workspace_root: config.workspace_root.clone(),
            run_timeout_ms: config.run_timeout_ms,
            compile_timeout_ms: config.compile_timeout_ms,
            toolchains: config.toolchains.clone(),
        }
    }

    /// Materialize, compile (if needed), run every input in order, aggregate.
    #[instrument(
        skip(self, request),
        fields(language = %request.language, inputs = request.input_list.len())
    )]
    pub async fn execute(&self, request: &ExecuteCodeRequest) -> ExecuteCodeResponse {
        if request.code.len() > MAX_SOURCE_CODE_BYTES {
            warn!(source_size = request.code.len(), "Source code too large");
            return ExecuteCodeResponse::error(format!(
                "Source code exceeds maximum size of {} bytes",
                MAX_SOURCE_CODE_BYTES
            ));
        }

        let adapter = match adapter_for(
            &request.language,
            &self.toolchains,
            request.memory_limit_kb,
        ) {
            Ok(adapter) => adapter,
            Err(e) => {
                warn!(error = %e, "Rejected submission");
                return ExecuteCodeResponse::system_error(e.to_string());
            }
        };

        let workspace = match Workspace::create(&self.workspace_root) {
            Ok(ws) => ws,
            Err(e) => {
                error!(root = %self.workspace_root.display(), error = %e, "Failed to create working directory");
                return ExecuteCodeResponse::system_error(format!(
                    "Failed to create working directory: {}",
                    e
                ));
            }
        };

        let response = self.run_in(&workspace, adapter.as_ref(), request).await;
        workspace.remove().await;
        response
    }

    /// Materialize, compile and run inside an existing working directory
    async fn run_in(
        &self,
        workspace: &Workspace,
        adapter: &dyn LanguageAdapter,
        request: &ExecuteCodeRequest,
    ) -> ExecuteCodeResponse {
        let source = match adapter.materialize(workspace.path(), &request.code) {
            Ok(path) => path,
            Err(e) => {
                error!(error = %e, "Failed to write source file");
                return ExecuteCodeResponse::system_error(format!(
                    "Failed to write source file: {}",
                    e
                ));
            }
        };

        if let Some(compile) = adapter.compile_command(&source) {
            debug!(language = %adapter.language(), command = %compile.display(), "Compiling");
            match runner::run(&compile, self.compile_timeout_ms).await {
                Ok(RunOutcome::Exited(msg)) if msg.succeeded() => {
                    info!(compile_ms = msg.elapsed_ms, "Compilation succeeded");
                }
                Ok(RunOutcome::Exited(msg)) => {
                    warn!(
                        compile_ms = msg.elapsed_ms,
                        error_preview = msg.stderr.lines().next().unwrap_or(""),
                        "Compilation failed"
                    );
                    return ExecuteCodeResponse::compile_error(compiler_diagnostics(&msg));
                }
                Ok(RunOutcome::TimedOut(_)) => {
                    warn!(timeout_ms = self.compile_timeout_ms, "Compilation timed out");
                    return ExecuteCodeResponse::compile_error(format!(
                        "Compilation timed out after {}ms",
                        self.compile_timeout_ms
                    ));
                }
                Err(e) => {
                    error!(error = %e, "Compiler could not be run");
                    return ExecuteCodeResponse::system_error(e.to_string());
                }
            }
        }

        let mut messages = Vec::with_capacity(request.input_list.len());
        let mut system_fault = None;

        for (idx, input) in request.input_list.iter().enumerate() {
            let command = adapter.run_command(workspace.path(), input);
            match runner::run(&command, self.run_timeout_ms).await {
                Ok(RunOutcome::Exited(msg)) => {
                    debug!(
                        case = idx + 1,
                        exit_code = ?msg.exit_code,
                        elapsed_ms = msg.elapsed_ms,
                        "Test case executed"
                    );
                    messages.push(msg);
                }
                Ok(RunOutcome::TimedOut(msg)) => {
                    warn!(case = idx + 1, timeout_ms = self.run_timeout_ms, "Test case timed out");
                    messages.push(msg);
                    break;
                }
                Err(e) => {
                    // The runtime itself is broken; later cases cannot produce anything useful
                    error!(case = idx + 1, error = %e, "Test case could not be run");
                    system_fault = Some(e.to_string());
                    break;
                }
            }
        }

        let response = aggregate(&messages, request.input_list.len(), system_fault);
        info!(
            status = ?response.status,
            executed = messages.len(),
            time_ms = ?response.judge_info.time,
            "Execution finished"
        );
        response
    }
}

fn compiler_diagnostics(msg: &ExecuteMessage) -> String {
    if !msg.stderr.trim().is_empty() {
        msg.stderr.clone()
    } else if !msg.stdout.trim().is_empty() {
        msg.stdout.clone()
    } else {
        match msg.exit_code {
            Some(code) => format!("Compilation failed with exit code {}", code),
            None => "Compiler terminated abnormally".to_string(),
        }
    }
}

fn failure_message(msg: &ExecuteMessage) -> String {
    if !msg.stderr.trim().is_empty() {
        return msg.stderr.clone();
    }
    match msg.exit_code {
        Some(code) => format!("Process exited with code {}", code),
        None => "Process terminated abnormally".to_string(),
    }
}

/// Fold per-case messages into one response.
///
/// Outputs are collected up to the first failing case; a shorter output list
/// than input list signals the early stop.
pub fn aggregate(
    messages: &[ExecuteMessage],
    input_count: usize,
    system_fault: Option<String>,
) -> ExecuteCodeResponse {
    let max_time = messages.iter().map(|m| m.elapsed_ms).max().unwrap_or(0);
    let timed_out = messages.iter().any(|m| m.timed_out);

    let mut output_list = Vec::with_capacity(messages.len());
    let mut first_failure = None;
    for msg in messages {
        if msg.succeeded() {
            output_list.push(msg.stdout.clone());
        } else {
            first_failure = Some(msg);
            break;
        }
    }

    let (status, message) = match (first_failure, system_fault) {
        (Some(failed), _) => (ExecuteStatus::Error, Some(failure_message(failed))),
        (None, Some(fault)) => (ExecuteStatus::SystemError, Some(fault)),
        (None, None) if output_list.len() == input_count => (ExecuteStatus::Success, None),
        (None, None) => (
            ExecuteStatus::SystemError,
            Some(format!(
                "Only {} of {} inputs produced output",
                output_list.len(),
                input_count
            )),
        ),
    };

    ExecuteCodeResponse {
        status,
        output_list,
        judge_info: JudgeInfo {
            message: None,
            time: Some(max_time),
            // Not measured for local processes
            memory: Some(0),
        },
        message,
        timed_out,
    }
}
