// Shared fixtures for worker tests

use crate::config::WorkerConfig;
use crate::sandbox::SandboxExecutor;
use chrono::Utc;
use judge_common::store::{ensure_terminal, StoreError, SubmissionStore};
use judge_common::types::{JudgeInfo, Question, Submission, SubmissionStatus};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Inner {
    submissions: Mutex<HashMap<u64, Submission>>,
    questions: Mutex<HashMap<u64, Question>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
    failing_writes_left: AtomicUsize,
    panic_on_question_read: AtomicBool,
}

/// In-memory `SubmissionStore` with fault injection
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn insert_submission(&self, submission: Submission) {
        self.inner
            .submissions
            .lock()
            .unwrap()
            .insert(submission.id, submission);
    }

    pub fn insert_question(&self, question: Question) {
        self.inner
            .questions
            .lock()
            .unwrap()
            .insert(question.id, question);
    }

    pub fn submission(&self, id: u64) -> Option<Submission> {
        self.inner.submissions.lock().unwrap().get(&id).cloned()
    }

    pub fn write_count(&self) -> usize {
        self.inner.writes.load(Ordering::SeqCst)
    }

    pub fn fail_writes(&self, enabled: bool) {
        self.inner.fail_writes.store(enabled, Ordering::SeqCst);
    }

    /// Fail only the next `count` writes
    pub fn fail_next_writes(&self, count: usize) {
        self.inner.failing_writes_left.store(count, Ordering::SeqCst);
    }

    pub fn panic_on_question_read(&self, enabled: bool) {
        self.inner
            .panic_on_question_read
            .store(enabled, Ordering::SeqCst);
    }
}

impl SubmissionStore for MemoryStore {
    async fn get_submission(&self, id: u64) -> Result<Option<Submission>, StoreError> {
        Ok(self.submission(id))
    }

    async fn get_question(&self, id: u64) -> Result<Option<Question>, StoreError> {
        if self.inner.panic_on_question_read.load(Ordering::SeqCst) {
            panic!("injected panic while reading question {}", id);
        }
        Ok(self.inner.questions.lock().unwrap().get(&id).cloned())
    }

    async fn update_submission(
        &self,
        id: u64,
        status: SubmissionStatus,
        judge_info: JudgeInfo,
    ) -> Result<(), StoreError> {
        ensure_terminal(id, status)?;
        let transient_failure = self
            .inner
            .failing_writes_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if transient_failure || self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Redis(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "injected write failure",
            ))));
        }

        let mut submissions = self.inner.submissions.lock().unwrap();
        let submission = submissions
            .get_mut(&id)
            .ok_or(StoreError::SubmissionNotFound(id))?;
        submission.status = status;
        submission.judge_info = judge_info;
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn submission(id: u64, question_id: u64, language: &str, code: &str) -> Submission {
    Submission {
        id,
        question_id,
        user_id: 1,
        language: language.to_string(),
        source_code: code.to_string(),
        status: SubmissionStatus::Waiting,
        judge_info: JudgeInfo::default(),
        created_at: Utc::now(),
    }
}

/// Removes a test's workspace root when dropped
pub struct TempRoot(pub PathBuf);

impl TempRoot {
    /// Number of entries left under the root
    pub fn leftover_entries(&self) -> usize {
        std::fs::read_dir(&self.0).map(|dir| dir.count()).unwrap_or(0)
    }
}

impl Drop for TempRoot {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

pub fn config_in_temp_root() -> (WorkerConfig, TempRoot) {
    let root = std::env::temp_dir().join(format!("oj-judge-test-{}", uuid::Uuid::new_v4()));
    let config = WorkerConfig {
        workspace_root: root.clone(),
        ..Default::default()
    };
    (config, TempRoot(root))
}

pub fn sandbox_in_temp_root() -> (SandboxExecutor, TempRoot) {
    let (config, root) = config_in_temp_root();
    (SandboxExecutor::new(&config), root)
}

/// Whether a toolchain binary is installed; toolchain-dependent tests skip without it
pub fn has_tool(program: &str) -> bool {
    std::process::Command::new(program)
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
