/// Submission Judging - High-Level Orchestration
///
/// **Responsibility:**
/// Fetch a submission and its question, run it through the sandbox, judge the
/// result and persist the terminal status.
///
/// **Guarantee:**
/// Once a submission record exists, it always ends in SUCCEEDED or FAILED.
/// Internal failures (missing question, store read errors, panics) are stored
/// as FAILED with a System Error verdict instead of leaving the row WAITING.
///
/// This module is the glue layer - it knows nothing about:
/// - How code executes (sandbox's job)
/// - How verdicts are decided (evaluator's job)

use crate::evaluator::{JudgeContext, JudgeManager};
use crate::sandbox::SandboxExecutor;
use judge_common::store::{StoreError, SubmissionStore};
use judge_common::types::{
    ExecuteCodeRequest, JudgeInfo, JudgeVerdict, Submission, SubmissionStatus,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

/// Tries for the final verdict write before the message goes back to the queue
pub const PERSIST_ATTEMPTS: u32 = 3;
const PERSIST_BACKOFF_MS: u64 = 100;

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("submission {0} not found")]
    SubmissionNotFound(u64),

    #[error("question {question_id} for submission {submission_id} not found")]
    QuestionNotFound { submission_id: u64, question_id: u64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeOutcome {
    pub status: SubmissionStatus,
    pub judge_info: JudgeInfo,
}

impl JudgeOutcome {
    pub fn from_judge_info(judge_info: JudgeInfo) -> Self {
        let status = match judge_info.message {
            Some(JudgeVerdict::SystemError) | None => SubmissionStatus::Failed,
            Some(_) => SubmissionStatus::Succeeded,
        };
        Self { status, judge_info }
    }

    pub fn system_error() -> Self {
        Self::from_judge_info(JudgeInfo::system_error())
    }
}

/// What to do with the queue message after processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Acknowledge,
    /// The verdict could not be persisted after retrying; hand the id back to the queue
    Redeliver,
}

/// Judge one submission and persist the terminal result.
///
/// Returns an error only when nothing could be persisted: the submission does
/// not exist, or the final write failed.
#[instrument(skip(store, sandbox), fields(submission_id = id))]
pub async fn judge_submission<S: SubmissionStore>(
    store: &S,
    sandbox: &SandboxExecutor,
    id: u64,
) -> Result<JudgeOutcome, JudgeError> {
    let submission = store
        .get_submission(id)
        .await?
        .ok_or(JudgeError::SubmissionNotFound(id))?;

    if submission.status.is_terminal() {
        info!(status = ?submission.status, "Submission already judged, judging again");
    }

    let outcome = match run_judging(store, sandbox, &submission).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "Judging failed, recording system error");
            JudgeOutcome::system_error()
        }
    };

    persist(store, id, &outcome).await?;

    info!(
        status = ?outcome.status,
        verdict = ?outcome.judge_info.message,
        time_ms = ?outcome.judge_info.time,
        "Verdict persisted"
    );
    Ok(outcome)
}

/// Write the verdict, retrying Redis failures with exponential backoff
async fn persist<S: SubmissionStore>(
    store: &S,
    id: u64,
    outcome: &JudgeOutcome,
) -> Result<(), StoreError> {
    let mut attempt = 1;
    loop {
        match store
            .update_submission(id, outcome.status, outcome.judge_info.clone())
            .await
        {
            Ok(()) => return Ok(()),
            Err(StoreError::Redis(e)) if attempt < PERSIST_ATTEMPTS => {
                let backoff_ms = PERSIST_BACKOFF_MS << (attempt - 1);
                warn!(attempt, backoff_ms, error = %e, "Verdict write failed, retrying");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn run_judging<S: SubmissionStore>(
    store: &S,
    sandbox: &SandboxExecutor,
    submission: &Submission,
) -> Result<JudgeOutcome, JudgeError> {
    let question = store
        .get_question(submission.question_id)
        .await?
        .ok_or(JudgeError::QuestionNotFound {
            submission_id: submission.id,
            question_id: submission.question_id,
        })?;

    let request = ExecuteCodeRequest {
        code: submission.source_code.clone(),
        language: submission.language.clone(),
        input_list: question.test_cases.iter().map(|tc| tc.input.clone()).collect(),
        memory_limit_kb: Some(question.memory_limit_kb).filter(|kb| *kb > 0),
    };

    info!(
        language = %submission.language,
        test_cases = question.test_cases.len(),
        source_size = submission.source_code.len(),
        "Executing submission"
    );

    let response = sandbox.execute(&request).await;
    if let Some(message) = &response.message {
        info!(
            status = ?response.status,
            message_preview = message.lines().next().unwrap_or(""),
            "Sandbox reported a failure"
        );
    }

    let judge_info = JudgeManager::do_judge(&JudgeContext {
        language: &submission.language,
        response: &response,
        test_cases: &question.test_cases,
        time_limit_ms: question.time_limit_ms,
        memory_limit_kb: question.memory_limit_kb,
    });

    Ok(JudgeOutcome::from_judge_info(judge_info))
}

/// Run `judge_submission` in its own task so that a panic is contained and
/// still produces a persisted System Error.
pub async fn process_submission<S: SubmissionStore>(
    store: S,
    sandbox: Arc<SandboxExecutor>,
    id: u64,
) -> Delivery {
    let task = tokio::spawn({
        let store = store.clone();
        async move { judge_submission(&store, &sandbox, id).await }
    });

    match task.await {
        Ok(Ok(_)) => Delivery::Acknowledge,
        Ok(Err(JudgeError::SubmissionNotFound(_))) => {
            warn!(submission_id = id, "Submission does not exist, dropping message");
            Delivery::Acknowledge
        }
        Ok(Err(e)) => {
            error!(submission_id = id, error = %e, "Failed to persist verdict");
            Delivery::Redeliver
        }
        Err(join_error) => {
            error!(submission_id = id, error = %join_error, "Judging task aborted");
            match persist(&store, id, &JudgeOutcome::system_error()).await {
                Ok(()) => Delivery::Acknowledge,
                Err(e) => {
                    error!(submission_id = id, error = %e, "Failed to persist system error");
                    Delivery::Redeliver
                }
            }
        }
    }
}
