use crate::redis as keys;
use crate::types::{JudgeInfo, Question, Submission, SubmissionStatus};
use std::future::Future;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("submission {0} not found")]
    SubmissionNotFound(u64),

    #[error("refusing to move submission {id} to non-terminal status {status:?}")]
    NonTerminalStatus { id: u64, status: SubmissionStatus },
}

/// Read/write interface the judging core needs from the submission store.
pub trait SubmissionStore: Clone + Send + Sync + 'static {
    fn get_submission(
        &self,
        id: u64,
    ) -> impl Future<Output = Result<Option<Submission>, StoreError>> + Send;

    fn get_question(
        &self,
        id: u64,
    ) -> impl Future<Output = Result<Option<Question>, StoreError>> + Send;

    /// Record the terminal outcome of a judging. Only SUCCEEDED and FAILED are accepted.
    fn update_submission(
        &self,
        id: u64,
        status: SubmissionStatus,
        judge_info: JudgeInfo,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

pub fn ensure_terminal(id: u64, status: SubmissionStatus) -> Result<(), StoreError> {
    if status.is_terminal() {
        Ok(())
    } else {
        Err(StoreError::NonTerminalStatus { id, status })
    }
}

/// Submission store backed by JSON records in Redis
#[derive(Clone)]
pub struct RedisStore {
    conn: redis::aio::ConnectionManager,
}

impl RedisStore {
    pub fn new(conn: redis::aio::ConnectionManager) -> Self {
        Self { conn }
    }
}

impl SubmissionStore for RedisStore {
    async fn get_submission(&self, id: u64) -> Result<Option<Submission>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(keys::get_submission(&mut conn, id).await?)
    }

    async fn get_question(&self, id: u64) -> Result<Option<Question>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(keys::get_question(&mut conn, id).await?)
    }

    async fn update_submission(
        &self,
        id: u64,
        status: SubmissionStatus,
        judge_info: JudgeInfo,
    ) -> Result<(), StoreError> {
        ensure_terminal(id, status)?;

        let mut conn = self.conn.clone();
        let mut submission = keys::get_submission(&mut conn, id)
            .await?
            .ok_or(StoreError::SubmissionNotFound(id))?;

        submission.status = status;
        submission.judge_info = judge_info;
        keys::put_submission(&mut conn, &submission).await?;
        Ok(())
    }
}
