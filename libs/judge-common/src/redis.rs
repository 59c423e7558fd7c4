use crate::types::{NewSubmission, Question, Submission};
use redis::{AsyncCommands, Direction, RedisResult};
use tracing::{info, warn};

/// Redis key layout shared by the worker and the CLI.
///
/// The queue is a pair of lists: ids wait in `QUEUE_KEY` and move atomically
/// into `PROCESSING_KEY` when a worker takes them. An id leaves the processing
/// list only after its verdict is persisted, which gives at-least-once delivery.

pub const QUEUE_KEY: &str = "oj:queue:submissions";
pub const PROCESSING_KEY: &str = "oj:queue:processing";
pub const SUBMISSION_PREFIX: &str = "oj:submission";
pub const QUESTION_PREFIX: &str = "oj:question";
pub const SUBMISSION_SEQ_KEY: &str = "oj:seq:submission";

pub fn submission_key(id: u64) -> String {
    format!("{}:{}", SUBMISSION_PREFIX, id)
}

pub fn question_key(id: u64) -> String {
    format!("{}:{}", QUESTION_PREFIX, id)
}

fn serde_error(desc: &'static str, e: serde_json::Error) -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::TypeError, desc, e.to_string()))
}

/// Enqueue a submission id (FIFO)
pub async fn push_submission(
    conn: &mut redis::aio::ConnectionManager,
    id: u64,
) -> RedisResult<()> {
    conn.rpush(QUEUE_KEY, id.to_string()).await
}

/// Take the next submission id, blocking up to `timeout_seconds`.
/// The id stays in the processing list until `ack_submission`.
pub async fn pop_submission(
    conn: &mut redis::aio::ConnectionManager,
    timeout_seconds: f64,
) -> RedisResult<Option<u64>> {
    let payload: Option<String> = conn
        .blmove(
            QUEUE_KEY,
            PROCESSING_KEY,
            Direction::Left,
            Direction::Right,
            timeout_seconds,
        )
        .await?;

    match payload {
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(id) => Ok(Some(id)),
            Err(e) => {
                // Unparseable ids can never be judged; drop them instead of redelivering
                let _: i64 = conn.lrem(PROCESSING_KEY, 1, &raw).await?;
                Err(redis::RedisError::from((
                    redis::ErrorKind::TypeError,
                    "invalid submission id in queue",
                    format!("{:?}: {}", raw, e),
                )))
            }
        },
        None => Ok(None),
    }
}

/// Acknowledge a submission whose verdict has been persisted
pub async fn ack_submission(
    conn: &mut redis::aio::ConnectionManager,
    id: u64,
) -> RedisResult<()> {
    let removed: i64 = conn.lrem(PROCESSING_KEY, 1, id.to_string()).await?;
    if removed == 0 {
        warn!(submission_id = id, "Acknowledged submission was not in the processing list");
    }
    Ok(())
}

/// Hand one unacknowledged id back to the tail of the queue.
/// Used when a verdict could not be persisted, so the submission is judged again
/// without waiting for a worker restart.
pub async fn requeue_submission(
    conn: &mut redis::aio::ConnectionManager,
    id: u64,
) -> RedisResult<()> {
    let member = id.to_string();
    let (removed, _len): (i64, i64) = redis::pipe()
        .atomic()
        .lrem(PROCESSING_KEY, 1, &member)
        .rpush(QUEUE_KEY, &member)
        .query_async(conn)
        .await?;
    if removed == 0 {
        warn!(submission_id = id, "Requeued submission was not in the processing list");
    }
    Ok(())
}

/// Move every unacknowledged id back to the head of the queue.
/// Called once at worker start so messages held by a crashed worker are redelivered.
pub async fn requeue_inflight(conn: &mut redis::aio::ConnectionManager) -> RedisResult<usize> {
    let mut moved = 0;
    loop {
        let item: Option<String> = conn
            .lmove(PROCESSING_KEY, QUEUE_KEY, Direction::Right, Direction::Left)
            .await?;
        match item {
            Some(_) => moved += 1,
            None => break,
        }
    }
    if moved > 0 {
        info!(count = moved, "Requeued unacknowledged submissions");
    }
    Ok(moved)
}

pub async fn get_submission(
    conn: &mut redis::aio::ConnectionManager,
    id: u64,
) -> RedisResult<Option<Submission>> {
    let payload: Option<String> = conn.get(submission_key(id)).await?;
    payload
        .map(|data| serde_json::from_str(&data).map_err(|e| serde_error("deserialization error", e)))
        .transpose()
}

pub async fn put_submission(
    conn: &mut redis::aio::ConnectionManager,
    submission: &Submission,
) -> RedisResult<()> {
    let payload = serde_json::to_string(submission)
        .map_err(|e| serde_error("serialization error", e))?;
    conn.set(submission_key(submission.id), payload).await
}

pub async fn get_question(
    conn: &mut redis::aio::ConnectionManager,
    id: u64,
) -> RedisResult<Option<Question>> {
    let payload: Option<String> = conn.get(question_key(id)).await?;
    payload
        .map(|data| serde_json::from_str(&data).map_err(|e| serde_error("deserialization error", e)))
        .transpose()
}

pub async fn store_question(
    conn: &mut redis::aio::ConnectionManager,
    question: &Question,
) -> RedisResult<()> {
    let payload = serde_json::to_string(question)
        .map_err(|e| serde_error("serialization error", e))?;
    conn.set(question_key(question.id), payload).await
}

/// Persist a new WAITING submission and enqueue its id.
/// Returns as soon as the id is queued; judging happens asynchronously.
pub async fn create_submission(
    conn: &mut redis::aio::ConnectionManager,
    new: NewSubmission,
) -> RedisResult<Submission> {
    let id: u64 = conn.incr(SUBMISSION_SEQ_KEY, 1).await?;
    let submission = new.into_submission(id);
    put_submission(conn, &submission).await?;
    push_submission(conn, id).await?;
    Ok(submission)
}
