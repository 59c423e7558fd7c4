// CLI commands talking to the judge's Redis store
use anyhow::{bail, Context, Result};
use judge_common::config::RedisConfig;
use judge_common::redis;
use judge_common::types::{Language, NewSubmission, Question, SubmissionStatus};
use std::fs;
use std::path::Path;

async fn connect() -> Result<::redis::aio::ConnectionManager> {
    let config = RedisConfig::from_env();
    config
        .connect()
        .await
        .with_context(|| format!("Failed to connect to Redis at {}", config.url))
}

/// Parse and sanity-check a question file
fn load_question(path: &Path) -> Result<Question> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let question: Question = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    if question.test_cases.is_empty() {
        bail!("Question {} has no test cases", question.id);
    }
    if question.time_limit_ms == 0 {
        bail!("Question {} has a zero time limit", question.id);
    }
    Ok(question)
}

fn check_language(tag: &str) -> Result<()> {
    if Language::from_tag(tag).is_none() {
        let supported: Vec<&str> = Language::ALL.iter().map(|l| l.as_str()).collect();
        bail!(
            "Unsupported language '{}' (supported: {})",
            tag,
            supported.join(", ")
        );
    }
    Ok(())
}

pub async fn add_question(path: &Path) -> Result<()> {
    let question = load_question(path)?;
    let mut conn = connect().await?;

    redis::store_question(&mut conn, &question)
        .await
        .context("Failed to store question")?;

    println!(
        "✅ Stored question {} ({} test case(s), {} ms, {} KB)",
        question.id,
        question.test_cases.len(),
        question.time_limit_ms,
        question.memory_limit_kb
    );
    Ok(())
}

pub async fn submit(question_id: u64, language: &str, source: &Path, user_id: u64) -> Result<()> {
    check_language(language)?;
    let source_code = fs::read_to_string(source)
        .with_context(|| format!("Failed to read {}", source.display()))?;

    let mut conn = connect().await?;
    if redis::get_question(&mut conn, question_id).await?.is_none() {
        bail!("Question {} does not exist", question_id);
    }

    let submission = redis::create_submission(
        &mut conn,
        NewSubmission {
            question_id,
            user_id,
            language: language.trim().to_ascii_lowercase(),
            source_code,
        },
    )
    .await
    .context("Failed to create submission")?;

    println!("📨 Submission {} queued", submission.id);
    println!("\n💡 Check it with: judge-cli status --id {}", submission.id);
    Ok(())
}

pub async fn show_status(id: u64) -> Result<()> {
    let mut conn = connect().await?;
    let submission = redis::get_submission(&mut conn, id)
        .await?
        .with_context(|| format!("Submission {} not found", id))?;

    let status = match submission.status {
        SubmissionStatus::Waiting => "WAITING",
        SubmissionStatus::Running => "RUNNING",
        SubmissionStatus::Succeeded => "SUCCEEDED",
        SubmissionStatus::Failed => "FAILED",
    };

    println!("Submission {} (question {}, {})", submission.id, submission.question_id, submission.language);
    println!("{}", "─".repeat(40));
    println!("{:<10} {}", "Status", status);
    if let Some(verdict) = submission.judge_info.message {
        println!("{:<10} {}", "Verdict", verdict);
    }
    if let Some(time) = submission.judge_info.time {
        println!("{:<10} {} ms", "Time", time);
    }
    if let Some(memory) = submission.judge_info.memory {
        println!("{:<10} {} KB", "Memory", memory);
    }
    Ok(())
}
