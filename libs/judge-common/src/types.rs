use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Languages the judge knows how to build and run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Java,
    C,
    Cpp,
    Python,
    Rust,
}

impl Language {
    pub const ALL: [Language; 5] = [
        Language::Java,
        Language::C,
        Language::Cpp,
        Language::Python,
        Language::Rust,
    ];

    /// Parse a submission's language tag (case-insensitive)
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "java" => Some(Language::Java),
            "c" => Some(Language::C),
            "cpp" | "c++" => Some(Language::Cpp),
            "python" | "python3" => Some(Language::Python),
            "rust" => Some(Language::Rust),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Python => "python",
            Language::Rust => "rust",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted submission lifecycle. The numeric values are stored and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum SubmissionStatus {
    Waiting = 0,
    Running = 1,
    Succeeded = 2,
    Failed = 3,
}

impl SubmissionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionStatus::Succeeded | SubmissionStatus::Failed)
    }
}

impl From<SubmissionStatus> for u8 {
    fn from(status: SubmissionStatus) -> Self {
        status as u8
    }
}

impl TryFrom<u8> for SubmissionStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SubmissionStatus::Waiting),
            1 => Ok(SubmissionStatus::Running),
            2 => Ok(SubmissionStatus::Succeeded),
            3 => Ok(SubmissionStatus::Failed),
            other => Err(format!("unknown submission status: {}", other)),
        }
    }
}

/// Final classification of a judged submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JudgeVerdict {
    #[serde(rename = "Accepted")]
    Accepted,
    #[serde(rename = "Wrong Answer")]
    WrongAnswer,
    #[serde(rename = "Compile Error")]
    CompileError,
    #[serde(rename = "Runtime Error")]
    RuntimeError,
    #[serde(rename = "Time Limit Exceeded")]
    TimeLimitExceeded,
    #[serde(rename = "Memory Limit Exceeded")]
    MemoryLimitExceeded,
    #[serde(rename = "System Error")]
    SystemError,
}

impl JudgeVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            JudgeVerdict::Accepted => "Accepted",
            JudgeVerdict::WrongAnswer => "Wrong Answer",
            JudgeVerdict::CompileError => "Compile Error",
            JudgeVerdict::RuntimeError => "Runtime Error",
            JudgeVerdict::TimeLimitExceeded => "Time Limit Exceeded",
            JudgeVerdict::MemoryLimitExceeded => "Memory Limit Exceeded",
            JudgeVerdict::SystemError => "System Error",
        }
    }
}

impl fmt::Display for JudgeVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict plus resource usage. `JudgeInfo::default()` is the placeholder a
/// submission carries until it is judged and serializes as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<JudgeVerdict>,
    /// Milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<u64>,
    /// Kilobytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<u64>,
}

impl JudgeInfo {
    pub fn verdict(verdict: JudgeVerdict) -> Self {
        Self {
            message: Some(verdict),
            ..Default::default()
        }
    }

    pub fn system_error() -> Self {
        Self::verdict(JudgeVerdict::SystemError)
    }

    pub fn is_placeholder(&self) -> bool {
        self == &JudgeInfo::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: u64,
    pub test_cases: Vec<TestCase>,
    pub time_limit_ms: u64,
    pub memory_limit_kb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: u64,
    pub question_id: u64,
    pub user_id: u64,
    pub language: String,
    pub source_code: String,
    pub status: SubmissionStatus,
    #[serde(default)]
    pub judge_info: JudgeInfo,
    pub created_at: DateTime<Utc>,
}

/// Producer-side submission before it has an id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubmission {
    pub question_id: u64,
    pub user_id: u64,
    pub language: String,
    pub source_code: String,
}

impl NewSubmission {
    pub fn into_submission(self, id: u64) -> Submission {
        Submission {
            id,
            question_id: self.question_id,
            user_id: self.user_id,
            language: self.language,
            source_code: self.source_code,
            status: SubmissionStatus::Waiting,
            judge_info: JudgeInfo::default(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteCodeRequest {
    pub code: String,
    pub language: String,
    pub input_list: Vec<String>,
    /// Passed to runtimes that accept a heap ceiling; not enforced by the sandbox
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit_kb: Option<u64>,
}

/// Raw result of one process run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteMessage {
    pub stdout: String,
    pub stderr: String,
    /// None when the process was killed by a signal or by the deadline
    pub exit_code: Option<i32>,
    pub elapsed_ms: u64,
    #[serde(default)]
    pub timed_out: bool,
}

impl ExecuteMessage {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecuteStatus {
    Success,
    /// The submitted program failed at run time
    Error,
    CompileError,
    /// The sandbox could not do its job; never attributed to the submission
    SystemError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteCodeResponse {
    pub status: ExecuteStatus,
    pub output_list: Vec<String>,
    pub judge_info: JudgeInfo,
    pub message: Option<String>,
    #[serde(default)]
    pub timed_out: bool,
}

impl ExecuteCodeResponse {
    pub fn compile_error(message: impl Into<String>) -> Self {
        Self::failure(ExecuteStatus::CompileError, message)
    }

    pub fn system_error(message: impl Into<String>) -> Self {
        Self::failure(ExecuteStatus::SystemError, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::failure(ExecuteStatus::Error, message)
    }

    fn failure(status: ExecuteStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            output_list: Vec::new(),
            judge_info: JudgeInfo::default(),
            message: Some(message.into()),
            timed_out: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is_numeric_on_the_wire() {
        assert_eq!(serde_json::to_string(&SubmissionStatus::Waiting).unwrap(), "0");
        assert_eq!(serde_json::to_string(&SubmissionStatus::Failed).unwrap(), "3");
        let parsed: SubmissionStatus = serde_json::from_str("2").unwrap();
        assert_eq!(parsed, SubmissionStatus::Succeeded);
        assert!(serde_json::from_str::<SubmissionStatus>("7").is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!SubmissionStatus::Waiting.is_terminal());
        assert!(!SubmissionStatus::Running.is_terminal());
        assert!(SubmissionStatus::Succeeded.is_terminal());
        assert!(SubmissionStatus::Failed.is_terminal());
    }

    #[test]
    fn test_verdict_strings_are_stable() {
        let json = serde_json::to_string(&JudgeVerdict::TimeLimitExceeded).unwrap();
        assert_eq!(json, "\"Time Limit Exceeded\"");
        assert_eq!(JudgeVerdict::WrongAnswer.to_string(), "Wrong Answer");
        let parsed: JudgeVerdict = serde_json::from_str("\"System Error\"").unwrap();
        assert_eq!(parsed, JudgeVerdict::SystemError);
    }

    #[test]
    fn test_placeholder_judge_info_is_empty_object() {
        let info = JudgeInfo::default();
        assert!(info.is_placeholder());
        assert_eq!(serde_json::to_string(&info).unwrap(), "{}");

        let parsed: JudgeInfo = serde_json::from_str("{}").unwrap();
        assert!(parsed.is_placeholder());
    }

    #[test]
    fn test_language_tags() {
        assert_eq!(Language::from_tag("C"), Some(Language::C));
        assert_eq!(Language::from_tag(" java "), Some(Language::Java));
        assert_eq!(Language::from_tag("c++"), Some(Language::Cpp));
        assert_eq!(Language::from_tag("cobol"), None);
        for lang in Language::ALL {
            assert_eq!(Language::from_tag(lang.as_str()), Some(lang));
        }
    }

    #[test]
    fn test_new_submission_starts_waiting() {
        let submission = NewSubmission {
            question_id: 7,
            user_id: 1,
            language: "c".to_string(),
            source_code: "int main(){}".to_string(),
        }
        .into_submission(42);

        assert_eq!(submission.id, 42);
        assert_eq!(submission.status, SubmissionStatus::Waiting);
        assert!(submission.judge_info.is_placeholder());
    }
}
