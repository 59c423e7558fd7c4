/// Judge Evaluator - verdicts from raw execution results
///
/// **Core Responsibility:**
/// Compare produced outputs with expected outputs and check resource usage.
///
/// **Critical Properties:**
/// - Knows nothing about processes, compilers or Redis
/// - Pure function: (execution response, test cases, limits) → JudgeInfo
///
/// **Evaluation order:**
/// 1. Compile error / system error map straight to their verdicts
/// 2. A killed-at-deadline run is Time Limit Exceeded
/// 3. Runtime error
/// 4. Output comparison
/// 5. Resource check (time limit, memory limit) on would-be Accepted only -
///    the only per-language step
///
/// **Normalization Rules:**
/// - Trailing whitespace (including trailing newlines) is ignored
/// - Leading whitespace is significant
/// - Case sensitive, no floating-point tolerance

use judge_common::types::{
    ExecuteCodeResponse, ExecuteStatus, JudgeInfo, JudgeVerdict, TestCase,
};

/// JVM start-up time granted to Java submissions before the time limit applies
pub const JAVA_STARTUP_ALLOWANCE_MS: u64 = 1_000;

/// Everything a strategy needs to judge one submission
#[derive(Debug, Clone, Copy)]
pub struct JudgeContext<'a> {
    pub language: &'a str,
    pub response: &'a ExecuteCodeResponse,
    pub test_cases: &'a [TestCase],
    pub time_limit_ms: u64,
    pub memory_limit_kb: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JudgeStrategy {
    Default,
    Java,
}

impl JudgeStrategy {
    /// Pure mapping from language tag to strategy
    pub fn for_language(language: &str) -> Self {
        if language.trim().eq_ignore_ascii_case("java") {
            JudgeStrategy::Java
        } else {
            JudgeStrategy::Default
        }
    }

    pub fn evaluate(&self, ctx: &JudgeContext<'_>) -> JudgeInfo {
        let response = ctx.response;
        let time = response.judge_info.time.unwrap_or(0);
        let memory = response.judge_info.memory.unwrap_or(0);

        let verdict = match response.status {
            ExecuteStatus::CompileError => JudgeVerdict::CompileError,
            ExecuteStatus::SystemError => JudgeVerdict::SystemError,
            _ if response.timed_out => JudgeVerdict::TimeLimitExceeded,
            ExecuteStatus::Error => JudgeVerdict::RuntimeError,
            ExecuteStatus::Success => match compare_outputs(&response.output_list, ctx.test_cases) {
                JudgeVerdict::Accepted => self
                    .check_resources(ctx, time, memory)
                    .unwrap_or(JudgeVerdict::Accepted),
                wrong => wrong,
            },
        };

        JudgeInfo {
            message: Some(verdict),
            time: Some(time),
            memory: Some(memory),
        }
    }

    fn check_resources(&self, ctx: &JudgeContext<'_>, time: u64, memory: u64) -> Option<JudgeVerdict> {
        let counted_time = match self {
            JudgeStrategy::Default => time,
            JudgeStrategy::Java => time.saturating_sub(JAVA_STARTUP_ALLOWANCE_MS),
        };

        if counted_time > ctx.time_limit_ms {
            return Some(JudgeVerdict::TimeLimitExceeded);
        }
        // Zero means "not measured"
        if memory > 0 && ctx.memory_limit_kb > 0 && memory > ctx.memory_limit_kb {
            return Some(JudgeVerdict::MemoryLimitExceeded);
        }
        None
    }
}

/// Normalize output string for comparison
fn normalize_output(output: &str) -> &str {
    output.trim_end()
}

fn compare_outputs(outputs: &[String], test_cases: &[TestCase]) -> JudgeVerdict {
    if outputs.len() != test_cases.len() {
        return JudgeVerdict::WrongAnswer;
    }

    let all_match = outputs
        .iter()
        .zip(test_cases)
        .all(|(actual, case)| normalize_output(actual) == normalize_output(&case.expected_output));

    if all_match {
        JudgeVerdict::Accepted
    } else {
        JudgeVerdict::WrongAnswer
    }
}

/// Stateless select-then-delegate entry point
pub struct JudgeManager;

impl JudgeManager {
    pub fn do_judge(ctx: &JudgeContext<'_>) -> JudgeInfo {
        JudgeStrategy::for_language(ctx.language).evaluate(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(input: &str, expected: &str) -> TestCase {
        TestCase {
            input: input.to_string(),
            expected_output: expected.to_string(),
        }
    }

    fn success(outputs: &[&str], time: u64) -> ExecuteCodeResponse {
        ExecuteCodeResponse {
            status: ExecuteStatus::Success,
            output_list: outputs.iter().map(|s| s.to_string()).collect(),
            judge_info: JudgeInfo {
                message: None,
                time: Some(time),
                memory: Some(0),
            },
            message: None,
            timed_out: false,
        }
    }

    fn judge(language: &str, response: &ExecuteCodeResponse, cases: &[TestCase], limit: u64) -> JudgeInfo {
        JudgeManager::do_judge(&JudgeContext {
            language,
            response,
            test_cases: cases,
            time_limit_ms: limit,
            memory_limit_kb: 65_536,
        })
    }

    #[test]
    fn test_normalize_output() {
        assert_eq!(normalize_output("3\n"), "3");
        assert_eq!(normalize_output("3 \r\n"), "3");
        assert_eq!(normalize_output("  3"), "  3");
        assert_eq!(normalize_output(""), "");
    }

    #[test]
    fn test_accepted() {
        let cases = [case("1 2", "3"), case("5 5", "10")];
        let info = judge("c", &success(&["3\n", "10\n"], 12), &cases, 5_000);

        assert_eq!(info.message, Some(JudgeVerdict::Accepted));
        assert_eq!(info.time, Some(12));
        assert_eq!(info.memory, Some(0));
    }

    #[test]
    fn test_wrong_answer() {
        let cases = [case("1 2", "4")];
        let info = judge("c", &success(&["3\n"], 12), &cases, 5_000);
        assert_eq!(info.message, Some(JudgeVerdict::WrongAnswer));
    }

    #[test]
    fn test_leading_whitespace_and_case_matter() {
        let cases = [case("", "Hello")];
        assert_eq!(
            judge("python", &success(&[" Hello"], 1), &cases, 1_000).message,
            Some(JudgeVerdict::WrongAnswer)
        );
        assert_eq!(
            judge("python", &success(&["hello"], 1), &cases, 1_000).message,
            Some(JudgeVerdict::WrongAnswer)
        );
    }

    #[test]
    fn test_output_count_mismatch_is_wrong_answer() {
        let cases = [case("1", "1"), case("2", "2")];
        let info = judge("c", &success(&["1"], 1), &cases, 1_000);
        assert_eq!(info.message, Some(JudgeVerdict::WrongAnswer));
    }

    #[test]
    fn test_compile_error_skips_comparison() {
        let response = ExecuteCodeResponse::compile_error("main.c:1: error");
        let info = judge("c", &response, &[case("1", "1")], 1_000);
        assert_eq!(info.message, Some(JudgeVerdict::CompileError));
    }

    #[test]
    fn test_runtime_error() {
        let mut response = ExecuteCodeResponse::error("Segmentation fault");
        response.judge_info.time = Some(4);
        let info = judge("c", &response, &[case("1", "1")], 1_000);
        assert_eq!(info.message, Some(JudgeVerdict::RuntimeError));
    }

    #[test]
    fn test_system_error() {
        let response = ExecuteCodeResponse::system_error("Unsupported language: cobol");
        let info = judge("cobol", &response, &[], 1_000);
        assert_eq!(info.message, Some(JudgeVerdict::SystemError));
    }

    #[test]
    fn test_time_limit_overrides_accepted() {
        let cases = [case("", "ok")];
        let info = judge("python", &success(&["ok"], 1_500), &cases, 1_000);
        assert_eq!(info.message, Some(JudgeVerdict::TimeLimitExceeded));
        assert_eq!(info.time, Some(1_500));
    }

    #[test]
    fn test_timeout_flag_is_time_limit_exceeded() {
        let mut response = ExecuteCodeResponse::error("Execution timed out after 5000ms");
        response.timed_out = true;
        response.judge_info.time = Some(5_000);

        let info = judge("c", &response, &[case("", "x")], 10_000);
        assert_eq!(info.message, Some(JudgeVerdict::TimeLimitExceeded));
    }

    #[test]
    fn test_slow_wrong_answer_stays_wrong_answer() {
        let cases = [case("1 2", "4")];
        let info = judge("c", &success(&["3\n"], 1_500), &cases, 1_000);
        assert_eq!(info.message, Some(JudgeVerdict::WrongAnswer));
        assert_eq!(info.time, Some(1_500));
    }

    #[test]
    fn test_slow_crash_without_timeout_is_runtime_error() {
        let mut response = ExecuteCodeResponse::error("Segmentation fault");
        response.judge_info.time = Some(1_500);

        let info = judge("c", &response, &[case("1", "1")], 1_000);
        assert_eq!(info.message, Some(JudgeVerdict::RuntimeError));
    }

    #[test]
    fn test_memory_limit() {
        let mut response = success(&["ok"], 10);
        response.judge_info.memory = Some(100_000);
        let info = judge("c", &response, &[case("", "ok")], 1_000);
        assert_eq!(info.message, Some(JudgeVerdict::MemoryLimitExceeded));
    }

    #[test]
    fn test_java_gets_startup_allowance() {
        let cases = [case("", "ok")];
        let response = success(&["ok"], 1_800);

        assert_eq!(
            judge("java", &response, &cases, 1_000).message,
            Some(JudgeVerdict::Accepted)
        );
        assert_eq!(
            judge("cpp", &response, &cases, 1_000).message,
            Some(JudgeVerdict::TimeLimitExceeded)
        );
        // Reported time is the measured one
        assert_eq!(judge("java", &response, &cases, 1_000).time, Some(1_800));
    }

    #[test]
    fn test_strategy_selection() {
        assert_eq!(JudgeStrategy::for_language("java"), JudgeStrategy::Java);
        assert_eq!(JudgeStrategy::for_language("JAVA"), JudgeStrategy::Java);
        assert_eq!(JudgeStrategy::for_language("c"), JudgeStrategy::Default);
        assert_eq!(JudgeStrategy::for_language("unknown"), JudgeStrategy::Default);
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let cases = [case("1 2", "3"), case("5 5", "11")];
        let response = success(&["3", "10"], 20);

        let first = judge("c", &response, &cases, 100);
        let second = judge("c", &response, &cases, 100);
        assert_eq!(first, second);
    }
}
