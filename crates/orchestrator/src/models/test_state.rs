use chrono::{DateTime, Utc};
use shared::models::SpeedtestResult;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct CompletedTest {
    pub result: SpeedtestResult,
    pub finished_at: DateTime<Utc>,
}

/// Lifecycle of one node's speedtest.
///
/// `Error` always carries a result with a non-empty `error`, `Success` always
/// carries a result with a speed.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TestState {
    #[default]
    Idle,
    Running,
    Success(CompletedTest),
    Error(CompletedTest),
}

impl TestState {
    pub fn from_result(mut result: SpeedtestResult, finished_at: DateTime<Utc>) -> Self {
        match result.failure_reason() {
            Some(reason) => {
                result.error = Some(reason);
                TestState::Error(CompletedTest {
                    result,
                    finished_at,
                })
            }
            None => TestState::Success(CompletedTest {
                result,
                finished_at,
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, TestState::Running)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, TestState::Success(_) | TestState::Error(_))
    }

    pub fn completed(&self) -> Option<&CompletedTest> {
        match self {
            TestState::Success(test) | TestState::Error(test) => Some(test),
            TestState::Idle | TestState::Running => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TestState::Idle => "idle",
            TestState::Running => "running",
            TestState::Success(_) => "success",
            TestState::Error(_) => "error",
        }
    }
}

impl fmt::Display for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestState::Idle => write!(f, "idle"),
            TestState::Running => write!(f, "Testing speed..."),
            TestState::Success(test) => {
                let result = &test.result;
                let parts: Vec<String> = [
                    result.speed_label(),
                    result.duration_label(),
                    result.tool.clone(),
                ]
                .into_iter()
                .flatten()
                .collect();
                write!(f, "{}", parts.join(" | "))
            }
            TestState::Error(test) => {
                write!(f, "{}", test.result.error.as_deref().unwrap_or_default())
            }
        }
    }
}
