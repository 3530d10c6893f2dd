use serde::{Deserialize, Serialize};

pub const CONNECTION_FAILURE_MESSAGE: &str = "Failed to connect to backend api";
pub const MISSING_SPEED_MESSAGE: &str = "Backend returned no speed measurement";

/// Body of `GET /api/speedtest?node=<name>`.
///
/// The center forwards whatever the node's speedtest server answered, so every
/// field is optional. Use [`SpeedtestResult::failure_reason`] to decide whether
/// a result counts as a success.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct SpeedtestResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_mbps: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SpeedtestResult {
    pub fn from_error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    /// Synthetic result for a speedtest request that never completed.
    pub fn connection_failure() -> Self {
        Self::from_error(CONNECTION_FAILURE_MESSAGE)
    }

    /// Why this result is not a success, if it isn't.
    ///
    /// A non-empty `error` always wins, even next to a speed. A result with
    /// neither an error nor a speed is treated as a failure as well.
    pub fn failure_reason(&self) -> Option<String> {
        match self.error.as_deref() {
            Some(error) if !error.is_empty() => Some(error.to_string()),
            _ if self.speed_mbps.is_none() => Some(MISSING_SPEED_MESSAGE.to_string()),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure_reason().is_none()
    }

    pub fn speed_label(&self) -> Option<String> {
        self.speed_mbps.map(|speed| format!("{speed} Mbps"))
    }

    pub fn duration_label(&self) -> Option<String> {
        self.duration_seconds.map(|duration| format!("{duration}s"))
    }
}
