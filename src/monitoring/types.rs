use serde::{Deserialize, Serialize};

/// Outcome status of a single probe.
///
/// Stored in history rows as a small integer: `UP=1`, `DOWN=0`, `PENDING=2`.
/// Executors only ever produce `Up` or `Down`; `Pending` is reserved for
/// push monitors that have not received a heartbeat yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Up,
    Down,
    Pending,
}

impl CheckStatus {
    pub fn as_i16(self) -> i16 {
        match self {
            CheckStatus::Down => 0,
            CheckStatus::Up => 1,
            CheckStatus::Pending => 2,
        }
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(CheckStatus::Down),
            1 => Some(CheckStatus::Up),
            2 => Some(CheckStatus::Pending),
            _ => None,
        }
    }

    /// Chinese display text used in notification subjects and payloads.
    pub fn display_zh(self) -> &'static str {
        match self {
            CheckStatus::Up => "正常",
            CheckStatus::Down => "故障",
            CheckStatus::Pending => "等待中",
        }
    }

    pub fn invert(self) -> Self {
        match self {
            CheckStatus::Up => CheckStatus::Down,
            CheckStatus::Down => CheckStatus::Up,
            CheckStatus::Pending => CheckStatus::Pending,
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckStatus::Up => write!(f, "up"),
            CheckStatus::Down => write!(f, "down"),
            CheckStatus::Pending => write!(f, "pending"),
        }
    }
}

/// Result of one probe execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub status: CheckStatus,
    pub message: String,
    /// Wall-clock latency in milliseconds, when the probe measured one.
    pub ping: Option<i32>,
    /// Optional structured detail recorded alongside the history row.
    pub details: Option<serde_json::Value>,
}

impl CheckResult {
    pub fn up(message: impl Into<String>, ping: Option<i32>) -> Self {
        Self {
            status: CheckStatus::Up,
            message: message.into(),
            ping,
            details: None,
        }
    }

    pub fn down(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Down,
            message: message.into(),
            ping: None,
            details: None,
        }
    }

    pub fn down_with_ping(message: impl Into<String>, ping: Option<i32>) -> Self {
        Self {
            status: CheckStatus::Down,
            message: message.into(),
            ping,
            details: None,
        }
    }

    pub fn pending(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Pending,
            message: message.into(),
            ping: None,
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Flip the success interpretation for upside-down monitors.
    pub fn inverted(mut self) -> Self {
        self.status = self.status.invert();
        self.message = format!("[inverted] {}", self.message);
        self
    }

    /// Config-invalid results belong to the non-retryable error class.
    pub fn is_config_error(&self) -> bool {
        self.message.starts_with("配置无效")
    }
}
