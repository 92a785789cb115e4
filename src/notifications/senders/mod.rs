//! Channel dispatchers. Each sender performs exactly one delivery
//! attempt; retries and rate limiting are not layered here.

use async_trait::async_trait;
use thiserror::Error;

use super::models::{ChannelConfig, NotificationData};

pub mod dingtalk;
pub mod email;
pub mod webhook;
pub mod wechat;
pub mod wecom;

/// All outbound HTTP/SMTP calls are bounded by this.
pub const SEND_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Failed to send notification: {0}")]
    SendFailed(String),
    #[error("Invalid configuration for sender: {0}")]
    InvalidConfiguration(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

/// One concrete delivery mechanism.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(
        &self,
        config: &ChannelConfig,
        data: &NotificationData,
    ) -> Result<(), SenderError>;
}

/// DingTalk-style robots answer HTTP 2xx with an `errcode` field; both a
/// non-2xx status and a non-zero errcode count as failure. A body without
/// `errcode` passes on status alone.
pub(crate) fn check_robot_response(
    status: reqwest::StatusCode,
    body: &str,
) -> Result<(), SenderError> {
    if !status.is_success() {
        return Err(SenderError::SendFailed(format!(
            "机器人接口返回非成功状态: {status}. Body: {body}"
        )));
    }
    if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(errcode) = parsed.get("errcode").and_then(|v| v.as_i64()) {
            if errcode != 0 {
                let errmsg = parsed
                    .get("errmsg")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown");
                return Err(SenderError::SendFailed(format!(
                    "机器人接口返回 errcode={errcode}: {errmsg}"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn robot_response_rules() {
        assert!(check_robot_response(StatusCode::OK, r#"{"errcode":0,"errmsg":"ok"}"#).is_ok());
        assert!(check_robot_response(StatusCode::OK, "not json").is_ok());
        assert!(check_robot_response(StatusCode::OK, r#"{"errcode":310000}"#).is_err());
        assert!(check_robot_response(StatusCode::BAD_GATEWAY, r#"{"errcode":0}"#).is_err());
    }
}
