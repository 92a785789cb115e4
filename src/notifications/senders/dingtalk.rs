//! DingTalk robot dispatcher with optional HMAC request signing.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::json;
use sha2::Sha256;

use super::{check_robot_response, NotificationSender, SenderError, SEND_TIMEOUT};
use crate::notifications::models::{format_local, ChannelConfig, NotificationData};

type HmacSha256 = Hmac<Sha256>;

pub struct DingTalkSender {
    client: Client,
}

impl DingTalkSender {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(SEND_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for DingTalkSender {
    fn default() -> Self {
        Self::new()
    }
}

/// Sign the robot URL: `sign = base64(HMAC_SHA256(secret, "<ts>\n<secret>"))`,
/// appended as `&timestamp=<ts>&sign=<urlencoded>`.
pub fn signed_url(webhook_url: &str, secret: &str, timestamp_ms: i64) -> String {
    let string_to_sign = format!("{timestamp_ms}\n{secret}");
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(string_to_sign.as_bytes());
    let signature = BASE64.encode(mac.finalize().into_bytes());
    format!(
        "{webhook_url}&timestamp={timestamp_ms}&sign={}",
        urlencoding::encode(&signature)
    )
}

fn markdown_text(data: &NotificationData) -> String {
    format!(
        "### {name} 状态{status}\n\n- 时间: {time}\n- 类型: {monitor_type}\n\n{message}",
        name = data.monitor_name,
        status = data.status_text(),
        time = format_local(data.time),
        monitor_type = data.monitor_type,
        message = data.message,
    )
}

#[async_trait]
impl NotificationSender for DingTalkSender {
    async fn send(
        &self,
        config: &ChannelConfig,
        data: &NotificationData,
    ) -> Result<(), SenderError> {
        let (webhook_url, secret) = match config {
            ChannelConfig::DingTalk {
                webhook_url,
                secret,
            } => (webhook_url, secret),
            _ => {
                return Err(SenderError::InvalidConfiguration(
                    "Expected 钉钉推送 config, but found a different type.".to_string(),
                ));
            }
        };

        let url = match secret.as_deref().filter(|s| !s.is_empty()) {
            Some(secret) => signed_url(webhook_url, secret, Utc::now().timestamp_millis()),
            None => webhook_url.clone(),
        };

        let payload = json!({
            "msgtype": "markdown",
            "markdown": {
                "title": format!("Monitor - {} 状态{}", data.monitor_name, data.status_text()),
                "text": markdown_text(data),
            }
        });

        let response = self.client.post(&url).json(&payload).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        check_robot_response(status, &body)
    }
}
