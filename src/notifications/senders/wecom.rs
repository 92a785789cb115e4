//! WeCom (enterprise WeChat) group robot dispatcher.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{check_robot_response, NotificationSender, SenderError, SEND_TIMEOUT};
use crate::notifications::models::{format_local, ChannelConfig, NotificationData};

pub struct WeComSender {
    client: Client,
}

impl WeComSender {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(SEND_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for WeComSender {
    fn default() -> Self {
        Self::new()
    }
}

fn markdown_content(data: &NotificationData) -> String {
    let color = match data.status_text() {
        "正常" => "info",
        _ => "warning",
    };
    format!(
        "**{name}** 状态<font color=\"{color}\">{status}</font>\n\
         > 时间: {time}\n> 类型: {monitor_type}\n\n{message}",
        name = data.monitor_name,
        status = data.status_text(),
        time = format_local(data.time),
        monitor_type = data.monitor_type,
        message = data.message,
    )
}

#[async_trait]
impl NotificationSender for WeComSender {
    async fn send(
        &self,
        config: &ChannelConfig,
        data: &NotificationData,
    ) -> Result<(), SenderError> {
        let webhook_url = match config {
            ChannelConfig::WeCom { webhook_url } => webhook_url,
            _ => {
                return Err(SenderError::InvalidConfiguration(
                    "Expected 企业微信推送 config, but found a different type.".to_string(),
                ));
            }
        };

        let payload = json!({
            "msgtype": "markdown",
            "markdown": { "content": markdown_content(data) }
        });

        let response = self.client.post(webhook_url).json(&payload).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        check_robot_response(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::types::CheckStatus;
    use chrono::Utc;

    #[test]
    fn markdown_marks_down_as_warning() {
        let data = NotificationData {
            monitor_name: "db".into(),
            monitor_type: "mysql".into(),
            status: CheckStatus::Down,
            time: Utc::now(),
            message: "连接超时 (TIMEOUT)".into(),
            address: None,
            failure_info: None,
        };
        let content = markdown_content(&data);
        assert!(content.contains("color=\"warning\""));
        assert!(content.contains("**db**"));
    }
}
