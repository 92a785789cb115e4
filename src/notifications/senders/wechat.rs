//! WeChat push dispatcher. Posts `{ title, content }` to a user-supplied
//! push gateway URL.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{NotificationSender, SenderError, SEND_TIMEOUT};
use crate::notifications::models::{render_template, ChannelConfig, NotificationData};

const DEFAULT_TITLE_TEMPLATE: &str = "Monitor - {monitorName} 状态{statusText}";
const DEFAULT_CONTENT_TEMPLATE: &str = "{message}";

pub struct WechatSender {
    client: Client,
}

impl WechatSender {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(SEND_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for WechatSender {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct WechatMessage<'a> {
    title: &'a str,
    content: &'a str,
}

#[async_trait]
impl NotificationSender for WechatSender {
    async fn send(
        &self,
        config: &ChannelConfig,
        data: &NotificationData,
    ) -> Result<(), SenderError> {
        let (push_url, title_template, content_template) = match config {
            ChannelConfig::WechatPush {
                push_url,
                title_template,
                content_template,
            } => (push_url, title_template, content_template),
            _ => {
                return Err(SenderError::InvalidConfiguration(
                    "Expected 微信推送 config, but found a different type.".to_string(),
                ));
            }
        };

        let vars = data.template_vars();
        let title = render_template(
            title_template.as_deref().unwrap_or(DEFAULT_TITLE_TEMPLATE),
            &vars,
            false,
        );
        let content = render_template(
            content_template
                .as_deref()
                .unwrap_or(DEFAULT_CONTENT_TEMPLATE),
            &vars,
            false,
        );

        let payload = WechatMessage {
            title: &title,
            content: &content,
        };
        let response = self.client.post(push_url).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(SenderError::SendFailed(format!(
                "微信推送接口返回非成功状态: {status}. Body: {error_body}"
            )));
        }

        Ok(())
    }
}
