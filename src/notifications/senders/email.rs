//! SMTP email dispatcher.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{NotificationSender, SenderError, SEND_TIMEOUT};
use crate::notifications::models::{format_local, ChannelConfig, NotificationData};

const DEFAULT_FROM_ADDRESS: &str = "nodepulse@localhost";

pub struct EmailSender;

impl EmailSender {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EmailSender {
    fn default() -> Self {
        Self::new()
    }
}

fn html_body(data: &NotificationData) -> String {
    format!(
        "<h2>{name} 当前状态: {status}</h2>\
         <p><b>时间:</b> {time}</p>\
         <p><b>类型:</b> {monitor_type}</p>\
         <p>{message}</p>",
        name = data.monitor_name,
        status = data.status_text(),
        time = format_local(data.time),
        monitor_type = data.monitor_type,
        message = data.message.replace('\n', "<br>"),
    )
}

#[async_trait]
impl NotificationSender for EmailSender {
    async fn send(
        &self,
        config: &ChannelConfig,
        data: &NotificationData,
    ) -> Result<(), SenderError> {
        let (email, smtp_server, smtp_port, username, password) = match config {
            ChannelConfig::Email {
                email,
                smtp_server,
                smtp_port,
                username,
                password,
            } => (email, smtp_server, *smtp_port, username, password),
            _ => {
                return Err(SenderError::InvalidConfiguration(
                    "Expected 邮件 config, but found a different type.".to_string(),
                ));
            }
        };

        let from = username
            .as_deref()
            .filter(|u| u.contains('@'))
            .unwrap_or(DEFAULT_FROM_ADDRESS);

        let message = Message::builder()
            .from(
                from.parse()
                    .map_err(|e| SenderError::InvalidConfiguration(format!("发件人地址无效: {e}")))?,
            )
            .to(email
                .parse()
                .map_err(|e| SenderError::InvalidConfiguration(format!("收件人地址无效: {e}")))?)
            .subject(format!(
                "Monitor - {} 状态{}",
                data.monitor_name,
                data.status_text()
            ))
            .header(ContentType::TEXT_HTML)
            .body(html_body(data))
            .map_err(|e| SenderError::SendFailed(format!("邮件构建失败: {e}")))?;

        // Port 465 speaks implicit TLS; everything else upgrades
        // opportunistically via STARTTLS.
        let mut builder = if smtp_port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_server)
                .map_err(|e| SenderError::SendFailed(format!("SMTP 连接配置失败: {e}")))?
                .port(smtp_port)
        } else {
            let tls = TlsParameters::new(smtp_server.to_string())
                .map_err(|e| SenderError::SendFailed(format!("TLS 参数无效: {e}")))?;
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_server)
                .port(smtp_port)
                .tls(Tls::Opportunistic(tls))
        };

        if let (Some(user), Some(pass)) = (username, password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        let mailer = builder.timeout(Some(SEND_TIMEOUT)).build();
        mailer
            .send(message)
            .await
            .map_err(|e| SenderError::SendFailed(format!("SMTP 发送失败: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::types::CheckStatus;
    use chrono::Utc;

    #[test]
    fn body_renders_newlines_as_breaks() {
        let data = NotificationData {
            monitor_name: "api".into(),
            monitor_type: "http".into(),
            status: CheckStatus::Down,
            time: Utc::now(),
            message: "第一行\n第二行".into(),
            address: None,
            failure_info: None,
        };
        let body = html_body(&data);
        assert!(body.contains("第一行<br>第二行"));
        assert!(body.contains("api 当前状态: 故障"));
    }
}
