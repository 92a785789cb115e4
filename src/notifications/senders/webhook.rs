//! Generic webhook dispatcher.

use async_trait::async_trait;
use reqwest::{header, Client, Method};

use super::{NotificationSender, SenderError, SEND_TIMEOUT};
use crate::notifications::models::{render_template, ChannelConfig, NotificationData};

const DEFAULT_CONTENT_TYPE: &str = "application/json";

pub struct WebhookSender {
    client: Client,
}

impl WebhookSender {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(SEND_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for WebhookSender {
    fn default() -> Self {
        Self::new()
    }
}

/// Render the outgoing body: the `{field}` template when configured
/// (values JSON-escaped iff the content type is JSON), otherwise the
/// default payload.
pub(crate) fn render_body(
    body_template: Option<&str>,
    content_type: &str,
    data: &NotificationData,
) -> String {
    match body_template {
        Some(template) if !template.trim().is_empty() => {
            let escape = content_type.starts_with("application/json");
            render_template(template, &data.template_vars(), escape)
        }
        _ => data.default_webhook_payload().to_string(),
    }
}

#[async_trait]
impl NotificationSender for WebhookSender {
    async fn send(
        &self,
        config: &ChannelConfig,
        data: &NotificationData,
    ) -> Result<(), SenderError> {
        let (url, method, headers, content_type, body_template) = match config {
            ChannelConfig::Webhook {
                url,
                method,
                headers,
                content_type,
                body_template,
            } => (url, method, headers, content_type, body_template),
            _ => {
                return Err(SenderError::InvalidConfiguration(
                    "Expected Webhook config, but found a different type.".to_string(),
                ));
            }
        };

        let method = match method.as_deref() {
            Some(name) => Method::from_bytes(name.to_uppercase().as_bytes()).map_err(|_| {
                SenderError::InvalidConfiguration(format!("Unsupported HTTP method: {name}"))
            })?,
            None => Method::POST,
        };

        let content_type = content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE);
        let body = render_body(body_template.as_deref(), content_type, data);

        let mut request = self
            .client
            .request(method.clone(), url)
            .header(header::CONTENT_TYPE, content_type);

        // Custom headers are merged over the defaults and win on conflict.
        if let Some(custom) = headers {
            for (name, value) in custom {
                let header_name = header::HeaderName::from_bytes(name.as_bytes()).map_err(
                    |e| SenderError::InvalidConfiguration(format!("Invalid header name: {e}")),
                )?;
                let header_value = header::HeaderValue::from_str(value).map_err(|e| {
                    SenderError::InvalidConfiguration(format!("Invalid header value: {e}"))
                })?;
                request = request.header(header_name, header_value);
            }
        }

        if method != Method::GET && method != Method::HEAD {
            request = request.body(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(SenderError::SendFailed(format!(
                "Webhook returned non-success status: {status}. Body: {error_body}"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::types::CheckStatus;
    use chrono::Utc;

    fn data() -> NotificationData {
        NotificationData {
            monitor_name: "api".into(),
            monitor_type: "http".into(),
            status: CheckStatus::Down,
            time: Utc::now(),
            message: "连接被拒绝 (CONNECTION_REFUSED)\n第二行".into(),
            address: Some("https://api.example.com".into()),
            failure_info: None,
        }
    }

    #[test]
    fn default_body_is_the_contract_payload() {
        let body = render_body(None, DEFAULT_CONTENT_TYPE, &data());
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["event"], "status_change");
        assert_eq!(parsed["monitor"]["name"], "api");
    }

    #[test]
    fn json_templates_escape_substituted_values() {
        let template = r#"{"alert": "{message}"}"#;
        let body = render_body(Some(template), DEFAULT_CONTENT_TYPE, &data());
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(parsed["alert"].as_str().unwrap().contains("第二行"));
    }

    #[test]
    fn plain_content_type_skips_escaping() {
        let template = "monitor={monitorName} message={message}";
        let body = render_body(Some(template), "text/plain", &data());
        assert!(body.contains("monitor=api"));
        assert!(body.contains('\n'));
    }
}
