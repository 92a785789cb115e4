//! Notification channel configurations and the payload handed to the
//! channel dispatchers.

use std::collections::HashMap;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::monitoring::types::CheckStatus;

pub const CHANNEL_TYPE_EMAIL: &str = "邮件";
pub const CHANNEL_TYPE_WEBHOOK: &str = "Webhook";
pub const CHANNEL_TYPE_WECHAT: &str = "微信推送";
pub const CHANNEL_TYPE_DINGTALK: &str = "钉钉推送";
pub const CHANNEL_TYPE_WECOM: &str = "企业微信推送";

/// Tagged channel configuration as stored in the channel's JSON column.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChannelConfig {
    #[serde(rename = "邮件", rename_all = "camelCase")]
    Email {
        /// Recipient address.
        email: String,
        smtp_server: String,
        smtp_port: u16,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        password: Option<String>,
    },
    #[serde(rename = "Webhook", rename_all = "camelCase")]
    Webhook {
        url: String,
        #[serde(default)]
        method: Option<String>,
        #[serde(default)]
        headers: Option<HashMap<String, String>>,
        #[serde(default)]
        content_type: Option<String>,
        /// Template with `{field}` placeholders; the default JSON payload
        /// is sent when absent.
        #[serde(default)]
        body_template: Option<String>,
    },
    #[serde(rename = "微信推送", rename_all = "camelCase")]
    WechatPush {
        push_url: String,
        #[serde(default)]
        title_template: Option<String>,
        #[serde(default)]
        content_template: Option<String>,
    },
    #[serde(rename = "钉钉推送", rename_all = "camelCase")]
    DingTalk {
        webhook_url: String,
        #[serde(default)]
        secret: Option<String>,
    },
    #[serde(rename = "企业微信推送", rename_all = "camelCase")]
    WeCom { webhook_url: String },
}

impl ChannelConfig {
    pub fn type_name(&self) -> &'static str {
        match self {
            ChannelConfig::Email { .. } => CHANNEL_TYPE_EMAIL,
            ChannelConfig::Webhook { .. } => CHANNEL_TYPE_WEBHOOK,
            ChannelConfig::WechatPush { .. } => CHANNEL_TYPE_WECHAT,
            ChannelConfig::DingTalk { .. } => CHANNEL_TYPE_DINGTALK,
            ChannelConfig::WeCom { .. } => CHANNEL_TYPE_WECOM,
        }
    }
}

/// Aggregated failure context attached to DOWN notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureInfo {
    pub count: u64,
    pub first_failure_time: DateTime<Utc>,
    pub last_failure_time: DateTime<Utc>,
    /// Whole minutes, floor division; sub-minute outages report 0.
    pub duration_minutes: i64,
}

/// Everything a dispatcher needs to render one notification.
#[derive(Debug, Clone)]
pub struct NotificationData {
    pub monitor_name: String,
    pub monitor_type: String,
    pub status: CheckStatus,
    pub time: DateTime<Utc>,
    /// Fully composed message, including the prepended address and
    /// aggregation/recovery lines.
    pub message: String,
    pub address: Option<String>,
    pub failure_info: Option<FailureInfo>,
}

pub fn format_local(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

impl NotificationData {
    pub fn status_text(&self) -> &'static str {
        self.status.display_zh()
    }

    /// Variables available to `{field}` templates.
    pub fn template_vars(&self) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        vars.insert("monitorName".to_string(), self.monitor_name.clone());
        vars.insert("monitorType".to_string(), self.monitor_type.clone());
        vars.insert("status".to_string(), self.status.to_string());
        vars.insert("statusText".to_string(), self.status_text().to_string());
        vars.insert(
            "statusCode".to_string(),
            self.status.as_i16().to_string(),
        );
        vars.insert("time".to_string(), format_local(self.time));
        vars.insert("message".to_string(), self.message.clone());
        if let Some(failure) = &self.failure_info {
            vars.insert("failureCount".to_string(), failure.count.to_string());
            vars.insert(
                "firstFailureTime".to_string(),
                format_local(failure.first_failure_time),
            );
            vars.insert(
                "lastFailureTime".to_string(),
                format_local(failure.last_failure_time),
            );
            vars.insert(
                "failureDuration".to_string(),
                failure.duration_minutes.to_string(),
            );
        }
        vars
    }

    /// The default webhook body.
    pub fn default_webhook_payload(&self) -> serde_json::Value {
        json!({
            "event": "status_change",
            "timestamp": self.time.to_rfc3339(),
            "monitor": {
                "name": self.monitor_name,
                "type": self.monitor_type,
                "status": self.status_text(),
                "status_code": self.status.as_i16(),
                "time": format_local(self.time),
                "message": self.message,
                "address": self.address,
            },
            "failure_info": self.failure_info.as_ref().map(|f| json!({
                "count": f.count,
                "first_failure_time": format_local(f.first_failure_time),
                "last_failure_time": format_local(f.last_failure_time),
                "duration_minutes": f.duration_minutes,
            })),
        })
    }
}

/// Substitute `{field}` placeholders. With `escape_json` the value is
/// escaped (`\\ \" \n \r \t`) so the result still parses as JSON.
pub fn render_template(
    template: &str,
    vars: &HashMap<String, String>,
    escape_json: bool,
) -> String {
    let mut rendered = template.to_string();
    for (name, value) in vars {
        let needle = format!("{{{name}}}");
        if !rendered.contains(&needle) {
            continue;
        }
        let replacement = if escape_json {
            escape_json_string(value)
        } else {
            value.clone()
        };
        rendered = rendered.replace(&needle, &replacement);
    }
    rendered
}

fn escape_json_string(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> NotificationData {
        NotificationData {
            monitor_name: "api".into(),
            monitor_type: "http".into(),
            status: CheckStatus::Down,
            time: Utc::now(),
            message: "状态码 500 不在允许范围内\n详情见日志".into(),
            address: Some("https://api.example.com".into()),
            failure_info: Some(FailureInfo {
                count: 3,
                first_failure_time: Utc::now(),
                last_failure_time: Utc::now(),
                duration_minutes: 10,
            }),
        }
    }

    #[test]
    fn channel_config_round_trips_with_chinese_tags() {
        let value = json!({
            "type": "钉钉推送",
            "webhookUrl": "https://oapi.dingtalk.com/robot/send?access_token=x",
            "secret": "s"
        });
        let config: ChannelConfig = serde_json::from_value(value).unwrap();
        assert_eq!(config.type_name(), CHANNEL_TYPE_DINGTALK);

        let email = json!({
            "type": "邮件",
            "email": "ops@example.com",
            "smtpServer": "smtp.example.com",
            "smtpPort": 465
        });
        let config: ChannelConfig = serde_json::from_value(email).unwrap();
        assert_eq!(config.type_name(), CHANNEL_TYPE_EMAIL);
    }

    #[test]
    fn template_vars_include_failure_fields_on_aggregated_down() {
        let vars = sample().template_vars();
        assert_eq!(vars.get("monitorName").unwrap(), "api");
        assert_eq!(vars.get("statusCode").unwrap(), "0");
        assert_eq!(vars.get("statusText").unwrap(), "故障");
        assert_eq!(vars.get("failureCount").unwrap(), "3");
        assert_eq!(vars.get("failureDuration").unwrap(), "10");
    }

    #[test]
    fn substituted_json_template_still_parses() {
        let template = r#"{"text": "{message}", "monitor": "{monitorName}"}"#;
        let rendered = render_template(template, &sample().template_vars(), true);
        let parsed: serde_json::Value =
            serde_json::from_str(&rendered).expect("rendered body must parse");
        assert_eq!(
            parsed["text"].as_str().unwrap(),
            "状态码 500 不在允许范围内\n详情见日志"
        );
    }

    #[test]
    fn plain_rendering_keeps_raw_characters() {
        let mut vars = HashMap::new();
        vars.insert("message".to_string(), "line1\nline2 \"quoted\"".to_string());
        let rendered = render_template("msg: {message}", &vars, false);
        assert_eq!(rendered, "msg: line1\nline2 \"quoted\"");
    }

    #[test]
    fn unknown_placeholders_are_left_alone() {
        let vars = sample().template_vars();
        let rendered = render_template("{nonexistent} {monitorName}", &vars, false);
        assert_eq!(rendered, "{nonexistent} api");
    }

    #[test]
    fn default_payload_shape_matches_contract() {
        let payload = sample().default_webhook_payload();
        assert_eq!(payload["event"], "status_change");
        assert_eq!(payload["monitor"]["status_code"], 0);
        assert_eq!(payload["monitor"]["status"], "故障");
        assert_eq!(payload["failure_info"]["count"], 3);

        let mut up = sample();
        up.status = CheckStatus::Up;
        up.failure_info = None;
        up.address = None;
        let payload = up.default_webhook_payload();
        assert!(payload["failure_info"].is_null());
        assert!(payload["monitor"]["address"].is_null());
    }
}
