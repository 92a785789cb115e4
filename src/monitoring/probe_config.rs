//! Typed probe configurations.
//!
//! Monitors store a free-form JSON `config` column; before a probe runs it
//! is parsed into the variant matching the monitor type. Validation
//! failures are surfaced as `配置无效` results and never retried.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorType {
    #[serde(rename = "http")]
    Http,
    #[serde(rename = "https-cert")]
    HttpsCert,
    #[serde(rename = "keyword")]
    Keyword,
    #[serde(rename = "port")]
    Port,
    #[serde(rename = "mysql")]
    Mysql,
    #[serde(rename = "redis")]
    Redis,
    #[serde(rename = "icmp")]
    Icmp,
    #[serde(rename = "push")]
    Push,
}

impl MonitorType {
    pub fn as_str(self) -> &'static str {
        match self {
            MonitorType::Http => "http",
            MonitorType::HttpsCert => "https-cert",
            MonitorType::Keyword => "keyword",
            MonitorType::Port => "port",
            MonitorType::Mysql => "mysql",
            MonitorType::Redis => "redis",
            MonitorType::Icmp => "icmp",
            MonitorType::Push => "push",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "http" => Some(MonitorType::Http),
            "https-cert" => Some(MonitorType::HttpsCert),
            "keyword" => Some(MonitorType::Keyword),
            "port" => Some(MonitorType::Port),
            "mysql" => Some(MonitorType::Mysql),
            "redis" => Some(MonitorType::Redis),
            "icmp" => Some(MonitorType::Icmp),
            "push" => Some(MonitorType::Push),
            _ => None,
        }
    }
}

impl std::fmt::Display for MonitorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rendered to the operator as `配置无效: <detail>`.
#[derive(Debug, Error)]
#[error("配置无效: {0}")]
pub struct ConfigError(pub String);

pub const ALLOWED_HTTP_METHODS: [&str; 7] =
    ["GET", "POST", "PUT", "DELETE", "HEAD", "OPTIONS", "PATCH"];

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpConfig {
    pub url: String,
    pub http_method: Option<String>,
    pub status_codes: Option<String>,
    pub request_body: Option<String>,
    pub request_headers: Option<HashMap<String, String>>,
    pub ignore_tls: Option<bool>,
    pub max_redirects: Option<u32>,
    /// Seconds, 1–300.
    pub connect_timeout: Option<u64>,
    pub notify_cert_expiry: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordConfig {
    #[serde(flatten)]
    pub http: HttpConfig,
    pub keyword: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpsCertConfig {
    pub url: String,
    pub ignore_tls: Option<bool>,
    pub max_redirects: Option<u32>,
    pub connect_timeout: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortConfig {
    pub hostname: String,
    pub port: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    pub hostname: String,
    pub port: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IcmpConfig {
    pub hostname: String,
    #[serde(default)]
    pub packet_count: Option<u32>,
    /// Acceptable packet loss in percent.
    #[serde(default)]
    pub max_packet_loss: Option<f64>,
    /// Acceptable mean round-trip time in milliseconds.
    #[serde(default)]
    pub max_response_time: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushConfig {
    pub token: String,
    /// Expected heartbeat spacing in seconds.
    pub push_interval: i64,
}

#[derive(Debug, Clone)]
pub enum ProbeConfig {
    Http(HttpConfig),
    HttpsCert(HttpsCertConfig),
    Keyword(KeywordConfig),
    Port(PortConfig),
    Mysql(DatabaseConfig),
    Redis(DatabaseConfig),
    Icmp(IcmpConfig),
    Push(PushConfig),
}

impl ProbeConfig {
    pub fn parse(
        monitor_type: MonitorType,
        config: &serde_json::Value,
    ) -> Result<Self, ConfigError> {
        let parsed = match monitor_type {
            MonitorType::Http => ProbeConfig::Http(decode(config)?),
            MonitorType::HttpsCert => ProbeConfig::HttpsCert(decode(config)?),
            MonitorType::Keyword => ProbeConfig::Keyword(decode(config)?),
            MonitorType::Port => ProbeConfig::Port(decode(config)?),
            MonitorType::Mysql => ProbeConfig::Mysql(decode(config)?),
            MonitorType::Redis => ProbeConfig::Redis(decode(config)?),
            MonitorType::Icmp => ProbeConfig::Icmp(decode(config)?),
            MonitorType::Push => ProbeConfig::Push(decode(config)?),
        };
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            ProbeConfig::Http(http) => validate_http(http),
            ProbeConfig::Keyword(keyword) => {
                validate_http(&keyword.http)?;
                if keyword.keyword.trim().is_empty() {
                    return Err(ConfigError("缺少关键词".into()));
                }
                Ok(())
            }
            ProbeConfig::HttpsCert(cert) => {
                if cert.url.trim().is_empty() {
                    return Err(ConfigError("缺少 url".into()));
                }
                if !cert.url.starts_with("https://") {
                    return Err(ConfigError(format!("url {} 必须以 https:// 开头", cert.url)));
                }
                validate_connect_timeout(cert.connect_timeout)
            }
            ProbeConfig::Port(port) => {
                validate_hostname(&port.hostname)?;
                validate_port(port.port)
            }
            ProbeConfig::Mysql(db) | ProbeConfig::Redis(db) => {
                validate_hostname(&db.hostname)?;
                validate_port(db.port)
            }
            ProbeConfig::Icmp(icmp) => {
                validate_hostname(&icmp.hostname)?;
                if icmp.packet_count == Some(0) {
                    return Err(ConfigError("packetCount 必须大于 0".into()));
                }
                Ok(())
            }
            ProbeConfig::Push(push) => {
                if push.token.trim().is_empty() {
                    return Err(ConfigError("缺少 token".into()));
                }
                if push.push_interval < 1 {
                    return Err(ConfigError(format!(
                        "pushInterval {} 必须不小于 1 秒",
                        push.push_interval
                    )));
                }
                Ok(())
            }
        }
    }

    /// Human-facing target address, prepended to notification messages.
    pub fn address(&self) -> Option<String> {
        match self {
            ProbeConfig::Http(http) => Some(http.url.clone()),
            ProbeConfig::Keyword(keyword) => Some(keyword.http.url.clone()),
            ProbeConfig::HttpsCert(cert) => Some(cert.url.clone()),
            ProbeConfig::Port(port) => Some(format!("{}:{}", port.hostname, port.port)),
            ProbeConfig::Mysql(db) | ProbeConfig::Redis(db) => {
                Some(format!("{}:{}", db.hostname, db.port))
            }
            ProbeConfig::Icmp(icmp) => Some(icmp.hostname.clone()),
            ProbeConfig::Push(_) => None,
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(config: &serde_json::Value) -> Result<T, ConfigError> {
    serde_json::from_value(config.clone()).map_err(|e| ConfigError(e.to_string()))
}

fn validate_hostname(hostname: &str) -> Result<(), ConfigError> {
    if hostname.trim().is_empty() {
        return Err(ConfigError("缺少 hostname".into()));
    }
    Ok(())
}

fn validate_port(port: i64) -> Result<(), ConfigError> {
    if !(1..=65535).contains(&port) {
        return Err(ConfigError(format!("端口号 {port} 不是有效的端口值")));
    }
    Ok(())
}

fn validate_connect_timeout(timeout: Option<u64>) -> Result<(), ConfigError> {
    if let Some(seconds) = timeout {
        if !(1..=300).contains(&seconds) {
            return Err(ConfigError(format!(
                "connectTimeout {seconds} 超出 1-300 秒范围"
            )));
        }
    }
    Ok(())
}

fn validate_http(http: &HttpConfig) -> Result<(), ConfigError> {
    if http.url.trim().is_empty() {
        return Err(ConfigError("缺少 url".into()));
    }
    if let Some(method) = &http.http_method {
        let upper = method.to_uppercase();
        if !ALLOWED_HTTP_METHODS.contains(&upper.as_str()) {
            return Err(ConfigError(format!("不支持的请求方法 {method}")));
        }
    }
    StatusCodeRange::parse(http.status_codes.as_deref())?;
    validate_connect_timeout(http.connect_timeout)
}

/// Accepted HTTP status codes: a single code (`"200"`) or an inclusive
/// range (`"200-299"`). Empty or absent falls back to 2xx.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCodeRange {
    pub low: u16,
    pub high: u16,
}

impl StatusCodeRange {
    pub fn parse(spec: Option<&str>) -> Result<Self, ConfigError> {
        let spec = match spec {
            Some(s) if !s.trim().is_empty() => s.trim(),
            _ => return Ok(Self { low: 200, high: 299 }),
        };

        let parse_code = |text: &str| -> Result<u16, ConfigError> {
            text.trim()
                .parse::<u16>()
                .ok()
                .filter(|code| (100..=599).contains(code))
                .ok_or_else(|| ConfigError(format!("状态码 {spec} 无效")))
        };

        if let Some((low, high)) = spec.split_once('-') {
            let low = parse_code(low)?;
            let high = parse_code(high)?;
            if low > high {
                return Err(ConfigError(format!("状态码 {spec} 无效")));
            }
            Ok(Self { low, high })
        } else {
            let code = parse_code(spec)?;
            Ok(Self { low: code, high: code })
        }
    }

    pub fn contains(&self, code: u16) -> bool {
        (self.low..=self.high).contains(&code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_http_config_with_camel_case_keys() {
        let config = json!({
            "url": "https://example.com/health",
            "httpMethod": "POST",
            "statusCodes": "200-204",
            "requestHeaders": {"X-Token": "abc"},
            "ignoreTls": true,
            "maxRedirects": 0,
            "connectTimeout": 15
        });
        let parsed = ProbeConfig::parse(MonitorType::Http, &config).expect("valid config");
        match parsed {
            ProbeConfig::Http(http) => {
                assert_eq!(http.http_method.as_deref(), Some("POST"));
                assert_eq!(http.max_redirects, Some(0));
                assert_eq!(http.ignore_tls, Some(true));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn port_zero_is_rejected_with_taxonomy_message() {
        let config = json!({"hostname": "db.internal", "port": 0});
        let err = ProbeConfig::parse(MonitorType::Port, &config).unwrap_err();
        assert_eq!(err.to_string(), "配置无效: 端口号 0 不是有效的端口值");

        let config = json!({"hostname": "db.internal", "port": 70000});
        let err = ProbeConfig::parse(MonitorType::Port, &config).unwrap_err();
        assert_eq!(err.to_string(), "配置无效: 端口号 70000 不是有效的端口值");
    }

    #[test]
    fn https_cert_requires_https_scheme() {
        let config = json!({"url": "http://example.com"});
        let err = ProbeConfig::parse(MonitorType::HttpsCert, &config).unwrap_err();
        assert!(err.to_string().starts_with("配置无效"));
    }

    #[test]
    fn keyword_flattens_http_options() {
        let config = json!({"url": "http://example.com", "keyword": "ok,pass"});
        let parsed = ProbeConfig::parse(MonitorType::Keyword, &config).expect("valid");
        match parsed {
            ProbeConfig::Keyword(kw) => {
                assert_eq!(kw.http.url, "http://example.com");
                assert_eq!(kw.keyword, "ok,pass");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn empty_status_codes_default_to_2xx() {
        let range = StatusCodeRange::parse(None).unwrap();
        assert!(range.contains(200));
        assert!(range.contains(299));
        assert!(!range.contains(301));

        let range = StatusCodeRange::parse(Some("")).unwrap();
        assert_eq!(range, StatusCodeRange { low: 200, high: 299 });
    }

    #[test]
    fn status_code_single_and_range_forms() {
        let single = StatusCodeRange::parse(Some("200")).unwrap();
        assert!(single.contains(200));
        assert!(!single.contains(201));

        let range = StatusCodeRange::parse(Some("200-299")).unwrap();
        assert!(range.contains(204));
        assert!(!range.contains(300));

        assert!(StatusCodeRange::parse(Some("banana")).is_err());
        assert!(StatusCodeRange::parse(Some("299-200")).is_err());
    }

    #[test]
    fn address_derivation_per_type() {
        let http = ProbeConfig::parse(MonitorType::Http, &json!({"url": "http://a"})).unwrap();
        assert_eq!(http.address().as_deref(), Some("http://a"));

        let port =
            ProbeConfig::parse(MonitorType::Port, &json!({"hostname": "h", "port": 6379})).unwrap();
        assert_eq!(port.address().as_deref(), Some("h:6379"));

        let push = ProbeConfig::parse(
            MonitorType::Push,
            &json!({"token": "t0k", "pushInterval": 60}),
        )
        .unwrap();
        assert_eq!(push.address(), None);
    }

    #[test]
    fn monitor_type_string_round_trip() {
        for ty in [
            MonitorType::Http,
            MonitorType::HttpsCert,
            MonitorType::Keyword,
            MonitorType::Port,
            MonitorType::Mysql,
            MonitorType::Redis,
            MonitorType::Icmp,
            MonitorType::Push,
        ] {
            assert_eq!(MonitorType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(MonitorType::parse("gopher"), None);
    }
}
