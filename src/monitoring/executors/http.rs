//! HTTP and keyword probes.

use std::time::{Duration, Instant};

use reqwest::{redirect, Client, Method};

use super::{tls, DEFAULT_TIMEOUT};
use crate::monitoring::probe_config::{HttpConfig, KeywordConfig, StatusCodeRange};
use crate::monitoring::types::CheckResult;

fn build_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    let redirect_policy = match config.max_redirects {
        Some(0) => redirect::Policy::none(),
        Some(n) => redirect::Policy::limited(n as usize),
        None => redirect::Policy::limited(10),
    };

    let timeout = config
        .connect_timeout
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TIMEOUT);

    let mut builder = Client::builder().timeout(timeout).redirect(redirect_policy);
    if config.ignore_tls.unwrap_or(false) {
        builder = builder.danger_accept_invalid_certs(true);
    }
    builder.build()
}

fn request_method(config: &HttpConfig) -> Method {
    config
        .http_method
        .as_deref()
        .and_then(|m| Method::from_bytes(m.to_uppercase().as_bytes()).ok())
        .unwrap_or(Method::GET)
}

struct HttpResponse {
    code: u16,
    body: String,
    elapsed_ms: i32,
}

async fn perform_request(config: &HttpConfig) -> Result<HttpResponse, CheckResult> {
    let client = match build_client(config) {
        Ok(client) => client,
        Err(e) => {
            return Err(CheckResult::down(format!(
                "网络错误 (NETWORK_ERROR): 无法创建 HTTP 客户端: {e}"
            )))
        }
    };

    let mut request = client.request(request_method(config), &config.url);
    if let Some(headers) = &config.request_headers {
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
    }
    if let Some(body) = &config.request_body {
        request = request.body(body.clone());
    }

    let start = Instant::now();
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) if e.is_timeout() => {
            return Err(CheckResult::down("请求超时 (TIMEOUT)"));
        }
        Err(e) if e.is_connect() => {
            return Err(CheckResult::down(format!("连接失败 (NETWORK_ERROR): {e}")));
        }
        Err(e) => {
            return Err(CheckResult::down(format!("网络错误 (NETWORK_ERROR): {e}")));
        }
    };

    let code = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let elapsed_ms = start.elapsed().as_millis() as i32;
    Ok(HttpResponse {
        code,
        body,
        elapsed_ms,
    })
}

pub async fn http_probe(config: &HttpConfig, cert_expiry_threshold_days: i64) -> CheckResult {
    let accepted = match StatusCodeRange::parse(config.status_codes.as_deref()) {
        Ok(range) => range,
        Err(e) => return CheckResult::down(e.to_string()),
    };

    let response = match perform_request(config).await {
        Ok(response) => response,
        Err(down) => return down,
    };

    if !accepted.contains(response.code) {
        return CheckResult::down_with_ping(
            format!("状态码 {} 不在允许范围内", response.code),
            Some(response.elapsed_ms),
        );
    }

    if config.notify_cert_expiry.unwrap_or(false) && config.url.starts_with("https://") {
        match tls::cert_days_remaining(
            &config.url,
            config.ignore_tls.unwrap_or(false),
            config
                .connect_timeout
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TIMEOUT),
        )
        .await
        {
            Ok(days) if days < 0 => {
                return CheckResult::down_with_ping("证书已过期", Some(response.elapsed_ms));
            }
            Ok(days) if days < cert_expiry_threshold_days => {
                return CheckResult::down_with_ping(
                    format!("证书将在 {days} 天后过期"),
                    Some(response.elapsed_ms),
                );
            }
            Ok(_) => {}
            Err(e) => {
                return CheckResult::down_with_ping(
                    format!("证书检查失败 (TLS_ERROR): {e}"),
                    Some(response.elapsed_ms),
                );
            }
        }
    }

    CheckResult::up(format!("HTTP {}", response.code), Some(response.elapsed_ms))
}

pub async fn keyword_probe(config: &KeywordConfig) -> CheckResult {
    let accepted = match StatusCodeRange::parse(config.http.status_codes.as_deref()) {
        Ok(range) => range,
        Err(e) => return CheckResult::down(e.to_string()),
    };

    let response = match perform_request(&config.http).await {
        Ok(response) => response,
        Err(down) => return down,
    };

    if !accepted.contains(response.code) {
        return CheckResult::down_with_ping(
            format!("状态码 {} 不在允许范围内", response.code),
            Some(response.elapsed_ms),
        );
    }

    match match_keyword(&response.body, &config.keyword) {
        Some(matched) => CheckResult::up(
            format!("匹配到关键词 \"{matched}\""),
            Some(response.elapsed_ms),
        ),
        None => CheckResult::down_with_ping(
            format!("未匹配到任何关键词: {}", config.keyword),
            Some(response.elapsed_ms),
        ),
    }
}

/// Case-sensitive containment over an ASCII-comma separated keyword list;
/// returns the first keyword present in the body.
pub fn match_keyword<'a>(body: &str, keywords: &'a str) -> Option<&'a str> {
    keywords
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .find(|k| body.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_matching_is_case_sensitive_and_first_wins() {
        assert_eq!(match_keyword("service OK", "ok,OK"), Some("OK"));
        assert_eq!(match_keyword("service OK", "ok"), None);
        assert_eq!(match_keyword("数据库正常", "异常,正常"), Some("正常"));
        assert_eq!(match_keyword("anything", ""), None);
        // Blank entries in the list are ignored rather than matching all.
        assert_eq!(match_keyword("body", ",,"), None);
    }

    #[test]
    fn method_defaults_to_get_and_uppercases() {
        let mut config = HttpConfig {
            url: "http://example.com".into(),
            ..Default::default()
        };
        assert_eq!(request_method(&config), Method::GET);
        config.http_method = Some("post".into());
        assert_eq!(request_method(&config), Method::POST);
    }
}
