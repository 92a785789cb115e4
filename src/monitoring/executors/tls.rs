//! TLS certificate probe and the shared leaf-certificate inspection used
//! by the HTTP executor's `notifyCertExpiry` option.

use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_native_tls::native_tls;
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

use super::DEFAULT_TIMEOUT;
use crate::monitoring::probe_config::HttpsCertConfig;
use crate::monitoring::types::CheckResult;

/// Split an `https://` URL into host and port (default 443).
pub fn parse_https_host(url: &str) -> Result<(String, u16), String> {
    let rest = url
        .strip_prefix("https://")
        .ok_or_else(|| format!("url {url} 必须以 https:// 开头"))?;
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let authority = authority
        .rsplit_once('@')
        .map(|(_, host)| host)
        .unwrap_or(authority);
    if authority.is_empty() {
        return Err(format!("url {url} 缺少主机名"));
    }
    match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port: u16 = port
                .parse()
                .map_err(|_| format!("端口号 {port} 不是有效的端口值"))?;
            Ok((host.to_string(), port))
        }
        None => Ok((authority.to_string(), 443)),
    }
}

struct LeafCertificate {
    der: Vec<u8>,
    handshake_ms: i32,
}

async fn fetch_leaf_certificate(
    host: &str,
    port: u16,
    ignore_tls: bool,
    io_timeout: Duration,
) -> Result<LeafCertificate, String> {
    let start = Instant::now();

    let tcp = timeout(io_timeout, TcpStream::connect((host, port)))
        .await
        .map_err(|_| "连接超时 (TIMEOUT)".to_string())?
        .map_err(|e| format!("连接失败 (NETWORK_ERROR): {e}"))?;

    let mut builder = native_tls::TlsConnector::builder();
    if ignore_tls {
        builder.danger_accept_invalid_certs(true);
        builder.danger_accept_invalid_hostnames(true);
    }
    let connector = builder
        .build()
        .map_err(|e| format!("TLS 初始化失败 (TLS_ERROR): {e}"))?;
    let connector = tokio_native_tls::TlsConnector::from(connector);

    let stream = timeout(io_timeout, connector.connect(host, tcp))
        .await
        .map_err(|_| "TLS 握手超时 (TIMEOUT)".to_string())?
        .map_err(|e| format!("证书验证失败 (TLS_ERROR): {e}"))?;

    let cert = stream
        .get_ref()
        .peer_certificate()
        .map_err(|e| format!("无法读取对端证书 (TLS_ERROR): {e}"))?
        .ok_or_else(|| "对端未提供证书 (TLS_ERROR)".to_string())?;
    let der = cert
        .to_der()
        .map_err(|e| format!("证书编码无效 (TLS_ERROR): {e}"))?;

    Ok(LeafCertificate {
        der,
        handshake_ms: start.elapsed().as_millis() as i32,
    })
}

/// (not_before, not_after) as unix timestamps.
fn certificate_validity(der: &[u8]) -> Result<(i64, i64), String> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| format!("证书解析失败 (TLS_ERROR): {e}"))?;
    let validity = cert.validity();
    Ok((
        validity.not_before.timestamp(),
        validity.not_after.timestamp(),
    ))
}

/// Days until the leaf certificate of `url` expires; negative when it
/// already has.
pub async fn cert_days_remaining(
    url: &str,
    ignore_tls: bool,
    io_timeout: Duration,
) -> Result<i64, String> {
    let (host, port) = parse_https_host(url)?;
    let leaf = fetch_leaf_certificate(&host, port, ignore_tls, io_timeout).await?;
    let (_, not_after) = certificate_validity(&leaf.der)?;
    Ok((not_after - Utc::now().timestamp()).div_euclid(86_400))
}

pub async fn https_cert_probe(config: &HttpsCertConfig) -> CheckResult {
    let (host, port) = match parse_https_host(&config.url) {
        Ok(parsed) => parsed,
        Err(e) => return CheckResult::down(format!("配置无效: {e}")),
    };

    let io_timeout = config
        .connect_timeout
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TIMEOUT);

    // The handshake itself validates the chain unless ignore_tls is set.
    let leaf = match fetch_leaf_certificate(
        &host,
        port,
        config.ignore_tls.unwrap_or(false),
        io_timeout,
    )
    .await
    {
        Ok(leaf) => leaf,
        Err(message) => return CheckResult::down(message),
    };

    let (not_before, not_after) = match certificate_validity(&leaf.der) {
        Ok(validity) => validity,
        Err(message) => return CheckResult::down(message),
    };

    let now = Utc::now().timestamp();
    if now < not_before {
        return CheckResult::down_with_ping("证书尚未生效", Some(leaf.handshake_ms));
    }
    if now > not_after {
        return CheckResult::down_with_ping("证书已过期", Some(leaf.handshake_ms));
    }

    let days_left = (not_after - now).div_euclid(86_400);
    CheckResult::up(
        format!("证书有效，距离到期还有 {days_left} 天"),
        Some(leaf.handshake_ms),
    )
}
