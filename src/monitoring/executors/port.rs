//! TCP port probe.

use std::io::ErrorKind;
use std::time::Instant;

use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;

use super::DEFAULT_TIMEOUT;
use crate::monitoring::probe_config::PortConfig;
use crate::monitoring::types::CheckResult;

pub async fn port_probe(config: &PortConfig) -> CheckResult {
    let start = Instant::now();
    let target = format!("{}:{}", config.hostname, config.port);
    let elapsed = |start: &Instant| Some(start.elapsed().as_millis() as i32);

    let resolved = match timeout(DEFAULT_TIMEOUT, lookup_host(target.as_str())).await {
        Err(_) => {
            return CheckResult::down_with_ping("连接超时 (TIMEOUT)", elapsed(&start));
        }
        Ok(Err(_)) => None,
        Ok(Ok(mut addrs)) => addrs.next(),
    };
    let addr = match resolved {
        Some(addr) => addr,
        None => {
            return CheckResult::down_with_ping(
                format!("无法解析主机名 {} (HOST_NOT_FOUND)", config.hostname),
                elapsed(&start),
            );
        }
    };

    match timeout(DEFAULT_TIMEOUT, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => CheckResult::up("TCP 连接成功", elapsed(&start)),
        Ok(Err(e)) => {
            let message = match e.kind() {
                ErrorKind::ConnectionRefused => "连接被拒绝 (CONNECTION_REFUSED)".to_string(),
                ErrorKind::TimedOut => "连接超时 (TIMEOUT)".to_string(),
                _ => format!("网络错误 (NETWORK_ERROR): {e}"),
            };
            CheckResult::down_with_ping(message, elapsed(&start))
        }
        Err(_) => CheckResult::down_with_ping("连接超时 (TIMEOUT)", elapsed(&start)),
    }
}
