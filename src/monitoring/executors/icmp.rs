//! ICMP echo probe built on surge-ping.

use tokio::net::lookup_host;
use tokio::time::timeout;

use super::DEFAULT_TIMEOUT;
use crate::monitoring::probe_config::IcmpConfig;
use crate::monitoring::types::CheckResult;

const DEFAULT_PACKET_COUNT: u32 = 4;
const ECHO_PAYLOAD: [u8; 8] = [0; 8];

pub async fn icmp_probe(config: &IcmpConfig) -> CheckResult {
    let target = match resolve(&config.hostname).await {
        Some(ip) => ip,
        None => {
            return CheckResult::down(format!(
                "无法解析主机名 {} (HOST_NOT_FOUND)",
                config.hostname
            ));
        }
    };

    let client = match surge_ping::Client::new(&surge_ping::Config::default()) {
        Ok(client) => client,
        Err(e) => {
            return CheckResult::down(format!(
                "网络错误 (NETWORK_ERROR): 无法创建 ICMP 套接字: {e}"
            ));
        }
    };

    let packet_count = config.packet_count.unwrap_or(DEFAULT_PACKET_COUNT).max(1);
    let mut pinger = client
        .pinger(target, surge_ping::PingIdentifier(rand::random()))
        .await;
    pinger.timeout(DEFAULT_TIMEOUT);

    let mut round_trips_ms: Vec<f64> = Vec::with_capacity(packet_count as usize);
    for sequence in 0..packet_count {
        match pinger
            .ping(surge_ping::PingSequence(sequence as u16), &ECHO_PAYLOAD)
            .await
        {
            Ok((_reply, duration)) => round_trips_ms.push(duration.as_secs_f64() * 1000.0),
            Err(_) => {}
        }
    }

    evaluate(config, packet_count, &round_trips_ms)
}

async fn resolve(hostname: &str) -> Option<std::net::IpAddr> {
    let looked_up = timeout(DEFAULT_TIMEOUT, lookup_host(format!("{hostname}:0")))
        .await
        .ok()?
        .ok()?;
    looked_up.map(|addr| addr.ip()).next()
}

/// Judge the echo results against the configured thresholds.
fn evaluate(config: &IcmpConfig, sent: u32, round_trips_ms: &[f64]) -> CheckResult {
    if round_trips_ms.is_empty() {
        return CheckResult::down("目标主机无响应 (TIMEOUT)");
    }

    let lost = sent as usize - round_trips_ms.len();
    let loss_percent = lost as f64 * 100.0 / sent as f64;
    let mean_ms = round_trips_ms.iter().sum::<f64>() / round_trips_ms.len() as f64;
    let ping = Some(mean_ms.round() as i32);

    let max_loss = config.max_packet_loss.unwrap_or(0.0);
    if loss_percent > max_loss {
        return CheckResult::down_with_ping(
            format!("丢包率 {loss_percent:.0}% 超过允许的 {max_loss:.0}%"),
            ping,
        );
    }

    if let Some(max_response_time) = config.max_response_time {
        if mean_ms > max_response_time as f64 {
            return CheckResult::down_with_ping(
                format!(
                    "平均响应时间 {:.0} ms 超过允许的 {max_response_time} ms",
                    mean_ms
                ),
                ping,
            );
        }
    }

    CheckResult::up(
        format!("发送 {sent} 个探测包，丢包率 {loss_percent:.0}%，平均响应 {mean_ms:.0} ms"),
        ping,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::types::CheckStatus;

    fn config(max_loss: Option<f64>, max_rtt: Option<u64>) -> IcmpConfig {
        IcmpConfig {
            hostname: "example.com".into(),
            packet_count: Some(4),
            max_packet_loss: max_loss,
            max_response_time: max_rtt,
        }
    }

    #[test]
    fn no_replies_is_down() {
        let result = evaluate(&config(None, None), 4, &[]);
        assert_eq!(result.status, CheckStatus::Down);
        assert!(result.message.contains("TIMEOUT"));
    }

    #[test]
    fn loss_above_threshold_is_down() {
        // One of four lost = 25% against a default allowance of 0%.
        let result = evaluate(&config(None, None), 4, &[10.0, 11.0, 12.0]);
        assert_eq!(result.status, CheckStatus::Down);
        assert!(result.message.contains("丢包率"));

        // The same loss passes with an explicit 50% allowance.
        let result = evaluate(&config(Some(50.0), None), 4, &[10.0, 11.0, 12.0]);
        assert_eq!(result.status, CheckStatus::Up);
    }

    #[test]
    fn slow_mean_rtt_is_down() {
        let result = evaluate(&config(None, Some(20)), 4, &[30.0, 40.0, 35.0, 45.0]);
        assert_eq!(result.status, CheckStatus::Down);
        assert!(result.message.contains("平均响应时间"));

        let result = evaluate(&config(None, Some(100)), 4, &[30.0, 40.0, 35.0, 45.0]);
        assert_eq!(result.status, CheckStatus::Up);
        assert_eq!(result.ping, Some(38));
    }
}
