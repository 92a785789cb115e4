//! Scheduler-level retry policy.
//!
//! Executors never loop internally; this wrapper is the single place the
//! retry count is honored, so the policy can never apply twice.

use std::future::Future;
use std::time::Duration;

use crate::monitoring::types::{CheckResult, CheckStatus};

/// Run `attempt` once; on DOWN, re-run it up to `retries` more times with
/// `retry_interval_seconds` between attempts.
///
/// The first success is reported as `重试成功 (k/N)`; exhausting all
/// retries returns the first DOWN result with its message rewritten to
/// `重试N次后仍然失败`. Config-invalid results are returned immediately.
pub async fn run_with_retries<F, Fut>(
    retries: i32,
    retry_interval_seconds: i32,
    mut attempt: F,
) -> CheckResult
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CheckResult>,
{
    let first = attempt().await;
    if first.status != CheckStatus::Down || retries <= 0 || first.is_config_error() {
        return first;
    }

    let pause = Duration::from_secs(retry_interval_seconds.max(1) as u64);
    for attempt_number in 1..=retries {
        tokio::time::sleep(pause).await;
        let outcome = attempt().await;
        match outcome.status {
            CheckStatus::Up => {
                return CheckResult {
                    message: format!(
                        "重试成功 ({attempt_number}/{retries}): {}",
                        outcome.message
                    ),
                    ..outcome
                };
            }
            CheckStatus::Pending => return outcome,
            CheckStatus::Down => {}
        }
    }

    CheckResult {
        message: format!("重试{retries}次后仍然失败: {}", first.message),
        ..first
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn scripted(results: Vec<CheckResult>) -> (impl FnMut() -> futures::future::Ready<CheckResult>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let attempt = move || {
            let index = counter.fetch_add(1, Ordering::SeqCst);
            let result = results
                .get(index)
                .cloned()
                .unwrap_or_else(|| CheckResult::down("unscripted attempt"));
            futures::future::ready(result)
        };
        (attempt, calls)
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retries_means_single_attempt() {
        let (attempt, calls) = scripted(vec![CheckResult::down("boom")]);
        let result = run_with_retries(0, 1, attempt).await;
        assert_eq!(result.status, CheckStatus::Down);
        assert_eq!(result.message, "boom");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_first_retry_is_annotated() {
        let (attempt, calls) = scripted(vec![
            CheckResult::down("500"),
            CheckResult::up("HTTP 200", Some(20)),
        ]);
        let result = run_with_retries(2, 1, attempt).await;
        assert_eq!(result.status, CheckStatus::Up);
        assert_eq!(result.message, "重试成功 (1/2): HTTP 200");
        assert_eq!(result.ping, Some(20));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_keep_the_first_failure() {
        let (attempt, calls) = scripted(vec![
            CheckResult::down("first failure"),
            CheckResult::down("second failure"),
            CheckResult::down("third failure"),
        ]);
        let result = run_with_retries(2, 1, attempt).await;
        assert_eq!(result.status, CheckStatus::Down);
        assert_eq!(result.message, "重试2次后仍然失败: first failure");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn up_results_are_never_retried() {
        let (attempt, calls) = scripted(vec![CheckResult::up("HTTP 200", None)]);
        let result = run_with_retries(3, 1, attempt).await;
        assert_eq!(result.status, CheckStatus::Up);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn config_errors_short_circuit() {
        let (attempt, calls) = scripted(vec![CheckResult::down("配置无效: 缺少 url")]);
        let result = run_with_retries(5, 1, attempt).await;
        assert_eq!(result.message, "配置无效: 缺少 url");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
