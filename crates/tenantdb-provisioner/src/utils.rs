//! 供给流程使用的工具函数

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use tenantdb_common::{Error, Result};

/// 格式化持续时间为人类可读的字符串
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();

    if seconds < 60 {
        return format!("{} 秒", seconds);
    }

    let minutes = seconds / 60;
    if minutes < 60 {
        return format!("{} 分钟 {} 秒", minutes, seconds % 60);
    }

    let hours = minutes / 60;
    format!("{} 小时 {} 分钟", hours, minutes % 60)
}

/// 有界重试
///
/// 最多执行 `attempts` 次，两次之间等待 `delay`。校验类错误不会被重试。
/// 等待期间取消时返回 [`Error::Cancelled`]。
pub async fn retry_async<F, Fut, T>(
    phase: &str,
    attempts: usize,
    delay: Duration,
    cancel: &CancellationToken,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match f().await {
            Ok(value) => return Ok(value),
            Err(e @ Error::Validation(_)) => return Err(e),
            Err(e) if attempt >= attempts => return Err(e),
            Err(e) => {
                warn!("{} 第 {} 次尝试失败: {}", phase, attempt, e);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return Err(Error::Cancelled {
                            phase: phase.to_string(),
                            last_observed: e.to_string(),
                        });
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
