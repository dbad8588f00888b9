//! 就绪轮询模块
//!
//! 提供一个可取消、有截止时间的通用轮询原语，用于等待 Pod 就绪和凭据 Secret 生成
//! 这类异步条件。探测函数至少执行一次；最后一次探测发生在截止时间点上，
//! 单次探测最多持续到 `deadline + interval`，因此超时返回的时间落在
//! `[deadline, deadline + interval]` 之内。

use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// 默认探测间隔
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// 轮询参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// 两次探测之间的间隔
    pub interval: Duration,
    /// 从开始到放弃的时长
    pub deadline: Duration,
}

impl PollSettings {
    /// 使用默认间隔
    pub fn with_deadline(deadline: Duration) -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            deadline,
        }
    }

    /// 修改探测间隔
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// 一次探测的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe<S> {
    /// 条件是否满足
    pub done: bool,
    /// 本次观测到的状态
    pub observed: S,
}

impl<S> Probe<S> {
    /// 条件已满足
    pub fn ready(observed: S) -> Self {
        Self { done: true, observed }
    }

    /// 条件尚未满足
    pub fn pending(observed: S) -> Self {
        Self {
            done: false,
            observed,
        }
    }
}

/// 轮询失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PollError<S: fmt::Debug + fmt::Display> {
    /// 截止时间已到
    #[error("轮询在 {elapsed:?} 后超时")]
    Timeout {
        /// 探测未能在时限内返回时为 None
        last_observed: Option<S>,
        elapsed: Duration,
    },

    /// 调用方取消
    #[error("轮询已取消")]
    Cancelled { last_observed: Option<S> },
}

impl<S: fmt::Debug + fmt::Display> PollError<S> {
    /// 最后观测状态的文本描述
    pub fn last_observed_text(&self) -> String {
        match self {
            PollError::Timeout {
                last_observed: Some(observed),
                ..
            }
            | PollError::Cancelled {
                last_observed: Some(observed),
            } => observed.to_string(),
            PollError::Timeout { .. } | PollError::Cancelled { .. } => {
                "尚未完成任何探测".to_string()
            }
        }
    }
}

/// 按固定间隔执行 `probe`，直到条件满足、截止时间到达或 `cancel` 被触发
pub async fn poll_until<S, F, Fut>(
    settings: PollSettings,
    cancel: &CancellationToken,
    mut probe: F,
) -> Result<S, PollError<S>>
where
    S: fmt::Debug + fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Probe<S>>,
{
    let started = Instant::now();
    let deadline_at = started + settings.deadline;
    let probe_limit = deadline_at + settings.interval;
    let mut attempts: u32 = 0;
    let mut last_observed: Option<S> = None;

    loop {
        attempts += 1;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(attempts, "轮询在探测中被取消");
                return Err(PollError::Cancelled { last_observed });
            }
            result = probe() => result,
            _ = tokio::time::sleep_until(probe_limit) => {
                debug!(attempts, "探测未在时限内返回");
                return Err(PollError::Timeout {
                    last_observed,
                    elapsed: started.elapsed(),
                });
            }
        };

        if result.done {
            debug!(attempts, elapsed = ?started.elapsed(), "轮询条件已满足");
            return Ok(result.observed);
        }

        trace!(attempts, observed = %result.observed, "条件尚未满足");

        let now = Instant::now();
        if now >= deadline_at {
            return Err(PollError::Timeout {
                last_observed: Some(result.observed),
                elapsed: now - started,
            });
        }
        last_observed = Some(result.observed);

        let wait = settings.interval.min(deadline_at - now);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(attempts, "轮询在等待中被取消");
                return Err(PollError::Cancelled { last_observed });
            }
            _ = tokio::time::sleep(wait) => {}
        }
    }
}
