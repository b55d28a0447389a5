//! 重试与退避策略
//!
//! 针对 Samsara 限流行为的固定规则：
//! - 超时：计失败，立即重试
//! - 429：等待 60 秒，计失败，继续重试
//! - 5xx：等待 5 秒，不计失败，继续重试
//! - 其他非 2xx（4xx、1xx、3xx）：计失败，不再重试
//! - 其他传输错误：计失败，继续重试
//! - 成功：计成功，结束
//!
//! 5xx 与 429 的计数差异是有意保留的。

use crate::client::ApiResponse;
use crate::error::TransportError;
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// 单次请求的结果分类
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success(u16),
    Timeout,
    RateLimited,
    ServerError(u16),
    /// 429 以外的 4xx，以及 1xx/3xx
    ClientError(u16),
    Transport(String),
}

impl AttemptOutcome {
    pub fn classify(result: &Result<ApiResponse, TransportError>) -> Self {
        match result {
            Ok(resp) => match resp.status {
                s if (200..300).contains(&s) => AttemptOutcome::Success(s),
                429 => AttemptOutcome::RateLimited,
                s if s >= 500 => AttemptOutcome::ServerError(s),
                s => AttemptOutcome::ClientError(s),
            },
            Err(TransportError::Timeout) => AttemptOutcome::Timeout,
            Err(TransportError::Other(msg)) => AttemptOutcome::Transport(msg.clone()),
        }
    }

    /// 是否计入失败次数
    pub fn counts_as_failure(&self) -> bool {
        !matches!(
            self,
            AttemptOutcome::Success(_) | AttemptOutcome::ServerError(_)
        )
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Success(s) => write!(f, "成功 ({})", s),
            AttemptOutcome::Timeout => write!(f, "请求超时"),
            AttemptOutcome::RateLimited => write!(f, "请求过多 (429)"),
            AttemptOutcome::ServerError(s) => write!(f, "服务器错误 ({})", s),
            AttemptOutcome::ClientError(s) => write!(f, "请求被拒绝 ({})", s),
            AttemptOutcome::Transport(msg) => write!(f, "传输错误: {}", msg),
        }
    }
}

/// 策略决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// 等待后重试
    Retry(Duration),
    StopSuccess,
    /// 等待后终止（最后一次尝试的冷却仍然执行）
    StopFailure(Duration),
}

/// 单条记录的执行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Attempting { attempt: u32 },
    /// `next_attempt` 为 None 表示冷却后终止
    CoolingDown {
        delay: Duration,
        next_attempt: Option<u32>,
    },
    Succeeded,
    FailedTerminal,
}

impl AttemptState {
    pub fn start() -> Self {
        AttemptState::Attempting { attempt: 1 }
    }

    /// 根据策略决定推进状态（仅在 Attempting 状态下有意义）
    pub fn advance(self, decision: Decision) -> Self {
        let AttemptState::Attempting { attempt } = self else {
            return self;
        };
        match decision {
            Decision::StopSuccess => AttemptState::Succeeded,
            Decision::Retry(delay) if delay.is_zero() => AttemptState::Attempting {
                attempt: attempt + 1,
            },
            Decision::Retry(delay) => AttemptState::CoolingDown {
                delay,
                next_attempt: Some(attempt + 1),
            },
            Decision::StopFailure(delay) if delay.is_zero() => AttemptState::FailedTerminal,
            Decision::StopFailure(delay) => AttemptState::CoolingDown {
                delay,
                next_attempt: None,
            },
        }
    }

    /// 冷却结束
    pub fn resume(self) -> Self {
        match self {
            AttemptState::CoolingDown {
                next_attempt: Some(attempt),
                ..
            } => AttemptState::Attempting { attempt },
            AttemptState::CoolingDown {
                next_attempt: None, ..
            } => AttemptState::FailedTerminal,
            other => other,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptState::Succeeded | AttemptState::FailedTerminal)
    }
}

/// 重试策略
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(with = "secs")]
    pub rate_limit_cooldown: Duration,
    #[serde(with = "secs")]
    pub server_error_cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            rate_limit_cooldown: Duration::from_secs(60),
            server_error_cooldown: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn decide(&self, attempt: u32, outcome: &AttemptOutcome) -> Decision {
        let delay = match outcome {
            AttemptOutcome::Success(_) => return Decision::StopSuccess,
            AttemptOutcome::ClientError(_) => return Decision::StopFailure(Duration::ZERO),
            AttemptOutcome::RateLimited => self.rate_limit_cooldown,
            AttemptOutcome::ServerError(_) => self.server_error_cooldown,
            AttemptOutcome::Timeout | AttemptOutcome::Transport(_) => Duration::ZERO,
        };

        if attempt >= self.max_attempts {
            Decision::StopFailure(delay)
        } else {
            Decision::Retry(delay)
        }
    }
}

mod secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

/// 等待抽象，测试中替换为记录调用的实现
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
