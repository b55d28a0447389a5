use crate::core::retry::AttemptState;
use serde::Serialize;
use std::time::Duration;

/// 单条记录的执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    pub identity_key: String,
    /// 终止状态（Succeeded 或 FailedTerminal）
    pub state: AttemptState,
    pub attempts: u32,
    /// 本条记录产生的成功计数
    pub successful: u64,
    /// 本条记录产生的失败计数（每次尝试单独累加）
    pub failed: u64,
    pub cooldowns: Vec<Duration>,
    pub last_error: Option<String>,
}

impl RecordOutcome {
    pub fn new(identity_key: impl Into<String>) -> Self {
        Self {
            identity_key: identity_key.into(),
            state: AttemptState::start(),
            attempts: 0,
            successful: 0,
            failed: 0,
            cooldowns: Vec::new(),
            last_error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == AttemptState::Succeeded
    }
}

/// 调用结果计数，单线程顺序更新
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeTally {
    pub processed: u64,
    pub successful: u64,
    pub failed: u64,
    /// 因补全表缺失被跳过的记录（没有发起调用）
    pub skipped_unmapped: u64,
}

impl OutcomeTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次执行器调用后累加一次
    pub fn apply(&mut self, outcome: &RecordOutcome) {
        self.successful += outcome.successful;
        self.failed += outcome.failed;
    }

    pub fn record_unmapped(&mut self) {
        self.skipped_unmapped += 1;
    }

    pub fn set_processed(&mut self, processed: u64) {
        self.processed = processed;
    }

    pub fn summary_line(&self, noun: &str) -> String {
        format!(
            "运行结束。处理{}总数: {}。成功调用: {}。失败调用: {}。未映射跳过: {}。",
            noun, self.processed, self.successful, self.failed, self.skipped_unmapped
        )
    }
}
