use crate::client::ApiClient;
use crate::config::ColumnNames;
use crate::core::comparator::{JobKind, JobPlan, PlannedAction};
use crate::core::record::LocalRecord;
use crate::core::request::RemoteMutationRequest;
use crate::core::retry::{AttemptOutcome, AttemptState, RetryPolicy, Sleeper};
use crate::core::tally::{OutcomeTally, RecordOutcome};
use crate::source::AuditLog;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// 同步报告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub job: String,
    pub run_id: String,
    pub start_time: i64,
    pub end_time: i64,
    /// 耗时（秒）
    pub duration: u64,
    pub tally: OutcomeTally,
    /// 最终失败的记录
    pub failed_records: Vec<String>,
}

/// 同步执行器
///
/// 单线程顺序执行：一条记录（包括所有重试与等待）处理完才开始下一条。
pub struct SyncEngine {
    client: Arc<dyn ApiClient>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
    bearer_token: String,
    run_id: String,
}

impl SyncEngine {
    pub fn new(
        client: Arc<dyn ApiClient>,
        sleeper: Arc<dyn Sleeper>,
        bearer_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            sleeper,
            policy: RetryPolicy::default(),
            bearer_token: bearer_token.into(),
            run_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    /// 执行单条变更，按重试策略处理
    pub async fn execute(&self, request: &RemoteMutationRequest) -> RecordOutcome {
        let mut outcome = RecordOutcome::new(&request.identity_key);
        let mut state = AttemptState::start();

        loop {
            match state {
                AttemptState::Attempting { attempt } => {
                    outcome.attempts = attempt;
                    let result = self
                        .client
                        .send(
                            request.method.clone(),
                            &request.path,
                            Some(&request.body),
                            &self.bearer_token,
                        )
                        .await;
                    let attempt_outcome = AttemptOutcome::classify(&result);

                    match &attempt_outcome {
                        AttemptOutcome::Success(status) => {
                            outcome.successful += 1;
                            info!("'{}' 同步成功 ({})", request.identity_key, status);
                        }
                        AttemptOutcome::ClientError(status) => {
                            let body = result.as_ref().map(|r| r.body.as_str()).unwrap_or("");
                            error!(
                                "'{}' 请求失败 ({}): {}",
                                request.identity_key, status, body
                            );
                        }
                        other => warn!(
                            "'{}' 第 {}/{} 次尝试: {}",
                            request.identity_key, attempt, self.policy.max_attempts, other
                        ),
                    }

                    if attempt_outcome.counts_as_failure() {
                        outcome.failed += 1;
                        outcome.last_error = Some(attempt_outcome.to_string());
                    } else if !matches!(attempt_outcome, AttemptOutcome::Success(_)) {
                        outcome.last_error = Some(attempt_outcome.to_string());
                    }

                    state = state.advance(self.policy.decide(attempt, &attempt_outcome));
                }
                AttemptState::CoolingDown { delay, .. } => {
                    debug!("等待 {:?} 后继续", delay);
                    outcome.cooldowns.push(delay);
                    self.sleeper.sleep(delay).await;
                    state = state.resume();
                }
                AttemptState::Succeeded | AttemptState::FailedTerminal => break,
            }
        }

        outcome.state = state;
        if !outcome.succeeded() {
            error!(
                "'{}' 最终失败（{} 次尝试）",
                request.identity_key, outcome.attempts
            );
        }
        outcome
    }

    /// 按计划顺序执行整个任务
    pub async fn run(
        &self,
        job: JobKind,
        plan: JobPlan,
        audit: Option<&AuditLog>,
        columns: &ColumnNames,
    ) -> SyncReport {
        let start_time = chrono::Utc::now().timestamp();
        let started = Instant::now();

        info!("开始同步任务: {} ({}) -> {}", job, self.run_id, self.client.name());

        let mut tally = OutcomeTally::new();
        tally.set_processed(plan.considered as u64);
        let mut failed_records = Vec::new();

        for action in plan.actions {
            match action {
                PlannedAction::Unmapped { .. } => tally.record_unmapped(),
                PlannedAction::Mutate { record, request } => {
                    let outcome = self.execute(&request).await;
                    tally.apply(&outcome);

                    if outcome.succeeded() {
                        if let (JobKind::Addresses, Some(audit)) = (job, audit) {
                            record_address(audit, &record, columns);
                        }
                    } else {
                        failed_records.push(outcome.identity_key);
                    }
                }
            }
        }

        info!("{}", tally.summary_line(noun(job)));

        SyncReport {
            job: job.to_string(),
            run_id: self.run_id.clone(),
            start_time,
            end_time: chrono::Utc::now().timestamp(),
            duration: started.elapsed().as_secs(),
            tally,
            failed_records,
        }
    }
}

fn record_address(audit: &AuditLog, record: &LocalRecord, columns: &ColumnNames) {
    let address = record.text(&columns.address).unwrap_or_default();
    if let Err(e) = audit.append(
        &record.identity_key,
        &address,
        record.number(&columns.latitude),
        record.number(&columns.longitude),
    ) {
        warn!("{}", e);
    }
}

/// 汇总行中的记录名称
pub fn noun(job: JobKind) -> &'static str {
    match job {
        JobKind::Addresses => "地址",
        JobKind::Drivers | JobKind::Deactivate => "司机",
    }
}
