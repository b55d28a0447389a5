use crate::core::{
    JobKind, JobPlan, KeyNormalizer, PlanContext, PlanSummary, PlannedAction, RecordComparator,
    RemoteRecord, SyncEngine, SyncReport, TokioSleeper,
};
use crate::client::{ApiClient, HttpApiClient};
use crate::config::ColumnNames;
use crate::source::{
    AuditLog, CsvRecordSource, CsvRemoteDirectory, RecordSource, RemoteDirectory,
};
use crate::AppContext;
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Instrument};

/// 差异分析中的单条动作
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffAction {
    #[serde(rename = "type")]
    pub action_type: String,
    pub identity_key: String,
    pub method: Option<String>,
    pub path: Option<String>,
    pub reason: Option<String>,
}

/// 差异分析结果（不发送任何请求）
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
    pub job: String,
    pub source_name: String,
    pub remote_name: String,
    pub local_records: usize,
    pub remote_records: usize,
    pub considered: usize,
    pub mutation_count: usize,
    pub unmapped_count: usize,
    pub unchanged_count: usize,
    pub actions: Vec<DiffAction>,
}

/// 按任务类型创建本地数据源
fn record_source(ctx: &AppContext, job: JobKind) -> CsvRecordSource {
    let columns = &ctx.config.columns;
    let path = &ctx.config.files.encompass_csv;
    match job {
        JobKind::Addresses => CsvRecordSource::new(path, &columns.customer_name),
        JobKind::Drivers | JobKind::Deactivate => {
            CsvRecordSource::new(path, &columns.full_name).with_status_column(&columns.status)
        }
    }
}

/// 按任务类型创建远程目录
fn remote_directory(ctx: &AppContext, job: JobKind) -> CsvRemoteDirectory {
    let columns = &ctx.config.columns;
    let path = &ctx.config.files.samsara_csv;
    match job {
        JobKind::Addresses => CsvRemoteDirectory::new(path, &columns.customer_name),
        JobKind::Drivers => CsvRemoteDirectory::new(path, &columns.full_name),
        JobKind::Deactivate => CsvRemoteDirectory::new(path, &columns.full_name)
            .with_id_column(&columns.driver_id)
            .with_secondary_column(&columns.user_name),
    }
}

fn comparator(job: JobKind, columns: &ColumnNames) -> RecordComparator {
    let comparator = RecordComparator::new(KeyNormalizer::default());
    match job {
        JobKind::Deactivate => comparator.with_secondary_field(&columns.user_name),
        JobKind::Addresses | JobKind::Drivers => comparator,
    }
}

/// 读取两侧数据并生成计划
async fn build_plan(ctx: &AppContext, job: JobKind) -> Result<(JobPlan, usize, usize)> {
    let source = record_source(ctx, job);
    let remote = remote_directory(ctx, job);

    let local_records = source
        .list_records()
        .await
        .with_context(|| format!("加载本地记录失败: {}", source.name()))?;
    let mut remote_records = remote
        .list_remote_records()
        .await
        .with_context(|| format!("加载远程记录失败: {}", remote.name()))?;

    // 已在审计文件中的地址视为远程已存在，避免导出滞后时重复创建
    if let (JobKind::Addresses, Some(path)) = (job, &ctx.config.files.audit_csv) {
        let audit = AuditLog::new(path);
        let logged = audit
            .names()
            .with_context(|| format!("读取审计文件失败: {}", path.display()))?;
        if !logged.is_empty() {
            info!("审计文件中已有 {} 个地址", logged.len());
        }
        remote_records.extend(logged.into_iter().map(RemoteRecord::new));
    }

    info!(
        "本地 {} 条, 远程 {} 条",
        local_records.len(),
        remote_records.len()
    );

    let options = ctx.request_options();
    let plan_ctx = PlanContext {
        tables: &ctx.config.enrichment,
        columns: &ctx.config.columns,
        options: &options,
    };
    let plan = comparator(job, &ctx.config.columns).plan(
        job,
        &local_records,
        &remote_records,
        &plan_ctx,
    );

    Ok((plan, local_records.len(), remote_records.len()))
}

/// 分析同步任务（不执行同步，只返回差异）
pub async fn analyze_job(ctx: &AppContext, job: JobKind) -> Result<DiffResult> {
    let (plan, local_count, remote_count) = build_plan(ctx, job).await?;
    let PlanSummary {
        considered,
        mutations,
        unmapped,
        unchanged,
    } = plan.summarize();

    let actions = plan
        .actions
        .into_iter()
        .map(|action| match action {
            PlannedAction::Mutate { request, .. } => {
                info!("[预览] {} {} '{}'", request.method, request.path, request.identity_key);
                DiffAction {
                    action_type: "mutate".to_string(),
                    identity_key: request.identity_key,
                    method: Some(request.method.to_string()),
                    path: Some(request.path),
                    reason: None,
                }
            }
            PlannedAction::Unmapped {
                identity_key,
                reason,
            } => DiffAction {
                action_type: "unmapped".to_string(),
                identity_key,
                method: None,
                path: None,
                reason: Some(reason.to_string()),
            },
        })
        .collect();

    info!(
        "预览完成: {} 条待同步, {} 条未映射, {} 条无需处理",
        mutations, unmapped, unchanged
    );

    Ok(DiffResult {
        job: job.to_string(),
        source_name: record_source(ctx, job).name().to_string(),
        remote_name: remote_directory(ctx, job).name().to_string(),
        local_records: local_count,
        remote_records: remote_count,
        considered,
        mutation_count: mutations,
        unmapped_count: unmapped,
        unchanged_count: unchanged,
        actions,
    })
}

/// 执行同步任务
pub async fn start_sync(ctx: &AppContext, job: JobKind) -> Result<SyncReport> {
    let run_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("sync", job = %job, run = %run_id);

    async move {
        info!("程序启动");

        let client = HttpApiClient::with_timeout(
            &ctx.config.api.samsara_endpoint,
            Duration::from_secs(ctx.config.api.timeout_secs),
        )?;
        let client: Arc<dyn ApiClient> = Arc::new(client);

        let (plan, _, _) = build_plan(ctx, job).await?;

        let audit = ctx.config.files.audit_csv.as_ref().map(AuditLog::new);
        let engine = SyncEngine::new(client, Arc::new(TokioSleeper), &ctx.credentials.api_key)
            .with_policy(ctx.config.retry.clone())
            .with_run_id(run_id.to_string());

        let report = engine
            .run(job, plan, audit.as_ref(), &ctx.config.columns)
            .await;
        Ok::<_, anyhow::Error>(report)
    }
    .instrument(span)
    .await
}
