use crate::config::ColumnNames;
use crate::core::enrichment::EnrichmentTables;
use crate::core::record::{LocalRecord, RecordStatus, RemoteRecord};
use crate::core::request::{self, RemoteMutationRequest, RequestOptions};
use crate::error::SyncError;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, warn};

/// 同步任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// 新增客户地址
    Addresses,
    /// 新增在职司机
    Drivers,
    /// 停用离职司机
    Deactivate,
}

impl JobKind {
    /// 参与该任务的本地记录状态
    pub fn status(&self) -> RecordStatus {
        match self {
            JobKind::Addresses | JobKind::Drivers => RecordStatus::Active,
            JobKind::Deactivate => RecordStatus::Inactive,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Addresses => write!(f, "addresses"),
            JobKind::Drivers => write!(f, "drivers"),
            JobKind::Deactivate => write!(f, "deactivate"),
        }
    }
}

/// 匹配键规范化规则，比较前同时作用于本地和远程两侧
#[derive(Debug, Clone)]
pub struct KeyNormalizer {
    marker: Option<Regex>,
}

impl KeyNormalizer {
    /// 不做任何变换（仅去掉首尾空白）
    pub fn identity() -> Self {
        Self { marker: None }
    }

    /// 去掉标记字符串（忽略大小写），例如离职账号上的 `_x`
    pub fn strip_marker(marker: &str) -> Self {
        let marker = Regex::new(&format!("(?i){}", regex::escape(marker))).ok();
        Self { marker }
    }

    pub fn normalize(&self, key: &str) -> String {
        match &self.marker {
            Some(re) => re.replace_all(key, "").trim().to_string(),
            None => key.trim().to_string(),
        }
    }
}

impl Default for KeyNormalizer {
    fn default() -> Self {
        Self::strip_marker("_x")
    }
}

/// 计划中的单条动作
#[derive(Debug, Clone)]
pub enum PlannedAction {
    /// 需要调用远程接口
    Mutate {
        record: LocalRecord,
        request: RemoteMutationRequest,
    },
    /// 补全表缺失，跳过（不计入失败）
    Unmapped { identity_key: String, reason: SyncError },
}

/// 一次任务的执行计划
#[derive(Debug, Clone, Default)]
pub struct JobPlan {
    /// 状态符合任务要求的本地记录数
    pub considered: usize,
    pub actions: Vec<PlannedAction>,
}

impl JobPlan {
    pub fn summarize(&self) -> PlanSummary {
        let mut summary = PlanSummary {
            considered: self.considered,
            ..Default::default()
        };
        for action in &self.actions {
            match action {
                PlannedAction::Mutate { .. } => summary.mutations += 1,
                PlannedAction::Unmapped { .. } => summary.unmapped += 1,
            }
        }
        summary.unchanged = summary
            .considered
            .saturating_sub(summary.mutations + summary.unmapped);
        summary
    }
}

/// 计划统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub considered: usize,
    pub mutations: usize,
    pub unmapped: usize,
    pub unchanged: usize,
}

/// 与远程记录匹配上的本地记录
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedRecord<'a> {
    pub record: &'a LocalRecord,
    pub remote_id: String,
}

/// 生成计划时需要的只读上下文
pub struct PlanContext<'a> {
    pub tables: &'a EnrichmentTables,
    pub columns: &'a ColumnNames,
    pub options: &'a RequestOptions,
}

/// 记录比较器
pub struct RecordComparator {
    normalizer: KeyNormalizer,
    /// 次级匹配字段（本地列名），为 None 时只比较主键
    secondary_field: Option<String>,
}

impl RecordComparator {
    pub fn new(normalizer: KeyNormalizer) -> Self {
        Self {
            normalizer,
            secondary_field: None,
        }
    }

    pub fn with_secondary_field(mut self, field: impl Into<String>) -> Self {
        self.secondary_field = Some(field.into());
        self
    }

    /// 远程不存在、且状态匹配的本地记录，保持本地顺序
    pub fn missing<'a>(
        &self,
        local: &'a [LocalRecord],
        remote: &[RemoteRecord],
        status: &RecordStatus,
    ) -> Vec<&'a LocalRecord> {
        let remote_keys: HashSet<String> = remote
            .iter()
            .map(|r| self.normalizer.normalize(&r.identity_key))
            .collect();

        local
            .iter()
            .filter(|r| &r.status == status)
            .filter(|r| !remote_keys.contains(&self.normalizer.normalize(&r.identity_key)))
            .collect()
    }

    /// 远程已存在、且状态匹配的本地记录，附带远程 ID
    pub fn matched<'a>(
        &self,
        local: &'a [LocalRecord],
        remote: &[RemoteRecord],
        status: &RecordStatus,
    ) -> Vec<MatchedRecord<'a>> {
        let mut by_key: HashMap<String, Vec<&RemoteRecord>> = HashMap::new();
        for r in remote {
            by_key
                .entry(self.normalizer.normalize(&r.identity_key))
                .or_default()
                .push(r);
        }

        let mut matches = Vec::new();
        for record in local.iter().filter(|r| &r.status == status) {
            let key = self.normalizer.normalize(&record.identity_key);
            let Some(candidates) = by_key.get(&key) else {
                debug!("远程不存在: {}", record.identity_key);
                continue;
            };

            let local_secondary = self
                .secondary_field
                .as_deref()
                .and_then(|f| record.text(f))
                .map(|s| self.normalizer.normalize(&s));

            // 配置了次级键时两侧都必须有值且一致，任一侧为空都视为不匹配
            let hit = candidates.iter().find(|r| {
                if self.secondary_field.is_none() {
                    return true;
                }
                match (&local_secondary, &r.secondary_key) {
                    (Some(l), Some(rk)) => *l == self.normalizer.normalize(rk),
                    _ => false,
                }
            });

            match hit.and_then(|r| r.id.clone()) {
                Some(remote_id) => matches.push(MatchedRecord { record, remote_id }),
                None if hit.is_some() => {
                    warn!("远程记录缺少 ID，跳过: {}", record.identity_key)
                }
                None => warn!("次级键缺失或不匹配，跳过: {}", record.identity_key),
            }
        }
        matches
    }

    /// 比较并生成执行计划
    pub fn plan(
        &self,
        job: JobKind,
        local: &[LocalRecord],
        remote: &[RemoteRecord],
        ctx: &PlanContext<'_>,
    ) -> JobPlan {
        let status = job.status();
        let considered = local.iter().filter(|r| r.status == status).count();

        let built: Vec<(&LocalRecord, Result<RemoteMutationRequest, SyncError>)> = match job {
            JobKind::Addresses => self
                .missing(local, remote, &status)
                .into_iter()
                .map(|r| (r, request::build_address(r, ctx.tables, ctx.columns)))
                .collect(),
            JobKind::Drivers => self
                .missing(local, remote, &status)
                .into_iter()
                .map(|r| {
                    (
                        r,
                        request::build_driver(r, ctx.tables, ctx.columns, ctx.options),
                    )
                })
                .collect(),
            JobKind::Deactivate => self
                .matched(local, remote, &status)
                .into_iter()
                .map(|m| (m.record, Ok(request::build_deactivation(m.record, &m.remote_id))))
                .collect(),
        };

        let actions = built
            .into_iter()
            .map(|(record, result)| match result {
                Ok(request) => PlannedAction::Mutate {
                    record: record.clone(),
                    request,
                },
                Err(reason) => {
                    warn!("跳过 '{}': {}", record.identity_key, reason);
                    PlannedAction::Unmapped {
                        identity_key: record.identity_key.clone(),
                        reason,
                    }
                }
            })
            .collect();

        JobPlan {
            considered,
            actions,
        }
    }
}

impl Default for RecordComparator {
    fn default() -> Self {
        Self::new(KeyNormalizer::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    /// 收集日志输出的内存缓冲
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// 执行闭包并返回期间输出的 WARN 及以上日志行
    fn capture_warnings<T>(f: impl FnOnce() -> T) -> (T, Vec<String>) {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();

        let result = tracing::subscriber::with_default(subscriber, f);
        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        (result, output.lines().map(str::to_string).collect())
    }

    fn active(name: &str) -> LocalRecord {
        LocalRecord::new(name, RecordStatus::Active).with_attr("Location", "Austin")
    }

    fn names(records: &[&LocalRecord]) -> Vec<String> {
        records.iter().map(|r| r.identity_key.clone()).collect()
    }

    #[test]
    fn test_missing_preserves_local_order() {
        let local = vec![active("C"), active("A"), active("B"), active("D")];
        let remote = vec![RemoteRecord::new("A"), RemoteRecord::new("D")];

        let comparator = RecordComparator::default();
        let result = comparator.missing(&local, &remote, &RecordStatus::Active);

        assert_eq!(names(&result), vec!["C", "B"]);
    }

    #[test]
    fn test_missing_filters_by_status() {
        let local = vec![
            active("A"),
            LocalRecord::new("B", RecordStatus::Inactive),
            LocalRecord::new("C", RecordStatus::Other("Leave".into())),
        ];

        let comparator = RecordComparator::default();
        assert_eq!(
            names(&comparator.missing(&local, &[], &RecordStatus::Active)),
            vec!["A"]
        );
        assert_eq!(
            names(&comparator.missing(&local, &[], &RecordStatus::Inactive)),
            vec!["B"]
        );
    }

    #[test]
    fn test_normalizer_applies_to_both_sides() {
        let local = vec![active("Jane Doe_X"), active("John Roe")];
        let remote = vec![RemoteRecord::new("Jane Doe"), RemoteRecord::new("John Roe_x")];

        let comparator = RecordComparator::default();
        assert!(comparator
            .missing(&local, &remote, &RecordStatus::Active)
            .is_empty());

        let exact = RecordComparator::new(KeyNormalizer::identity());
        assert_eq!(
            names(&exact.missing(&local, &remote, &RecordStatus::Active)),
            vec!["Jane Doe_X", "John Roe"]
        );
    }

    #[test]
    fn test_missing_is_idempotent() {
        let local = vec![active("A"), active("B"), active("C")];
        let remote = vec![RemoteRecord::new("B")];

        let comparator = RecordComparator::default();
        let first = names(&comparator.missing(&local, &remote, &RecordStatus::Active));
        let second = names(&comparator.missing(&local, &remote, &RecordStatus::Active));

        assert_eq!(first, second);
        assert_eq!(first, vec!["A", "C"]);
    }

    #[test]
    fn test_matched_uses_secondary_key() {
        let local = vec![
            LocalRecord::new("Jane Doe_x", RecordStatus::Inactive).with_attr("User Name", "jdoe_x"),
            LocalRecord::new("Jane Doe", RecordStatus::Inactive).with_attr("User Name", "jane2"),
            LocalRecord::new("Ann Poe", RecordStatus::Inactive).with_attr("User Name", "apoe"),
        ];
        let remote = vec![
            RemoteRecord::new("Jane Doe")
                .with_id("101")
                .with_secondary_key("jdoe"),
            RemoteRecord::new("Ann Poe").with_secondary_key("apoe"),
        ];

        let comparator = RecordComparator::default().with_secondary_field("User Name");
        let matches = comparator.matched(&local, &remote, &RecordStatus::Inactive);

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].record.identity_key, "Jane Doe_x");
        assert_eq!(matches[0].remote_id, "101");
    }

    #[test]
    fn test_matched_requires_secondary_key_on_both_sides() {
        let local = vec![
            LocalRecord::new("John Smith_x", RecordStatus::Inactive)
                .with_attr("User Name", "jsmith_x"),
            LocalRecord::new("Ann Poe", RecordStatus::Inactive),
        ];
        let remote = vec![
            RemoteRecord::new("John Smith").with_id("55"),
            RemoteRecord::new("Ann Poe")
                .with_id("56")
                .with_secondary_key("apoe"),
        ];

        let comparator = RecordComparator::default().with_secondary_field("User Name");
        let matches = comparator.matched(&local, &remote, &RecordStatus::Inactive);

        assert!(matches.is_empty());
    }

    #[test]
    fn test_matched_without_secondary_field_uses_primary_key_only() {
        let local = vec![LocalRecord::new("John Smith_x", RecordStatus::Inactive)];
        let remote = vec![RemoteRecord::new("John Smith").with_id("55")];

        let matches =
            RecordComparator::default().matched(&local, &remote, &RecordStatus::Inactive);

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].remote_id, "55");
    }

    #[test]
    fn test_plan_counts_unmapped_separately() {
        let local = vec![
            active("A"),
            LocalRecord::new("M", RecordStatus::Active).with_attr("Location", "Mars"),
            active("B"),
        ];
        let remote = vec![RemoteRecord::new("A")];
        let tables = EnrichmentTables::default();
        let columns = ColumnNames::default();
        let options = RequestOptions::default();
        let ctx = PlanContext {
            tables: &tables,
            columns: &columns,
            options: &options,
        };

        let plan = RecordComparator::default().plan(JobKind::Drivers, &local, &remote, &ctx);
        let summary = plan.summarize();

        assert_eq!(
            summary,
            PlanSummary {
                considered: 3,
                mutations: 1,
                unmapped: 1,
                unchanged: 1,
            }
        );
        assert!(matches!(
            &plan.actions[0],
            PlannedAction::Unmapped { identity_key, .. } if identity_key == "M"
        ));
    }

    #[test]
    fn test_unmapped_record_logs_one_warning() {
        let local = vec![
            active("A"),
            LocalRecord::new("M", RecordStatus::Active).with_attr("Location", "Mars"),
        ];
        let tables = EnrichmentTables::default();
        let columns = ColumnNames::default();
        let options = RequestOptions::default();
        let ctx = PlanContext {
            tables: &tables,
            columns: &columns,
            options: &options,
        };

        let (plan, lines) = capture_warnings(|| {
            RecordComparator::default().plan(JobKind::Drivers, &local, &[], &ctx)
        });

        assert_eq!(plan.summarize().unmapped, 1);
        assert_eq!(lines.len(), 1, "{:?}", lines);
        assert!(lines[0].contains("WARN"));
        assert!(lines[0].contains("'M'"));
        assert!(lines[0].contains("Mars"));
    }

    #[test]
    fn test_secondary_key_mismatch_logs_warning() {
        let local = vec![LocalRecord::new("John Smith_x", RecordStatus::Inactive)
            .with_attr("User Name", "jsmith_x")];
        let remote = vec![RemoteRecord::new("John Smith").with_id("55")];
        let comparator = RecordComparator::default().with_secondary_field("User Name");

        let (matches, lines) =
            capture_warnings(|| comparator.matched(&local, &remote, &RecordStatus::Inactive));

        assert!(matches.is_empty());
        assert_eq!(lines.len(), 1, "{:?}", lines);
        assert!(lines[0].contains("John Smith_x"));
    }
}
