use super::{RecordSource, RemoteDirectory};
use crate::core::record::{FieldValue, LocalRecord, RecordStatus, RemoteRecord};
use crate::error::{SyncError, SyncResult};
use ::csv::{ReaderBuilder, StringRecord, WriterBuilder};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 读取 CSV 并返回表头和所有行
fn read_rows(path: &Path, source_id: &str) -> SyncResult<(Vec<String>, Vec<StringRecord>)> {
    let read_err = |message: String| SyncError::SourceRead {
        source_id: source_id.to_string(),
        message,
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| read_err(format!("{}: {}", path.display(), e)))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| read_err(e.to_string()))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    let rows = reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| read_err(e.to_string()))?;

    debug!("读取 {}: {} 行", path.display(), rows.len());
    Ok((headers, rows))
}

fn column_index(headers: &[String], column: &str, source_id: &str) -> SyncResult<usize> {
    headers
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| SyncError::SourceRead {
            source_id: source_id.to_string(),
            message: format!("缺少列 '{}'", column),
        })
}

fn optional_index(
    headers: &[String],
    column: Option<&str>,
    source_id: &str,
) -> SyncResult<Option<usize>> {
    column
        .map(|c| column_index(headers, c, source_id))
        .transpose()
}

/// Encompass 导出的本地记录
pub struct CsvRecordSource {
    path: PathBuf,
    name: String,
    identity_column: String,
    /// 没有状态列时所有记录视为 Active
    status_column: Option<String>,
}

impl CsvRecordSource {
    pub fn new(path: impl Into<PathBuf>, identity_column: &str) -> Self {
        let path = path.into();
        Self {
            name: format!("csv://{}", path.display()),
            path,
            identity_column: identity_column.to_string(),
            status_column: None,
        }
    }

    pub fn with_status_column(mut self, column: &str) -> Self {
        self.status_column = Some(column.to_string());
        self
    }
}

#[async_trait]
impl RecordSource for CsvRecordSource {
    async fn list_records(&self) -> SyncResult<Vec<LocalRecord>> {
        let (headers, rows) = read_rows(&self.path, &self.name)?;
        let identity = column_index(&headers, &self.identity_column, &self.name)?;
        let status = optional_index(&headers, self.status_column.as_deref(), &self.name)?;

        let mut records = Vec::with_capacity(rows.len());
        for (line, row) in rows.iter().enumerate() {
            let key = row.get(identity).unwrap_or("").trim();
            if key.is_empty() {
                // 行号从 2 开始（第 1 行是表头）
                warn!("{} 第 {} 行缺少 '{}'，已忽略", self.name, line + 2, self.identity_column);
                continue;
            }

            let attributes: BTreeMap<String, FieldValue> = headers
                .iter()
                .zip(row.iter())
                .map(|(h, v)| (h.clone(), FieldValue::parse(v)))
                .collect();

            records.push(LocalRecord {
                identity_key: key.to_string(),
                status: status
                    .and_then(|i| row.get(i))
                    .map(RecordStatus::from)
                    .unwrap_or(RecordStatus::Active),
                attributes,
            });
        }

        Ok(records)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Samsara 导出的远程记录
pub struct CsvRemoteDirectory {
    path: PathBuf,
    name: String,
    identity_column: String,
    id_column: Option<String>,
    secondary_column: Option<String>,
}

impl CsvRemoteDirectory {
    pub fn new(path: impl Into<PathBuf>, identity_column: &str) -> Self {
        let path = path.into();
        Self {
            name: format!("csv://{}", path.display()),
            path,
            identity_column: identity_column.to_string(),
            id_column: None,
            secondary_column: None,
        }
    }

    pub fn with_id_column(mut self, column: &str) -> Self {
        self.id_column = Some(column.to_string());
        self
    }

    pub fn with_secondary_column(mut self, column: &str) -> Self {
        self.secondary_column = Some(column.to_string());
        self
    }
}

#[async_trait]
impl RemoteDirectory for CsvRemoteDirectory {
    async fn list_remote_records(&self) -> SyncResult<Vec<RemoteRecord>> {
        let (headers, rows) = read_rows(&self.path, &self.name)?;
        let identity = column_index(&headers, &self.identity_column, &self.name)?;
        let id = optional_index(&headers, self.id_column.as_deref(), &self.name)?;
        let secondary = optional_index(&headers, self.secondary_column.as_deref(), &self.name)?;

        let cell = |row: &StringRecord, index: Option<usize>| {
            index
                .and_then(|i| row.get(i))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Ok(rows
            .iter()
            .filter_map(|row| {
                let key = row.get(identity)?.trim();
                if key.is_empty() {
                    return None;
                }
                Some(RemoteRecord {
                    identity_key: key.to_string(),
                    id: cell(row, id),
                    secondary_key: cell(row, secondary),
                })
            })
            .collect())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 已创建地址的审计记录
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub const HEADERS: [&'static str; 5] = [
        "Customer Name",
        "Formatted Address",
        "Latitude",
        "Longitude",
        "Date Entered",
    ];

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 已记录的客户名称；文件不存在时为空
    pub fn names(&self) -> SyncResult<HashSet<String>> {
        if !self.path.exists() {
            return Ok(HashSet::new());
        }

        let source_id = self.path.display().to_string();
        let (headers, rows) = read_rows(&self.path, &source_id)?;
        let name = column_index(&headers, Self::HEADERS[0], &source_id)?;

        Ok(rows
            .iter()
            .filter_map(|row| row.get(name))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// 追加一行，文件不存在时先写表头
    pub fn append(
        &self,
        name: &str,
        address: &str,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> SyncResult<()> {
        let is_new = !self.path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| SyncError::Audit(format!("{}: {}", self.path.display(), e)))?;

        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        let audit_err = |e: ::csv::Error| SyncError::Audit(e.to_string());

        if is_new {
            writer.write_record(Self::HEADERS).map_err(audit_err)?;
        }

        let coord = |v: Option<f64>| v.map(|n| n.to_string()).unwrap_or_default();
        let (lat, lon) = (coord(latitude), coord(longitude));
        let entered = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        writer
            .write_record([name, address, lat.as_str(), lon.as_str(), entered.as_str()])
            .map_err(audit_err)?;
        writer
            .flush()
            .map_err(|e| SyncError::Audit(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_list_records_preserves_order() {
        let file = csv_file(
            "\u{feff}Full Name,Location,Active,User Name\n\
             Zed,Austin,Active,zed\n\
             Amy,Lubbock,Inactive,amy\n\
             ,Austin,Active,ghost\n\
             Bob,Midland,Active,bob\n",
        );

        let source = CsvRecordSource::new(file.path(), "Full Name").with_status_column("Active");
        let records = source.list_records().await.unwrap();

        let names: Vec<_> = records.iter().map(|r| r.identity_key.as_str()).collect();
        assert_eq!(names, vec!["Zed", "Amy", "Bob"]);
        assert_eq!(records[1].status, RecordStatus::Inactive);
        assert_eq!(records[0].text("Location").as_deref(), Some("Austin"));
    }

    #[tokio::test]
    async fn test_records_default_to_active_without_status_column() {
        let file = csv_file("Customer Name,Location\nCorner Store,Austin\n");

        let records = CsvRecordSource::new(file.path(), "Customer Name")
            .list_records()
            .await
            .unwrap();

        assert_eq!(records[0].status, RecordStatus::Active);
    }

    #[tokio::test]
    async fn test_missing_column_is_source_error() {
        let file = csv_file("Name,Location\nA,Austin\n");

        let err = CsvRecordSource::new(file.path(), "Full Name")
            .list_records()
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::SourceRead { .. }));
        assert!(err.to_string().contains("Full Name"));
    }

    #[tokio::test]
    async fn test_missing_file_is_source_error() {
        let err = CsvRemoteDirectory::new("/nonexistent/samsara.csv", "Full Name")
            .list_remote_records()
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::SourceRead { .. }));
    }

    #[tokio::test]
    async fn test_remote_directory_reads_ids() {
        let file = csv_file("Full Name,User Name,Driver ID\nAmy,amy,42\nBob,,\n");

        let remote = CsvRemoteDirectory::new(file.path(), "Full Name")
            .with_id_column("Driver ID")
            .with_secondary_column("User Name")
            .list_remote_records()
            .await
            .unwrap();

        assert_eq!(
            remote,
            vec![
                RemoteRecord::new("Amy").with_id("42").with_secondary_key("amy"),
                RemoteRecord::new("Bob"),
            ]
        );
    }

    #[test]
    fn test_audit_log_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditLog::new(dir.path().join("audit.csv"));

        audit
            .append("Corner Store", "1 Main St", Some(30.25), Some(-97.75))
            .unwrap();
        audit.append("Gas & Go", "2 Elm St", None, None).unwrap();

        let content = std::fs::read_to_string(audit.path()).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "Customer Name,Formatted Address,Latitude,Longitude,Date Entered"
        );
        assert!(lines[1].starts_with("Corner Store,1 Main St,30.25,-97.75,"));
        assert!(lines[2].starts_with("Gas & Go,2 Elm St,,,"));
    }

    #[test]
    fn test_audit_log_names() {
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditLog::new(dir.path().join("audit.csv"));
        assert!(audit.names().unwrap().is_empty());

        audit.append("Corner Store", "1 Main St", None, None).unwrap();
        audit.append("Gas & Go", "2 Elm St", None, None).unwrap();

        let names = audit.names().unwrap();
        assert_eq!(names.len(), 2);
        assert!(names.contains("Corner Store"));
        assert!(names.contains("Gas & Go"));
    }
}
