use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 字段值（CSV 单元格）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// 从原始单元格解析：只有能无损还原的数字才按数字保存（避免吃掉前导零）
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() && n.to_string() == trimmed => FieldValue::Number(n),
            _ => FieldValue::Text(raw.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// 记录状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordStatus {
    Active,
    Inactive,
    Other(String),
}

impl From<&str> for RecordStatus {
    fn from(s: &str) -> Self {
        match s.trim() {
            "Active" => RecordStatus::Active,
            "Inactive" => RecordStatus::Inactive,
            other => RecordStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordStatus::Active => write!(f, "Active"),
            RecordStatus::Inactive => write!(f, "Inactive"),
            RecordStatus::Other(s) => write!(f, "{}", s),
        }
    }
}

/// 本地记录（Encompass 导出的一行）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalRecord {
    pub identity_key: String,
    pub status: RecordStatus,
    pub attributes: BTreeMap<String, FieldValue>,
}

impl LocalRecord {
    pub fn new(identity_key: impl Into<String>, status: RecordStatus) -> Self {
        Self {
            identity_key: identity_key.into(),
            status,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attr(mut self, name: &str, value: impl AsRef<str>) -> Self {
        self.attributes
            .insert(name.to_string(), FieldValue::parse(value.as_ref()));
        self
    }

    /// 读取文本字段，空字符串视为不存在
    pub fn text(&self, name: &str) -> Option<String> {
        self.attributes
            .get(name)
            .map(|v| v.to_string())
            .filter(|s| !s.trim().is_empty())
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.attributes.get(name).and_then(FieldValue::as_f64)
    }
}

/// 远程记录（Samsara 导出的一行），只用于成员判断
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteRecord {
    pub identity_key: String,
    pub id: Option<String>,
    /// 次级匹配键（司机用户名）
    pub secondary_key: Option<String>,
}

impl RemoteRecord {
    pub fn new(identity_key: impl Into<String>) -> Self {
        Self {
            identity_key: identity_key.into(),
            id: None,
            secondary_key: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_secondary_key(mut self, key: impl Into<String>) -> Self {
        self.secondary_key = Some(key.into());
        self
    }
}
