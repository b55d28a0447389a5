//! 远程变更请求的构造
//!
//! 这里的函数只做数据变换，不访问网络或文件，可以单独测试。

use crate::config::ColumnNames;
use crate::core::enrichment::EnrichmentTables;
use crate::core::record::LocalRecord;
use crate::error::{SyncError, SyncResult};
use reqwest::Method;
use serde_json::{json, Map, Value};

/// 地址围栏半径（米）
pub const GEOFENCE_RADIUS_METERS: u32 = 100;

/// 一次远程变更
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteMutationRequest {
    pub method: Method,
    /// 相对于 API 根地址的路径
    pub path: String,
    pub body: Value,
    pub identity_key: String,
}

/// 构造请求时的附加选项
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// 新司机的初始密码，未设置时不下发
    pub initial_password: Option<String>,
}

fn ruleset_override() -> Value {
    json!({
        "cycle": "USA Property (8/70)",
        "restart": "34-hour Restart",
        "restbreak": "Property (off-duty/sleeper)",
        "usStateToOverride": ""
    })
}

fn unmapped(record: &LocalRecord, field: &'static str, value: Option<String>) -> SyncError {
    SyncError::UnmappedEnrichment {
        identity_key: record.identity_key.clone(),
        field,
        value: value.unwrap_or_default(),
    }
}

/// 新增客户地址
pub fn build_address(
    record: &LocalRecord,
    tables: &EnrichmentTables,
    columns: &ColumnNames,
) -> SyncResult<RemoteMutationRequest> {
    let location = record.text(&columns.location);
    let tag = location
        .as_deref()
        .and_then(|l| tables.tag_for_location(l))
        .ok_or_else(|| unmapped(record, "location", location.clone()))?;

    let latitude = record.number(&columns.latitude);
    let longitude = record.number(&columns.longitude);

    let mut body = Map::new();
    body.insert("name".into(), json!(record.identity_key));
    body.insert(
        "formattedAddress".into(),
        json!(record.text(&columns.address).unwrap_or_default()),
    );
    body.insert("tagIds".into(), json!([tag]));
    body.insert("latitude".into(), json!(latitude));
    body.insert("longitude".into(), json!(longitude));
    body.insert("notes".into(), json!("Made by API"));

    if let (Some(lat), Some(lon)) = (latitude, longitude) {
        body.insert(
            "geofence".into(),
            json!({
                "circle": {
                    "radiusMeters": GEOFENCE_RADIUS_METERS,
                    "latitude": lat,
                    "longitude": lon
                }
            }),
        );
    }

    Ok(RemoteMutationRequest {
        method: Method::POST,
        path: "/addresses".to_string(),
        body: Value::Object(body),
        identity_key: record.identity_key.clone(),
    })
}

/// 新增司机
pub fn build_driver(
    record: &LocalRecord,
    tables: &EnrichmentTables,
    columns: &ColumnNames,
    options: &RequestOptions,
) -> SyncResult<RemoteMutationRequest> {
    let location = record.text(&columns.location);
    let Some((location, company)) = location
        .as_deref()
        .and_then(|l| tables.company_for_location(l).map(|c| (l, c)))
    else {
        return Err(unmapped(record, "location", location.clone()));
    };

    let license_state = tables.license_state(company, location);
    let peer_group = tables.peer_group_for_role(record.text(&columns.role).as_deref());
    let location_tag = tables.tag_for_location(location).unwrap_or(location);

    let mut body = Map::new();
    body.insert("name".into(), json!(record.identity_key));
    body.insert("tagIds".into(), json!([company, location_tag, peer_group]));
    body.insert("peerGroupTagId".into(), json!(peer_group));
    body.insert("licenseState".into(), json!(license_state));
    body.insert("eldExempt".into(), json!(true));
    body.insert("eldExemptReason".into(), json!("Short Haul"));
    body.insert("notes".into(), json!("Created by API"));
    body.insert("usDriverRulesetOverride".into(), ruleset_override());

    if let Some(username) = record.text(&columns.user_name) {
        body.insert("username".into(), json!(username));
    }
    if let Some(phone) = record.text(&columns.mobile) {
        body.insert("phone".into(), json!(phone));
    }
    if let Some(external_id) = record.text(&columns.external_id) {
        body.insert("externalIds".into(), json!({ "EncompassID": external_id }));
    }
    if let Some(password) = &options.initial_password {
        body.insert("password".into(), json!(password));
    }

    Ok(RemoteMutationRequest {
        method: Method::POST,
        path: "/fleet/drivers".to_string(),
        body: Value::Object(body),
        identity_key: record.identity_key.clone(),
    })
}

/// 停用司机
pub fn build_deactivation(record: &LocalRecord, remote_id: &str) -> RemoteMutationRequest {
    RemoteMutationRequest {
        method: Method::PATCH,
        path: format!("/fleet/drivers/{}", urlencoding::encode(remote_id)),
        body: json!({
            "usDriverRulesetOverride": ruleset_override(),
            "driverActivationStatus": "deactivated"
        }),
        identity_key: record.identity_key.clone(),
    }
}
