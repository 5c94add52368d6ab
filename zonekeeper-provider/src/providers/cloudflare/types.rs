//! Cloudflare API 载荷，以及与 zone / record 模型的互转

use serde::{Deserialize, Serialize};

use crate::providers::common::relative_to_full_name;
use crate::traits::RawApiError;
use crate::types::{ProviderZone, RecordData, RecordSpec, ZoneStatus};

/// `{success, result, errors, result_info}` envelope shared by every endpoint.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub result: Option<T>,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result_info: Option<ResultInfo>,
}

impl<T> Envelope<T> {
    /// Total across pages; 0 for endpoints that do not page.
    pub fn total(&self) -> u32 {
        self.result_info.as_ref().map_or(0, |i| i.total_count)
    }

    /// First reported error. Cloudflare codes are numeric; they are mapped as strings.
    pub fn first_error(&self) -> Option<RawApiError> {
        self.errors
            .first()
            .map(|e| RawApiError::with_code(e.code.to_string(), e.message.clone()))
    }
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    total_count: u32,
}

// ============ Zone ============

#[derive(Debug, Deserialize)]
pub struct CfZone {
    pub id: String,
    pub name: String,
    /// `active` / `pending` / `initializing` / `moved`
    status: String,
}

impl From<CfZone> for ProviderZone {
    fn from(zone: CfZone) -> Self {
        let status = match zone.status.as_str() {
            "active" => ZoneStatus::Active,
            "pending" | "initializing" => ZoneStatus::Pending,
            // NS 已迁走
            "moved" => ZoneStatus::Paused,
            _ => ZoneStatus::Unknown,
        };
        Self {
            id: zone.id,
            name: zone.name,
            status,
            record_count: None,
        }
    }
}

// ============ Record ============

/// DNS record as returned by the API. Names are fully qualified.
#[derive(Debug, Deserialize)]
pub struct CfRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub name: String,
    #[serde(default)]
    pub content: String,
    pub ttl: u32,
    pub priority: Option<u16>,
    /// 仅 SRV / CAA 有意义，其他类型可能是任意结构
    data: Option<serde_json::Value>,
}

impl CfRecord {
    /// SRV / CAA payload from `data`; `None` means read `content` instead.
    pub fn structured(&self) -> Option<RecordData> {
        let data = self.data.clone()?;
        serde_json::from_value::<StructuredData>(data)
            .ok()
            .map(RecordData::from)
    }
}

/// Structured `data` for the types Cloudflare does not flatten into `content`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum StructuredData {
    Srv {
        priority: u16,
        weight: u16,
        port: u16,
        target: String,
    },
    Caa {
        flags: u8,
        tag: String,
        value: String,
    },
}

impl From<StructuredData> for RecordData {
    fn from(data: StructuredData) -> Self {
        match data {
            StructuredData::Srv {
                priority,
                weight,
                port,
                target,
            } => Self::SRV {
                priority,
                weight,
                port,
                target,
            },
            StructuredData::Caa { flags, tag, value } => Self::CAA { flags, tag, value },
        }
    }
}

/// Create / update body.
#[derive(Debug, Serialize)]
pub struct RecordBody {
    #[serde(rename = "type")]
    pub record_type: &'static str,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub ttl: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<StructuredData>,
}

impl RecordBody {
    /// SRV and CAA go in `data`; every other type is flat `content` (+ MX priority).
    pub fn new(zone: &str, spec: &RecordSpec) -> Self {
        let structured = match &spec.data {
            RecordData::SRV {
                priority,
                weight,
                port,
                target,
            } => Some(StructuredData::Srv {
                priority: *priority,
                weight: *weight,
                port: *port,
                target: target.clone(),
            }),
            RecordData::CAA { flags, tag, value } => Some(StructuredData::Caa {
                flags: *flags,
                tag: tag.clone(),
                value: value.clone(),
            }),
            _ => None,
        };
        let (content, priority) = match structured {
            Some(_) => (None, None),
            None => (Some(spec.data.value()), spec.data.priority()),
        };

        Self {
            record_type: spec.data.record_type().as_str(),
            name: relative_to_full_name(&spec.name, zone),
            content,
            ttl: spec.ttl,
            priority,
            data: structured,
        }
    }
}
