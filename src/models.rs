//! Typed views of QuickBuild REST payloads.
//!
//! QuickBuild answers list endpoints with either an array or a single object,
//! and fields are frequently missing. Parsing is lenient about absence and
//! strict about malformed values.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use serde_json::{Map, Value};

use crate::error::QuickBuildError;

pub type Timestamp = DateTime<FixedOffset>;

/// A build configuration node.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub id: String,
    pub name: String,
    pub description: String,
    pub parent_id: Option<String>,
    pub enabled: bool,
}

/// A single build of a configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Build {
    pub id: String,
    pub configuration_id: String,
    pub version: String,
    pub status: String,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    pub success: bool,
}

/// A grid node (build agent).
#[derive(Debug, Clone, PartialEq)]
pub struct Agent {
    pub name: String,
    pub status: String,
    pub last_contact: Option<Timestamp>,
    pub ip_address: String,
    pub port: u16,
}

/// An SCM change included in a build.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub revision: String,
    pub author: String,
    pub message: String,
    pub timestamp: Option<Timestamp>,
    pub files: Vec<String>,
}

impl Configuration {
    pub fn from_json(value: &Value) -> Result<Self, QuickBuildError> {
        let obj = as_object(value, "configuration")?;
        Ok(Self {
            id: string_field(obj, "id"),
            name: string_field(obj, "name"),
            description: string_field(obj, "description"),
            parent_id: optional_string(obj, "parentId"),
            enabled: obj.get("enabled").and_then(Value::as_bool).unwrap_or(true),
        })
    }
}

impl Build {
    pub fn from_json(value: &Value, configuration_id: &str) -> Result<Self, QuickBuildError> {
        let obj = as_object(value, "build")?;
        let status = string_field(obj, "status");
        Ok(Self {
            id: string_field(obj, "id"),
            configuration_id: configuration_id.to_string(),
            version: string_field(obj, "version"),
            success: status.eq_ignore_ascii_case("successful"),
            status,
            start_time: timestamp_field(obj, "startTime")?,
            end_time: timestamp_field(obj, "endTime")?,
        })
    }
}

impl Agent {
    pub fn from_json(value: &Value) -> Result<Self, QuickBuildError> {
        let obj = as_object(value, "agent")?;
        let status = match obj.get("status") {
            None | Some(Value::Null) => "unknown".to_string(),
            Some(v) => value_to_string(v),
        };
        Ok(Self {
            name: string_field(obj, "name"),
            status,
            last_contact: timestamp_field(obj, "lastContact")?,
            ip_address: string_field(obj, "ipAddress"),
            port: port_field(obj, "port")?,
        })
    }

    pub fn is_online(&self) -> bool {
        self.status.eq_ignore_ascii_case("online")
    }

    pub fn is_offline(&self) -> bool {
        self.status.eq_ignore_ascii_case("offline")
    }
}

impl Change {
    pub fn from_json(value: &Value) -> Result<Self, QuickBuildError> {
        let obj = as_object(value, "change")?;
        let files = match obj.get("files") {
            Some(Value::Array(items)) => items.iter().map(value_to_string).collect(),
            None | Some(Value::Null) => Vec::new(),
            Some(other) => {
                return Err(QuickBuildError::InvalidResponse(format!(
                    "change files must be a list, got {other}"
                )))
            }
        };
        Ok(Self {
            revision: string_field(obj, "revision"),
            author: string_field(obj, "author"),
            message: string_field(obj, "message"),
            timestamp: timestamp_field(obj, "timestamp")?,
            files,
        })
    }
}

/// Split a payload into its records.
///
/// Arrays yield their elements, a single object yields itself, and `null`
/// or an empty object (an empty response body) yields nothing.
pub fn records(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        Value::Object(map) if map.is_empty() => Vec::new(),
        other => vec![other],
    }
}

pub fn parse_configurations(value: &Value) -> Result<Vec<Configuration>, QuickBuildError> {
    records(value).into_iter().map(Configuration::from_json).collect()
}

pub fn parse_agents(value: &Value) -> Result<Vec<Agent>, QuickBuildError> {
    records(value).into_iter().map(Agent::from_json).collect()
}

pub fn parse_changes(value: &Value) -> Result<Vec<Change>, QuickBuildError> {
    records(value).into_iter().map(Change::from_json).collect()
}

/// The first build in the payload, if any.
pub fn parse_latest_build(
    value: &Value,
    configuration_id: &str,
) -> Result<Option<Build>, QuickBuildError> {
    match records(value).first() {
        Some(first) => Build::from_json(first, configuration_id).map(Some),
        None => Ok(None),
    }
}

const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse an ISO-8601 timestamp; values without an offset are taken as UTC.
///
/// Accepts RFC 3339, basic offsets (`+0000`), a space instead of `T`, and
/// bare dates (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Result<Timestamp, QuickBuildError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts);
    }
    if let Some(ts) = OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(raw, fmt).ok())
    {
        return Ok(ts);
    }

    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| QuickBuildError::InvalidResponse(format!("invalid timestamp {raw:?}")))?;
    Ok(Utc.fix().from_utc_datetime(&naive))
}

fn as_object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>, QuickBuildError> {
    value
        .as_object()
        .ok_or_else(|| QuickBuildError::InvalidResponse(format!("{what} must be an object, got {value}")))
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn string_field(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key).map(value_to_string).unwrap_or_default()
}

fn optional_string(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).map(value_to_string).filter(|s| !s.is_empty())
}

fn timestamp_field(obj: &Map<String, Value>, key: &str) -> Result<Option<Timestamp>, QuickBuildError> {
    match obj.get(key) {
        Some(Value::String(s)) if !s.is_empty() => parse_timestamp(s).map(Some),
        None | Some(Value::Null) | Some(Value::String(_)) => Ok(None),
        Some(other) => Err(QuickBuildError::InvalidResponse(format!(
            "{key} must be a timestamp string, got {other}"
        ))),
    }
}

fn port_field(obj: &Map<String, Value>, key: &str) -> Result<u16, QuickBuildError> {
    let invalid = |v: &Value| QuickBuildError::InvalidResponse(format!("{key} is not a valid port: {v}"));
    match obj.get(key) {
        None | Some(Value::Null) => Ok(0),
        Some(v @ Value::Number(n)) => n
            .as_u64()
            .and_then(|p| u16::try_from(p).ok())
            .ok_or_else(|| invalid(v)),
        Some(v @ Value::String(s)) => s.trim().parse::<u16>().map_err(|_| invalid(v)),
        Some(other) => Err(invalid(other)),
    }
}
