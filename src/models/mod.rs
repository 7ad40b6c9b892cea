//! Data models for the Harmony Hub bridge

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Activity Models
// ============================================================================

pub type ActivityId = i64;

/// Reserved activity id meaning "all activities off"
pub const OFF_ACTIVITY_ID: ActivityId = -1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub label: String,
}

impl Activity {
    pub fn new(id: ActivityId, label: &str) -> Self {
        Self {
            id,
            label: label.to_string(),
        }
    }

    /// Parse one entry of the hub's `activity` array.
    /// The hub reports ids as strings ("-1"), numbers are accepted too.
    pub fn from_value(value: &Value) -> Option<Self> {
        let id = value.get("id").and_then(parse_activity_id)?;
        let label = value.get("label").and_then(|v| v.as_str())?;
        Some(Self::new(id, label))
    }

    pub fn is_off(&self) -> bool {
        self.id == OFF_ACTIVITY_ID
    }
}

/// Accepts `31337`, `"31337"` and `" -1 "`
pub fn parse_activity_id(value: &Value) -> Option<ActivityId> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ============================================================================
// Hub Identity
// ============================================================================

/// Hub identity obtained from discovery
#[derive(Debug, Clone, Serialize)]
pub struct HubInfo {
    pub ip: String,
    pub port: u16,
    pub friendly_name: String,
    pub remote_id: String,
    pub domain: String,
    pub email: Option<String>,
    pub account_id: Option<String>,
}

impl HubInfo {
    /// Duplex session URL
    pub fn ws_url(&self) -> String {
        format!(
            "ws://{}:{}/?domain={}&hubId={}",
            self.ip, self.port, self.domain, self.remote_id
        )
    }
}

/// Accessory information block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessoryInfo {
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
}

impl AccessoryInfo {
    pub fn for_hub(name: &str, hub: &HubInfo) -> Self {
        Self {
            name: name.to_string(),
            manufacturer: "Harmony".to_string(),
            model: "Harmony".to_string(),
            serial_number: hub.ip.clone(),
        }
    }
}

// ============================================================================
// Exchange Envelope
// ============================================================================

/// Server-side timeout hint carried by every exchange (seconds)
pub const EXCHANGE_TIMEOUT_HINT: u64 = 30;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubRequest {
    pub hub_id: String,
    pub timeout: u64,
    pub hbus: Hbus,
}

#[derive(Debug, Clone, Serialize)]
pub struct Hbus {
    pub cmd: String,
    pub id: String,
    pub params: Value,
}

impl HubRequest {
    pub fn new(hub_id: &str, cmd: &str, id: &str, params: Value) -> Self {
        Self {
            hub_id: hub_id.to_string(),
            timeout: EXCHANGE_TIMEOUT_HINT,
            hbus: Hbus {
                cmd: cmd.to_string(),
                id: id.to_string(),
                params,
            },
        }
    }

    pub fn id(&self) -> &str {
        &self.hbus.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    /// code 200 with msg "OK"
    Success,
    /// code 202 or 100, the hub is still working on something
    Busy,
    Error,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HubResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub code: Option<Value>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl HubResponse {
    pub fn code(&self) -> Option<i64> {
        self.code.as_ref().and_then(parse_activity_id)
    }

    /// Whether this reply answers the request with the given id
    pub fn answers(&self, request_id: &str) -> bool {
        match &self.id {
            Some(Value::String(s)) => s == request_id,
            Some(Value::Number(n)) => n.to_string() == request_id,
            _ => false,
        }
    }

    pub fn status(&self) -> ResponseStatus {
        match self.code() {
            Some(200) if self.msg.as_deref() == Some("OK") => ResponseStatus::Success,
            Some(202) | Some(100) => ResponseStatus::Busy,
            _ => ResponseStatus::Error,
        }
    }

    /// `data.result` of a state query, accepted on code 200 or 100
    pub fn current_activity(&self) -> Option<ActivityId> {
        match self.code() {
            Some(200) | Some(100) => self
                .data
                .as_ref()
                .and_then(|d| d.get("result"))
                .and_then(parse_activity_id),
            _ => None,
        }
    }
}
