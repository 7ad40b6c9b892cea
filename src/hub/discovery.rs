//! Hub discovery
//!
//! One HTTP POST to the hub's control endpoint yields its identity; the
//! activity list then comes from an `engine?config` exchange on the session.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::transport::HubSession;
use crate::error::HubError;
use crate::models::{Activity, HubInfo};

pub const CONFIG_CMD: &str = "vnd.logitech.harmony/vnd.logitech.harmony.engine?config";

const DISCOVERY_ORIGIN: &str = "http://localhost.nebula.myharmony.com";

#[derive(Debug, Deserialize)]
struct DiscoveryResponse {
    data: Option<DiscoveryInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiscoveryInfo {
    friendly_name: Option<String>,
    remote_id: String,
    discovery_server_uri: String,
    email: Option<String>,
    account_id: Option<String>,
}

pub fn http_client() -> Result<Client, HubError> {
    Ok(Client::builder().timeout(Duration::from_secs(10)).build()?)
}

/// Ask the hub who it is
pub async fn fetch_hub_info(http: &Client, ip: &str, port: u16) -> Result<HubInfo, HubError> {
    let url = format!("http://{}:{}/", ip, port);

    let body = json!({
        "id": 1,
        "cmd": "connect.discoveryinfo?get",
        "params": {}
    });

    let resp = http
        .post(&url)
        .header("Origin", DISCOVERY_ORIGIN)
        .header("Content-Type", "application/json")
        .header("Accept", "application/json")
        .header("Accept-Charset", "utf-8")
        .json(&body)
        .send()
        .await?;

    let status = resp.status();
    if status != reqwest::StatusCode::OK {
        return Err(HubError::Discovery(format!(
            "expected 200 from hub, got {}",
            status
        )));
    }

    let parsed: DiscoveryResponse = resp.json().await?;

    let info = parsed
        .data
        .ok_or_else(|| HubError::Discovery("no data in discovery response".to_string()))?;

    let domain = domain_of(&info.discovery_server_uri)?;

    Ok(HubInfo {
        ip: ip.to_string(),
        port,
        friendly_name: info.friendly_name.unwrap_or_default(),
        remote_id: info.remote_id,
        domain,
        email: info.email,
        account_id: info.account_id,
    })
}

fn domain_of(discovery_server_uri: &str) -> Result<String, HubError> {
    url::Url::parse(discovery_server_uri)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .ok_or_else(|| {
            HubError::Discovery(format!(
                "no hostname in discoveryServerUri '{}'",
                discovery_server_uri
            ))
        })
}

/// Fetch the hub's activity configuration
pub async fn fetch_activities(session: &HubSession) -> Result<Vec<Activity>, HubError> {
    let response = session
        .exchange(CONFIG_CMD, json!({"verb": "get", "format": "json"}))
        .await?;

    let entries = response
        .data
        .as_ref()
        .and_then(|d| d.get("activity"))
        .and_then(|a| a.as_array())
        .ok_or_else(|| HubError::Protocol("no activity list in hub config".to_string()))?;

    let mut activities = Vec::with_capacity(entries.len());
    for entry in entries {
        match Activity::from_value(entry) {
            Some(activity) => activities.push(activity),
            None => tracing::warn!("[Discovery] Skipping malformed activity: {}", entry),
        }
    }
    Ok(activities)
}

/// Activities that get a switch: everything except the off activity unless asked for
pub fn visible_activities(
    activities: Vec<Activity>,
    show_turn_off_activity: bool,
) -> Vec<Activity> {
    activities
        .into_iter()
        .filter(|a| !a.is_off() || show_turn_off_activity)
        .collect()
}
