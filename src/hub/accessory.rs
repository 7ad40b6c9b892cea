//! Harmony accessory: the switch hooks exposed to the accessory framework

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::orchestrator::CommandOrchestrator;
use super::refresher::BackgroundRefresher;
use super::state::{ActivityStateCache, CacheStatus};
use super::switches::{should_send, ActivitySwitch, ActivitySwitchSet};
use crate::error::HubError;
use crate::models::{AccessoryInfo, ActivityId, HubInfo, OFF_ACTIVITY_ID};

/// Delay before a skipped set re-asserts the previous value
pub const SKIP_DEBOUNCE: Duration = Duration::from_millis(800);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SetOutcome {
    /// A command for this activity was handed to the orchestrator
    Commanded { activity_id: ActivityId },
    /// Same state, nothing sent; the old value comes back after the debounce
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessorySnapshot {
    pub info: AccessoryInfo,
    pub hub_name: String,
    pub hub_id: String,
    pub switches: Vec<ActivitySwitch>,
    pub state: CacheStatus,
    pub refresh_paused: bool,
    pub refresh_running: bool,
}

pub struct HarmonyAccessory {
    info: AccessoryInfo,
    hub: HubInfo,
    switches: Arc<ActivitySwitchSet>,
    cache: Arc<ActivityStateCache>,
    orchestrator: Arc<CommandOrchestrator>,
    refresher: Arc<BackgroundRefresher>,
    skipped_if_same_state: Vec<String>,
    debounce: Duration,
}

impl HarmonyAccessory {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        hub: HubInfo,
        switches: Arc<ActivitySwitchSet>,
        cache: Arc<ActivityStateCache>,
        orchestrator: Arc<CommandOrchestrator>,
        refresher: Arc<BackgroundRefresher>,
        skipped_if_same_state: Vec<String>,
        debounce: Duration,
    ) -> Self {
        tracing::debug!(
            "[Switch] Controls ignored when already in the requested state: {:?}",
            skipped_if_same_state
        );
        Self {
            info: AccessoryInfo::for_hub(name, &hub),
            hub,
            switches,
            cache,
            orchestrator,
            refresher,
            skipped_if_same_state,
            debounce,
        }
    }

    pub fn info(&self) -> &AccessoryInfo {
        &self.info
    }

    pub fn refresher(&self) -> &Arc<BackgroundRefresher> {
        &self.refresher
    }

    pub async fn snapshot(&self) -> AccessorySnapshot {
        AccessorySnapshot {
            info: self.info.clone(),
            hub_name: self.hub.friendly_name.clone(),
            hub_id: self.hub.remote_id.clone(),
            switches: self.switches.snapshot().await,
            state: self.cache.status(),
            refresh_paused: self.refresher.is_paused(),
            refresh_running: self.refresher.is_running().await,
        }
    }

    /// Get hook: refresh (cached for a short window) and report whether this
    /// switch's activity is the current one. Unknown state keeps the last value.
    pub async fn get_on(&self, name: &str) -> Result<bool, HubError> {
        if self.switches.find(name).await.is_none() {
            return Err(HubError::UnknownSwitch(name.to_string()));
        }

        let current = self.cache.refresh().await;
        self.switches
            .observe(name, current)
            .await
            .ok_or_else(|| HubError::UnknownSwitch(name.to_string()))
    }

    /// Set hook: acknowledges immediately, the command itself runs in the
    /// background. Turning any switch off commands the off activity.
    pub async fn set_on(&self, name: &str, value: bool) -> Result<SetOutcome, HubError> {
        let switch = self
            .switches
            .find(name)
            .await
            .ok_or_else(|| HubError::UnknownSwitch(name.to_string()))?;

        let target = if value {
            switch.activity_id
        } else {
            OFF_ACTIVITY_ID
        };
        let previous = switch.on;

        let send = if self.skipped_if_same_state.iter().any(|s| *s == switch.name) {
            let send = should_send(&switch, value);
            tracing::debug!(
                "[Switch] {} is {}, wants {}: {}",
                switch.name,
                previous,
                value,
                if send { "sending command" } else { "no command sent" }
            );
            send
        } else {
            true
        };

        // The framework keeps the written value until told otherwise
        self.switches.update_value(name, value).await;

        if send {
            let orchestrator = Arc::clone(&self.orchestrator);
            tokio::spawn(async move {
                orchestrator.command(target).await;
            });
            Ok(SetOutcome::Commanded { activity_id: target })
        } else {
            let switches = Arc::clone(&self.switches);
            let name = name.to_string();
            let debounce = self.debounce;
            tokio::spawn(async move {
                tokio::time::sleep(debounce).await;
                switches.update_value(&name, previous).await;
            });
            Ok(SetOutcome::Skipped)
        }
    }
}
