//! Startup: discovery and accessory construction
//!
//! Discovery failures never abort startup; they only mean no accessory.

use std::sync::Arc;

use super::accessory::{HarmonyAccessory, SKIP_DEBOUNCE};
use super::discovery::{fetch_activities, fetch_hub_info, http_client, visible_activities};
use super::orchestrator::{CommandOrchestrator, RetryPolicy};
use super::refresher::BackgroundRefresher;
use super::state::ActivityStateCache;
use super::switches::ActivitySwitchSet;
use super::transport::{HubSession, WsTransport};
use crate::config::{HubConfig, PlatformConfig};
use crate::error::HubError;
use crate::models::HubInfo;

pub struct HarmonyPlatform {
    hub: HubConfig,
    platform: PlatformConfig,
}

impl HarmonyPlatform {
    pub fn new(hub: HubConfig, platform: PlatformConfig) -> Self {
        Self { hub, platform }
    }

    /// Discover the hub and build its accessory. Returns an empty list when the
    /// hub cannot be reached or answers with something unusable.
    pub async fn accessories(&self) -> Vec<Arc<HarmonyAccessory>> {
        tracing::info!("[Discovery] Loading activities from {}...", self.hub.ip);

        match self.discover().await {
            Ok(accessory) => vec![accessory],
            Err(e) => {
                tracing::error!(
                    "[Discovery] No configuration from hub, check IP and connectivity: {}",
                    e
                );
                Vec::new()
            }
        }
    }

    async fn discover(&self) -> Result<Arc<HarmonyAccessory>, HubError> {
        let http = http_client()?;
        let info = fetch_hub_info(&http, &self.hub.ip, self.hub.port).await?;
        tracing::info!(
            "[Discovery] Found hub '{}' (remote id {}, domain {})",
            info.friendly_name,
            info.remote_id,
            info.domain
        );

        let transport = Arc::new(WsTransport::new(&info.ws_url()));
        let session = Arc::new(HubSession::new(&info.remote_id, transport));

        self.build_accessory(info, session).await
    }

    /// Fetch the activity list over `session` and wire up the accessory
    pub async fn build_accessory(
        &self,
        info: HubInfo,
        session: Arc<HubSession>,
    ) -> Result<Arc<HarmonyAccessory>, HubError> {
        let activities = fetch_activities(&session).await?;
        let activities = visible_activities(activities, self.platform.show_turn_off_activity);

        let switches = Arc::new(ActivitySwitchSet::new(&activities, self.platform.dev_mode));
        for switch in switches.snapshot().await {
            tracing::info!("[Discovery] Discovered activity: {}", switch.name);
        }

        let cache = Arc::new(ActivityStateCache::new(session.clone()));
        let refresher = Arc::new(BackgroundRefresher::new(
            self.platform.refresh_interval(),
            cache.clone(),
            switches.clone(),
        ));
        let orchestrator = Arc::new(CommandOrchestrator::new(
            session,
            cache.clone(),
            switches.clone(),
            refresher.clone(),
            RetryPolicy::default(),
        ));

        let accessory = Arc::new(HarmonyAccessory::new(
            &self.hub.name,
            info,
            switches,
            cache,
            orchestrator,
            refresher.clone(),
            self.platform.skipped_if_same_state_activities.clone(),
            SKIP_DEBOUNCE,
        ));

        refresher.start().await;
        Ok(accessory)
    }
}
