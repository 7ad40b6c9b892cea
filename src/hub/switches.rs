//! Boolean projection of hub activities
//!
//! One switch per visible activity, plus the off switch (id -1) when it is
//! shown. After any reconciliation at most one activity switch is on, and the
//! off switch is on exactly when no activity is.

use serde::Serialize;
use tokio::sync::RwLock;

use crate::models::{Activity, ActivityId, OFF_ACTIVITY_ID};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivitySwitch {
    pub activity_id: ActivityId,
    /// Display name, also the identifier used by the skip list and the API
    pub name: String,
    pub on: bool,
}

impl ActivitySwitch {
    pub fn new(activity: &Activity, dev_mode: bool) -> Self {
        let name = if dev_mode {
            format!("DEV{}", activity.label)
        } else {
            activity.label.clone()
        };
        Self {
            activity_id: activity.id,
            name,
            on: false,
        }
    }

    pub fn is_off_switch(&self) -> bool {
        self.activity_id == OFF_ACTIVITY_ID
    }
}

/// Skip-if-same-state rule for a switch on the skip list.
///
/// The off switch only sends when it is off and asked to turn on; an "on" off
/// switch cannot be triggered again. Other switches send when the value changes.
pub fn should_send(switch: &ActivitySwitch, requested: bool) -> bool {
    if switch.is_off_switch() {
        !switch.on && requested
    } else {
        switch.on != requested
    }
}

pub struct ActivitySwitchSet {
    switches: RwLock<Vec<ActivitySwitch>>,
}

impl ActivitySwitchSet {
    pub fn new(activities: &[Activity], dev_mode: bool) -> Self {
        let switches = activities
            .iter()
            .map(|a| ActivitySwitch::new(a, dev_mode))
            .collect();
        Self {
            switches: RwLock::new(switches),
        }
    }

    pub async fn snapshot(&self) -> Vec<ActivitySwitch> {
        self.switches.read().await.clone()
    }

    pub async fn find(&self, name: &str) -> Option<ActivitySwitch> {
        self.switches
            .read()
            .await
            .iter()
            .find(|s| s.name == name)
            .cloned()
    }

    pub async fn find_by_activity(&self, activity_id: ActivityId) -> Option<ActivitySwitch> {
        self.switches
            .read()
            .await
            .iter()
            .find(|s| s.activity_id == activity_id)
            .cloned()
    }

    pub async fn value(&self, name: &str) -> Option<bool> {
        self.find(name).await.map(|s| s.on)
    }

    /// Write a switch's value, returns false if no switch has that name
    pub async fn update_value(&self, name: &str, on: bool) -> bool {
        let mut switches = self.switches.write().await;
        match switches.iter_mut().find(|s| s.name == name) {
            Some(switch) => {
                switch.on = on;
                true
            }
            None => false,
        }
    }

    pub async fn update_activity_value(&self, activity_id: ActivityId, on: bool) -> bool {
        let mut switches = self.switches.write().await;
        match switches.iter_mut().find(|s| s.activity_id == activity_id) {
            Some(switch) => {
                switch.on = on;
                true
            }
            None => false,
        }
    }

    /// Value a switch should report for a refreshed cache. Unknown state keeps the
    /// last value instead of reporting off.
    pub async fn observe(&self, name: &str, current: Option<ActivityId>) -> Option<bool> {
        let mut switches = self.switches.write().await;
        let switch = switches.iter_mut().find(|s| s.name == name)?;

        match current {
            Some(id) => {
                let on = id == switch.activity_id;
                tracing::debug!(
                    "[Switch] Got status for {} - was {} set to {}",
                    switch.name,
                    switch.on,
                    on
                );
                switch.on = on;
            }
            None => tracing::debug!(
                "[Switch] No current activity, {} keeps {}",
                switch.name,
                switch.on
            ),
        }
        Some(switch.on)
    }

    /// Apply a refreshed cache to every switch
    pub async fn apply_current(&self, current: Option<ActivityId>) {
        let Some(id) = current else {
            tracing::debug!("[Switch] No current activity, keeping switch values");
            return;
        };

        let mut switches = self.switches.write().await;
        for switch in switches.iter_mut() {
            switch.on = switch.activity_id == id;
        }
    }

    /// Bring every switch in line with a hub-confirmed activity
    pub async fn reconcile(&self, activated: ActivityId) {
        let mut switches = self.switches.write().await;

        for switch in switches.iter_mut() {
            if switch.activity_id == activated {
                tracing::info!("[Switch] {} activated", switch.name);
                switch.on = true;
            } else if switch.is_off_switch() {
                // activated is a real activity here
                if switch.on {
                    tracing::debug!("[Switch] New activity on, turning off {}", switch.name);
                }
                switch.on = false;
            } else if switch.on {
                tracing::debug!("[Switch] Switching off {}", switch.name);
                switch.on = false;
            }
        }
    }
}
