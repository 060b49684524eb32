//! Standing notifications, raised and dismissed only on transitions.

use crate::engine::AlertSet;
use crate::ha::EntityStore;
use crate::logging::StructuredLogger;
use serde_json::json;

pub const EV_EMERGENCY_ID: &str = "wallbox_ev_emergency";
pub const GRID_ABSENT_ID: &str = "wallbox_grid_absent_battery_low";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AlertKind {
    EvEmergency,
    GridAbsentBatteryLow,
}

impl AlertKind {
    const ALL: [AlertKind; 2] = [AlertKind::EvEmergency, AlertKind::GridAbsentBatteryLow];

    fn notification_id(self) -> &'static str {
        match self {
            AlertKind::EvEmergency => EV_EMERGENCY_ID,
            AlertKind::GridAbsentBatteryLow => GRID_ABSENT_ID,
        }
    }

    fn title(self) -> &'static str {
        match self {
            AlertKind::EvEmergency => "Wallbox: EV emergency charge",
            AlertKind::GridAbsentBatteryLow => "Wallbox: grid absent, battery low",
        }
    }

    fn message(self) -> &'static str {
        match self {
            AlertKind::EvEmergency => {
                "The vehicle is below its emergency state of charge. Charging at minimum current regardless of solar production."
            }
            AlertKind::GridAbsentBatteryLow => {
                "The grid is not present and the house battery is below its floor. Charging is paused."
            }
        }
    }

    fn get(self, set: &AlertSet) -> bool {
        match self {
            AlertKind::EvEmergency => set.ev_emergency,
            AlertKind::GridAbsentBatteryLow => set.grid_absent_battery_low,
        }
    }

    fn set(self, set: &mut AlertSet, value: bool) {
        match self {
            AlertKind::EvEmergency => set.ev_emergency = value,
            AlertKind::GridAbsentBatteryLow => set.grid_absent_battery_low = value,
        }
    }
}

/// Tracks which notifications are currently raised
#[derive(Debug, Clone, Default)]
pub struct AlertTracker {
    raised: AlertSet,
}

impl AlertTracker {
    pub fn new(raised: AlertSet) -> Self {
        Self { raised }
    }

    pub fn raised(&self) -> AlertSet {
        self.raised
    }

    /// Reconcile raised notifications with this cycle's triggers.
    ///
    /// Returns true when the raised set changed. A failed call leaves the flag
    /// as it was, so the transition is attempted again next cycle.
    pub async fn sync(
        &mut self,
        store: &dyn EntityStore,
        wanted: &AlertSet,
        logger: &StructuredLogger,
    ) -> bool {
        let mut changed = false;
        for kind in AlertKind::ALL {
            let want = kind.get(wanted);
            if want == kind.get(&self.raised) {
                continue;
            }
            let result = if want {
                store
                    .call_service(
                        "persistent_notification",
                        "create",
                        json!({
                            "notification_id": kind.notification_id(),
                            "title": kind.title(),
                            "message": kind.message(),
                        }),
                    )
                    .await
            } else {
                store
                    .call_service(
                        "persistent_notification",
                        "dismiss",
                        json!({ "notification_id": kind.notification_id() }),
                    )
                    .await
            };
            match result {
                Ok(()) => {
                    kind.set(&mut self.raised, want);
                    changed = true;
                    let verb = if want { "Raised" } else { "Dismissed" };
                    logger.info(&format!("{} notification {}", verb, kind.notification_id()));
                }
                Err(e) => logger.warn(&format!(
                    "Notification {} not updated: {}",
                    kind.notification_id(),
                    e
                )),
            }
        }
        changed
    }
}
