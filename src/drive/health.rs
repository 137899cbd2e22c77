//! Health evaluation
//!
//! Fuses the periodic subsystem health poll, the SMART critical-warning
//! byte, and the externally asserted faults into one verdict. Events are
//! de-duplicated by latching the last warning byte that generated them: a
//! byte equal to the stored value writes nothing and emits nothing.

use super::state::{Health, OperationalState};
use super::NvmeDrive;
use crate::bus::events::{
    create_log_entry, origin_of_condition, Severity, LOG_NAMESPACE, RESOURCE_ERRORS_DETECTED,
};
use crate::protocol::SubsystemHealthStatus;
use tracing::{debug, info, warn};

// =============================================================================
// SMART Critical Warning Bits
// =============================================================================

pub const SMART_SPARE: u8 = 1 << 0;
pub const SMART_TEMPERATURE: u8 = 1 << 1;
pub const SMART_DEGRADED: u8 = 1 << 2;
pub const SMART_MEDIA: u8 = 1 << 3;
pub const SMART_VOLATILE_BACKUP: u8 = 1 << 4;
pub const SMART_PMR_RO: u8 = 1 << 5;

/// Condition text per critical-warning bit, in bit order.
const SMART_WARNING_EVENTS: [(u8, &str); 6] = [
    (
        SMART_SPARE,
        "available spare capacity has fallen below the threshold",
    ),
    (SMART_TEMPERATURE, "temperature is over or under the threshold"),
    (SMART_DEGRADED, "NVM subsystem reliability has been degraded"),
    (SMART_MEDIA, "all of the media has been placed in read only mode"),
    (
        SMART_VOLATILE_BACKUP,
        "volatile memory backup device has failed",
    ),
    (
        SMART_PMR_RO,
        "Persistent Memory Region has become read-only or unreliable",
    ),
];

/// Resolution attached to SMART warning events.
const SMART_WARNING_RESOLUTION: &str =
    "Check the drive's SMART data and replace the drive if the condition persists.";

/// Resolution attached to the drive-failure event.
pub const DRIVE_FAILURE_RESOLUTION: &str =
    "Power cycle the drive. If the failure persists, replace the drive.";

/// Resource name prefix for event arguments.
const DRIVE_NAME_PREFIX: &str = "Drive_";

/// Media life remaining from a drive-life-used reading, clamped to [0, 100].
pub fn predicted_life_left(pdlu: u8) -> u8 {
    100 - pdlu.min(100)
}

impl NvmeDrive {
    // =========================================================================
    // Subsystem Health Poll
    // =========================================================================

    /// Fold one subsystem health record into the model.
    pub(crate) fn apply_health_poll(&self, status: &SubsystemHealthStatus) {
        debug!(
            eid = self.eid,
            nss = status.nss,
            ctemp = status.ctemp,
            pdlu = status.pdlu,
            "subsystem health poll"
        );
        self.object.set_drive_life_used(status.pdlu);
        self.object
            .set_predicted_media_life_left(predicted_life_left(status.pdlu));
        self.mark_functional(status.drive_functional());
    }

    /// Track the drive-functional bit; each true→false transition produces
    /// exactly one Critical event.
    pub(crate) fn mark_functional(&self, functional: bool) {
        let changed = {
            let mut state = self.state.lock();
            if state.functional == functional {
                false
            } else {
                state.functional = functional;
                state.health = if functional { Health::Ok } else { Health::Critical };
                true
            }
        };
        if !changed {
            return;
        }

        if functional {
            self.object.set_functional(true);
            self.object.set_operational_state(OperationalState::None);
            self.object.set_health(Health::Ok);
            info!(eid = self.eid, "drive functional");
        } else {
            self.object.set_functional(false);
            self.object.set_operational_state(OperationalState::Fault);
            self.object.set_health(Health::Critical);
            warn!(eid = self.eid, "drive reports non-functional");
            self.emit_event(Severity::Critical, "Drive Failure", DRIVE_FAILURE_RESOLUTION);
        }
    }

    // =========================================================================
    // SMART Critical Warning
    // =========================================================================

    /// Evaluate a SMART critical-warning byte combined with the latched
    /// external faults.
    ///
    /// The stored byte is only rewritten after events for the change have
    /// been generated, so each distinct transition emits at most once.
    pub(crate) fn evaluate_smart(&self, critical_warning: u8) {
        let (combined, previous, functional) = {
            let state = self.state.lock();
            (
                critical_warning | state.external.as_smart_bits(),
                state.smart_warning,
                state.functional,
            )
        };
        if combined == previous {
            return;
        }

        self.object.set_backup_device_fault(combined & SMART_VOLATILE_BACKUP != 0);
        self.object.set_capacity_fault(combined & SMART_SPARE != 0);
        self.object.set_temperature_fault(combined & SMART_TEMPERATURE != 0);
        self.object.set_degrades_fault(combined & SMART_DEGRADED != 0);
        self.object.set_media_fault(combined & SMART_MEDIA != 0);
        self.object.set_smart_warnings(combined);

        // A non-functional drive stays Critical regardless of the warnings.
        if functional {
            let health = if combined != 0 { Health::Warning } else { Health::Ok };
            self.state.lock().health = health;
            self.object.set_health(health);
        }

        let newly_set = combined & !previous;
        for (bit, message) in SMART_WARNING_EVENTS {
            if newly_set & bit != 0 {
                warn!(eid = self.eid, bit, message, "SMART warning raised");
                self.emit_event(Severity::Warning, message, SMART_WARNING_RESOLUTION);
            }
        }

        self.state.lock().smart_warning = combined;
    }

    fn emit_event(&self, severity: Severity, message: &str, resolution: &str) {
        create_log_entry(
            &self.events,
            RESOURCE_ERRORS_DETECTED,
            severity,
            &format!("{DRIVE_NAME_PREFIX}{}", self.eid),
            message,
            resolution,
            &origin_of_condition(self.eid),
            LOG_NAMESPACE,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicted_life_left_clamps() {
        assert_eq!(predicted_life_left(0), 100);
        assert_eq!(predicted_life_left(40), 60);
        assert_eq!(predicted_life_left(100), 0);
        for pdlu in 100..=255u8 {
            assert_eq!(predicted_life_left(pdlu as u8), 0);
        }
    }

    #[test]
    fn test_warning_table_covers_every_bit_once() {
        let mut seen = 0u8;
        for (bit, _) in SMART_WARNING_EVENTS {
            assert_eq!(seen & bit, 0);
            seen |= bit;
        }
        assert_eq!(seen, 0x3F);
    }
}
