//! Event record construction
//!
//! Builds the additional-data map the logging service's `Create` method
//! expects. Only the resource-errors-detected message registry entry is
//! supported; anything else is logged and dropped before it reaches the
//! service.

use super::EventLog;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::error;

/// The single supported Redfish message registry entry.
pub const RESOURCE_ERRORS_DETECTED: &str = "ResourceEvent.1.0.ResourceErrorsDetected";

/// Logging namespace every drive event is filed under.
pub const LOG_NAMESPACE: &str = "StorageDevice";

/// Event severity, mirroring the logging service's entry levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Informational,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_bus_str(self) -> &'static str {
        match self {
            Severity::Informational => {
                "xyz.openbmc_project.Logging.Entry.Level.Informational"
            }
            Severity::Warning => "xyz.openbmc_project.Logging.Entry.Level.Warning",
            Severity::Critical => "xyz.openbmc_project.Logging.Entry.Level.Critical",
        }
    }
}

/// Origin-of-condition URI for the drive with this index.
pub fn origin_of_condition(index: u8) -> String {
    format!("/redfish/v1/Systems/System_0/Storage/1/Drives/{index}")
}

/// Submit one message-registry event.
///
/// `arg0` names the resource (drive name plus index), `arg1` carries the
/// condition text. An empty resolution or namespace is omitted from the map.
pub fn create_log_entry(
    log: &Arc<dyn EventLog>,
    message_id: &str,
    severity: Severity,
    arg0: &str,
    arg1: &str,
    resolution: &str,
    origin_of_condition: &str,
    namespace: &str,
) {
    let mut additional_data = BTreeMap::new();
    additional_data.insert("REDFISH_MESSAGE_ID".to_string(), message_id.to_string());
    additional_data.insert(
        "REDFISH_ORIGIN_OF_CONDITION".to_string(),
        origin_of_condition.to_string(),
    );

    if message_id == RESOURCE_ERRORS_DETECTED {
        additional_data.insert("REDFISH_MESSAGE_ARGS".to_string(), format!("{arg0},{arg1}"));
    } else {
        error!(message_id, "message registry entry is not recognised");
        return;
    }

    if !resolution.is_empty() {
        additional_data.insert(
            "xyz.openbmc_project.Logging.Entry.Resolution".to_string(),
            resolution.to_string(),
        );
    }
    if !namespace.is_empty() {
        additional_data.insert("namespace".to_string(), namespace.to_string());
    }

    log.create(message_id, severity, additional_data);
}
