//! Drive object projection
//!
//! Publishes one drive as an object with the fixed set of property groups.
//! The projection is write-through: each setter maps a model value onto the
//! bus property it belongs to, and the object server handles change
//! signalling.

use super::{iface, DriveControl, ObjectServer, Value, DRIVE_ROOT_PATH};
use crate::drive::state::{
    EraseMethod, FormFactor, Health, LocationType, Operation, OperationStatus, OperationalState,
};
use std::sync::Arc;

/// One `(forward, reverse, target)` association tuple.
pub type Association = (String, String, String);

pub struct DriveObject {
    bus: Arc<dyn ObjectServer>,
    path: String,
    eid: u8,
}

impl DriveObject {
    pub fn new(bus: Arc<dyn ObjectServer>, eid: u8) -> Self {
        let path = format!("{DRIVE_ROOT_PATH}/{eid}");
        Self { bus, path, eid }
    }

    /// Register the object and hook up its method handler. Split from
    /// construction because the handler is the drive that owns this object.
    pub fn attach_control(&self, control: Arc<dyn DriveControl>) {
        self.bus.add_object(&self.path, control);
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn eid(&self) -> u8 {
        self.eid
    }

    fn set(&self, interface: &str, name: &str, value: Value) {
        self.bus.set_property(&self.path, interface, name, value);
    }

    // =========================================================================
    // Item / Drive
    // =========================================================================

    pub fn set_present(&self, present: bool) {
        self.set(iface::ITEM, "Present", Value::Bool(present));
    }

    /// Static drive identity: every managed endpoint is an NVMe SSD.
    pub fn set_drive_kind(&self) {
        self.set(
            iface::DRIVE,
            "Type",
            Value::Str("xyz.openbmc_project.Inventory.Item.Drive.DriveType.SSD".into()),
        );
        self.set(
            iface::DRIVE,
            "Protocol",
            Value::Str("xyz.openbmc_project.Inventory.Item.Drive.DriveProtocol.NVMe".into()),
        );
    }

    pub fn set_capacity(&self, bytes: u64) {
        self.set(iface::DRIVE, "Capacity", Value::U64(bytes));
    }

    pub fn set_predicted_media_life_left(&self, percent: u8) {
        self.set(
            iface::DRIVE,
            "PredictedMediaLifeLeftPercent",
            Value::U8(percent),
        );
    }

    pub fn set_form_factor(&self, form_factor: FormFactor) {
        self.set(
            iface::DRIVE,
            "FormFactor",
            Value::Str(form_factor.as_bus_str()),
        );
    }

    // =========================================================================
    // Asset / Version
    // =========================================================================

    pub fn set_manufacturer(&self, manufacturer: &str) {
        self.set(iface::ASSET, "Manufacturer", Value::Str(manufacturer.into()));
    }

    pub fn set_model(&self, model: &str) {
        self.set(iface::ASSET, "Model", Value::Str(model.into()));
    }

    pub fn set_serial_number(&self, serial: &str) {
        self.set(iface::ASSET, "SerialNumber", Value::Str(serial.into()));
    }

    pub fn set_version(&self, version: &str) {
        self.set(iface::VERSION, "Version", Value::Str(version.into()));
    }

    // =========================================================================
    // Port
    // =========================================================================

    pub fn set_port_speeds(&self, max_gts: u32, current_gts: u32) {
        self.set(iface::PORT, "MaxSpeed", Value::U32(max_gts));
        self.set(iface::PORT, "CurrentSpeed", Value::U32(current_gts));
    }

    // =========================================================================
    // Health / Operational Status
    // =========================================================================

    pub fn set_health(&self, health: Health) {
        self.set(iface::HEALTH, "Health", Value::Str(health.as_bus_str().into()));
    }

    pub fn set_functional(&self, functional: bool) {
        self.set(
            iface::OPERATIONAL_STATUS,
            "Functional",
            Value::Bool(functional),
        );
    }

    pub fn set_operational_state(&self, state: OperationalState) {
        self.set(
            iface::OPERATIONAL_STATUS,
            "State",
            Value::Str(state.as_bus_str().into()),
        );
    }

    // =========================================================================
    // NVMe Status
    // =========================================================================

    pub fn set_drive_life_used(&self, pdlu: u8) {
        self.set(
            iface::NVME_STATUS,
            "DriveLifeUsed",
            Value::Str(pdlu.to_string()),
        );
    }

    pub fn set_smart_warnings(&self, warning_byte: u8) {
        self.set(
            iface::NVME_STATUS,
            "SmartWarnings",
            Value::Str(warning_byte.to_string()),
        );
    }

    pub fn set_backup_device_fault(&self, fault: bool) {
        self.set(iface::NVME_STATUS, "BackupDeviceFault", Value::Bool(fault));
    }

    pub fn set_capacity_fault(&self, fault: bool) {
        self.set(iface::NVME_STATUS, "CapacityFault", Value::Bool(fault));
    }

    pub fn set_temperature_fault(&self, fault: bool) {
        self.set(iface::NVME_STATUS, "TemperatureFault", Value::Bool(fault));
    }

    pub fn set_degrades_fault(&self, fault: bool) {
        self.set(iface::NVME_STATUS, "DegradesFault", Value::Bool(fault));
    }

    pub fn set_media_fault(&self, fault: bool) {
        self.set(iface::NVME_STATUS, "MediaFault", Value::Bool(fault));
    }

    // =========================================================================
    // Location / Associations
    // =========================================================================

    pub fn set_location(&self, code: &str, location_type: LocationType) {
        self.set(iface::LOCATION, "LocationCode", Value::Str(code.into()));
        self.set(
            iface::LOCATION,
            "LocationType",
            Value::Str(location_type.as_bus_str().into()),
        );
    }

    pub fn set_associations(&self, associations: Vec<Association>) {
        self.set(
            iface::ASSOCIATIONS,
            "Associations",
            Value::Associations(associations),
        );
    }

    // =========================================================================
    // Progress / SecureErase / Operation
    // =========================================================================

    pub fn set_progress(&self, percent: u8) {
        self.set(iface::PROGRESS, "Progress", Value::U8(percent));
    }

    pub fn set_progress_status(&self, status: OperationStatus) {
        self.set(
            iface::PROGRESS,
            "Status",
            Value::Str(status.as_bus_str().into()),
        );
    }

    pub fn set_sanitize_capabilities(&self, methods: &[EraseMethod]) {
        self.set(
            iface::SECURE_ERASE,
            "SanitizeCapability",
            Value::StrList(methods.iter().map(|m| m.as_bus_str().to_string()).collect()),
        );
    }

    pub fn set_operation(&self, operation: Operation) {
        self.set(
            iface::OPERATION,
            "Operation",
            Value::Str(operation.as_bus_str().into()),
        );
    }
}

impl Drop for DriveObject {
    fn drop(&mut self) {
        self.bus.remove_object(&self.path);
    }
}
