//! Object-bus contracts
//!
//! The bus runtime itself lives outside this crate; these traits capture the
//! slices of it the daemon depends on: publishing drive objects, receiving
//! discovery signals, enumerating MCTP endpoints and physical inventory, and
//! pushing event records at the logging service. [`local::LocalBus`]
//! implements the whole surface in memory for embedding and tests.

pub mod events;
pub mod local;
pub mod projection;

use crate::drive::state::{EraseMethod, ExternalFault};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

// =============================================================================
// Well-Known Names
// =============================================================================

/// Bus name the daemon claims.
pub const BUS_NAME: &str = "xyz.openbmc_project.NVMeDevice";

/// Root path the object manager is registered at.
pub const DRIVE_ROOT_PATH: &str = "/xyz/openbmc_project/inventory/drive";

/// Root path MCTP endpoints appear under.
pub const MCTP_ROOT_PATH: &str = "/xyz/openbmc_project/mctp";

/// Interface an MCTP endpoint advertises itself with.
pub const MCTP_ENDPOINT_IFACE: &str = "xyz.openbmc_project.MCTP.Endpoint";

pub mod iface {
    //! Interfaces a drive object is published under.
    pub const ITEM: &str = "xyz.openbmc_project.Inventory.Item";
    pub const DRIVE: &str = "xyz.openbmc_project.Inventory.Item.Drive";
    pub const ASSET: &str = "xyz.openbmc_project.Inventory.Decorator.Asset";
    pub const VERSION: &str = "xyz.openbmc_project.Software.Version";
    pub const PORT: &str = "xyz.openbmc_project.Inventory.Item.Port";
    pub const HEALTH: &str = "xyz.openbmc_project.State.Decorator.Health";
    pub const OPERATIONAL_STATUS: &str = "xyz.openbmc_project.State.Decorator.OperationalStatus";
    pub const NVME_STATUS: &str = "xyz.openbmc_project.Nvme.Status";
    pub const LOCATION: &str = "xyz.openbmc_project.Inventory.Decorator.Location";
    pub const ASSOCIATIONS: &str = "xyz.openbmc_project.Association.Definitions";
    pub const PROGRESS: &str = "xyz.openbmc_project.Common.Progress";
    pub const SECURE_ERASE: &str = "xyz.openbmc_project.Nvme.SecureErase";
    pub const OPERATION: &str = "xyz.openbmc_project.Nvme.Operation";
}

// =============================================================================
// Property Values
// =============================================================================

/// Property value variants the drive projection publishes.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Str(String),
    StrList(Vec<String>),
    /// Ordered `(forward, reverse, target)` association tuples.
    Associations(Vec<(String, String, String)>),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U8(v) => Some(*v as u64),
            Value::U16(v) => Some(*v as u64),
            Value::U32(v) => Some(*v as u64),
            Value::U64(v) => Some(*v),
            _ => None,
        }
    }
}

// =============================================================================
// Discovery Records
// =============================================================================

/// An MCTP endpoint as enumerated from the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointRecord {
    pub path: String,
    pub eid: u8,
    /// Supported MCTP message types.
    pub message_types: Vec<u8>,
    /// UnixSocket address bytes; the leading byte is the family prefix and is
    /// preserved verbatim.
    pub address: Vec<u8>,
    /// I2C bus number, when the endpoint decorator carries one.
    pub i2c_bus: Option<u64>,
}

/// A physical drive bay as enumerated from inventory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InventoryRecord {
    pub path: String,
    pub location_code: Option<String>,
    pub i2c_bus: Option<u64>,
    pub form_factor: Option<String>,
}

/// Signals that trigger a discovery pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoverySignal {
    EndpointsAdded,
    EndpointsRemoved { eid: u8 },
    InventoryAdded,
}

// =============================================================================
// Drive Method Surface
// =============================================================================

/// Bus-invocable methods and writable properties of one drive object.
#[async_trait]
pub trait DriveControl: Send + Sync {
    /// `SecureErase.Erase`; fails with `NotAllowed` while an operation is in
    /// progress.
    async fn erase(&self, passes: u16, method: EraseMethod) -> Result<()>;

    /// Latch or clear one of the externally asserted fault booleans.
    fn set_external_fault(&self, fault: ExternalFault, asserted: bool);
}

// =============================================================================
// Bus Contracts
// =============================================================================

/// Object registration and property publication.
pub trait ObjectServer: Send + Sync {
    /// Register an object and its method handler at `path`.
    fn add_object(&self, path: &str, control: Arc<dyn DriveControl>);

    /// Remove the object at `path` and everything published under it.
    fn remove_object(&self, path: &str);

    /// Publish a property; emits a change signal when the value differs.
    fn set_property(&self, path: &str, interface: &str, name: &str, value: Value);
}

/// The discovery-facing slice of the bus: subtree enumeration plus the
/// signal matches on the MCTP and inventory roots.
#[async_trait]
pub trait SystemBus: ObjectServer {
    /// Enumerate objects under the MCTP root carrying endpoint properties.
    async fn mctp_endpoints(&self) -> Result<Vec<EndpointRecord>>;

    /// Enumerate inventory objects describing NVMe drive bays.
    async fn nvme_inventory(&self) -> Result<Vec<InventoryRecord>>;

    /// Subscribe to discovery trigger signals.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<DiscoverySignal>;
}

/// Sink for event records destined for the logging service.
///
/// Implementations fire and forget; a failed submission is logged, never
/// propagated into drive state.
pub trait EventLog: Send + Sync {
    fn create(
        &self,
        message_id: &str,
        severity: events::Severity,
        additional_data: std::collections::BTreeMap<String, String>,
    );
}
