//! In-memory bus implementation
//!
//! Implements the full bus surface against process-local state: an object
//! and property store, a signal hub, endpoint and inventory tables, and an
//! event-record sink. Integration tests and the standalone binary run the
//! daemon against this instead of a live bus.

use super::events::Severity;
use super::{
    DiscoverySignal, DriveControl, EndpointRecord, EventLog, InventoryRecord, ObjectServer,
    SystemBus, Value,
};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// One event record accepted by the local log sink.
#[derive(Debug, Clone)]
pub struct LoggedEvent {
    pub message_id: String,
    pub severity: Severity,
    pub additional_data: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct LocalBus {
    properties: Mutex<HashMap<String, HashMap<(String, String), Value>>>,
    controls: Mutex<HashMap<String, Arc<dyn DriveControl>>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<DiscoverySignal>>>,
    endpoints: Mutex<Vec<EndpointRecord>>,
    inventory: Mutex<Vec<InventoryRecord>>,
    events: Mutex<Vec<LoggedEvent>>,
    property_writes: std::sync::atomic::AtomicUsize,
}

impl LocalBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // =========================================================================
    // Test / Embedding Surface
    // =========================================================================

    /// Add an endpoint record and raise the endpoints-added signal.
    pub fn add_endpoint(&self, record: EndpointRecord) {
        self.endpoints.lock().push(record);
        self.emit(DiscoverySignal::EndpointsAdded);
    }

    /// Drop the endpoint with `eid` and raise the endpoints-removed signal.
    pub fn remove_endpoint(&self, eid: u8) {
        self.endpoints.lock().retain(|ep| ep.eid != eid);
        self.emit(DiscoverySignal::EndpointsRemoved { eid });
    }

    /// Add an inventory record and raise the inventory-added signal.
    pub fn add_inventory(&self, record: InventoryRecord) {
        self.inventory.lock().push(record);
        self.emit(DiscoverySignal::InventoryAdded);
    }

    /// Read back a published property.
    pub fn property(&self, path: &str, interface: &str, name: &str) -> Option<Value> {
        self.properties
            .lock()
            .get(path)?
            .get(&(interface.to_string(), name.to_string()))
            .cloned()
    }

    /// Paths of every registered object.
    pub fn object_paths(&self) -> Vec<String> {
        let mut paths: Vec<_> = self.controls.lock().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Method handler registered at `path`.
    pub fn control(&self, path: &str) -> Option<Arc<dyn DriveControl>> {
        self.controls.lock().get(path).cloned()
    }

    /// Every event record accepted so far.
    pub fn events(&self) -> Vec<LoggedEvent> {
        self.events.lock().clone()
    }

    /// Total number of property writes observed, for write-suppression
    /// assertions.
    pub fn property_write_count(&self) -> usize {
        self.property_writes.load(std::sync::atomic::Ordering::Relaxed)
    }

    fn emit(&self, signal: DiscoverySignal) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(signal.clone()).is_ok());
    }
}

impl ObjectServer for LocalBus {
    fn add_object(&self, path: &str, control: Arc<dyn DriveControl>) {
        debug!(path, "object registered");
        self.controls.lock().insert(path.to_string(), control);
        self.properties.lock().entry(path.to_string()).or_default();
    }

    fn remove_object(&self, path: &str) {
        debug!(path, "object removed");
        self.controls.lock().remove(path);
        self.properties.lock().remove(path);
    }

    fn set_property(&self, path: &str, interface: &str, name: &str, value: Value) {
        self.property_writes
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.properties
            .lock()
            .entry(path.to_string())
            .or_default()
            .insert((interface.to_string(), name.to_string()), value);
    }
}

#[async_trait]
impl SystemBus for LocalBus {
    async fn mctp_endpoints(&self) -> Result<Vec<EndpointRecord>> {
        Ok(self.endpoints.lock().clone())
    }

    async fn nvme_inventory(&self) -> Result<Vec<InventoryRecord>> {
        Ok(self.inventory.lock().clone())
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<DiscoverySignal> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }
}

impl EventLog for LocalBus {
    fn create(
        &self,
        message_id: &str,
        severity: Severity,
        additional_data: BTreeMap<String, String>,
    ) {
        self.events.lock().push(LoggedEvent {
            message_id: message_id.to_string(),
            severity,
            additional_data,
            created_at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::state::{EraseMethod, ExternalFault};

    struct NoopControl;

    #[async_trait]
    impl DriveControl for NoopControl {
        async fn erase(&self, _passes: u16, _method: EraseMethod) -> Result<()> {
            Ok(())
        }

        fn set_external_fault(&self, _fault: ExternalFault, _asserted: bool) {}
    }

    #[tokio::test]
    async fn test_property_store_round_trip() {
        let bus = LocalBus::new();
        bus.add_object("/a/b", Arc::new(NoopControl));
        bus.set_property("/a/b", "iface.X", "P", Value::U8(42));
        assert_eq!(bus.property("/a/b", "iface.X", "P"), Some(Value::U8(42)));
        bus.remove_object("/a/b");
        assert_eq!(bus.property("/a/b", "iface.X", "P"), None);
    }

    #[tokio::test]
    async fn test_signals_reach_every_subscriber() {
        let bus = LocalBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        bus.remove_endpoint(4);
        assert_eq!(
            rx1.recv().await,
            Some(DiscoverySignal::EndpointsRemoved { eid: 4 })
        );
        assert_eq!(
            rx2.recv().await,
            Some(DiscoverySignal::EndpointsRemoved { eid: 4 })
        );
    }
}
