//! Discovery orchestration
//!
//! Correlates MCTP endpoint announcements with physical inventory and keeps
//! the drive map in step: qualifying endpoints get a drive state machine,
//! removed endpoints get retired, and inventory updates flow into location
//! and form-factor properties. Signals are debounced so a burst of
//! interface-added notifications costs one rescan.

use crate::bus::{DiscoverySignal, EventLog, ObjectServer, SystemBus};
use crate::config::InventoryConfig;
use crate::drive::NvmeDrive;
use crate::protocol::NVME_MI_MSGTYPE_NVME;
use crate::transport::MiRoot;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, error, info, warn};

/// Quiet period between a trigger signal and the rescan it causes.
pub const DEBOUNCE_DELAY: Duration = Duration::from_secs(1);

/// Grace period before initializing freshly created drives, giving the MI
/// worker time to come up.
pub const WORKER_SETTLE_DELAY: Duration = Duration::from_secs(2);

pub struct DriveManager {
    bus: Arc<dyn SystemBus>,
    objects: Arc<dyn ObjectServer>,
    events: Arc<dyn EventLog>,
    root: Arc<MiRoot>,
    config: InventoryConfig,
    drives: Mutex<HashMap<u8, Arc<NvmeDrive>>>,
}

impl DriveManager {
    pub fn new<B>(
        bus: Arc<B>,
        events: Arc<dyn EventLog>,
        root: Arc<MiRoot>,
        config: InventoryConfig,
    ) -> Arc<Self>
    where
        B: SystemBus + 'static,
    {
        Arc::new(Self {
            objects: bus.clone(),
            bus,
            events,
            root,
            config,
            drives: Mutex::new(HashMap::new()),
        })
    }

    /// Snapshot of the managed drives.
    pub fn drives(&self) -> Vec<Arc<NvmeDrive>> {
        self.drives.lock().values().cloned().collect()
    }

    pub fn drive(&self, eid: u8) -> Option<Arc<NvmeDrive>> {
        self.drives.lock().get(&eid).cloned()
    }

    // =========================================================================
    // Signal Loop
    // =========================================================================

    /// Run the initial scan, then service discovery signals until the bus
    /// subscription ends.
    pub async fn run(self: Arc<Self>) {
        let mut signals = self.bus.subscribe();
        self.rescan().await;

        let mut deadline: Option<Instant> = None;
        loop {
            let debounce = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                signal = signals.recv() => match signal {
                    None => {
                        info!("discovery signal stream closed");
                        return;
                    }
                    Some(DiscoverySignal::EndpointsRemoved { eid }) => {
                        // Removal is immediate and cancels a pending rescan.
                        deadline = None;
                        self.remove_drive(eid);
                    }
                    Some(signal) => {
                        debug!(?signal, "discovery signal, arming rescan");
                        deadline = Some(Instant::now() + DEBOUNCE_DELAY);
                    }
                },
                _ = debounce => {
                    deadline = None;
                    self.rescan().await;
                }
            }
        }
    }

    // =========================================================================
    // Rescan
    // =========================================================================

    /// Full pass over endpoints and inventory.
    pub async fn rescan(&self) {
        let endpoints = match self.bus.mctp_endpoints().await {
            Ok(endpoints) => endpoints,
            Err(err) => {
                error!(%err, "MCTP endpoint enumeration failed");
                return;
            }
        };

        for endpoint in endpoints {
            if !endpoint
                .message_types
                .contains(&(NVME_MI_MSGTYPE_NVME & 0x7F))
            {
                debug!(
                    eid = endpoint.eid,
                    "endpoint does not speak NVMe-MI, skipping"
                );
                continue;
            }
            if self.drives.lock().contains_key(&endpoint.eid) {
                debug!(eid = endpoint.eid, "drive already managed");
                continue;
            }

            // The MI library expects a NUL-terminated socket name.
            let mut address = endpoint.address.clone();
            address.push(0);

            match NvmeDrive::new(
                &self.root,
                self.objects.clone(),
                self.events.clone(),
                endpoint.eid,
                endpoint.i2c_bus,
                address,
            ) {
                Ok(drive) => {
                    info!(eid = endpoint.eid, "drive added");
                    self.apply_config(&drive);
                    self.drives.lock().insert(endpoint.eid, drive);
                }
                Err(err) => {
                    error!(eid = endpoint.eid, %err, "failed to construct drive");
                }
            }
        }

        self.apply_inventory().await;

        // Let the worker come up before the first command lands on it.
        sleep(WORKER_SETTLE_DELAY).await;
        let drives = self.drives();
        for drive in drives {
            drive.initialize().await;
        }
    }

    /// Seed location and form factor from the static configuration file.
    fn apply_config(&self, drive: &Arc<NvmeDrive>) {
        let Some(entry) = self.config.entry(drive.eid()) else {
            return;
        };
        if let Some(location) = &entry.location {
            drive.update_location(location);
        }
        if let Some(form_factor) = &entry.form_factor {
            drive.update_form_factor(form_factor);
        }
    }

    /// Match inventory records against drives by I2C bus number.
    async fn apply_inventory(&self) {
        let records = match self.bus.nvme_inventory().await {
            Ok(records) => records,
            Err(err) => {
                warn!(%err, "inventory enumeration failed");
                return;
            }
        };

        let drives = self.drives();
        for record in records {
            let Some(bus_number) = record.i2c_bus else {
                continue;
            };
            for drive in &drives {
                if drive.i2c_bus() != Some(bus_number) {
                    continue;
                }
                if let Some(location) = &record.location_code {
                    drive.update_location(location);
                }
                if let Some(form_factor) = &record.form_factor {
                    drive.update_form_factor(form_factor);
                }
            }
        }
    }

    // =========================================================================
    // Removal
    // =========================================================================

    /// Retire the drive whose endpoint went away. Dropping the record cancels
    /// its poll timer, closes the MI session, and unpublishes the object.
    pub fn remove_drive(&self, eid: u8) {
        if self.drives.lock().remove(&eid).is_some() {
            info!(eid, "drive removed");
        } else {
            debug!(eid, "removal for unmanaged EID ignored");
        }
    }
}
