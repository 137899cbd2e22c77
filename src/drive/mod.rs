//! Per-drive lifecycle state machine
//!
//! One [`NvmeDrive`] per managed endpoint. The lifecycle runs
//! absent → probing → present, with polling every five seconds; a running
//! sanitize suspends health polling and is tracked through the sanitize
//! status log instead. Discovery owns creation and retirement; everything in
//! between is driven by the poll timer.

pub mod health;
pub mod state;
pub mod vendor;

use crate::bus::projection::DriveObject;
use crate::bus::{DriveControl, EventLog, ObjectServer};
use crate::commands::MiDevice;
use crate::error::{Error, Result};
use crate::protocol::{
    Cns, LogPage, SanitizeAction, SanitizeLog, SanitizeStatus, SmartLog, IDENTIFY_DATA_SIZE,
    NSID_ALL, NSID_NONE, OVERWRITE_PATTERN, SANITIZE_TIME_UNKNOWN,
};
use crate::transport::{CtrlId, MiRoot, MiWorker, NvmeIntf};
use async_trait::async_trait;
use parking_lot::Mutex;
use state::{
    EraseMethod, ExternalFault, ExternalFaults, FormFactor, Health, LocationType, Operation,
    OperationStatus, SanitizeCapabilities,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Interval between poll ticks.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Identify attempts per initialize cycle, first try included.
const IDENTIFY_MAX_ATTEMPTS: u8 = 3;

/// Sanitize duration assumed when the log reports no estimate.
const SANITIZE_FALLBACK_SECS: u32 = 1800;

/// Mutable drive model, guarded by one mutex and mutated only from the
/// reactor.
#[derive(Debug)]
struct Inner {
    present: bool,
    functional: bool,
    health: Health,
    /// Last SMART warning byte that generated events; 0xFF forces the first
    /// read to publish.
    smart_warning: u8,
    ctrl: Option<CtrlId>,
    capabilities: SanitizeCapabilities,
    nodmmas: bool,
    operation: Operation,
    op_status: Option<OperationStatus>,
    erase_method: Option<EraseMethod>,
    elapsed_secs: u32,
    progress: u8,
    external: ExternalFaults,
    location: Option<String>,
    identify_attempt: u8,
}

impl Inner {
    fn new() -> Self {
        Self {
            present: false,
            functional: false,
            health: Health::Ok,
            smart_warning: 0xFF,
            ctrl: None,
            capabilities: SanitizeCapabilities::default(),
            nodmmas: false,
            operation: Operation::None,
            op_status: None,
            erase_method: None,
            elapsed_secs: 0,
            progress: 0,
            external: ExternalFaults::default(),
            location: None,
            identify_attempt: 1,
        }
    }

    fn sanitize_running(&self) -> bool {
        self.operation == Operation::Sanitize && self.op_status == Some(OperationStatus::InProgress)
    }
}

pub struct NvmeDrive {
    eid: u8,
    i2c_bus: Option<u64>,
    intf: NvmeIntf,
    dev: MiDevice,
    object: DriveObject,
    events: Arc<dyn EventLog>,
    state: Mutex<Inner>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl NvmeDrive {
    /// Open the endpoint session and publish the initial drive object.
    ///
    /// The record starts non-present and non-functional, then immediately
    /// assumes functional so the first poll does not report a spurious
    /// Critical before any data has been read.
    pub fn new(
        root: &Arc<MiRoot>,
        bus: Arc<dyn ObjectServer>,
        events: Arc<dyn EventLog>,
        eid: u8,
        i2c_bus: Option<u64>,
        address: Vec<u8>,
    ) -> Result<Arc<Self>> {
        let endpoint = root.open_endpoint(&address, eid)?;
        let worker = MiWorker::shared();
        let dev = MiDevice::new(worker, endpoint.clone());
        let object = DriveObject::new(bus, eid);

        let drive = Arc::new(Self {
            eid,
            i2c_bus,
            intf: NvmeIntf::Mi(endpoint),
            dev,
            object,
            events,
            state: Mutex::new(Inner::new()),
            poll_task: Mutex::new(None),
        });
        drive.object.attach_control(drive.clone());

        debug!(
            eid,
            protocol = ?drive.intf.protocol(),
            "endpoint session opened"
        );

        drive.object.set_present(false);
        drive.object.set_location("", LocationType::Unknown);
        drive.object.set_associations(Vec::new());
        drive.object.set_operation(Operation::None);
        drive.mark_functional(true);
        Ok(drive)
    }

    pub fn eid(&self) -> u8 {
        self.eid
    }

    pub fn i2c_bus(&self) -> Option<u64> {
        self.i2c_bus
    }

    pub fn object_path(&self) -> &str {
        self.object.path()
    }

    /// Current health verdict.
    pub fn health(&self) -> Health {
        self.state.lock().health
    }

    /// Location code learned from inventory or configuration, if any.
    pub fn location(&self) -> Option<String> {
        self.state.lock().location.clone()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Enter probing and start the periodic poll timer.
    pub async fn initialize(self: &Arc<Self>) {
        self.ensure_polling();
        self.probe().await;
    }

    /// Scan the endpoint and, when it answers, run identify and link info.
    async fn probe(&self) {
        self.object.set_drive_kind();
        self.state.lock().identify_attempt = 1;

        let ctrls = match self.dev.scan_controllers().await {
            Ok(ctrls) => ctrls,
            Err(err) => {
                warn!(eid = self.eid, %err, "controller scan failed, re-probing on next tick");
                self.set_present(false);
                return;
            }
        };
        let Some(primary) = ctrls.last().copied() else {
            warn!(eid = self.eid, "endpoint reports no controllers, re-probing on next tick");
            self.set_present(false);
            return;
        };

        debug!(eid = self.eid, count = ctrls.len(), primary, "controllers scanned");
        self.state.lock().ctrl = Some(primary);
        self.set_present(true);

        // Identify may fail outright; the drive stays usable with link info
        // and health polling only.
        self.run_identify(primary).await;
        self.read_port_info().await;
    }

    fn set_present(&self, present: bool) {
        self.state.lock().present = present;
        self.object.set_present(present);
    }

    async fn run_identify(&self, ctrl: CtrlId) {
        loop {
            match self
                .dev
                .admin_identify(ctrl, Cns::Controller, NSID_NONE, ctrl, IDENTIFY_DATA_SIZE)
                .await
            {
                Ok(data) => {
                    self.apply_identify(&data);
                    self.state.lock().identify_attempt = 1;
                    return;
                }
                Err(err) => {
                    let attempt = {
                        let mut state = self.state.lock();
                        state.identify_attempt += 1;
                        state.identify_attempt
                    };
                    if !err.is_transient() || attempt > IDENTIFY_MAX_ATTEMPTS {
                        warn!(eid = self.eid, %err, "identify failed, giving up until next initialize");
                        self.state.lock().identify_attempt = 1;
                        return;
                    }
                    warn!(eid = self.eid, %err, attempt, "identify failed, retrying");
                }
            }
        }
    }

    fn apply_identify(&self, data: &[u8]) {
        let Some(id) = crate::protocol::IdentifyController::decode(data) else {
            warn!(eid = self.eid, len = data.len(), "short identify response");
            return;
        };

        let manufacturer = vendor::manufacturer(id.vid)
            .map(str::to_string)
            .unwrap_or_else(|| format!("0x{:04x}", id.vid));
        self.object.set_manufacturer(&manufacturer);
        self.object.set_serial_number(&id.serial);
        self.object.set_model(&id.model);
        self.object.set_version(&id.firmware);
        self.object.set_capacity(id.tnvmcap);

        let capabilities = SanitizeCapabilities {
            overwrite: id.overwrite_supported(),
            block_erase: id.block_erase_supported(),
            crypto_erase: id.crypto_erase_supported(),
        };
        self.object.set_sanitize_capabilities(&capabilities.methods());

        let mut state = self.state.lock();
        state.capabilities = capabilities;
        state.nodmmas = id.nodmmas();
        drop(state);

        info!(
            eid = self.eid,
            vid = id.vid,
            model = %id.model,
            serial = %id.serial,
            "drive identified"
        );
    }

    async fn read_port_info(&self) {
        match self.dev.pcie_port_info().await {
            Ok(port) => {
                self.object
                    .set_port_speeds(port.max_speed_gts(), port.current_speed_gts());
            }
            Err(err) => {
                warn!(eid = self.eid, %err, "PCIe port info unavailable");
            }
        }
    }

    // =========================================================================
    // Polling
    // =========================================================================

    /// Spawn the periodic poll loop once. The task holds only a weak handle:
    /// dropping the drive cancels the timer, and a tick racing destruction
    /// upgrades to nothing and exits.
    fn ensure_polling(self: &Arc<Self>) {
        let mut guard = self.poll_task.lock();
        if guard.is_some() {
            return;
        }
        let weak = Arc::downgrade(self);
        *guard = Some(tokio::spawn(async move {
            let mut tick = tokio::time::interval(POLL_INTERVAL);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The interval fires immediately; initialize already probed.
            tick.tick().await;
            loop {
                tick.tick().await;
                let Some(drive) = weak.upgrade() else {
                    return;
                };
                drive.poll_tick().await;
            }
        }));
    }

    async fn poll_tick(self: &Arc<Self>) {
        let (present, sanitizing, ctrl) = {
            let state = self.state.lock();
            (state.present, state.sanitize_running(), state.ctrl)
        };

        if !present {
            self.probe().await;
            return;
        }
        if sanitizing {
            self.poll_sanitize_status().await;
            return;
        }

        let Some(ctrl) = ctrl else {
            self.probe().await;
            return;
        };

        let (health, smart) = tokio::join!(
            self.dev.subsystem_health_poll(),
            self.dev
                .admin_get_log_page(ctrl, LogPage::Smart, NSID_ALL, 0, 0)
        );

        match health {
            Ok(status) => self.apply_health_poll(&status),
            Err(err) => debug!(eid = self.eid, %err, "health poll failed, resuming next tick"),
        }

        match smart {
            Ok(bytes) => match SmartLog::decode(&bytes) {
                Some(log) => self.evaluate_smart(log.critical_warning),
                None => warn!(eid = self.eid, len = bytes.len(), "short SMART log"),
            },
            Err(err) => debug!(eid = self.eid, %err, "SMART read failed, resuming next tick"),
        }
    }

    // =========================================================================
    // Sanitize
    // =========================================================================

    /// Start a sanitize operation from the bus method.
    async fn start_sanitize(&self, passes: u16, method: EraseMethod) -> Result<()> {
        let ctrl = {
            let state = self.state.lock();
            if state.sanitize_running() {
                return Err(Error::NotAllowed(
                    "a sanitize operation is already in progress".into(),
                ));
            }
            if !state.capabilities.supports(method) {
                info!(eid = self.eid, %method, "drive does not support requested erase method");
                return Ok(());
            }
            state.ctrl.ok_or(Error::NoSuchDevice)
        }?;

        let (action, owpass, ovrpat) = match method {
            EraseMethod::Overwrite => (SanitizeAction::StartOverwrite, passes as u8, OVERWRITE_PATTERN),
            EraseMethod::BlockErase => (SanitizeAction::StartBlockErase, 0, 0),
            EraseMethod::CryptoErase => (SanitizeAction::StartCryptoErase, 0, 0),
        };

        self.dev.admin_sanitize(ctrl, action, owpass, ovrpat).await?;

        {
            let mut state = self.state.lock();
            state.operation = Operation::Sanitize;
            state.op_status = Some(OperationStatus::InProgress);
            state.erase_method = Some(method);
            state.elapsed_secs = 0;
            state.progress = 0;
        }
        self.object.set_operation(Operation::Sanitize);
        self.object.set_progress_status(OperationStatus::InProgress);
        self.object.set_progress(0);
        info!(eid = self.eid, %method, passes, "sanitize started");
        Ok(())
    }

    async fn poll_sanitize_status(&self) {
        let Some(ctrl) = self.state.lock().ctrl else {
            return;
        };
        let bytes = match self
            .dev
            .admin_get_log_page(ctrl, LogPage::Sanitize, NSID_NONE, 0, 0)
            .await
        {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!(eid = self.eid, %err, "sanitize status read failed, retrying next tick");
                return;
            }
        };
        let Some(log) = SanitizeLog::decode(&bytes) else {
            warn!(eid = self.eid, len = bytes.len(), "short sanitize log");
            return;
        };

        match SanitizeStatus::from_sstat(log.sstat) {
            SanitizeStatus::CompleteSuccess | SanitizeStatus::NoDeallocCompleteSuccess => {
                {
                    let mut state = self.state.lock();
                    state.op_status = Some(OperationStatus::Completed);
                    state.progress = 100;
                }
                self.object.set_progress(100);
                self.object.set_progress_status(OperationStatus::Completed);
                info!(eid = self.eid, "sanitize completed");
            }
            SanitizeStatus::CompletedFailed => {
                {
                    let mut state = self.state.lock();
                    state.op_status = Some(OperationStatus::Failed);
                    state.progress = 0;
                }
                self.object.set_progress(0);
                self.object.set_progress_status(OperationStatus::Failed);
                error!(eid = self.eid, "sanitize failed");
            }
            SanitizeStatus::InProgress => {
                let progress = {
                    let mut state = self.state.lock();
                    state.elapsed_secs += POLL_INTERVAL.as_secs() as u32;
                    let method = state.erase_method.unwrap_or(EraseMethod::BlockErase);
                    let estimate = match sanitize_estimate(&log, method, state.nodmmas) {
                        SANITIZE_TIME_UNKNOWN => SANITIZE_FALLBACK_SECS,
                        0 => SANITIZE_FALLBACK_SECS,
                        secs => secs,
                    };
                    let percent =
                        ((state.elapsed_secs as u64 * 100) / estimate as u64).min(99) as u8;
                    state.progress = state.progress.max(percent);
                    state.progress
                };
                self.object.set_progress(progress);
                debug!(eid = self.eid, progress, "sanitize in progress");
            }
            SanitizeStatus::NeverSanitized | SanitizeStatus::Unknown(_) => {
                debug!(eid = self.eid, sstat = log.sstat, "sanitize status not updated yet");
            }
        }
    }

    // =========================================================================
    // Inventory Updates
    // =========================================================================

    /// Apply the location code learned from physical inventory.
    pub fn update_location(&self, code: &str) {
        if code.is_empty() {
            return;
        }
        self.state.lock().location = Some(code.to_string());
        self.object.set_location(code, LocationType::Slot);
        self.object.set_associations(vec![(
            "chassis".to_string(),
            "drive".to_string(),
            code.to_string(),
        )]);
    }

    /// Apply the form factor learned from physical inventory.
    pub fn update_form_factor(&self, form: &str) {
        match form.parse::<FormFactor>() {
            Ok(form_factor) => self.object.set_form_factor(form_factor),
            Err(()) => {
                if !form.is_empty() {
                    warn!(eid = self.eid, form, "unrecognised form factor");
                }
            }
        }
    }

}

#[async_trait]
impl DriveControl for NvmeDrive {
    async fn erase(&self, passes: u16, method: EraseMethod) -> Result<()> {
        self.start_sanitize(passes, method).await
    }

    fn set_external_fault(&self, fault: ExternalFault, asserted: bool) {
        self.state.lock().external.set(fault, asserted);
    }
}

impl Drop for NvmeDrive {
    fn drop(&mut self) {
        if let Some(task) = self.poll_task.lock().take() {
            task.abort();
        }
        debug!(eid = self.eid, "drive retired");
    }
}

/// Estimated sanitize duration for the given method, honoring whether
/// no-deallocate additionally modifies media after sanitize.
pub fn sanitize_estimate(log: &SanitizeLog, method: EraseMethod, nodmmas: bool) -> u32 {
    match (method, nodmmas) {
        (EraseMethod::CryptoErase, false) => log.etce,
        (EraseMethod::BlockErase, false) => log.etbe,
        (EraseMethod::Overwrite, false) => log.eto,
        (EraseMethod::CryptoErase, true) => log.etcend,
        (EraseMethod::BlockErase, true) => log.etbend,
        (EraseMethod::Overwrite, true) => log.etond,
    }
}
