//! Admin command surface
//!
//! Typed request methods over one MI endpoint. Every method queues a task on
//! the shared worker and resolves on the caller's reactor with exactly one
//! `(error, result)` outcome. The error discipline is uniform: an OS-level
//! library failure surfaces as [`Error::Os`], a non-zero MI response status
//! as [`Error::BadMessage`] with the fixed status string, and caller
//! precondition violations as [`Error::InvalidArgument`] without touching
//! the wire.

use crate::error::{Error, Result};
use crate::protocol::{
    self, AdminRequest, AdminResponse, Cns, FwCommitAction, FwCommitOutcome, LogPage, PortInfo,
    SanitizeAction, SanitizeArgs, SubsystemHealthStatus, TelemetryHeader,
    IDENTIFY_DATA_SIZE, MAX_MI_LENGTH, SMART_LOG_READ_SIZE, TELEMETRY_BLOCK_SIZE,
    TELEMETRY_LSP_CREATE, TELEMETRY_LSP_RETAIN,
};
use crate::transport::{CtrlId, MiEndpoint, MiTransport, MiWorker, TransportError, TransportResult};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

/// Protocol-error errno raised when a device reply cannot be decoded.
const EPROTO: i32 = 71;

/// Fixed per-LID transfer sizes for single-fetch log pages.
fn log_page_size(page: LogPage) -> u32 {
    match page {
        LogPage::Error => MAX_MI_LENGTH as u32,
        LogPage::Smart => SMART_LOG_READ_SIZE as u32,
        LogPage::FwSlot => 512,
        LogPage::ChangedNamespaces => 4096,
        LogPage::CommandEffects => 4096,
        LogPage::DeviceSelfTest => 564,
        LogPage::ReservationNotification => 64,
        LogPage::Sanitize => 512,
        // Telemetry pages are sized from their header instead.
        LogPage::TelemetryHost | LogPage::TelemetryController => TELEMETRY_BLOCK_SIZE as u32,
    }
}

/// Command surface bound to one endpoint session.
#[derive(Clone)]
pub struct MiDevice {
    worker: Arc<MiWorker>,
    endpoint: Arc<MiEndpoint>,
}

impl MiDevice {
    pub fn new(worker: Arc<MiWorker>, endpoint: Arc<MiEndpoint>) -> Self {
        Self { worker, endpoint }
    }

    pub fn eid(&self) -> u8 {
        self.endpoint.eid()
    }

    pub fn endpoint(&self) -> &Arc<MiEndpoint> {
        &self.endpoint
    }

    // =========================================================================
    // MI Commands
    // =========================================================================

    /// Enumerate the controller handles behind the endpoint.
    pub async fn scan_controllers(&self) -> Result<Vec<CtrlId>> {
        self.call("scan_controllers", |t| t.scan_controllers()).await
    }

    /// NVM Subsystem Health Status Poll.
    pub async fn subsystem_health_poll(&self) -> Result<SubsystemHealthStatus> {
        self.call("subsystem_health_poll", |t| {
            t.subsystem_health_status_poll(true)
        })
        .await
    }

    /// Walk the subsystem's ports and pick the first PCIe one.
    ///
    /// Returns a zeroed record when the subsystem reports no PCIe port, which
    /// publishes as zero link speeds.
    pub async fn pcie_port_info(&self) -> Result<PortInfo> {
        self.call("pcie_port_info", |t| {
            let info = t.read_subsystem_info()?;
            let mut port = PortInfo::default();
            for i in 0..=info.nump {
                port = t.read_port_info(i)?;
                if port.is_pcie() {
                    break;
                }
            }
            Ok(port)
        })
        .await
    }

    // =========================================================================
    // Admin Commands
    // =========================================================================

    /// Admin Identify.
    ///
    /// A request for fewer than 4096 bytes goes out as a partial transfer
    /// unless the CNS is the secondary controller list, whose consumers
    /// always need the whole structure.
    pub async fn admin_identify(
        &self,
        ctrl: CtrlId,
        cns: Cns,
        nsid: u32,
        cntid: u16,
        read_length: usize,
    ) -> Result<Vec<u8>> {
        debug!(eid = self.eid(), ?cns, read_length, "identify request");
        let partial =
            read_length > 0 && read_length < IDENTIFY_DATA_SIZE && cns != Cns::SecondaryControllerList;
        self.call("admin_identify", move |t| {
            if partial {
                t.admin_identify_partial(ctrl, cns.value(), nsid, cntid, 0, read_length as u32)
            } else {
                t.admin_identify(ctrl, cns.value(), nsid, cntid)
            }
        })
        .await
    }

    /// Admin Get Log Page.
    ///
    /// Telemetry pages are fetched in two steps: the 512-byte header first,
    /// then the full size computed from `dalb3`. All other supported LIDs are
    /// one fixed-size fetch; unknown LIDs never reach the wire.
    pub async fn admin_get_log_page(
        &self,
        ctrl: CtrlId,
        page: LogPage,
        nsid: u32,
        lsp: u8,
        _lsi: u16,
    ) -> Result<Vec<u8>> {
        let create = match page {
            LogPage::TelemetryHost => match lsp {
                TELEMETRY_LSP_CREATE => true,
                TELEMETRY_LSP_RETAIN => false,
                other => {
                    return Err(Error::InvalidArgument(format!(
                        "lsp {other:#x} is not valid for the telemetry host log"
                    )))
                }
            },
            _ => false,
        };

        let lid = page.lid();
        self.call("admin_get_log_page", move |t| match page {
            LogPage::TelemetryHost | LogPage::TelemetryController => {
                fetch_telemetry(t, ctrl, lid, nsid, lsp, create)
            }
            _ => t.admin_get_log(ctrl, lid, nsid, 0, log_page_size(page), lsp, false),
        })
        .await
    }

    /// Admin Sanitize NVM. No-deallocate-after-sanitize is always requested.
    pub async fn admin_sanitize(
        &self,
        ctrl: CtrlId,
        action: SanitizeAction,
        owpass: u8,
        ovrpat: u32,
    ) -> Result<()> {
        let args = SanitizeArgs {
            action,
            owpass,
            ovrpat,
            nodas: true,
        };
        self.call("admin_sanitize", move |t| t.admin_sanitize_nvm(ctrl, &args))
            .await
    }

    /// Admin Firmware Commit.
    ///
    /// The reset-required completion statuses are successful outcomes; any
    /// other non-zero status is a [`Error::BadMessage`].
    pub async fn admin_fw_commit(
        &self,
        ctrl: CtrlId,
        action: FwCommitAction,
        slot: u8,
        bpid: bool,
    ) -> Result<FwCommitOutcome> {
        let status = self
            .call("admin_fw_commit", move |t| {
                t.admin_fw_commit(ctrl, action, slot, bpid)
            })
            .await?;
        FwCommitOutcome::from_status(status).ok_or_else(|| {
            let msg = protocol::status_to_string(status);
            error!(
                eid = self.eid(),
                status, msg, "firmware commit rejected"
            );
            Error::BadMessage(msg.to_string())
        })
    }

    /// Admin Security Send.
    pub async fn admin_security_send(
        &self,
        ctrl: CtrlId,
        proto: u8,
        proto_specific: u16,
        data: Vec<u8>,
    ) -> Result<i32> {
        self.call("admin_security_send", move |t| {
            t.admin_security_send(ctrl, proto, proto_specific, &data)
        })
        .await
    }

    /// Admin Security Receive.
    pub async fn admin_security_receive(
        &self,
        ctrl: CtrlId,
        proto: u8,
        proto_specific: u16,
        transfer_length: u32,
    ) -> Result<(i32, Vec<u8>)> {
        if transfer_length as usize > MAX_MI_LENGTH {
            return Err(Error::InvalidArgument(format!(
                "security receive length {transfer_length} exceeds {MAX_MI_LENGTH}"
            )));
        }
        let (status, data) = self
            .call("admin_security_receive", move |t| {
                t.admin_security_receive(ctrl, proto, proto_specific, transfer_length)
            })
            .await?;
        if data.len() > MAX_MI_LENGTH {
            error!(
                eid = self.eid(),
                len = data.len(),
                "security receive returned excess data"
            );
            return Err(Error::Os(EPROTO));
        }
        Ok((status, data))
    }

    /// Raw admin transfer with a caller-specified timeout.
    ///
    /// The endpoint timeout is swapped for the duration of this one call and
    /// restored before any later task runs. The response status field is the
    /// caller's to interpret.
    pub async fn admin_xfer(
        &self,
        ctrl: CtrlId,
        request: AdminRequest,
        payload: Vec<u8>,
        timeout_ms: u32,
    ) -> Result<(AdminResponse, Vec<u8>)> {
        self.call("admin_xfer", move |t| {
            let saved = t.timeout_ms();
            t.set_timeout_ms(timeout_ms);
            let result = t.admin_xfer(ctrl, &request, &payload);
            t.set_timeout_ms(saved);
            result
        })
        .await
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Queue `f` on the worker and await its completion on this reactor.
    async fn call<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn MiTransport) -> TransportResult<T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let endpoint = self.endpoint.clone();
        let submitted = self.worker.submit(Box::new(move || {
            let result = endpoint.with_transport(f);
            // The receiver may be gone if the drive was destroyed while the
            // command was in flight; dropping the completion is harmless.
            let _ = tx.send(result);
        }));
        if let Err(err) = submitted {
            warn!(eid = self.eid(), op, "MI worker rejected task");
            return Err(err);
        }
        match rx.await {
            Ok(result) => result.map_err(|e| self.translate(op, e)),
            Err(_) => Err(Error::NoSuchDevice),
        }
    }

    fn translate(&self, op: &'static str, err: TransportError) -> Error {
        let addr = self.endpoint.display_address();
        let eid = self.eid();
        match err {
            TransportError::Errno(errno) => {
                error!(%addr, eid, op, errno, "MI command failed");
                Error::Os(errno)
            }
            TransportError::Status(status) => {
                let msg = protocol::status_to_string(status);
                error!(%addr, eid, op, status, msg, "MI command rejected");
                Error::BadMessage(msg.to_string())
            }
            TransportError::TimedOut => {
                warn!(%addr, eid, op, "MI command timed out");
                Error::Timeout
            }
        }
    }
}

/// Telemetry two-step fetch, running entirely within one worker task.
fn fetch_telemetry(
    t: &mut dyn MiTransport,
    ctrl: CtrlId,
    lid: u8,
    nsid: u32,
    lsp: u8,
    create: bool,
) -> TransportResult<Vec<u8>> {
    let header_bytes = t.admin_get_log(ctrl, lid, nsid, 0, TELEMETRY_BLOCK_SIZE as u32, lsp, false)?;
    // A create request only initiates the capture; callers retain afterwards.
    if create {
        return Ok(header_bytes);
    }
    let header = TelemetryHeader::decode(&header_bytes).ok_or(TransportError::Errno(EPROTO))?;
    t.admin_get_log(
        ctrl,
        lid,
        nsid,
        0,
        header.total_size() as u32,
        lsp,
        false,
    )
}
