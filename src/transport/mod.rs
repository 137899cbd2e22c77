//! MI transport layer
//!
//! The MI library is synchronous and not reentrant for a given endpoint, so
//! every call into it is funneled through one process-wide [`MiWorker`]
//! thread. [`MiEndpoint`] owns a single endpoint session and the mutex that
//! keeps concurrent submissions on that endpoint mutually exclusive; the
//! library itself sits behind the [`MiTransport`] trait so the daemon can be
//! driven against a scripted double.

mod endpoint;
pub mod mock;
mod worker;

pub use endpoint::MiEndpoint;
pub use worker::MiWorker;

use crate::error::Result;
use crate::protocol::{
    AdminRequest, AdminResponse, FwCommitAction, PortInfo, SanitizeArgs, SubsystemHealthStatus,
    SubsystemInfo,
};
use std::sync::Arc;

/// Controller handle on an MI endpoint.
pub type CtrlId = u16;

// =============================================================================
// Transport Errors
// =============================================================================

/// Failure raised by an [`MiTransport`] call.
///
/// Mirrors the MI library convention: a negative return carries the OS error
/// number, a positive return carries the protocol response status. The
/// command surface translates these into the crate error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// OS-level failure with the captured error number.
    Errno(i32),
    /// Non-zero NVMe-MI response status.
    Status(u16),
    /// The per-endpoint timeout elapsed.
    TimedOut,
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

// =============================================================================
// MI Library Contract
// =============================================================================

/// Synchronous entry points of one MI endpoint session.
///
/// Every method is invoked on the worker thread with the endpoint mutex held;
/// implementations may block on I/O for seconds.
pub trait MiTransport: Send {
    /// Enumerate controller handles behind the endpoint.
    fn scan_controllers(&mut self) -> TransportResult<Vec<CtrlId>>;

    /// Read NVMe-MI Data Structure, NVM subsystem information.
    fn read_subsystem_info(&mut self) -> TransportResult<SubsystemInfo>;

    /// Read NVMe-MI Data Structure, port information for `port`.
    fn read_port_info(&mut self, port: u8) -> TransportResult<PortInfo>;

    /// NVM Subsystem Health Status Poll; `clear` resets the changed flags.
    fn subsystem_health_status_poll(&mut self, clear: bool)
        -> TransportResult<SubsystemHealthStatus>;

    /// Admin Identify, full 4096-byte transfer.
    fn admin_identify(
        &mut self,
        ctrl: CtrlId,
        cns: u8,
        nsid: u32,
        cntid: u16,
    ) -> TransportResult<Vec<u8>>;

    /// Admin Identify, partial transfer restartable at `offset`.
    fn admin_identify_partial(
        &mut self,
        ctrl: CtrlId,
        cns: u8,
        nsid: u32,
        cntid: u16,
        offset: u32,
        len: u32,
    ) -> TransportResult<Vec<u8>>;

    /// Admin Get Log Page, one transfer of `len` bytes at `offset`.
    fn admin_get_log(
        &mut self,
        ctrl: CtrlId,
        lid: u8,
        nsid: u32,
        offset: u64,
        len: u32,
        lsp: u8,
        rae: bool,
    ) -> TransportResult<Vec<u8>>;

    /// Admin Sanitize NVM.
    fn admin_sanitize_nvm(&mut self, ctrl: CtrlId, args: &SanitizeArgs) -> TransportResult<()>;

    /// Admin Firmware Commit; yields the NVMe status field on completion.
    fn admin_fw_commit(
        &mut self,
        ctrl: CtrlId,
        action: FwCommitAction,
        slot: u8,
        bpid: bool,
    ) -> TransportResult<u16>;

    /// Admin Security Send; yields the NVMe status.
    fn admin_security_send(
        &mut self,
        ctrl: CtrlId,
        proto: u8,
        proto_specific: u16,
        data: &[u8],
    ) -> TransportResult<i32>;

    /// Admin Security Receive; yields the NVMe status and the response data.
    fn admin_security_receive(
        &mut self,
        ctrl: CtrlId,
        proto: u8,
        proto_specific: u16,
        transfer_length: u32,
    ) -> TransportResult<(i32, Vec<u8>)>;

    /// Raw admin transfer; protocol and I/O errors only, the caller
    /// interprets the response status itself.
    fn admin_xfer(
        &mut self,
        ctrl: CtrlId,
        request: &AdminRequest,
        payload: &[u8],
    ) -> TransportResult<(AdminResponse, Vec<u8>)>;

    /// Per-endpoint command timeout in milliseconds.
    fn timeout_ms(&self) -> u32;

    /// Replace the per-endpoint command timeout.
    fn set_timeout_ms(&mut self, timeout_ms: u32);
}

/// Opens endpoint sessions; the seam the MI library binding plugs into.
pub trait TransportFactory: Send + Sync {
    /// Open a session for `eid` at the given transport address. The address
    /// is the raw UnixSocket bytes with the family-prefix byte intact and a
    /// trailing NUL appended by discovery.
    fn open(&self, address: &[u8], eid: u8) -> Result<Box<dyn MiTransport>>;
}

// =============================================================================
// MI Root
// =============================================================================

/// Process-wide MI library root.
///
/// Created once at program start; all endpoint sessions borrow from it, and
/// the library handle goes away when the last clone drops at exit.
pub struct MiRoot {
    factory: Arc<dyn TransportFactory>,
}

impl MiRoot {
    pub fn new(factory: Arc<dyn TransportFactory>) -> Arc<Self> {
        Arc::new(Self { factory })
    }

    /// Open an endpoint session and bind it to the shared worker.
    pub fn open_endpoint(self: &Arc<Self>, address: &[u8], eid: u8) -> Result<Arc<MiEndpoint>> {
        let transport = self.factory.open(address, eid)?;
        Ok(MiEndpoint::new(transport, address.to_vec(), eid))
    }
}

// =============================================================================
// Transport Slot
// =============================================================================

/// Protocol spoken to a drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// NVMe-MI Basic Management Command over SMBus.
    Basic,
    /// Full NVMe-MI over MCTP.
    Mi,
}

/// Drive status block returned by the basic management command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BasicDriveStatus {
    pub status: u8,
    pub smart_warnings: u8,
    pub temp: u8,
    pub drive_life_used: u8,
    pub warning_temp: u8,
    pub power_state: u8,
}

/// Status reads shared by both transport flavors.
pub trait BasicIntf: Send + Sync {
    /// I2C bus number the device answers on.
    fn bus(&self) -> i32;
    /// I2C address of the device.
    fn addr(&self) -> i32;
    /// Read the basic status block (command/data address 00h..07h).
    fn get_status(&self) -> Result<BasicDriveStatus>;
}

/// Slot holding whichever transport a drive was constructed with.
///
/// The manager only ever instantiates the MI variant; the basic variant
/// exists for SMBus-only drives fronted by the same model.
#[derive(Clone)]
pub enum NvmeIntf {
    Basic(Arc<dyn BasicIntf>),
    Mi(Arc<MiEndpoint>),
}

impl NvmeIntf {
    pub fn protocol(&self) -> Protocol {
        match self {
            NvmeIntf::Basic(_) => Protocol::Basic,
            NvmeIntf::Mi(_) => Protocol::Mi,
        }
    }
}
