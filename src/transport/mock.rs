//! Scripted transport double
//!
//! Stands in for the MI library in unit and integration tests: responses are
//! queued per operation and every call is recorded so tests can assert on
//! exactly which commands a poll tick issued. The last queued response is
//! sticky, so a drive that keeps polling past the scripted window keeps
//! seeing the final state.

use super::{CtrlId, MiTransport, TransportError, TransportFactory, TransportResult};
use crate::error::Result;
use crate::protocol::{
    AdminRequest, AdminResponse, FwCommitAction, PortInfo, SanitizeArgs, SanitizeLog,
    SubsystemHealthStatus, SubsystemInfo, SMART_LOG_READ_SIZE,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Errno the mock raises for any operation with no scripted response.
const ENODEV: i32 = 19;

// =============================================================================
// Call Log
// =============================================================================

/// One recorded transport invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ScanControllers,
    SubsystemInfo,
    PortInfo(u8),
    HealthPoll,
    Identify { cns: u8, partial: bool },
    GetLog { lid: u8, offset: u64, len: u32 },
    Sanitize(SanitizeArgs),
    FwCommit { action: u8, slot: u8 },
    SecuritySend { proto: u8 },
    SecurityReceive { proto: u8, len: u32 },
    AdminXfer { opcode: u8, timeout_ms: u32 },
}

// =============================================================================
// Response Script
// =============================================================================

struct Script<T: Clone>(VecDeque<T>);

impl<T: Clone> Default for Script<T> {
    fn default() -> Self {
        Self(VecDeque::new())
    }
}

impl<T: Clone> Script<T> {
    fn push(&mut self, item: T) {
        self.0.push_back(item);
    }

    /// Pop the next response; the final one repeats forever.
    fn next(&mut self) -> Option<T> {
        if self.0.len() > 1 {
            self.0.pop_front()
        } else {
            self.0.front().cloned()
        }
    }
}

// =============================================================================
// Shared Mock State
// =============================================================================

/// Scripting surface shared between a test and the transport it handed out.
#[derive(Default)]
pub struct MockState {
    scan: Mutex<Script<TransportResult<Vec<CtrlId>>>>,
    subsystem_info: Mutex<Script<TransportResult<SubsystemInfo>>>,
    ports: Mutex<Vec<PortInfo>>,
    health: Mutex<Script<TransportResult<SubsystemHealthStatus>>>,
    identify: Mutex<Script<TransportResult<Vec<u8>>>>,
    logs: Mutex<HashMap<u8, Script<TransportResult<Vec<u8>>>>>,
    sanitize: Mutex<Script<TransportResult<()>>>,
    fw_commit: Mutex<Script<TransportResult<u16>>>,
    security: Mutex<Script<TransportResult<(i32, Vec<u8>)>>>,
    xfer: Mutex<Script<TransportResult<(AdminResponse, Vec<u8>)>>>,
    timeout_ms: Mutex<u32>,
    calls: Mutex<Vec<Call>>,
}

impl MockState {
    pub fn new() -> Arc<Self> {
        let state = Self::default();
        *state.timeout_ms.lock() = 1000;
        Arc::new(state)
    }

    pub fn push_scan(&self, result: TransportResult<Vec<CtrlId>>) {
        self.scan.lock().push(result);
    }

    pub fn push_subsystem_info(&self, result: TransportResult<SubsystemInfo>) {
        self.subsystem_info.lock().push(result);
    }

    pub fn set_ports(&self, ports: Vec<PortInfo>) {
        *self.ports.lock() = ports;
    }

    pub fn push_health(&self, result: TransportResult<SubsystemHealthStatus>) {
        self.health.lock().push(result);
    }

    pub fn push_identify(&self, result: TransportResult<Vec<u8>>) {
        self.identify.lock().push(result);
    }

    pub fn push_log(&self, lid: u8, result: TransportResult<Vec<u8>>) {
        self.logs.lock().entry(lid).or_default().push(result);
    }

    pub fn push_sanitize(&self, result: TransportResult<()>) {
        self.sanitize.lock().push(result);
    }

    pub fn push_fw_commit(&self, result: TransportResult<u16>) {
        self.fw_commit.lock().push(result);
    }

    pub fn push_security(&self, result: TransportResult<(i32, Vec<u8>)>) {
        self.security.lock().push(result);
    }

    pub fn push_xfer(&self, result: TransportResult<(AdminResponse, Vec<u8>)>) {
        self.xfer.lock().push(result);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn timeout_ms(&self) -> u32 {
        *self.timeout_ms.lock()
    }

    /// Count calls matching `pred`.
    pub fn count_calls(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

// =============================================================================
// Mock Transport
// =============================================================================

pub struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            state: MockState::new(),
        }
    }

    pub fn with_state(state: Arc<MockState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> Arc<MockState> {
        self.state.clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn unscripted<T>() -> TransportResult<T> {
    Err(TransportError::Errno(ENODEV))
}

impl MiTransport for MockTransport {
    fn scan_controllers(&mut self) -> TransportResult<Vec<CtrlId>> {
        self.state.record(Call::ScanControllers);
        self.state.scan.lock().next().unwrap_or_else(unscripted)
    }

    fn read_subsystem_info(&mut self) -> TransportResult<SubsystemInfo> {
        self.state.record(Call::SubsystemInfo);
        let ports = self.state.ports.lock().len() as u8;
        self.state
            .subsystem_info
            .lock()
            .next()
            .unwrap_or(if ports > 0 {
                Ok(SubsystemInfo {
                    nump: ports - 1,
                    mjr: 1,
                    mnr: 2,
                })
            } else {
                unscripted()
            })
    }

    fn read_port_info(&mut self, port: u8) -> TransportResult<PortInfo> {
        self.state.record(Call::PortInfo(port));
        self.state
            .ports
            .lock()
            .get(port as usize)
            .copied()
            .ok_or(TransportError::Status(0x04))
    }

    fn subsystem_health_status_poll(
        &mut self,
        _clear: bool,
    ) -> TransportResult<SubsystemHealthStatus> {
        self.state.record(Call::HealthPoll);
        self.state.health.lock().next().unwrap_or_else(unscripted)
    }

    fn admin_identify(
        &mut self,
        _ctrl: CtrlId,
        cns: u8,
        _nsid: u32,
        _cntid: u16,
    ) -> TransportResult<Vec<u8>> {
        self.state.record(Call::Identify {
            cns,
            partial: false,
        });
        self.state.identify.lock().next().unwrap_or_else(unscripted)
    }

    fn admin_identify_partial(
        &mut self,
        _ctrl: CtrlId,
        cns: u8,
        _nsid: u32,
        _cntid: u16,
        _offset: u32,
        len: u32,
    ) -> TransportResult<Vec<u8>> {
        self.state.record(Call::Identify { cns, partial: true });
        self.state
            .identify
            .lock()
            .next()
            .map(|r| r.map(|mut data| {
                data.truncate(len as usize);
                data
            }))
            .unwrap_or_else(unscripted)
    }

    fn admin_get_log(
        &mut self,
        _ctrl: CtrlId,
        lid: u8,
        _nsid: u32,
        offset: u64,
        len: u32,
        _lsp: u8,
        _rae: bool,
    ) -> TransportResult<Vec<u8>> {
        self.state.record(Call::GetLog { lid, offset, len });
        self.state
            .logs
            .lock()
            .get_mut(&lid)
            .and_then(|script| script.next())
            .unwrap_or_else(unscripted)
    }

    fn admin_sanitize_nvm(&mut self, _ctrl: CtrlId, args: &SanitizeArgs) -> TransportResult<()> {
        self.state.record(Call::Sanitize(*args));
        self.state.sanitize.lock().next().unwrap_or_else(unscripted)
    }

    fn admin_fw_commit(
        &mut self,
        _ctrl: CtrlId,
        action: FwCommitAction,
        slot: u8,
        _bpid: bool,
    ) -> TransportResult<u16> {
        self.state.record(Call::FwCommit {
            action: action.value(),
            slot,
        });
        self.state.fw_commit.lock().next().unwrap_or_else(unscripted)
    }

    fn admin_security_send(
        &mut self,
        _ctrl: CtrlId,
        proto: u8,
        _proto_specific: u16,
        _data: &[u8],
    ) -> TransportResult<i32> {
        self.state.record(Call::SecuritySend { proto });
        self.state
            .security
            .lock()
            .next()
            .map(|r| r.map(|(status, _)| status))
            .unwrap_or_else(unscripted)
    }

    fn admin_security_receive(
        &mut self,
        _ctrl: CtrlId,
        proto: u8,
        _proto_specific: u16,
        transfer_length: u32,
    ) -> TransportResult<(i32, Vec<u8>)> {
        self.state.record(Call::SecurityReceive {
            proto,
            len: transfer_length,
        });
        self.state.security.lock().next().unwrap_or_else(unscripted)
    }

    fn admin_xfer(
        &mut self,
        _ctrl: CtrlId,
        request: &AdminRequest,
        _payload: &[u8],
    ) -> TransportResult<(AdminResponse, Vec<u8>)> {
        self.state.record(Call::AdminXfer {
            opcode: request.opcode,
            timeout_ms: *self.state.timeout_ms.lock(),
        });
        self.state.xfer.lock().next().unwrap_or_else(unscripted)
    }

    fn timeout_ms(&self) -> u32 {
        *self.state.timeout_ms.lock()
    }

    fn set_timeout_ms(&mut self, timeout_ms: u32) {
        *self.state.timeout_ms.lock() = timeout_ms;
    }
}

// =============================================================================
// Mock Factory
// =============================================================================

/// Hands out [`MockTransport`] sessions keyed by EID; tests script a state
/// before (or after) discovery opens the endpoint.
#[derive(Default)]
pub struct MockFactory {
    states: Mutex<HashMap<u8, Arc<MockState>>>,
    opened: Mutex<Vec<(u8, Vec<u8>)>>,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Scripting handle for the endpoint with this EID.
    pub fn state(&self, eid: u8) -> Arc<MockState> {
        self.states
            .lock()
            .entry(eid)
            .or_insert_with(MockState::new)
            .clone()
    }

    /// `(eid, address)` pairs in the order endpoints were opened.
    pub fn opened(&self) -> Vec<(u8, Vec<u8>)> {
        self.opened.lock().clone()
    }
}

impl TransportFactory for MockFactory {
    fn open(&self, address: &[u8], eid: u8) -> Result<Box<dyn MiTransport>> {
        self.opened.lock().push((eid, address.to_vec()));
        Ok(Box::new(MockTransport::with_state(self.state(eid))))
    }
}

// =============================================================================
// Wire Builders
// =============================================================================

/// Identify Controller bytes with the fields the drive model reads.
pub fn identify_controller_bytes(
    vid: u16,
    serial: &str,
    model: &str,
    firmware: &str,
    tnvmcap: u64,
    sanicap: u32,
) -> Vec<u8> {
    let mut buf = vec![0u8; crate::protocol::IDENTIFY_DATA_SIZE];
    buf[0..2].copy_from_slice(&vid.to_le_bytes());
    write_padded(&mut buf[4..24], serial);
    write_padded(&mut buf[24..64], model);
    write_padded(&mut buf[64..72], firmware);
    buf[280..288].copy_from_slice(&tnvmcap.to_le_bytes());
    buf[328..332].copy_from_slice(&sanicap.to_le_bytes());
    buf
}

/// SMART log bytes of the size the poll path fetches.
pub fn smart_log_bytes(critical_warning: u8, temp_k: u16, percentage_used: u8) -> Vec<u8> {
    let mut buf = vec![0u8; SMART_LOG_READ_SIZE];
    buf[0] = critical_warning;
    buf[1..3].copy_from_slice(&temp_k.to_le_bytes());
    buf[5] = percentage_used;
    buf
}

/// Serialize a sanitize status log page.
pub fn sanitize_log_bytes(log: &SanitizeLog) -> Vec<u8> {
    let mut buf = vec![0u8; SanitizeLog::WIRE_SIZE];
    buf[0..2].copy_from_slice(&log.sprog.to_le_bytes());
    buf[2..4].copy_from_slice(&log.sstat.to_le_bytes());
    buf[4..8].copy_from_slice(&log.scdw10.to_le_bytes());
    buf[8..12].copy_from_slice(&log.eto.to_le_bytes());
    buf[12..16].copy_from_slice(&log.etbe.to_le_bytes());
    buf[16..20].copy_from_slice(&log.etce.to_le_bytes());
    buf[20..24].copy_from_slice(&log.etond.to_le_bytes());
    buf[24..28].copy_from_slice(&log.etbend.to_le_bytes());
    buf[28..32].copy_from_slice(&log.etcend.to_le_bytes());
    buf
}

/// A healthy PCIe x4 gen4 port.
pub fn pcie_port(cls: u8, nlw: u8) -> PortInfo {
    PortInfo {
        portt: crate::protocol::PORT_TYPE_PCIE,
        mmctptus: 64,
        meb: 0,
        pcie: crate::protocol::PciePortInfo {
            mps: 9,
            sls: (1u8 << cls) - 1,
            cls,
            mlw: nlw,
            nlw,
            pn: 0,
        },
    }
}

fn write_padded(dst: &mut [u8], s: &str) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(dst.len());
    dst[..n].copy_from_slice(&bytes[..n]);
    for b in dst[n..].iter_mut() {
        *b = b' ';
    }
}
