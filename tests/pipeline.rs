//! End-to-end pipeline tests
//!
//! Drive the full discovery → identify → poll → sanitize pipeline over the
//! in-memory bus and the scripted transport. Time is paused: the daemon's
//! debounce, settle, and poll timers run on the virtual clock while the real
//! MI worker thread executes the scripted commands.

use nvme_device_manager::bus::events::Severity;
use nvme_device_manager::bus::iface;
use nvme_device_manager::bus::{EndpointRecord, InventoryRecord, Value};
use nvme_device_manager::drive::health::DRIVE_FAILURE_RESOLUTION;
use nvme_device_manager::drive::POLL_INTERVAL;
use nvme_device_manager::protocol::{
    LogPage, SanitizeAction, SanitizeArgs, SanitizeLog, SubsystemHealthStatus,
    NVME_MI_MSGTYPE_NVME, OVERWRITE_PATTERN,
};
use nvme_device_manager::transport::mock::{self, Call, MockFactory, MockState};
use nvme_device_manager::{
    DriveManager, EraseMethod, Error, InventoryConfig, LocalBus, MiRoot,
};
use std::sync::Arc;
use std::time::Duration;

const EID: u8 = 9;
const DRIVE_PATH: &str = "/xyz/openbmc_project/inventory/drive/9";

struct Harness {
    bus: Arc<LocalBus>,
    factory: Arc<MockFactory>,
    manager: Arc<DriveManager>,
}

impl Harness {
    fn start(config: InventoryConfig) -> Self {
        let bus = LocalBus::new();
        let factory = MockFactory::new();
        let root = MiRoot::new(factory.clone());
        let manager = DriveManager::new(bus.clone(), bus.clone(), root, config);
        tokio::spawn(manager.clone().run());
        Self {
            bus,
            factory,
            manager,
        }
    }

    /// Script a drive that scans, identifies, and polls healthy.
    fn script_healthy_drive(&self, sanicap: u32) -> Arc<MockState> {
        let state = self.factory.state(EID);
        state.push_scan(Ok(vec![0]));
        state.push_identify(Ok(mock::identify_controller_bytes(
            0x144d,
            "S7X9NX0T123456",
            "PM9A3 NVMe SSD",
            "GDC7302Q",
            1_920_398_934_016,
            sanicap,
        )));
        state.set_ports(vec![mock::pcie_port(4, 4)]);
        state.push_health(Ok(SubsystemHealthStatus {
            nss: 0x20,
            sw: 0,
            ctemp: 40,
            pdlu: 5,
            ccs: 0,
        }));
        state.push_log(LogPage::Smart.lid(), Ok(mock::smart_log_bytes(0, 313, 5)));
        state
    }

    fn announce_endpoint(&self) {
        self.bus.add_endpoint(EndpointRecord {
            path: format!("/xyz/openbmc_project/mctp/1/{EID}"),
            eid: EID,
            message_types: vec![0x00, NVME_MI_MSGTYPE_NVME & 0x7F],
            address: b"\x01mctp-mux".to_vec(),
            i2c_bus: Some(3),
        });
    }

    fn property(&self, interface: &str, name: &str) -> Option<Value> {
        self.bus.property(DRIVE_PATH, interface, name)
    }
}

/// Let the real worker thread drain in-flight commands and the reactor
/// process their completions, without advancing the virtual clock.
async fn drain() {
    for _ in 0..50 {
        std::thread::sleep(Duration::from_millis(1));
        tokio::task::yield_now().await;
    }
}

/// Advance through discovery: debounce (1s) + worker settle (2s) + margin,
/// interleaving virtual-clock advances with real drains so worker round
/// trips and daemon timers can make progress in any order. Ends on a
/// half-second so later assertions never coincide with a poll tick.
async fn run_discovery() {
    for _ in 0..8 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        drain().await;
    }
    tokio::time::sleep(Duration::from_millis(500)).await;
    drain().await;
}

/// Advance the virtual clock through `n` poll ticks.
async fn advance_ticks(n: u32) {
    for _ in 0..n {
        tokio::time::sleep(POLL_INTERVAL).await;
        drain().await;
    }
}

// =============================================================================
// Discovery
// =============================================================================

#[tokio::test(start_paused = true)]
async fn happy_discovery_publishes_drive() {
    let harness = Harness::start(InventoryConfig::default());
    harness.script_healthy_drive(0x7);
    harness.announce_endpoint();
    run_discovery().await;

    assert!(harness.manager.drive(EID).is_some());
    assert_eq!(
        harness.property(iface::ITEM, "Present"),
        Some(Value::Bool(true))
    );
    assert_eq!(
        harness.property(iface::DRIVE, "Type"),
        Some(Value::Str(
            "xyz.openbmc_project.Inventory.Item.Drive.DriveType.SSD".into()
        ))
    );
    assert_eq!(
        harness.property(iface::DRIVE, "Protocol"),
        Some(Value::Str(
            "xyz.openbmc_project.Inventory.Item.Drive.DriveProtocol.NVMe".into()
        ))
    );
    assert_eq!(
        harness.property(iface::ASSET, "Manufacturer"),
        Some(Value::Str("SAMSUNG".into()))
    );
    assert_eq!(
        harness.property(iface::ASSET, "SerialNumber"),
        Some(Value::Str("S7X9NX0T123456".into()))
    );
    assert_eq!(
        harness.property(iface::VERSION, "Version"),
        Some(Value::Str("GDC7302Q".into()))
    );
    assert_eq!(
        harness.property(iface::DRIVE, "Capacity"),
        Some(Value::U64(1_920_398_934_016))
    );
    // Gen4 x4
    assert_eq!(
        harness.property(iface::PORT, "MaxSpeed"),
        Some(Value::U32(64))
    );
    assert_eq!(
        harness.property(iface::OPERATIONAL_STATUS, "Functional"),
        Some(Value::Bool(true))
    );
    assert_eq!(
        harness.property(iface::HEALTH, "Health"),
        Some(Value::Str(
            "xyz.openbmc_project.State.Decorator.Health.HealthType.OK".into()
        ))
    );

    // The opened address keeps the family prefix and gains a trailing NUL.
    assert_eq!(
        harness.factory.opened(),
        vec![(EID, b"\x01mctp-mux\x00".to_vec())]
    );
}

#[tokio::test(start_paused = true)]
async fn non_nvme_endpoint_is_ignored() {
    let harness = Harness::start(InventoryConfig::default());
    harness.bus.add_endpoint(EndpointRecord {
        path: "/xyz/openbmc_project/mctp/1/5".into(),
        eid: 5,
        message_types: vec![0x00],
        address: b"\x01mctp-mux".to_vec(),
        i2c_bus: None,
    });
    run_discovery().await;

    assert!(harness.manager.drive(5).is_none());
    assert!(harness.bus.object_paths().is_empty());
    assert!(harness.factory.opened().is_empty());
}

#[tokio::test(start_paused = true)]
async fn endpoint_removal_retires_drive() {
    let harness = Harness::start(InventoryConfig::default());
    harness.script_healthy_drive(0x7);
    harness.announce_endpoint();
    run_discovery().await;
    assert!(harness.manager.drive(EID).is_some());

    harness.bus.remove_endpoint(EID);
    // Let any rescan in flight finish so the removal signal gets serviced.
    run_discovery().await;

    assert!(harness.manager.drive(EID).is_none());
    assert!(harness.bus.object_paths().is_empty());
}

#[tokio::test(start_paused = true)]
async fn scan_failure_marks_absent_and_reprobes() {
    let harness = Harness::start(InventoryConfig::default());
    let state = harness.factory.state(EID);
    // Scans fail through discovery (including the rescan the added-signal
    // debounce causes and the first re-probe tick); the next tick succeeds.
    for _ in 0..3 {
        state.push_scan(Err(
            nvme_device_manager::transport::TransportError::Errno(110),
        ));
    }
    state.push_scan(Ok(vec![0]));
    state.push_identify(Ok(mock::identify_controller_bytes(
        0x1e0f,
        "X",
        "M",
        "F",
        1,
        0,
    )));
    state.set_ports(vec![mock::pcie_port(3, 2)]);
    state.push_health(Ok(SubsystemHealthStatus {
        nss: 0x20,
        ..Default::default()
    }));
    state.push_log(LogPage::Smart.lid(), Ok(mock::smart_log_bytes(0, 300, 0)));

    harness.announce_endpoint();
    run_discovery().await;
    assert_eq!(
        harness.property(iface::ITEM, "Present"),
        Some(Value::Bool(false))
    );

    advance_ticks(2).await;
    assert_eq!(
        harness.property(iface::ITEM, "Present"),
        Some(Value::Bool(true))
    );
}

#[tokio::test(start_paused = true)]
async fn inventory_updates_location_and_form_factor() {
    let harness = Harness::start(InventoryConfig::default());
    harness.script_healthy_drive(0x7);
    harness.announce_endpoint();
    run_discovery().await;

    harness.bus.add_inventory(InventoryRecord {
        path: "/xyz/openbmc_project/inventory/system/nvme/bay3".into(),
        location_code: Some("U2_Bay3".into()),
        i2c_bus: Some(3),
        form_factor: Some("U2".into()),
    });
    run_discovery().await;

    assert_eq!(
        harness.property(iface::LOCATION, "LocationCode"),
        Some(Value::Str("U2_Bay3".into()))
    );
    assert_eq!(
        harness.property(iface::LOCATION, "LocationType"),
        Some(Value::Str(
            "xyz.openbmc_project.Inventory.Decorator.Location.LocationTypes.Slot".into()
        ))
    );
    assert_eq!(
        harness.property(iface::DRIVE, "FormFactor"),
        Some(Value::Str(
            "xyz.openbmc_project.Inventory.Item.Drive.DriveFormFactor.U2".into()
        ))
    );
    assert_eq!(
        harness.property(iface::ASSOCIATIONS, "Associations"),
        Some(Value::Associations(vec![(
            "chassis".into(),
            "drive".into(),
            "U2_Bay3".into()
        )]))
    );
}

#[tokio::test(start_paused = true)]
async fn config_file_seeds_location() {
    let config = InventoryConfig {
        drive: vec![nvme_device_manager::config::DriveEntry {
            eid: EID,
            location: Some("CFG_Bay1".into()),
            form_factor: Some("M2_2280".into()),
        }],
    };
    let harness = Harness::start(config);
    harness.script_healthy_drive(0x7);
    harness.announce_endpoint();
    run_discovery().await;

    assert_eq!(
        harness.property(iface::LOCATION, "LocationCode"),
        Some(Value::Str("CFG_Bay1".into()))
    );
    assert_eq!(
        harness.property(iface::DRIVE, "FormFactor"),
        Some(Value::Str(
            "xyz.openbmc_project.Inventory.Item.Drive.DriveFormFactor.M2_2280".into()
        ))
    );
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test(start_paused = true)]
async fn smart_warning_latches_and_emits_once() {
    let harness = Harness::start(InventoryConfig::default());
    let state = harness.script_healthy_drive(0x7);
    // Clean SMART first, then a latched temperature warning forever.
    state.push_log(LogPage::Smart.lid(), Ok(mock::smart_log_bytes(0x02, 350, 40)));
    state.push_health(Ok(SubsystemHealthStatus {
        nss: 0x20,
        pdlu: 40,
        ..Default::default()
    }));
    harness.announce_endpoint();
    run_discovery().await;
    // Tick 1 reads the clean byte, tick 2 latches the warning.
    advance_ticks(2).await;

    assert_eq!(
        harness.property(iface::NVME_STATUS, "TemperatureFault"),
        Some(Value::Bool(true))
    );
    assert_eq!(
        harness.property(iface::NVME_STATUS, "SmartWarnings"),
        Some(Value::Str("2".into()))
    );
    assert_eq!(
        harness.property(iface::HEALTH, "Health"),
        Some(Value::Str(
            "xyz.openbmc_project.State.Decorator.Health.HealthType.Warning".into()
        ))
    );
    assert_eq!(
        harness.property(iface::NVME_STATUS, "DriveLifeUsed"),
        Some(Value::Str("40".into()))
    );
    assert_eq!(
        harness.property(iface::DRIVE, "PredictedMediaLifeLeftPercent"),
        Some(Value::U8(60))
    );

    let events = harness.bus.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].severity, Severity::Warning);
    assert_eq!(
        events[0].additional_data.get("REDFISH_MESSAGE_ARGS").unwrap(),
        "Drive_9,temperature is over or under the threshold"
    );

    // Unchanged byte on later ticks: no further events, no further writes.
    let writes_before = harness.bus.property_write_count();
    let health_polls_before = state.count_calls(|c| *c == Call::HealthPoll);
    let smart_reads_before = state.count_calls(|c| {
        matches!(c, Call::GetLog { lid, .. } if *lid == LogPage::Smart.lid())
    });
    advance_ticks(2).await;
    // Exactly one health poll and one SMART read per tick.
    assert_eq!(
        state.count_calls(|c| *c == Call::HealthPoll),
        health_polls_before + 2
    );
    assert_eq!(
        state.count_calls(|c| {
            matches!(c, Call::GetLog { lid, .. } if *lid == LogPage::Smart.lid())
        }),
        smart_reads_before + 2
    );
    assert_eq!(harness.bus.events().len(), 1);
    // The periodic PDLU/life-left publications continue; the SMART group
    // stays quiet. Allow only those two writes (plus functional no-ops).
    let writes_after = harness.bus.property_write_count();
    assert!(
        writes_after - writes_before <= 4,
        "unexpected writes: {}",
        writes_after - writes_before
    );
    assert_eq!(
        harness.property(iface::NVME_STATUS, "SmartWarnings"),
        Some(Value::Str("2".into()))
    );
}

#[tokio::test(start_paused = true)]
async fn functional_drop_is_critical_once() {
    let harness = Harness::start(InventoryConfig::default());
    let state = harness.script_healthy_drive(0x7);
    state.push_health(Ok(SubsystemHealthStatus {
        nss: 0x00,
        ..Default::default()
    }));
    harness.announce_endpoint();
    run_discovery().await;
    advance_ticks(3).await;

    assert_eq!(
        harness.property(iface::OPERATIONAL_STATUS, "Functional"),
        Some(Value::Bool(false))
    );
    assert_eq!(
        harness.property(iface::OPERATIONAL_STATUS, "State"),
        Some(Value::Str(
            "xyz.openbmc_project.State.Decorator.OperationalStatus.StateType.Fault".into()
        ))
    );
    assert_eq!(
        harness.property(iface::HEALTH, "Health"),
        Some(Value::Str(
            "xyz.openbmc_project.State.Decorator.Health.HealthType.Critical".into()
        ))
    );

    let critical: Vec<_> = harness
        .bus
        .events()
        .into_iter()
        .filter(|e| e.severity == Severity::Critical)
        .collect();
    assert_eq!(critical.len(), 1);
    assert_eq!(
        critical[0].additional_data.get("REDFISH_MESSAGE_ARGS").unwrap(),
        "Drive_9,Drive Failure"
    );
    assert_eq!(
        critical[0]
            .additional_data
            .get("xyz.openbmc_project.Logging.Entry.Resolution")
            .unwrap(),
        DRIVE_FAILURE_RESOLUTION
    );
    assert_eq!(
        critical[0]
            .additional_data
            .get("REDFISH_ORIGIN_OF_CONDITION")
            .unwrap(),
        "/redfish/v1/Systems/System_0/Storage/1/Drives/9"
    );
}

// =============================================================================
// Sanitize
// =============================================================================

#[tokio::test(start_paused = true)]
async fn sanitize_overwrite_flow() {
    let harness = Harness::start(InventoryConfig::default());
    let state = harness.script_healthy_drive(0x7);
    state.push_sanitize(Ok(()));
    state.push_log(
        LogPage::Sanitize.lid(),
        Ok(mock::sanitize_log_bytes(&SanitizeLog {
            sstat: 0x0002,
            eto: 100,
            ..Default::default()
        })),
    );
    state.push_log(
        LogPage::Sanitize.lid(),
        Ok(mock::sanitize_log_bytes(&SanitizeLog {
            sstat: 0x0001,
            ..Default::default()
        })),
    );
    harness.announce_endpoint();
    run_discovery().await;

    let control = harness.bus.control(DRIVE_PATH).unwrap();
    let health_polls_before = state.count_calls(|c| *c == Call::HealthPoll);

    control.erase(3, EraseMethod::Overwrite).await.unwrap();
    drain().await;

    // Exactly one sanitize command with the overwrite arguments.
    let sanitize_calls: Vec<_> = state
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::Sanitize(args) => Some(args),
            _ => None,
        })
        .collect();
    assert_eq!(
        sanitize_calls,
        vec![SanitizeArgs {
            action: SanitizeAction::StartOverwrite,
            owpass: 3,
            ovrpat: OVERWRITE_PATTERN,
            nodas: true,
        }]
    );
    assert_eq!(
        harness.property(iface::OPERATION, "Operation"),
        Some(Value::Str(
            "xyz.openbmc_project.Nvme.Operation.OperationType.Sanitize".into()
        ))
    );
    assert_eq!(
        harness.property(iface::PROGRESS, "Status"),
        Some(Value::Str(
            "xyz.openbmc_project.Common.Progress.OperationStatus.InProgress".into()
        ))
    );
    assert_eq!(harness.property(iface::PROGRESS, "Progress"), Some(Value::U8(0)));

    // First tick while running: 5s elapsed of an estimated 100s.
    advance_ticks(1).await;
    assert_eq!(harness.property(iface::PROGRESS, "Progress"), Some(Value::U8(5)));

    // Health polling is suspended while the operation runs.
    assert_eq!(
        state.count_calls(|c| *c == Call::HealthPoll),
        health_polls_before
    );

    // Second tick: complete.
    advance_ticks(1).await;
    assert_eq!(
        harness.property(iface::PROGRESS, "Progress"),
        Some(Value::U8(100))
    );
    assert_eq!(
        harness.property(iface::PROGRESS, "Status"),
        Some(Value::Str(
            "xyz.openbmc_project.Common.Progress.OperationStatus.Completed".into()
        ))
    );

    // Health polling resumes once the operation is over.
    advance_ticks(1).await;
    assert!(state.count_calls(|c| *c == Call::HealthPoll) > health_polls_before);
}

#[tokio::test(start_paused = true)]
async fn sanitize_while_busy_is_not_allowed() {
    let harness = Harness::start(InventoryConfig::default());
    let state = harness.script_healthy_drive(0x7);
    state.push_sanitize(Ok(()));
    state.push_log(
        LogPage::Sanitize.lid(),
        Ok(mock::sanitize_log_bytes(&SanitizeLog {
            sstat: 0x0002,
            eto: 1000,
            ..Default::default()
        })),
    );
    harness.announce_endpoint();
    run_discovery().await;

    let control = harness.bus.control(DRIVE_PATH).unwrap();
    control.erase(1, EraseMethod::Overwrite).await.unwrap();
    drain().await;

    let err = control.erase(1, EraseMethod::BlockErase).await.unwrap_err();
    assert!(matches!(err, Error::NotAllowed(_)));
    // No second command reached the wire.
    assert_eq!(state.count_calls(|c| matches!(c, Call::Sanitize(_))), 1);
}

#[tokio::test(start_paused = true)]
async fn unsupported_erase_method_is_ignored() {
    let harness = Harness::start(InventoryConfig::default());
    // Block erase only.
    let state = harness.script_healthy_drive(0x2);
    harness.announce_endpoint();
    run_discovery().await;

    let control = harness.bus.control(DRIVE_PATH).unwrap();
    control.erase(1, EraseMethod::CryptoErase).await.unwrap();
    assert_eq!(state.count_calls(|c| matches!(c, Call::Sanitize(_))), 0);
}

#[tokio::test(start_paused = true)]
async fn sanitize_failure_publishes_failed() {
    let harness = Harness::start(InventoryConfig::default());
    let state = harness.script_healthy_drive(0x7);
    state.push_sanitize(Ok(()));
    state.push_log(
        LogPage::Sanitize.lid(),
        Ok(mock::sanitize_log_bytes(&SanitizeLog {
            sstat: 0x0003,
            ..Default::default()
        })),
    );
    harness.announce_endpoint();
    run_discovery().await;

    let control = harness.bus.control(DRIVE_PATH).unwrap();
    control.erase(2, EraseMethod::BlockErase).await.unwrap();
    advance_ticks(1).await;

    assert_eq!(
        harness.property(iface::PROGRESS, "Status"),
        Some(Value::Str(
            "xyz.openbmc_project.Common.Progress.OperationStatus.Failed".into()
        ))
    );
    assert_eq!(harness.property(iface::PROGRESS, "Progress"), Some(Value::U8(0)));
}
