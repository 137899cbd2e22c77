//! NVMe Device Manager daemon
//!
//! Wires the discovery orchestrator, the shared MI worker, and the bus
//! contracts together on a single-threaded reactor. The object-bus runtime
//! and the MI library binding are deployment concerns layered on top of this
//! crate; the binary doubles as a development harness that can run the whole
//! pipeline against a simulated drive (`--simulate`).

use clap::Parser;
use nvme_device_manager::bus::EndpointRecord;
use nvme_device_manager::protocol::NVME_MI_MSGTYPE_NVME;
use nvme_device_manager::transport::mock::{self, MockFactory};
use nvme_device_manager::{
    config, DriveManager, Error, InventoryConfig, LocalBus, MiRoot, Result,
};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// =============================================================================
// CLI Arguments
// =============================================================================

/// NVMe Device Manager - MCTP/NVMe-MI drive discovery and health monitoring
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the drive bay configuration table
    #[arg(long, env = "DRIVE_CONFIG", default_value = config::DEFAULT_CONFIG_PATH)]
    drive_config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Run against an in-process simulated drive instead of real hardware
    #[arg(long, env = "SIMULATE")]
    simulate: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting NVMe Device Manager");
    info!("  Version: {}", nvme_device_manager::VERSION);
    info!("  Bus name: {}", nvme_device_manager::bus::BUS_NAME);
    info!("  Object root: {}", nvme_device_manager::bus::DRIVE_ROOT_PATH);
    info!("  Drive config: {}", args.drive_config);
    info!("  Simulate: {}", args.simulate);

    if !args.simulate {
        return Err(Error::Configuration(
            "no MI transport backend is linked into this build; run with --simulate".into(),
        ));
    }

    let config = InventoryConfig::load(&args.drive_config);
    let bus = LocalBus::new();
    let factory = simulated_factory(&bus);
    let root = MiRoot::new(factory);

    let manager = DriveManager::new(bus.clone(), bus.clone(), root, config);

    tokio::select! {
        _ = manager.run() => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("shutdown requested");
        }
    }

    info!("NVMe Device Manager stopped");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Simulated Endpoint
// =============================================================================

/// One permanently healthy simulated drive on EID 9, for exercising the
/// pipeline without hardware.
fn simulated_factory(bus: &Arc<LocalBus>) -> Arc<MockFactory> {
    let factory = MockFactory::new();
    let state = factory.state(9);
    state.push_scan(Ok(vec![0]));
    state.push_identify(Ok(mock::identify_controller_bytes(
        0x144d,
        "SIM0001",
        "Simulated NVMe Drive",
        "SIM1.0",
        960_000_000_000,
        0x7,
    )));
    state.set_ports(vec![mock::pcie_port(4, 4)]);
    state.push_health(Ok(nvme_device_manager::protocol::SubsystemHealthStatus {
        nss: 0x20,
        sw: 0,
        ctemp: 40,
        pdlu: 3,
        ccs: 0,
    }));
    state.push_log(
        nvme_device_manager::protocol::LogPage::Smart.lid(),
        Ok(mock::smart_log_bytes(0, 313, 3)),
    );
    // Sanitize requests succeed and then report immediate completion.
    state.push_sanitize(Ok(()));
    state.push_log(
        nvme_device_manager::protocol::LogPage::Sanitize.lid(),
        Ok(mock::sanitize_log_bytes(
            &nvme_device_manager::protocol::SanitizeLog {
                sstat: 0x0001,
                ..Default::default()
            },
        )),
    );
    bus.add_endpoint(EndpointRecord {
        path: "/xyz/openbmc_project/mctp/1/9".into(),
        eid: 9,
        message_types: vec![0x00, NVME_MI_MSGTYPE_NVME & 0x7F],
        address: b"\x01mctp-mux".to_vec(),
        i2c_bus: Some(3),
    });

    factory
}
