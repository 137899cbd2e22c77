//! Drive model enums and fault state
//!
//! The published enum values follow the object-bus naming scheme; the short
//! `Display` forms are what the config file and logs use.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

// =============================================================================
// Health / Operational State
// =============================================================================

/// Drive health verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Health {
    Ok,
    Warning,
    Critical,
}

impl Health {
    pub fn as_bus_str(self) -> &'static str {
        match self {
            Health::Ok => "xyz.openbmc_project.State.Decorator.Health.HealthType.OK",
            Health::Warning => "xyz.openbmc_project.State.Decorator.Health.HealthType.Warning",
            Health::Critical => "xyz.openbmc_project.State.Decorator.Health.HealthType.Critical",
        }
    }
}

/// Operational state published next to `functional`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationalState {
    None,
    Fault,
}

impl OperationalState {
    pub fn as_bus_str(self) -> &'static str {
        match self {
            OperationalState::None => {
                "xyz.openbmc_project.State.Decorator.OperationalStatus.StateType.None"
            }
            OperationalState::Fault => {
                "xyz.openbmc_project.State.Decorator.OperationalStatus.StateType.Fault"
            }
        }
    }
}

// =============================================================================
// Operations
// =============================================================================

/// Long-running administrative operation a drive may be executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    None,
    Sanitize,
}

impl Operation {
    pub fn as_bus_str(self) -> &'static str {
        match self {
            Operation::None => "xyz.openbmc_project.Nvme.Operation.OperationType.None",
            Operation::Sanitize => "xyz.openbmc_project.Nvme.Operation.OperationType.Sanitize",
        }
    }
}

/// Progress status of the current operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    InProgress,
    Completed,
    Failed,
}

impl OperationStatus {
    pub fn as_bus_str(self) -> &'static str {
        match self {
            OperationStatus::InProgress => {
                "xyz.openbmc_project.Common.Progress.OperationStatus.InProgress"
            }
            OperationStatus::Completed => {
                "xyz.openbmc_project.Common.Progress.OperationStatus.Completed"
            }
            OperationStatus::Failed => {
                "xyz.openbmc_project.Common.Progress.OperationStatus.Failed"
            }
        }
    }
}

// =============================================================================
// Erase Methods
// =============================================================================

/// Sanitize erase method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EraseMethod {
    Overwrite,
    BlockErase,
    CryptoErase,
}

impl EraseMethod {
    pub fn as_bus_str(self) -> &'static str {
        match self {
            EraseMethod::Overwrite => {
                "xyz.openbmc_project.Nvme.SecureErase.EraseMethod.Overwrite"
            }
            EraseMethod::BlockErase => {
                "xyz.openbmc_project.Nvme.SecureErase.EraseMethod.BlockErase"
            }
            EraseMethod::CryptoErase => {
                "xyz.openbmc_project.Nvme.SecureErase.EraseMethod.CryptoErase"
            }
        }
    }
}

impl std::fmt::Display for EraseMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EraseMethod::Overwrite => write!(f, "Overwrite"),
            EraseMethod::BlockErase => write!(f, "BlockErase"),
            EraseMethod::CryptoErase => write!(f, "CryptoErase"),
        }
    }
}

/// Erase methods a drive advertises via SANICAP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SanitizeCapabilities {
    pub overwrite: bool,
    pub block_erase: bool,
    pub crypto_erase: bool,
}

impl SanitizeCapabilities {
    pub fn supports(&self, method: EraseMethod) -> bool {
        match method {
            EraseMethod::Overwrite => self.overwrite,
            EraseMethod::BlockErase => self.block_erase,
            EraseMethod::CryptoErase => self.crypto_erase,
        }
    }

    pub fn methods(&self) -> Vec<EraseMethod> {
        let mut out = Vec::new();
        if self.overwrite {
            out.push(EraseMethod::Overwrite);
        }
        if self.block_erase {
            out.push(EraseMethod::BlockErase);
        }
        if self.crypto_erase {
            out.push(EraseMethod::CryptoErase);
        }
        out
    }
}

// =============================================================================
// External Faults
// =============================================================================

/// Externally asserted fault, latched until the bus writer clears it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalFault {
    Backup,
    Temperature,
    Degraded,
    Media,
    Capacity,
}

impl ExternalFault {
    /// The SMART critical-warning bit this fault folds into.
    pub fn smart_bit(self) -> u8 {
        match self {
            ExternalFault::Capacity => 1 << 0,
            ExternalFault::Temperature => 1 << 1,
            ExternalFault::Degraded => 1 << 2,
            ExternalFault::Media => 1 << 3,
            ExternalFault::Backup => 1 << 4,
        }
    }
}

/// The five latched external fault booleans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExternalFaults {
    pub backup: bool,
    pub temperature: bool,
    pub degraded: bool,
    pub media: bool,
    pub capacity: bool,
}

impl ExternalFaults {
    pub fn set(&mut self, fault: ExternalFault, asserted: bool) {
        match fault {
            ExternalFault::Backup => self.backup = asserted,
            ExternalFault::Temperature => self.temperature = asserted,
            ExternalFault::Degraded => self.degraded = asserted,
            ExternalFault::Media => self.media = asserted,
            ExternalFault::Capacity => self.capacity = asserted,
        }
    }

    /// Fold the latched faults into a SMART critical-warning byte.
    pub fn as_smart_bits(&self) -> u8 {
        let mut bits = 0;
        if self.capacity {
            bits |= ExternalFault::Capacity.smart_bit();
        }
        if self.temperature {
            bits |= ExternalFault::Temperature.smart_bit();
        }
        if self.degraded {
            bits |= ExternalFault::Degraded.smart_bit();
        }
        if self.media {
            bits |= ExternalFault::Media.smart_bit();
        }
        if self.backup {
            bits |= ExternalFault::Backup.smart_bit();
        }
        bits
    }
}

// =============================================================================
// Location / Form Factor
// =============================================================================

/// Inventory location type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationType {
    Slot,
    Unknown,
}

impl LocationType {
    pub fn as_bus_str(self) -> &'static str {
        match self {
            LocationType::Slot => {
                "xyz.openbmc_project.Inventory.Decorator.Location.LocationTypes.Slot"
            }
            LocationType::Unknown => {
                "xyz.openbmc_project.Inventory.Decorator.Location.LocationTypes.Unknown"
            }
        }
    }
}

/// Physical drive form factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormFactor {
    Drive3_5,
    Drive2_5,
    Edsff1ULong,
    Edsff1UShort,
    EdsffE3Short,
    EdsffE3Long,
    M2_2230,
    M2_2242,
    M2_2260,
    M2_2280,
    M2_22110,
    U2,
    PcieSlotFullLength,
    PcieSlotLowProfile,
    PcieHalfLength,
    Oem,
}

impl FormFactor {
    pub fn as_bus_str(self) -> String {
        format!(
            "xyz.openbmc_project.Inventory.Item.Drive.DriveFormFactor.{}",
            self.short_name()
        )
    }
}

impl std::fmt::Display for FormFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

impl FormFactor {
    pub fn short_name(self) -> &'static str {
        match self {
            FormFactor::Drive3_5 => "Drive3_5",
            FormFactor::Drive2_5 => "Drive2_5",
            FormFactor::Edsff1ULong => "EDSFF_1U_Long",
            FormFactor::Edsff1UShort => "EDSFF_1U_Short",
            FormFactor::EdsffE3Short => "EDSFF_E3_Short",
            FormFactor::EdsffE3Long => "EDSFF_E3_Long",
            FormFactor::M2_2230 => "M2_2230",
            FormFactor::M2_2242 => "M2_2242",
            FormFactor::M2_2260 => "M2_2260",
            FormFactor::M2_2280 => "M2_2280",
            FormFactor::M2_22110 => "M2_22110",
            FormFactor::U2 => "U2",
            FormFactor::PcieSlotFullLength => "PCIeSlotFullLength",
            FormFactor::PcieSlotLowProfile => "PCIeSlotLowProfile",
            FormFactor::PcieHalfLength => "PCIeHalfLength",
            FormFactor::Oem => "OEM",
        }
    }
}

impl FromStr for FormFactor {
    type Err = ();

    /// Accepts both the short name and the fully qualified bus value.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let short = s.rsplit('.').next().unwrap_or(s);
        match short {
            "Drive3_5" => Ok(FormFactor::Drive3_5),
            "Drive2_5" => Ok(FormFactor::Drive2_5),
            "EDSFF_1U_Long" => Ok(FormFactor::Edsff1ULong),
            "EDSFF_1U_Short" => Ok(FormFactor::Edsff1UShort),
            "EDSFF_E3_Short" => Ok(FormFactor::EdsffE3Short),
            "EDSFF_E3_Long" => Ok(FormFactor::EdsffE3Long),
            "M2_2230" => Ok(FormFactor::M2_2230),
            "M2_2242" => Ok(FormFactor::M2_2242),
            "M2_2260" => Ok(FormFactor::M2_2260),
            "M2_2280" => Ok(FormFactor::M2_2280),
            "M2_22110" => Ok(FormFactor::M2_22110),
            "U2" | "U_2" => Ok(FormFactor::U2),
            "PCIeSlotFullLength" => Ok(FormFactor::PcieSlotFullLength),
            "PCIeSlotLowProfile" => Ok(FormFactor::PcieSlotLowProfile),
            "PCIeHalfLength" => Ok(FormFactor::PcieHalfLength),
            "OEM" => Ok(FormFactor::Oem),
            _ => Err(()),
        }
    }
}
