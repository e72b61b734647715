//! Hardware environment detection
//!
//! Detects firmware mode (UEFI vs BIOS) and network connectivity without
//! shelling out. Detection never fails: ambiguous results fall back to the
//! safe default and log a warning.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::time::Duration;
use strum::EnumString;
use tracing::{info, warn};

/// Firmware mode of the running system.
///
/// Decided once at startup from `/sys/firmware/efi` and threaded through the
/// editor, the compiler and the bootloader installer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum FirmwareMode {
    /// UEFI firmware: GPT label, EFI system partition, NVRAM boot entries
    Uefi,
    /// Legacy BIOS firmware: msdos label, GRUB in the MBR
    Bios,
}

impl FirmwareMode {
    /// Returns true if the system booted in UEFI mode.
    pub fn is_uefi(self) -> bool {
        matches!(self, Self::Uefi)
    }

    /// Returns true if the system booted in legacy BIOS mode.
    pub fn is_bios(self) -> bool {
        matches!(self, Self::Bios)
    }
}

impl fmt::Display for FirmwareMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uefi => write!(f, "UEFI"),
            Self::Bios => write!(f, "BIOS"),
        }
    }
}

/// Network connectivity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    /// One of the probe endpoints accepted a TCP connection
    Online,
    /// Every probe failed or timed out
    Offline,
}

impl NetworkState {
    /// Returns true if network connectivity is available.
    pub fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => write!(f, "Online"),
            Self::Offline => write!(f, "Offline"),
        }
    }
}

/// Aggregated hardware detection results.
#[derive(Debug, Clone)]
pub struct HardwareInfo {
    pub firmware: FirmwareMode,
    pub network: NetworkState,
}

impl HardwareInfo {
    /// Detect the firmware mode and network state.
    pub fn detect() -> Self {
        let firmware = detect_firmware_mode();
        let network = detect_internet();

        info!(%firmware, %network, "hardware detection complete");

        Self { firmware, network }
    }
}

impl fmt::Display for HardwareInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Firmware: {}, Network: {}", self.firmware, self.network)
    }
}

// ============================================================================
// Detection Functions
// ============================================================================

/// Detect firmware mode by checking for the EFI sysfs directory.
pub fn detect_firmware_mode() -> FirmwareMode {
    firmware_mode_at(Path::new("/sys/firmware/efi"))
}

/// Firmware mode as implied by the presence of `efi_dir`.
pub fn firmware_mode_at(efi_dir: &Path) -> FirmwareMode {
    if efi_dir.exists() {
        if !efi_dir.join("efivars").exists() {
            warn!(
                path = %efi_dir.display(),
                "EFI directory present without efivars; NVRAM entries may not be writable"
            );
        }
        info!("UEFI firmware detected");
        FirmwareMode::Uefi
    } else {
        info!("BIOS firmware detected");
        FirmwareMode::Bios
    }
}

/// Probe endpoints, tried in order. DNS first, then HTTPS to a second provider.
const PROBE_ENDPOINTS: &[&str] = &["8.8.8.8:53", "1.1.1.1:443"];

/// Detect network connectivity with a two-tier TCP probe.
pub fn detect_internet() -> NetworkState {
    let timeout = Duration::from_secs(5);

    for endpoint in PROBE_ENDPOINTS {
        let addr: SocketAddr = match endpoint.parse() {
            Ok(addr) => addr,
            Err(e) => {
                warn!(%endpoint, "failed to parse probe address: {}", e);
                continue;
            }
        };

        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_stream) => {
                info!(%endpoint, "network connectivity confirmed");
                return NetworkState::Online;
            }
            Err(e) => warn!(%endpoint, "connectivity probe failed: {}", e),
        }
    }

    NetworkState::Offline
}

// ============================================================================
// Tests
// ============================================================================
