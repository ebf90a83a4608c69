//! Hardware identity probe.
//!
//! Derives the fingerprint the server binds every session to. Three
//! host attributes are probed; any that cannot be read degrades to a
//! named placeholder so the result is always well-defined and stable
//! for the host. The concatenation is hashed with SHA-256 and rendered
//! as uppercase hex. Computed once per process.

use flashlock_crypto::sha256_hex_upper;
use std::sync::OnceLock;

/// Substituted when the processor identifier cannot be read.
pub const CPU_ID_FALLBACK: &str = "UNKNOWN-CPU";
/// Substituted when the baseboard serial cannot be read.
pub const BOARD_SERIAL_FALLBACK: &str = "UNKNOWN-BOARD";
/// Substituted when the firmware serial cannot be read.
pub const FIRMWARE_SERIAL_FALLBACK: &str = "UNKNOWN-FIRMWARE";

const DELIMITER: char = '|';

static FINGERPRINT: OnceLock<String> = OnceLock::new();

/// The hardware fingerprint for this host, cached for process lifetime.
pub fn fingerprint() -> &'static str {
    FINGERPRINT.get_or_init(compute_fingerprint)
}

fn compute_fingerprint() -> String {
    let cpu = probe_cpu_id();
    let board = probe_board_serial();
    let firmware = probe_firmware_serial();

    if cpu.is_none() && board.is_none() && firmware.is_none() {
        // Weakest identity we can offer: the fingerprint degenerates to
        // host name + user name and loses its hardware binding.
        tracing::warn!(
            "No hardware identifiers readable; falling back to host/user fingerprint"
        );
        let fallback = format!("{}{}{}", host_name(), DELIMITER, user_name());
        return sha256_hex_upper(fallback.as_bytes());
    }

    fingerprint_from_parts(
        cpu.as_deref().unwrap_or(CPU_ID_FALLBACK),
        board.as_deref().unwrap_or(BOARD_SERIAL_FALLBACK),
        firmware.as_deref().unwrap_or(FIRMWARE_SERIAL_FALLBACK),
    )
}

fn fingerprint_from_parts(cpu: &str, board: &str, firmware: &str) -> String {
    let joined = format!("{cpu}{DELIMITER}{board}{DELIMITER}{firmware}");
    sha256_hex_upper(joined.as_bytes())
}

fn read_trimmed(path: &str) -> Option<String> {
    let value = std::fs::read_to_string(path).ok()?;
    let value = value.trim();
    if value.is_empty() || value == "None" {
        return None;
    }
    Some(value.to_string())
}

#[cfg(target_os = "linux")]
fn probe_cpu_id() -> Option<String> {
    // SoC serial where exposed (ARM); x86 hosts fall through to the
    // placeholder since modern CPUs carry no readable serial.
    read_trimmed("/sys/devices/soc0/serial_number").or_else(|| {
        let cpuinfo = std::fs::read_to_string("/proc/cpuinfo").ok()?;
        cpuinfo
            .lines()
            .find(|line| line.starts_with("Serial"))
            .and_then(|line| line.split(':').nth(1))
            .map(|serial| serial.trim().to_string())
            .filter(|serial| !serial.is_empty())
    })
}

#[cfg(target_os = "linux")]
fn probe_board_serial() -> Option<String> {
    read_trimmed("/sys/class/dmi/id/board_serial")
        .or_else(|| read_trimmed("/sys/class/dmi/id/product_serial"))
}

#[cfg(target_os = "linux")]
fn probe_firmware_serial() -> Option<String> {
    read_trimmed("/sys/class/dmi/id/product_uuid")
        .or_else(|| read_trimmed("/sys/class/dmi/id/chassis_serial"))
}

#[cfg(not(target_os = "linux"))]
fn probe_cpu_id() -> Option<String> {
    None
}

#[cfg(not(target_os = "linux"))]
fn probe_board_serial() -> Option<String> {
    None
}

#[cfg(not(target_os = "linux"))]
fn probe_firmware_serial() -> Option<String> {
    None
}

fn host_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|name| !name.is_empty())
        .or_else(|| read_trimmed("/etc/hostname"))
        .unwrap_or_else(|| "localhost".to_string())
}

fn user_name() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "user".to_string())
}
