//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Project: trustedge — Privacy and trust at the edge.
//

//! Device fingerprinting for binding offline credentials to a single host.

use crate::crypto::compute_sha256;

/// One host-identifying signal and its string value.
struct Signal(&'static str, Option<String>);

/// Derives a stable per-machine identifier from the primary network
/// interface's MAC address, formed into a UUID the same way the reference
/// implementation does (the 48-bit address placed in the low bits of a
/// 128-bit integer, high bits zero), falling back to the hostname only when
/// no MAC address can be read.
fn machine_id() -> Option<String> {
    match mac_address::get_mac_address() {
        Ok(Some(mac)) => {
            let mut bytes = [0u8; 16];
            bytes[10..16].copy_from_slice(&mac.bytes());
            Some(uuid::Uuid::from_bytes(bytes).to_string())
        }
        _ => hostname(),
    }
}

fn hostname() -> Option<String> {
    // No net/ffi dependency in this crate's stack for hostname lookup; the
    // OS-provided env var covers the common case and matches what the CSV of
    // platform signals below already degrades to.
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::env::var("COMPUTERNAME").ok())
        .or_else(|| {
            std::process::Command::new("hostname")
                .output()
                .ok()
                .and_then(|out| String::from_utf8(out.stdout).ok())
                .map(|s| s.trim().to_string())
        })
        .filter(|s| !s.is_empty())
}

fn os_info() -> String {
    format!(
        "{}-{}-{}",
        std::env::consts::OS,
        std::env::consts::ARCH,
        std::env::consts::FAMILY
    )
}

fn cpu_info() -> Option<String> {
    std::fs::read_to_string("/proc/cpuinfo").ok().and_then(|contents| {
        contents
            .lines()
            .find(|line| line.starts_with("model name"))
            .and_then(|line| line.split(':').nth(1))
            .map(|s| s.trim().to_string())
    })
}

/// Derives a stable per-host fingerprint by concatenating available signals
/// (machine id, OS info, CPU id, hostname) with `|` and hashing with SHA-256.
///
/// Missing signals are omitted rather than substituted with a placeholder, so
/// the fingerprint degrades gracefully instead of aliasing hosts that happen to
/// be missing the same signal.
pub fn device_fingerprint() -> String {
    let signals = [
        Signal("machine_id", machine_id()),
        Signal("os", Some(os_info())),
        Signal("cpu", cpu_info()),
        Signal("hostname", hostname()),
    ];

    let joined = signals
        .into_iter()
        .filter_map(|Signal(_, value)| value)
        .collect::<Vec<_>>()
        .join("|");

    hex::encode(compute_sha256(joined.as_bytes()))
}

/// Device information broken out for diagnostic/audit display. Never log the
/// `fingerprint` field in full — callers should truncate to a short prefix.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub fingerprint: String,
    pub machine_id: Option<String>,
    pub os: String,
    pub cpu: Option<String>,
    pub hostname: Option<String>,
}

pub fn device_info() -> DeviceInfo {
    DeviceInfo {
        fingerprint: device_fingerprint(),
        machine_id: machine_id(),
        os: os_info(),
        cpu: cpu_info(),
        hostname: hostname(),
    }
}
