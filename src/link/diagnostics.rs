//! Read-only link snapshot.

use super::state::LinkState;
use crate::config::{Bssid, PowerSaveMode};
use std::fmt;
use std::net::Ipv4Addr;

/// Point-in-time view of the link manager, safe to hand to other threads.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkDiagnostics {
    pub state: LinkState,
    pub selected_ssid: Option<String>,
    pub selected_bssid: Option<Bssid>,
    pub ip: Option<Ipv4Addr>,
    pub retry_count: u8,
    pub candidates: usize,
    pub ap_configured: bool,
    pub ap_active: bool,
    pub fast_connect: bool,
    pub power_save: PowerSaveMode,
    pub last_scan_size: usize,
    /// Time spent in the current state.
    pub state_age_ms: u64,
    pub since_connected_ms: u64,
}

impl Default for LinkDiagnostics {
    fn default() -> Self {
        Self {
            state: LinkState::Off,
            selected_ssid: None,
            selected_bssid: None,
            ip: None,
            retry_count: 0,
            candidates: 0,
            ap_configured: false,
            ap_active: false,
            fast_connect: false,
            power_save: PowerSaveMode::None,
            last_scan_size: 0,
            state_age_ms: 0,
            since_connected_ms: 0,
        }
    }
}

impl LinkDiagnostics {
    /// Serialize to JSON.
    pub fn to_json(&self) -> String {
        format!(
            r#"{{"state":"{}","ssid":{},"bssid":{},"ip":{},"retry_count":{},"candidates":{},"ap":{{"configured":{},"active":{}}},"fast_connect":{},"power_save":"{}","last_scan_size":{},"state_age_ms":{},"since_connected_ms":{}}}"#,
            self.state,
            json_opt(self.selected_ssid.as_deref()),
            json_opt(self.selected_bssid.map(|b| b.to_string()).as_deref()),
            json_opt(self.ip.map(|ip| ip.to_string()).as_deref()),
            self.retry_count,
            self.candidates,
            self.ap_configured,
            self.ap_active,
            self.fast_connect,
            self.power_save,
            self.last_scan_size,
            self.state_age_ms,
            self.since_connected_ms
        )
    }
}

fn json_opt(value: Option<&str>) -> String {
    match value {
        Some(s) => format!("\"{}\"", json_escape(s)),
        None => "null".to_string(),
    }
}

/// SSIDs are arbitrary bytes on air; escape anything JSON cares about.
fn json_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

impl fmt::Display for LinkDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  State: {}", self.state)?;
        match (&self.selected_ssid, self.selected_bssid) {
            (Some(ssid), Some(bssid)) => writeln!(f, "  SSID: '{}' [{}]", ssid, bssid)?,
            (Some(ssid), None) => writeln!(f, "  SSID: '{}'", ssid)?,
            _ => writeln!(f, "  SSID: -")?,
        }
        match self.ip {
            Some(ip) => writeln!(f, "  IP Address: {}", ip)?,
            None => writeln!(f, "  IP Address: -")?,
        }
        writeln!(f, "  Retries: {}", self.retry_count)?;
        writeln!(f, "  Candidates: {}", self.candidates)?;
        writeln!(
            f,
            "  AP: {}",
            match (self.ap_configured, self.ap_active) {
                (false, _) => "not configured",
                (true, false) => "off",
                (true, true) => "on",
            }
        )?;
        writeln!(f, "  Fast connect: {}", self.fast_connect)?;
        write!(f, "  Power save: {}", self.power_save)
    }
}
