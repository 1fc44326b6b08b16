//! Station credential provisioning for ESP32.
//!
//! Adds one network to the candidate list stored in NVS. A network with the
//! same SSID is replaced; the list holds at most
//! `MAX_STORED_CANDIDATES` entries.
//!
//! Usage:
//!   WIFI_SSID="MyNetwork" WIFI_PASSWORD="secret" cargo espflash flash --features esp32 --bin configure-wifi --monitor
//!
//! For open networks (no password):
//!   WIFI_SSID="OpenNetwork" WIFI_PASSWORD="" cargo espflash flash --features esp32 --bin configure-wifi --monitor
//!
//! To forget every stored network:
//!   WIFI_CLEAR=1 cargo espflash flash --features esp32 --bin configure-wifi --monitor

/// WiFi SSID - set via WIFI_SSID environment variable at compile time.
#[cfg(feature = "esp32")]
const WIFI_SSID: Option<&str> = option_env!("WIFI_SSID");

/// WiFi password - set via WIFI_PASSWORD environment variable at compile time.
/// Empty string for open networks.
#[cfg(feature = "esp32")]
const WIFI_PASSWORD: Option<&str> = option_env!("WIFI_PASSWORD");

#[cfg(feature = "esp32")]
const WIFI_CLEAR: Option<&str> = option_env!("WIFI_CLEAR");

/// Print error message and halt. Pauses briefly so espflash monitor shows
/// the output before the process exits.
#[cfg(feature = "esp32")]
fn halt_with_error(msg: &str) -> ! {
    eprintln!("\n{}", msg);
    eprintln!("\n=== Configuration failed ===\n");
    std::thread::sleep(std::time::Duration::from_secs(2));
    std::process::exit(1);
}

#[cfg(feature = "esp32")]
fn main() {
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use wireguard_esp32::config::{Candidate, MAX_STORED_CANDIDATES};
    use wireguard_esp32::wifi::{clear_candidates, init_nvs, load_candidates, save_candidates};

    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    println!("\n=== WiFi Provisioning ===\n");

    let mut nvs = match EspDefaultNvsPartition::take().and_then(init_nvs) {
        Ok(nvs) => nvs,
        Err(e) => halt_with_error(&format!("Error initializing NVS: {:?}", e)),
    };

    if WIFI_CLEAR.is_some_and(|v| !v.is_empty()) {
        if let Err(e) = clear_candidates(&mut nvs) {
            halt_with_error(&format!("Error clearing NVS: {:?}", e));
        }
        println!("Stored networks cleared.");
        return;
    }

    let ssid = match WIFI_SSID {
        Some(s) if !s.is_empty() => s,
        _ => halt_with_error(
            "Error: WIFI_SSID environment variable not set at compile time.\n\n\
             Usage:\n  \
             WIFI_SSID=\"MyNetwork\" WIFI_PASSWORD=\"secret\" cargo espflash flash --features esp32 --bin configure-wifi --monitor",
        ),
    };
    let password = WIFI_PASSWORD.unwrap_or("");

    println!("SSID: {}", ssid);
    println!(
        "Password: {} ({} chars)",
        if password.is_empty() { "(none)" } else { "****" },
        password.len()
    );

    let candidate = match Candidate::new(ssid, password) {
        Ok(candidate) => candidate,
        Err(e) => halt_with_error(&format!("Error: {}", e)),
    };

    let mut stored = load_candidates(&nvs);
    stored.retain(|c| c.ssid != candidate.ssid);
    if stored.len() >= MAX_STORED_CANDIDATES {
        let dropped = stored.remove(0);
        println!("List full, forgetting '{}'", dropped.ssid);
    }
    stored.push(candidate);

    if let Err(e) = save_candidates(&mut nvs, &stored) {
        halt_with_error(&format!("Error saving to NVS: {}", e));
    }

    println!("\n=== {} network(s) stored ===", stored.len());
    for (i, c) in stored.iter().enumerate() {
        println!("  {}. {}{}", i + 1, c.ssid, if c.is_open() { " (open)" } else { "" });
    }
    println!("\n=== Done - you can disconnect the device ===\n");

    std::thread::sleep(std::time::Duration::from_secs(2));
}

#[cfg(not(feature = "esp32"))]
fn main() {
    eprintln!("This binary must be built for ESP32.");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  WIFI_SSID=\"MyNetwork\" WIFI_PASSWORD=\"secret\" cargo espflash flash --features esp32 --bin configure-wifi --monitor");
    std::process::exit(1);
}
