//! WiFi link + WireGuard node binary.
//!
//! Runs on both ESP32 and host platforms:
//! - **Host**: `cargo run --bin node -- node.json` (simulated radio and peer)
//! - **ESP32**: `cargo espflash flash --bin node --features esp32 --release`
//!
//! Without a config file the host build runs a small demo network.
//!
//! ## Endpoints
//!
//! - Status: http://localhost:8080/status

use log::{error, info, warn};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wireguard_esp32::config::TunnelConfig;
use wireguard_esp32::link::{LinkError, LinkManager, RadioDriver, SystemClock};
use wireguard_esp32::tunnel::{SimPeer, Tunnel};
use wireguard_esp32::{App, AppError, StatusBoard, StatusServer, DEFAULT_STATUS_PORT};

/// How often the components are ticked.
const TICK_INTERVAL: Duration = Duration::from_millis(100);

// ESP32: Initialize ESP-IDF before anything else
#[cfg(feature = "esp32")]
fn platform_init() {
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    info!("ESP-IDF initialized");
}

// Host: Just initialize env_logger
#[cfg(not(feature = "esp32"))]
fn platform_init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

/// The link never came up within the reboot window.
#[cfg(feature = "esp32")]
fn give_up() -> ! {
    error!("Restarting");
    unsafe { esp_idf_sys::esp_restart() }
}

#[cfg(not(feature = "esp32"))]
fn give_up() -> ! {
    error!("Exiting");
    std::process::exit(1)
}

#[cfg(feature = "esp32")]
async fn shutdown_signal() {
    std::future::pending::<()>().await
}

#[cfg(not(feature = "esp32"))]
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await
    }
}

// ESP32: credentials from NVS, open fallback AP for provisioning
#[cfg(feature = "esp32")]
mod platform {
    use super::*;
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use wireguard_esp32::config::{ApConfig, LinkConfig};
    use wireguard_esp32::wifi::{self, EspRadio};

    /// SSID of the fallback AP.
    const FALLBACK_AP_SSID: &str = "wireguard-node";

    pub type Radio = EspRadio<'static>;

    pub fn load() -> Result<(LinkManager<Radio>, Option<TunnelConfig>), Box<dyn std::error::Error>> {
        let peripherals = Peripherals::take()?;
        let sysloop = EspSystemEventLoop::take()?;
        let partition = EspDefaultNvsPartition::take()?;

        let nvs = wifi::init_nvs(partition.clone())?;
        let mut link = LinkConfig::with_candidates(wifi::load_candidates(&nvs));
        info!("Loaded {} stored network(s)", link.candidates.len());
        link.ap = Some(ApConfig::new(FALLBACK_AP_SSID, "")?);

        let radio = EspRadio::new(peripherals.modem, sysloop, Some(partition))?;
        Ok((LinkManager::new(link, radio, SystemClock::new()), None))
    }
}

// Host: JSON config and a simulated radio that sees every configured network
#[cfg(not(feature = "esp32"))]
mod platform {
    use super::*;
    use wireguard_esp32::config::{self, Bssid, Candidate, NodeConfig};
    use wireguard_esp32::link::{ScanResult, SimNetwork, SimRadio};

    const DEMO_CONFIG: &str = r#"{
        "link": {
            "candidates": [
                { "ssid": "home", "password": "correcthorse", "priority": 1.0 },
                { "ssid": "office", "password": "batterystaple" }
            ],
            "ap": { "ssid": "wireguard-node", "password": "" }
        },
        "tunnel": {
            "private_key": "yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=",
            "peer_public_key": "xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg=",
            "local_ip": "10.6.0.2",
            "endpoint": "vpn.example.net",
            "port": 51820
        }
    }"#;

    pub type Radio = SimRadio;

    pub fn load() -> Result<(LinkManager<Radio>, Option<TunnelConfig>), Box<dyn std::error::Error>> {
        let config = match std::env::args().nth(1) {
            Some(path) => {
                info!("Loading config from {}", path);
                config::load_from_path(path)?
            }
            None => {
                info!("No config file given, running the demo network");
                NodeConfig::from_json(DEMO_CONFIG)?
            }
        };
        let radio = SimRadio::new(visible_networks(&config.link.candidates));
        Ok((LinkManager::new(config.link, radio, SystemClock::new()), config.tunnel))
    }

    /// One access point per candidate, weaker the further down the list.
    fn visible_networks(candidates: &[Candidate]) -> Vec<SimNetwork> {
        candidates
            .iter()
            .zip(1u8..)
            .map(|(candidate, n)| {
                let bssid = candidate.bssid.unwrap_or(Bssid([0x02, 0, 0, 0, 0, n]));
                let rssi = (-45i16 - 10 * i16::from(n)).max(-100) as i8;
                SimNetwork::new(
                    ScanResult::new(candidate.ssid.clone(), bssid, rssi, 6),
                    candidate.password.clone(),
                )
            })
            .collect()
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    platform_init();

    info!("=== WireGuard node starting ===");

    #[cfg(feature = "esp32")]
    info!("Platform: ESP32");
    #[cfg(not(feature = "esp32"))]
    info!("Platform: Host");

    let (link, tunnel_config) = match platform::load() {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("Startup failed: {}", e);
            give_up();
        }
    };

    // Start status server
    let board = Arc::new(StatusBoard::new());
    let _status_server = match StatusServer::start(None, DEFAULT_STATUS_PORT, board.clone()) {
        Ok(server) => Some(server),
        Err(e) => {
            warn!("Failed to start status server: {}", e);
            None
        }
    };

    run(link, tunnel_config, board).await;
    info!("=== WireGuard node stopped ===");
}

async fn run<R: RadioDriver + 'static>(
    link: LinkManager<R>,
    tunnel_config: Option<TunnelConfig>,
    board: Arc<StatusBoard>,
) {
    let link = Rc::new(RefCell::new(link));
    let tunnel = tunnel_config.map(|cfg| Rc::new(RefCell::new(Tunnel::new(cfg, SimPeer::new()))));

    let mut app = App::new();
    app.register(Box::new(Rc::clone(&link)));
    if let Some(tunnel) = &tunnel {
        app.register(Box::new(Rc::clone(tunnel)));
    }

    // Set up cancellation
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutting down...");
        signal_cancel.cancel();
    });

    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match app.tick() {
            Ok(()) => {}
            Err(AppError::Link(e @ LinkError::RebootTimeout { .. })) => {
                error!("{}", e);
                give_up();
            }
            Err(e) => warn!("{}", e),
        }

        board.publish(link.borrow().dump_diagnostics());
        if let Some(tunnel) = &tunnel {
            board.publish_tunnel(tunnel.borrow().status());
        }
    }

    drop(app);
    drop(tunnel);
    link.borrow_mut().shutdown();
}
