//! ESP-IDF radio driver.
//!
//! Wraps `EspWifi` without the blocking helper: every request returns right
//! away and the link manager polls for completion. Disconnect events arrive
//! on the system event loop and only flip an atomic flag.

use crate::config::{ApConfig, Bssid, ManualIp, PowerSaveMode};
use crate::link::{ConnectionStatus, RadioDriver, ScanResult, SelectedCandidate};
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::{EspSubscription, EspSystemEventLoop, System};
use esp_idf_svc::ipv4;
use esp_idf_svc::netif::{EspNetif, NetifConfiguration};
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::config::ScanConfig;
use esp_idf_svc::wifi::{
    AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, EspWifi, WifiEvent,
};
use esp_idf_sys::{self as sys, esp, EspError};
use log::{debug, warn};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Radio driver backed by the ESP-IDF WiFi stack.
pub struct EspRadio<'d> {
    wifi: EspWifi<'d>,
    client: ClientConfiguration,
    ap: Option<AccessPointConfiguration>,
    station: bool,
    ap_enabled: bool,
    connecting: bool,
    /// Static address currently bound to the station netif.
    sta_ip: Option<ManualIp>,
    output_power_dbm: Option<f32>,
    disconnected: Arc<AtomicBool>,
    _events: EspSubscription<'static, System>,
}

impl<'d> EspRadio<'d> {
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
    ) -> Result<Self, EspError> {
        let wifi = EspWifi::new(modem, sysloop.clone(), nvs)?;

        let disconnected = Arc::new(AtomicBool::new(false));
        let flag = disconnected.clone();
        let events = sysloop.subscribe::<WifiEvent, _>(move |event| {
            if matches!(event, WifiEvent::StaDisconnected(_)) {
                flag.store(true, Ordering::Release);
            }
        })?;

        Ok(Self {
            wifi,
            client: ClientConfiguration::default(),
            ap: None,
            station: false,
            ap_enabled: false,
            connecting: false,
            sta_ip: None,
            output_power_dbm: None,
            disconnected,
            _events: events,
        })
    }

    /// Push the cached configuration to the driver and start or stop it.
    fn apply(&mut self) -> Result<(), EspError> {
        let ap = self.ap.as_ref().filter(|_| self.ap_enabled);
        let config = match (self.station, ap) {
            (true, Some(ap)) => Configuration::Mixed(self.client.clone(), ap.clone()),
            (true, None) => Configuration::Client(self.client.clone()),
            (false, Some(ap)) => Configuration::AccessPoint(ap.clone()),
            (false, None) => {
                if self.wifi.is_started()? {
                    self.wifi.stop()?;
                }
                return Ok(());
            }
        };

        self.wifi.set_configuration(&config)?;
        if !self.wifi.is_started()? {
            self.wifi.start()?;
            // TX power can only be set on a started driver
            if let Some(dbm) = self.output_power_dbm {
                set_max_tx_power(dbm)?;
            }
        }
        Ok(())
    }

    fn bind_sta_ip(&mut self, manual_ip: Option<ManualIp>) -> Result<(), EspError> {
        if self.sta_ip == manual_ip {
            return Ok(());
        }
        let netif = EspNetif::new_with_conf(&sta_netif_config(manual_ip.as_ref()))?;
        self.wifi.swap_netif_sta(netif)?;
        self.sta_ip = manual_ip;
        Ok(())
    }

    fn report(&self, what: &str, result: Result<(), EspError>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("WiFi {} failed: {}", what, e);
                false
            }
        }
    }
}

impl RadioDriver for EspRadio<'_> {
    fn set_mode(&mut self, station: bool, ap: bool) -> bool {
        self.station = station;
        self.ap_enabled = ap;
        if !station {
            self.connecting = false;
        }
        let result = self.apply();
        self.report("mode change", result)
    }

    fn start_scan(&mut self) -> bool {
        if !self.station {
            return false;
        }
        let result = self.wifi.start_scan(&ScanConfig::default(), false);
        self.report("scan start", result)
    }

    fn scan_complete(&mut self) -> bool {
        self.wifi.is_scan_done().unwrap_or(false)
    }

    fn scan_results(&mut self) -> Vec<ScanResult> {
        match self.wifi.get_scan_result() {
            Ok(records) => records
                .iter()
                .map(|ap| ScanResult::new(ap.ssid.as_str(), Bssid(ap.bssid), ap.signal_strength, ap.channel))
                .collect(),
            Err(e) => {
                warn!("Reading scan results failed: {}", e);
                Vec::new()
            }
        }
    }

    fn connect(&mut self, target: &SelectedCandidate) -> bool {
        let candidate = &target.candidate;
        let (Ok(ssid), Ok(password)) = (candidate.ssid.as_str().try_into(), candidate.password.as_str().try_into())
        else {
            warn!("Credentials for '{}' do not fit the driver", candidate.ssid);
            return false;
        };
        self.client = ClientConfiguration {
            ssid,
            password,
            bssid: target.bssid.map(|b| b.0),
            channel: target.channel,
            auth_method: if candidate.is_open() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        };

        let result = self
            .bind_sta_ip(candidate.manual_ip)
            .and_then(|_| self.apply())
            .and_then(|_| {
                self.disconnected.store(false, Ordering::Release);
                self.wifi.connect()
            });
        self.connecting = self.report("connect", result);
        self.connecting
    }

    fn connection_status(&mut self) -> ConnectionStatus {
        if self.wifi.is_up().unwrap_or(false) {
            self.connecting = false;
            return ConnectionStatus::Up;
        }
        if self.connecting {
            if self.disconnected.swap(false, Ordering::AcqRel) {
                self.connecting = false;
                return ConnectionStatus::Down;
            }
            return ConnectionStatus::Pending;
        }
        ConnectionStatus::Down
    }

    fn disconnect(&mut self) -> bool {
        self.connecting = false;
        if self.wifi.is_scan_done().is_ok_and(|done| !done) {
            let result = self.wifi.stop_scan();
            self.report("scan stop", result);
        }
        if !self.wifi.is_connected().unwrap_or(false) {
            return true;
        }
        let result = self.wifi.disconnect();
        self.report("disconnect", result)
    }

    fn start_ap(&mut self, config: &ApConfig) -> bool {
        if !self.ap_enabled {
            return false;
        }
        let (Ok(ssid), Ok(password)) = (config.ssid.as_str().try_into(), config.password.as_str().try_into())
        else {
            warn!("AP credentials do not fit the driver");
            return false;
        };
        self.ap = Some(AccessPointConfiguration {
            ssid,
            password,
            ssid_hidden: config.hidden,
            channel: config.channel.unwrap_or(1),
            auth_method: if config.password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        });

        if let Some(manual_ip) = config.manual_ip {
            let result = EspNetif::new_with_conf(&ap_netif_config(&manual_ip))
                .and_then(|netif| self.wifi.swap_netif_ap(netif).map(|_| ()));
            if !self.report("AP address", result) {
                return false;
            }
        }

        let result = self.apply();
        self.report("AP start", result)
    }

    fn stop_ap(&mut self) -> bool {
        self.ap_enabled = false;
        let result = self.apply();
        self.report("AP stop", result)
    }

    fn current_ip(&self) -> Option<Ipv4Addr> {
        if !self.wifi.is_up().unwrap_or(false) {
            return None;
        }
        self.wifi.sta_netif().get_ip_info().ok().map(|info| info.ip)
    }

    fn apply_power_save(&mut self, mode: PowerSaveMode) -> bool {
        let ps = match mode {
            PowerSaveMode::None => sys::wifi_ps_type_t_WIFI_PS_NONE,
            PowerSaveMode::Light => sys::wifi_ps_type_t_WIFI_PS_MIN_MODEM,
            PowerSaveMode::High => sys::wifi_ps_type_t_WIFI_PS_MAX_MODEM,
        };
        debug!("Setting power save {}", mode);
        let result = esp!(unsafe { sys::esp_wifi_set_ps(ps) });
        self.report("power save", result)
    }

    fn apply_output_power(&mut self, dbm: f32) -> bool {
        self.output_power_dbm = Some(dbm);
        if !self.wifi.is_started().unwrap_or(false) {
            // Applied once the driver starts
            return true;
        }
        let result = set_max_tx_power(dbm);
        self.report("output power", result)
    }
}

/// TX power is set in units of 0.25 dBm.
fn set_max_tx_power(dbm: f32) -> Result<(), EspError> {
    let quarter_dbm = (dbm * 4.0) as i8;
    esp!(unsafe { sys::esp_wifi_set_max_tx_power(quarter_dbm) })
}

fn sta_netif_config(manual_ip: Option<&ManualIp>) -> NetifConfiguration {
    let Some(ip) = manual_ip else {
        return NetifConfiguration::wifi_default_client();
    };
    let mut dns = ip.dns_servers();
    NetifConfiguration {
        ip_configuration: Some(ipv4::Configuration::Client(ipv4::ClientConfiguration::Fixed(
            ipv4::ClientSettings {
                ip: ip.static_ip,
                subnet: ipv4::Subnet {
                    gateway: ip.gateway,
                    mask: ipv4::Mask(ip.prefix_len().unwrap_or(24)),
                },
                dns: dns.next(),
                secondary_dns: dns.next(),
            },
        ))),
        ..NetifConfiguration::wifi_default_client()
    }
}

fn ap_netif_config(ip: &ManualIp) -> NetifConfiguration {
    let mut dns = ip.dns_servers();
    NetifConfiguration {
        ip_configuration: Some(ipv4::Configuration::Router(ipv4::RouterConfiguration {
            subnet: ipv4::Subnet {
                gateway: ip.static_ip,
                mask: ipv4::Mask(ip.prefix_len().unwrap_or(24)),
            },
            dhcp_enabled: true,
            dns: dns.next(),
            secondary_dns: dns.next(),
        })),
        ..NetifConfiguration::wifi_default_router()
    }
}
