//! Network link manager.
//!
//! A single-threaded state machine that decides when to scan, which
//! candidate to connect to, when to retry, and when to bring up the
//! fallback access point. All decisions happen inside [`LinkManager::tick`];
//! radio requests never block and their outcome is polled on later ticks.
//!
//! # Flow
//!
//! ```text
//! Off ─setup─> Scanning ─match─> Connecting ─ok─> Connected
//!                 │                  │fail           │drop
//!                 │timeout           v               │
//!                 │            ConnectingRetry ─ok───┘
//!                 v                  │fail
//!              Cooldown <────────────┘  (<── drop)
//!                 └──elapsed──> Scanning
//! ```
//!
//! With no station candidates, setup goes straight to `ApOnly`.

use super::candidates::CandidateStore;
use super::clock::{Clock, SystemClock};
use super::diagnostics::LinkDiagnostics;
use super::radio::{ConnectionStatus, RadioDriver};
use super::scan::{self, ScanResult, SelectedCandidate};
use super::state::LinkState;
use crate::component::{setup_priority, AppError, Component};
use crate::config::{ApConfig, ConfigError, LinkConfig, Timeouts};
use log::{debug, error, info, warn};
use std::fmt;
use std::net::Ipv4Addr;

/// Address the radio gives its own AP when no static one is configured.
pub const DEFAULT_AP_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);

/// Demotion applied to a BSSID after a full failed connection cycle.
const FAILED_BSSID_PENALTY: f32 = 1.0;

/// WiFi link state machine.
pub struct LinkManager<R, C = SystemClock> {
    radio: R,
    clock: C,
    /// Link settings; candidates live in `store`.
    config: LinkConfig,
    store: CandidateStore,
    state: LinkState,
    selected: Option<SelectedCandidate>,
    scan_results: Vec<ScanResult>,
    action_started: u64,
    last_connected: u64,
    /// Consecutive failed connection cycles since the last success.
    retry_count: u8,
    ap_active: bool,
    /// When the last AP bring-up failed; retries wait one cooldown period.
    ap_failed_at: Option<u64>,
    /// A radio request was rejected synchronously; handled on the next tick.
    pending_failure: bool,
    config_error: bool,
    fatal_raised: bool,
}

impl<R: RadioDriver, C: Clock> LinkManager<R, C> {
    /// Create a manager. Nothing touches the radio until [`setup`](Self::setup).
    pub fn new(mut config: LinkConfig, radio: R, clock: C) -> Self {
        let store = CandidateStore::from_candidates(std::mem::take(&mut config.candidates));
        Self {
            radio,
            clock,
            config,
            store,
            state: LinkState::Off,
            selected: None,
            scan_results: Vec::new(),
            action_started: 0,
            last_connected: 0,
            retry_count: 0,
            ap_active: false,
            ap_failed_at: None,
            pending_failure: false,
            config_error: false,
            fatal_raised: false,
        }
    }

    // ==================== Host entry points ====================

    /// One-time initialization.
    ///
    /// On a configuration error the manager stays `Off` for good and
    /// [`can_proceed`](Self::can_proceed) never turns true.
    pub fn setup(&mut self) -> Result<(), LinkError> {
        if self.state != LinkState::Off {
            return Ok(());
        }
        if let Err(e) = self.validate() {
            error!("WiFi setup failed: {}", e);
            self.config_error = true;
            return Err(LinkError::Config(e));
        }

        let now = self.clock.now_ms();
        self.last_connected = now;
        self.apply_radio_settings();

        if self.has_sta() {
            let with_ap = self.has_ap() && self.config.timeouts.ap_ms == 0;
            info!(
                "Starting WiFi station with {} candidate(s){}",
                self.store.len(),
                if with_ap { " and AP" } else { "" }
            );
            if !self.radio.set_mode(true, with_ap) {
                warn!("Radio rejected station mode");
                self.pending_failure = true;
            }
            if with_ap {
                self.ap_active = self.bring_up_ap(now);
            }
            self.begin_scan(now);
        } else {
            info!("Starting WiFi in AP-only mode");
            if !self.radio.set_mode(false, true) {
                warn!("Radio rejected AP mode");
            }
            self.ap_active = self.bring_up_ap(now);
            self.transition(LinkState::ApOnly, now);
        }
        Ok(())
    }

    /// Advance the state machine by at most one transition.
    ///
    /// Returns [`LinkError::RebootTimeout`] once when no connection could be
    /// made within the reboot window; everything else is handled internally.
    pub fn tick(&mut self) -> Result<(), LinkError> {
        if self.config_error {
            return Ok(());
        }
        let now = self.clock.now_ms();

        match self.state {
            LinkState::Off => return Ok(()),
            LinkState::ApOnly => self.tick_ap_only(now),
            LinkState::Cooldown => self.tick_cooldown(now),
            LinkState::Scanning => self.tick_scanning(now),
            LinkState::Connecting | LinkState::ConnectingRetry => self.tick_connecting(now),
            LinkState::Connected => self.tick_connected(now),
        }

        self.check_reboot_timeout(now)
    }

    /// Tear everything down and return to `Off`.
    pub fn shutdown(&mut self) {
        if self.state == LinkState::Off {
            return;
        }
        let now = self.clock.now_ms();
        info!("Shutting down WiFi");
        if self.state.is_active() {
            self.radio.disconnect();
        }
        if self.ap_active {
            self.radio.stop_ap();
            self.ap_active = false;
        }
        self.radio.set_mode(false, false);
        self.selected = None;
        self.pending_failure = false;
        self.transition(LinkState::Off, now);
    }

    /// Whether work that needs the network may proceed.
    ///
    /// True when connected, or in AP-only mode once the AP is up.
    pub fn can_proceed(&self) -> bool {
        match self.state {
            LinkState::Connected => true,
            LinkState::ApOnly => self.ap_active,
            _ => false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }

    /// Read-only snapshot for logging and the status endpoint.
    pub fn dump_diagnostics(&self) -> LinkDiagnostics {
        let now = self.clock.now_ms();
        LinkDiagnostics {
            state: self.state,
            selected_ssid: self.selected.as_ref().map(|s| s.ssid().to_string()),
            selected_bssid: self.selected.as_ref().and_then(|s| s.bssid),
            ip: self.ip_address(),
            retry_count: self.retry_count,
            candidates: self.store.len(),
            ap_configured: self.has_ap(),
            ap_active: self.ap_active,
            fast_connect: self.config.fast_connect,
            power_save: self.config.power_save,
            last_scan_size: self.scan_results.len(),
            state_age_ms: now.saturating_sub(self.action_started),
            since_connected_ms: now.saturating_sub(self.last_connected),
        }
    }

    // ==================== Accessors ====================

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn retry_count(&self) -> u8 {
        self.retry_count
    }

    pub fn selected(&self) -> Option<&SelectedCandidate> {
        self.selected.as_ref()
    }

    pub fn scan_results(&self) -> &[ScanResult] {
        &self.scan_results
    }

    pub fn store(&self) -> &CandidateStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut CandidateStore {
        &mut self.store
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.config.timeouts
    }

    pub fn has_sta(&self) -> bool {
        !self.store.is_empty()
    }

    pub fn has_ap(&self) -> bool {
        self.config.ap.is_some()
    }

    pub fn ap_active(&self) -> bool {
        self.ap_active
    }

    /// Station address when connected, else the AP address when it is up.
    pub fn ip_address(&self) -> Option<Ipv4Addr> {
        if self.state == LinkState::Connected {
            return self.radio.current_ip();
        }
        if self.ap_active {
            return self
                .config
                .ap
                .as_ref()
                .and_then(|ap| ap.manual_ip)
                .map(|ip| ip.static_ip)
                .or(Some(DEFAULT_AP_IP));
        }
        None
    }

    // ==================== Per-state ticks ====================

    fn tick_ap_only(&mut self, now: u64) {
        if !self.ap_active && self.ap_retry_due(now) {
            self.ap_active = self.bring_up_ap(now);
        }
    }

    fn tick_cooldown(&mut self, now: u64) {
        self.start_fallback_ap(now);
        if now.saturating_sub(self.action_started) >= self.config.timeouts.cooldown_ms {
            self.begin_scan(now);
        }
    }

    fn tick_scanning(&mut self, now: u64) {
        if std::mem::take(&mut self.pending_failure) {
            warn!("WiFi scan failed to start");
            self.enter_cooldown(now, false);
            return;
        }

        if self.radio.scan_complete() {
            self.scan_results = self.radio.scan_results();
            for result in &self.scan_results {
                debug!(
                    "- '{}' {} ch{} {} dBm",
                    result.ssid, result.bssid, result.channel, result.rssi
                );
            }
            self.after_scan(now);
            return;
        }

        if now.saturating_sub(self.action_started) > self.config.timeouts.scan_ms {
            warn!("Timeout while scanning");
            self.enter_cooldown(now, false);
        }
    }

    fn after_scan(&mut self, now: u64) {
        if let Some(selected) = scan::select(&self.store, &self.scan_results) {
            info!(
                "Found '{}' ({} dBm) among {} scan result(s)",
                selected.ssid(),
                selected.rssi.unwrap_or_default(),
                self.scan_results.len()
            );
            self.start_connecting(selected, LinkState::Connecting, now);
            return;
        }

        if !self.config.fast_connect {
            if let Some(candidate) = self.store.best_known() {
                info!(
                    "No configured network visible, trying '{}' anyway",
                    candidate.ssid
                );
                let selected = SelectedCandidate::blind(candidate);
                self.start_connecting(selected, LinkState::Connecting, now);
                return;
            }
        }

        if now.saturating_sub(self.action_started) > self.config.timeouts.scan_ms {
            warn!("No configured network visible");
            self.enter_cooldown(now, false);
            return;
        }
        info!("No configured network visible, scanning again");
        if !self.radio.start_scan() {
            self.pending_failure = true;
        }
    }

    fn tick_connecting(&mut self, now: u64) {
        let status = if std::mem::take(&mut self.pending_failure) {
            ConnectionStatus::Down
        } else {
            self.radio.connection_status()
        };

        let timed_out =
            now.saturating_sub(self.action_started) > self.config.timeouts.connect_ms;
        match status {
            ConnectionStatus::Up => {
                self.enter_connected(now);
                return;
            }
            ConnectionStatus::Pending if !timed_out => return,
            ConnectionStatus::Pending => warn!("Timeout while connecting to WiFi"),
            ConnectionStatus::Down => warn!("WiFi connection failed"),
        }

        if self.state == LinkState::Connecting {
            self.radio.disconnect();
            match self.selected.clone() {
                Some(selected) => {
                    info!("Retrying '{}'", selected.ssid());
                    self.start_connecting(selected, LinkState::ConnectingRetry, now);
                }
                None => {
                    self.pending_failure = true;
                    self.transition(LinkState::ConnectingRetry, now);
                }
            }
        } else {
            self.demote_failed_bssid();
            self.enter_cooldown(now, true);
        }
    }

    fn tick_connected(&mut self, now: u64) {
        if self.radio.connection_status() == ConnectionStatus::Up {
            self.last_connected = now;
            return;
        }
        warn!("WiFi connection lost");
        self.enter_cooldown(now, false);
    }

    // ==================== Transitions and side effects ====================

    fn transition(&mut self, to: LinkState, now: u64) {
        debug_assert!(
            self.state.can_transition_to(to),
            "illegal link transition {} -> {}",
            self.state,
            to
        );
        debug!("WiFi state {} -> {}", self.state, to);
        self.state = to;
        self.action_started = now;
    }

    fn begin_scan(&mut self, now: u64) {
        debug!("Starting WiFi scan");
        if !self.radio.start_scan() {
            self.pending_failure = true;
        }
        self.transition(LinkState::Scanning, now);
    }

    fn start_connecting(&mut self, mut selected: SelectedCandidate, to: LinkState, now: u64) {
        if selected.candidate.manual_ip.is_none() {
            selected.candidate.manual_ip = self.config.manual_ip;
        }
        match selected.bssid {
            Some(bssid) => info!("Connecting to '{}' ({})", selected.ssid(), bssid),
            None => info!("Connecting to '{}'", selected.ssid()),
        }
        if !self.radio.connect(&selected) {
            warn!("Radio rejected connect request");
            self.pending_failure = true;
        }
        self.selected = Some(selected);
        self.transition(to, now);
    }

    fn enter_connected(&mut self, now: u64) {
        match self.radio.current_ip() {
            Some(ip) => info!("WiFi connected, IP: {}", ip),
            None => info!("WiFi connected"),
        }
        self.last_connected = now;
        self.retry_count = 0;
        self.fatal_raised = false;

        if self.ap_active {
            info!("Disabling fallback AP");
            self.radio.stop_ap();
            self.ap_active = false;
        }
        if self.has_ap() && !self.radio.set_mode(true, false) {
            warn!("Radio rejected station-only mode");
        }
        self.transition(LinkState::Connected, now);
    }

    /// Abort whatever is in flight and wait before the next scan.
    fn enter_cooldown(&mut self, now: u64, failed_cycle: bool) {
        self.radio.disconnect();
        self.pending_failure = false;
        // Counts attempts since the last Cooldown entry
        self.retry_count = u8::from(failed_cycle);
        self.start_fallback_ap(now);
        self.transition(LinkState::Cooldown, now);
    }

    fn start_fallback_ap(&mut self, now: u64) {
        if self.ap_active || !self.has_ap() {
            return;
        }
        if now.saturating_sub(self.last_connected) < self.config.timeouts.ap_ms {
            return;
        }
        if !self.ap_retry_due(now) {
            return;
        }
        if !self.radio.set_mode(true, true) {
            warn!("Radio rejected station+AP mode");
        }
        self.ap_active = self.bring_up_ap(now);
    }

    fn ap_retry_due(&self, now: u64) -> bool {
        self.ap_failed_at
            .map_or(true, |t| now.saturating_sub(t) >= self.config.timeouts.cooldown_ms)
    }

    fn bring_up_ap(&mut self, now: u64) -> bool {
        let Some(ap) = self.config.ap.as_ref() else {
            return false;
        };
        if self.radio.start_ap(ap) {
            info!("AP '{}' started", ap.ssid);
            self.ap_failed_at = None;
            true
        } else {
            warn!("Failed to start AP '{}'", ap.ssid);
            self.ap_failed_at = Some(now);
            false
        }
    }

    fn demote_failed_bssid(&mut self) {
        let Some(bssid) = self.selected.as_ref().and_then(|s| s.bssid) else {
            return;
        };
        let current = self.store.priority(&bssid).unwrap_or(0.0);
        debug!("Lowering priority of {} to {}", bssid, current - FAILED_BSSID_PENALTY);
        self.store
            .set_priority(bssid, current - FAILED_BSSID_PENALTY);
    }

    fn check_reboot_timeout(&mut self, now: u64) -> Result<(), LinkError> {
        let limit = self.config.timeouts.reboot_ms;
        if limit == 0 || !self.has_sta() || self.fatal_raised {
            return Ok(());
        }
        if self.state == LinkState::Connected {
            return Ok(());
        }
        let since_ms = now.saturating_sub(self.last_connected);
        if since_ms > limit {
            self.fatal_raised = true;
            error!("Could not connect to WiFi for {} ms, giving up", since_ms);
            return Err(LinkError::RebootTimeout { since_ms });
        }
        Ok(())
    }

    // ==================== Setup helpers ====================

    fn validate(&self) -> Result<(), ConfigError> {
        if self.store.is_empty() && !self.has_ap() {
            return Err(ConfigError::NothingConfigured);
        }
        for candidate in self.store.candidates() {
            candidate.validate()?;
        }
        self.config.validate_settings()
    }

    fn apply_radio_settings(&mut self) {
        if !self.radio.apply_power_save(self.config.power_save) {
            warn!("Failed to set power save mode {}", self.config.power_save);
        }
        if let Some(dbm) = self.config.output_power_dbm {
            if !self.radio.apply_output_power(dbm) {
                warn!("Failed to set output power {} dBm", dbm);
            }
        }
    }

    fn ap_config(&self) -> Option<&ApConfig> {
        self.config.ap.as_ref()
    }
}

impl<R: RadioDriver, C: Clock> Component for LinkManager<R, C> {
    fn name(&self) -> &'static str {
        "wifi"
    }

    fn setup_priority(&self) -> f32 {
        setup_priority::WIFI
    }

    fn setup(&mut self) -> Result<(), AppError> {
        LinkManager::setup(self).map_err(AppError::from)
    }

    fn tick(&mut self) -> Result<(), AppError> {
        LinkManager::tick(self).map_err(AppError::from)
    }

    fn can_proceed(&self) -> bool {
        LinkManager::can_proceed(self)
    }

    fn dump_config(&self) {
        info!("WiFi:\n{}", self.dump_diagnostics());
        if let Some(ap) = self.ap_config() {
            info!("  AP SSID: '{}'{}", ap.ssid, if ap.hidden { " (hidden)" } else { "" });
        }
        for entry in self.store.priorities() {
            info!("  Priority {}: {:.1}", entry.bssid, entry.priority);
        }
    }
}

/// Errors surfaced by the link manager to its host.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkError {
    /// Setup found an unusable configuration.
    Config(ConfigError),
    /// No connection for longer than the reboot timeout.
    RebootTimeout { since_ms: u64 },
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "WiFi configuration error: {}", e),
            Self::RebootTimeout { since_ms } => {
                write!(f, "no WiFi connection for {} ms", since_ms)
            }
        }
    }
}

impl std::error::Error for LinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::RebootTimeout { .. } => None,
        }
    }
}

impl From<ConfigError> for LinkError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}
