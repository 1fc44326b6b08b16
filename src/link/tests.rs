//! State machine scenarios driven through the simulated radio.

use super::*;
use crate::config::{ApConfig, Bssid, Candidate, ConfigError, LinkConfig, ManualIp, PowerSaveMode};
use std::net::Ipv4Addr;

const PASSWORD: &str = "password123";

fn bssid(last: u8) -> Bssid {
    Bssid([0x02, 0, 0, 0, 0, last])
}

fn network(ssid: &str, last: u8, rssi: i8) -> SimNetwork {
    SimNetwork::new(ScanResult::new(ssid, bssid(last), rssi, 6), PASSWORD)
}

fn candidate(ssid: &str, priority: Option<f32>) -> Candidate {
    let mut c = Candidate::new(ssid, PASSWORD).unwrap();
    c.priority = priority;
    c
}

fn fallback_ap() -> ApConfig {
    ApConfig::new("node-fallback", "fallback123").unwrap()
}

/// Drives a manager and checks every observed transition against the table.
struct Harness {
    manager: LinkManager<SimRadio, ManualClock>,
    clock: ManualClock,
    trace: Vec<LinkState>,
}

impl Harness {
    fn new(config: LinkConfig, radio: SimRadio) -> Self {
        let clock = ManualClock::new(0);
        Self {
            manager: LinkManager::new(config, radio, clock.clone()),
            clock,
            trace: Vec::new(),
        }
    }

    fn observe(&mut self, before: LinkState) {
        let after = self.manager.state();
        if before != after {
            assert!(
                before.can_transition_to(after),
                "illegal transition {} -> {}",
                before,
                after
            );
            self.trace.push(after);
        }
    }

    fn setup(&mut self) -> Result<(), LinkError> {
        let before = self.manager.state();
        let result = self.manager.setup();
        self.observe(before);
        result
    }

    fn tick(&mut self) -> Result<(), LinkError> {
        let before = self.manager.state();
        let result = self.manager.tick();
        self.observe(before);
        result
    }

    fn advance(&mut self, ms: u64) {
        self.clock.advance(ms);
    }

    fn state(&self) -> LinkState {
        self.manager.state()
    }

    fn radio(&mut self) -> &mut SimRadio {
        self.manager.radio_mut()
    }

    /// Tick (advancing `step_ms` before each tick) until `target` or give up.
    fn run_until(&mut self, target: LinkState, step_ms: u64, max_ticks: usize) -> bool {
        for _ in 0..max_ticks {
            if self.state() == target {
                return true;
            }
            self.advance(step_ms);
            let _ = self.tick();
        }
        self.state() == target
    }
}

// ==================== Selection scenarios ====================

#[test]
fn test_higher_priority_candidate_selected() {
    let config = LinkConfig::with_candidates(vec![
        candidate("home", Some(1.0)),
        candidate("office", Some(0.5)),
    ]);
    let radio = SimRadio::new(vec![network("office", 2, -40), network("home", 1, -70)]);
    let mut h = Harness::new(config, radio);

    h.setup().unwrap();
    assert_eq!(h.state(), LinkState::Scanning);
    h.tick().unwrap();
    assert_eq!(h.state(), LinkState::Connecting);
    assert_eq!(h.manager.selected().unwrap().ssid(), "home");

    h.tick().unwrap();
    assert_eq!(h.state(), LinkState::Connected);
    assert_eq!(h.radio().connect_log(), ["home"]);
    assert!(h.manager.can_proceed());
    assert!(h.manager.ip_address().is_some());
    assert_eq!(
        h.trace,
        [LinkState::Scanning, LinkState::Connecting, LinkState::Connected]
    );
}

#[test]
fn test_equal_priority_stronger_signal_selected() {
    let config = LinkConfig::with_candidates(vec![
        candidate("home", Some(0.0)),
        candidate("office", Some(0.0)),
    ]);
    let radio = SimRadio::new(vec![network("home", 1, -75), network("office", 2, -45)]);
    let mut h = Harness::new(config, radio);

    h.setup().unwrap();
    h.tick().unwrap();
    assert_eq!(h.manager.selected().unwrap().ssid(), "office");
    assert_eq!(h.manager.selected().unwrap().bssid, Some(bssid(2)));
}

#[test]
fn test_global_manual_ip_applied_to_selection() {
    let manual = ManualIp::new(
        Ipv4Addr::new(192, 168, 1, 50),
        Ipv4Addr::new(192, 168, 1, 1),
        Ipv4Addr::new(255, 255, 255, 0),
    );
    let mut config = LinkConfig::with_candidates(vec![candidate("home", None)]);
    config.manual_ip = Some(manual);
    let mut h = Harness::new(config, SimRadio::new(vec![network("home", 1, -60)]));

    h.setup().unwrap();
    h.tick().unwrap();
    assert_eq!(
        h.manager.selected().unwrap().candidate.manual_ip,
        Some(manual)
    );
}

// ==================== Retry and fallback scenarios ====================

fn fail_twice(config: LinkConfig) -> Harness {
    let mut radio = SimRadio::new(vec![network("home", 1, -60)]);
    radio.failing_connects = 2;
    let mut h = Harness::new(config, radio);

    h.setup().unwrap();
    h.tick().unwrap();
    assert_eq!(h.state(), LinkState::Connecting);
    h.tick().unwrap();
    assert_eq!(h.state(), LinkState::ConnectingRetry);
    h.tick().unwrap();
    assert_eq!(h.state(), LinkState::Cooldown);
    h
}

#[test]
fn test_two_failures_enter_cooldown_without_ap() {
    let config = LinkConfig::with_candidates(vec![candidate("home", Some(1.0))]);
    let mut h = fail_twice(config);

    assert_eq!(
        h.trace,
        [
            LinkState::Scanning,
            LinkState::Connecting,
            LinkState::ConnectingRetry,
            LinkState::Cooldown
        ]
    );
    assert_eq!(h.manager.retry_count(), 1);
    assert_eq!(h.radio().connect_log(), ["home", "home"]);
    assert_eq!(h.radio().counters().ap_starts, 0);
    assert!(!h.radio().ap_running());
    assert!(!h.manager.can_proceed());
}

#[test]
fn test_two_failures_enter_cooldown_with_ap() {
    let mut config = LinkConfig::with_candidates(vec![candidate("home", Some(1.0))]);
    config.ap = Some(fallback_ap());
    let mut h = fail_twice(config);

    assert_eq!(h.manager.retry_count(), 1);
    assert!(h.radio().ap_running());
    assert!(h.manager.ap_active());
    assert_eq!(h.manager.ip_address(), Some(DEFAULT_AP_IP));
    // Fallback AP alone does not make a station device ready
    assert!(!h.manager.can_proceed());
}

#[test]
fn test_delayed_fallback_ap() {
    let mut config = LinkConfig::with_candidates(vec![candidate("home", None)]);
    config.ap = Some(fallback_ap());
    config.timeouts.ap_ms = 20_000;
    let mut h = fail_twice(config);

    // Not disconnected long enough yet
    assert!(!h.radio().ap_running());

    h.advance(20_000);
    h.tick().unwrap();
    assert!(h.radio().ap_running());
    assert_eq!(h.radio().counters().ap_starts, 1);
}

#[test]
fn test_failed_bssid_is_demoted() {
    let config = LinkConfig::with_candidates(vec![candidate("mesh", None)]);
    let mut radio = SimRadio::new(vec![network("mesh", 1, -40), network("mesh", 2, -70)]);
    radio.failing_connects = 2;
    let mut h = Harness::new(config, radio);

    h.setup().unwrap();
    h.tick().unwrap();
    assert_eq!(h.manager.selected().unwrap().bssid, Some(bssid(1)));
    h.tick().unwrap();
    h.tick().unwrap();
    assert_eq!(h.state(), LinkState::Cooldown);
    assert_eq!(h.manager.store().priority(&bssid(1)), Some(-1.0));

    // Next cycle prefers the other access point
    assert!(h.run_until(LinkState::Connecting, 5_000, 4));
    assert_eq!(h.manager.selected().unwrap().bssid, Some(bssid(2)));
    assert!(h.run_until(LinkState::Connected, 100, 4));
}

#[test]
fn test_retry_count_resets_on_every_cooldown_entry() {
    let config = LinkConfig::with_candidates(vec![candidate("home", None)]);
    let mut radio = SimRadio::new(vec![network("home", 1, -60)]);
    radio.failing_connects = 4;
    let mut h = Harness::new(config, radio);

    h.setup().unwrap();
    assert!(h.run_until(LinkState::Cooldown, 0, 5));
    assert_eq!(h.manager.retry_count(), 1);

    h.advance(5_000);
    h.tick().unwrap();
    assert_eq!(h.state(), LinkState::Scanning);
    assert!(h.run_until(LinkState::Cooldown, 0, 5));
    assert_eq!(h.manager.retry_count(), 1, "second failed cycle starts from zero");

    // A scan timeout is not a failed connect cycle
    h.radio().scan_delay_polls = u32::MAX;
    h.advance(5_000);
    h.tick().unwrap();
    assert_eq!(h.state(), LinkState::Scanning);
    h.advance(10_001);
    h.tick().unwrap();
    assert_eq!(h.state(), LinkState::Cooldown);
    assert_eq!(h.manager.retry_count(), 0);

    h.radio().scan_delay_polls = 0;
    assert!(h.run_until(LinkState::Connected, 1_000, 20));
    assert_eq!(h.manager.retry_count(), 0);
}

#[test]
fn test_connect_timeout_triggers_retry() {
    let config = LinkConfig::with_candidates(vec![candidate("home", None)]);
    let mut radio = SimRadio::new(vec![network("home", 1, -60)]);
    radio.connect_delay_polls = u32::MAX;
    let mut h = Harness::new(config, radio);

    h.setup().unwrap();
    h.tick().unwrap();
    assert_eq!(h.state(), LinkState::Connecting);

    h.advance(10_000);
    h.tick().unwrap();
    assert_eq!(h.state(), LinkState::Connecting, "timeout is strict");

    h.advance(1);
    h.tick().unwrap();
    assert_eq!(h.state(), LinkState::ConnectingRetry);

    h.advance(10_001);
    h.tick().unwrap();
    assert_eq!(h.state(), LinkState::Cooldown);
    assert_eq!(h.manager.retry_count(), 1);
}

#[test]
fn test_scan_timeout_enters_cooldown_and_starts_ap() {
    let mut config = LinkConfig::with_candidates(vec![candidate("home", None)]);
    config.ap = Some(fallback_ap());
    config.timeouts.ap_ms = 1;
    let mut h = Harness::new(config, SimRadio::hanging(vec![network("home", 1, -60)]));

    h.setup().unwrap();
    assert!(!h.radio().ap_running());
    h.advance(10_001);
    h.tick().unwrap();
    assert_eq!(h.state(), LinkState::Cooldown);
    assert!(h.radio().ap_running());
    assert_eq!(h.manager.retry_count(), 0);
}

#[test]
fn test_rejected_scan_is_a_failure() {
    let config = LinkConfig::with_candidates(vec![candidate("home", None)]);
    let mut radio = SimRadio::new(vec![network("home", 1, -60)]);
    radio.reject_scans = true;
    let mut h = Harness::new(config, radio);

    h.setup().unwrap();
    assert_eq!(h.state(), LinkState::Scanning);
    h.tick().unwrap();
    assert_eq!(h.state(), LinkState::Cooldown);

    h.radio().reject_scans = false;
    assert!(h.run_until(LinkState::Connected, 5_000, 5));
}

// ==================== Scan outcomes ====================

#[test]
fn test_blind_connect_when_nothing_matches() {
    let config = LinkConfig::with_candidates(vec![
        candidate("hidden", Some(0.2)),
        candidate("other", Some(0.9)),
    ]);
    let mut h = Harness::new(config, SimRadio::new(vec![network("neighbour", 9, -30)]));

    h.setup().unwrap();
    h.tick().unwrap();
    assert_eq!(h.state(), LinkState::Connecting);
    let selected = h.manager.selected().unwrap();
    assert_eq!(selected.ssid(), "other");
    assert_eq!(selected.bssid, None);
}

#[test]
fn test_fast_connect_rescans_instead_of_guessing() {
    let mut config = LinkConfig::with_candidates(vec![candidate("hidden", None)]);
    config.fast_connect = true;
    let mut h = Harness::new(config, SimRadio::new(vec![network("neighbour", 9, -30)]));

    h.setup().unwrap();
    h.tick().unwrap();
    assert_eq!(h.state(), LinkState::Scanning);
    assert_eq!(h.radio().counters().scans, 2);
    assert_eq!(h.radio().counters().connects, 0);

    // Keeps scanning until the scan window closes
    h.advance(10_001);
    h.tick().unwrap();
    assert_eq!(h.state(), LinkState::Cooldown);
}

#[test]
fn test_scan_results_replaced_each_scan() {
    let config = LinkConfig::with_candidates(vec![candidate("home", None)]);
    let radio = SimRadio::new(vec![network("home", 1, -60), network("x", 2, -60)]);
    let mut h = Harness::new(config, radio);

    h.setup().unwrap();
    h.tick().unwrap();
    assert_eq!(h.manager.scan_results().len(), 2);
    assert!(h.run_until(LinkState::Connected, 0, 3));

    h.radio().networks_mut().retain(|n| n.beacon.ssid == "home");
    h.radio().drop_link();
    h.tick().unwrap();
    assert_eq!(h.state(), LinkState::Cooldown);
    assert!(h.run_until(LinkState::Connecting, 5_000, 3));
    assert_eq!(h.manager.scan_results().len(), 1);
}

// ==================== Connected behaviour ====================

#[test]
fn test_connection_stops_fallback_ap() {
    let mut config = LinkConfig::with_candidates(vec![candidate("home", None)]);
    config.ap = Some(fallback_ap());
    let mut h = Harness::new(config, SimRadio::new(vec![network("home", 1, -60)]));

    h.setup().unwrap();
    assert!(h.radio().ap_running());
    assert!(h.run_until(LinkState::Connected, 0, 3));
    assert!(!h.radio().ap_running());
    assert!(!h.manager.ap_active());
    assert_eq!(h.radio().counters().ap_stops, 1);
}

#[test]
fn test_connection_leaves_ap_mode_after_failed_ap_start() {
    let mut config = LinkConfig::with_candidates(vec![candidate("home", None)]);
    config.ap = Some(fallback_ap());
    let mut radio = SimRadio::new(vec![network("home", 1, -60)]);
    radio.reject_ap = true;
    let mut h = Harness::new(config, radio);

    h.setup().unwrap();
    assert!(!h.manager.ap_active());
    assert!(h.radio().ap_enabled());

    assert!(h.run_until(LinkState::Connected, 0, 3));
    assert!(h.radio().station_enabled());
    assert!(!h.radio().ap_enabled());
}

#[test]
fn test_link_drop_goes_to_cooldown_then_recovers() {
    let config = LinkConfig::with_candidates(vec![candidate("home", None)]);
    let mut h = Harness::new(config, SimRadio::new(vec![network("home", 1, -60)]));

    h.setup().unwrap();
    assert!(h.run_until(LinkState::Connected, 0, 3));

    h.radio().drop_link();
    h.tick().unwrap();
    assert_eq!(h.state(), LinkState::Cooldown);
    assert!(!h.manager.can_proceed());
    assert_eq!(h.manager.retry_count(), 0);

    h.advance(4_999);
    h.tick().unwrap();
    assert_eq!(h.state(), LinkState::Cooldown);
    h.advance(1);
    h.tick().unwrap();
    assert_eq!(h.state(), LinkState::Scanning);
    assert!(h.run_until(LinkState::Connected, 0, 3));
}

#[test]
fn test_shutdown_tears_down_radio() {
    let mut config = LinkConfig::with_candidates(vec![candidate("home", None)]);
    config.ap = Some(fallback_ap());
    let mut h = Harness::new(config, SimRadio::new(vec![network("home", 1, -60)]));

    h.setup().unwrap();
    h.manager.shutdown();
    assert_eq!(h.state(), LinkState::Off);
    assert!(!h.radio().station_enabled());
    assert!(!h.radio().ap_running());
    assert!(!h.manager.can_proceed());

    // Ticks in Off do nothing
    h.tick().unwrap();
    assert_eq!(h.state(), LinkState::Off);
}

#[test]
fn test_shutdown_from_ap_only_skips_station_disconnect() {
    let config = LinkConfig::ap_only(fallback_ap());
    let mut h = Harness::new(config, SimRadio::new(vec![]));

    h.setup().unwrap();
    h.manager.shutdown();
    assert_eq!(h.state(), LinkState::Off);
    assert_eq!(h.radio().counters().disconnects, 0);
    assert!(!h.radio().ap_running());
}

#[test]
fn test_diagnostics_snapshot() {
    let mut config = LinkConfig::with_candidates(vec![candidate("home", None)]);
    config.power_save = PowerSaveMode::Light;
    let mut h = Harness::new(config, SimRadio::new(vec![network("home", 1, -60)]));

    h.setup().unwrap();
    assert_eq!(h.radio().power_save(), PowerSaveMode::Light);
    assert!(h.run_until(LinkState::Connected, 0, 3));
    h.advance(250);

    let diag = h.manager.dump_diagnostics();
    assert_eq!(diag.state, LinkState::Connected);
    assert_eq!(diag.selected_ssid.as_deref(), Some("home"));
    assert_eq!(diag.selected_bssid, Some(bssid(1)));
    assert!(diag.ip.is_some());
    assert_eq!(diag.retry_count, 0);
    assert_eq!(diag.candidates, 1);
    assert_eq!(diag.state_age_ms, 250);
    assert_eq!(diag.power_save, PowerSaveMode::Light);

    // Pure read
    assert_eq!(h.manager.dump_diagnostics(), diag);
}

// ==================== Setup outcomes ====================

#[test]
fn test_ap_only_setup_never_scans() {
    let config = LinkConfig::ap_only(fallback_ap());
    let mut h = Harness::new(config, SimRadio::new(vec![network("home", 1, -60)]));

    h.setup().unwrap();
    assert_eq!(h.state(), LinkState::ApOnly);
    assert!(h.manager.can_proceed());
    for _ in 0..10 {
        h.advance(10_000);
        h.tick().unwrap();
    }
    assert_eq!(h.state(), LinkState::ApOnly);
    assert_eq!(h.radio().counters().scans, 0);
    assert_eq!(h.radio().counters().connects, 0);
    assert_eq!(h.manager.ip_address(), Some(DEFAULT_AP_IP));
}

#[test]
fn test_ap_only_waits_for_confirmed_ap() {
    let config = LinkConfig::ap_only(fallback_ap());
    let mut radio = SimRadio::new(vec![]);
    radio.reject_ap = true;
    let mut h = Harness::new(config, radio);

    h.setup().unwrap();
    assert_eq!(h.state(), LinkState::ApOnly);
    assert!(!h.manager.can_proceed());

    h.radio().reject_ap = false;
    h.advance(1_000);
    h.tick().unwrap();
    assert!(!h.manager.can_proceed(), "retry waits for the cooldown period");

    h.advance(4_000);
    h.tick().unwrap();
    assert!(h.manager.can_proceed());
}

#[test]
fn test_nothing_configured_stays_off() {
    let mut h = Harness::new(LinkConfig::default(), SimRadio::new(vec![]));

    assert_eq!(
        h.setup(),
        Err(LinkError::Config(ConfigError::NothingConfigured))
    );
    assert_eq!(h.state(), LinkState::Off);
    for _ in 0..5 {
        h.advance(60_000);
        assert_eq!(h.tick(), Ok(()));
    }
    assert_eq!(h.state(), LinkState::Off);
    assert!(!h.manager.can_proceed());
    assert_eq!(h.radio().counters(), SimCounters::default());
}

#[test]
fn test_invalid_candidate_rejected_at_setup() {
    let mut bad = candidate("home", None);
    bad.password = "short".to_string();
    let mut h = Harness::new(LinkConfig::with_candidates(vec![bad]), SimRadio::new(vec![]));

    assert!(matches!(
        h.setup(),
        Err(LinkError::Config(ConfigError::PasswordTooShort { .. }))
    ));
    assert_eq!(h.state(), LinkState::Off);
}

// ==================== Reboot timeout ====================

#[test]
fn test_reboot_timeout_raised_once() {
    let mut config = LinkConfig::with_candidates(vec![candidate("home", None)]);
    config.timeouts.reboot_ms = 60_000;
    let mut h = Harness::new(config, SimRadio::hanging(vec![network("home", 1, -60)]));

    h.setup().unwrap();
    let mut fatal_at = Vec::new();
    for _ in 0..300 {
        h.advance(1_000);
        if let Err(e) = h.tick() {
            assert!(matches!(e, LinkError::RebootTimeout { .. }));
            fatal_at.push(h.clock.now_ms());
        }
    }
    assert_eq!(fatal_at, [61_000]);
}

#[test]
fn test_reboot_timeout_rearms_after_connection() {
    let mut config = LinkConfig::with_candidates(vec![candidate("home", None)]);
    config.timeouts.reboot_ms = 30_000;
    let mut radio = SimRadio::new(vec![network("home", 1, -60)]);
    radio.connect_delay_polls = u32::MAX;
    let mut h = Harness::new(config, radio);

    h.setup().unwrap();
    let mut fatal = 0;
    for _ in 0..40 {
        h.advance(1_000);
        if h.tick().is_err() {
            fatal += 1;
        }
    }
    assert_eq!(fatal, 1);

    h.radio().connect_delay_polls = 0;
    assert!(h.run_until(LinkState::Connected, 1_000, 40));
    h.radio().drop_link();
    h.radio().connect_delay_polls = u32::MAX;

    let mut fatal = 0;
    for _ in 0..40 {
        h.advance(1_000);
        if h.tick().is_err() {
            fatal += 1;
        }
    }
    assert_eq!(fatal, 1);
}

#[test]
fn test_reboot_timeout_disabled() {
    let mut config = LinkConfig::with_candidates(vec![candidate("home", None)]);
    config.timeouts.reboot_ms = 0;
    let mut h = Harness::new(config, SimRadio::hanging(vec![]));

    h.setup().unwrap();
    for _ in 0..100 {
        h.advance(60_000);
        assert!(h.tick().is_ok());
    }
}

// ==================== Properties ====================

/// Small deterministic PRNG so the run is reproducible.
struct Lcg(u32);

impl Lcg {
    fn next(&mut self) -> u32 {
        self.0 = self.0.wrapping_mul(1664525).wrapping_add(1013904223);
        self.0 >> 16
    }
}

#[test]
fn test_random_run_respects_invariants() {
    let mut config = LinkConfig::with_candidates(vec![
        candidate("home", Some(1.0)),
        candidate("office", None),
    ]);
    config.ap = Some(fallback_ap());
    config.timeouts.reboot_ms = 0;
    let radio = SimRadio::new(vec![network("home", 1, -70), network("office", 2, -50)]);
    let mut h = Harness::new(config, radio);
    let mut rng = Lcg(42);

    h.setup().unwrap();
    let mut last_retry = h.manager.retry_count();
    let mut last_age = h.manager.dump_diagnostics().state_age_ms;

    for _ in 0..2_000 {
        match rng.next() % 10 {
            0 => h.radio().failing_connects += 1,
            1 if h.state() == LinkState::Connected => h.radio().drop_link(),
            2 => h.radio().connect_delay_polls = rng.next() % 4,
            3 => h.radio().scan_delay_polls = rng.next() % 4,
            _ => {}
        }
        let step = u64::from(rng.next() % 4_000);
        h.advance(step);

        let before = h.state();
        h.tick().unwrap();
        let after = h.state();
        let diag = h.manager.dump_diagnostics();

        if before == after {
            assert_eq!(diag.state_age_ms, last_age + step, "intra-state tick in {}", after);
        } else {
            assert_eq!(diag.state_age_ms, 0, "transition into {}", after);
        }
        last_age = diag.state_age_ms;

        if after == LinkState::Connected {
            assert_eq!(diag.retry_count, 0);
        } else if after == LinkState::Cooldown && before != after {
            assert!(diag.retry_count <= 1, "retry_count {} on Cooldown entry", diag.retry_count);
        } else {
            assert!(diag.retry_count >= last_retry);
        }
        last_retry = diag.retry_count;

        assert_eq!(h.manager.can_proceed(), after == LinkState::Connected);
    }

    // Every kind of edge should have been exercised
    for state in [
        LinkState::Connecting,
        LinkState::ConnectingRetry,
        LinkState::Connected,
        LinkState::Cooldown,
    ] {
        assert!(h.trace.contains(&state), "never reached {}", state);
    }
}
