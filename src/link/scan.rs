//! Scan results and candidate ranking.
//!
//! # Algorithm
//!
//! 1. Pair every scan result with every candidate whose SSID (and BSSID, if
//!    the candidate pins one) matches
//! 2. Score each pair: explicit priority if any, else a default derived
//!    from signal strength
//! 3. Highest score wins; ties go to the stronger signal, then to the
//!    earlier candidate, then to the earlier scan entry
//!
//! The result depends only on its inputs, so repeated selection over the
//! same scan is stable.

use super::candidates::CandidateStore;
use crate::config::{Bssid, Candidate};
use std::cmp::Ordering;

/// One access point seen during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub ssid: String,
    pub bssid: Bssid,
    /// Signal strength in dBm.
    pub rssi: i8,
    pub channel: u8,
}

impl ScanResult {
    pub fn new(ssid: impl Into<String>, bssid: Bssid, rssi: i8, channel: u8) -> Self {
        Self {
            ssid: ssid.into(),
            bssid,
            rssi,
            channel,
        }
    }

    fn matches(&self, candidate: &Candidate) -> bool {
        self.ssid == candidate.ssid && candidate.bssid.map_or(true, |b| b == self.bssid)
    }
}

/// The candidate chosen for the current connection attempt.
///
/// `bssid`, `channel` and `rssi` come from the scan entry that matched and
/// are `None` for a blind connect.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedCandidate {
    pub candidate: Candidate,
    pub bssid: Option<Bssid>,
    pub channel: Option<u8>,
    pub rssi: Option<i8>,
}

impl SelectedCandidate {
    /// Connect by SSID only, without a scan match.
    pub fn blind(candidate: &Candidate) -> Self {
        Self {
            candidate: candidate.clone(),
            bssid: candidate.bssid,
            channel: None,
            rssi: None,
        }
    }

    fn scanned(candidate: &Candidate, result: &ScanResult) -> Self {
        Self {
            candidate: candidate.clone(),
            bssid: Some(result.bssid),
            channel: Some(result.channel),
            rssi: Some(result.rssi),
        }
    }

    pub fn ssid(&self) -> &str {
        &self.candidate.ssid
    }
}

/// Score used when no explicit priority is set, in `[0.0, 1.0]`.
///
/// -100 dBm and below maps to 0.0, 0 dBm and above to 1.0.
pub fn signal_score(rssi: i8) -> f32 {
    (i16::from(rssi) + 100).clamp(0, 100) as f32 / 100.0
}

/// Pick the best candidate visible in `results`.
pub fn select(store: &CandidateStore, results: &[ScanResult]) -> Option<SelectedCandidate> {
    // (score, rssi, candidate index, scan entry)
    let mut best: Option<(f32, i8, usize, &ScanResult)> = None;

    for result in results {
        for (index, candidate) in store.candidates().iter().enumerate() {
            if !result.matches(candidate) {
                continue;
            }
            let score = store
                .priority(&result.bssid)
                .or(candidate.priority)
                .unwrap_or_else(|| signal_score(result.rssi));

            let better = match best {
                None => true,
                Some((best_score, best_rssi, best_index, _)) => score
                    .total_cmp(&best_score)
                    .then(result.rssi.cmp(&best_rssi))
                    .then(best_index.cmp(&index))
                    == Ordering::Greater,
            };
            if better {
                best = Some((score, result.rssi, index, result));
            }
        }
    }

    best.map(|(_, _, index, result)| {
        SelectedCandidate::scanned(&store.candidates()[index], result)
    })
}
