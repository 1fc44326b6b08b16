//! Candidate credentials and BSSID-keyed priorities.
//!
//! Priorities live in their own table, keyed by access point address, so a
//! network seen only in a scan can carry a ranking weight before (or
//! without) anyone giving us credentials for it. Such priority-only entries
//! influence ranking but never cause a connect on their own.

use crate::config::{Bssid, Candidate};

/// Priority pinned to one access point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BssidPriority {
    pub bssid: Bssid,
    pub priority: f32,
}

/// Ordered, append-only candidate list plus the priority table.
#[derive(Debug, Clone, Default)]
pub struct CandidateStore {
    candidates: Vec<Candidate>,
    priorities: Vec<BssidPriority>,
}

impl CandidateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_candidates(candidates: impl IntoIterator<Item = Candidate>) -> Self {
        let mut store = Self::new();
        for candidate in candidates {
            store.add(candidate);
        }
        store
    }

    /// Append a candidate. Duplicate SSIDs are allowed; ranking prefers the
    /// first-listed one on ties.
    pub fn add(&mut self, candidate: Candidate) {
        self.candidates.push(candidate);
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn has_priority(&self, bssid: &Bssid) -> bool {
        self.priorities.iter().any(|p| p.bssid == *bssid)
    }

    /// Pinned priority for `bssid`, `None` when nothing is pinned.
    pub fn priority(&self, bssid: &Bssid) -> Option<f32> {
        self.priorities
            .iter()
            .find(|p| p.bssid == *bssid)
            .map(|p| p.priority)
    }

    /// Pin a priority for `bssid`, updating an existing entry in place.
    pub fn set_priority(&mut self, bssid: Bssid, priority: f32) {
        if let Some(entry) = self.priorities.iter_mut().find(|p| p.bssid == bssid) {
            entry.priority = priority;
            return;
        }
        self.priorities.push(BssidPriority { bssid, priority });
    }

    pub fn priorities(&self) -> &[BssidPriority] {
        &self.priorities
    }

    /// Effective explicit priority of a candidate: the pinned BSSID priority
    /// when the candidate names a BSSID that has one, else its own.
    pub fn explicit_priority(&self, candidate: &Candidate) -> Option<f32> {
        candidate
            .bssid
            .and_then(|bssid| self.priority(&bssid))
            .or(candidate.priority)
    }

    /// Highest-priority candidate, earliest wins ties. Used when a scan
    /// matched nothing (e.g. hidden networks).
    pub fn best_known(&self) -> Option<&Candidate> {
        let mut best: Option<(&Candidate, f32)> = None;
        for candidate in &self.candidates {
            let priority = self.explicit_priority(candidate).unwrap_or(0.0);
            match best {
                Some((_, best_priority)) if priority <= best_priority => {}
                _ => best = Some((candidate, priority)),
            }
        }
        best.map(|(candidate, _)| candidate)
    }
}
