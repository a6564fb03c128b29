//! Timers as data
//!
//! The manager never sleeps on its own. Deadlines are kept here and the run
//! loop turns expired ones into `NimEvent::Timer` events, which lets tests
//! fire a timer by dispatching the event directly.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// The three timers of the verification loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimerKind {
    /// Resume a verification that returned WAIT
    Retest,
    /// Re-test the applied configuration, or rescan when nothing was testable
    NetworkTest,
    /// Look for a higher priority candidate while running on a lower one
    NetworkTestBetter,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TimerKind::Retest => "retest",
            TimerKind::NetworkTest => "network-test",
            TimerKind::NetworkTestBetter => "network-test-better",
        };
        f.write_str(s)
    }
}

/// At most one deadline per kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerSet {
    deadlines: BTreeMap<TimerKind, DateTime<Utc>>,
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `kind` to fire `after` from `now`, replacing any pending deadline
    pub fn arm(&mut self, kind: TimerKind, now: DateTime<Utc>, after: Duration) {
        let delta = chrono::Duration::from_std(after).unwrap_or_else(|_| chrono::Duration::days(365));
        let at = now + delta;
        tracing::debug!("timer {} armed for {}", kind, at);
        self.deadlines.insert(kind, at);
    }

    pub fn stop(&mut self, kind: TimerKind) {
        if self.deadlines.remove(&kind).is_some() {
            tracing::debug!("timer {} stopped", kind);
        }
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.deadlines.contains_key(&kind)
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<DateTime<Utc>> {
        self.deadlines.get(&kind).copied()
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.deadlines.values().min().copied()
    }

    /// Remove and return the earliest timer due at `now`
    ///
    /// One at a time, so a handler that stops or re-arms another timer is
    /// seen before that timer is considered.
    pub fn pop_expired(&mut self, now: DateTime<Utc>) -> Option<TimerKind> {
        let (kind, _) = self
            .deadlines
            .iter()
            .filter(|(_, at)| **at <= now)
            .min_by_key(|(_, at)| **at)
            .map(|(kind, at)| (*kind, *at))?;
        self.deadlines.remove(&kind);
        Some(kind)
    }
}
