use std::{
    fmt::Display,
    sync::atomic::{AtomicU64, Ordering},
};

use serde::Serialize;

use super::job::JobOutcome;

/// Running totals for the dispatcher. Counters only ever go up.
#[derive(Debug, Default)]
pub struct JobStats {
    submitted: AtomicU64,
    dropped: AtomicU64,
    started: AtomicU64,
    completed: AtomicU64,
    cancelled: AtomicU64,
    timed_out: AtomicU64,
    abandoned: AtomicU64,
    gave_up: AtomicU64,
    polls: AtomicU64,
    rate_limited: AtomicU64,
    transport_errors: AtomicU64,
    persistence_errors: AtomicU64,
    credited: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobStatsSnapshot {
    pub submitted: u64,
    /// Jobs that were still queued at shutdown and never started.
    pub dropped: u64,
    pub started: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub timed_out: u64,
    pub abandoned: u64,
    pub gave_up: u64,
    pub polls: u64,
    pub rate_limited: u64,
    pub transport_errors: u64,
    pub persistence_errors: u64,
    pub credited: u64,
}

impl JobStatsSnapshot {
    /// Jobs that have started and not yet finished.
    pub fn in_flight(&self) -> u64 {
        let finished = self.completed + self.cancelled + self.timed_out + self.abandoned + self.gave_up;
        self.started.saturating_sub(finished)
    }
}

impl Display for JobStatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "submitted: {}, dropped: {}, in flight: {}, completed: {}, cancelled: {}, timed out: {}, abandoned: {}, \
             gave up: {}, polls: {}, rate limited: {}, transport errors: {}, persistence errors: {}, credited: {}",
            self.submitted,
            self.dropped,
            self.in_flight(),
            self.completed,
            self.cancelled,
            self.timed_out,
            self.abandoned,
            self.gave_up,
            self.polls,
            self.rate_limited,
            self.transport_errors,
            self.persistence_errors,
            self.credited
        )
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl JobStats {
    pub(crate) fn job_submitted(&self) {
        bump(&self.submitted);
    }

    pub(crate) fn job_dropped(&self) {
        bump(&self.dropped);
    }

    pub(crate) fn job_started(&self) {
        bump(&self.started);
    }

    pub(crate) fn polled(&self) {
        bump(&self.polls);
    }

    pub(crate) fn rate_limited(&self) {
        bump(&self.rate_limited);
    }

    pub(crate) fn transport_error(&self) {
        bump(&self.transport_errors);
    }

    pub(crate) fn persistence_error(&self) {
        bump(&self.persistence_errors);
    }

    pub(crate) fn credited(&self) {
        bump(&self.credited);
    }

    pub(crate) fn job_finished(&self, outcome: &JobOutcome) {
        let counter = match outcome {
            JobOutcome::Completed(_) => &self.completed,
            JobOutcome::Cancelled => &self.cancelled,
            JobOutcome::TimedOut => &self.timed_out,
            JobOutcome::Abandoned => &self.abandoned,
            JobOutcome::GaveUp => &self.gave_up,
        };
        bump(counter);
    }

    pub fn snapshot(&self) -> JobStatsSnapshot {
        let read = |c: &AtomicU64| c.load(Ordering::Relaxed);
        JobStatsSnapshot {
            submitted: read(&self.submitted),
            dropped: read(&self.dropped),
            started: read(&self.started),
            completed: read(&self.completed),
            cancelled: read(&self.cancelled),
            timed_out: read(&self.timed_out),
            abandoned: read(&self.abandoned),
            gave_up: read(&self.gave_up),
            polls: read(&self.polls),
            rate_limited: read(&self.rate_limited),
            transport_errors: read(&self.transport_errors),
            persistence_errors: read(&self.persistence_errors),
            credited: read(&self.credited),
        }
    }
}
