//! System-wide counters
//!
//! Relaxed atomics only; a snapshot is not a consistent cut across counters.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// System-wide metrics
#[derive(Debug, Default)]
pub struct SystemMetrics {
    pub actors_spawned: AtomicU64,
    pub actors_stopped: AtomicU64,
    pub messages_processed: AtomicU64,
    pub total_processing_time_ns: AtomicU64,

    // Supervision
    pub behavior_failures: AtomicU64,
    pub actor_restarts: AtomicU64,
    pub actor_resumes: AtomicU64,

    // Routing
    pub dead_letters: AtomicU64,
    pub mailbox_full_events: AtomicU64,
}

impl SystemMetrics {
    pub fn record_message_handled(&self, duration: Duration) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        self.total_processing_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn avg_processing_time_ns(&self) -> f64 {
        let count = self.messages_processed.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        let total = self.total_processing_time_ns.load(Ordering::Relaxed);
        total as f64 / count as f64
    }

    pub fn record_spawn(&self) {
        self.actors_spawned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stop(&self) {
        self.actors_stopped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.behavior_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_restart(&self) {
        self.actor_restarts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resume(&self) {
        self.actor_resumes.fetch_add(1, Ordering::Relaxed);
    }

    /// Messages that never reached a live actor
    pub fn record_dead_letters(&self, count: u64) {
        self.dead_letters.fetch_add(count, Ordering::Relaxed);
    }

    /// Backpressure signal from a bounded mailbox
    pub fn record_mailbox_full(&self) {
        self.mailbox_full_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> SystemStats {
        SystemStats {
            actors_spawned: self.actors_spawned.load(Ordering::Relaxed),
            actors_stopped: self.actors_stopped.load(Ordering::Relaxed),
            messages_processed: self.messages_processed.load(Ordering::Relaxed),
            avg_processing_time_ns: self.avg_processing_time_ns(),
            behavior_failures: self.behavior_failures.load(Ordering::Relaxed),
            actor_restarts: self.actor_restarts.load(Ordering::Relaxed),
            actor_resumes: self.actor_resumes.load(Ordering::Relaxed),
            dead_letters: self.dead_letters.load(Ordering::Relaxed),
            mailbox_full_events: self.mailbox_full_events.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SystemMetrics`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStats {
    pub actors_spawned: u64,
    pub actors_stopped: u64,
    pub messages_processed: u64,
    pub avg_processing_time_ns: f64,
    pub behavior_failures: u64,
    pub actor_restarts: u64,
    pub actor_resumes: u64,
    pub dead_letters: u64,
    pub mailbox_full_events: u64,
}
