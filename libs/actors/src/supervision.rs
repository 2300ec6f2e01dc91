//! Supervision
//!
//! Per-actor failure policy. A failed `receive` moves the actor from
//! `Running` to `Failed`, then the policy decides between restarting with the
//! initial state, resuming with the previous state, or stopping.

use crate::config::SupervisionConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Actor status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorStatus {
    Starting,
    Running,
    Failed,
    Restarting,
    Stopping,
    Stopped,
}

impl ActorStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ActorStatus::Stopping | ActorStatus::Stopped)
    }
}

/// Supervision directive for error handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisorDirective {
    /// Keep the state from before the failing message
    Resume,
    /// Reset to the initial state
    Restart,
    /// Stop the actor and drop its mailbox
    Stop,
}

/// Per-failure override of the fixed directive
pub type Decider = Arc<dyn Fn(&anyhow::Error) -> SupervisorDirective + Send + Sync>;

/// How an actor reacts to failures in its behavior
#[derive(Clone)]
pub struct SupervisionPolicy {
    pub directive: SupervisorDirective,
    /// Restarts allowed inside `restart_window` before the actor is stopped
    pub max_restarts: u32,
    pub restart_window: Duration,
    pub preserve_mailbox_on_restart: bool,
    decider: Option<Decider>,
}

impl fmt::Debug for SupervisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupervisionPolicy")
            .field("directive", &self.directive)
            .field("max_restarts", &self.max_restarts)
            .field("restart_window", &self.restart_window)
            .field("preserve_mailbox_on_restart", &self.preserve_mailbox_on_restart)
            .field("has_decider", &self.decider.is_some())
            .finish()
    }
}

impl Default for SupervisionPolicy {
    fn default() -> Self {
        Self {
            directive: SupervisorDirective::Restart,
            max_restarts: 5,
            restart_window: Duration::from_secs(60),
            preserve_mailbox_on_restart: true,
            decider: None,
        }
    }
}

impl From<&SupervisionConfig> for SupervisionPolicy {
    fn from(config: &SupervisionConfig) -> Self {
        Self {
            directive: config.directive,
            max_restarts: config.max_restarts,
            restart_window: Duration::from_secs(config.restart_window_secs),
            preserve_mailbox_on_restart: config.preserve_mailbox_on_restart,
            decider: None,
        }
    }
}

impl SupervisionPolicy {
    pub fn restart() -> Self {
        Self::default()
    }

    pub fn resume() -> Self {
        Self {
            directive: SupervisorDirective::Resume,
            ..Self::default()
        }
    }

    pub fn stop() -> Self {
        Self {
            directive: SupervisorDirective::Stop,
            ..Self::default()
        }
    }

    pub fn with_restart_limit(mut self, max_restarts: u32, window: Duration) -> Self {
        self.max_restarts = max_restarts;
        self.restart_window = window;
        self
    }

    pub fn preserve_mailbox(mut self, preserve: bool) -> Self {
        self.preserve_mailbox_on_restart = preserve;
        self
    }

    /// Choose the directive per failure instead of using a fixed one
    pub fn with_decider<F>(mut self, decider: F) -> Self
    where
        F: Fn(&anyhow::Error) -> SupervisorDirective + Send + Sync + 'static,
    {
        self.decider = Some(Arc::new(decider));
        self
    }

    /// Whether a failure can end in `Resume`, which needs the prior state kept
    pub fn may_resume(&self) -> bool {
        self.decider.is_some() || self.directive == SupervisorDirective::Resume
    }

    /// A panicking decider counts as `Stop`
    fn directive_for(&self, error: &anyhow::Error) -> SupervisorDirective {
        let Some(decider) = &self.decider else {
            return self.directive;
        };

        panic::catch_unwind(AssertUnwindSafe(|| decider(error))).unwrap_or_else(|_| {
            tracing::error!(error = %error, "Supervision decider panicked, stopping actor");
            SupervisorDirective::Stop
        })
    }
}

/// Sliding restart budget
#[derive(Debug, Clone, Default)]
struct RestartWindow {
    restart_count: u32,
    window_start: Option<Instant>,
}

impl RestartWindow {
    fn should_restart(&mut self, now: Instant, max_restarts: u32, window: Duration) -> bool {
        match self.window_start {
            Some(start) if now.duration_since(start) <= window => {
                self.restart_count = self.restart_count.saturating_add(1);
                self.restart_count <= max_restarts
            }
            _ => {
                self.window_start = Some(now);
                self.restart_count = 1;
                max_restarts > 0
            }
        }
    }
}

/// Supervision state of one actor
#[derive(Debug)]
pub(crate) struct Supervisor {
    policy: SupervisionPolicy,
    window: RestartWindow,
    restarts: u64,
}

impl Supervisor {
    pub(crate) fn new(policy: SupervisionPolicy) -> Self {
        Self {
            policy,
            window: RestartWindow::default(),
            restarts: 0,
        }
    }

    pub(crate) fn policy(&self) -> &SupervisionPolicy {
        &self.policy
    }

    /// Effective directive for a failure observed at `now`.
    ///
    /// A restart over budget becomes a stop.
    pub(crate) fn decide(&mut self, error: &anyhow::Error, now: Instant) -> SupervisorDirective {
        match self.policy.directive_for(error) {
            SupervisorDirective::Restart => {
                if self.window.should_restart(
                    now,
                    self.policy.max_restarts,
                    self.policy.restart_window,
                ) {
                    self.restarts += 1;
                    SupervisorDirective::Restart
                } else {
                    SupervisorDirective::Stop
                }
            }
            other => other,
        }
    }

    pub(crate) fn restarts(&self) -> u64 {
        self.restarts
    }
}
