//! Actor cell
//!
//! Owns one actor's state, mailbox and supervision. The `scheduled` flag is
//! the only gate to the run queue, so at most one worker drives a cell and the
//! state is only touched between `take` and `put` inside that turn.
//!
//! A behavior still pending after its first poll is parked on its own task
//! and the worker moves on. `scheduled` stays set until the parked message
//! settles, which keeps the actor exclusive while it waits.

use crate::behavior::{Behavior, Context};
use crate::mailbox::Mailbox;
use crate::messages::{Envelope, Message};
use crate::metrics::SystemMetrics;
use crate::registry::ActorRef;
use crate::scheduler::{Runnable, Scheduler};
use crate::supervision::{ActorStatus, SupervisionPolicy, Supervisor, SupervisorDirective};
use crate::system::WeakSystem;
use crate::{ActorError, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::Poll;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

/// Type-erased view of a cell held by the registry
pub(crate) trait CellHandle: Send + Sync {
    /// Enqueue a payload; fails on type mismatch, full or closed mailbox
    fn deliver(&self, payload: Box<dyn Any + Send>, sender: Option<ActorRef>) -> Result<()>;

    fn status(&self) -> ActorStatus;

    /// Close the mailbox and signal in-flight processing.
    ///
    /// Returns the number of pending messages dropped.
    fn stop(&self) -> usize;
}

pub(crate) struct CellSettings {
    pub supervision: SupervisionPolicy,
    pub mailbox_capacity: Option<usize>,
    pub stop_timeout: Duration,
}

pub(crate) struct ActorCell<S, M> {
    me: Weak<Self>,
    actor_ref: ActorRef,
    behavior: Box<dyn Behavior<S, M>>,
    initial_state: Mutex<S>,
    state: Mutex<Option<S>>,
    mailbox: Mailbox<Envelope<M>>,
    supervisor: Mutex<Supervisor>,
    status: Mutex<ActorStatus>,
    scheduled: AtomicBool,
    stop_signal: watch::Sender<bool>,
    stop_timeout: Duration,
    scheduler: Scheduler,
    system: WeakSystem,
    metrics: Arc<SystemMetrics>,
}

impl<S, M> ActorCell<S, M>
where
    S: Clone + Send + 'static,
    M: Message,
{
    pub(crate) fn new(
        actor_ref: ActorRef,
        initial_state: S,
        behavior: Box<dyn Behavior<S, M>>,
        settings: CellSettings,
        scheduler: Scheduler,
        system: WeakSystem,
        metrics: Arc<SystemMetrics>,
    ) -> Arc<Self> {
        let (stop_signal, _) = watch::channel(false);
        let mailbox = Mailbox::with_capacity(actor_ref.name(), settings.mailbox_capacity);

        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            state: Mutex::new(Some(initial_state.clone())),
            initial_state: Mutex::new(initial_state),
            actor_ref,
            behavior,
            mailbox,
            supervisor: Mutex::new(Supervisor::new(settings.supervision)),
            status: Mutex::new(ActorStatus::Starting),
            scheduled: AtomicBool::new(false),
            stop_signal,
            stop_timeout: settings.stop_timeout,
            scheduler,
            system,
            metrics,
        })
    }

    /// Move from `Starting` to `Running` once registered
    pub(crate) fn activate(&self) {
        let mut status = self.status.lock();
        if *status == ActorStatus::Starting {
            *status = ActorStatus::Running;
        }
    }

    fn set_status(&self, next: ActorStatus) {
        *self.status.lock() = next;
    }

    fn initial_state(&self) -> S {
        self.initial_state.lock().clone()
    }

    /// Queue the cell unless it is already queued or running
    fn try_schedule(&self) {
        if self
            .scheduled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let Some(me) = self.me.upgrade() else {
            return;
        };
        if let Err(e) = self.scheduler.schedule(me) {
            debug!(actor_id = %self.actor_ref.id(), error = %e, "Cell not scheduled");
            self.scheduled.store(false, Ordering::SeqCst);
        }
    }

    /// Resolves once `stop` was signalled and the grace period has passed
    async fn stop_deadline(&self) {
        let mut stop_rx = self.stop_signal.subscribe();
        let signalled = stop_rx.wait_for(|stopped| *stopped).await.is_ok();
        if !signalled {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(self.stop_timeout).await;
    }

    /// Handle one envelope. Returns `false` when the cell must stop its turn.
    async fn process(self: Arc<Self>, envelope: Envelope<M>) -> bool {
        let Some(system) = self.system.upgrade() else {
            debug!(actor_id = %self.actor_ref.id(), "System dropped, discarding message");
            self.mailbox.close();
            return false;
        };

        let state = self.state.lock().take().unwrap_or_else(|| self.initial_state());
        let snapshot = if self.supervisor.lock().policy().may_resume() {
            Some(state.clone())
        } else {
            None
        };

        let ctx = Context::new(self.actor_ref.clone(), envelope.sender.clone(), system.clone());
        let started = Instant::now();
        let receive = AssertUnwindSafe(self.behavior.receive(state, envelope, ctx)).catch_unwind();

        let outcome = tokio::select! {
            result = receive => Some(result),
            _ = self.stop_deadline() => None,
        };

        match outcome {
            Some(Ok(Ok(next))) => {
                *self.state.lock() = Some(next);
                self.metrics.record_message_handled(started.elapsed());
                true
            }
            Some(Ok(Err(error))) => self.handle_failure(&system, error, snapshot),
            Some(Err(panic)) => {
                let reason = panic_message(panic.as_ref());
                let error = anyhow::anyhow!("behavior panicked: {}", reason);
                self.handle_failure(&system, error, snapshot)
            }
            None => {
                warn!(
                    actor_id = %self.actor_ref.id(),
                    actor_name = %self.actor_ref.name(),
                    stop_timeout_ms = self.stop_timeout.as_millis() as u64,
                    "In-flight message cancelled after stop timeout"
                );
                false
            }
        }
    }

    fn handle_failure(
        &self,
        system: &crate::ActorSystem,
        error: anyhow::Error,
        snapshot: Option<S>,
    ) -> bool {
        self.metrics.record_failure();
        self.set_status(ActorStatus::Failed);

        let failure = ActorError::behavior(self.actor_ref.name(), &error);
        let directive = self.supervisor.lock().decide(&error, Instant::now());
        error!(
            actor_id = %self.actor_ref.id(),
            actor_name = %self.actor_ref.name(),
            error = %failure,
            error_category = failure.category(),
            directive = ?directive,
            "Actor message processing failed"
        );

        match directive {
            SupervisorDirective::Resume => {
                let state = snapshot.unwrap_or_else(|| self.initial_state());
                *self.state.lock() = Some(state);
                self.metrics.record_resume();
                self.set_status(ActorStatus::Running);
                true
            }
            SupervisorDirective::Restart => {
                self.set_status(ActorStatus::Restarting);
                *self.state.lock() = Some(self.initial_state());

                let (preserve, restarts) = {
                    let supervisor = self.supervisor.lock();
                    (supervisor.policy().preserve_mailbox_on_restart, supervisor.restarts())
                };
                if !preserve {
                    let dropped = self.mailbox.clear();
                    self.metrics.record_dead_letters(dropped as u64);
                }

                self.metrics.record_restart();
                warn!(
                    actor_id = %self.actor_ref.id(),
                    actor_name = %self.actor_ref.name(),
                    restarts,
                    mailbox_preserved = preserve,
                    "Actor restarted with initial state"
                );
                self.set_status(ActorStatus::Running);
                true
            }
            SupervisorDirective::Stop => {
                if let Err(e) = system.stop(&self.actor_ref) {
                    // Already removed by a concurrent stop.
                    debug!(actor_id = %self.actor_ref.id(), error = %e, "Stop after failure");
                    self.stop();
                }
                false
            }
        }
    }

    async fn turn(self: Arc<Self>, throughput: usize) {
        for _ in 0..throughput {
            if self.mailbox.is_closed() {
                break;
            }
            let Some(envelope) = self.mailbox.try_dequeue() else {
                break;
            };

            let mut processing = Arc::clone(&self).process(envelope).boxed();
            match futures::poll!(processing.as_mut()) {
                Poll::Ready(true) => {}
                Poll::Ready(false) => break,
                Poll::Pending => {
                    self.park(processing);
                    return;
                }
            }
        }

        self.end_turn();
    }

    /// Finish a pending message off the worker pool, then end the turn
    fn park(self: Arc<Self>, processing: BoxFuture<'static, bool>) {
        trace!(actor_id = %self.actor_ref.id(), "Behavior pending, releasing worker");

        let cell = Arc::clone(&self);
        let parked = self.scheduler.spawn_suspended(
            async move {
                processing.await;
                cell.end_turn();
            }
            .boxed(),
        );
        if let Err(e) = parked {
            // Runtime is going away; the message is dropped with it.
            debug!(actor_id = %self.actor_ref.id(), error = %e, "Pending message dropped");
            self.end_turn();
        }
    }

    fn end_turn(&self) {
        if self.mailbox.is_closed() {
            // Keep `scheduled` set so the cell is never queued again.
            self.mark_stopped();
            return;
        }

        self.scheduled.store(false, Ordering::SeqCst);

        // `stop` may have closed the mailbox after the check above and lost
        // the race for `scheduled`; whoever wins the flag finishes the stop.
        if self.mailbox.is_closed() {
            if self
                .scheduled
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                self.mark_stopped();
            }
            return;
        }

        if !self.mailbox.is_empty() {
            self.try_schedule();
        }
    }

    fn mark_stopped(&self) {
        self.set_status(ActorStatus::Stopped);
        info!(
            actor_id = %self.actor_ref.id(),
            actor_name = %self.actor_ref.name(),
            "Actor stopped"
        );
    }
}

impl<S, M> CellHandle for ActorCell<S, M>
where
    S: Clone + Send + 'static,
    M: Message,
{
    fn deliver(&self, payload: Box<dyn Any + Send>, sender: Option<ActorRef>) -> Result<()> {
        let payload = payload
            .downcast::<M>()
            .map_err(|_| ActorError::message_type::<M>(self.actor_ref.name()))?;

        self.mailbox.enqueue(Envelope::new(sender, *payload))?;
        self.try_schedule();
        Ok(())
    }

    fn status(&self) -> ActorStatus {
        *self.status.lock()
    }

    fn stop(&self) -> usize {
        self.set_status(ActorStatus::Stopping);
        self.stop_signal.send_replace(true);
        let dropped = self.mailbox.close();

        // Idle cell: nobody will run a final turn, finish the transition here.
        if self
            .scheduled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.mark_stopped();
        }
        dropped
    }
}

impl<S, M> Runnable for ActorCell<S, M>
where
    S: Clone + Send + 'static,
    M: Message,
{
    fn run_turn(self: Arc<Self>, throughput: usize) -> BoxFuture<'static, ()> {
        self.turn(throughput).boxed()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
