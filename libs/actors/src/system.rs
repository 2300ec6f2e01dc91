//! Actor System Core
//!
//! Explicit runtime context owning the registry, the scheduler and the
//! metrics. Cheap to clone; every clone addresses the same system. Nothing is
//! global: two systems in one process share no actors.
//!
//! # Lifecycle
//!
//! `new` starts the worker pool on the current tokio runtime. `shutdown`
//! stops every actor, lets in-flight processing finish within
//! `stop_timeout`, then joins the workers.

use crate::behavior::{Behavior, Stateless};
use crate::cell::{ActorCell, CellHandle, CellSettings};
use crate::config::RuntimeConfig;
use crate::messages::{Envelope, Message};
use crate::metrics::SystemMetrics;
use crate::query::{ReplyRegistration, ReplySlot};
use crate::registry::{ActorId, ActorRef, ActorRegistry};
use crate::scheduler::{Scheduler, WorkerPool};
use crate::supervision::{ActorStatus, SupervisionPolicy};
use crate::{ActorError, Context, Result};
use parking_lot::Mutex;
use std::any::Any;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Names starting with this prefix belong to the runtime
const RESERVED_NAME_PREFIX: char = '$';

/// Extra time given to workers after the stop timeout during shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

/// Core actor system managing actor lifecycles and routing
#[derive(Clone)]
pub struct ActorSystem {
    inner: Arc<SystemInner>,
}

struct SystemInner {
    system_id: String,
    config: RuntimeConfig,
    default_supervision: SupervisionPolicy,
    registry: ActorRegistry,
    scheduler: Scheduler,
    /// Taken by the first `shutdown`
    workers: Mutex<Option<WorkerPool>>,
    metrics: Arc<SystemMetrics>,
}

/// Non-owning handle held by cells
#[derive(Clone)]
pub(crate) struct WeakSystem(Weak<SystemInner>);

impl WeakSystem {
    pub(crate) fn upgrade(&self) -> Option<ActorSystem> {
        self.0.upgrade().map(|inner| ActorSystem { inner })
    }
}

/// Per-actor overrides of the system defaults
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    pub supervision: Option<SupervisionPolicy>,
    pub mailbox_capacity: Option<usize>,
}

impl SpawnOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn supervision(mut self, policy: SupervisionPolicy) -> Self {
        self.supervision = Some(policy);
        self
    }

    pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = Some(capacity);
        self
    }
}

impl std::fmt::Debug for ActorSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorSystem")
            .field("system_id", &self.inner.system_id)
            .field("actors", &self.inner.registry.len())
            .field("shut_down", &self.inner.scheduler.is_shut_down())
            .finish()
    }
}

impl ActorSystem {
    /// Create a new actor system on the current tokio runtime
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| {
            ActorError::system(format!("Actor system requires a tokio runtime: {}", e))
        })?;

        let system_id = format!("system-{}", Uuid::new_v4().simple());
        let (scheduler, workers) = Scheduler::start(&runtime, config.workers, config.throughput);

        info!(
            system_id = %system_id,
            workers = workers.len(),
            throughput = config.throughput,
            mailbox_capacity = ?config.mailbox_capacity,
            "Creating new actor system"
        );

        Ok(Self {
            inner: Arc::new(SystemInner {
                system_id,
                default_supervision: SupervisionPolicy::from(&config.supervision),
                config,
                registry: ActorRegistry::new(),
                scheduler,
                workers: Mutex::new(Some(workers)),
                metrics: Arc::new(SystemMetrics::default()),
            }),
        })
    }

    /// Create a system with [`RuntimeConfig::default`]
    pub fn with_defaults() -> Result<Self> {
        Self::new(RuntimeConfig::default())
    }

    pub(crate) fn downgrade(&self) -> WeakSystem {
        WeakSystem(Arc::downgrade(&self.inner))
    }

    /// Spawn a stateful actor with the system's default policy
    pub fn spawn<S, M, B>(&self, name: impl Into<String>, initial_state: S, behavior: B) -> Result<ActorRef>
    where
        S: Clone + Send + 'static,
        M: Message,
        B: Behavior<S, M>,
    {
        self.spawn_with(name, initial_state, behavior, SpawnOptions::default())
    }

    /// Spawn an actor whose behavior depends only on the incoming message
    pub fn spawn_stateless<M, F, Fut>(&self, name: impl Into<String>, handler: F) -> Result<ActorRef>
    where
        M: Message,
        F: Fn(Envelope<M>, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.spawn::<(), M, _>(name, (), Stateless::new(handler))
    }

    /// Spawn a stateful actor with explicit options
    pub fn spawn_with<S, M, B>(
        &self,
        name: impl Into<String>,
        initial_state: S,
        behavior: B,
        options: SpawnOptions,
    ) -> Result<ActorRef>
    where
        S: Clone + Send + 'static,
        M: Message,
        B: Behavior<S, M>,
    {
        let start_time = Instant::now();
        let name = name.into();
        validate_actor_name(&name)?;
        if options.mailbox_capacity == Some(0) {
            return Err(ActorError::configuration(
                "Bounded mailbox capacity must be positive",
                Some("mailbox_capacity"),
            ));
        }
        if self.inner.scheduler.is_shut_down() {
            return Err(ActorError::system(format!(
                "Cannot spawn '{}': system {} is shut down",
                name, self.inner.system_id
            )));
        }

        let actor_ref = ActorRef::new(ActorId::new(), name);
        let settings = CellSettings {
            supervision: options
                .supervision
                .unwrap_or_else(|| self.inner.default_supervision.clone()),
            mailbox_capacity: options.mailbox_capacity.or(self.inner.config.mailbox_capacity),
            stop_timeout: self.inner.config.stop_timeout(),
        };

        debug!(
            actor_id = %actor_ref.id(),
            actor_name = %actor_ref.name(),
            system_id = %self.inner.system_id,
            message_type = std::any::type_name::<M>(),
            supervision = ?settings.supervision,
            "Spawning new actor in system"
        );

        let cell = ActorCell::new(
            actor_ref.clone(),
            initial_state,
            Box::new(behavior),
            settings,
            self.inner.scheduler.clone(),
            self.downgrade(),
            Arc::clone(&self.inner.metrics),
        );

        self.inner
            .registry
            .register(actor_ref.clone(), Arc::clone(&cell) as Arc<dyn CellHandle>)?;
        cell.activate();
        self.inner.metrics.record_spawn();

        info!(
            actor_id = %actor_ref.id(),
            actor_name = %actor_ref.name(),
            system_id = %self.inner.system_id,
            spawn_duration_us = start_time.elapsed().as_micros() as u64,
            "Actor spawned successfully"
        );
        Ok(actor_ref)
    }

    /// Fire-and-forget send from outside any actor.
    ///
    /// Never waits. Unknown or stopped targets come back as an error and are
    /// counted as dead letters.
    pub fn send<M: Message>(&self, to: &ActorRef, msg: M) -> Result<()> {
        self.dispatch(to, Box::new(msg), None)
    }

    /// Fire-and-forget send on behalf of `sender`
    pub fn send_from<M: Message>(&self, sender: &ActorRef, to: &ActorRef, msg: M) -> Result<()> {
        self.dispatch(to, Box::new(msg), Some(sender.clone()))
    }

    fn dispatch(&self, to: &ActorRef, payload: Box<dyn Any + Send>, sender: Option<ActorRef>) -> Result<()> {
        let Some(cell) = self.inner.registry.cell(&to.id()) else {
            self.inner.metrics.record_dead_letters(1);
            warn!(
                target_actor = %to,
                sender = ?sender.as_ref().map(|s| s.name()),
                "Dead letter: target actor not found"
            );
            return Err(ActorError::not_found(to.to_string()));
        };

        cell.deliver(payload, sender).map_err(|e| {
            match &e {
                ActorError::MailboxFull { .. } => self.inner.metrics.record_mailbox_full(),
                e if e.is_dead_letter() => self.inner.metrics.record_dead_letters(1),
                _ => {}
            }
            debug!(target_actor = %to, error = %e, error_category = e.category(), "Send failed");
            e
        })
    }

    /// Send a message built around a temporary reply address and wait for
    /// the first reply of type `R`.
    ///
    /// The reply address is also the envelope's sender, so the target can
    /// answer with `ctx.reply(..)`.
    pub async fn query<M, R, F>(&self, to: &ActorRef, timeout: Duration, make_message: F) -> Result<R>
    where
        M: Message,
        R: Send + 'static,
        F: FnOnce(ActorRef) -> M,
    {
        let reply_id = ActorId::new();
        let reply_ref = ActorRef::new(
            reply_id,
            format!("{}query-{}", RESERVED_NAME_PREFIX, reply_id.uuid().simple()),
        );
        let (slot, reply_rx) = ReplySlot::<R>::new(reply_ref.name());
        // Unregisters on every exit, including the query future being dropped.
        let _registration = ReplyRegistration::register(
            &self.inner.registry,
            reply_ref.clone(),
            Arc::new(slot) as Arc<dyn CellHandle>,
        )?;

        self.send_from(&reply_ref, to, make_message(reply_ref.clone()))?;
        let outcome = tokio::time::timeout(timeout, reply_rx).await;

        match outcome {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(ActorError::stopped(reply_ref.name())),
            Err(_) => Err(ActorError::timeout(
                format!("query to {}", to),
                timeout.as_millis() as u64,
            )),
        }
    }

    /// Stop an actor.
    ///
    /// Pending messages are dropped; a message already being processed may
    /// finish within `stop_timeout` before it is cancelled.
    pub fn stop(&self, actor_ref: &ActorRef) -> Result<()> {
        let Some(cell) = self.inner.registry.unregister(actor_ref) else {
            warn!("Attempted to stop unknown actor {}", actor_ref);
            return Err(ActorError::not_found(actor_ref.to_string()));
        };

        let dropped = cell.stop();
        self.inner.metrics.record_stop();
        self.inner.metrics.record_dead_letters(dropped as u64);

        info!(
            actor_id = %actor_ref.id(),
            actor_name = %actor_ref.name(),
            dropped_messages = dropped,
            "Actor stop requested"
        );
        Ok(())
    }

    /// Find a live actor by name
    pub fn lookup(&self, name: &str) -> Option<ActorRef> {
        self.inner.registry.lookup(name)
    }

    /// Status of a live actor, `None` once it left the registry
    pub fn status(&self, actor_ref: &ActorRef) -> Option<ActorStatus> {
        self.inner.registry.cell(&actor_ref.id()).map(|cell| cell.status())
    }

    pub fn contains(&self, actor_ref: &ActorRef) -> bool {
        self.inner.registry.contains(actor_ref)
    }

    /// List user actors, sorted by name
    pub fn list_actors(&self) -> Vec<ActorRef> {
        self.inner
            .registry
            .list()
            .into_iter()
            .filter(|r| !r.name().starts_with(RESERVED_NAME_PREFIX))
            .collect()
    }

    /// Get system metrics
    pub fn metrics(&self) -> Arc<SystemMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn system_id(&self) -> &str {
        &self.inner.system_id
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.scheduler.is_shut_down()
    }

    /// Shutdown the entire actor system. Calling it again is a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        let Some(workers) = self.inner.workers.lock().take() else {
            debug!(system_id = %self.inner.system_id, "Actor system already shut down");
            return Ok(());
        };
        info!("Shutting down actor system {}", self.inner.system_id);

        let stopped = self.inner.stop_all();

        self.inner.scheduler.shutdown();
        let budget = self.inner.config.stop_timeout() + SHUTDOWN_GRACE;
        workers.join(budget).await;
        self.inner.scheduler.join_suspended(budget).await;

        info!(
            system_id = %self.inner.system_id,
            actors_stopped = stopped,
            "Actor system shutdown complete"
        );
        Ok(())
    }
}

impl SystemInner {
    /// Stop every registered cell, returning how many were user actors
    fn stop_all(&self) -> usize {
        let mut count = 0;
        for (actor_ref, cell) in self.registry.drain() {
            let dropped = cell.stop();
            if !actor_ref.name().starts_with(RESERVED_NAME_PREFIX) {
                self.metrics.record_stop();
                count += 1;
            }
            self.metrics.record_dead_letters(dropped as u64);
            debug!(actor_id = %actor_ref.id(), dropped_messages = dropped, "Stopped actor during shutdown");
        }
        count
    }
}

impl Drop for SystemInner {
    fn drop(&mut self) {
        if !self.scheduler.is_shut_down() {
            self.stop_all();
            self.scheduler.shutdown();
        }
    }
}

fn validate_actor_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ActorError::configuration("Actor name cannot be empty", Some("name")));
    }
    if name.starts_with(RESERVED_NAME_PREFIX) {
        return Err(ActorError::configuration(
            format!("Actor names starting with '{}' are reserved", RESERVED_NAME_PREFIX),
            Some("name"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> RuntimeConfig {
        RuntimeConfig::default()
            .with_workers(2)
            .with_stop_timeout(Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_actor_system_creation() {
        let system = ActorSystem::new(test_config()).unwrap();
        assert!(system.list_actors().is_empty());
        assert!(system.system_id().starts_with("system-"));
        system.shutdown().await.unwrap();
        assert!(system.is_shut_down());
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        let err = ActorSystem::new(test_config()).unwrap_err();
        assert_eq!(err.category(), "system");
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let err = ActorSystem::new(test_config().with_workers(0)).unwrap_err();
        assert_eq!(err.category(), "configuration");
    }

    #[tokio::test]
    async fn test_actor_spawn_registers_by_name() {
        let system = ActorSystem::new(test_config()).unwrap();
        let echo = system
            .spawn_stateless("echo", |_env: Envelope<String>, _ctx: Context| async { Ok(()) })
            .unwrap();

        assert_eq!(system.lookup("echo"), Some(echo.clone()));
        assert_eq!(system.status(&echo), Some(ActorStatus::Running));
        assert_eq!(system.list_actors(), vec![echo]);
        assert_eq!(system.metrics().get_stats().actors_spawned, 1);
        system.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_reserved_and_empty_names_rejected() {
        let system = ActorSystem::new(test_config()).unwrap();
        let handler = |_env: Envelope<u8>, _ctx: Context| async { Ok(()) };

        assert!(system.spawn_stateless("", handler).is_err());
        assert!(system.spawn_stateless("$query-1", handler).is_err());
        system.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_spawn_after_shutdown_fails() {
        let system = ActorSystem::new(test_config()).unwrap();
        system.shutdown().await.unwrap();
        // Idempotent
        system.shutdown().await.unwrap();

        let err = system
            .spawn_stateless("late", |_env: Envelope<u8>, _ctx: Context| async { Ok(()) })
            .unwrap_err();
        assert_eq!(err.category(), "system");
    }

    #[tokio::test]
    async fn test_send_to_unknown_actor_is_dead_letter() {
        let system = ActorSystem::new(test_config()).unwrap();
        let ghost = ActorRef::new(ActorId::new(), "ghost");

        let err = system.send(&ghost, 1u8).unwrap_err();
        assert!(matches!(err, ActorError::ActorNotFound { .. }));
        assert_eq!(system.metrics().get_stats().dead_letters, 1);
        system.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_send_wrong_message_type() {
        let system = ActorSystem::new(test_config()).unwrap();
        let echo = system
            .spawn_stateless("echo", |_env: Envelope<String>, _ctx: Context| async { Ok(()) })
            .unwrap();

        let err = system.send(&echo, 42u64).unwrap_err();
        assert_eq!(err.category(), "message_type");
        system.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_unregisters_and_rejects_sends() {
        let system = ActorSystem::new(test_config()).unwrap();
        let echo = system
            .spawn_stateless("echo", |_env: Envelope<u8>, _ctx: Context| async { Ok(()) })
            .unwrap();

        system.stop(&echo).unwrap();
        assert!(!system.contains(&echo));
        assert!(system.lookup("echo").is_none());
        assert!(system.send(&echo, 1u8).is_err());
        assert!(system.stop(&echo).is_err());

        // Name is free again
        assert!(system
            .spawn_stateless("echo", |_env: Envelope<u8>, _ctx: Context| async { Ok(()) })
            .is_ok());
        assert_eq!(system.metrics().get_stats().actors_stopped, 1);
        system.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_query_round_trip() {
        let system = ActorSystem::new(test_config()).unwrap();
        let doubler = system
            .spawn_stateless("doubler", |env: Envelope<u32>, ctx: Context| async move {
                ctx.reply(env.payload * 2)?;
                Ok(())
            })
            .unwrap();

        let answer: u32 = system
            .query(&doubler, Duration::from_secs(1), |_reply_to| 21u32)
            .await
            .unwrap();
        assert_eq!(answer, 42);

        // Reply slot is gone afterwards
        assert_eq!(system.list_actors(), vec![doubler]);
        assert_eq!(system.inner.registry.len(), 1);
        system.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_query_releases_reply_slot() {
        let system = ActorSystem::new(test_config()).unwrap();
        let silent = system
            .spawn_stateless("silent", |_env: Envelope<u8>, _ctx: Context| async { Ok(()) })
            .unwrap();

        for _ in 0..10 {
            let query = system.query::<u8, u8, _>(&silent, Duration::from_secs(10), |_| 1u8);
            let cancelled = tokio::time::timeout(Duration::from_millis(10), query).await;
            assert!(cancelled.is_err());
        }

        assert_eq!(system.inner.registry.len(), 1);
        system.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stop_always_reaches_stopped() {
        let system = ActorSystem::new(test_config().with_workers(4).with_throughput(2)).unwrap();

        for round in 0..20 {
            let busy = system
                .spawn_stateless("busy", |_env: Envelope<u32>, _ctx: Context| async {
                    tokio::task::yield_now().await;
                    Ok(())
                })
                .unwrap();
            for i in 0..50u32 {
                system.send(&busy, i).unwrap();
            }
            let cell = system.inner.registry.cell(&busy.id()).unwrap();
            if round % 2 == 0 {
                tokio::task::yield_now().await;
            }

            system.stop(&busy).unwrap();
            let settled = tokio::time::timeout(Duration::from_secs(2), async {
                while cell.status() != ActorStatus::Stopped {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            })
            .await;
            assert!(settled.is_ok(), "round {} stuck in {:?}", round, cell.status());
        }

        system.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_all_counts_only_user_actors() {
        let system = ActorSystem::new(test_config()).unwrap();
        system
            .spawn_stateless("echo", |_env: Envelope<u8>, _ctx: Context| async { Ok(()) })
            .unwrap();
        let (slot, _rx) = ReplySlot::<u8>::new("$query-pending");
        system
            .inner
            .registry
            .register(
                ActorRef::new(ActorId::new(), "$query-pending"),
                Arc::new(slot) as Arc<dyn CellHandle>,
            )
            .unwrap();

        assert_eq!(system.inner.stop_all(), 1);
        assert_eq!(system.metrics().get_stats().actors_stopped, 1);
        system.shutdown().await.unwrap();
    }
}
