//! Actor behaviors
//!
//! A behavior turns `(state, envelope, context)` into the next state. Plain
//! async closures qualify through the blanket impl below, so
//!
//! ```rust,ignore
//! system.spawn("counter", 0u64, |count: u64, _env: Envelope<Tick>, _ctx: Context| async move {
//!     Ok(count + 1)
//! })?;
//! ```
//!
//! is a complete actor.

use crate::messages::{Envelope, Message};
use crate::registry::ActorRef;
use crate::system::ActorSystem;
use crate::{ActorError, Result};
use async_trait::async_trait;
use std::future::Future;

/// Message handling logic of a stateful actor
#[async_trait]
pub trait Behavior<S: Send + 'static, M: Message>: Send + Sync + 'static {
    /// Handle one envelope and return the next state.
    ///
    /// An `Err` is handed to supervision.
    async fn receive(&self, state: S, envelope: Envelope<M>, ctx: Context) -> anyhow::Result<S>;
}

#[async_trait]
impl<S, M, F, Fut> Behavior<S, M> for F
where
    S: Send + 'static,
    M: Message,
    F: Fn(S, Envelope<M>, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<S>> + Send + 'static,
{
    async fn receive(&self, state: S, envelope: Envelope<M>, ctx: Context) -> anyhow::Result<S> {
        (self)(state, envelope, ctx).await
    }
}

/// Adapter giving a state-free handler the stateful contract with `S = ()`
pub struct Stateless<F> {
    handler: F,
}

impl<F> Stateless<F> {
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<M, F, Fut> Behavior<(), M> for Stateless<F>
where
    M: Message,
    F: Fn(Envelope<M>, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn receive(&self, _state: (), envelope: Envelope<M>, ctx: Context) -> anyhow::Result<()> {
        (self.handler)(envelope, ctx).await
    }
}

/// What a behavior knows about itself while handling one envelope
#[derive(Clone)]
pub struct Context {
    self_ref: ActorRef,
    sender: Option<ActorRef>,
    system: ActorSystem,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("self_ref", &self.self_ref)
            .field("sender", &self.sender)
            .field("system_id", &self.system.system_id())
            .finish()
    }
}

impl Context {
    pub(crate) fn new(self_ref: ActorRef, sender: Option<ActorRef>, system: ActorSystem) -> Self {
        Self {
            self_ref,
            sender,
            system,
        }
    }

    /// Address of the running actor
    pub fn self_ref(&self) -> &ActorRef {
        &self.self_ref
    }

    pub fn name(&self) -> &str {
        self.self_ref.name()
    }

    /// Sender of the envelope being handled
    pub fn sender(&self) -> Option<&ActorRef> {
        self.sender.as_ref()
    }

    pub fn system(&self) -> &ActorSystem {
        &self.system
    }

    /// Fire-and-forget send with this actor as sender
    pub fn send<M: Message>(&self, to: &ActorRef, msg: M) -> Result<()> {
        self.system.send_from(&self.self_ref, to, msg)
    }

    /// Send back to whoever sent the current envelope
    pub fn reply<M: Message>(&self, msg: M) -> Result<()> {
        match &self.sender {
            Some(sender) => self.send(sender, msg),
            None => Err(ActorError::not_found(format!(
                "sender of message handled by '{}'",
                self.name()
            ))),
        }
    }
}
