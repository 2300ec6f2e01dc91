//! Request/response over fire-and-forget sends.
//!
//! A query registers a one-shot reply slot as a temporary actor. The target
//! replies to it like to any other sender; the first reply of the expected
//! type completes the query.

use crate::cell::CellHandle;
use crate::registry::{ActorRef, ActorRegistry};
use crate::supervision::ActorStatus;
use crate::{ActorError, Result};
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;
use tokio::sync::oneshot;

pub(crate) struct ReplySlot<R> {
    name: String,
    reply_tx: Mutex<Option<oneshot::Sender<R>>>,
}

impl<R: Send + 'static> ReplySlot<R> {
    pub(crate) fn new(name: impl Into<String>) -> (Self, oneshot::Receiver<R>) {
        let (tx, rx) = oneshot::channel();
        let slot = Self {
            name: name.into(),
            reply_tx: Mutex::new(Some(tx)),
        };
        (slot, rx)
    }
}

impl<R: Send + 'static> CellHandle for ReplySlot<R> {
    fn deliver(&self, payload: Box<dyn Any + Send>, _sender: Option<ActorRef>) -> Result<()> {
        let reply = payload
            .downcast::<R>()
            .map_err(|_| ActorError::message_type::<R>(&self.name))?;

        let tx = self
            .reply_tx
            .lock()
            .take()
            .ok_or_else(|| ActorError::stopped(&self.name))?;
        tx.send(*reply).map_err(|_| ActorError::stopped(&self.name))
    }

    fn status(&self) -> ActorStatus {
        if self.reply_tx.lock().is_some() {
            ActorStatus::Running
        } else {
            ActorStatus::Stopped
        }
    }

    fn stop(&self) -> usize {
        self.reply_tx.lock().take();
        0
    }
}

/// Keeps a reply slot registered for as long as the query is alive
pub(crate) struct ReplyRegistration<'a> {
    registry: &'a ActorRegistry,
    reply_ref: ActorRef,
}

impl<'a> ReplyRegistration<'a> {
    pub(crate) fn register(
        registry: &'a ActorRegistry,
        reply_ref: ActorRef,
        slot: Arc<dyn CellHandle>,
    ) -> Result<Self> {
        registry.register(reply_ref.clone(), slot)?;
        Ok(Self { registry, reply_ref })
    }
}

impl Drop for ReplyRegistration<'_> {
    fn drop(&mut self) {
        if let Some(slot) = self.registry.unregister(&self.reply_ref) {
            slot.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_reply_completes_slot() {
        let (slot, rx) = ReplySlot::<u32>::new("$query-test");
        assert_eq!(slot.status(), ActorStatus::Running);

        slot.deliver(Box::new(7u32), None).unwrap();
        assert_eq!(rx.await.unwrap(), 7);
        assert_eq!(slot.status(), ActorStatus::Stopped);

        let err = slot.deliver(Box::new(8u32), None).unwrap_err();
        assert!(err.is_dead_letter());
    }

    #[test]
    fn test_registration_released_on_drop() {
        let registry = ActorRegistry::new();
        let reply_ref = ActorRef::new(crate::ActorId::new(), "$query-drop");
        let (slot, _rx) = ReplySlot::<u32>::new(reply_ref.name());

        let registration =
            ReplyRegistration::register(&registry, reply_ref.clone(), Arc::new(slot)).unwrap();
        assert!(registry.contains(&reply_ref));

        drop(registration);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_wrong_reply_type_is_rejected() {
        let (slot, _rx) = ReplySlot::<u32>::new("$query-test");
        let err = slot.deliver(Box::new("nope"), None).unwrap_err();
        assert_eq!(err.category(), "message_type");
        assert_eq!(slot.status(), ActorStatus::Running);
    }
}
