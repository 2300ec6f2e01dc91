//! Message envelopes
//!
//! Payloads travel by value inside an [`Envelope`] together with the address
//! of whoever sent them. No serialization happens inside one process.

use crate::registry::ActorRef;

/// Marker for types that can be sent to an actor
pub trait Message: Send + 'static {}

impl<T: Send + 'static> Message for T {}

/// Immutable delivery unit: who sent it and what was sent
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<M> {
    /// Sending actor, `None` when sent from outside the system
    pub sender: Option<ActorRef>,
    pub payload: M,
}

impl<M: Message> Envelope<M> {
    pub fn new(sender: Option<ActorRef>, payload: M) -> Self {
        Self { sender, payload }
    }

    /// Envelope sent from outside any actor
    pub fn anonymous(payload: M) -> Self {
        Self::new(None, payload)
    }

    pub fn sender(&self) -> Option<&ActorRef> {
        self.sender.as_ref()
    }

    pub fn payload(&self) -> &M {
        &self.payload
    }

    pub fn into_payload(self) -> M {
        self.payload
    }

    /// Transform the payload, keeping the sender
    pub fn map<N: Message>(self, f: impl FnOnce(M) -> N) -> Envelope<N> {
        Envelope {
            sender: self.sender,
            payload: f(self.payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ActorId;

    #[test]
    fn test_anonymous_envelope_has_no_sender() {
        let envelope = Envelope::anonymous("hello".to_string());
        assert!(envelope.sender().is_none());
        assert_eq!(envelope.payload(), "hello");
    }

    #[test]
    fn test_map_keeps_sender() {
        let ping = ActorRef::new(ActorId::new(), "ping");
        let envelope = Envelope::new(Some(ping.clone()), "hello").map(|s| s.len());

        assert_eq!(envelope.sender(), Some(&ping));
        assert_eq!(envelope.into_payload(), 5);
    }
}
