//! Actor Runtime Error Types
//!
//! Every failure is contained to the actor it concerns. Behavior failures are
//! routed to supervision; routing failures are returned to the sender.

use thiserror::Error;

/// Main runtime error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActorError {
    /// User code failed while processing a message
    #[error("Behavior error in actor '{actor}': {message}")]
    Behavior { actor: String, message: String },

    /// Bounded mailbox reached its capacity
    #[error("Mailbox full for actor '{actor}': {depth} messages (limit: {capacity})")]
    MailboxFull {
        actor: String,
        depth: usize,
        capacity: usize,
    },

    /// Target is unknown or already stopped
    #[error("Actor not found: {target}")]
    ActorNotFound { target: String },

    /// Actor is shutting down and no longer accepts messages
    #[error("Actor '{actor}' is stopped")]
    ActorStopped { actor: String },

    /// Another live actor already owns this name
    #[error("Actor name '{name}' is already registered")]
    NameTaken { name: String },

    /// Payload type does not match what the actor receives
    #[error("Actor '{actor}' expects messages of type {expected}")]
    MessageType { actor: String, expected: String },

    /// Operation did not settle in time
    #[error("Timeout error: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Runtime-level errors
    #[error("System error: {message}")]
    System { message: String },
}

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, ActorError>;

impl ActorError {
    /// Create a behavior error from whatever the user code returned
    pub fn behavior(actor: impl Into<String>, error: &anyhow::Error) -> Self {
        Self::Behavior {
            actor: actor.into(),
            message: format!("{:#}", error),
        }
    }

    pub fn mailbox_full(actor: impl Into<String>, depth: usize, capacity: usize) -> Self {
        Self::MailboxFull {
            actor: actor.into(),
            depth,
            capacity,
        }
    }

    pub fn not_found(target: impl Into<String>) -> Self {
        Self::ActorNotFound {
            target: target.into(),
        }
    }

    pub fn stopped(actor: impl Into<String>) -> Self {
        Self::ActorStopped {
            actor: actor.into(),
        }
    }

    pub fn message_type<M>(actor: impl Into<String>) -> Self {
        Self::MessageType {
            actor: actor.into(),
            expected: std::any::type_name::<M>().to_string(),
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    /// Short category label for structured logs
    pub fn category(&self) -> &'static str {
        match self {
            Self::Behavior { .. } => "behavior",
            Self::MailboxFull { .. } => "mailbox_full",
            Self::ActorNotFound { .. } => "actor_not_found",
            Self::ActorStopped { .. } => "actor_stopped",
            Self::NameTaken { .. } => "name_taken",
            Self::MessageType { .. } => "message_type",
            Self::Timeout { .. } => "timeout",
            Self::Configuration { .. } => "configuration",
            Self::System { .. } => "system",
        }
    }

    /// Whether the failure means the target is gone for good
    pub fn is_dead_letter(&self) -> bool {
        matches!(self, Self::ActorNotFound { .. } | Self::ActorStopped { .. })
    }
}
