//! In-process Actor Runtime
//!
//! Isolated units of state and behavior that communicate only through
//! messages. Many actors are multiplexed over a small pool of worker tasks;
//! each actor still handles exactly one message at a time, in arrival order.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                     ActorSystem                      │
//! │                                                      │
//! │  ActorRegistry        Scheduler         Metrics      │
//! │  name -> ActorRef     run queue                      │
//! │  id   -> cell         ┌────────┐                     │
//! │                       │worker 0│ ─┐                  │
//! │                       │worker 1│ ─┼─> ActorCell      │
//! │                       │  ...   │ ─┘   ├ Mailbox      │
//! │                       └────────┘      ├ state        │
//! │                                       └ Supervisor   │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Examples
//!
//! ```rust,no_run
//! use actor_runtime::{ActorSystem, Context, Envelope, RuntimeConfig};
//!
//! # async fn run() -> actor_runtime::Result<()> {
//! let system = ActorSystem::new(RuntimeConfig::default())?;
//!
//! let greeter = system.spawn(
//!     "greeter",
//!     Vec::<String>::new(),
//!     |mut seen: Vec<String>, env: Envelope<String>, _ctx: Context| async move {
//!         if !seen.contains(&env.payload) {
//!             seen.push(env.payload);
//!         }
//!         Ok(seen)
//!     },
//! )?;
//!
//! system.send(&greeter, "Alice".to_string())?;
//! system.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod behavior;
pub mod config;
pub mod error;
pub mod mailbox;
pub mod messages;
pub mod metrics;
pub mod registry;
pub mod supervision;
pub mod system;

mod cell;
mod query;
mod scheduler;

pub use behavior::{Behavior, Context, Stateless};
pub use config::{RuntimeConfig, SupervisionConfig};
pub use error::{ActorError, Result};
pub use mailbox::Mailbox;
pub use messages::{Envelope, Message};
pub use metrics::{SystemMetrics, SystemStats};
pub use registry::{ActorId, ActorRef};
pub use supervision::{ActorStatus, SupervisionPolicy, SupervisorDirective};
pub use system::{ActorSystem, SpawnOptions};
