//! `rover-middleware` – host-side plumbing.
//!
//! Moves bytes and signals between the orchestrator and everything outside
//! it, without caring what they mean.
//!
//! # Modules
//!
//! - [`link`] – the [`SerialLink`] trait, the `serialport`-backed link and
//!   the [`LineAssembler`][link::LineAssembler] for inbound lines.
//! - [`loopback`] – an in-process link to a simulated controller running on
//!   its own thread, with fault injection.
//! - [`retry`] – exponential backoff for link writes.
//! - [`mailbox`] – the single-slot signal mailbox shared with the speech
//!   capture process (file and in-memory backends).
//! - [`bus`] – topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.

pub mod bus;
pub mod link;
pub mod loopback;
pub mod mailbox;
pub mod retry;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use link::{SerialLink, SerialPortLink};
pub use loopback::{LinkFault, LoopbackLink, SimulatedDevice};
pub use mailbox::{FileMailbox, Mailbox, MemoryMailbox};
pub use retry::RetryPolicy;
