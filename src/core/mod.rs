//! Core module - the rendezvous queue between the operator and the agent.
//!
//! - `message`: the flattened text payload
//! - `queue`: pending messages, suspended fetchers, and the hand-off between them

pub mod message;
pub mod queue;

pub use message::{Message, IMAGE_MARKER};
pub use queue::{Delivery, OverflowPolicy, QueueError, QueueStats, RendezvousQueue};
