//! LLM-driven automation agent for a live browser tab.
//!
//! A user request (or a raw command) comes in over [`face`], the
//! [`brain::Orchestrator`] grounds the external model in a bounded page
//! snapshot from [`dom`], and the model's tool calls are classified by
//! [`classifier`] and executed by [`hands`] — all page traffic flowing
//! through the [`channel::PageChannel`] dispatch seam.

pub mod brain;
pub mod channel;
pub mod classifier;
pub mod dom;
pub mod error;
pub mod face;
pub mod hands;
pub mod session;
pub mod types;
