//! Signal bridge between borrower tasks and slot worker threads.
//!
//! # Architecture
//!
//! - **protocol**: Closed command/reply set and slot/cursor identifiers
//! - **channel**: The per-slot handoff (wake signal out, oneshot ack back)

pub(crate) mod channel;
pub mod protocol;
