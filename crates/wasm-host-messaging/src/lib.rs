//! Correlated messaging for wasm-host.
//!
//! This crate provides:
//! - [`CorrelationTracker`]: Pending requests, resolved exactly once
//! - [`TimeoutHandler`]: One timer per pending request
//! - [`MessageRouter`]: Component id to mailbox routing
//! - [`MessagingService`]: Fire-and-forget and request-response on top of both
//!
//! # Request flow
//!
//! ```text
//! send_request ──► tracker.register_pending ──► timeouts.register_timeout
//!                                                       │
//!        router.route(Request) ──► target mailbox       │ sleep(timeout)
//!                                        │              ▼
//!                      respond ──► tracker.resolve   tracker.resolve_with_timeout
//!                                        │              │
//!                                        └── first remover wins ──► waiter
//! ```

pub mod correlation;
pub mod message;
pub mod router;
pub mod service;
pub mod timeout;
pub mod tracker;

pub use correlation::{CorrelationId, PendingRequest, ResponseMessage};
pub use message::{ComponentMessage, InvokeReply};
pub use router::MessageRouter;
pub use service::{MessagingService, MessagingStats};
pub use timeout::{TimeoutHandler, TimeoutTarget, TimerHandle};
pub use tracker::CorrelationTracker;
