//! Messages delivered to a component's mailbox.

use tokio::sync::oneshot;

use crate::CorrelationId;
use wasm_host_common::{ComponentId, LimitError};
use wasm_host_core::{ComponentOutput, FuelMetrics, Value};

/// Reply channel for a direct invocation.
pub type InvokeReply = oneshot::Sender<Result<(ComponentOutput, FuelMetrics), LimitError>>;

/// A message in a component's mailbox.
///
/// Components process their mailbox strictly in order, one message at a time.
#[derive(Debug)]
pub enum ComponentMessage {
    /// Call an export directly and reply with its output.
    Invoke {
        /// Export name.
        function: String,
        /// Arguments in declaration order.
        args: Vec<Value>,
        /// Where the outcome goes.
        reply: InvokeReply,
    },

    /// Fire-and-forget payload from another component.
    Message {
        /// Sender.
        from: ComponentId,
        /// Opaque payload.
        payload: Vec<u8>,
    },

    /// Payload that expects a correlated response.
    Request {
        /// Requester; the response goes back to it.
        from: ComponentId,
        /// Exchange id to respond with.
        correlation_id: CorrelationId,
        /// Opaque payload.
        payload: Vec<u8>,
    },
}

impl ComponentMessage {
    /// Short name of the variant, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Invoke { .. } => "invoke",
            Self::Message { .. } => "message",
            Self::Request { .. } => "request",
        }
    }
}
