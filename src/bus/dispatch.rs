//! Handler dispatch utilities.
//!
//! Common decode → dispatch → ack-decision cycle shared by bus backends.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::error;

use super::EventHandler;
use crate::events::EventEnvelope;

/// Dispatch an event to all registered handlers.
///
/// Calls each handler in sequence, logging errors but continuing to subsequent
/// handlers. Returns `true` if all handlers succeeded, `false` if any failed.
pub async fn dispatch_to_handlers(
    handlers: &Arc<RwLock<Vec<Box<dyn EventHandler>>>>,
    event: &Arc<EventEnvelope>,
) -> bool {
    let handlers_guard = handlers.read().await;
    let mut all_succeeded = true;

    for handler in handlers_guard.iter() {
        if let Err(e) = handler.handle(Arc::clone(event)).await {
            error!(kind = %event.kind(), error = %e, "Handler failed");
            all_succeeded = false;
        }
    }

    all_succeeded
}

/// Result of processing a message through handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchResult {
    /// All handlers succeeded, safe to acknowledge.
    Success,
    /// One or more handlers failed, redeliver.
    HandlerFailed,
    /// Message could not be decoded, no retry will help.
    DecodeError,
}

impl DispatchResult {
    /// Returns true if the message should be acknowledged (removed from queue).
    ///
    /// Decode errors are acked so bad messages are not redelivered forever.
    pub fn should_ack(&self) -> bool {
        matches!(self, Self::Success | Self::DecodeError)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Decode a raw payload and dispatch it to all handlers.
///
/// Envelopes with an unsupported schema version count as decode errors.
pub async fn process_message(
    payload: &[u8],
    handlers: &Arc<RwLock<Vec<Box<dyn EventHandler>>>>,
) -> DispatchResult {
    match EventEnvelope::decode(payload) {
        Ok(envelope) => {
            let envelope = Arc::new(envelope);
            if dispatch_to_handlers(handlers, &envelope).await {
                DispatchResult::Success
            } else {
                DispatchResult::HandlerFailed
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to decode event envelope");
            DispatchResult::DecodeError
        }
    }
}
