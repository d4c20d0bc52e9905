//! Service event hooks.
//!
//! Observers subscribe to the three batch-lifecycle points the service
//! emits: received, processed, deleted. Hooks are diagnostic, never
//! control flow — the service invokes each observer inside a failure
//! boundary that logs and discards errors and panics, so a buggy
//! subscriber cannot affect dispatch, deletion, or the loop.

use crate::error::Result;
use crate::queue::Message;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// Batch-lifecycle hooks. All methods default to no-ops so observers
/// implement only the points they care about.
pub trait ServiceEvents: Send + Sync {
    /// A batch was received from a queue (possibly empty).
    fn messages_received(&self, _messages: &[Message]) -> Result<()> {
        Ok(())
    }

    /// Every message in the batch has settled (dispatch finished).
    fn messages_processed(&self, _messages: &[Message]) -> Result<()> {
        Ok(())
    }

    /// The batch delete call for these messages completed.
    fn messages_deleted(&self, _messages: &[Message]) -> Result<()> {
        Ok(())
    }
}

/// Which hook to invoke on a set of observers.
#[derive(Debug, Clone, Copy)]
pub enum Hook {
    Received,
    Processed,
    Deleted,
}

impl Hook {
    fn name(&self) -> &'static str {
        match self {
            Hook::Received => "messages_received",
            Hook::Processed => "messages_processed",
            Hook::Deleted => "messages_deleted",
        }
    }
}

/// Invoke one hook on every observer, each inside a failure boundary.
pub fn emit(observers: &[Arc<dyn ServiceEvents>], hook: Hook, messages: &[Message]) {
    for observer in observers {
        let outcome = catch_unwind(AssertUnwindSafe(|| match hook {
            Hook::Received => observer.messages_received(messages),
            Hook::Processed => observer.messages_processed(messages),
            Hook::Deleted => observer.messages_deleted(messages),
        }));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(hook = hook.name(), "event subscriber error: {e}");
            }
            Err(_) => {
                tracing::error!(hook = hook.name(), "event subscriber panicked");
            }
        }
    }
}
