//! Fault isolation around handler calls.
//!
//! [`invoke`] is the only place handlers are called from. Whatever happens
//! inside the handler (a returned error, a panic, or no handler at all) comes
//! back as a [`Fault`], so the receive loop always gets a value it can reply
//! with and keeps running.
//!
//! A panic can leave the server state half-updated. The loop carries on
//! with it as is.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use serde_json::Value;
use thiserror::Error;

use crate::pipe::handler::{Context, HandlerError, Params};
use crate::pipe::registry::{HandlerKind, Registry};

/// Why a handler call did not produce a value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// No handler is registered under the qualified name.
    #[error("unknown handler: {name}")]
    UnknownHandler {
        /// Qualified handler name, e.g. `rpc_nope`.
        name: String,
    },

    /// The handler returned an error.
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panic(String),
}

/// Calls the handler registered as `name` in the `kind` namespace.
///
/// # Errors
///
/// Returns a [`Fault`] if the handler is missing, fails, or panics.
pub fn invoke<S>(
    registry: &Registry<S>,
    kind: HandlerKind,
    name: &str,
    ctx: &mut Context<'_, S>,
    params: Params,
) -> Result<Value, Fault> {
    let handler = registry
        .lookup(kind, name)
        .ok_or_else(|| Fault::UnknownHandler {
            name: kind.qualified(name),
        })?;

    match panic::catch_unwind(AssertUnwindSafe(|| handler(ctx, params))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(Fault::Handler(error)),
        Err(payload) => Err(Fault::Panic(panic_message(payload.as_ref()))),
    }
}

/// Extracts the message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
