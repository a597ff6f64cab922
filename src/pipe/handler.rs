//! Handler invocation contract.
//!
//! A handler receives the positional arguments of a message as [`Params`]
//! and a [`Context`] that lends it the server state. It returns a JSON value
//! or a [`HandlerError`]. Handlers never touch the protocol streams; anything
//! they want to send to the parent is queued through the context and written
//! by the transport once the handler returns.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::pipe::protocol::Outgoing;

/// Result of a handler call.
pub type HandlerResult = Result<Value, HandlerError>;

/// Failure raised by a handler body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The arguments did not match what the handler accepts.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// The handler ran and failed.
    #[error("handler failed: {0}")]
    Failed(String),
}

impl HandlerError {
    /// Creates an [`HandlerError::InvalidParams`].
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams(message.into())
    }

    /// Creates an [`HandlerError::Failed`].
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Positional arguments of a command or call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    args: Vec<Value>,
}

impl Params {
    /// Wraps a list of arguments.
    #[must_use]
    pub const fn new(args: Vec<Value>) -> Self {
        Self { args }
    }

    /// Number of arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Whether no arguments were passed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Fails unless exactly `expected` arguments were passed.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::InvalidParams`] on an arity mismatch.
    pub fn expect_len(&self, expected: usize) -> Result<(), HandlerError> {
        if self.args.len() == expected {
            Ok(())
        } else {
            Err(HandlerError::invalid_params(format!(
                "expected {expected} argument(s), got {}",
                self.args.len()
            )))
        }
    }

    /// Borrows argument `index` as raw JSON.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::InvalidParams`] if the argument is missing.
    pub fn raw(&self, index: usize) -> Result<&Value, HandlerError> {
        self.args
            .get(index)
            .ok_or_else(|| HandlerError::invalid_params(format!("missing argument {index}")))
    }

    /// Deserialises argument `index` into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::InvalidParams`] if the argument is missing or
    /// has the wrong shape.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<T, HandlerError> {
        let value = self.raw(index)?;
        T::deserialize(value)
            .map_err(|e| HandlerError::invalid_params(format!("argument {index}: {e}")))
    }

    /// Borrows all arguments.
    #[must_use]
    pub fn as_slice(&self) -> &[Value] {
        &self.args
    }

    /// Takes ownership of all arguments.
    #[must_use]
    pub fn into_vec(self) -> Vec<Value> {
        self.args
    }
}

/// What a handler sees of the server while it runs.
pub struct Context<'a, S> {
    state: &'a mut S,
    outbox: &'a mut Vec<Outgoing>,
}

impl<'a, S> Context<'a, S> {
    /// Creates a context over server state and the pending outgoing queue.
    pub fn new(state: &'a mut S, outbox: &'a mut Vec<Outgoing>) -> Self {
        Self { state, outbox }
    }

    /// Borrows the server state.
    #[must_use]
    pub fn state(&self) -> &S {
        self.state
    }

    /// Mutably borrows the server state.
    pub fn state_mut(&mut self) -> &mut S {
        self.state
    }

    /// Queues a one-way command for the parent.
    pub fn command(&mut self, name: impl Into<String>, args: Vec<Value>) {
        self.outbox.push(Outgoing::command(name, args));
    }

    /// Queues an event for the parent's emitter.
    pub fn emit(&mut self, event: impl Into<String>, args: Vec<Value>) {
        self.outbox.push(Outgoing::emit(event, args));
    }
}
