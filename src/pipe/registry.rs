//! Name to handler mapping.
//!
//! Commands and RPC methods live in separate namespaces, tagged `cmd_` and
//! `rpc_` in diagnostics. The registry is assembled once through
//! [`RegistryBuilder`] and cannot change while the server runs.

use std::collections::HashMap;

use serde_json::Value;

use crate::pipe::handler::{Context, HandlerResult, Params};
use crate::pipe::protocol::{COMMAND_TAG, HANDSHAKE_METHOD, HANDSHAKE_REPLY, RPC_TAG};

/// A boxed handler over server state `S`.
pub type Handler<S> = Box<dyn Fn(&mut Context<'_, S>, Params) -> HandlerResult>;

/// Which namespace a handler belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    /// One-way command handler.
    Command,
    /// Request/response handler.
    Rpc,
}

impl HandlerKind {
    /// Namespace tag used when naming handlers in diagnostics.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Command => COMMAND_TAG,
            Self::Rpc => RPC_TAG,
        }
    }

    /// Full handler name, e.g. `rpc_test1`.
    #[must_use]
    pub fn qualified(self, name: &str) -> String {
        format!("{}{name}", self.tag())
    }
}

/// Fixed set of handlers a server dispatches to.
pub struct Registry<S> {
    commands: HashMap<String, Handler<S>>,
    methods: HashMap<String, Handler<S>>,
}

impl<S: 'static> Registry<S> {
    /// Starts a registry with the built-in `handshake` method.
    #[must_use]
    pub fn builder() -> RegistryBuilder<S> {
        RegistryBuilder {
            commands: HashMap::new(),
            methods: HashMap::new(),
        }
        .method(HANDSHAKE_METHOD, handshake::<S>)
    }
}

impl<S> Registry<S> {
    /// Looks up a handler by exact name.
    #[must_use]
    pub fn lookup(&self, kind: HandlerKind, name: &str) -> Option<&Handler<S>> {
        self.table(kind).get(name)
    }

    /// Whether a handler with this name exists.
    #[must_use]
    pub fn contains(&self, kind: HandlerKind, name: &str) -> bool {
        self.table(kind).contains_key(name)
    }

    /// Registered names in one namespace, sorted.
    #[must_use]
    pub fn names(&self, kind: HandlerKind) -> Vec<&str> {
        let mut names: Vec<&str> = self.table(kind).keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    const fn table(&self, kind: HandlerKind) -> &HashMap<String, Handler<S>> {
        match kind {
            HandlerKind::Command => &self.commands,
            HandlerKind::Rpc => &self.methods,
        }
    }
}

impl<S> std::fmt::Debug for Registry<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("commands", &self.names(HandlerKind::Command))
            .field("methods", &self.names(HandlerKind::Rpc))
            .finish()
    }
}

/// Collects handlers before the server starts.
pub struct RegistryBuilder<S> {
    commands: HashMap<String, Handler<S>>,
    methods: HashMap<String, Handler<S>>,
}

impl<S> RegistryBuilder<S> {
    /// Registers an RPC method. A later registration under the same name
    /// replaces the earlier one, including the built-in handshake.
    #[must_use]
    pub fn method<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut Context<'_, S>, Params) -> HandlerResult + 'static,
    {
        self.methods.insert(name.into(), Box::new(handler));
        self
    }

    /// Registers a command.
    #[must_use]
    pub fn command<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut Context<'_, S>, Params) -> HandlerResult + 'static,
    {
        self.commands.insert(name.into(), Box::new(handler));
        self
    }

    /// Freezes the handler set.
    #[must_use]
    pub fn build(self) -> Registry<S> {
        Registry {
            commands: self.commands,
            methods: self.methods,
        }
    }
}

#[allow(clippy::needless_pass_by_value)] // handler signature is fixed
fn handshake<S>(_ctx: &mut Context<'_, S>, _params: Params) -> HandlerResult {
    Ok(Value::String(HANDSHAKE_REPLY.to_string()))
}
