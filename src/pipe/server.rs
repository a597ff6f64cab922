//! The receive loop.
//!
//! One message is handled completely (decode, dispatch, optional reply)
//! before the next line is read:
//!
//! 1. **Command**: handler runs, result is discarded, nothing is written
//! 2. **Call** (either dialect): handler runs, exactly one reply is written
//! 3. **Invalid**: logged, answered with an error when an id is known
//! 4. **Unknown**: logged and skipped
//!
//! Messages a handler queued for the parent are written after the handler
//! returns and before its reply.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::error::ServerError;
use crate::pipe::fault::{self, Fault};
use crate::pipe::handler::{Context, Params};
use crate::pipe::protocol::{Dialect, IncomingMessage, Outgoing, OutgoingReply, ReplyTo};
use crate::pipe::registry::{HandlerKind, Registry};
use crate::pipe::transport::{JsonLineTransport, StdioTransport};

/// Where the server is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Constructed, loop not started.
    Idle,
    /// Receive loop running.
    Running,
    /// Input closed, shutdown requested, or transport failed.
    Stopped,
}

/// A child-side server dispatching parent messages to a [`Registry`].
pub struct PipeServer<S, R, W> {
    /// Current server state.
    status: ServerState,
    /// The transport layer.
    transport: JsonLineTransport<R, W>,
    /// Handlers, fixed at construction.
    registry: Registry<S>,
    /// Application state lent to handlers.
    state: S,
    /// Messages queued by the running handler.
    outbox: Vec<Outgoing>,
}

impl<S> PipeServer<S, tokio::io::BufReader<tokio::io::Stdin>, tokio::io::Stdout> {
    /// Creates a server over the process's stdin and stdout.
    ///
    /// Logging must already be routed away from stdout (see
    /// [`crate::diagnostics::init_tracing`]) before the loop starts.
    #[must_use]
    pub fn stdio(registry: Registry<S>, state: S) -> Self {
        Self::new(registry, state, StdioTransport::stdio())
    }
}

impl<S, R, W> PipeServer<S, R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a server over an existing transport.
    #[must_use]
    pub const fn new(registry: Registry<S>, state: S, transport: JsonLineTransport<R, W>) -> Self {
        Self {
            status: ServerState::Idle,
            transport,
            registry,
            state,
            outbox: Vec::new(),
        }
    }

    /// Sets the transport read timeout.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.transport = self.transport.with_read_timeout(timeout);
        self
    }

    /// Returns the current server state.
    #[must_use]
    pub const fn status(&self) -> ServerState {
        self.status
    }

    /// Borrows the application state.
    #[must_use]
    pub const fn state(&self) -> &S {
        &self.state
    }

    /// Mutably borrows the application state.
    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    /// Splits the server into its state and transport.
    pub fn into_parts(self) -> (S, JsonLineTransport<R, W>) {
        (self.state, self.transport)
    }

    /// Sends a one-way command to the parent.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub async fn send_command(
        &mut self,
        name: impl Into<String>,
        args: Vec<Value>,
    ) -> Result<(), ServerError> {
        self.transport.send(&Outgoing::command(name, args)).await?;
        Ok(())
    }

    /// Emits an event to the parent.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub async fn emit(&mut self, event: impl Into<String>, args: Vec<Value>) -> Result<(), ServerError> {
        self.transport.send(&Outgoing::emit(event, args)).await?;
        Ok(())
    }

    /// Runs until the input is closed.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails.
    pub async fn run(&mut self) -> Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs until the input is closed or `shutdown` completes.
    ///
    /// Shutdown is only observed between messages. Once stopped, further
    /// calls return immediately without touching the streams.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails; the server is stopped after.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        if self.status == ServerState::Stopped {
            return Ok(());
        }
        self.status = ServerState::Running;

        let result = self.receive_loop(shutdown).await;
        self.status = ServerState::Stopped;
        result
    }

    async fn receive_loop<F>(&mut self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let received = tokio::select! {
                biased;

                () = &mut shutdown => {
                    info!("Shutdown requested, stopping receive loop");
                    return Ok(());
                }

                received = self.transport.receive() => received,
            };

            let Some(message) = received? else {
                info!("Input closed, stopping receive loop");
                return Ok(());
            };

            self.handle_message(IncomingMessage::classify(message)).await?;
        }
    }

    /// Handles one classified message.
    async fn handle_message(&mut self, message: IncomingMessage) -> Result<(), ServerError> {
        match message {
            IncomingMessage::Command { name, args } => {
                self.handle_command(&name, args);
                self.flush_outbox().await
            }
            IncomingMessage::LegacyCall { method, args, id } => {
                self.handle_call(ReplyTo { dialect: Dialect::Legacy, id }, &method, args)
                    .await
            }
            IncomingMessage::Call { method, params, id } => {
                self.handle_call(ReplyTo { dialect: Dialect::Current, id }, &method, params)
                    .await
            }
            IncomingMessage::Invalid { reason, reply_to } => {
                warn!(%reason, "Rejecting malformed message");
                match reply_to {
                    Some(to) => self.reply(to, Err(format!("invalid message: {reason}"))).await,
                    None => Ok(()),
                }
            }
            IncomingMessage::Unknown => {
                debug!("Ignoring message without cmdReq, rpcReq or method");
                Ok(())
            }
        }
    }

    /// Runs a command handler. Failures are logged and otherwise dropped;
    /// there is no reply channel for commands.
    fn handle_command(&mut self, name: &str, args: Vec<Value>) {
        match self.invoke(HandlerKind::Command, name, args) {
            Ok(_) => debug!(command = name, "Command handled"),
            Err(fault) => warn!(command = name, error = %fault, "Command failed"),
        }
    }

    /// Runs an RPC handler and sends its reply.
    async fn handle_call(
        &mut self,
        to: ReplyTo,
        method: &str,
        args: Vec<Value>,
    ) -> Result<(), ServerError> {
        let outcome = self.invoke(HandlerKind::Rpc, method, args);
        match &outcome {
            Ok(_) => debug!(method, id = %to.id, "Call handled"),
            Err(fault) => warn!(method, id = %to.id, error = %fault, "Call failed"),
        }

        self.flush_outbox().await?;
        self.reply(to, outcome.map_err(|fault| fault.to_string())).await
    }

    fn invoke(&mut self, kind: HandlerKind, name: &str, args: Vec<Value>) -> Result<Value, Fault> {
        let mut ctx = Context::new(&mut self.state, &mut self.outbox);
        fault::invoke(&self.registry, kind, name, &mut ctx, Params::new(args))
    }

    /// Writes a reply. A failure here ends the loop.
    async fn reply(&mut self, to: ReplyTo, outcome: Result<Value, String>) -> Result<(), ServerError> {
        self.transport.send(&OutgoingReply::new(to, outcome)).await?;
        Ok(())
    }

    async fn flush_outbox(&mut self) -> Result<(), ServerError> {
        for message in std::mem::take(&mut self.outbox) {
            self.transport.send(&message).await?;
        }
        Ok(())
    }
}

/// Completes when the process is asked to stop.
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigint, mut sigterm) =
        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Signal handlers unavailable, only end of input stops the server");
                return std::future::pending().await;
            }
        };

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
        _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

/// Completes when the process is asked to stop.
#[cfg(windows)]
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(e) => {
            warn!(error = %e, "Ctrl+C handler unavailable, only end of input stops the server");
            std::future::pending::<()>().await;
        }
    }
}
