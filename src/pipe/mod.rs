//! Parent pipe: a child process serving its parent over stdio.
//!
//! The parent writes one JSON object per line to the child's stdin and reads
//! replies, one per line, from the child's stdout. Two kinds of message exist:
//! one-way commands and correlated calls. Calls come in a legacy and a
//! current dialect, and each is answered in the dialect it arrived in.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                        PipeServer                          │
//! │                                                            │
//! │   ┌─────────────┐   ┌─────────────┐   ┌──────────────┐     │
//! │   │  Transport  │──▶│  protocol   │──▶│   Registry   │     │
//! │   │   (lines)   │   │ (classify)  │   │  (handlers)  │     │
//! │   └─────────────┘   └─────────────┘   └──────────────┘     │
//! │          ▲                                    │            │
//! │          │          ┌─────────────┐           │            │
//! │          └──────────│    fault    │◀──────────┘            │
//! │            replies  │  (isolate)  │                        │
//! │                     └─────────────┘                        │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every call registry also answers `handshake`, so a parent can check the
//! child is alive right after spawning it.

pub mod fault;
pub mod handler;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod transport;

pub use fault::Fault;
pub use handler::{Context, HandlerError, HandlerResult, Params};
pub use protocol::{IncomingMessage, Outgoing, HANDSHAKE_METHOD};
pub use registry::{HandlerKind, Registry, RegistryBuilder};
pub use server::{PipeServer, ServerState};
pub use transport::{JsonLineTransport, StdioTransport};
