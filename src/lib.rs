//! parent-pipe: a line-delimited JSON server for child processes
//!
//! A parent process spawns the child and talks to it over the child's
//! stdin/stdout. Each line is one JSON message: either a one-way command or
//! a call that gets exactly one correlated reply. Handler failures become
//! error replies (or log lines, for commands); they never stop the server.
//!
//! # Modules
//!
//! - [`pipe`] — Transport, message classification, handler registry and the receive loop
//! - [`config`] — Configuration loading and validation
//! - [`diagnostics`] — stderr logging and panic reporting
//! - [`error`] — Error types
//! - [`test_server`] — Handlers served by the bundled binary

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod pipe;
pub mod test_server;
