//! Line transport for the parent pipe.
//!
//! - Messages are UTF-8 encoded JSON documents
//! - Messages are delimited by newlines
//! - Messages must not contain embedded newlines
//! - stdin: receives messages from the parent
//! - stdout: sends messages to the parent
//! - stderr: diagnostics only (never protocol messages)
//!
//! The transport is generic over the two streams so the server can be
//! driven from in-memory buffers as well as from the process's stdio.

use std::io;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::TransportError;

/// Newline-delimited JSON over a reader/writer pair.
pub struct JsonLineTransport<R, W> {
    /// Buffered input stream.
    reader: R,
    /// Output stream, flushed after every message.
    writer: W,
    /// Give up on a silent peer after this long.
    read_timeout: Option<Duration>,
}

/// Transport bound to the process's stdin and stdout.
pub type StdioTransport = JsonLineTransport<BufReader<tokio::io::Stdin>, tokio::io::Stdout>;

impl StdioTransport {
    /// Creates a transport over stdin/stdout.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> JsonLineTransport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a transport over the given streams.
    #[must_use]
    pub const fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            read_timeout: None,
        }
    }

    /// Sets how long [`receive`](Self::receive) waits for a line.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Reads the next raw line, without its terminator.
    ///
    /// Returns `None` on a zero-length read (EOF).
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the read timeout elapses.
    pub async fn read_line(&mut self) -> Result<Option<String>, TransportError> {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line);

        let bytes_read = match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| TransportError::ReadTimeout {
                    secs: limit.as_secs(),
                })??,
            None => read.await?,
        };

        if bytes_read == 0 {
            return Ok(None);
        }

        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }

        Ok(Some(line))
    }

    /// Receives the next JSON document.
    ///
    /// Returns `None` once the input is closed, that is on a zero-length
    /// read.
    ///
    /// Lines that are empty or only whitespace are skipped rather than
    /// decoded, so a stray blank line from the parent never ends the loop.
    /// A strict reader would treat it as malformed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Decode`] if a line is not valid JSON; no
    /// attempt is made to resynchronise after it.
    pub async fn receive(&mut self) -> Result<Option<Value>, TransportError> {
        loop {
            let Some(line) = self.read_line().await? else {
                return Ok(None);
            };

            if line.trim().is_empty() {
                tracing::trace!("skipping blank line");
                continue;
            }

            return match serde_json::from_str(&line) {
                Ok(value) => Ok(Some(value)),
                Err(source) => Err(TransportError::Decode { line, source }),
            };
        }
    }

    /// Serialises `message` onto one line and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub async fn send<T: Serialize + ?Sized>(&mut self, message: &T) -> Result<(), TransportError> {
        let json = serde_json::to_string(message).map_err(TransportError::Encode)?;
        self.write_raw(&json).await?;
        Ok(())
    }

    /// Writes a raw JSON string with newline termination.
    async fn write_raw(&mut self, json: &str) -> io::Result<()> {
        debug_assert!(
            !json.contains('\n'),
            "JSON message must not contain embedded newlines"
        );

        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        Ok(())
    }

    /// Gives back the underlying streams.
    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }
}
