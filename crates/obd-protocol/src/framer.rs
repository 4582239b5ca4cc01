//! Single-exchange framing for the ELM327 text protocol
//!
//! A command goes out with a `\r` terminator; the reply is accumulated until
//! the `>` prompt shows up, the adapter goes quiet for a full timeout, or the
//! exchange as a whole runs past [`MAX_EXCHANGE_TIMEOUTS`] timeouts.

use crate::error::ObdError;
use crate::marker;
use crate::transport::BoxedStream;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Upper bound on one exchange, in multiples of the idle timeout
pub const MAX_EXCHANGE_TIMEOUTS: u32 = 5;

/// Request/response framer over one adapter stream
pub struct Framer {
    stream: BoxedStream,
    timeout: Duration,
    buffer_size: usize,
}

impl Framer {
    /// Wrap an open stream
    pub fn new(stream: BoxedStream, timeout: Duration, buffer_size: usize) -> Self {
        Self {
            stream,
            timeout,
            buffer_size: buffer_size.max(1),
        }
    }

    /// Send one command and return the cleaned response.
    ///
    /// A reply cut short by the timeout is returned as-is (possibly empty).
    /// Socket failures and a stalled write are errors, and both leave the
    /// stream out of step with the adapter.
    pub async fn send(&mut self, command: &str) -> Result<String, ObdError> {
        let mut line = Vec::with_capacity(command.len() + 1);
        line.extend_from_slice(command.as_bytes());
        line.push(marker::TERMINATOR);

        debug!("Sending to adapter: {:?}", command);

        let timeout = self.timeout;
        let stream = &mut self.stream;
        let write = async {
            stream.write_all(&line).await?;
            stream.flush().await
        };
        match tokio::time::timeout(timeout, write).await {
            Ok(result) => result?,
            Err(_) => return Err(ObdError::WriteTimeout(timeout.as_millis() as u64)),
        }

        let raw = self.read_until_prompt().await?;
        let response = normalize_response(&raw, command);
        debug!("Response to {:?}: {:?}", command, response);
        Ok(response)
    }

    /// Close the write half so the adapter sees the session end
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!("Ignoring shutdown error: {}", e);
        }
    }

    async fn read_until_prompt(&mut self) -> Result<Vec<u8>, ObdError> {
        let mut response = Vec::new();
        let mut chunk = vec![0u8; self.buffer_size];
        let started = Instant::now();
        let deadline = started + self.timeout * MAX_EXCHANGE_TIMEOUTS;

        while !response.contains(&marker::PROMPT) {
            let idle = (Instant::now() + self.timeout).min(deadline);
            match tokio::time::timeout_at(idle, self.stream.read(&mut chunk)).await {
                Err(_) => {
                    warn!(
                        "No prompt after {}ms, returning {} bytes",
                        started.elapsed().as_millis(),
                        response.len()
                    );
                    break;
                }
                Ok(Ok(0)) => return Err(ObdError::ConnectionClosed),
                Ok(Ok(n)) => response.extend_from_slice(&chunk[..n]),
                Ok(Err(e)) => return Err(e.into()),
            }
        }

        Ok(response)
    }
}

/// Decode and clean a raw reply: strip a leading echo of `command`, drop
/// prompts, fold line breaks into single spaces and trim.
///
/// An echo is only recognized as a whole first line, so a reply that merely
/// starts with the command's characters keeps them.
pub fn normalize_response(raw: &[u8], command: &str) -> String {
    let text = String::from_utf8_lossy(raw);
    let text = strip_echo(text.trim_start(), command.trim());
    let mut cleaned = String::with_capacity(text.len());
    let mut line_break = false;

    for c in text.chars() {
        match c {
            '>' => {}
            '\r' | '\n' => line_break = true,
            _ => {
                if line_break && !cleaned.is_empty() {
                    cleaned.push(' ');
                }
                line_break = false;
                cleaned.push(c);
            }
        }
    }

    cleaned.trim().to_string()
}

fn strip_echo<'a>(text: &'a str, command: &str) -> &'a str {
    match text.strip_prefix(command) {
        Some(rest) if !command.is_empty() && rest.starts_with(['\r', '\n']) => rest,
        _ => text,
    }
}

/// Empty replies and replies carrying `NO DATA` or `ERROR`
pub fn is_negative(response: &str) -> bool {
    response.trim().is_empty()
        || response.contains(marker::NO_DATA)
        || response.contains(marker::ERROR)
}

/// Replies carrying the `OK` acknowledgment
pub fn is_affirmative(response: &str) -> bool {
    response.contains(marker::OK)
}
