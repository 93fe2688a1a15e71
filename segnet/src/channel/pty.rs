//! PTY channel for interactive CLI sessions.

use std::time::Duration;

use log::trace;
use regex::bytes::Regex;
use russh::ChannelMsg;
use russh::client::Msg;
use tokio::time::Instant;

use super::buffer::PatternBuffer;
use crate::error::{ChannelError, Result};

/// Default number of trailing bytes searched for a prompt.
pub const DEFAULT_SEARCH_DEPTH: usize = 1000;

/// Interactive shell channel with pattern-based reads.
pub struct PtyChannel {
    /// The underlying russh channel.
    channel: russh::Channel<Msg>,

    /// Accumulated output not yet consumed by a read.
    buffer: PatternBuffer,

    /// Cleared once the server sends EOF/close or the channel ends.
    open: bool,
}

impl PtyChannel {
    /// Wrap an opened shell channel.
    pub fn new(channel: russh::Channel<Msg>, search_depth: usize) -> Self {
        Self {
            channel,
            buffer: PatternBuffer::new(search_depth),
            open: true,
        }
    }

    /// Check if the channel is still open.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Discard buffered output and whatever keeps arriving until the device
    /// has been quiet for `quiet`, or until `limit` has passed.
    pub async fn drain(&mut self, quiet: Duration, limit: Duration) -> Result<()> {
        let deadline = Instant::now() + limit;
        self.buffer.clear();

        loop {
            let until = (Instant::now() + quiet).min(deadline);
            match tokio::time::timeout_at(until, self.channel.wait()).await {
                Err(_) => break,
                Ok(Some(ChannelMsg::Data { data } | ChannelMsg::ExtendedData { data, .. })) => {
                    trace!("discarded {} late bytes", data.len());
                    // still parsed, so a half-read escape sequence cannot leak
                    self.buffer.extend(&data);
                    self.buffer.clear();
                }
                Ok(Some(ChannelMsg::Eof | ChannelMsg::Close)) | Ok(None) => {
                    self.open = false;
                    return Err(ChannelError::Closed.into());
                }
                Ok(Some(_)) => {}
            }
        }

        Ok(())
    }

    /// Send a line of input followed by a newline.
    pub async fn send(&mut self, input: &str) -> Result<()> {
        if !self.open {
            return Err(ChannelError::Closed.into());
        }
        let line = format!("{input}\n");
        self.channel
            .data(line.as_bytes())
            .await
            .map_err(ChannelError::Ssh)?;
        Ok(())
    }

    /// Read until `pattern` matches the tail of the output.
    ///
    /// Returns everything up to and including the match; bytes after the
    /// match stay buffered for the next read.
    pub async fn read_until_pattern(&mut self, pattern: &Regex, timeout: Duration) -> Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(found) = self.buffer.find_in_tail(pattern) {
                return Ok(self.buffer.take_through(found.end));
            }

            if !self.open {
                return Err(ChannelError::Closed.into());
            }

            match tokio::time::timeout_at(deadline, self.channel.wait()).await {
                Err(_) => return Err(ChannelError::PatternTimeout(timeout).into()),
                Ok(Some(ChannelMsg::Data { data })) => {
                    trace!("read {} bytes", data.len());
                    self.buffer.extend(&data);
                }
                Ok(Some(ChannelMsg::ExtendedData { data, .. })) => {
                    self.buffer.extend(&data);
                }
                Ok(Some(ChannelMsg::Eof | ChannelMsg::Close)) | Ok(None) => {
                    self.open = false;
                }
                Ok(Some(_)) => {}
            }
        }
    }

    /// Signal EOF and close the channel.
    pub async fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            self.channel.eof().await.map_err(ChannelError::Ssh)?;
            self.channel.close().await.map_err(ChannelError::Ssh)?;
        }
        Ok(())
    }
}
