//! Channel layer for pattern matching and PTY operations.
//!
//! This module handles the interactive shell, including prompt detection
//! and ANSI stripping.

mod buffer;
mod pty;

pub use buffer::PatternBuffer;
pub use pty::{DEFAULT_SEARCH_DEPTH, PtyChannel};
