// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Diagnostic logging for the OTA pipeline
//!
//! A lightweight, no_std circular log buffer. Update and boot code records
//! progress and failures here; a diagnostics collector drains the buffer
//! over whatever transport the platform provides.
//!
//! Image contents and key material must never be logged.

use core::fmt::{self, Write};
use heapless::{Deque, String};

use crate::errors::Error;

/// Maximum log message length
pub const MAX_LOG_MESSAGE_LEN: usize = 96;

/// Log buffer capacity (number of entries)
pub const LOG_BUFFER_SIZE: usize = 32;

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LogLevel {
    /// Errors that require immediate attention
    Error = 0,
    /// Warnings about potential issues
    Warn = 1,
    /// Informational messages
    Info = 2,
    /// Debug messages (development only)
    Debug = 3,
}

impl LogLevel {
    /// Get the log level name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
        }
    }

    /// Get a short prefix for the log level
    #[must_use]
    pub const fn prefix(&self) -> char {
        match self {
            Self::Error => 'E',
            Self::Warn => 'W',
            Self::Info => 'I',
            Self::Debug => 'D',
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Log entry structure
#[derive(Clone)]
pub struct LogEntry {
    /// Log level
    pub level: LogLevel,
    /// Timestamp (system ticks or Unix seconds)
    pub timestamp: u32,
    /// Originating component ("delta", "verify", "slots", ...)
    pub component: &'static str,
    /// Log message
    pub message: String<MAX_LOG_MESSAGE_LEN>,
}

impl LogEntry {
    /// Create a new log entry, truncating over-long messages
    #[must_use]
    pub fn new(level: LogLevel, timestamp: u32, component: &'static str, message: &str) -> Self {
        let mut msg = String::new();
        let _ = msg.push_str(&message[..message.len().min(MAX_LOG_MESSAGE_LEN)]);

        Self {
            level,
            timestamp,
            component,
            message: msg,
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:08X}] {} [{}] {}",
            self.timestamp,
            self.level.prefix(),
            self.component,
            self.message
        )
    }
}

impl fmt::Debug for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Circular log buffer
///
/// Once full, recording a new entry evicts the oldest one.
pub struct LogBuffer {
    entries: Deque<LogEntry, LOG_BUFFER_SIZE>,
    min_level: LogLevel,
}

impl LogBuffer {
    /// Create a new empty log buffer
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Deque::new(),
            min_level: LogLevel::Info,
        }
    }

    /// Set the minimum log level
    pub fn set_min_level(&mut self, level: LogLevel) {
        self.min_level = level;
    }

    /// Get the minimum log level
    #[must_use]
    pub const fn min_level(&self) -> LogLevel {
        self.min_level
    }

    /// Check if a log level should be recorded
    #[must_use]
    pub const fn should_log(&self, level: LogLevel) -> bool {
        (level as u8) <= (self.min_level as u8)
    }

    /// Write a log entry, evicting the oldest on overflow
    pub fn write(&mut self, entry: LogEntry) {
        if !self.should_log(entry.level) {
            return;
        }
        if self.entries.is_full() {
            self.entries.pop_front();
        }
        // Cannot fail: a slot was just freed if the deque was full
        let _ = self.entries.push_back(entry);
    }

    /// Log with format arguments
    pub fn log(
        &mut self,
        level: LogLevel,
        timestamp: u32,
        component: &'static str,
        args: fmt::Arguments<'_>,
    ) {
        if !self.should_log(level) {
            return;
        }

        let mut message = String::<MAX_LOG_MESSAGE_LEN>::new();
        let _ = message.write_fmt(args);

        self.write(LogEntry {
            level,
            timestamp,
            component,
            message,
        });
    }

    /// Record a pipeline error with its code
    pub fn record_error(&mut self, timestamp: u32, component: &'static str, error: Error) {
        self.log(
            LogLevel::Error,
            timestamp,
            component,
            format_args!("{error}"),
        );
    }

    /// Get the number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if buffer is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clear all entries
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterate over entries (oldest first)
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Log an error message
#[macro_export]
macro_rules! log_error {
    ($buffer:expr, $ts:expr, $component:expr, $($arg:tt)*) => {
        $buffer.log($crate::log::LogLevel::Error, $ts, $component, format_args!($($arg)*))
    };
}

/// Log a warning message
#[macro_export]
macro_rules! log_warn {
    ($buffer:expr, $ts:expr, $component:expr, $($arg:tt)*) => {
        $buffer.log($crate::log::LogLevel::Warn, $ts, $component, format_args!($($arg)*))
    };
}

/// Log an informational message
#[macro_export]
macro_rules! log_info {
    ($buffer:expr, $ts:expr, $component:expr, $($arg:tt)*) => {
        $buffer.log($crate::log::LogLevel::Info, $ts, $component, format_args!($($arg)*))
    };
}

/// Log a debug message
#[macro_export]
macro_rules! log_debug {
    ($buffer:expr, $ts:expr, $component:expr, $($arg:tt)*) => {
        $buffer.log($crate::log::LogLevel::Debug, $ts, $component, format_args!($($arg)*))
    };
}
