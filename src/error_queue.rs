//! # Error Queue
//!
//! Diagnostic codes raised while interpreting commands are never returned to the
//! sender directly. They are appended to a bounded FIFO and read back one at a
//! time with `SYSTem:ERRor?`.

use std::collections::VecDeque;
use std::fmt;

use thiserror::Error;

/// Number of records the queue can hold, including the overflow marker.
pub const ERROR_QUEUE_CAPACITY: usize = 10;

/// Every diagnostic the interpreter can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ErrorCode {
    #[error("Invalid command")]
    InvalidCommand,
    #[error("Invalid parameter")]
    InvalidParameter,
    #[error("Missing parameter")]
    MissingParameter,
    #[error("Parameter out of range")]
    ParameterOutOfRange,
    #[error("Query only")]
    QueryOnly,
    #[error("Command only")]
    CommandOnly,
    #[error("Execution error")]
    ExecutionError,
    #[error("Error queue overflow")]
    QueueOverflow,
}

impl ErrorCode {
    /// The signed numeric code reported on the wire.
    pub fn code(self) -> i16 {
        match self {
            ErrorCode::InvalidCommand => -100,
            ErrorCode::InvalidParameter => -102,
            ErrorCode::MissingParameter => -103,
            ErrorCode::ParameterOutOfRange => -104,
            ErrorCode::QueryOnly => -105,
            ErrorCode::CommandOnly => -106,
            ErrorCode::ExecutionError => -200,
            ErrorCode::QueueOverflow => -350,
        }
    }
}

/// Looks up the static message for a wire code.
pub fn message_for(code: i16) -> &'static str {
    match code {
        0 => "No error",
        -100 => "Invalid command",
        -102 => "Invalid parameter",
        -103 => "Missing parameter",
        -104 => "Parameter out of range",
        -105 => "Query only",
        -106 => "Command only",
        -200 => "Execution error",
        -350 => "Error queue overflow",
        _ => "Unknown error",
    }
}

/// A code paired with its message, as returned by a queue read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorRecord {
    pub code: i16,
    pub message: &'static str,
}

impl ErrorRecord {
    /// The record reported when nothing is pending.
    pub const NO_ERROR: ErrorRecord = ErrorRecord {
        code: 0,
        message: "No error",
    };

    fn from_code(code: i16) -> Self {
        Self {
            code,
            message: message_for(code),
        }
    }
}

// Formats as `code,"message"`, the `SYSTem:ERRor?` reply.
impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},\"{}\"", self.code, self.message)
    }
}

/// Bounded FIFO of pending error codes.
///
/// When a push arrives while the queue is full, the newest entry is replaced
/// by [`ErrorCode::QueueOverflow`] and the incoming code is dropped. The
/// oldest entries are kept, and the length never exceeds
/// [`ERROR_QUEUE_CAPACITY`].
#[derive(Debug, Clone, Default)]
pub struct ErrorQueue {
    codes: VecDeque<i16>,
}

impl ErrorQueue {
    pub fn new() -> Self {
        Self {
            codes: VecDeque::with_capacity(ERROR_QUEUE_CAPACITY),
        }
    }

    pub fn push(&mut self, error: ErrorCode) {
        if self.codes.len() < ERROR_QUEUE_CAPACITY {
            self.codes.push_back(error.code());
            return;
        }
        if let Some(newest) = self.codes.back_mut() {
            if *newest != ErrorCode::QueueOverflow.code() {
                log::warn!("error queue full, dropping {} ({})", error.code(), error);
            }
            *newest = ErrorCode::QueueOverflow.code();
        }
    }

    /// Removes and returns the oldest record, or the no-error record when empty.
    pub fn pop(&mut self) -> ErrorRecord {
        self.codes
            .pop_front()
            .map(ErrorRecord::from_code)
            .unwrap_or(ErrorRecord::NO_ERROR)
    }

    pub fn clear(&mut self) {
        self.codes.clear();
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}
