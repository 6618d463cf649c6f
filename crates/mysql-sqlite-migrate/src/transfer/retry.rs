//! Reconnect-once policy for transient source failures.

use crate::error::MigrateError;

/// What to do after an operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Reconnect the source and redo the same operation.
    Reconnect,
    /// Surface the error.
    GiveUp,
}

/// Bounded reconnect budget for one operation (a table create or a table
/// transfer). Only [`MigrateError::ConnectionLost`] consumes the budget;
/// every other error is fatal immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_reconnects: u32,
    used: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(1)
    }
}

impl RetryPolicy {
    pub fn new(max_reconnects: u32) -> Self {
        Self {
            max_reconnects,
            used: 0,
        }
    }

    /// Classify `err` and spend one reconnect if it is retryable.
    pub fn decide(&mut self, err: &MigrateError) -> RetryDecision {
        if !err.is_connection_lost() || self.used >= self.max_reconnects {
            return RetryDecision::GiveUp;
        }
        self.used += 1;
        RetryDecision::Reconnect
    }

    /// Reconnects spent so far.
    pub fn reconnects(&self) -> u32 {
        self.used
    }
}
