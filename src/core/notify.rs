//! Transient user notifications.

use std::fmt;

/// How a notification should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Neutral progress, e.g. a reload finished
    Info,
    /// A user action was applied
    Success,
    /// Something failed and may need a retry
    Error,
}

/// A single transient message for the user; consumers dismiss it themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Text shown to the user
    pub message: String,
    pub severity: Severity,
}

impl Notification {
    /// Creates an [`Severity::Info`] notification.
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Info,
        }
    }

    /// Creates a [`Severity::Success`] notification.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Success,
        }
    }

    /// Creates a [`Severity::Error`] notification.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Error,
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            Severity::Info => "info",
            Severity::Success => "ok",
            Severity::Error => "error",
        };
        write!(f, "[{tag}] {}", self.message)
    }
}
