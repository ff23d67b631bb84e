//! Unified error type for Quay ledger operations
//!
//! Every ledger operation fails with exactly one of these variants and, when it
//! does, leaves no partial mutation behind.

use serde::{Deserialize, Serialize};

/// Unified error type for all Quay operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum QuayError {
    /// Channel, message or consumer group does not exist
    #[error("Not found: {message}")]
    NotFound {
        /// What was not found
        message: String,
    },

    /// Caller lacks the publisher, subscriber or lease-holder role
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Which role was missing
        message: String,
    },

    /// No eligible message inside the examined scan window
    #[error("Exhausted scan: {message}")]
    ExhaustedScan {
        /// Error message for the caller
        message: String,
    },

    /// Operation is not valid for the current lease or membership state
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Error message describing the conflicting state
        message: String,
    },

    /// Invalid argument or configuration
    #[error("Invalid: {message}")]
    Invalid {
        /// Error message describing the invalid input
        message: String,
    },

    /// Metered work exceeded the hard per-operation ceiling
    #[error("Budget exceeded: {message}")]
    BudgetExceeded {
        /// Error message describing the exhausted budget
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message describing the serialization failure
        message: String,
    },

    /// Internal system error
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal error
        message: String,
    },
}

impl QuayError {
    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create an unauthorized error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Create an exhausted scan error
    pub fn exhausted_scan(message: impl Into<String>) -> Self {
        Self::ExhaustedScan {
            message: message.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a budget exceeded error
    pub fn budget_exceeded(message: impl Into<String>) -> Self {
        Self::BudgetExceeded {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable, machine-readable name of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Unauthorized { .. } => "unauthorized",
            Self::ExhaustedScan { .. } => "exhausted_scan",
            Self::InvalidState { .. } => "invalid_state",
            Self::Invalid { .. } => "invalid",
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::Serialization { .. } => "serialization",
            Self::Internal { .. } => "internal",
        }
    }

    /// The bare message without the variant prefix
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound { message }
            | Self::Unauthorized { message }
            | Self::ExhaustedScan { message }
            | Self::InvalidState { message }
            | Self::Invalid { message }
            | Self::BudgetExceeded { message }
            | Self::Serialization { message }
            | Self::Internal { message } => message,
        }
    }
}

/// Standard Result type for Quay operations
pub type Result<T> = std::result::Result<T, QuayError>;

impl From<std::io::Error> for QuayError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(err.to_string()),
            _ => Self::internal(err.to_string()),
        }
    }
}

impl From<toml::de::Error> for QuayError {
    fn from(err: toml::de::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for QuayError {
    fn from(err: toml::ser::Error) -> Self {
        Self::serialization(err.to_string())
    }
}
