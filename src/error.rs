//! Error taxonomy shared by every coordination primitive.

use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, CoordinationError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinationError {
    /// The cycle guard refused a request that would close a circular wait.
    #[error("Admission refused: process {process} waiting on {resource} would deadlock")]
    AdmissionRefused { process: String, resource: String },

    #[error("Ownership violation: {caller} tried to unlock a mutex owned by {owner:?}")]
    OwnershipViolation {
        caller: String,
        owner: Option<String>,
    },

    /// Reported to the delivery observer, never returned to a submitter.
    #[error("Delivery exhausted for message {message_id} after {attempts} attempts")]
    DeliveryExhausted { message_id: Uuid, attempts: u32 },

    #[error("Capacity saturated: none of {workers} workers can take a task")]
    CapacitySaturated { workers: usize },

    #[error("Invalid capacity for {component}: must be greater than zero")]
    InvalidCapacity { component: &'static str },
}

impl CoordinationError {
    /// Whether the caller may simply try again later.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::AdmissionRefused { .. } | Self::CapacitySaturated { .. }
        )
    }
}

/// A single failed delivery attempt, produced by a delivery handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Delivery failed: {reason}")]
pub struct DeliveryError {
    pub reason: String,
}

impl DeliveryError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration error: {reason}")]
    Validation { reason: String },
}
