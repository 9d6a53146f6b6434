use thiserror::Error;

use crate::types::{AssignmentId, ConnectionId, StepId};

#[derive(Debug, Error)]
pub enum FlowError {
    // Lookup errors
    #[error("Assignment not found: {0}")]
    AssignmentNotFound(AssignmentId),

    #[error("Step not found: {0}")]
    StepNotFound(StepId),

    #[error("Reference step not found: {0}")]
    ReferenceNotFound(StepId),

    #[error("Connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    // Graph shape errors
    #[error("Invalid reference step {reference}: {reason}")]
    InvalidReference { reference: StepId, reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Ownership errors
    #[error("Actor {actor} is not authorized to modify assignment {assignment}")]
    NotAuthorized {
        actor: String,
        assignment: AssignmentId,
    },

    // Storage errors
    #[error("Persistence failure: {0}")]
    Persistence(String),

    // Breakdown errors
    #[error("Breakdown failed: {0}")]
    Breakdown(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Stable classification of a [`FlowError`], independent of its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InvalidReference,
    InvalidInput,
    NotAuthorized,
    Persistence,
    Breakdown,
    Config,
}

impl FlowError {
    pub fn invalid_reference(reference: StepId, reason: impl Into<String>) -> Self {
        Self::InvalidReference {
            reference,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AssignmentNotFound(_)
            | Self::StepNotFound(_)
            | Self::ReferenceNotFound(_)
            | Self::ConnectionNotFound(_) => ErrorKind::NotFound,
            Self::InvalidReference { .. } => ErrorKind::InvalidReference,
            Self::InvalidInput(_) | Self::Json(_) => ErrorKind::InvalidInput,
            Self::NotAuthorized { .. } => ErrorKind::NotAuthorized,
            Self::Persistence(_) | Self::Io(_) => ErrorKind::Persistence,
            Self::Breakdown(_) => ErrorKind::Breakdown,
            Self::Config(_) | Self::ConfigNotFound(_) => ErrorKind::Config,
        }
    }

    /// Short machine-readable code, e.g. for an HTTP layer's error body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AssignmentNotFound(_) => "assignment_not_found",
            Self::StepNotFound(_) => "step_not_found",
            Self::ReferenceNotFound(_) => "reference_not_found",
            Self::ConnectionNotFound(_) => "connection_not_found",
            Self::InvalidReference { .. } => "invalid_reference",
            Self::InvalidInput(_) => "invalid_input",
            Self::NotAuthorized { .. } => "not_authorized",
            Self::Persistence(_) => "persistence_failure",
            Self::Breakdown(_) => "breakdown_failed",
            Self::Config(_) => "config_error",
            Self::ConfigNotFound(_) => "config_not_found",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
        }
    }

    /// True for storage-level failures only.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Persistence)
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
