// Error types module

use serde::{Deserialize, Serialize};
use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;

/// Centralized error type for the watermarking pipeline
///
/// Per-item variants (`TransientIo`, `SizeConstraintExceeded`, `MalformedImage`)
/// are recorded to the failure ledger and never abort sibling items.
/// `Config` and `Internal` are orchestration failures surfaced to the caller.
#[derive(Debug, thiserror::Error)]
pub enum WatermarkError {
    /// Store fetch/upload or local filesystem failure
    #[error("I/O error during {operation}: {message}")]
    TransientIo { operation: String, message: String },

    /// The encoder could not get under the ceiling even at the lowest quality
    #[error("Encoded size {size} bytes exceeds ceiling of {ceiling} bytes at quality {quality}")]
    SizeConstraintExceeded {
        size: usize,
        ceiling: usize,
        quality: u8,
    },

    /// Source or overlay bytes could not be decoded
    #[error("Malformed image: {0}")]
    MalformedImage(String),

    /// A record that the operation depends on does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unexpected failure in orchestration code
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WatermarkError {
    pub fn io(operation: impl Into<String>, message: impl fmt::Display) -> Self {
        WatermarkError::TransientIo {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        WatermarkError::NotFound(what.into())
    }

    /// Classification used in ledger rows and metrics labels
    pub fn kind(&self) -> FailureKind {
        match self {
            WatermarkError::TransientIo { .. } => FailureKind::TransientIo,
            WatermarkError::SizeConstraintExceeded { .. } => FailureKind::SizeConstraintExceeded,
            WatermarkError::MalformedImage(_) => FailureKind::MalformedImage,
            WatermarkError::NotFound(_) => FailureKind::NotFound,
            WatermarkError::Config(_) | WatermarkError::Internal(_) => FailureKind::Internal,
        }
    }

    /// Store or filesystem step that failed, when known
    pub fn operation(&self) -> Option<&str> {
        match self {
            WatermarkError::TransientIo { operation, .. } => Some(operation.as_str()),
            _ => None,
        }
    }

    /// Build the structured payload persisted by the failure ledger
    pub fn reason(&self) -> FailureReason {
        FailureReason::from_error(self)
    }
}

impl From<image::ImageError> for WatermarkError {
    fn from(err: image::ImageError) -> Self {
        WatermarkError::MalformedImage(err.to_string())
    }
}

/// Failure category tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    TransientIo,
    SizeConstraintExceeded,
    MalformedImage,
    NotFound,
    Internal,
}

impl FailureKind {
    pub fn as_label(&self) -> &'static str {
        match self {
            FailureKind::TransientIo => "transient_io",
            FailureKind::SizeConstraintExceeded => "size_constraint_exceeded",
            FailureKind::MalformedImage => "malformed_image",
            FailureKind::NotFound => "not_found",
            FailureKind::Internal => "internal",
        }
    }
}

/// Structured failure payload written to ledger rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub message: String,
    /// Diagnostic text: kind, failing operation, debug rendering, the
    /// `source()` chain and a backtrace when `RUST_BACKTRACE` enables one
    pub context: String,
}

impl FailureReason {
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let watermark_err = err.downcast_ref::<WatermarkError>();
        let kind = watermark_err
            .map(WatermarkError::kind)
            .unwrap_or(FailureKind::Internal);

        let mut context = format!("kind: {}", kind.as_label());
        if let Some(operation) = watermark_err.and_then(WatermarkError::operation) {
            context.push_str("\noperation: ");
            context.push_str(operation);
        }
        context.push_str(&format!("\ndebug: {err:?}"));

        let mut source = err.source();
        while let Some(cause) = source {
            context.push_str("\ncaused by: ");
            context.push_str(&cause.to_string());
            source = cause.source();
        }

        let backtrace = Backtrace::capture();
        if backtrace.status() == BacktraceStatus::Captured {
            context.push_str(&format!("\nbacktrace:\n{backtrace}"));
        }

        Self {
            kind,
            message: err.to_string(),
            context,
        }
    }
}
