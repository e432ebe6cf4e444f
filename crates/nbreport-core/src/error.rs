// nbreport-core/src/error.rs
// ============================================================================
// Module: Error Taxonomy and Reporter
// Description: Uniform failure classification and outward descriptors.
// Purpose: Normalize every pipeline fault into one canonical shape consumed
//          by both HTML and JSON callers.
// Dependencies: serde, serde_json, crate::{archive, catalog, command,
//               identity, sync}
// ============================================================================

//! ## Overview
//! Everything that can go wrong between a request and its rendered report is
//! a [`ReportError`]: sync failures, missing templates, failed or timed-out
//! engine stages, archival problems, and the unexpected rest. A single
//! [`ReportError::describe`] normalization produces the
//! [`ErrorDescriptor`] both the HTML error page and the JSON error body are
//! rendered from — callers choose the rendering, never the shape.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::archive::ArchiveError;
use crate::catalog::CatalogError;
use crate::command::CommandError;
use crate::identity::IdentityError;
use crate::sync::SyncError;

// ============================================================================
// SECTION: Error Taxonomy
// ============================================================================

/// Every failure the report core surfaces to its callers.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Repository synchronization failed.
    #[error(transparent)]
    Sync(#[from] SyncError),
    /// Template catalog walk failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    /// The resolved template path does not exist.
    #[error("template file `{}` does not exist", .0.display())]
    TemplateNotFound(PathBuf),
    /// The template execution stage failed.
    #[error("failed to execute report: {source}")]
    Execution {
        /// Underlying process failure.
        source: CommandError,
        /// Archived partial document, when one existed.
        archived: Option<PathBuf>,
    },
    /// The HTML conversion stage failed.
    #[error("failed to render report as HTML: {source}")]
    Conversion {
        /// Underlying process failure.
        source: CommandError,
        /// Archived partial document, when one existed.
        archived: Option<PathBuf>,
    },
    /// Broken report archival failed.
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    /// Acting user resolution failed.
    #[error(transparent)]
    Identity(#[from] IdentityError),
    /// Any other fault.
    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl ReportError {
    /// Returns the HTTP status code for this failure.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::TemplateNotFound(_) => 404,
            _ => 500,
        }
    }

    /// Returns the archived broken report path, when one was preserved.
    #[must_use]
    pub const fn archived(&self) -> Option<&PathBuf> {
        match self {
            Self::Execution {
                archived, ..
            }
            | Self::Conversion {
                archived, ..
            } => archived.as_ref(),
            _ => None,
        }
    }

    /// Normalizes this failure into the canonical outward descriptor.
    #[must_use]
    pub fn describe(&self) -> ErrorDescriptor {
        let status_code = self.status_code();
        let status_text = if status_code == 404 { "Not Found" } else { "Internal Server Error" };
        ErrorDescriptor {
            status_code,
            status_text,
            message: self.to_string(),
            detail: self.detail(),
        }
    }

    /// Builds the machine-readable detail payload.
    fn detail(&self) -> Value {
        let command_detail = |source: &CommandError| match source {
            CommandError::Failed {
                command,
                code,
                stderr,
            } => json!({
                "code": code,
                "command": command,
                "error": stderr,
            }),
            CommandError::TimedOut {
                command,
                timeout,
            } => json!({
                "command": command,
                "timeout_secs": timeout.as_secs(),
                "error": "stage timed out",
            }),
            other => json!({ "error": other.to_string() }),
        };
        match self {
            Self::Sync(SyncError::Git(source))
            | Self::Execution {
                source, ..
            }
            | Self::Conversion {
                source, ..
            } => {
                let mut detail = command_detail(source);
                if let (Some(object), Some(archived)) = (detail.as_object_mut(), self.archived()) {
                    object.insert(
                        "broken_report".to_string(),
                        Value::String(archived.display().to_string()),
                    );
                }
                detail
            }
            other => json!({ "error": other.to_string() }),
        }
    }
}

// ============================================================================
// SECTION: Error Descriptor
// ============================================================================

/// Canonical outward-facing error description.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorDescriptor {
    /// HTTP status code the caller should use.
    pub status_code: u16,
    /// Status line text matching the code.
    pub status_text: &'static str,
    /// Human-readable message.
    pub message: String,
    /// Machine-readable detail payload.
    pub detail: Value,
}
