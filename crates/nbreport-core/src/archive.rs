// nbreport-core/src/archive.rs
// ============================================================================
// Module: Broken Report Archive
// Description: Preserves partial output documents from failed executions.
// Purpose: Copy broken reports into a per-user inspection area with correct
//          ownership, without overwriting earlier failures.
// Dependencies: nix, time, tokio, crate::identity
// ============================================================================

//! ## Overview
//! When a pipeline stage fails, the partially executed document is copied
//! into the acting user's broken report directory so they can open it and
//! inspect how far execution got. Archived names carry a current-date
//! prefix; a numeric suffix is appended when the name is already taken, so
//! repeated failures for the same template on the same day are all kept.
//! Archived files are never deleted by the service — retention is an
//! operator concern.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use nix::unistd::Gid;
use nix::unistd::Uid;
use thiserror::Error;
use time::OffsetDateTime;
use time::macros::format_description;

use crate::identity::ActingUser;
use crate::identity::OsAccount;
use crate::identity::substitute_username;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Marker between the date prefix and the original document name.
const BROKEN_MARKER: &str = "_broken_";
/// Bound on the numeric suffix probe for same-day name collisions.
const MAX_SUFFIX_ATTEMPTS: u32 = 1_000;

// ============================================================================
// SECTION: Archive
// ============================================================================

/// A preserved broken report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokenReportRecord {
    /// Path of the archived copy.
    pub path: PathBuf,
    /// Username owning the archived copy.
    pub owner: String,
    /// Archival timestamp.
    pub archived_at: OffsetDateTime,
}

/// Per-user archive for partial output documents of failed executions.
#[derive(Debug, Clone)]
pub struct BrokenReportArchive {
    /// Destination directory template (`USERNAME` substituted per request).
    dir_template: String,
}

impl BrokenReportArchive {
    /// Creates an archive rooted at the given directory template.
    #[must_use]
    pub const fn new(dir_template: String) -> Self {
        Self {
            dir_template,
        }
    }

    /// Archives a partial output document for the acting user.
    ///
    /// The destination directory is created on first use. Under
    /// impersonation the directory and the archived file are chowned to the
    /// acting account; in anonymous mode no ownership changes occur.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError`] when the copy, directory creation, or
    /// ownership change fails.
    pub async fn archive(
        &self,
        document: &Path,
        user: &ActingUser,
    ) -> Result<BrokenReportRecord, ArchiveError> {
        let directory = PathBuf::from(substitute_username(&self.dir_template, user.username()));
        if !directory.exists() {
            tokio::fs::create_dir_all(&directory)
                .await
                .map_err(|err| ArchiveError::Io(err.to_string()))?;
            if let Some(account) = user.account() {
                chown_to(&directory, account)?;
            }
        }
        let now = OffsetDateTime::now_utc();
        let destination = collision_free_name(&directory, document, now)?;
        tokio::fs::copy(document, &destination)
            .await
            .map_err(|err| ArchiveError::Io(err.to_string()))?;
        if let Some(account) = user.account() {
            chown_to(&destination, account)?;
        }
        Ok(BrokenReportRecord {
            path: destination,
            owner: user.username().to_string(),
            archived_at: now,
        })
    }
}

/// Picks a dated archive name, probing numeric suffixes on collision.
fn collision_free_name(
    directory: &Path,
    document: &Path,
    now: OffsetDateTime,
) -> Result<PathBuf, ArchiveError> {
    let date = now
        .format(format_description!("[year]-[month]-[day]"))
        .map_err(|err| ArchiveError::Io(err.to_string()))?;
    let original = document.file_name().map_or_else(
        || "report.ipynb".to_string(),
        |name| name.to_string_lossy().into_owned(),
    );
    let base = format!("{date}{BROKEN_MARKER}{original}");
    let first = directory.join(&base);
    if !first.exists() {
        return Ok(first);
    }
    let (stem, extension) = base.rsplit_once('.').unwrap_or((base.as_str(), ""));
    for attempt in 2..=MAX_SUFFIX_ATTEMPTS {
        let candidate = if extension.is_empty() {
            directory.join(format!("{stem}-{attempt}"))
        } else {
            directory.join(format!("{stem}-{attempt}.{extension}"))
        };
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(ArchiveError::Exhausted {
        name: base,
    })
}

/// Changes ownership of a path to the given account.
fn chown_to(path: &Path, account: &OsAccount) -> Result<(), ArchiveError> {
    nix::unistd::chown(
        path,
        Some(Uid::from_raw(account.uid)),
        Some(Gid::from_raw(account.gid)),
    )
    .map_err(|err| ArchiveError::Ownership {
        path: path.display().to_string(),
        detail: err.to_string(),
    })
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Broken report archival errors.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Filesystem error while archiving.
    #[error("archive io error: {0}")]
    Io(String),
    /// Ownership change failed.
    #[error("failed to change ownership of `{path}`: {detail}")]
    Ownership {
        /// Affected path.
        path: String,
        /// Failure detail.
        detail: String,
    },
    /// No collision-free archive name was available.
    #[error("no free archive name for `{name}`")]
    Exhausted {
        /// The contested base name.
        name: String,
    },
}
