// nbreport-core/src/sync.rs
// ============================================================================
// Module: Repository Synchronizer
// Description: Keeps the shared template working copy at the remote tip.
// Purpose: Serialize git synchronization and hide the working copy path.
// Dependencies: tokio, crate::command
// ============================================================================

//! ## Overview
//! The template working copy is the only state shared across requests.
//! [`RepositorySynchronizer`] owns it: callers ask for a sync before every
//! catalog or execution request and read templates through
//! [`RepositorySynchronizer::template_dir`]. Local modifications — including
//! stray files written into the tree by a broken execution — are discarded
//! on every sync so the working copy always mirrors the remote tip. All git
//! steps run under a per-synchronizer async lock, so concurrent requests
//! serialize their syncs instead of interleaving git commands.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;
use tokio::sync::Mutex;

use crate::command::CommandError;
use crate::command::CommandSpec;
use crate::command::run_command;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Branch tracked in the template repository.
const DEFAULT_BRANCH: &str = "master";

// ============================================================================
// SECTION: Synchronizer
// ============================================================================

/// Synchronizes the local template working copy with its remote.
#[derive(Debug)]
pub struct RepositorySynchronizer {
    /// Working copy root directory.
    root: PathBuf,
    /// Template directory relative to the root.
    relative_dir: PathBuf,
    /// Optional git remote URL (credentials already injected).
    remote: Option<String>,
    /// Serializes sync operations against this working copy.
    lock: Mutex<()>,
}

impl RepositorySynchronizer {
    /// Creates a synchronizer for the given working copy.
    #[must_use]
    pub const fn new(root: PathBuf, relative_dir: PathBuf, remote: Option<String>) -> Self {
        Self {
            root,
            relative_dir,
            remote,
            lock: Mutex::const_new(()),
        }
    }

    /// Returns the resolved template directory inside the working copy.
    #[must_use]
    pub fn template_dir(&self) -> PathBuf {
        self.root.join(&self.relative_dir)
    }

    /// Ensures the working copy exists and matches the remote tip.
    ///
    /// Without a remote the local tree is authoritative and only the
    /// directory layout is created. With a remote, local modifications are
    /// discarded (checkout of tracked files, removal of untracked files),
    /// the default branch is checked out, and the remote tip is pulled.
    /// The call is idempotent and safe to issue before every request.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] when directory creation or a git command fails.
    pub async fn sync(&self) -> Result<(), SyncError> {
        let _guard = self.lock.lock().await;
        if !self.root.exists() {
            self.create_working_copy().await?;
        }
        if let Some(remote) = &self.remote {
            self.update_working_copy(remote).await?;
        }
        Ok(())
    }

    /// Creates the working copy: a clone when a remote is set, otherwise an
    /// empty template directory.
    async fn create_working_copy(&self) -> Result<(), SyncError> {
        if let Some(parent) = self.root.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| SyncError::Io(err.to_string()))?;
        }
        match &self.remote {
            Some(remote) => {
                let parent = self.root.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
                let root = self.root.to_string_lossy();
                self.git(&["clone", remote, root.as_ref()], &parent).await?;
            }
            None => {
                // With `relative_dir` of "." the template dir is `<root>/.`,
                // which create_dir_all rejects while `<root>` is absent.
                tokio::fs::create_dir_all(&self.root)
                    .await
                    .map_err(|err| SyncError::Io(err.to_string()))?;
                tokio::fs::create_dir_all(self.template_dir())
                    .await
                    .map_err(|err| SyncError::Io(err.to_string()))?;
            }
        }
        Ok(())
    }

    /// Discards local modifications and pulls the remote default branch.
    async fn update_working_copy(&self, remote: &str) -> Result<(), SyncError> {
        self.git(&["checkout", "--", "*"], &self.root).await?;
        self.git(&["clean", "-fdq"], &self.root).await?;
        self.git(&["checkout", DEFAULT_BRANCH], &self.root).await?;
        self.git(&["pull", remote, DEFAULT_BRANCH], &self.root).await?;
        Ok(())
    }

    /// Runs one git command inside the given directory.
    async fn git(&self, args: &[&str], cwd: &Path) -> Result<(), SyncError> {
        let mut argv = vec!["git".to_string()];
        argv.extend(args.iter().map(ToString::to_string));
        run_command(CommandSpec::new(argv).cwd(cwd.to_path_buf())).await?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Repository synchronization errors.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A git command failed; carries the command, status, and stderr.
    #[error("git synchronization failed: {0}")]
    Git(#[from] CommandError),
    /// Filesystem error while preparing the working copy.
    #[error("working copy io error: {0}")]
    Io(String),
}
