// nbreport-core/src/identity.rs
// ============================================================================
// Module: Acting User Identity
// Description: OS account resolution for report impersonation.
// Purpose: Map authenticated usernames to uid/gid pairs, or the anonymous
//          sentinel when no authentication is configured.
// Dependencies: nix
// ============================================================================

//! ## Overview
//! The auth layer in front of the service hands over a username; this module
//! turns it into an [`ActingUser`]. Real accounts resolve to uid/gid through
//! the system user database so the pipeline can spawn engines under that
//! identity. The anonymous sentinel runs everything as the service itself
//! and skips ownership changes on archived reports.

// ============================================================================
// SECTION: Imports
// ============================================================================

use nix::unistd::User;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Sentinel username used when no authentication is configured.
pub const ANONYMOUS_USER: &str = "anonymous-report";
/// Placeholder replaced by the acting username in configured per-user paths.
pub const USERNAME_PLACEHOLDER: &str = "USERNAME";

// ============================================================================
// SECTION: Identity Types
// ============================================================================

/// Resolved OS account used for impersonated engine runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsAccount {
    /// Account name.
    pub name: String,
    /// Numeric user id.
    pub uid: u32,
    /// Numeric primary group id.
    pub gid: u32,
}

/// The user a request acts as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActingUser {
    /// No authentication configured; run as the service identity.
    Anonymous,
    /// Authenticated user backed by a real OS account.
    Account(OsAccount),
}

impl ActingUser {
    /// Resolves a username supplied by the auth layer.
    ///
    /// `None` and the anonymous sentinel both resolve to
    /// [`ActingUser::Anonymous`]; any other name must exist in the system
    /// user database.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] when the account lookup fails or the
    /// account does not exist.
    pub fn resolve(username: Option<&str>) -> Result<Self, IdentityError> {
        match username {
            None | Some(ANONYMOUS_USER) => Ok(Self::Anonymous),
            Some(name) => {
                let user = User::from_name(name)
                    .map_err(|err| IdentityError::Lookup {
                        name: name.to_string(),
                        detail: err.to_string(),
                    })?
                    .ok_or_else(|| IdentityError::UnknownAccount(name.to_string()))?;
                Ok(Self::Account(OsAccount {
                    name: name.to_string(),
                    uid: user.uid.as_raw(),
                    gid: user.gid.as_raw(),
                }))
            }
        }
    }

    /// Returns the username, or the anonymous sentinel.
    #[must_use]
    pub fn username(&self) -> &str {
        match self {
            Self::Anonymous => ANONYMOUS_USER,
            Self::Account(account) => &account.name,
        }
    }

    /// Returns the OS account when impersonation is in effect.
    #[must_use]
    pub const fn account(&self) -> Option<&OsAccount> {
        match self {
            Self::Anonymous => None,
            Self::Account(account) => Some(account),
        }
    }
}

/// Substitutes the `USERNAME` placeholder in a configured per-user path.
#[must_use]
pub fn substitute_username(template: &str, username: &str) -> String {
    template.replace(USERNAME_PLACEHOLDER, username)
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Acting user resolution errors.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The system user database lookup failed.
    #[error("failed to look up account `{name}`: {detail}")]
    Lookup {
        /// Requested account name.
        name: String,
        /// Lookup failure detail.
        detail: String,
    },
    /// The account does not exist.
    #[error("unknown OS account `{0}`")]
    UnknownAccount(String),
}
