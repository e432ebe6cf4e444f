// nbreport-core/src/lib.rs
// ============================================================================
// Module: nbreport Core Library
// Description: Public API surface for the notebook report core.
// Purpose: Expose sync, catalog, coercion, pipeline, and archive modules.
// Dependencies: crate::{archive, catalog, command, error, identity, literal,
//               params, pipeline, sync}
// ============================================================================

//! ## Overview
//! nbreport core keeps a shared template working copy synchronized with its
//! git remote, discovers runnable notebook templates and their declared
//! parameters, coerces untrusted request parameters into typed values, and
//! runs the two external engine stages (parameterized execution, HTML
//! conversion) under the acting user's OS identity. Failed runs preserve the
//! partial output document in a per-user broken report archive.
//!
//! Security posture: request parameters and template contents are untrusted;
//! parameters only ever reach the engines through a request-scoped
//! parameters file, never through argv splicing.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod archive;
pub mod catalog;
pub mod command;
pub mod error;
pub mod identity;
pub mod literal;
pub mod params;
pub mod pipeline;
pub mod sync;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use archive::ArchiveError;
pub use archive::BrokenReportArchive;
pub use archive::BrokenReportRecord;
pub use catalog::CatalogError;
pub use catalog::ParameterSpec;
pub use catalog::TemplateDescriptor;
pub use catalog::list_templates;
pub use command::CommandError;
pub use command::CommandOutput;
pub use command::CommandSpec;
pub use command::run_command;
pub use error::ErrorDescriptor;
pub use error::ReportError;
pub use identity::ANONYMOUS_USER;
pub use identity::ActingUser;
pub use identity::IdentityError;
pub use identity::OsAccount;
pub use identity::substitute_username;
pub use literal::LiteralError;
pub use literal::literal_type_name;
pub use literal::parse_literal;
pub use params::coerce_parameters;
pub use params::write_parameters_file;
pub use pipeline::ExecutionRequest;
pub use pipeline::RenderedReport;
pub use pipeline::ReportPipeline;
pub use sync::RepositorySynchronizer;
pub use sync::SyncError;
