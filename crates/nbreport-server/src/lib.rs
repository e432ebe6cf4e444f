// nbreport-server/src/lib.rs
// ============================================================================
// Module: nbreport Server Library
// Description: HTTP surface for the notebook report service.
// Purpose: Expose the router, application state, and page rendering.
// Dependencies: crate::{render, server}
// ============================================================================

//! ## Overview
//! The server crate is thin glue: it builds the execution pipeline and the
//! repository synchronizer from validated configuration, wires them into an
//! axum router, and renders the picker and error pages. All report
//! semantics live in `nbreport-core`; all configuration semantics live in
//! `nbreport-config`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod render;
pub mod server;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use server::AppState;
pub use server::ServerError;
pub use server::router;
pub use server::serve;
