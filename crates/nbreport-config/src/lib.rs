// nbreport-config/src/lib.rs
// ============================================================================
// Module: nbreport Config Library
// Description: Canonical config model and validation for the report service.
// Purpose: Single source of truth for nbreport.toml semantics.
// Dependencies: nbreport-core, serde, toml, url
// ============================================================================

//! ## Overview
//! `nbreport-config` defines the canonical configuration model for the
//! notebook report service. It provides strict, fail-closed validation of the
//! template repository layout, per-user report directories, and the external
//! engine commands run by the execution pipeline.
//!
//! Security posture: config inputs are untrusted; every section is validated
//! before use.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
