// crates/survey-deploy-config/src/lib.rs
// ============================================================================
// Module: Survey Deploy Config Library
// Description: Canonical config model and validation.
// Purpose: Single source of truth for survey-deploy.toml semantics.
// Dependencies: survey-deploy-core, survey-deploy-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `survey-deploy-config` defines the configuration model for the
//! deployment document store: which row store backs it, how the principal
//! detail backfill runs, and where audit events go. Validation is strict and
//! fails closed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
