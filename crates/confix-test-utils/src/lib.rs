//! Shared test utilities for the confix workspace.
//!
//! This crate provides standardised fixtures so crate test suites do not
//! each rebuild scratch targets by hand. It is a dev-dependency only, never
//! published.
//!
//! # Modules
//!
//! - [`target`]: [`TestTarget`] builder for a scratch target plus change log
//! - [`fixtures`]: sample configuration contents per grammar

pub mod fixtures;
pub mod target;

pub use target::TestTarget;
