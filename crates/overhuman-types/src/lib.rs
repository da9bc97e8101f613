//! # overhuman-types
//!
//! Core type definitions for the overhuman assistant daemon.
//!
//! This crate is the foundation of the dependency graph -- all other
//! overhuman crates depend on it. It contains:
//!
//! - **[`error`]** -- [`OverhumanError`] taxonomy and the [`Result`] alias
//! - **[`input`]** -- [`input::NormalizedInput`], the canonical signal shape
//! - **[`memory`]** -- entry types for the memory and pattern substrate
//! - **[`result`]** -- [`result::RunResult`], the per-run outcome record
//! - **[`config`]** -- configuration schema and the on-disk state layout

pub mod config;
pub mod error;
pub mod input;
pub mod memory;
pub mod result;

pub use error::{OverhumanError, ProviderErrorKind, Result};
