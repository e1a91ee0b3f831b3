//! Shared types and configuration for Cistern.
//!
//! This crate carries the pieces every other crate needs:
//! - Application configuration (`config`)
//! - Tariff model returned by the billing collaborator (`tariff`)
//! - Access modes and request identity roles (`access`)

pub mod access;
pub mod config;
pub mod tariff;

pub use access::{AccessMode, Role};
pub use config::AppConfig;
pub use tariff::{NamespaceTariff, VolumeTariff};
