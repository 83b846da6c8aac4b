//! Shared types and models for the CraftCost manufacturing cost-tracking platform
//!
//! This crate contains pure domain types shared between the backend service
//! and any other components of the system. It has no I/O dependencies.

pub mod costing;
pub mod models;
pub mod types;
pub mod validation;

pub use costing::*;
pub use models::*;
pub use types::*;
pub use validation::*;
