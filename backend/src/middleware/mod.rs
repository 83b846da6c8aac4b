//! Request middleware for the CraftCost backend

pub mod auth;

pub use auth::{auth_middleware, AuthUser, CurrentUser};
