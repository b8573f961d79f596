//! API route handlers

pub mod agents;
pub mod error;
pub mod inventory;
pub mod queue;
pub mod resources;
pub mod system;

pub use error::{ApiError, AppError};
