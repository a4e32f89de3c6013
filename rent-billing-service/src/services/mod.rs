//! Business logic services.

pub mod database;
pub mod generation;
pub mod metrics;
pub mod summary;
