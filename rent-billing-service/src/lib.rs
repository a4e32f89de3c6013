//! Rent billing service: invoice lifecycle, recurring generation, bulk
//! transitions, and summary reporting for property management orgs.

pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;
