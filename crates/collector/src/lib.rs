//! Farmwatch collector service
//!
//! Receives sample batches from the sampler, evaluates alarms and serves
//! the dashboard endpoints.

pub mod api;
pub mod config;
