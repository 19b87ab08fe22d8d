//! MIG partitioner service
//!
//! Stateless HTTP front-end to the partitioning planner.

pub mod api;
pub mod config;
