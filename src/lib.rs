//! Scans data broker sites for a user's records and drives opt-out
//! requests on each broker's schedule.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod registry;
pub mod report;
pub mod runner;
pub mod runtime;
