// ABOUTME: Library module for pg-replica-orchestrator
// ABOUTME: Exports all core functionality for use in binary and tests

pub mod commands;
pub mod config;
pub mod error;
pub mod postgres;
pub mod replication;
pub mod topology;
pub mod utils;
