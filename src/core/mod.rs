//! Core model: workload intent, resource graph and verification plan.

pub mod builder;
pub mod error;
pub mod graph;
pub mod loader;
pub mod settings;
pub mod types;
pub mod verify;
