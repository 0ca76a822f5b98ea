//! Synthesis: mapping registry, rendering, per-target walks and emission.

pub mod cache;
pub mod composition;
pub mod emit;
pub mod pipeline;
pub mod registry;
pub mod render;
pub mod rule;
