//! NebulaForge: multi-cloud infrastructure synthesis.
//!
//! One provider-agnostic workload document in; one Terraform module tree per
//! target provider out, plus a Crossplane composition spanning them. Runs are
//! deterministic and recorded in an append-only lockfile so unchanged inputs
//! are served from cache.
//!
//! Flow: [`core::loader`] → [`core::builder`] → [`synth::pipeline`] (consulting
//! [`synth::registry`]) → [`synth::emit`] + [`lock::lockfile`]. The verification
//! plan ([`core::verify`]) is derived from the same graph independently.

pub mod cli;
pub mod core;
pub mod lock;
pub mod synth;
