//! Reproducibility state: BLAKE3 hashing and the append-only lockfile.

pub mod hasher;
pub mod lockfile;
