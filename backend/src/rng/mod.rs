//! Deterministic random number generation
//!
//! Uses xorshift64* for the per-unit generators and SHA-256 for deriving
//! independent seeds from (run seed, condition, replicate, stream).
//! CRITICAL: All randomness in the engine MUST go through this module.
//! Nothing reads from an unseeded global source.

mod seed;
mod xorshift;

pub use seed::{derive_seed, split_seed, SeedStream};
pub use xorshift::RngManager;
