//! Cryptographic adapters.

pub mod hash;

pub use hash::HmacRequestHasher;
