//! # Value Objects
//!
//! Immutable value types with no identity of their own.

mod direct_pair;

pub use direct_pair::DirectPair;
