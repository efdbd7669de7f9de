//! # Domain Layer
//!
//! Pure cryptographic and policy logic with no I/O dependencies.

pub mod canonical;
pub mod ecdsa;
pub mod entities;
pub mod errors;
pub mod keys;
pub mod message;
pub mod rules;
