//! # Domain Layer
//!
//! Decisions, inbound requests and configuration. No I/O.

pub mod config;
pub mod decision;
pub mod errors;
pub mod request;
