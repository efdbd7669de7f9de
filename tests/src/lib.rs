//! # OCPP Networking Node Test Suite
//!
//! Cross-crate flows that exercise the signature policy engine, the
//! forwarding pipeline and the node runtime together.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── signed_forwarding.rs  # sign at the station, verify and forward at the node
//!     └── node_flows.rs         # configuration-driven node, NDJSON runtime
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p nn-tests
//! cargo test -p nn-tests integration::node_flows::
//! ```

pub mod integration;
