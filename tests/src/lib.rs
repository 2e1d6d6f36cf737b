//! # IPC Bridge Test Suite
//!
//! Cross-crate tests that need more than one endpoint.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── support.rs     # Hand-driven transport for reordering replies
//!     ├── flows.rs       # Hub ↔ spoke flows over LocalBus
//!     └── cross_talk.rs  # Property tests: every caller gets its own reply
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p bridge-tests
//!
//! # By category
//! cargo test -p bridge-tests integration::flows::
//! cargo test -p bridge-tests integration::cross_talk::
//! ```

pub mod integration;
