//! # Sphere Test Suite
//!
//! End-to-end flows between processes sharing one broker.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── flows.rs        # Export, announce, discover, call
//!     └── choreography.rs # Driver and hub processes talking over the mesh
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p sphere-tests
//! cargo test -p sphere-tests integration::choreography
//! ```

#![allow(dead_code)]

pub mod integration;
