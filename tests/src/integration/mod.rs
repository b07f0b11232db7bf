//! Cross-crate integration tests.

pub mod choreography;
pub mod flows;
