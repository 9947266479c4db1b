//! Shared test utilities for studiosync integration tests.
//!
//! This module provides:
//! - `TestHarness`: a temporary on-disk database with registry and store handles
//! - Page builders for the fixture browser
//! - Scripted stand-ins for the scraper and the studio source

pub mod builders;
pub mod fakes;
pub mod harness;

pub use builders::*;
pub use fakes::*;
pub use harness::TestHarness;
