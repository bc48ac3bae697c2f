//! # EntiModel Testkit
//!
//! Test utilities for EntiModel.
//!
//! This crate provides:
//! - A pet clinic fixture spread over two data stores
//! - A recording data store for counting and failing store calls
//! - Property-based test generators using proptest
//! - Tracing setup for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use entimodel_testkit::prelude::*;
//!
//! #[test]
//! fn loads_pets() {
//!     let clinic = PetClinic::seeded(3);
//!     let pets = clinic.manager.load(&LoadContext::new("Pet"), &admin()).unwrap();
//!     assert_eq!(pets.len(), 3);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod recording;

mod logging;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_tracing;
    pub use crate::recording::*;
}

pub use fixtures::*;
pub use generators::*;
pub use logging::init_tracing;
pub use recording::*;
