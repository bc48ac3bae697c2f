//! Cross-data-store reference resolution.
//!
//! Associations whose target lives in another data store cannot be joined.
//! The owner keeps the target's id in a related scalar property; after the
//! owners are loaded, [`CrossStoreLoader`] batch-loads the targets from
//! their store and sets the associations directly.

mod loader;
mod property;
mod source;

pub use loader::{CrossStoreLoader, ReferenceSource};
pub use property::{collect_cross_store_properties, CrossStoreProperty};
pub use source::StoreReferenceSource;
