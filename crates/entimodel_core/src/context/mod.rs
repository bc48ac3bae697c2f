//! Load and save requests.
//!
//! Contexts are inert data: they perform no I/O and are consumed by the
//! [`DataManager`](crate::DataManager).

mod load;
mod save;

pub use load::LoadContext;
pub use save::{SaveContext, SaveResult};
