//! Persistence collaborator: the storage trait, its errors, and the
//! in-process reference backend.

mod error;
mod memory;
mod traits;

pub use error::StoreError;
pub use memory::{MemorySnapshot, MemoryStore};
pub use traits::TransitionStore;

pub(crate) use memory::Tables;
