// # Property Store Implementations
//
// Builtin implementations of the PropertyStore trait, plus the ordered
// fallback chain the polled monitor queries.

pub mod chained;
pub mod file;
pub mod memory;

pub use chained::ChainedPropertyStore;
pub use file::{FilePropertyStore, FilePropertyStoreFactory};
pub use memory::{MemoryPropertyStore, MemoryPropertyStoreFactory};
