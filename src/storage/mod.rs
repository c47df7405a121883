//! Storage engine: the on-disk layout and its access discipline.

pub mod fs;
pub mod store;

pub use fs::FsStore;
pub use store::{BodyStream, ObjectReader, ObjectStore, StorageError};
