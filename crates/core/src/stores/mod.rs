pub mod memory;
pub mod qdrant;

pub use memory::LocalIndex;
pub use qdrant::QdrantStore;
