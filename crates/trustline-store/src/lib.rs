pub mod error;
pub mod memory;
pub mod queue;
pub mod traits;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use queue::WriteQueue;
pub use traits::Store;
