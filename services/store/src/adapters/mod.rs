pub mod memory;
pub mod mongo;

pub use memory::MemoryAdapter;
pub use mongo::MongoAdapter;
