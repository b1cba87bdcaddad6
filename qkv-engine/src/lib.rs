pub mod engine;
pub mod memory;

pub use engine::KvEngine;
pub use memory::MemoryEngine;
