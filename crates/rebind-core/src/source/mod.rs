//! Built-in data sources.

mod memory;

pub use memory::MemorySource;
