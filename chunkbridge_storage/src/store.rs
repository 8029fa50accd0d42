//! Built-in drivers.

mod memory_driver;

pub use memory_driver::MemoryDriver;
