pub mod client;
pub mod memory;

pub use client::{CacheClient, CacheError};
pub use memory::MemoryCache;
