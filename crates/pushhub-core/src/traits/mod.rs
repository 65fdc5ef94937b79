//! Core traits defined in `pushhub-core` and implemented by other crates.

pub mod cache;

pub use cache::CacheProvider;
