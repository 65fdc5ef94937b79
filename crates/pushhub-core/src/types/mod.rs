//! Core type definitions used across the PushHub workspace.

pub mod id;

pub use id::*;
