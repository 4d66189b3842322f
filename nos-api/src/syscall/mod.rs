//! System call interface definitions

pub mod types;

pub use types::*;
