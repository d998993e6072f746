//! Trait definitions for typed entity access.

mod get;

pub use get::Get;
