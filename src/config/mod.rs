//! Configuration loading for the warden.

mod loader;

pub use loader::*;
