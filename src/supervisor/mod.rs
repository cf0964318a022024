//! Supervisor module: lifecycle, roster, and run management.

mod registry;
mod roster;
mod runner;
mod state;

pub use registry::*;
pub use roster::*;
pub use runner::*;
pub use state::*;
