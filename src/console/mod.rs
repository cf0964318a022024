//! Console pipeline: process spawning, line framing, and event extraction.

mod events;
mod framer;
mod process;

pub use events::*;
pub use framer::*;
pub use process::*;
