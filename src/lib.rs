//! Server Warden - game server daemon supervision.

pub mod catalog;
pub mod config;
pub mod console;
pub mod display;
pub mod supervisor;
