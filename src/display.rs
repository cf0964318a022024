//! Colored CLI display for supervised console output.
//!
//! Renders console lines and supervisor events for the `run` subcommand.

use std::io::{self, Write};

use chrono::Utc;
use owo_colors::OwoColorize;

use crate::console::Channel;
use crate::supervisor::LifecycleStatus;

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Print one console line from the child.
///
/// Error-channel lines are tagged and colored so they stand out from
/// regular server chatter.
pub fn print_line(channel: Channel, text: &str) {
    match channel {
        Channel::Stdout => println!("{} {text}", timestamp().dimmed()),
        Channel::Stderr => println!(
            "{} {} {}",
            timestamp().dimmed(),
            "[stderr]".red().bold(),
            text.red()
        ),
    }
    let _ = io::stdout().flush();
}

/// Print a lifecycle status change.
pub fn print_status(instance: &str, old: LifecycleStatus, new: LifecycleStatus) {
    let rendered = match new {
        LifecycleStatus::Running => new.to_string().green().bold().to_string(),
        LifecycleStatus::Crashed => new.to_string().red().bold().to_string(),
        LifecycleStatus::Starting => new.to_string().yellow().bold().to_string(),
        LifecycleStatus::Stopped => new.to_string().dimmed().to_string(),
    };
    println!(
        "{} {} {} {old} -> {rendered}",
        timestamp().dimmed(),
        "[STATUS]".blue().bold(),
        instance.cyan()
    );
    let _ = io::stdout().flush();
}

/// Print a roster change.
pub fn print_roster(instance: &str, joined: Option<&str>, left: Option<&str>) {
    if let Some(name) = joined {
        println!(
            "{} {} {} {} joined",
            timestamp().dimmed(),
            "[PLAYERS]".magenta().bold(),
            instance.cyan(),
            name.green()
        );
    }
    if let Some(name) = left {
        println!(
            "{} {} {} {} left",
            timestamp().dimmed(),
            "[PLAYERS]".magenta().bold(),
            instance.cyan(),
            name.yellow()
        );
    }
    let _ = io::stdout().flush();
}

/// Print an error message.
pub fn print_error(message: &str) {
    println!("{} {}", "[ERROR]".red().bold(), message);
    let _ = io::stdout().flush();
}
