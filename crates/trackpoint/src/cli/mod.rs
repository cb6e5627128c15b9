//! Command-line interface for trackpoint.
//!
//! This module provides the CLI structure for the `trackpoint` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, EventsCommand, OutputFormat, RealtimeCommand, SendCommand, ServeCommand,
    StatsCommand, StatusCommand,
};

use crate::logging::Verbosity;

/// trackpoint - Product analytics collection
///
/// Runs the event collector, inspects stored events and aggregates, and sends
/// test events through the tracking client.
#[derive(Debug, Parser)]
#[command(name = "trackpoint")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP collector
    Serve(ServeCommand),

    /// List stored events
    Events(EventsCommand),

    /// Show event, page and device aggregates
    Stats(StatsCommand),

    /// Show active sessions and users
    Realtime(RealtimeCommand),

    /// Send one event through the tracking client
    Send(SendCommand),

    /// Show event store status
    Status(StatusCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.verbose, self.quiet)
    }
}
