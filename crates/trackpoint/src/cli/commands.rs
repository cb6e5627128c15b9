//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::value::Value;

/// Serve command arguments.
#[derive(Debug, Args)]
pub struct ServeCommand {
    /// Address to bind (overrides `server.bind`)
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Port to listen on (overrides `server.port`)
    #[arg(short, long)]
    pub port: Option<u16>,
}

/// Events command arguments.
#[derive(Debug, Args)]
pub struct EventsCommand {
    /// Filter by event name
    #[arg(short = 'n', long)]
    pub event_name: Option<String>,

    /// Filter by visitor id
    #[arg(long)]
    pub client_id: Option<String>,

    /// Filter by user id
    #[arg(long)]
    pub user_id: Option<String>,

    /// Filter by session id
    #[arg(long)]
    pub session_id: Option<String>,

    /// Show events at or after this instant (e.g. "2024-01-15", RFC 3339, epoch millis)
    #[arg(long)]
    pub since: Option<String>,

    /// Show events at or before this instant; bare dates include the whole day
    #[arg(long)]
    pub until: Option<String>,

    /// Maximum number of results
    #[arg(short, long, default_value = "20")]
    pub limit: u32,

    /// Number of results to skip
    #[arg(long, default_value = "0")]
    pub offset: u32,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Stats command arguments.
#[derive(Debug, Args)]
pub struct StatsCommand {
    /// Only count events at or after this instant
    #[arg(long)]
    pub since: Option<String>,

    /// Only count events at or before this instant
    #[arg(long)]
    pub until: Option<String>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Realtime command arguments.
#[derive(Debug, Args)]
pub struct RealtimeCommand {
    /// Trailing window in seconds (overrides `aggregation.realtime_window_secs`)
    #[arg(short, long)]
    pub window: Option<u64>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Send command arguments.
#[derive(Debug, Args)]
pub struct SendCommand {
    /// Name of the event to send
    pub event_name: String,

    /// Event property as KEY=VALUE; VALUE is parsed as JSON when possible
    #[arg(short, long = "property", value_name = "KEY=VALUE", value_parser = parse_property)]
    pub properties: Vec<(String, Value)>,

    /// Page URL the event fires on
    #[arg(long, default_value = "/")]
    pub page: String,

    /// Authenticated user id
    #[arg(short, long)]
    pub user: Option<String>,

    /// Collector URL (overrides `client.endpoint`)
    #[arg(short, long)]
    pub endpoint: Option<String>,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Output format for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// One line per event
    Plain,
    /// Formatted table
    #[default]
    Table,
    /// JSON output
    Json,
}

/// Parse a `KEY=VALUE` property argument.
fn parse_property(arg: &str) -> Result<(String, Value), String> {
    let (key, raw) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{arg}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty property name in '{arg}'"));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::from(raw));
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_property_json_value() {
        assert_eq!(parse_property("count=3").unwrap(), ("count".to_string(), Value::Int(3)));
        assert_eq!(
            parse_property("premium=true").unwrap(),
            ("premium".to_string(), Value::Bool(true))
        );
    }

    #[test]
    fn test_parse_property_plain_string() {
        assert_eq!(
            parse_property("plan=pro monthly").unwrap(),
            ("plan".to_string(), Value::from("pro monthly"))
        );
    }

    #[test]
    fn test_parse_property_keeps_equals_in_value() {
        let (key, value) = parse_property("query=a=b").unwrap();
        assert_eq!(key, "query");
        assert_eq!(value, Value::from("a=b"));
    }

    #[test]
    fn test_parse_property_rejects_missing_separator() {
        assert!(parse_property("flag").is_err());
        assert!(parse_property("=value").is_err());
    }

    #[test]
    fn test_output_format_default() {
        assert_eq!(OutputFormat::default(), OutputFormat::Table);
    }

    #[test]
    fn test_config_command_debug() {
        let cmd = ConfigCommand::Show { json: false };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Show"));
    }
}
