//! CLI argument definitions for webstats-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use webstats_core::config::WebstatsConfig;

/// Tracking pixel endpoint that batches request metadata to disk.
///
/// Serves an empty `text/css` response to allowlisted hosts and records
/// timestamp, source IP and user agent of each request in batch files.
#[derive(Parser, Debug)]
#[command(name = "webstats-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to webstats.toml configuration file.
    #[arg(short, long, default_value = "webstats.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Override the HTTP listen address (e.g. 127.0.0.1:8080).
    #[arg(long)]
    pub listen: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}

impl DaemonCli {
    /// Apply command-line overrides on top of a loaded configuration.
    ///
    /// The result must be validated again by the caller.
    pub fn apply_overrides(&self, config: &mut WebstatsConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
        if let Some(listen) = &self.listen {
            config.server.listen_addr = listen.clone();
        }
    }
}
