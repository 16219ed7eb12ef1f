//! Server configuration.
//!
//! [`Config`] holds every tunable the server uses. The binary fills it from
//! command-line arguments via [`CliArgs`]; tests build it directly.

use crate::codec::CodecKind;
use clap::Parser;
use std::time::Duration;
use thiserror::Error;

/// Default port LineKV listens on
pub const DEFAULT_PORT: u16 = 8080;

/// Default host LineKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Errors found while validating a configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("max command size ({max_command_size}) exceeds buffer size ({buffer_size})")]
    CommandLargerThanBuffer {
        max_command_size: usize,
        buffer_size: usize,
    },
}

/// Command-line arguments for the server
#[derive(Parser, Debug)]
#[command(name = "linekv")]
#[command(version)]
#[command(about = "A minimal in-memory key-value server", long_about = None)]
pub struct CliArgs {
    /// Host to bind to
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Maximum number of concurrently served connections
    #[arg(short = 'c', long, default_value_t = 2)]
    pub max_connections: usize,

    /// How long a new connection waits for a free slot (milliseconds)
    #[arg(long, default_value_t = 5000)]
    pub admission_timeout_ms: u64,

    /// How long a connection waits to start its next read cycle (milliseconds)
    #[arg(long, default_value_t = 500)]
    pub cycle_timeout_ms: u64,

    /// Size of each pooled read buffer in bytes
    #[arg(long, default_value_t = 8192)]
    pub buffer_size: usize,

    /// Largest command accepted before the connection is closed, in bytes
    #[arg(long, default_value_t = 4096)]
    pub max_command_size: usize,

    /// Codec applied to SET values (raw or profile)
    #[arg(long, default_value = "raw")]
    pub codec: CodecKind,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on (0 picks a free port)
    pub port: u16,
    /// Admission limit on concurrent connections
    pub max_connections: usize,
    /// Bounded wait for an admission slot
    pub admission_timeout: Duration,
    /// Bounded wait for the per-connection cycle gate
    pub cycle_timeout: Duration,
    /// Capacity of each pooled read buffer
    pub buffer_size: usize,
    /// Largest buffered command before the connection is closed
    pub max_command_size: usize,
    /// Codec applied to SET values
    pub codec: CodecKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_connections: 2,
            admission_timeout: Duration::from_secs(5),
            cycle_timeout: Duration::from_millis(500),
            buffer_size: 8192,
            max_command_size: 4096,
            codec: CodecKind::Raw,
        }
    }
}

impl Config {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Checks the limits for values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::Zero("max connections"));
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::Zero("buffer size"));
        }
        if self.max_command_size == 0 {
            return Err(ConfigError::Zero("max command size"));
        }
        if self.max_command_size > self.buffer_size {
            return Err(ConfigError::CommandLargerThanBuffer {
                max_command_size: self.max_command_size,
                buffer_size: self.buffer_size,
            });
        }
        Ok(())
    }
}

impl From<&CliArgs> for Config {
    fn from(args: &CliArgs) -> Self {
        Self {
            host: args.host.clone(),
            port: args.port,
            max_connections: args.max_connections,
            admission_timeout: Duration::from_millis(args.admission_timeout_ms),
            cycle_timeout: Duration::from_millis(args.cycle_timeout_ms),
            buffer_size: args.buffer_size,
            max_command_size: args.max_command_size,
            codec: args.codec,
        }
    }
}
