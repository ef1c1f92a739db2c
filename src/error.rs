//! Error types for the lnwcrawl crawler.
//!
//! Uses `thiserror` for structured error definitions that provide
//! clear context about what went wrong.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// What the last failed attempt of a request looked like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastOutcome {
    /// The server answered with a non-success status.
    Status(u16),
    /// No response was received at all.
    Connection,
}

impl fmt::Display for LastOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LastOutcome::Status(code) => write!(f, "{}", code),
            LastOutcome::Connection => f.write_str("connection"),
        }
    }
}

/// Error type for fetch session operations.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Transport failure that is not worth retrying
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with a status that will never succeed
    #[error("failed completely {status} {url}")]
    PermanentStatus { url: String, status: u16 },

    /// Retry budget spent without a successful response
    #[error("failed {last} {url} after {attempts} attempts")]
    ExhaustedRetries {
        url: String,
        last: LastOutcome,
        attempts: u32,
    },

    /// URL was already fetched during this session
    #[error("already visited: {0}")]
    Duplicate(String),

    /// URL could not be parsed
    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Error type for crawl traversal.
#[derive(Error, Debug)]
pub enum CrawlError {
    /// Fetching a page failed
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A required field was empty after a successful fetch
    #[error("failed getting {what} {url}")]
    Extraction { what: &'static str, url: String },

    /// URL shape does not match any known page kind
    #[error("could not guess the url - '{0}'")]
    Unclassifiable(String),

    /// A discovered link could not be resolved against the page base
    #[error("Invalid link '{href}' on {page}: {source}")]
    InvalidLink {
        href: String,
        page: String,
        #[source]
        source: url::ParseError,
    },

    /// Writing artifacts or directories failed
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CrawlError {
    /// Returns true if the error is a session-level duplicate rejection.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, CrawlError::Fetch(FetchError::Duplicate(_)))
    }
}

/// Error type for configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Invalid configuration value
    #[error("Invalid config value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Output directory is missing or not a directory
    #[error("couldn't change directory to \"{}\"", .0.display())]
    InvalidDirectory(PathBuf),

    /// Browser name is not one of the supported cookie sources
    #[error("no such browser \"{0}\"")]
    UnknownBrowser(String),

    /// Config directory not found
    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Result type alias using anyhow for application-level error handling.
pub type Result<T> = anyhow::Result<T>;
