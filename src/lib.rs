//! lnwcrawl - lightnovelworld crawler.
//!
//! This library provides functionality for:
//! - Fetching pages through a paced, retrying HTTP session with browser cookies
//! - Classifying lightnovelworld URLs and extracting chapters, chapter lists and listings
//! - Walking listing → novel → chapter list → chapter and saving chapters to disk

pub mod artifact;
pub mod config;
pub mod console;
pub mod cookies;
pub mod crawler;
pub mod error;
pub mod logging;
pub mod session;
pub mod site;

// Re-export commonly used types
pub use config::{Config, FailurePolicy, SessionConfig};
pub use console::Console;
pub use cookies::{Browser, BrowserCookies};
pub use crawler::{ChapterOutcome, CrawlReport, Crawler};
pub use error::{ConfigError, CrawlError, FetchError};
pub use session::{FetchedDocument, Session};
pub use site::{CrawlTarget, LightNovelWorld, Site, TargetKind};
