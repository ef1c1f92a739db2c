//! Browser cookie identity for the fetch session.
//!
//! Cookies are read from Netscape HTTP cookie files, the format browser
//! export extensions (and lynx itself) write. The browser name picks which
//! export is used.

use crate::error::ConfigError;
use reqwest::Url;
use reqwest::cookie::Jar;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;

/// Browsers whose cookie exports can seed the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Browser {
    Chromium,
    Firefox,
    Edge,
    Lynx,
    Safari,
    Opera,
    OperaGx,
    W3m,
    Brave,
    Librewolf,
}

impl Browser {
    /// All supported browsers.
    pub const ALL: [Browser; 10] = [
        Browser::Chromium,
        Browser::Firefox,
        Browser::Edge,
        Browser::Lynx,
        Browser::Safari,
        Browser::Opera,
        Browser::OperaGx,
        Browser::W3m,
        Browser::Brave,
        Browser::Librewolf,
    ];

    /// Returns the name used on the command line and in cookie file names.
    pub fn as_str(self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Edge => "edge",
            Browser::Lynx => "lynx",
            Browser::Safari => "safari",
            Browser::Opera => "opera",
            Browser::OperaGx => "opera_gx",
            Browser::W3m => "w3m",
            Browser::Brave => "brave",
            Browser::Librewolf => "librewolf",
        }
    }
}

impl fmt::Display for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Browser {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Browser::ALL
            .into_iter()
            .find(|browser| browser.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownBrowser(s.to_string()))
    }
}

/// Cookies loaded for one browser.
#[derive(Debug)]
pub struct BrowserCookies {
    /// Jar handed to the HTTP client.
    pub jar: Arc<Jar>,
    /// Export the cookies were read from, if one was found.
    pub source: Option<PathBuf>,
    /// Cookies added to the jar.
    pub loaded: usize,
    /// Cookies left out because they are expired or belong to other sites.
    pub ignored: usize,
}

impl BrowserCookies {
    fn empty() -> Self {
        Self {
            jar: Arc::new(Jar::default()),
            source: None,
            loaded: 0,
            ignored: 0,
        }
    }
}

/// Errors that can occur while loading cookies.
#[derive(Error, Debug)]
pub enum CookieError {
    /// Failed to read or walk the filesystem.
    #[error("Failed to read cookie export: {0}")]
    Io(#[from] std::io::Error),

    /// Export contains a line that is not a cookie.
    #[error("Invalid Netscape cookie line: {0}")]
    InvalidLine(String),

    /// Cookie domain could not be turned into a URL.
    #[error("Invalid cookie domain: {0}")]
    InvalidDomain(String),
}

/// Loads the newest cookie export for `browser` found under `cookie_dir`.
///
/// Only unexpired cookies for `domains` (or their subdomains) are kept; an
/// empty `domains` keeps every unexpired cookie. A missing directory or
/// export yields an empty jar.
pub fn load_browser_cookies(
    browser: Browser,
    cookie_dir: &Path,
    domains: &[&str],
) -> Result<BrowserCookies, CookieError> {
    let mut cookies = BrowserCookies::empty();
    if !cookie_dir.is_dir() {
        return Ok(cookies);
    }

    let Some(path) = newest_export(cookie_dir, browser)? else {
        return Ok(cookies);
    };

    let content = std::fs::read_to_string(&path)?;
    let now = unix_now();
    for cookie in parse_export(&content)? {
        if cookie.is_expired(now) || !cookie.belongs_to(domains) {
            cookies.ignored += 1;
            continue;
        }

        let (url, set_cookie) = cookie.to_set_cookie(now)?;
        cookies.jar.add_cookie_str(&set_cookie, &url);
        cookies.loaded += 1;
    }

    cookies.source = Some(path);
    Ok(cookies)
}

/// Most recently modified `.txt` file under `root` whose name mentions `browser`.
fn newest_export(root: &Path, browser: Browser) -> Result<Option<PathBuf>, std::io::Error> {
    let mut pending = vec![root.to_path_buf()];
    let mut newest: Option<(SystemTime, PathBuf)> = None;

    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(path);
                continue;
            }

            if !is_export_for(&path, browser) {
                continue;
            }

            let modified = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);

            if newest.as_ref().is_none_or(|(time, _)| modified > *time) {
                newest = Some((modified, path));
            }
        }
    }

    Ok(newest.map(|(_, path)| path))
}

fn is_export_for(path: &Path, browser: Browser) -> bool {
    path.file_name()
        .and_then(OsStr::to_str)
        .map(str::to_ascii_lowercase)
        .is_some_and(|name| name.ends_with(".txt") && name.contains(browser.as_str()))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

/// One line of a Netscape cookie export.
#[derive(Debug, Clone, PartialEq, Eq)]
struct NetscapeCookie {
    domain: String,
    include_subdomains: bool,
    path: String,
    secure: bool,
    expires_unix: Option<u64>,
    name: String,
    value: String,
    http_only: bool,
}

fn parse_export(content: &str) -> Result<Vec<NetscapeCookie>, CookieError> {
    content
        .lines()
        .filter_map(|line| NetscapeCookie::parse_line(line).transpose())
        .collect()
}

impl NetscapeCookie {
    /// Parses one export line. Blank lines and comments yield `None`.
    fn parse_line(raw: &str) -> Result<Option<Self>, CookieError> {
        let line = raw.trim();
        let (http_only, line) = match line.strip_prefix("#HttpOnly_") {
            Some(rest) => (true, rest),
            None if line.is_empty() || line.starts_with('#') => return Ok(None),
            None => (false, line),
        };

        let fields: Vec<&str> = line.splitn(7, '\t').collect();
        let [domain, include_subdomains, path, secure, expires, name, value] = fields[..] else {
            return Err(CookieError::InvalidLine(line.to_string()));
        };

        Ok(Some(Self {
            domain: domain.to_string(),
            include_subdomains: include_subdomains.eq_ignore_ascii_case("true"),
            path: path.to_string(),
            secure: secure.eq_ignore_ascii_case("true"),
            expires_unix: expires.parse::<u64>().ok().filter(|ts| *ts != 0),
            name: name.to_string(),
            value: value.to_string(),
            http_only,
        }))
    }

    fn host(&self) -> &str {
        self.domain.trim_start_matches('.')
    }

    /// Session cookies (no expiry) never expire here.
    fn is_expired(&self, now: u64) -> bool {
        self.expires_unix.is_some_and(|expires| expires <= now)
    }

    fn belongs_to(&self, domains: &[&str]) -> bool {
        if domains.is_empty() {
            return true;
        }

        let host = self.host().to_ascii_lowercase();
        domains.iter().any(|domain| {
            host == *domain
                || host
                    .strip_suffix(domain)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    /// Renders the cookie as a `Set-Cookie` value and the URL that sets it.
    fn to_set_cookie(&self, now: u64) -> Result<(Url, String), CookieError> {
        let host = self.host();
        if host.is_empty() {
            return Err(CookieError::InvalidDomain(self.domain.clone()));
        }

        let url = Url::parse(&format!("https://{}/", host))
            .map_err(|_| CookieError::InvalidDomain(self.domain.clone()))?;

        let mut set_cookie = format!("{}={}; Path={}", self.name, self.value, self.path);
        if self.include_subdomains {
            set_cookie.push_str(&format!("; Domain={}", self.domain));
        }
        if let Some(expires) = self.expires_unix {
            set_cookie.push_str(&format!("; Max-Age={}", expires.saturating_sub(now)));
        }
        if self.secure {
            set_cookie.push_str("; Secure");
        }
        if self.http_only {
            set_cookie.push_str("; HttpOnly");
        }

        Ok((url, set_cookie))
    }
}
