//! Resilient HTTP fetch session.
//!
//! A [`Session`] owns the HTTP client and its cookie identity, paces every
//! logical request, retries transient failures a bounded number of times
//! and optionally refuses to fetch the same URL twice in one run.

use crate::config::SessionConfig;
use crate::error::{FetchError, LastOutcome};
use rand::Rng;
use encoding_rs::{Encoding, UTF_8};
use reqwest::cookie::Jar;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Statuses that mean the resource will never become available.
pub const INSTANT_FAIL_STATUSES: [u16; 10] = [400, 401, 402, 403, 404, 410, 412, 414, 421, 505];

/// `<base>` declarations in the document head.
static BASE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("head base[href]").unwrap());

/// Delay applied before the first attempt of each request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// Fixed part of the delay.
    pub wait: Duration,
    /// Upper bound (inclusive) of the random part.
    pub jitter_max: Duration,
}

impl Pacing {
    /// Draws a random jitter in `[0, jitter_max]` at millisecond granularity.
    pub fn jitter<R: Rng>(&self, rng: &mut R) -> Duration {
        let max_ms = self.jitter_max.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rng.random_range(0..=max_ms))
    }

    /// Total delay before a first attempt.
    pub fn delay<R: Rng>(&self, rng: &mut R) -> Duration {
        self.wait + self.jitter(rng)
    }

    async fn pause(&self) {
        sleep_nonzero(self.wait).await;
        let jitter = self.jitter(&mut rand::rng());
        sleep_nonzero(jitter).await;
    }
}

/// Bounded, fixed-delay retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub retry_wait: Duration,
}

/// Raw result of one successful request.
#[derive(Debug, Clone)]
pub struct FetchedBytes {
    /// URL that was requested.
    pub url: Url,
    /// Final HTTP status (always a success).
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
    /// Charset label from the `Content-Type` header, if any.
    pub charset: Option<String>,
    /// Cookies set by the response.
    pub cookies: HashMap<String, String>,
}

/// A parsed page along with the base its relative links resolve against.
pub struct FetchedDocument {
    /// Parsed HTML.
    pub html: Html,
    /// `<base href>` of the document if present and resolvable, else the request URL.
    pub base: Url,
}

impl FetchedDocument {
    /// Parses `body` and works out the effective base for `url`.
    pub fn parse(url: Url, body: &str) -> Self {
        let html = Html::parse_document(body);
        let base = resolve_base(&html, &url).unwrap_or(url);
        Self { html, base }
    }

    /// Resolves a link found in this document.
    pub fn resolve(&self, href: &str) -> Result<Url, url::ParseError> {
        self.base.join(href)
    }
}

fn resolve_base(html: &Html, url: &Url) -> Option<Url> {
    let href = html
        .select(&BASE_SELECTOR)
        .filter_map(|base| base.value().attr("href"))
        .find(|href| !href.is_empty())?;
    url.join(href).ok()
}

/// How a single attempt ended.
enum Attempt {
    Success(FetchedBytes),
    Status(StatusCode),
    /// Transient transport fault; treated as "no response".
    NoResponse(reqwest::Error),
}

/// HTTP session shared by a whole crawl run.
pub struct Session {
    client: Client,
    pacing: Pacing,
    retry: RetryPolicy,
    visited: Option<HashSet<String>>,
}

impl Session {
    /// Creates a session from configuration and a pre-loaded cookie jar.
    pub fn new(config: &SessionConfig, jar: Arc<Jar>) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .cookie_provider(jar)
            .timeout(config.timeout())
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            client,
            pacing: Pacing {
                wait: config.wait(),
                jitter_max: config.wait_random(),
            },
            retry: RetryPolicy {
                max_retries: config.retries,
                retry_wait: config.retry_wait(),
            },
            visited: config.dedupe.then(HashSet::new),
        })
    }

    /// Returns true if `url` was already fetched while de-duplication is on.
    pub fn has_visited(&self, url: &str) -> bool {
        self.visited
            .as_ref()
            .is_some_and(|visited| visited.contains(url))
    }

    /// Fetches `url` and parses it as HTML.
    pub async fn fetch_document(&mut self, url: &str) -> Result<FetchedDocument, FetchError> {
        let fetched = self.fetch_bytes(url).await?;
        Ok(document_from(fetched))
    }

    /// Like [`Session::fetch_document`], also returning the cookies set by the response.
    pub async fn fetch_document_with_cookies(
        &mut self,
        url: &str,
    ) -> Result<(FetchedDocument, HashMap<String, String>), FetchError> {
        let mut fetched = self.fetch_bytes(url).await?;
        let cookies = std::mem::take(&mut fetched.cookies);
        Ok((document_from(fetched), cookies))
    }

    /// Fetches the raw body of `url` with pacing, retries and de-duplication.
    pub async fn fetch_bytes(&mut self, url: &str) -> Result<FetchedBytes, FetchError> {
        if let Some(visited) = self.visited.as_mut()
            && !visited.insert(url.to_string())
        {
            return Err(FetchError::Duplicate(url.to_string()));
        }

        let parsed = Url::parse(url).map_err(|source| FetchError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;

        let mut retries = 0;
        loop {
            if retries == 0 {
                self.pacing.pause().await;
            }

            info!("{}", url);
            let last = match self.attempt(&parsed).await? {
                Attempt::Success(fetched) => return Ok(fetched),
                Attempt::Status(status) => {
                    if is_instant_fail(status) {
                        return Err(FetchError::PermanentStatus {
                            url: url.to_string(),
                            status: status.as_u16(),
                        });
                    }
                    LastOutcome::Status(status.as_u16())
                }
                Attempt::NoResponse(err) => {
                    debug!("transient failure for {}: {}", url, err);
                    LastOutcome::Connection
                }
            };

            if retries >= self.retry.max_retries {
                return Err(FetchError::ExhaustedRetries {
                    url: url.to_string(),
                    last,
                    attempts: retries + 1,
                });
            }

            retries += 1;
            warn!(
                "failed {} {}, retry {}/{}",
                last, url, retries, self.retry.max_retries
            );
            sleep_nonzero(self.retry.retry_wait).await;
        }
    }

    /// Sends one request and reads its body.
    async fn attempt(&self, url: &Url) -> Result<Attempt, FetchError> {
        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(err) => return classify_transport(url, err),
        };

        let status = response.status();
        if !status.is_success() {
            return Ok(Attempt::Status(status));
        }

        let charset = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(charset_of);

        let cookies: HashMap<String, String> = response
            .cookies()
            .map(|cookie| (cookie.name().to_string(), cookie.value().to_string()))
            .collect();

        let body = match response.bytes().await {
            Ok(body) => body.to_vec(),
            Err(err) => return classify_transport(url, err),
        };

        Ok(Attempt::Success(FetchedBytes {
            url: url.clone(),
            status: status.as_u16(),
            body,
            charset,
            cookies,
        }))
    }
}

fn document_from(fetched: FetchedBytes) -> FetchedDocument {
    let body = decode_body(&fetched.body, fetched.charset.as_deref());
    FetchedDocument::parse(fetched.url, &body)
}

/// Extracts the `charset` parameter of a `Content-Type` value.
fn charset_of(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_string())
    })
}

/// Decodes a body with its declared charset, falling back to UTF-8.
///
/// A byte order mark overrides the declared charset.
pub fn decode_body<'a>(body: &'a [u8], charset: Option<&str>) -> Cow<'a, str> {
    let encoding = charset
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);
    let (text, _, _) = encoding.decode(body);
    text
}

/// Returns true for statuses that are never retried.
pub fn is_instant_fail(status: StatusCode) -> bool {
    INSTANT_FAIL_STATUSES.contains(&status.as_u16())
}

/// Returns true for transport faults that are worth another attempt.
pub fn is_transient(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_body() || err.is_request()
}

fn classify_transport(url: &Url, err: reqwest::Error) -> Result<Attempt, FetchError> {
    if is_transient(&err) {
        Ok(Attempt::NoResponse(err))
    } else {
        Err(FetchError::Transport {
            url: url.to_string(),
            source: err,
        })
    }
}

async fn sleep_nonzero(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}
