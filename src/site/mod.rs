//! Site trait and the page shapes the crawler understands.
//!
//! A site decides what kind of page a URL points at and pulls the fields
//! the crawler needs out of fetched documents. Extraction never touches
//! the network and never resolves links; both are the crawler's job.

mod lightnovelworld;

pub use lightnovelworld::LightNovelWorld;

use scraper::{ElementRef, Html};
use std::fmt;

/// What a URL points at, which decides the traversal that runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// A single chapter.
    Chapter,
    /// One page of a novel's chapter list.
    ChapterList,
    /// A novel's landing page.
    Novel,
    /// A browse, ranking, latest-updates or search page listing novels.
    ListingPage,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TargetKind::Chapter => "chapter",
            TargetKind::ChapterList => "chapter list",
            TargetKind::Novel => "novel",
            TargetKind::ListingPage => "listing page",
        };
        f.write_str(name)
    }
}

/// A URL together with its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTarget {
    pub url: String,
    pub kind: TargetKind,
}

impl CrawlTarget {
    pub fn new(url: impl Into<String>, kind: TargetKind) -> Self {
        Self {
            url: url.into(),
            kind,
        }
    }
}

/// Title and text of a chapter page. Either may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterContent {
    pub title: String,
    pub body: String,
}

/// Links found on one page of a paginated list, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkPage {
    /// Unresolved hrefs of the listed items.
    pub links: Vec<String>,
    /// Unresolved href of the next page, if the page has one.
    pub next: Option<String>,
}

/// Trait for the sites the crawler can walk.
pub trait Site {
    /// Returns the human-readable name of this site.
    fn name(&self) -> &'static str;

    /// Cookie domains the session identity is taken from.
    fn cookie_domains(&self) -> &'static [&'static str];

    /// Classifies a URL purely by its shape.
    fn classify(&self, url: &str) -> Option<TargetKind>;

    /// Extracts a chapter's title and body.
    fn chapter(&self, doc: &Html) -> ChapterContent;

    /// Extracts chapter links and the next-page link from a chapter-list page.
    fn chapter_list(&self, doc: &Html) -> LinkPage;

    /// Extracts a novel's title.
    fn novel_title(&self, doc: &Html) -> String;

    /// Extracts novel links and the next-page link from a listing page.
    fn novel_list(&self, doc: &Html) -> LinkPage;

    /// Derives the chapter-list URL of a novel from its landing page URL.
    fn chapters_url(&self, novel_url: &str) -> String;
}

/// Collects an element's text and trims surrounding whitespace.
pub(crate) fn element_text(elem: ElementRef<'_>) -> String {
    elem.text().collect::<String>().trim().to_string()
}

/// Makes a title safe to use as a single path component.
pub fn sanitize_title(title: &str) -> String {
    title.replace('/', "|")
}
