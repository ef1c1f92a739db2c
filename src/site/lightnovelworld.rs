//! lightnovelworld (www.lightnovelworld.com / www.lightnovelworld.co) support.

use super::{ChapterContent, LinkPage, Site, TargetKind, element_text};
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;

/// URL patterns, tried in order. A chapter-list URL also has the shape of a
/// chapter URL, so the list pattern has to come first.
static URL_PATTERNS: LazyLock<Vec<(Regex, TargetKind)>> = LazyLock::new(|| {
    vec![
        (
            Regex::new(r"^https://www\.lightnovelworld\.com?/novel/[^/]+/?$").unwrap(),
            TargetKind::Novel,
        ),
        (
            Regex::new(r"^https://www\.lightnovelworld\.com?/novel/[^/]+/chapters(\?page=[0-9]+)?$")
                .unwrap(),
            TargetKind::ChapterList,
        ),
        (
            Regex::new(r"^https://www\.lightnovelworld\.com?/novel/[^/]+/[^/]+/?$").unwrap(),
            TargetKind::Chapter,
        ),
        (
            Regex::new(
                r"^https://www\.lightnovelworld\.com?/(browse/|ranking-|latest-updates-|searchadv/).*$",
            )
            .unwrap(),
            TargetKind::ListingPage,
        ),
    ]
});

/// Path segment appended to a novel URL to reach its chapter list.
const CHAPTERS_SUFFIX: &str = "/chapters";

/// CSS selectors used for parsing.
struct Selectors {
    chapter_title: Selector,
    chapter_paragraph: Selector,
    chapter_list: Selector,
    chapter_link: Selector,
    next_page: Selector,
    anchor: Selector,
    novel_title: Selector,
    novel_item: Selector,
    novel_link: Selector,
}

impl Selectors {
    fn new() -> Self {
        Self {
            chapter_title: Selector::parse(r#"h1[itemprop="headline"] span.chapter-title"#)
                .unwrap(),
            chapter_paragraph: Selector::parse("div#chapter-container > p").unwrap(),
            chapter_list: Selector::parse("ul.chapter-list").unwrap(),
            chapter_link: Selector::parse("a[title][href]").unwrap(),
            next_page: Selector::parse("li.PagedList-skipToNext").unwrap(),
            anchor: Selector::parse("a").unwrap(),
            novel_title: Selector::parse("h1.novel-title").unwrap(),
            novel_item: Selector::parse("li.novel-item").unwrap(),
            novel_link: Selector::parse("a[title][href]").unwrap(),
        }
    }
}

/// Site definition for lightnovelworld.
pub struct LightNovelWorld {
    selectors: Selectors,
}

impl Default for LightNovelWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl LightNovelWorld {
    pub fn new() -> Self {
        Self {
            selectors: Selectors::new(),
        }
    }

    /// Href of the first anchor inside the first pagination "next" control.
    fn find_next_page(&self, doc: &Html) -> Option<String> {
        let control = doc.select(&self.selectors.next_page).next()?;
        let href = control
            .select(&self.selectors.anchor)
            .next()?
            .value()
            .attr("href")?;

        if href.is_empty() {
            None
        } else {
            Some(href.to_string())
        }
    }
}

impl Site for LightNovelWorld {
    fn name(&self) -> &'static str {
        "lightnovelworld"
    }

    fn cookie_domains(&self) -> &'static [&'static str] {
        &["lightnovelworld.com", "lightnovelworld.co"]
    }

    fn classify(&self, url: &str) -> Option<TargetKind> {
        URL_PATTERNS
            .iter()
            .find(|(pattern, _)| pattern.is_match(url))
            .map(|(_, kind)| *kind)
    }

    fn chapter(&self, doc: &Html) -> ChapterContent {
        let title = doc
            .select(&self.selectors.chapter_title)
            .next()
            .map(element_text)
            .unwrap_or_default();

        let paragraphs: Vec<String> = doc
            .select(&self.selectors.chapter_paragraph)
            .map(element_text)
            .collect();
        let body = paragraphs.join("\n\n").trim_matches('\n').to_string();

        ChapterContent { title, body }
    }

    fn chapter_list(&self, doc: &Html) -> LinkPage {
        let links: Vec<String> = doc
            .select(&self.selectors.chapter_list)
            .next()
            .map(|list| {
                list.select(&self.selectors.chapter_link)
                    .filter_map(|a| a.value().attr("href"))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        LinkPage {
            links,
            next: self.find_next_page(doc),
        }
    }

    fn novel_title(&self, doc: &Html) -> String {
        doc.select(&self.selectors.novel_title)
            .next()
            .map(element_text)
            .unwrap_or_default()
    }

    fn novel_list(&self, doc: &Html) -> LinkPage {
        let links: Vec<String> = doc
            .select(&self.selectors.novel_item)
            .filter_map(|item| item.select(&self.selectors.novel_link).next())
            .filter_map(|a| a.value().attr("href"))
            .map(str::to_string)
            .collect();

        LinkPage {
            links,
            next: self.find_next_page(doc),
        }
    }

    fn chapters_url(&self, novel_url: &str) -> String {
        let base = novel_url.strip_suffix('/').unwrap_or(novel_url);
        format!("{}{}", base, CHAPTERS_SUFFIX)
    }
}
