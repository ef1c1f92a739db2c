//! Crawl orchestration.
//!
//! The [`Crawler`] walks listing pages → novels → chapter lists → chapters,
//! strictly one request at a time, and writes every chapter it finds into
//! the novel's directory.

use crate::artifact;
use crate::config::FailurePolicy;
use crate::error::CrawlError;
use crate::session::{FetchedDocument, Session};
use crate::site::{CrawlTarget, LinkPage, Site, TargetKind};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use url::Url;

/// A discovered item that failed while its parent page was being walked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildFailure {
    pub url: String,
    pub message: String,
}

/// Running totals of one crawl.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    /// Listing and chapter-list pages fetched.
    pub pages_visited: usize,
    /// Novels whose landing page was fetched.
    pub novels_visited: usize,
    /// Chapters fetched and written.
    pub chapters_written: usize,
    /// Chapters skipped because their file already existed.
    pub chapters_cached: usize,
    /// Items skipped because the session had already fetched them.
    pub duplicates_skipped: usize,
    /// Items that failed under [`FailurePolicy::Skip`].
    pub failures: Vec<ChildFailure>,
}

impl CrawlReport {
    /// Returns true if any skipped item failed.
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Result of a single chapter capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterOutcome {
    /// The chapter was fetched and written to this path.
    Written(PathBuf),
    /// A file for the chapter already existed; nothing was fetched.
    AlreadyCaptured(PathBuf),
}

/// Which traversal a paginated loop performs for each discovered link.
#[derive(Debug, Clone, Copy)]
enum ListKind {
    Chapters,
    Novels,
}

/// Drives one crawl run over a [`Site`].
pub struct Crawler<S: Site> {
    session: Session,
    site: S,
    output_dir: PathBuf,
    policy: FailurePolicy,
    report: CrawlReport,
}

impl<S: Site> Crawler<S> {
    /// Creates a crawler writing into `output_dir`.
    pub fn new(session: Session, site: S, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            session,
            site,
            output_dir: output_dir.into(),
            policy: FailurePolicy::default(),
            report: CrawlReport::default(),
        }
    }

    /// Sets how failures of discovered items are handled.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the site being crawled.
    pub fn site(&self) -> &S {
        &self.site
    }

    /// Returns the totals collected so far.
    pub fn report(&self) -> &CrawlReport {
        &self.report
    }

    /// Consumes the crawler and returns its report.
    pub fn into_report(self) -> CrawlReport {
        self.report
    }

    /// Works out what `url` points at without touching the network.
    pub fn classify(&self, url: &str) -> Result<CrawlTarget, CrawlError> {
        self.site
            .classify(url)
            .map(|kind| CrawlTarget::new(url, kind))
            .ok_or_else(|| CrawlError::Unclassifiable(url.to_string()))
    }

    /// Classifies `url` and runs the matching traversal.
    pub async fn guess(&mut self, url: &str) -> Result<(), CrawlError> {
        let target = self.classify(url)?;
        self.crawl(&target).await
    }

    /// Runs the traversal for `target` into the output directory.
    pub async fn crawl(&mut self, target: &CrawlTarget) -> Result<(), CrawlError> {
        let dir = self.output_dir.clone();
        info!("crawling {} {}", target.kind, target.url);

        match target.kind {
            TargetKind::Chapter => self.get_chapter(&target.url, &dir).await.map(|_| ()),
            TargetKind::ChapterList => self.get_novel_chapters(&target.url, &dir).await,
            TargetKind::Novel => self.get_novel(&target.url, &dir).await,
            TargetKind::ListingPage => self.get_pages(&target.url, &dir).await,
        }
    }

    /// Captures one chapter into `dir` unless it is already there.
    pub async fn get_chapter(&mut self, url: &str, dir: &Path) -> Result<ChapterOutcome, CrawlError> {
        let path = artifact::chapter_path(dir, url);
        if artifact::is_captured(dir, url).await? {
            debug!("already captured {} as {}", url, path.display());
            self.report.chapters_cached += 1;
            return Ok(ChapterOutcome::AlreadyCaptured(path));
        }

        let chapter = {
            let doc = self.session.fetch_document(url).await?;
            self.site.chapter(&doc.html)
        };

        if chapter.title.is_empty() {
            return Err(CrawlError::Extraction {
                what: "chapter",
                url: url.to_string(),
            });
        }

        artifact::write_chapter(&path, &chapter.title, &chapter.body).await?;
        debug!("wrote \"{}\" to {}", chapter.title, path.display());
        self.report.chapters_written += 1;
        Ok(ChapterOutcome::Written(path))
    }

    /// Walks every page of a chapter list, capturing each chapter into `dir`.
    pub async fn get_novel_chapters(&mut self, url: &str, dir: &Path) -> Result<(), CrawlError> {
        self.walk_pages(url, dir, ListKind::Chapters).await
    }

    /// Captures a whole novel into its own directory under `dir`.
    pub async fn get_novel(&mut self, url: &str, dir: &Path) -> Result<(), CrawlError> {
        let title = {
            let doc = self.session.fetch_document(url).await?;
            self.site.novel_title(&doc.html)
        };

        if title.is_empty() {
            return Err(CrawlError::Extraction {
                what: "novel",
                url: url.to_string(),
            });
        }

        self.report.novels_visited += 1;
        let novel_dir = artifact::ensure_novel_dir(dir, &title).await?;
        info!("novel \"{}\" into {}", title, novel_dir.display());

        let chapters_url = self.site.chapters_url(url);
        self.get_novel_chapters(&chapters_url, &novel_dir).await
    }

    /// Walks every page of a novel listing, capturing each novel under `dir`.
    pub async fn get_pages(&mut self, url: &str, dir: &Path) -> Result<(), CrawlError> {
        self.walk_pages(url, dir, ListKind::Novels).await
    }

    /// Follows "next page" links from `url` until a page has none.
    async fn walk_pages(&mut self, url: &str, dir: &Path, kind: ListKind) -> Result<(), CrawlError> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut next_url = Some(url.to_string());

        while let Some(page_url) = next_url.take() {
            if !seen.insert(page_url.clone()) {
                warn!("pagination loops back to {}, stopping", page_url);
                break;
            }

            let (links, next) = {
                let doc = self.session.fetch_document(&page_url).await?;
                let page = match kind {
                    ListKind::Chapters => self.site.chapter_list(&doc.html),
                    ListKind::Novels => self.site.novel_list(&doc.html),
                };
                resolve_page(&doc, &page_url, page)?
            };
            self.report.pages_visited += 1;
            debug!("{} links on {}", links.len(), page_url);

            for link in links {
                let link = link.to_string();
                let result = match kind {
                    ListKind::Chapters => self.get_chapter(&link, dir).await.map(|_| ()),
                    // get_novel re-enters walk_pages for the chapter list.
                    ListKind::Novels => Box::pin(self.get_novel(&link, dir)).await,
                };
                self.settle_child(&link, result)?;
            }

            next_url = next;
        }

        Ok(())
    }

    /// Applies the failure policy to the result of one discovered item.
    fn settle_child(&mut self, url: &str, result: Result<(), CrawlError>) -> Result<(), CrawlError> {
        let err = match result {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        match self.policy {
            FailurePolicy::Abort => Err(err),
            FailurePolicy::Skip if err.is_duplicate() => {
                debug!("skipping {}: {}", url, err);
                self.report.duplicates_skipped += 1;
                Ok(())
            }
            FailurePolicy::Skip => {
                warn!("skipping {}: {}", url, err);
                self.report.failures.push(ChildFailure {
                    url: url.to_string(),
                    message: err.to_string(),
                });
                Ok(())
            }
        }
    }
}

/// Resolves a page's item links and its next link against the document base.
///
/// An item link that does not resolve is an error; a next link that does not
/// resolve ends pagination.
fn resolve_page(
    doc: &FetchedDocument,
    page_url: &str,
    page: LinkPage,
) -> Result<(Vec<Url>, Option<String>), CrawlError> {
    let links = page
        .links
        .iter()
        .map(|href| {
            doc.resolve(href).map_err(|source| CrawlError::InvalidLink {
                href: href.clone(),
                page: page_url.to_string(),
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let next = page.next.and_then(|href| match doc.resolve(&href) {
        Ok(url) => Some(url.to_string()),
        Err(err) => {
            warn!("unusable next link '{}' on {}: {}", href, page_url, err);
            None
        }
    });

    Ok((links, next))
}
