//! lnwcrawl CLI - lightnovelworld crawler.

use anyhow::{Context, Result};
use clap::Parser;
use lnwcrawl::config::{Config, FailurePolicy};
use lnwcrawl::console::Console;
use lnwcrawl::cookies::{Browser, load_browser_cookies};
use lnwcrawl::crawler::Crawler;
use lnwcrawl::session::Session;
use lnwcrawl::site::{CrawlTarget, LightNovelWorld, Site, TargetKind};
use std::path::PathBuf;

/// Crude lightnovelworld scraper.
#[derive(Parser, Debug)]
#[command(name = "lnwcrawl")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
struct Args {
    /// URL pointing to source; the type of content is guessed from it.
    #[arg(value_name = "URL")]
    urls: Vec<String>,

    /// Write novels and chapters into DIR.
    #[arg(short, long, value_name = "DIR")]
    directory: Option<PathBuf>,

    /// Treat the following URL as a chapter.
    #[arg(long = "chapter", value_name = "URL")]
    chapter: Vec<String>,

    /// Treat the following URL as a chapter list.
    #[arg(long = "chapters", value_name = "URL")]
    chapters: Vec<String>,

    /// Treat the following URL as a novel.
    #[arg(long = "novel", value_name = "URL")]
    novel: Vec<String>,

    /// Treat the following URL as a page of novels.
    #[arg(long = "pages", value_name = "URL")]
    pages: Vec<String>,

    /// Wait SECONDS before each request.
    #[arg(short, long, value_name = "SECONDS")]
    wait: Option<f64>,

    /// Wait up to MILLISECONDS more, at random, before each request.
    #[arg(short = 'W', long, value_name = "MILLISECONDS")]
    wait_random: Option<u64>,

    /// Retry a failed request up to NUM times.
    #[arg(short, long, value_name = "NUM")]
    retries: Option<u32>,

    /// Wait SECONDS between retries.
    #[arg(long, value_name = "SECONDS")]
    retry_wait: Option<f64>,

    /// Request timeout in SECONDS.
    #[arg(short = 'm', long, value_name = "SECONDS")]
    timeout: Option<f64>,

    /// Custom user agent; must match the browser the cookies come from.
    #[arg(short = 'A', long, value_name = "UA")]
    user_agent: Option<String>,

    /// Browser whose exported cookies are used.
    #[arg(short = 'B', long, value_name = "BROWSER")]
    browser: Option<String>,

    /// Refuse to fetch the same URL twice in one run.
    #[arg(long)]
    dedupe: bool,

    /// Record failing chapters or novels and continue with the rest of the page.
    #[arg(long)]
    keep_going: bool,

    /// Read configuration from FILE instead of the default location.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    /// Applies command-line overrides on top of the loaded configuration.
    fn apply(&self, config: &mut Config) -> Result<(), lnwcrawl::ConfigError> {
        let session = &mut config.session;
        if let Some(wait) = self.wait {
            session.wait_sec = wait;
        }
        if let Some(wait_random) = self.wait_random {
            session.wait_random_ms = wait_random;
        }
        if let Some(retries) = self.retries {
            session.retries = retries;
        }
        if let Some(retry_wait) = self.retry_wait {
            session.retry_wait_sec = retry_wait;
        }
        if let Some(timeout) = self.timeout {
            session.timeout_sec = timeout;
        }
        if let Some(user_agent) = &self.user_agent {
            session.user_agent = user_agent.clone();
        }
        if let Some(browser) = &self.browser {
            session.browser = browser.parse::<Browser>()?;
        }
        if self.dedupe {
            session.dedupe = true;
        }
        if let Some(directory) = &self.directory {
            config.crawl.output_directory = directory.clone();
        }
        if self.keep_going {
            config.crawl.on_child_failure = FailurePolicy::Skip;
        }
        Ok(())
    }

    /// Targets in run order: forced kinds first, then guessed URLs.
    fn forced_targets(&self) -> Vec<CrawlTarget> {
        let groups = [
            (&self.chapter, TargetKind::Chapter),
            (&self.chapters, TargetKind::ChapterList),
            (&self.novel, TargetKind::Novel),
            (&self.pages, TargetKind::ListingPage),
        ];

        groups
            .into_iter()
            .flat_map(|(urls, kind)| urls.iter().map(move |url| CrawlTarget::new(url, kind)))
            .collect()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    lnwcrawl::logging::init(args.verbose)?;
    let console = Console::new();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;
    args.apply(&mut config)?;
    config.validate().context("Invalid configuration")?;

    let site = LightNovelWorld::new();
    let browser = config.session.browser;
    let cookies_dir = config.cookies_dir()?;
    let cookies = load_browser_cookies(browser, &cookies_dir, site.cookie_domains())
        .with_context(|| format!("Failed to load {} cookies", browser))?;
    match &cookies.source {
        Some(path) => console.info(&format!(
            "Using {} {} cookies from {} ({} ignored)",
            console.count(cookies.loaded),
            browser,
            path.display(),
            cookies.ignored
        )),
        None => console.warning(&format!(
            "No {} cookie export found in {}",
            browser,
            cookies_dir.display()
        )),
    }

    let session =
        Session::new(&config.session, cookies.jar).context("Failed to create HTTP session")?;
    let mut crawler = Crawler::new(session, site, &config.crawl.output_directory)
        .with_failure_policy(config.crawl.on_child_failure);

    let result = run(&mut crawler, &args, &console).await;
    let report = crawler.into_report();
    console.report(&report);
    result?;

    if report.has_failures() {
        anyhow::bail!("{} items failed", report.failures.len());
    }

    console.success("Done");
    Ok(())
}

async fn run(crawler: &mut Crawler<LightNovelWorld>, args: &Args, console: &Console) -> Result<()> {
    for target in args.forced_targets() {
        console.step(&format!("{} {} {}", crawler.site().name(), target.kind, target.url));
        crawler
            .crawl(&target)
            .await
            .with_context(|| format!("Failed to crawl {}", target.url))?;
    }

    for url in &args.urls {
        let target = crawler.classify(url)?;
        console.step(&format!("{} {} {}", crawler.site().name(), target.kind, target.url));
        crawler
            .crawl(&target)
            .await
            .with_context(|| format!("Failed to crawl {}", url))?;
    }

    Ok(())
}
