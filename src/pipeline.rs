use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;
use url::Url;

use sitemirror_core::{
    AppConfig, CanonicalUrl, CrawlJob, JobKind, MirrorError, PageFetched, PageRecord,
};
use sitemirror_frontier::CrawlFrontier;
use sitemirror_layout::{MirrorLayout, ROOT_INDEX};
use sitemirror_parser::{Discovered, LinkExtractor};
use sitemirror_rewriter::Rewriter;

/// Which pages get followed.
#[derive(Debug, Clone)]
pub struct CrawlScope {
    start: CanonicalUrl,
    allowed_domains: Vec<String>,
    max_depth: u32,
    max_pages: u64,
    follow_pages: bool,
}

impl CrawlScope {
    /// An empty `allowed_domains` list means the start URL's host.
    pub fn new(start: CanonicalUrl, config: &AppConfig) -> Self {
        let mut allowed_domains: Vec<String> = config
            .mirror
            .allowed_domains
            .iter()
            .map(|d| bare_host(d))
            .filter(|d| !d.is_empty())
            .collect();
        if allowed_domains.is_empty() {
            allowed_domains.push(bare_host(start.host()));
        }

        Self {
            start,
            allowed_domains,
            max_depth: config.general.max_depth,
            max_pages: config.general.max_pages,
            follow_pages: config.mirror.follow_pages,
        }
    }

    pub fn start(&self) -> &CanonicalUrl {
        &self.start
    }

    /// Exact match or subdomain, ignoring a leading `www.`.
    pub fn allows_host(&self, host: &str) -> bool {
        let host = bare_host(host);
        self.allowed_domains
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{d}")))
    }

    pub fn allows_depth(&self, depth: u32) -> bool {
        self.max_depth == 0 || depth <= self.max_depth
    }

    pub fn follows(&self, url: &CanonicalUrl, depth: u32) -> bool {
        self.follow_pages && self.allows_depth(depth) && self.allows_host(url.host())
    }
}

fn bare_host(host: &str) -> String {
    let host = host.trim().to_ascii_lowercase();
    match host.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => host,
    }
}

/// Result of processing one fetched page.
#[derive(Debug)]
pub struct PageOutcome {
    pub record: PageRecord,
    /// Newly mapped URLs, in discovery order.
    pub jobs: Vec<CrawlJob>,
    /// Output-root copy of the start page, rewritten for that location.
    pub root_copy: Option<String>,
}

/// Per-session state shared by every worker: extraction, the path registry
/// and the crawl scope.
pub struct MirrorContext {
    extractor: LinkExtractor,
    layout: MirrorLayout,
    scope: CrawlScope,
    pages_scheduled: AtomicU64,
}

impl MirrorContext {
    pub fn new(extractor: LinkExtractor, layout: MirrorLayout, scope: CrawlScope) -> Self {
        Self {
            extractor,
            layout,
            scope,
            pages_scheduled: AtomicU64::new(0),
        }
    }

    pub fn layout(&self) -> &MirrorLayout {
        &self.layout
    }

    /// Map the start page and build its job.
    pub fn seed_job(&self) -> CrawlJob {
        let start = self.scope.start().clone();
        self.layout.resolve_page(&start);
        self.pages_scheduled.fetch_add(1, Ordering::SeqCst);
        new_job(start.into_url(), 0, JobKind::Page, None)
    }

    /// `PageFetched` → rewritten page plus whatever it newly references.
    ///
    /// Every reference is mapped before the body is rewritten, so the rewriter
    /// sees all of this page's entries.
    pub fn process_page(&self, fetched: &PageFetched) -> Result<PageOutcome, MirrorError> {
        let page_url = CanonicalUrl::from_url(fetched.page_url.clone())
            .ok_or_else(|| MirrorError::InvalidUrl(fetched.page_url.to_string()))?;
        let body = String::from_utf8_lossy(&fetched.body);
        let base = &fetched.final_url;

        let local_path = self.layout.resolve_page(&page_url).local_path;
        let found = self.extractor.extract_html(&body, base);
        let jobs = self.schedule(found, base, fetched.depth);

        let rewriter = Rewriter::new(self.extractor.normalizer(), &self.layout);
        let rewritten = rewriter.rewrite_html(base, &local_path, &body);
        let root_copy = (page_url == *self.scope.start())
            .then(|| rewriter.rewrite_html(base, ROOT_INDEX, &body));

        debug!(url = %page_url, local_path, jobs = jobs.len(), "processed page");
        Ok(PageOutcome {
            record: PageRecord {
                url: page_url,
                body: rewritten,
                local_path,
                depth: fetched.depth,
            },
            jobs,
            root_copy,
        })
    }

    /// Map a downloaded stylesheet's `url()` references and rewrite it for its
    /// own location.
    pub fn process_stylesheet(
        &self,
        css_url: &Url,
        local_path: &str,
        css: &str,
        depth: u32,
    ) -> (String, Vec<CrawlJob>) {
        let found = self.extractor.extract_css(css, css_url);
        let jobs = self.schedule(found, css_url, depth);
        let rewriter = Rewriter::new(self.extractor.normalizer(), &self.layout);
        (rewriter.rewrite_css(css_url, local_path, css), jobs)
    }

    /// Only URLs this call mapped for the first time become jobs.
    fn schedule(&self, found: Vec<Discovered>, source: &Url, depth: u32) -> Vec<CrawlJob> {
        let mut jobs = Vec::new();
        for discovered in found {
            match discovered {
                Discovered::Resource(link) => {
                    let assignment = self.layout.resolve(&link.url, link.category);
                    if assignment.fresh {
                        let kind = JobKind::Asset {
                            category: link.category,
                            local_path: assignment.local_path,
                        };
                        jobs.push(new_job(link.url.into_url(), depth, kind, Some(source)));
                    }
                }
                Discovered::Page(url) => {
                    if let Some(job) = self.schedule_page(url, source, depth + 1) {
                        jobs.push(job);
                    }
                }
            }
        }
        jobs
    }

    fn schedule_page(&self, url: CanonicalUrl, source: &Url, depth: u32) -> Option<CrawlJob> {
        if !self.scope.follows(&url, depth) || self.layout.contains(&url) {
            return None;
        }
        if !self.reserve_page_slot() {
            debug!(url = %url, "page cap reached, not following");
            return None;
        }

        if !self.layout.resolve_page(&url).fresh {
            // Mapped by another worker in the meantime.
            self.pages_scheduled.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        Some(new_job(url.into_url(), depth, JobKind::Page, Some(source)))
    }

    /// Take one page slot. Fails once `max_pages` slots are taken (0 = no cap).
    fn reserve_page_slot(&self) -> bool {
        let max = self.scope.max_pages;
        self.pages_scheduled
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (max == 0 || n < max).then_some(n + 1)
            })
            .is_ok()
    }
}

fn new_job(url: Url, depth: u32, kind: JobKind, source: Option<&Url>) -> CrawlJob {
    CrawlJob {
        priority: CrawlFrontier::calculate_priority(&kind, depth),
        url,
        depth,
        kind,
        source_url: source.map(Url::to_string),
        retry_count: 0,
    }
}
