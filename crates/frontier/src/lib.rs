use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};

use dashmap::{DashMap, DashSet};
use priority_queue::PriorityQueue;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use sitemirror_core::{CrawlJob, JobKind};

/// Wrapper for priority ordering (higher priority = dequeued first)
#[derive(Debug, Clone)]
struct Priority(f64);

impl PartialEq for Priority {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Priority {}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct UrlKey(String);

struct JobQueue {
    queue: PriorityQueue<UrlKey, Priority>,
    jobs: HashMap<String, CrawlJob>,
}

impl JobQueue {
    fn new() -> Self {
        Self {
            queue: PriorityQueue::new(),
            jobs: HashMap::new(),
        }
    }

    fn push(&mut self, key: String, job: CrawlJob) {
        let priority = Priority(job.priority);
        self.jobs.insert(key.clone(), job);
        self.queue.push(UrlKey(key), priority);
    }

    fn pop(&mut self) -> Option<CrawlJob> {
        let (key, _priority) = self.queue.pop()?;
        self.jobs.remove(&key.0)
    }

    fn len(&self) -> usize {
        self.queue.len()
    }
}

/// Pending fetches for one mirroring session.
///
/// Every URL is enqueued at most once (retries excepted). Popped jobs count as
/// in flight until [`CrawlFrontier::complete`] or [`CrawlFrontier::push_back`].
pub struct CrawlFrontier {
    queue: Mutex<JobQueue>,
    seen_urls: DashSet<String>,
    /// Per-host last-request timestamp for politeness
    host_last_seen: DashMap<String, Instant>,
    in_flight: AtomicUsize,
}

impl Default for CrawlFrontier {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlFrontier {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(JobQueue::new()),
            seen_urls: DashSet::new(),
            host_last_seen: DashMap::new(),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Dedup key: the URL without its fragment.
    fn normalize_url(url: &Url) -> String {
        let mut normalized = url.clone();
        normalized.set_fragment(None);
        normalized.to_string()
    }

    /// Higher priority = dequeued first. Assets outrank pages so each page's
    /// dependencies land before the crawl fans out further; shallower jobs
    /// outrank deeper ones.
    pub fn calculate_priority(kind: &JobKind, depth: u32) -> f64 {
        let base = match kind {
            JobKind::Asset { .. } => 2.0,
            JobKind::Page => 1.0,
        };
        base / (depth as f64 + 2.0)
    }

    /// Returns true if added, false if already seen. Retries bypass dedup.
    pub async fn push(&self, job: CrawlJob) -> bool {
        let normalized = Self::normalize_url(&job.url);
        if job.retry_count == 0 && !self.seen_urls.insert(normalized.clone()) {
            return false;
        }
        self.queue.lock().await.push(normalized, job);
        true
    }

    /// Returns the number of jobs actually enqueued.
    pub async fn push_batch(&self, jobs: Vec<CrawlJob>) -> usize {
        if jobs.is_empty() {
            return 0;
        }

        let to_enqueue: Vec<(String, CrawlJob)> = jobs
            .into_iter()
            .filter_map(|job| {
                let normalized = Self::normalize_url(&job.url);
                if job.retry_count > 0 || self.seen_urls.insert(normalized.clone()) {
                    Some((normalized, job))
                } else {
                    None
                }
            })
            .collect();

        let added = to_enqueue.len();
        let mut queue = self.queue.lock().await;
        for (normalized, job) in to_enqueue {
            queue.push(normalized, job);
        }
        added
    }

    /// Pop the highest-priority job and mark it in flight.
    pub async fn pop(&self) -> Option<CrawlJob> {
        let mut queue = self.queue.lock().await;
        let job = queue.pop()?;
        self.in_flight.fetch_add(1, AtomicOrdering::SeqCst);
        Some(job)
    }

    /// Return popped jobs that could not run yet (e.g. politeness delay).
    pub async fn push_back(&self, jobs: Vec<CrawlJob>) {
        if jobs.is_empty() {
            return;
        }
        let returned = jobs.len();
        {
            let mut queue = self.queue.lock().await;
            for job in jobs {
                let normalized = Self::normalize_url(&job.url);
                queue.push(normalized, job);
            }
        }
        self.in_flight.fetch_sub(returned, AtomicOrdering::SeqCst);
        debug!(returned, "jobs handed back to frontier");
    }

    /// Mark one popped job finished. Enqueue its follow-ups (or its retry) first.
    pub fn complete(&self) {
        self.in_flight.fetch_sub(1, AtomicOrdering::SeqCst);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(AtomicOrdering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Nothing queued and nothing running.
    pub async fn is_done(&self) -> bool {
        let queue = self.queue.lock().await;
        queue.len() == 0 && self.in_flight() == 0
    }

    /// Record that we visited a host now (for politeness delays)
    pub fn record_host_visit(&self, host: &str) {
        self.host_last_seen.insert(host.to_string(), Instant::now());
    }

    /// Check if enough time has elapsed since the last visit to this host
    pub fn can_visit_host(&self, host: &str, min_delay: Duration) -> bool {
        match self.host_last_seen.get(host) {
            Some(last) => last.elapsed() >= min_delay,
            None => true,
        }
    }

    pub fn seen_count(&self) -> usize {
        self.seen_urls.len()
    }
}
