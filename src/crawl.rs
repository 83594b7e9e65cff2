use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use sitemirror_core::{
    AppConfig, CanonicalUrl, CrawlJob, FetchConfig, FetchResponse, Fetcher, JobKind, MirrorError,
    PageFetched, ResourceCategory,
};
use sitemirror_frontier::CrawlFrontier;
use sitemirror_layout::{MirrorLayout, ROOT_INDEX};
use sitemirror_networks::HttpDriver;
use sitemirror_parser::LinkExtractor;
use sitemirror_storage::{Manifest, MirrorStore};

use crate::pipeline::{CrawlScope, MirrorContext};

/// Sleep when the queue is empty but jobs are still running.
const IDLE_WAIT: Duration = Duration::from_millis(200);
/// Sleep after handing back a job whose host is still cooling down.
const POLITENESS_WAIT: Duration = Duration::from_millis(50);

#[derive(Default)]
struct CrawlStats {
    pages: AtomicU64,
    assets: AtomicU64,
    failed: AtomicU64,
}

struct Worker {
    id: usize,
    ctx: Arc<MirrorContext>,
    frontier: Arc<CrawlFrontier>,
    driver: Arc<dyn Fetcher>,
    store: MirrorStore,
    fetch_config: FetchConfig,
    stats: Arc<CrawlStats>,
    max_retries: u32,
}

impl Worker {
    async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        debug!(worker_id = self.id, "worker started");
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!(worker_id = self.id, "worker shutting down");
                    break;
                }
                finished = self.step() => {
                    if finished {
                        debug!(worker_id = self.id, "frontier drained, worker exiting");
                        break;
                    }
                }
            }
        }
    }

    /// Handle at most one job. Returns true once nothing is queued or running.
    async fn step(&self) -> bool {
        let Some(job) = self.frontier.pop().await else {
            if self.frontier.is_done().await {
                return true;
            }
            tokio::time::sleep(IDLE_WAIT).await;
            return false;
        };

        let host = job.url.host_str().unwrap_or_default().to_string();
        if !self
            .frontier
            .can_visit_host(&host, self.driver.default_delay())
        {
            self.frontier.push_back(vec![job]).await;
            tokio::time::sleep(POLITENESS_WAIT).await;
            return false;
        }
        self.frontier.record_host_visit(&host);

        self.handle(job).await;
        self.frontier.complete();
        false
    }

    async fn handle(&self, job: CrawlJob) {
        info!(worker_id = self.id, url = %job.url, depth = job.depth, retry = job.retry_count, "fetching");

        let resp = match self.driver.fetch(&job.url, &self.fetch_config).await {
            Ok(resp) if resp.status < 400 => resp,
            Ok(resp) => {
                self.retry_or_drop(job, MirrorError::Status(resp.status)).await;
                return;
            }
            Err(e) => {
                self.retry_or_drop(job, e).await;
                return;
            }
        };

        match job.kind.clone() {
            JobKind::Page => self.save_page(&job, resp).await,
            JobKind::Asset {
                category,
                local_path,
            } => self.save_asset(&job, category, &local_path, resp).await,
        }
    }

    async fn save_page(&self, job: &CrawlJob, resp: FetchResponse) {
        if resp.content_type.is_some() && !resp.is_html() {
            // A page link that turned out to be a file: keep the bytes at the mapped path.
            let local_path = CanonicalUrl::from_url(job.url.clone())
                .and_then(|url| self.ctx.layout().lookup(&url));
            if let Some(local_path) = local_path {
                debug!(url = %job.url, content_type = ?resp.content_type, "non-html page");
                if self.write(&local_path, &resp.body).await {
                    self.stats.assets.fetch_add(1, Ordering::Relaxed);
                }
            }
            return;
        }

        let fetched = PageFetched {
            page_url: job.url.clone(),
            final_url: resp.final_url,
            body: resp.body,
            headers: resp.headers,
            depth: job.depth,
        };
        let outcome = match self.ctx.process_page(&fetched) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(worker_id = self.id, url = %job.url, "page skipped: {}", e);
                return;
            }
        };

        let enqueued = self.frontier.push_batch(outcome.jobs).await;
        let record = outcome.record;
        if self.write(&record.local_path, record.body.as_bytes()).await {
            self.stats.pages.fetch_add(1, Ordering::Relaxed);
            info!(worker_id = self.id, url = %record.url, local_path = %record.local_path, enqueued, "saved page");
        }
        if let Some(root_copy) = outcome.root_copy {
            self.write(ROOT_INDEX, root_copy.as_bytes()).await;
        }
    }

    async fn save_asset(
        &self,
        job: &CrawlJob,
        category: ResourceCategory,
        local_path: &str,
        resp: FetchResponse,
    ) {
        let is_css = category == ResourceCategory::Stylesheet
            || resp
                .content_type
                .as_deref()
                .map(|ct| ct.contains("text/css"))
                .unwrap_or(false);

        let bytes = if is_css {
            let css = String::from_utf8_lossy(&resp.body);
            let (rewritten, jobs) =
                self.ctx
                    .process_stylesheet(&resp.final_url, local_path, &css, job.depth);
            let enqueued = self.frontier.push_batch(jobs).await;
            if enqueued > 0 {
                debug!(worker_id = self.id, url = %job.url, enqueued, "stylesheet references enqueued");
            }
            rewritten.into_bytes()
        } else {
            resp.body
        };

        if self.write(local_path, &bytes).await {
            self.stats.assets.fetch_add(1, Ordering::Relaxed);
            info!(worker_id = self.id, url = %job.url, local_path, %category, "saved asset");
        }
    }

    async fn write(&self, local_path: &str, bytes: &[u8]) -> bool {
        match self.store.write_file(local_path, bytes).await {
            Ok(_) => true,
            Err(e) => {
                error!(worker_id = self.id, local_path, "write failed: {}", e);
                false
            }
        }
    }

    async fn retry_or_drop(&self, job: CrawlJob, reason: MirrorError) {
        let class = self.driver.classify_error(&reason);
        if class == "unreachable" && job.retry_count < self.max_retries {
            warn!(worker_id = self.id, url = %job.url, retry = job.retry_count, "fetch failed, will retry: {}", reason);
            let retry_job = CrawlJob {
                retry_count: job.retry_count + 1,
                priority: job.priority * 0.5,
                ..job
            };
            self.frontier.push(retry_job).await;
        } else {
            warn!(worker_id = self.id, url = %job.url, retries = job.retry_count, class, "fetch failed permanently: {}", reason);
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Mirror `start` into `config.general.output_dir`.
pub async fn run_mirror(config: AppConfig, start: &str) -> Result<()> {
    let start_url =
        CanonicalUrl::parse(start).with_context(|| format!("not an http(s) URL: {start}"))?;

    let store = MirrorStore::new(&config.general.output_dir);
    store
        .ensure_root()
        .await
        .with_context(|| format!("cannot create {}", store.root().display()))?;

    let layout = if config.general.resume {
        match store.load_manifest().await? {
            Some(manifest) => {
                info!(entries = manifest.entries.len(), saved_at = %manifest.saved_at, "resuming from manifest");
                MirrorLayout::from_snapshot(manifest.entries)
            }
            None => {
                info!("no manifest found, starting fresh");
                MirrorLayout::new()
            }
        }
    } else {
        MirrorLayout::new()
    };

    let extractor = LinkExtractor::from_config(&config)?;
    let scope = CrawlScope::new(start_url.clone(), &config);
    let ctx = Arc::new(MirrorContext::new(extractor, layout, scope));

    let driver: Arc<dyn Fetcher> = Arc::new(HttpDriver::new(&config.http)?);
    let frontier = Arc::new(CrawlFrontier::new());
    frontier.push(ctx.seed_job()).await;

    let fetch_config = FetchConfig {
        timeout: Duration::from_secs(config.http.request_timeout_seconds),
        max_body_size: config.general.max_body_size_mb * 1024 * 1024,
        user_agent: config.http.user_agent.clone(),
    };
    let stats = Arc::new(CrawlStats::default());
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let total_workers = driver.max_concurrency().max(1);
    info!(
        url = %start_url,
        output = %store.root().display(),
        total_workers,
        driver = driver.name(),
        "starting mirror"
    );

    let mut workers = JoinSet::new();
    for id in 0..total_workers {
        let worker = Worker {
            id,
            ctx: Arc::clone(&ctx),
            frontier: Arc::clone(&frontier),
            driver: Arc::clone(&driver),
            store: store.clone(),
            fetch_config: fetch_config.clone(),
            stats: Arc::clone(&stats),
            max_retries: config.http.max_retries,
        };
        workers.spawn(worker.run(shutdown_tx.subscribe()));
    }

    tokio::select! {
        _ = async { while workers.join_next().await.is_some() {} } => {
            info!("nothing left to fetch");
        }
        res = signal::ctrl_c() => {
            res?;
            info!(in_flight = frontier.in_flight(), queued = frontier.len().await, "shutdown signal received");
            let _ = shutdown_tx.send(());
        }
    }
    while workers.join_next().await.is_some() {}

    let manifest = Manifest {
        start_url: start_url.to_string(),
        saved_at: Utc::now(),
        pages_saved: stats.pages.load(Ordering::Relaxed),
        assets_saved: stats.assets.load(Ordering::Relaxed),
        entries: ctx.layout().snapshot(),
    };
    if let Err(e) = store.save_manifest(&manifest).await {
        error!("failed to save manifest: {}", e);
    }

    info!(
        pages = manifest.pages_saved,
        assets = manifest.assets_saved,
        failed = stats.failed.load(Ordering::Relaxed),
        seen = frontier.seen_count(),
        mapped = ctx.layout().len(),
        "mirror complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::SocketAddr;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal HTTP/1.1 server over a fixed path → (content type, body) map.
    async fn serve_site(site: HashMap<&'static str, (&'static str, String)>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let site = Arc::new(site);
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let site = Arc::clone(&site);
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]);
                    let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                    let response = match site.get(path.as_str()) {
                        Some((content_type, body)) => format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            content_type,
                            body.len(),
                            body
                        ),
                        None => "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                            .to_string(),
                    };
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_mirror_small_site() {
        let mut site = HashMap::new();
        site.insert(
            "/",
            (
                "text/html; charset=utf-8",
                r#"<html><head><link rel="stylesheet" href="/style.css"></head>
<body><img src="/logo.png"><a href="/about">About</a><a href="/missing">Gone</a></body></html>"#
                    .to_string(),
            ),
        );
        site.insert(
            "/about",
            ("text/html", r#"<a href="/">Home</a><img src="logo.png">"#.to_string()),
        );
        site.insert(
            "/style.css",
            ("text/css", "body { background: url(bg.png) }".to_string()),
        );
        site.insert("/logo.png", ("image/png", "PNG".to_string()));
        site.insert("/bg.png", ("image/png", "BG".to_string()));
        let addr = serve_site(site).await;

        let out = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.general.output_dir = out.path().to_string_lossy().into_owned();
        config.http.min_delay_ms = 0;
        config.http.max_concurrency = 4;
        config.http.max_retries = 0;

        run_mirror(config, &format!("http://{addr}/")).await.unwrap();

        let domain = format!("127_0_0_1_{}", addr.port());
        let read = |rel: &str| std::fs::read_to_string(out.path().join(rel)).unwrap();

        let home = read(&format!("{domain}/index.html"));
        assert!(home.contains(&format!(r#"href="../css/{domain}/style.css""#)));
        assert!(home.contains(&format!(r#"src="../images/{domain}/logo.png""#)));
        assert!(home.contains(r#"href="about.html""#));
        assert!(home.contains(r#"href="missing.html""#));

        let root = read("index.html");
        assert!(root.contains(&format!(r#"href="css/{domain}/style.css""#)));
        assert!(root.contains(&format!(r#"href="{domain}/about.html""#)));

        let about = read(&format!("{domain}/about.html"));
        assert!(about.contains(r#"href="index.html""#));

        let css = read(&format!("css/{domain}/style.css"));
        assert_eq!(css, format!("body {{ background: url(../../images/{domain}/bg.png) }}"));
        assert_eq!(read(&format!("images/{domain}/bg.png")), "BG");
        assert_eq!(read(&format!("images/{domain}/logo.png")), "PNG");
        assert!(!out.path().join(format!("{domain}/missing.html")).exists());

        let store = MirrorStore::new(out.path());
        let manifest = store.load_manifest().await.unwrap().unwrap();
        assert_eq!(manifest.pages_saved, 2);
        assert_eq!(manifest.assets_saved, 3);
        assert_eq!(
            manifest.entries.get(&format!("http://{addr}/")).map(String::as_str),
            Some(format!("{domain}/index.html").as_str())
        );
    }
}
