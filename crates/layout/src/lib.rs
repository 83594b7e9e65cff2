pub mod paths;
pub mod registry;

use std::collections::BTreeMap;

use sitemirror_core::{CanonicalUrl, ResourceCategory};

pub use paths::{
    asset_path, normalized_domain, page_path, relative_path, ROOT_INDEX,
};
pub use registry::{Assignment, PathRegistry};

/// Path Mapper and Page Path Resolver over one session-wide registry.
///
/// Assets and pages share the registry, so a URL has one local path no matter
/// which kind of reference discovered it first.
#[derive(Debug, Default)]
pub struct MirrorLayout {
    registry: PathRegistry,
}

impl MirrorLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(entries: BTreeMap<String, String>) -> Self {
        Self {
            registry: PathRegistry::from_snapshot(entries),
        }
    }

    /// Idempotent: the same URL always yields the same path.
    pub fn resolve(&self, url: &CanonicalUrl, category: ResourceCategory) -> Assignment {
        self.registry.assign(url, || asset_path(url, category))
    }

    pub fn resolve_page(&self, url: &CanonicalUrl) -> Assignment {
        self.registry.assign(url, || page_path(url))
    }

    /// Read-only lookup used by the rewriter.
    pub fn lookup(&self, url: &CanonicalUrl) -> Option<String> {
        self.registry.lookup(url)
    }

    pub fn contains(&self, url: &CanonicalUrl) -> bool {
        self.registry.contains(url)
    }

    /// URLs mapped during this session.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.registry.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    fn url(s: &str) -> CanonicalUrl {
        CanonicalUrl::parse(s).unwrap()
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let layout = MirrorLayout::new();
        let a = url("https://example.com/a.css");
        let first = layout.resolve(&a, ResourceCategory::Stylesheet);
        let second = layout.resolve(&a, ResourceCategory::Stylesheet);
        assert_eq!(first.local_path, "css/example_com/a.css");
        assert_eq!(first.local_path, second.local_path);
        assert!(first.fresh && !second.fresh);
    }

    #[test]
    fn test_resolve_root_page() {
        let layout = MirrorLayout::new();
        let page = layout.resolve_page(&url("https://example.com/"));
        assert_eq!(page.local_path, "example_com/index.html");
    }

    #[test]
    fn test_page_and_asset_share_registry() {
        let layout = MirrorLayout::new();
        let u = url("https://example.com/feed");
        let page = layout.resolve_page(&u);
        let asset = layout.resolve(&u, ResourceCategory::OtherFile);
        assert_eq!(page.local_path, asset.local_path);
        assert!(!asset.fresh);
    }

    #[test]
    fn test_distinct_pages_never_share_a_file() {
        let layout = MirrorLayout::new();
        let a = layout.resolve_page(&url("https://example.com/about"));
        let b = layout.resolve_page(&url("https://example.com/about.php"));
        assert_eq!(a.local_path, "example_com/about.html");
        assert_ne!(a.local_path, b.local_path);
    }

    #[test]
    fn test_concurrent_page_resolution() {
        const N: usize = 24;
        let layout = MirrorLayout::new();
        assert!(layout.is_empty());
        let barrier = Barrier::new(N);
        let home = url("https://example.com/");

        let results: Vec<Assignment> = thread::scope(|scope| {
            let handles: Vec<_> = (0..N)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        layout.resolve_page(&home)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(layout.len(), 1);
        assert_eq!(results.iter().filter(|a| a.fresh).count(), 1);
        assert!(results.iter().all(|a| a.local_path == "example_com/index.html"));
    }
}
