use std::collections::{BTreeMap, HashMap};

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use sha2::{Digest, Sha256};
use tracing::debug;

use sitemirror_core::CanonicalUrl;

/// Result of a registry resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub local_path: String,
    /// True only for the call that allocated the path.
    pub fresh: bool,
}

/// CanonicalURL → LocalPath, shared by every worker for the whole session.
///
/// The first assignment for a URL wins. Allocation happens while the URL's
/// entry is locked, so concurrent resolutions of one URL allocate exactly once,
/// and a path is never handed to two URLs.
#[derive(Debug, Default)]
pub struct PathRegistry {
    by_url: DashMap<String, String>,
    allocated: DashSet<String>,
    /// Paths from an earlier session, reserved for their URLs.
    previous: HashMap<String, String>,
}

impl PathRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session that reuses an earlier session's paths.
    ///
    /// The registry starts empty, so the first resolution of each URL is still
    /// fresh, but a URL seen before gets its old path back and no other URL
    /// can claim one of those paths.
    pub fn from_snapshot(entries: BTreeMap<String, String>) -> Self {
        let allocated = DashSet::new();
        for path in entries.values() {
            allocated.insert(path.clone());
        }
        Self {
            by_url: DashMap::new(),
            allocated,
            previous: entries.into_iter().collect(),
        }
    }

    /// Return the existing path for `url`, or allocate one starting from
    /// `candidate`. `candidate` is only evaluated for a new URL.
    pub fn assign(&self, url: &CanonicalUrl, candidate: impl FnOnce() -> String) -> Assignment {
        match self.by_url.entry(url.as_str().to_string()) {
            Entry::Occupied(entry) => Assignment {
                local_path: entry.get().clone(),
                fresh: false,
            },
            Entry::Vacant(entry) => {
                let local_path = match self.previous.get(url.as_str()) {
                    Some(path) => path.clone(),
                    None => self.claim(candidate(), url),
                };
                entry.insert(local_path.clone());
                Assignment {
                    local_path,
                    fresh: true,
                }
            }
        }
    }

    /// Never allocates.
    pub fn lookup(&self, url: &CanonicalUrl) -> Option<String> {
        self.by_url.get(url.as_str()).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, url: &CanonicalUrl) -> bool {
        self.by_url.contains_key(url.as_str())
    }

    pub fn len(&self) -> usize {
        self.by_url.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_url.is_empty()
    }

    /// This session's entries plus any earlier ones not seen again.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        let mut entries: BTreeMap<String, String> = self.previous.clone().into_iter().collect();
        for entry in self.by_url.iter() {
            entries.insert(entry.key().clone(), entry.value().clone());
        }
        entries
    }

    fn claim(&self, candidate: String, url: &CanonicalUrl) -> String {
        if self.allocated.insert(candidate.clone()) {
            return candidate;
        }

        let hashed = with_suffix(&candidate, &short_hash(url.as_str()));
        debug!(url = %url, taken = %candidate, local_path = %hashed, "path collision");
        if self.allocated.insert(hashed.clone()) {
            return hashed;
        }

        let mut n = 1u64;
        loop {
            n += 1;
            let numbered = with_suffix(&hashed, &n.to_string());
            if self.allocated.insert(numbered.clone()) {
                return numbered;
            }
        }
    }
}

/// First 8 hex digits of SHA-256.
fn short_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..8].to_string()
}

/// `a/b/logo.png` + `x` → `a/b/logo-x.png`; extensionless names get `-x` appended.
fn with_suffix(path: &str, suffix: &str) -> String {
    let (dir, file) = match path.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, path),
    };
    let file = match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}-{suffix}.{ext}"),
        _ => format!("{file}-{suffix}"),
    };
    match dir {
        Some(dir) => format!("{dir}/{file}"),
        None => file,
    }
}
