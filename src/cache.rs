//! Parsed-entry cache.
//!
//! Parsing and formatting an entry (markdown in particular) is the expensive
//! part of building a listing, and a static build parses the same file once
//! per page it appears on. The cache keeps the formatted [`ParsedEntry`] for
//! each source file so unchanged files are parsed once.
//!
//! ## Cache keys
//!
//! Entries are keyed by source path and validated by content: every value
//! carries the SHA-256 of the file it was parsed from, and a lookup whose
//! hash no longer matches is a miss. Content-based rather than mtime-based
//! so it survives `git checkout` (which resets modification times) and so a
//! `touch` alone doesn't force a re-parse.
//!
//! The manifest is also stamped with the default body formatter (config
//! `parser`) its entries were formatted with. Loading it under a different
//! formatter starts empty, since every cached body would be stale.
//!
//! Modification times are never cached. They are recomputed per request.
//!
//! ## Implementations
//!
//! - [`NullCache`]: caches nothing (the default)
//! - [`MemoryCache`]: lives for one process, shared by the static build workers
//! - [`JsonCache`]: persisted to `<cache.dir>/entry-cache.json`, written on
//!   [`close`](EntryCache::close) when something changed

use crate::config::CacheConfig;
use crate::parser::ParsedEntry;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, warn};

/// Name of the cache manifest file within the cache directory.
const MANIFEST_FILENAME: &str = "entry-cache.json";

/// Version of the cache manifest format. Bump this to invalidate all
/// existing caches when the format or key computation changes.
const MANIFEST_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A cached entry and the hash of the source it came from.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub source_hash: String,
    pub entry: ParsedEntry,
}

/// Opaque key/value store for parsed entries. Implementations are
/// internally synchronized; one instance is shared by all render workers.
pub trait EntryCache: Send + Sync {
    /// The cached entry for `source`, if present and still current.
    fn get(&self, source: &Path) -> Option<ParsedEntry>;

    fn put(&self, source: &Path, entry: &ParsedEntry);

    /// Flush to backing storage.
    fn close(&self) -> Result<(), CacheError>;

    fn stats(&self) -> CacheStats;
}

/// Open the cache described by the config, for entries formatted with
/// `formatter` by default.
pub fn open(config: &CacheConfig, formatter: &str) -> Box<dyn EntryCache> {
    if config.enabled {
        Box::new(JsonCache::load(&config.dir, formatter))
    } else {
        Box::new(NullCache::default())
    }
}

// ============================================================================
// Implementations
// ============================================================================

/// Never stores anything. Every lookup is a miss.
#[derive(Debug, Default)]
pub struct NullCache {
    counters: Counters,
}

impl EntryCache for NullCache {
    fn get(&self, _source: &Path) -> Option<ParsedEntry> {
        self.counters.miss();
        None
    }

    fn put(&self, _source: &Path, _entry: &ParsedEntry) {}

    fn close(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }
}

/// Process-lifetime cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<PathBuf, CacheEntry>>,
    counters: Counters,
}

impl EntryCache for MemoryCache {
    fn get(&self, source: &Path) -> Option<ParsedEntry> {
        let hit = lookup(&*lock(&self.entries), source, source);
        self.counters.record(hit.is_some());
        hit
    }

    fn put(&self, source: &Path, entry: &ParsedEntry) {
        if let Some(cached) = cache_entry(source, entry) {
            lock(&self.entries).insert(source.to_path_buf(), cached);
        }
    }

    fn close(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }
}

/// On-disk manifest of cached entries.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CacheManifest {
    pub version: u32,
    /// Default body formatter the entries were formatted with.
    #[serde(default)]
    pub formatter: String,
    pub entries: HashMap<String, CacheEntry>,
}

impl CacheManifest {
    pub fn empty(formatter: &str) -> Self {
        Self {
            version: MANIFEST_VERSION,
            formatter: formatter.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Load from the cache directory. Returns an empty manifest if the
    /// file doesn't exist, can't be parsed, or was written by another
    /// format version or under another default formatter.
    pub fn load(dir: &Path, formatter: &str) -> Self {
        let path = manifest_path(dir);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return Self::empty(formatter),
        };
        let manifest: Self = match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable entry cache");
                return Self::empty(formatter);
            }
        };
        if manifest.version != MANIFEST_VERSION {
            debug!(found = manifest.version, "entry cache version changed, starting empty");
            return Self::empty(formatter);
        }
        if manifest.formatter != formatter {
            debug!(
                found = %manifest.formatter,
                formatter,
                "default formatter changed, starting with an empty entry cache"
            );
            return Self::empty(formatter);
        }
        manifest
    }

    /// Save to the cache directory, creating it if needed.
    pub fn save(&self, dir: &Path) -> Result<(), CacheError> {
        std::fs::create_dir_all(dir)?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(manifest_path(dir), json)?;
        Ok(())
    }
}

/// JSON-backed cache, loaded once and saved on `close` when dirty.
#[derive(Debug)]
pub struct JsonCache {
    dir: PathBuf,
    manifest: Mutex<CacheManifest>,
    dirty: AtomicBool,
    counters: Counters,
}

impl JsonCache {
    pub fn load(dir: &Path, formatter: &str) -> Self {
        Self {
            dir: dir.to_path_buf(),
            manifest: Mutex::new(CacheManifest::load(dir, formatter)),
            dirty: AtomicBool::new(false),
            counters: Counters::default(),
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.manifest).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EntryCache for JsonCache {
    fn get(&self, source: &Path) -> Option<ParsedEntry> {
        let key = cache_key(source);
        let hit = lookup(&lock(&self.manifest).entries, &key, source);
        self.counters.record(hit.is_some());
        hit
    }

    fn put(&self, source: &Path, entry: &ParsedEntry) {
        if let Some(cached) = cache_entry(source, entry) {
            lock(&self.manifest).entries.insert(cache_key(source), cached);
            self.dirty.store(true, Ordering::Release);
        }
    }

    fn close(&self) -> Result<(), CacheError> {
        if self.dirty.swap(false, Ordering::AcqRel) {
            lock(&self.manifest).save(&self.dir)?;
            debug!(dir = %self.dir.display(), "entry cache saved");
        }
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn cache_key(source: &Path) -> String {
    source.to_string_lossy().into_owned()
}

/// A stored entry is only returned while its source hash still matches.
fn lookup<K, Q>(entries: &HashMap<K, CacheEntry>, key: &Q, source: &Path) -> Option<ParsedEntry>
where
    K: std::borrow::Borrow<Q> + std::hash::Hash + Eq,
    Q: std::hash::Hash + Eq + ?Sized,
{
    let cached = entries.get(key)?;
    let current = hash_file(source).ok()?;
    (cached.source_hash == current).then(|| cached.entry.clone())
}

fn cache_entry(source: &Path, entry: &ParsedEntry) -> Option<CacheEntry> {
    match hash_file(source) {
        Ok(source_hash) => Some(CacheEntry {
            source_hash,
            entry: entry.clone(),
        }),
        Err(e) => {
            debug!(path = %source.display(), error = %e, "not caching unreadable source");
            None
        }
    }
}

/// SHA-256 hash of a file's contents, returned as a hex string.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("{:x}", digest))
}

/// Resolve the cache manifest path for a cache directory.
pub fn manifest_path(dir: &Path) -> PathBuf {
    dir.join(MANIFEST_FILENAME)
}

// ============================================================================
// Statistics
// ============================================================================

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU32,
    misses: AtomicU32,
}

impl Counters {
    fn record(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.miss();
        }
    }

    fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Summary of cache performance for a build run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u32,
    pub misses: u32,
}

impl CacheStats {
    pub fn total(&self) -> u32 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(
                f,
                "{} cached, {} parsed ({} total)",
                self.hits,
                self.misses,
                self.total()
            )
        } else {
            write!(f, "{} parsed", self.misses)
        }
    }
}
