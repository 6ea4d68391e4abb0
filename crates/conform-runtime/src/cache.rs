//! Caching layer for validation reports.
//!
//! Validation is pure, so a report can be reused for a document with the same
//! serialized content, key order included, under the same template content.

use conform_core::{Document, Template, ValidationReport};
use moka::future::Cache;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

/// Cache key for validation reports.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    template: String,
    version: String,
    template_hash: u64,
    document_hash: u64,
}

impl CacheKey {
    pub fn new(template: &Template, document: &Document) -> Self {
        Self {
            template: template.name.clone(),
            version: template.version.clone(),
            template_hash: hash_template(template),
            document_hash: hash_str(&document.canonical_json()),
        }
    }
}

// Templates loaded from disk can change without a version bump.
fn hash_template(template: &Template) -> u64 {
    hash_str(&serde_json::to_string(template).unwrap_or_default())
}

fn hash_str(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

/// Report cache using moka.
pub struct ValidationCache {
    cache: Cache<CacheKey, Arc<ValidationReport>>,
}

impl ValidationCache {
    /// Create a new cache with the given configuration.
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    /// Get a cached report.
    pub async fn get(&self, key: &CacheKey) -> Option<Arc<ValidationReport>> {
        self.cache.get(key).await
    }

    /// Store a report.
    pub async fn insert(&self, key: CacheKey, report: Arc<ValidationReport>) {
        self.cache.insert(key, report).await;
    }

    /// Return the cached report for `document`, validating on a miss.
    pub async fn get_or_validate(
        &self,
        template: &Template,
        document: &Document,
    ) -> Arc<ValidationReport> {
        let key = CacheKey::new(template, document);
        if let Some(report) = self.get(&key).await {
            tracing::trace!(template = %template.name, "Validation cache hit");
            return report;
        }

        let report = Arc::new(conform_core::validate(document, template));
        self.insert(key, report.clone()).await;
        report
    }

    /// Clear the cache.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Approximate entry count.
    pub async fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}

impl Default for ValidationCache {
    fn default() -> Self {
        Self::new(1_000, Duration::from_secs(600))
    }
}
