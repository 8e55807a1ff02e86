//! Self-healing selector cache.
//!
//! A successful resolution that went through a slow strategy leaves
//! behind a durable selector keyed by the query. The next resolution
//! of the same query tries that selector first; if the page has
//! changed and the selector no longer verifies, the entry is evicted
//! and the full chain runs again.

use crate::errors::LocatorError;
use crate::resolver::ElementResolver;
use crate::strategies;
use crate::types::{ElementQuery, LocatorStrategy, ResolvedElement, ResolvedTarget};
use async_trait::async_trait;
use browser_session::PageOps;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// In-memory selector cache shared across resolutions.
#[derive(Default)]
pub struct SelectorCache {
    entries: DashMap<String, String>,
}

impl SelectorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    pub fn insert(&self, key: String, selector: String) {
        self.entries.insert(key, selector);
    }

    pub fn evict(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolver decorator that consults and maintains the cache.
pub struct HealingResolver {
    inner: Arc<dyn ElementResolver>,
    cache: Arc<SelectorCache>,
}

impl HealingResolver {
    pub fn new(inner: Arc<dyn ElementResolver>, cache: Arc<SelectorCache>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &Arc<SelectorCache> {
        &self.cache
    }

    /// Try the cached selector; verify before trusting it.
    async fn try_cached(
        &self,
        page: &dyn PageOps,
        key: &str,
        selector: &str,
    ) -> Result<Option<ResolvedElement>, LocatorError> {
        let candidates = page.query_selector(selector).await?;
        for candidate in candidates {
            if strategies::verify(page, &candidate).await? {
                debug!(selector, "healed selector hit");
                return Ok(Some(ResolvedElement {
                    target: ResolvedTarget::Handle(candidate),
                    strategy: LocatorStrategy::Selector,
                    confidence: strategies::SELECTOR_CONFIDENCE,
                    durable_selector: Some(selector.to_string()),
                }));
            }
        }
        info!(selector, "cached selector went stale; evicting");
        self.cache.evict(key);
        Ok(None)
    }
}

#[async_trait]
impl ElementResolver for HealingResolver {
    async fn resolve(
        &self,
        page: &dyn PageOps,
        query: &ElementQuery,
    ) -> Result<ResolvedElement, LocatorError> {
        let key = query.cache_key();
        if let Some(selector) = self.cache.get(&key) {
            if let Some(resolved) = self.try_cached(page, &key, &selector).await? {
                return Ok(resolved);
            }
        }

        let resolved = self.inner.resolve(page, query).await?;
        if let Some(selector) = &resolved.durable_selector {
            self.cache.insert(key, selector.clone());
        }
        Ok(resolved)
    }
}
