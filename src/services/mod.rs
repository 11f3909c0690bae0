// src/services/mod.rs

//! Source adapters: one per harvested catalog.
//!
//! Adapters never fail. Whatever was collected before a stop condition is
//! returned together with the [`StopReason`], which callers log.

pub mod area;
pub mod catalog;
pub mod cursor;
pub mod evg;
pub mod extract;
pub mod fgv;
pub mod sebrae;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::{Config, Course, HttpConfig, Platform};

pub use area::AreaClassifier;
pub use catalog::{CatalogSpec, PagedCatalog};
pub use cursor::{PageCursor, StopReason, page_cap};
pub use extract::{ExtractionStrategy, PageScan, SeenCourses, TitleFallback};
pub use sebrae::SebraeAdapter;

/// Courses collected by one adapter run.
#[derive(Debug, Clone)]
pub struct ScrapeOutcome {
    pub courses: Vec<Course>,
    pub stop_reason: StopReason,
    /// Pages (or render-more calls) processed
    pub pages: u32,
}

impl ScrapeOutcome {
    pub fn empty(stop_reason: StopReason) -> Self {
        Self {
            courses: Vec::new(),
            stop_reason,
            pages: 0,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.stop_reason == StopReason::Interrupted
    }
}

/// A catalog-specific scraper.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Platform name this adapter handles.
    fn name(&self) -> &str;

    fn supports(&self, platform: &Platform) -> bool {
        platform.is_named(self.name())
    }

    /// Walk the catalog and return candidate courses without `platform_id`.
    async fn fetch_batch(
        &self,
        platform: &Platform,
        max_pages: u32,
        cancel: &CancellationToken,
    ) -> ScrapeOutcome;
}

/// Per-source labels applied to every extracted course.
#[derive(Debug, Clone)]
pub struct RecordDefaults {
    pub provider: &'static str,
    pub free: bool,
    pub status: Option<&'static str>,
    pub price: Option<&'static str>,
}

impl RecordDefaults {
    /// Map (title, url) pairs to unsaved courses.
    pub fn build(&self, pairs: Vec<(String, String)>, areas: &AreaClassifier) -> Vec<Course> {
        pairs
            .into_iter()
            .map(|(title, url)| {
                let mut course = Course::candidate(&title, &url, self.provider);
                course.area = areas.classify(&course.title);
                course.free = self.free;
                course.status_text = self.status.map(str::to_string);
                course.price_text = self.price.map(str::to_string);
                course
            })
            .collect()
    }
}

/// Shared adapter knobs taken from configuration.
#[derive(Debug, Clone)]
pub struct AdapterSettings {
    pub http: HttpConfig,
    pub item_cap: usize,
    /// Replaces each adapter's own politeness delay
    pub page_delay: Option<Duration>,
}

impl AdapterSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            http: config.http.clone(),
            item_cap: config.scrape.item_cap.max(1),
            page_delay: config.scrape.page_delay_ms.map(Duration::from_millis),
        }
    }

    pub fn page_delay_or(&self, own: Duration) -> Duration {
        self.page_delay.unwrap_or(own)
    }
}

/// Resolves the adapter for a platform.
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in catalog adapters.
    pub fn with_defaults(settings: &AdapterSettings) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(PagedCatalog::new(evg::spec(), settings)?));
        registry.register(Arc::new(PagedCatalog::new(fgv::spec(), settings)?));
        registry.register(Arc::new(SebraeAdapter::new(settings)));
        Ok(registry)
    }

    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.push(adapter);
    }

    pub fn resolve(&self, platform: &Platform) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.iter().find(|a| a.supports(platform)).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.name().to_string()).collect()
    }
}
