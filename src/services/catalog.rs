// src/services/catalog.rs

//! Driver for catalogs paginated with a `?page=N` query parameter.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::Platform;
use crate::services::area::AreaClassifier;
use crate::services::cursor::{PageCursor, StopReason, page_cap};
use crate::services::extract::{ExtractionStrategy, PageScan, SeenCourses};
use crate::services::{AdapterSettings, RecordDefaults, ScrapeOutcome, SourceAdapter};
use crate::utils::http::{FetchFailure, HttpFetch};
use crate::utils::retry::sleep_or_cancel;

/// Everything that differs between page-indexed catalogs.
#[derive(Debug, Clone)]
pub struct CatalogSpec {
    pub name: &'static str,
    pub default_base: &'static str,
    /// Path and query prefix the page number is appended to
    pub list_path: &'static str,
    pub start_page: u32,
    /// Tried once when `start_page` shows no candidates
    pub alternate_start: Option<u32>,
    pub strategy: ExtractionStrategy,
    pub areas: AreaClassifier,
    pub defaults: RecordDefaults,
    pub page_delay: Duration,
}

/// Adapter walking a [`CatalogSpec`] with a stateless fetcher.
pub struct PagedCatalog {
    spec: CatalogSpec,
    fetch: HttpFetch,
    item_cap: usize,
    page_delay: Duration,
}

impl PagedCatalog {
    pub fn new(spec: CatalogSpec, settings: &AdapterSettings) -> Result<Self> {
        Ok(Self {
            page_delay: settings.page_delay_or(spec.page_delay),
            fetch: HttpFetch::new(&settings.http)?,
            item_cap: settings.item_cap,
            spec,
        })
    }

    pub fn spec(&self) -> &CatalogSpec {
        &self.spec
    }

    fn page_url(&self, base: &str, page: u32) -> String {
        format!("{}{}{}", base, self.spec.list_path, page)
    }

    /// Fetch one page and extract its pairs.
    async fn scan_page(
        &self,
        base: &str,
        page: u32,
        cancel: &CancellationToken,
    ) -> std::result::Result<PageScan, FetchFailure> {
        let url = self.page_url(base, page);
        let fetched = self.fetch.get(&url, cancel).await?;
        match self.spec.strategy.scan(&fetched.body, base) {
            Ok(scan) => Ok(scan),
            Err(e) => {
                log::error!("{}: extraction failed page={}: {}", self.spec.name, page, e);
                Ok(PageScan::default())
            }
        }
    }

    /// Walk the catalog from the probed start page.
    pub async fn walk(
        &self,
        platform: &Platform,
        max_pages: u32,
        cancel: &CancellationToken,
    ) -> ScrapeOutcome {
        let started = Instant::now();
        let name = self.spec.name;
        let base = platform.base_or(self.spec.default_base).to_string();
        let cap = page_cap(max_pages);

        log::info!(
            "{}: collecting base={} page_cap={} item_cap={}",
            name,
            base,
            cap,
            self.item_cap
        );

        let mut start = self.spec.start_page;
        let mut first = self.scan_page(&base, start, cancel).await;

        let probe_failed = match &first {
            Ok(scan) => scan.candidates == 0,
            Err(failure) => !failure.cancelled,
        };
        if probe_failed {
            if let Some(alternate) = self.spec.alternate_start {
                log::warn!(
                    "{}: no cards on page={}, retrying with page={}",
                    name,
                    start,
                    alternate
                );
                start = alternate;
                first = self.scan_page(&base, start, cancel).await;
            }
        }

        let first = match first {
            Ok(scan) => scan,
            Err(failure) => {
                let reason = if failure.cancelled {
                    StopReason::Interrupted
                } else {
                    StopReason::DocNull
                };
                log::warn!("{}: first page unavailable ({}), stop={}", name, failure, reason);
                return ScrapeOutcome::empty(reason);
            }
        };

        let mut cursor = PageCursor::new(start, cap, first.last_page);
        log::debug!(
            "{}: pages {}..={} (detected last={:?})",
            name,
            cursor.start(),
            cursor.last(),
            first.last_page
        );

        let mut first = Some(first);
        let mut seen = SeenCourses::default();
        let mut pages = 0;

        while let Some(page) = cursor.current() {
            let scan = match first.take() {
                Some(scan) => scan,
                None => match self.scan_page(&base, page, cancel).await {
                    Ok(scan) => scan,
                    Err(failure) => {
                        let reason = if failure.cancelled {
                            StopReason::Interrupted
                        } else {
                            StopReason::DocNull
                        };
                        log::warn!("{}: page={} unavailable: {}", name, page, failure);
                        cursor.finish(reason);
                        break;
                    }
                },
            };
            pages += 1;

            let candidates = scan.candidates;
            let added = seen.extend(scan.pairs, self.item_cap);
            log::info!(
                "{}: page={} candidates={} added={} total={}",
                name,
                page,
                candidates,
                added,
                seen.len()
            );

            if cursor
                .record(candidates, added, seen.len(), self.item_cap)
                .is_some()
            {
                break;
            }
            if !sleep_or_cancel(self.page_delay, cancel).await {
                cursor.finish(StopReason::Interrupted);
                break;
            }
        }

        let stop_reason = cursor.stop_reason().unwrap_or(StopReason::Completed);
        let courses = self.spec.defaults.build(seen.into_pairs(), &self.spec.areas);
        let took_ms = started.elapsed().as_millis();

        if courses.is_empty() {
            log::warn!("{}: no courses extracted stop={} took_ms={}", name, stop_reason, took_ms);
        } else {
            log::info!(
                "{}: extracted={} stop={} pages={} took_ms={}",
                name,
                courses.len(),
                stop_reason,
                pages,
                took_ms
            );
        }

        ScrapeOutcome {
            courses,
            stop_reason,
            pages,
        }
    }
}

#[async_trait]
impl SourceAdapter for PagedCatalog {
    fn name(&self) -> &str {
        self.spec.name
    }

    async fn fetch_batch(
        &self,
        platform: &Platform,
        max_pages: u32,
        cancel: &CancellationToken,
    ) -> ScrapeOutcome {
        self.walk(platform, max_pages, cancel).await
    }
}
