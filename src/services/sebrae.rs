// src/services/sebrae.rs

//! Small-business portal whose listing is served by a "render more" component.
//!
//! Instead of a page index the endpoint takes the number of cards to render
//! (`qtd`), growing by [`STEP`] per call. Hidden inputs `#qtd`, `#total` and
//! `#hasNext` in each response report the server's view of the listing.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use scraper::Html;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::Platform;
use crate::services::area::AreaClassifier;
use crate::services::cursor::StopReason;
use crate::services::extract::{ExtractionStrategy, SeenCourses, parse_selector};
use crate::services::{AdapterSettings, RecordDefaults, ScrapeOutcome, SourceAdapter};
use crate::utils::http::HttpSession;
use crate::utils::retry::sleep_or_cancel;

pub const NAME: &str = "sebrae";
pub const DEFAULT_BASE: &str = "https://www.sebrae.com.br";

const COMPONENT_ID: &str = "3263d864e639a610VgnVCM1000004c00210aRCRD";
const INITIAL_QTD: u32 = 24;
pub const STEP: u32 = 12;
const STREAK_CAP: u32 = 2;
const PAGE_DELAY: Duration = Duration::from_millis(320);

const DEFAULTS: RecordDefaults = RecordDefaults {
    provider: "Sebrae",
    free: true,
    status: Some("Online (EAD)"),
    price: None,
};

/// Item budget derived from the caller's page budget.
pub fn max_items(max_pages: u32) -> usize {
    let pages = max_pages.clamp(1, 50) as usize;
    (pages * 60).max(STEP as usize)
}

/// Values reported by one render-more response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderState {
    pub qtd: Option<u32>,
    pub total: Option<usize>,
    pub has_next: bool,
    pub candidates: usize,
    pub pairs: Vec<(String, String)>,
}

fn strategy() -> ExtractionStrategy {
    ExtractionStrategy::new([
        r#"#list-cards .sb-components__card a[href^="/sites/PortalSebrae/cursosonline/"]"#,
        r#".card a[href*="/sites/PortalSebrae/cursosonline/"]"#,
    ])
}

fn hidden_value(doc: &Html, id: &str) -> Option<String> {
    let selector = parse_selector(id).ok()?;
    doc.select(&selector)
        .next()
        .and_then(|el| el.value().attr("value"))
        .map(|v| v.trim().to_string())
}

/// Parse one render-more response.
pub fn parse_render(body: &str, base: &str) -> Result<RenderState> {
    let doc = Html::parse_document(body);
    let scan = strategy().extract(&doc, base)?;

    let qtd = hidden_value(&doc, "#qtd").and_then(|v| v.parse().ok());
    let total = hidden_value(&doc, "#total").and_then(|v| v.parse().ok());
    // Absent flag means "keep going"; the streak and item caps still bound the walk.
    let has_next = hidden_value(&doc, "#hasNext")
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(true);

    Ok(RenderState {
        qtd,
        total,
        has_next,
        candidates: scan.candidates,
        pairs: scan.pairs,
    })
}

/// Adapter for the render-more listing, using a cookie session per run.
pub struct SebraeAdapter {
    settings: AdapterSettings,
    page_delay: Duration,
}

impl SebraeAdapter {
    pub fn new(settings: &AdapterSettings) -> Self {
        Self {
            page_delay: settings.page_delay_or(PAGE_DELAY),
            settings: settings.clone(),
        }
    }

    fn render_url(base: &str, qtd: u32) -> String {
        let cache_buster = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        format!(
            "{base}/sites/render/component?vgnextcomponentid={COMPONENT_ID}\
             &qtd={qtd}&order=2&filters=&_cb={cache_buster}"
        )
    }

    async fn walk(
        &self,
        platform: &Platform,
        max_pages: u32,
        cancel: &CancellationToken,
    ) -> ScrapeOutcome {
        let started = Instant::now();
        let base = platform.base_or(DEFAULT_BASE).to_string();
        let item_cap = max_items(max_pages).min(self.settings.item_cap);

        log::info!("{}: collecting base={} item_cap={}", NAME, base, item_cap);

        let session = match HttpSession::new(&self.settings.http) {
            Ok(session) => session,
            Err(e) => {
                log::error!("{}: cannot build session: {}", NAME, e);
                return ScrapeOutcome::empty(StopReason::DocNull);
            }
        };
        session.warm_up(&format!("{base}/"), cancel).await;
        session
            .warm_up(&format!("{base}/sites/PortalSebrae/cursosonline"), cancel)
            .await;

        let mut seen = SeenCourses::default();
        let mut qtd = INITIAL_QTD;
        let mut reported_total: Option<usize> = None;
        let mut streak = 0;
        let mut calls = 0;

        let stop_reason = loop {
            if cancel.is_cancelled() {
                break StopReason::Interrupted;
            }

            let url = Self::render_url(&base, qtd);
            let page = match session.get(&url, cancel).await {
                Ok(page) => page,
                Err(failure) if failure.cancelled => break StopReason::Interrupted,
                Err(failure) => {
                    log::warn!("{}: render failed qtd={}: {}", NAME, qtd, failure);
                    streak += 1;
                    if streak >= STREAK_CAP {
                        break StopReason::NullDocStreak;
                    }
                    continue;
                }
            };
            calls += 1;

            let state = match parse_render(&page.body, &base) {
                Ok(state) => state,
                Err(e) => {
                    log::error!("{}: extraction failed qtd={}: {}", NAME, qtd, e);
                    break StopReason::NoCards;
                }
            };
            if reported_total.is_none() {
                reported_total = state.total;
            }
            if state.candidates == 0 {
                log::warn!("{}: no course anchors in response qtd={}", NAME, qtd);
            }

            let added = seen.extend(state.pairs, item_cap);
            log::info!(
                "{}: qtd={} reported_qtd={:?} reported_total={:?} added={} total={} has_next={}",
                NAME,
                qtd,
                state.qtd,
                reported_total,
                added,
                seen.len(),
                state.has_next
            );

            if added == 0 {
                streak += 1;
                if streak >= STREAK_CAP {
                    break StopReason::NoNewCardsStreak;
                }
            } else {
                streak = 0;
            }

            let below_total = reported_total.is_none_or(|total| seen.len() < total);
            if !(state.has_next && below_total) {
                break StopReason::HasNextFalse;
            }
            if seen.len() >= item_cap {
                log::warn!("{}: reached item_cap={}", NAME, item_cap);
                break StopReason::ItemCap;
            }

            qtd += STEP;
            if !sleep_or_cancel(self.page_delay, cancel).await {
                break StopReason::Interrupted;
            }
        };

        let courses = DEFAULTS.build(seen.into_pairs(), &AreaClassifier::standard());
        log::info!(
            "{}: extracted={} reported_total={:?} stop={} calls={} took_ms={}",
            NAME,
            courses.len(),
            reported_total,
            stop_reason,
            calls,
            started.elapsed().as_millis()
        );

        ScrapeOutcome {
            courses,
            stop_reason,
            pages: calls,
        }
    }
}

#[async_trait]
impl SourceAdapter for SebraeAdapter {
    fn name(&self) -> &str {
        NAME
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
