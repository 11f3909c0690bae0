// src/services/extract.rs

//! Pluggable (title, url) extraction over uncontrolled catalog markup.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};
use crate::utils::{abs_url, normalize_whitespace};

static PAGE_PARAM: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"page=([^&#]*)").ok());

/// Parse a CSS selector, reporting the offending text on failure.
pub fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

/// One structural selector. Matched elements that are not anchors
/// contribute their first `a[href]` descendant.
#[derive(Debug, Clone)]
pub struct SelectorRule {
    pub selector: String,
}

impl SelectorRule {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
        }
    }
}

/// Where to look for a title when the anchor text is too short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleFallback {
    None,
    /// Closest `h3`, then `h2`, found under the anchor's ancestors
    Headings { min_chars: usize },
}

/// Ordered selector rules; the first rule producing pairs wins.
#[derive(Debug, Clone)]
pub struct ExtractionStrategy {
    pub rules: Vec<SelectorRule>,
    /// Filter on the raw `href` attribute
    pub href_filter: Option<fn(&str) -> bool>,
    pub title_fallback: TitleFallback,
    /// Pager anchors scanned for the last page number
    pub pager_selector: String,
}

impl ExtractionStrategy {
    pub fn new<I, S>(rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rules: rules.into_iter().map(SelectorRule::new).collect(),
            href_filter: None,
            title_fallback: TitleFallback::None,
            pager_selector: r#"ul.pagination a[href*="page="]"#.into(),
        }
    }

    pub fn with_href_filter(mut self, filter: fn(&str) -> bool) -> Self {
        self.href_filter = Some(filter);
        self
    }

    pub fn with_title_fallback(mut self, fallback: TitleFallback) -> Self {
        self.title_fallback = fallback;
        self
    }

    /// Extract pairs from a parsed page.
    pub fn extract(&self, doc: &Html, base: &str) -> Result<PageScan> {
        let mut first_candidates = 0;

        for rule in &self.rules {
            let selector = parse_selector(&rule.selector)?;
            let elements: Vec<ElementRef> = doc.select(&selector).collect();
            if elements.is_empty() {
                continue;
            }
            if first_candidates == 0 {
                first_candidates = elements.len();
            }

            let pairs: Vec<(String, String)> = elements
                .into_iter()
                .filter_map(|el| self.pair_from(el, base))
                .collect();
            if !pairs.is_empty() {
                return Ok(PageScan {
                    candidates: first_candidates.max(pairs.len()),
                    pairs,
                    last_page: None,
                });
            }
        }

        Ok(PageScan {
            candidates: first_candidates,
            pairs: Vec::new(),
            last_page: None,
        })
    }

    /// Parse `body`, extract pairs and detect the last page in one pass.
    pub fn scan(&self, body: &str, base: &str) -> Result<PageScan> {
        let doc = Html::parse_document(body);
        let mut scan = self.extract(&doc, base)?;
        scan.last_page = detect_last_page(&doc, &self.pager_selector)?;
        Ok(scan)
    }

    fn pair_from(&self, el: ElementRef, base: &str) -> Option<(String, String)> {
        let anchor = if el.value().name().eq_ignore_ascii_case("a") {
            el
        } else {
            let a = parse_selector("a[href]").ok()?;
            el.select(&a).next()?
        };

        let href = anchor.value().attr("href")?.trim();
        if href.is_empty() {
            return None;
        }
        if let Some(filter) = self.href_filter {
            if !filter(href) {
                return None;
            }
        }

        let url = abs_url(base, href);
        let mut title = element_text(anchor);
        if let TitleFallback::Headings { min_chars } = self.title_fallback {
            if title.chars().count() < min_chars {
                if let Some(heading) = heading_title(anchor, min_chars) {
                    title = heading;
                }
            }
        }

        if url.is_empty() || title.is_empty() {
            None
        } else {
            Some((title, url))
        }
    }
}

/// Result of extracting one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageScan {
    /// Elements matched by the winning (or first matching) rule
    pub candidates: usize,
    /// (title, absolute url) pairs in document order
    pub pairs: Vec<(String, String)>,
    /// Highest page number linked from the pager, if any
    pub last_page: Option<u32>,
}

fn element_text(el: ElementRef) -> String {
    normalize_whitespace(&el.text().collect::<String>())
}

fn heading_title(anchor: ElementRef, min_chars: usize) -> Option<String> {
    for tag in ["h3", "h2"] {
        let selector = parse_selector(tag).ok()?;
        let found = anchor
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find_map(|ancestor| ancestor.select(&selector).next());
        if let Some(heading) = found {
            let text = element_text(heading);
            if text.chars().count() > min_chars {
                return Some(text);
            }
        }
    }
    None
}

/// Highest numeric `page=` value among pager anchors.
pub fn detect_last_page(doc: &Html, pager_selector: &str) -> Result<Option<u32>> {
    let selector = parse_selector(pager_selector)?;
    let Some(page_param) = PAGE_PARAM.as_ref() else {
        return Ok(None);
    };
    let last = doc
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| page_param.captures_iter(href).last())
        .filter_map(|caps| {
            let digits: String = caps[1].chars().filter(char::is_ascii_digit).collect();
            digits.parse::<u32>().ok()
        })
        .max();
    Ok(last)
}

/// Distinct (url → title) pairs in first-seen order.
#[derive(Debug, Default)]
pub struct SeenCourses {
    order: Vec<(String, String)>,
    urls: HashSet<String>,
}

impl SeenCourses {
    /// Insert pairs until `cap` distinct URLs are held. Returns how many were new.
    pub fn extend(&mut self, pairs: Vec<(String, String)>, cap: usize) -> usize {
        let mut added = 0;
        for (title, url) in pairs {
            if self.order.len() >= cap {
                break;
            }
            if self.urls.insert(url.clone()) {
                self.order.push((title, url));
                added += 1;
            }
        }
        added
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn into_pairs(self) -> Vec<(String, String)> {
        self.order
    }
}
