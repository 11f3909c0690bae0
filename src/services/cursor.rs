// src/services/cursor.rs

//! Explicit pagination state for page-indexed catalogs.

use std::fmt;

/// Smallest page budget an adapter will use.
pub const PAGE_CAP_MIN: u32 = 5;
/// Largest page budget an adapter will use.
pub const PAGE_CAP_MAX: u32 = 200;

/// Why an adapter stopped walking a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// Walked up to the last page
    Completed,
    /// The page could not be fetched
    DocNull,
    /// No candidate elements on the page
    NoCards,
    /// Page had candidates but none were new
    AddedZero,
    /// Item cap reached
    ItemCap,
    /// Run was cancelled
    Interrupted,
    /// Consecutive failed fetches on a render-more endpoint
    NullDocStreak,
    /// Consecutive responses with nothing new on a render-more endpoint
    NoNewCardsStreak,
    /// Server reported no more items, or the reported total was reached
    HasNextFalse,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::DocNull => "doc-null",
            Self::NoCards => "no-cards",
            Self::AddedZero => "added-zero",
            Self::ItemCap => "item-cap",
            Self::Interrupted => "interrupted",
            Self::NullDocStreak => "null-doc-streak",
            Self::NoNewCardsStreak => "no-new-cards-streak",
            Self::HasNextFalse => "has-next-false",
        }
    }

    /// True when the batch may be incomplete because of a fetch problem.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, Self::DocNull | Self::NullDocStreak)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clamp a caller-supplied page budget into the safety range.
pub fn page_cap(max_pages: u32) -> u32 {
    max_pages.clamp(PAGE_CAP_MIN, PAGE_CAP_MAX)
}

/// Walks `start..=last` and records why the walk ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    start: u32,
    current: u32,
    last: u32,
    stop: Option<StopReason>,
}

impl PageCursor {
    /// Cursor over `cap` pages from `start`, optionally bounded by a detected last page.
    pub fn new(start: u32, cap: u32, detected_last: Option<u32>) -> Self {
        let fallback = start + cap.max(1) - 1;
        let last = match detected_last {
            Some(last) => last.min(fallback),
            None => fallback,
        };
        Self {
            start,
            current: start,
            last,
            stop: None,
        }
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn last(&self) -> u32 {
        self.last
    }

    /// Page to fetch next, or `None` once the walk is over.
    pub fn current(&self) -> Option<u32> {
        if self.stop.is_some() || self.current > self.last {
            None
        } else {
            Some(self.current)
        }
    }

    pub fn is_first(&self) -> bool {
        self.current == self.start
    }

    /// Record the result of the current page and advance.
    ///
    /// `candidates` counts matched elements, `added` the pairs that were new
    /// to this run and `total` the distinct items collected so far.
    pub fn record(
        &mut self,
        candidates: usize,
        added: usize,
        total: usize,
        item_cap: usize,
    ) -> Option<StopReason> {
        if self.stop.is_some() {
            return self.stop;
        }
        if candidates == 0 {
            return self.finish(StopReason::NoCards);
        }
        if total >= item_cap {
            return self.finish(StopReason::ItemCap);
        }
        if added == 0 && self.current > self.start {
            return self.finish(StopReason::AddedZero);
        }
        self.current += 1;
        if self.current > self.last {
            return self.finish(StopReason::Completed);
        }
        None
    }

    /// End the walk early.
    pub fn finish(&mut self, reason: StopReason) -> Option<StopReason> {
        self.stop.get_or_insert(reason);
        self.stop
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_cap_is_clamped() {
        assert_eq!(page_cap(0), 5);
        assert_eq!(page_cap(30), 30);
        assert_eq!(page_cap(10_000), 200);
    }

    #[test]
    fn fallback_last_page_uses_cap() {
        assert_eq!(PageCursor::new(1, 5, None).last(), 5);
        assert_eq!(PageCursor::new(0, 5, None).last(), 4);
    }

    #[test]
    fn detected_last_page_is_capped() {
        assert_eq!(PageCursor::new(0, 10, Some(3)).last(), 3);
        assert_eq!(PageCursor::new(0, 10, Some(99)).last(), 9);
    }

    #[test]
    fn empty_page_stops_walk() {
        let mut cursor = PageCursor::new(0, 10, None);
        assert_eq!(cursor.record(20, 20, 20, 100), None);
        assert_eq!(cursor.current(), Some(1));
        assert_eq!(cursor.record(0, 0, 20, 100), Some(StopReason::NoCards));
        assert_eq!(cursor.current(), None);
    }

    #[test]
    fn zero_added_only_stops_after_first_page() {
        let mut cursor = PageCursor::new(1, 10, None);
        assert_eq!(cursor.record(5, 0, 0, 100), None);
        assert_eq!(cursor.record(5, 0, 0, 100), Some(StopReason::AddedZero));
    }

    #[test]
    fn item_cap_wins_over_progress() {
        let mut cursor = PageCursor::new(0, 10, None);
        assert_eq!(cursor.record(20, 20, 20, 20), Some(StopReason::ItemCap));
    }

    #[test]
    fn walk_completes_at_last_page() {
        let mut cursor = PageCursor::new(0, 5, Some(1));
        assert_eq!(cursor.record(3, 3, 3, 100), None);
        assert_eq!(cursor.record(3, 3, 6, 100), Some(StopReason::Completed));
    }

    #[test]
    fn first_stop_reason_sticks() {
        let mut cursor = PageCursor::new(0, 5, None);
        cursor.finish(StopReason::Interrupted);
        assert_eq!(cursor.finish(StopReason::DocNull), Some(StopReason::Interrupted));
        assert_eq!(cursor.record(10, 10, 10, 100), Some(StopReason::Interrupted));
    }
}
