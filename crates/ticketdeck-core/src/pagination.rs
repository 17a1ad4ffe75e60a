//! Page math and the page-selector window.

use serde::Serialize;

/// `max(1, ceil(total_items / items_per_page))`.
#[must_use]
pub fn total_pages(total_items: u64, items_per_page: u32) -> u32 {
    if items_per_page == 0 || total_items == 0 {
        return 1;
    }
    let pages = total_items.div_ceil(u64::from(items_per_page));
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// Clamp `page` into `[1, total_pages]`.
#[must_use]
pub const fn clamp_page(page: u32, total_pages: u32) -> u32 {
    let upper = if total_pages == 0 { 1 } else { total_pages };
    if page < 1 {
        1
    } else if page > upper {
        upper
    } else {
        page
    }
}

/// Inclusive range of numbered buttons around `current`.
///
/// The window is centred on the current page where possible and slides to stay
/// full at either end.
#[must_use]
pub fn page_window(current: u32, total_pages: u32, width: u32) -> (u32, u32) {
    let total = total_pages.max(1);
    let width = width.max(1);
    let current = clamp_page(current, total);
    let mut start = current.saturating_sub(width / 2).max(1);
    let end = start.saturating_add(width - 1).min(total);
    if end - start < width - 1 {
        start = end.saturating_sub(width - 1).max(1);
    }
    (start, end)
}

/// Current position within the result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageState {
    pub current_page: u32,
    pub items_per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

/// What [`PageState::apply_total`] did to the current page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClampOutcome {
    InRange,
    /// The requested page no longer exists; `from` was moved down to `to`.
    Clamped { from: u32, to: u32 },
}

impl PageState {
    /// First page of an empty result set. `items_per_page` of zero is treated as one.
    #[must_use]
    pub fn new(items_per_page: u32) -> Self {
        Self {
            current_page: 1,
            items_per_page: items_per_page.max(1),
            total_items: 0,
            total_pages: 1,
        }
    }

    /// Ask for `page`. Anything below 1 becomes 1; the upper bound is checked
    /// once the response reports a total.
    pub fn request_page(&mut self, page: u32) {
        self.current_page = page.max(1);
    }

    /// Back to page 1, keeping the last known total.
    pub const fn reset(&mut self) {
        self.current_page = 1;
    }

    /// Recompute from a response total and clamp the current page.
    pub fn apply_total(&mut self, total_items: u64) -> ClampOutcome {
        self.total_items = total_items;
        self.total_pages = total_pages(total_items, self.items_per_page);
        let clamped = clamp_page(self.current_page, self.total_pages);
        if clamped == self.current_page {
            ClampOutcome::InRange
        } else {
            let from = self.current_page;
            self.current_page = clamped;
            ClampOutcome::Clamped { from, to: clamped }
        }
    }

    /// Invariant that must hold after every accepted response.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.current_page >= 1 && self.current_page <= self.total_pages
    }
}

/// One element of the page selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageButton {
    Page { number: u32, current: bool },
    Ellipsis,
}

/// Renderable page selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaginationView {
    pub current_page: u32,
    pub total_pages: u32,
    pub has_previous: bool,
    pub has_next: bool,
    pub buttons: Vec<PageButton>,
}

impl PaginationView {
    /// Build the selector for `state`, or `None` when there is a single page.
    #[must_use]
    pub fn for_state(state: &PageState, width: u32) -> Option<Self> {
        let total = state.total_pages.max(1);
        if total <= 1 {
            return None;
        }
        let current = clamp_page(state.current_page, total);
        let (start, end) = page_window(current, total, width);
        let page = |number| PageButton::Page {
            number,
            current: number == current,
        };

        // window plus first/last and two ellipses
        let shown = usize::try_from(end - start + 1).unwrap_or(0);
        let mut buttons = Vec::with_capacity(shown + 4);
        if start > 1 {
            buttons.push(page(1));
            if start > 2 {
                buttons.push(PageButton::Ellipsis);
            }
        }
        buttons.extend((start..=end).map(page));
        if end < total {
            if end < total - 1 {
                buttons.push(PageButton::Ellipsis);
            }
            buttons.push(page(total));
        }

        Some(Self {
            current_page: current,
            total_pages: total,
            has_previous: current > 1,
            has_next: current < total,
            buttons,
        })
    }

    /// Compact text form such as `[1] 2 3 4 5 … 10`.
    #[must_use]
    pub fn label(&self) -> String {
        self.buttons
            .iter()
            .map(|button| match button {
                PageButton::Page {
                    number,
                    current: true,
                } => format!("[{number}]"),
                PageButton::Page { number, .. } => number.to_string(),
                PageButton::Ellipsis => "…".to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}
