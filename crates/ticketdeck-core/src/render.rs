//! Render sink and ticket view mapping.
//!
//! The engine never builds markup. It hands the sink a list of [`TicketView`]s
//! whose free-text fields are already HTML-escaped, plus the pagination block.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::TicketRecord;
use crate::pagination::PaginationView;
use crate::pipeline::RequestSeq;

/// Where the engine's output goes.
pub trait RenderSink {
    /// A request for the current filter is in flight. Stale content stays visible.
    fn set_busy(&mut self, busy: bool);

    /// Replace the whole list.
    fn render_list(&mut self, list: &RenderedList);

    /// Replace the list with an inline error.
    fn render_error(&mut self, message: &str);

    /// Transient notice (toast) or alert.
    fn notify(&mut self, notice: &Notice);

    /// After a page change.
    fn scroll_to_top(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
    /// Blocking alert; used for failed status changes.
    Alert,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// Deadline as shown on a ticket card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeadlineView {
    pub at: String,
    pub countdown: String,
    pub overdue: bool,
}

/// Display-ready ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketView {
    pub id: u64,
    pub title: String,
    pub content: String,
    pub status: String,
    pub status_label: String,
    pub author: String,
    pub priority: Option<String>,
    pub created: String,
    pub deadline: Option<DeadlineView>,
    pub admin_response: Option<String>,
}

impl TicketView {
    /// Map a record, computing the deadline countdown against `now`.
    #[must_use]
    pub fn from_record(record: &TicketRecord, now: DateTime<Utc>) -> Self {
        Self {
            id: record.id,
            title: escape_html(&record.title),
            content: escape_html(&record.content),
            status: escape_html(&record.status),
            status_label: escape_html(status_label(&record.status)),
            author: escape_html(&record.author.username),
            priority: record.priority.as_deref().map(escape_html),
            created: record.created_at.format("%Y-%m-%d %H:%M").to_string(),
            deadline: record.deadline.map(|deadline| DeadlineView {
                at: deadline.format("%Y-%m-%d %H:%M").to_string(),
                countdown: format_countdown(deadline, now),
                overdue: record.is_overdue(now),
            }),
            admin_response: record.admin_response.as_deref().map(escape_html),
        }
    }
}

/// One render pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedList {
    pub seq: RequestSeq,
    pub tickets: Vec<TicketView>,
    /// `None` when everything fits on one page.
    pub pagination: Option<PaginationView>,
    pub total_items: u64,
}

/// Human label for the known status values; anything else is shown as-is.
/// Callers building views escape the result.
#[must_use]
pub fn status_label(status: &str) -> &str {
    match status {
        "en_attente" => "Pending",
        "en_cours" => "In progress",
        "resolu" => "Resolved",
        other => other,
    }
}

/// `"{d}d {h}h left"`, or `"overdue by {d}d {h}h"` once the deadline has passed.
#[must_use]
pub fn format_countdown(deadline: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds_left = (deadline - now).num_seconds();
    let magnitude = seconds_left.unsigned_abs();
    let days = magnitude / 86_400;
    let hours = (magnitude % 86_400) / 3_600;
    if seconds_left >= 0 {
        format!("{days}d {hours}h left")
    } else {
        format!("overdue by {days}d {hours}h")
    }
}

#[must_use]
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
