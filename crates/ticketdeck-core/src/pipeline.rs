//! Request building and the sequence guard.
//!
//! Every issued request gets the next [`RequestSeq`]. Only the response for
//! the most recently issued sequence is accepted; anything older is stale and
//! must not touch the rendered list.

use std::fmt;

use serde::Serialize;
use url::form_urlencoded;

use crate::filter::FilterState;

/// Monotonically increasing request sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct RequestSeq(pub u64);

impl RequestSeq {
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for RequestSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One list request, as handed to the [`TicketSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub seq: RequestSeq,
    pub filter: FilterState,
    pub page: u32,
    pub per_page: u32,
}

impl FetchRequest {
    /// Query parameters in wire order.
    ///
    /// `status` and `sort` are always sent (`status=all` included, the server
    /// expects it); free text only when non-empty; `overdue` only when set.
    #[must_use]
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("status", self.filter.status.as_str().to_string()),
            ("sort", self.filter.sort.as_str().to_string()),
        ];
        if !self.filter.query.is_empty() {
            params.push(("q", self.filter.query.clone()));
        }
        if !self.filter.author.is_empty() {
            params.push(("author", self.filter.author.clone()));
        }
        if self.filter.overdue_only {
            params.push(("overdue", "1".to_string()));
        }
        params.push(("page", self.page.to_string()));
        params.push(("per_page", self.per_page.to_string()));
        params
    }

    /// URL-encoded form of [`FetchRequest::params`].
    #[must_use]
    pub fn query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.params())
            .finish()
    }
}

/// Remote data source.
///
/// `fetch` starts a request and returns immediately; the host delivers the
/// result later through [`crate::Engine::on_fetch_response`] with the same
/// sequence number.
pub trait TicketSource {
    fn fetch(&mut self, request: &FetchRequest);
}

/// How a completed response relates to the latest issued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settle {
    /// The response for the newest request. Render it.
    Current,
    /// A newer request was issued meanwhile. Drop it.
    Stale,
    /// Never issued, or already settled. Drop it.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PipelineStats {
    pub issued: u64,
    pub accepted: u64,
    pub stale: u64,
}

/// Sequence bookkeeping for in-flight list requests.
#[derive(Debug, Default)]
pub struct FetchPipeline {
    last_issued: RequestSeq,
    /// Latest sequence still waiting for its response.
    outstanding: Option<RequestSeq>,
    stats: PipelineStats,
}

impl FetchPipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next sequence and mark it outstanding.
    pub fn issue(&mut self) -> RequestSeq {
        self.last_issued = self.last_issued.next();
        self.outstanding = Some(self.last_issued);
        self.stats.issued += 1;
        self.last_issued
    }

    /// Classify a completed response.
    pub fn settle(&mut self, seq: RequestSeq) -> Settle {
        if seq > self.last_issued || seq.0 == 0 {
            return Settle::Unknown;
        }
        if self.outstanding == Some(seq) {
            self.outstanding = None;
            self.stats.accepted += 1;
            return Settle::Current;
        }
        if seq == self.last_issued {
            // the latest response was already delivered once
            return Settle::Unknown;
        }
        self.stats.stale += 1;
        Settle::Stale
    }

    /// True while the latest request has no response yet.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        self.outstanding.is_some()
    }

    #[must_use]
    pub const fn last_issued(&self) -> RequestSeq {
        self.last_issued
    }

    #[must_use]
    pub const fn stats(&self) -> PipelineStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{SortKey, StatusFilter};

    #[test]
    fn params_always_carry_status_sort_and_page() {
        let request = FetchRequest {
            seq: RequestSeq(1),
            filter: FilterState::default(),
            page: 1,
            per_page: 10,
        };
        assert_eq!(
            request.query_string(),
            "status=all&sort=recent&page=1&per_page=10"
        );
    }

    #[test]
    fn params_include_set_fields() {
        let request = FetchRequest {
            seq: RequestSeq(4),
            filter: FilterState {
                status: StatusFilter::Only("en_cours".into()),
                sort: SortKey::Deadline,
                query: "disk full".into(),
                author: "mara".into(),
                overdue_only: true,
            },
            page: 3,
            per_page: 25,
        };
        assert_eq!(
            request.query_string(),
            "status=en_cours&sort=deadline&q=disk+full&author=mara&overdue=1&page=3&per_page=25"
        );
    }

    #[test]
    fn latest_response_wins() {
        let mut pipeline = FetchPipeline::new();
        let first = pipeline.issue();
        let second = pipeline.issue();
        assert!(pipeline.is_busy());

        assert_eq!(pipeline.settle(second), Settle::Current);
        assert!(!pipeline.is_busy());
        assert_eq!(pipeline.settle(first), Settle::Stale);

        let stats = pipeline.stats();
        assert_eq!((stats.issued, stats.accepted, stats.stale), (2, 1, 1));
    }

    #[test]
    fn late_old_response_keeps_busy_flag() {
        let mut pipeline = FetchPipeline::new();
        let first = pipeline.issue();
        let _second = pipeline.issue();
        assert_eq!(pipeline.settle(first), Settle::Stale);
        assert!(pipeline.is_busy());
    }

    #[test]
    fn duplicate_and_unknown_responses_are_dropped() {
        let mut pipeline = FetchPipeline::new();
        let seq = pipeline.issue();
        assert_eq!(pipeline.settle(seq), Settle::Current);
        assert_eq!(pipeline.settle(seq), Settle::Unknown);
        assert_eq!(pipeline.settle(RequestSeq(99)), Settle::Unknown);
        assert_eq!(pipeline.settle(RequestSeq(0)), Settle::Unknown);
    }
}
