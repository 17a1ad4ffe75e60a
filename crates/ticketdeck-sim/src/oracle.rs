use std::fmt;

use serde::Serialize;

// ── Core result types ─────────────────────────────────────────────────────────

/// Outcome of the invariant checks for one simulated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OracleResult {
    pub passed: bool,
    pub violations: Vec<InvariantViolation>,
}

impl OracleResult {
    #[must_use]
    pub const fn pass() -> Self {
        Self {
            passed: true,
            violations: Vec::new(),
        }
    }

    #[must_use]
    pub fn fail(violation: InvariantViolation) -> Self {
        Self {
            passed: false,
            violations: vec![violation],
        }
    }

    /// Merge another result into this one (failures accumulate).
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        if !other.passed {
            self.passed = false;
            self.violations.extend(other.violations);
        }
        self
    }
}

// ── Invariant violation diagnostics ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "invariant", rename_all = "snake_case")]
pub enum InvariantViolation {
    /// A list was rendered from a response that was not the latest issued.
    StaleRender { rendered_seq: u64, latest_seq: u64 },

    /// After an accepted response the page was outside `[1, total_pages]`.
    PageOutOfRange {
        at_ms: u64,
        current_page: u32,
        total_pages: u32,
    },

    /// More debounced fetches fired than there were quiet windows of typing.
    DebounceOverfired { fired: u64, windows: u64 },

    /// The engine's filters differ from the last value set per field.
    FilterDrift { expected: String, actual: String },

    /// After quiescence the rendered list differs from what the server says.
    FinalView {
        expected_ids: Vec<u64>,
        rendered_ids: Vec<u64>,
        expected_total: u64,
        rendered_total: u64,
    },

    /// The location does not carry the canonical non-default filters.
    LocationOutOfSync { expected: String, actual: String },

    /// Timers or messages were still pending when the session should have settled.
    NotQuiescent { pending_messages: usize, next_deadline: Option<u64> },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StaleRender {
                rendered_seq,
                latest_seq,
            } => write!(
                f,
                "StaleRender: rendered #{rendered_seq} while #{latest_seq} was the latest request"
            ),
            Self::PageOutOfRange {
                at_ms,
                current_page,
                total_pages,
            } => write!(
                f,
                "PageOutOfRange: page {current_page} of {total_pages} at {at_ms}ms"
            ),
            Self::DebounceOverfired { fired, windows } => write!(
                f,
                "DebounceOverfired: {fired} debounced fetches for {windows} typing windows"
            ),
            Self::FilterDrift { expected, actual } => {
                write!(f, "FilterDrift: expected {expected}, engine has {actual}")
            }
            Self::FinalView {
                expected_ids,
                rendered_ids,
                expected_total,
                rendered_total,
            } => write!(
                f,
                "FinalView: expected {expected_ids:?} (total {expected_total}), \
                 rendered {rendered_ids:?} (total {rendered_total})"
            ),
            Self::LocationOutOfSync { expected, actual } => {
                write!(f, "LocationOutOfSync: expected `{expected}`, location is `{actual}`")
            }
            Self::NotQuiescent {
                pending_messages,
                next_deadline,
            } => write!(
                f,
                "NotQuiescent: {pending_messages} messages in flight, next deadline {next_deadline:?}"
            ),
        }
    }
}

// ── Checks ────────────────────────────────────────────────────────────────────

/// Everything the simulator observed that the oracle needs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Observations {
    pub stale_renders: Vec<(u64, u64)>,
    pub page_violations: Vec<(u64, u32, u32)>,
    pub debounce_fired: u64,
    pub text_windows: u64,
    pub expected_filters: String,
    pub actual_filters: String,
    pub expected_ids: Vec<u64>,
    pub expected_total: u64,
    pub rendered: Option<(Vec<u64>, u64)>,
    pub expected_location: String,
    pub actual_location: String,
    pub pending_messages: usize,
    pub next_deadline: Option<u64>,
}

pub struct SessionOracle;

impl SessionOracle {
    #[must_use]
    pub fn check_all(observed: &Observations) -> OracleResult {
        Self::check_no_stale_render(observed)
            .merge(Self::check_page_range(observed))
            .merge(Self::check_debounce(observed))
            .merge(Self::check_filters(observed))
            .merge(Self::check_quiescent(observed))
            .merge(Self::check_final_view(observed))
            .merge(Self::check_location(observed))
    }

    #[must_use]
    pub fn check_no_stale_render(observed: &Observations) -> OracleResult {
        observed
            .stale_renders
            .iter()
            .map(|&(rendered_seq, latest_seq)| {
                OracleResult::fail(InvariantViolation::StaleRender {
                    rendered_seq,
                    latest_seq,
                })
            })
            .fold(OracleResult::pass(), OracleResult::merge)
    }

    #[must_use]
    pub fn check_page_range(observed: &Observations) -> OracleResult {
        observed
            .page_violations
            .iter()
            .map(|&(at_ms, current_page, total_pages)| {
                OracleResult::fail(InvariantViolation::PageOutOfRange {
                    at_ms,
                    current_page,
                    total_pages,
                })
            })
            .fold(OracleResult::pass(), OracleResult::merge)
    }

    #[must_use]
    pub fn check_debounce(observed: &Observations) -> OracleResult {
        if observed.debounce_fired > observed.text_windows {
            return OracleResult::fail(InvariantViolation::DebounceOverfired {
                fired: observed.debounce_fired,
                windows: observed.text_windows,
            });
        }
        OracleResult::pass()
    }

    #[must_use]
    pub fn check_filters(observed: &Observations) -> OracleResult {
        if observed.expected_filters != observed.actual_filters {
            return OracleResult::fail(InvariantViolation::FilterDrift {
                expected: observed.expected_filters.clone(),
                actual: observed.actual_filters.clone(),
            });
        }
        OracleResult::pass()
    }

    #[must_use]
    pub fn check_quiescent(observed: &Observations) -> OracleResult {
        if observed.pending_messages > 0 || observed.next_deadline.is_some() {
            return OracleResult::fail(InvariantViolation::NotQuiescent {
                pending_messages: observed.pending_messages,
                next_deadline: observed.next_deadline,
            });
        }
        OracleResult::pass()
    }

    #[must_use]
    pub fn check_final_view(observed: &Observations) -> OracleResult {
        let (rendered_ids, rendered_total) = observed
            .rendered
            .clone()
            .unwrap_or_else(|| (Vec::new(), u64::MAX));
        if rendered_ids != observed.expected_ids || rendered_total != observed.expected_total {
            return OracleResult::fail(InvariantViolation::FinalView {
                expected_ids: observed.expected_ids.clone(),
                rendered_ids,
                expected_total: observed.expected_total,
                rendered_total,
            });
        }
        OracleResult::pass()
    }

    #[must_use]
    pub fn check_location(observed: &Observations) -> OracleResult {
        if observed.expected_location != observed.actual_location {
            return OracleResult::fail(InvariantViolation::LocationOutOfSync {
                expected: observed.expected_location.clone(),
                actual: observed.actual_location.clone(),
            });
        }
        OracleResult::pass()
    }
}
