//! Filter state store.
//!
//! Holds the current value of every filter/sort dimension. All other parts of
//! the engine read from here; every change is published to subscribers with
//! the set of fields that actually changed.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Field values
// ---------------------------------------------------------------------------

/// Status dimension: everything, or one status value.
///
/// Status values are not validated here; the data source decides what exists.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StatusFilter {
    #[default]
    All,
    Only(String),
}

impl StatusFilter {
    /// Parse a raw control value. Blank and `all` (any case) mean [`StatusFilter::All`].
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            Self::All
        } else {
            Self::Only(trimmed.to_string())
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::All => "all",
            Self::Only(status) => status,
        }
    }

    /// True for [`StatusFilter::All`] and for any `Only` value that parses to it.
    #[must_use]
    pub fn is_all(&self) -> bool {
        match self {
            Self::All => true,
            Self::Only(raw) => {
                let trimmed = raw.trim();
                trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all")
            }
        }
    }

    /// Canonical form, as if the value had come through [`StatusFilter::parse`].
    #[must_use]
    pub fn normalized(self) -> Self {
        match self {
            Self::All => Self::All,
            Self::Only(raw) => Self::parse(&raw),
        }
    }
}

impl From<String> for StatusFilter {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<StatusFilter> for String {
    fn from(status: StatusFilter) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort order for the ticket list.
///
/// Unknown values are kept verbatim in [`SortKey::Other`] and forwarded to the
/// data source untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SortKey {
    /// Newest first.
    #[default]
    Recent,
    /// Oldest first.
    Oldest,
    /// Nearest deadline first.
    Deadline,
    Other(String),
}

impl SortKey {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "" | "recent" => Self::Recent,
            "oldest" => Self::Oldest,
            "deadline" => Self::Deadline,
            other => Self::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Recent => "recent",
            Self::Oldest => "oldest",
            Self::Deadline => "deadline",
            Self::Other(raw) => raw,
        }
    }
}

impl SortKey {
    /// Canonical form, as if the value had come through [`SortKey::parse`].
    #[must_use]
    pub fn normalized(self) -> Self {
        match self {
            Self::Other(raw) => Self::parse(&raw),
            known => known,
        }
    }
}

impl From<String> for SortKey {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<SortKey> for String {
    fn from(sort: SortKey) -> Self {
        sort.as_str().to_string()
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checkbox coercion: `1`, `true`, `on`, `yes` (any case) are checked.
#[must_use]
pub fn coerce_checkbox(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}

// ---------------------------------------------------------------------------
// FilterState
// ---------------------------------------------------------------------------

/// The user-selected filter and sort criteria.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterState {
    pub status: StatusFilter,
    pub sort: SortKey,
    /// Free text matched against title and body.
    pub query: String,
    /// Free text matched against the author's username.
    pub author: String,
    pub overdue_only: bool,
}

impl FilterState {
    /// True when no field differs from its default.
    #[must_use]
    pub fn is_default(&self) -> bool {
        FilterField::ALL
            .into_iter()
            .all(|field| self.field_is_default(field))
    }

    /// Status and sort in canonical form; text fields are kept as typed.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            status: self.status.normalized(),
            sort: self.sort.normalized(),
            ..self
        }
    }

    /// True when `field` holds its default value.
    #[must_use]
    pub fn field_is_default(&self, field: FilterField) -> bool {
        match field {
            FilterField::Status => self.status.is_all(),
            FilterField::Sort => SortKey::parse(self.sort.as_str()) == SortKey::Recent,
            FilterField::Query => self.query.is_empty(),
            FilterField::Author => self.author.is_empty(),
            FilterField::OverdueOnly => !self.overdue_only,
        }
    }
}

/// One filter dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterField {
    Status,
    Sort,
    Query,
    Author,
    OverdueOnly,
}

impl FilterField {
    pub const ALL: [Self; 5] = [
        Self::Status,
        Self::Sort,
        Self::Query,
        Self::Author,
        Self::OverdueOnly,
    ];

    /// Query-parameter name used by the location and the data source.
    #[must_use]
    pub const fn param(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Sort => "sort",
            Self::Query => "q",
            Self::Author => "author",
            Self::OverdueOnly => "overdue",
        }
    }

    #[must_use]
    pub fn from_param(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.param() == name)
    }

    /// Free-text fields change on every keystroke and are debounced.
    #[must_use]
    pub const fn is_text(self) -> bool {
        matches!(self, Self::Query | Self::Author)
    }

    const fn bit(self) -> u8 {
        match self {
            Self::Status => 1,
            Self::Sort => 1 << 1,
            Self::Query => 1 << 2,
            Self::Author => 1 << 3,
            Self::OverdueOnly => 1 << 4,
        }
    }
}

/// Small set of [`FilterField`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldSet(u8);

impl FieldSet {
    pub const fn insert(&mut self, field: FilterField) {
        self.0 |= field.bit();
    }

    #[must_use]
    pub const fn contains(self, field: FilterField) -> bool {
        self.0 & field.bit() != 0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when non-empty and every member is a free-text field.
    #[must_use]
    pub fn only_text(self) -> bool {
        !self.is_empty() && self.iter().all(FilterField::is_text)
    }

    pub fn iter(self) -> impl Iterator<Item = FilterField> {
        FilterField::ALL
            .into_iter()
            .filter(move |field| self.contains(*field))
    }
}

impl FromIterator<FilterField> for FieldSet {
    fn from_iter<I: IntoIterator<Item = FilterField>>(iter: I) -> Self {
        let mut set = Self::default();
        for field in iter {
            set.insert(field);
        }
        set
    }
}

// ---------------------------------------------------------------------------
// Patches and the store
// ---------------------------------------------------------------------------

/// Partial update: `None` leaves a field untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterPatch {
    pub status: Option<StatusFilter>,
    pub sort: Option<SortKey>,
    pub query: Option<String>,
    pub author: Option<String>,
    pub overdue_only: Option<bool>,
}

impl FilterPatch {
    #[must_use]
    pub fn with_status(mut self, status: StatusFilter) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_sort(mut self, sort: SortKey) -> Self {
        self.sort = Some(sort);
        self
    }

    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    #[must_use]
    pub const fn with_overdue_only(mut self, overdue_only: bool) -> Self {
        self.overdue_only = Some(overdue_only);
        self
    }

    /// A patch that sets every field to the values in `state`.
    #[must_use]
    pub fn replace_all(state: &FilterState) -> Self {
        Self {
            status: Some(state.status.clone()),
            sort: Some(state.sort.clone()),
            query: Some(state.query.clone()),
            author: Some(state.author.clone()),
            overdue_only: Some(state.overdue_only),
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.sort.is_none()
            && self.query.is_none()
            && self.author.is_none()
            && self.overdue_only.is_none()
    }

    /// Apply onto `state` and report which fields changed value.
    pub fn apply_to(self, state: &mut FilterState) -> FieldSet {
        fn assign<T: PartialEq>(
            slot: &mut T,
            value: Option<T>,
            field: FilterField,
            changed: &mut FieldSet,
        ) {
            let Some(value) = value else {
                return;
            };
            if *slot != value {
                *slot = value;
                changed.insert(field);
            }
        }

        let mut changed = FieldSet::default();
        let status = self.status.map(StatusFilter::normalized);
        let sort = self.sort.map(SortKey::normalized);
        assign(&mut state.status, status, FilterField::Status, &mut changed);
        assign(&mut state.sort, sort, FilterField::Sort, &mut changed);
        assign(&mut state.query, self.query, FilterField::Query, &mut changed);
        assign(&mut state.author, self.author, FilterField::Author, &mut changed);
        assign(
            &mut state.overdue_only,
            self.overdue_only,
            FilterField::OverdueOnly,
            &mut changed,
        );
        changed
    }
}

/// Result of one [`FilterStore::set`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterChange {
    /// State after the update.
    pub snapshot: FilterState,
    /// Fields whose value differs from before. Empty for a no-op update.
    pub changed: FieldSet,
}

type Listener = Box<dyn FnMut(&FilterChange)>;

/// Source of truth for the current [`FilterState`].
pub struct FilterStore {
    state: FilterState,
    listeners: Vec<Listener>,
}

impl FilterStore {
    #[must_use]
    pub fn new(initial: FilterState) -> Self {
        Self {
            state: initial,
            listeners: Vec::new(),
        }
    }

    /// Owned snapshot of the current state.
    #[must_use]
    pub fn get(&self) -> FilterState {
        self.state.clone()
    }

    /// Borrow the current state without cloning.
    #[must_use]
    pub const fn current(&self) -> &FilterState {
        &self.state
    }

    /// Shallow-merge `patch` and notify listeners if anything changed.
    pub fn set(&mut self, patch: FilterPatch) -> FilterChange {
        let changed = patch.apply_to(&mut self.state);
        let change = FilterChange {
            snapshot: self.state.clone(),
            changed,
        };
        if !changed.is_empty() {
            tracing::trace!(
                fields = ?changed.iter().map(FilterField::param).collect::<Vec<_>>(),
                "filter state changed"
            );
            for listener in &mut self.listeners {
                listener(&change);
            }
        }
        change
    }

    /// Register a change listener. Listeners live as long as the store.
    pub fn subscribe(&mut self, listener: impl FnMut(&FilterChange) + 'static) {
        self.listeners.push(Box::new(listener));
    }
}

impl Default for FilterStore {
    fn default() -> Self {
        Self::new(FilterState::default())
    }
}

impl fmt::Debug for FilterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterStore")
            .field("state", &self.state)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
