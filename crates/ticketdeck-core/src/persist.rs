//! Location and durable-cache bridge.
//!
//! On start-up the filter state is restored field by field: a parameter in
//! the location wins, otherwise the cached value, otherwise the default. After
//! each accepted fetch the canonical state is written back: the location gets
//! exactly the non-default fields, the cache gets the whole state.
//!
//! Nothing here fails towards the caller. Cache problems are logged and the
//! affected value falls back to its default.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, warn};
use url::form_urlencoded;

use crate::error::CacheError;
use crate::filter::{
    FilterField, FilterPatch, FilterState, SortKey, StatusFilter, coerce_checkbox,
};

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// The page's addressable location.
pub trait Location {
    /// Current query string, with or without a leading `?`.
    fn query_string(&self) -> String;

    /// Replace the query string in place (history replace, no reload).
    fn replace_query_string(&mut self, query: &str);
}

/// Client-side key/value storage that survives reloads.
pub trait DurableCache {
    /// Read the blob stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Read`] when the backing store cannot be read.
    fn load(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value` under `key`, replacing any previous blob.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Write`] when the backing store rejects the write.
    fn store(&mut self, key: &str, value: &str) -> Result<(), CacheError>;

    /// Drop the blob under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Write`] when the backing store rejects the removal.
    fn remove(&mut self, key: &str) -> Result<(), CacheError>;
}

// ---------------------------------------------------------------------------
// Query-string codec
// ---------------------------------------------------------------------------

/// Encode the non-default fields of `filter` in a fixed order.
///
/// `status=all` and every other default value are omitted, so a default state
/// encodes to the empty string.
#[must_use]
pub fn encode_query(filter: &FilterState) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for field in FilterField::ALL {
        if filter.field_is_default(field) {
            continue;
        }
        let value = match field {
            FilterField::Status => filter.status.as_str().trim(),
            FilterField::Sort => filter.sort.as_str().trim(),
            FilterField::Query => filter.query.as_str(),
            FilterField::Author => filter.author.as_str(),
            FilterField::OverdueOnly => "1",
        };
        serializer.append_pair(field.param(), value);
    }
    serializer.finish()
}

/// Decode the recognized filter parameters present in `query`.
///
/// Unknown keys are ignored. When a key repeats, the last value wins.
#[must_use]
pub fn decode_query(query: &str) -> FilterPatch {
    let raw = query.strip_prefix('?').unwrap_or(query);
    let mut patch = FilterPatch::default();
    for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
        let Some(field) = FilterField::from_param(&key) else {
            continue;
        };
        match field {
            FilterField::Status => patch.status = Some(StatusFilter::parse(&value)),
            FilterField::Sort => patch.sort = Some(SortKey::parse(&value)),
            FilterField::Query => patch.query = Some(value.into_owned()),
            FilterField::Author => patch.author = Some(value.into_owned()),
            FilterField::OverdueOnly => patch.overdue_only = Some(coerce_checkbox(&value)),
        }
    }
    patch
}

// ---------------------------------------------------------------------------
// Bridge
// ---------------------------------------------------------------------------

/// Persistence capability: keeps the location and the cache in step with the
/// filter store.
pub struct PersistenceBridge {
    location: Box<dyn Location>,
    cache: Option<Box<dyn DurableCache>>,
    cache_key: String,
}

impl PersistenceBridge {
    /// Bridge that syncs only the location.
    #[must_use]
    pub fn new(location: impl Location + 'static, cache_key: impl Into<String>) -> Self {
        Self {
            location: Box::new(location),
            cache: None,
            cache_key: cache_key.into(),
        }
    }

    /// Also persist to a durable cache.
    #[must_use]
    pub fn with_cache(mut self, cache: impl DurableCache + 'static) -> Self {
        self.cache = Some(Box::new(cache));
        self
    }

    #[must_use]
    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    /// Build the start-up filter state.
    #[must_use]
    pub fn restore(&self) -> FilterState {
        let mut state = self.load_cached().unwrap_or_default();
        let from_location = decode_query(&self.location.query_string());
        from_location.apply_to(&mut state);
        debug!(query = %encode_query(&state), "restored filter state");
        state
    }

    /// Write the canonical state after an accepted fetch.
    pub fn commit(&mut self, filter: &FilterState) {
        let query = encode_query(filter);
        let current = self.location.query_string();
        if current.strip_prefix('?').unwrap_or(&current) != query {
            self.location.replace_query_string(&query);
        }

        let Some(cache) = self.cache.as_mut() else {
            return;
        };
        let blob = match serde_json::to_string(filter) {
            Ok(blob) => blob,
            Err(err) => {
                warn!("could not serialize filter state: {err}");
                return;
            }
        };
        if let Err(err) = cache.store(&self.cache_key, &blob) {
            warn!(code = %err.error_code(), key = %self.cache_key, "{err}");
        }
    }

    fn load_cached(&self) -> Option<FilterState> {
        let cache = self.cache.as_ref()?;
        let raw = match cache.load(&self.cache_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(code = %err.error_code(), key = %self.cache_key, "{err}");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(state) => Some(state),
            Err(err) => {
                let err = CacheError::Corrupt(err.to_string());
                warn!(code = %err.error_code(), key = %self.cache_key, "{err}; using defaults");
                None
            }
        }
    }
}

impl std::fmt::Debug for PersistenceBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceBridge")
            .field("cache_key", &self.cache_key)
            .field("has_cache", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// In-memory collaborators
// ---------------------------------------------------------------------------

/// Location kept in memory. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryLocation {
    query: Rc<RefCell<String>>,
    replacements: Rc<Cell<usize>>,
}

impl MemoryLocation {
    #[must_use]
    pub fn new(query: &str) -> Self {
        Self {
            query: Rc::new(RefCell::new(query.to_string())),
            replacements: Rc::new(Cell::new(0)),
        }
    }

    #[must_use]
    pub fn query(&self) -> String {
        self.query.borrow().clone()
    }

    /// Number of history replacements performed so far.
    #[must_use]
    pub fn replacements(&self) -> usize {
        self.replacements.get()
    }
}

impl Location for MemoryLocation {
    fn query_string(&self) -> String {
        self.query()
    }

    fn replace_query_string(&mut self, query: &str) {
        query.clone_into(&mut self.query.borrow_mut());
        self.replacements.set(self.replacements.get() + 1);
    }
}

/// Cache kept in memory. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Rc<RefCell<HashMap<String, String>>>,
    fail_writes: Rc<Cell<bool>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, value: &str) {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    /// Make every following write fail, as a full quota would.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }
}

impl DurableCache for MemoryCache {
    fn load(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.get(key))
    }

    fn store(&mut self, key: &str, value: &str) -> Result<(), CacheError> {
        if self.fail_writes.get() {
            return Err(CacheError::Write("quota exceeded".to_string()));
        }
        self.insert(key, value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), CacheError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "ticketdeck.filters";

    fn open_date_bug() -> FilterState {
        FilterState {
            status: StatusFilter::parse("open"),
            sort: SortKey::parse("date"),
            query: "bug".into(),
            ..FilterState::default()
        }
    }

    #[test]
    fn default_state_encodes_to_empty_query() {
        assert_eq!(encode_query(&FilterState::default()), "");
    }

    #[test]
    fn status_all_is_never_written() {
        let state = FilterState {
            query: "vpn".into(),
            ..FilterState::default()
        };
        let query = encode_query(&state);
        assert_eq!(query, "q=vpn");
        assert!(!query.contains("status"));
    }

    #[test]
    fn location_round_trip_is_identical() {
        let state = open_date_bug();
        let query = encode_query(&state);
        assert_eq!(query, "status=open&sort=date&q=bug");

        let mut restored = FilterState::default();
        decode_query(&query).apply_to(&mut restored);
        assert_eq!(restored, state);
    }

    #[test]
    fn text_with_spaces_and_symbols_round_trips() {
        let state = FilterState {
            query: "login & sso = broken?".into(),
            author: "jean-luc".into(),
            overdue_only: true,
            ..FilterState::default()
        };
        let mut restored = FilterState::default();
        decode_query(&encode_query(&state)).apply_to(&mut restored);
        assert_eq!(restored, state);
    }

    #[test]
    fn decode_ignores_unknown_keys_and_leading_question_mark() {
        let patch = decode_query("?page=4&utm_source=mail&overdue=on");
        assert_eq!(patch.overdue_only, Some(true));
        assert!(patch.status.is_none());
        assert!(patch.query.is_none());
    }

    #[test]
    fn restore_prefers_location_then_cache_then_default() {
        let cache = MemoryCache::new();
        cache.insert(
            KEY,
            r#"{"status":"resolu","sort":"oldest","query":"cached","author":"mara","overdue_only":true}"#,
        );
        let bridge =
            PersistenceBridge::new(MemoryLocation::new("?q=from-url&sort=recent"), KEY)
                .with_cache(cache);

        let state = bridge.restore();
        assert_eq!(state.query, "from-url");
        assert_eq!(state.sort, SortKey::Recent);
        assert_eq!(state.status.as_str(), "resolu");
        assert_eq!(state.author, "mara");
        assert!(state.overdue_only);
    }

    #[test]
    fn corrupt_cache_falls_back_to_defaults() {
        let cache = MemoryCache::new();
        cache.insert(KEY, "{not json");
        let bridge = PersistenceBridge::new(MemoryLocation::new("author=li"), KEY).with_cache(cache);

        let state = bridge.restore();
        assert_eq!(state.author, "li");
        assert!(state.status.is_all());
        assert!(state.query.is_empty());
    }

    #[test]
    fn commit_writes_location_and_cache() {
        let location = MemoryLocation::new("?status=all");
        let cache = MemoryCache::new();
        let mut bridge = PersistenceBridge::new(location.clone(), KEY).with_cache(cache.clone());

        bridge.commit(&open_date_bug());
        assert_eq!(location.query(), "status=open&sort=date&q=bug");

        let blob = cache.get(KEY).expect("cache written");
        let cached: FilterState = serde_json::from_str(&blob).expect("valid blob");
        assert_eq!(cached, open_date_bug());
    }

    #[test]
    fn commit_skips_redundant_history_updates() {
        let location = MemoryLocation::new("?q=bug");
        let mut bridge = PersistenceBridge::new(location.clone(), KEY);
        let state = FilterState {
            query: "bug".into(),
            ..FilterState::default()
        };
        bridge.commit(&state);
        bridge.commit(&state);
        assert_eq!(location.replacements(), 0);
    }

    #[test]
    fn cache_write_failure_is_swallowed() {
        let location = MemoryLocation::default();
        let cache = MemoryCache::new();
        cache.set_fail_writes(true);
        let mut bridge = PersistenceBridge::new(location.clone(), KEY).with_cache(cache.clone());

        bridge.commit(&open_date_bug());
        assert_eq!(location.query(), "status=open&sort=date&q=bug");
        assert!(cache.get(KEY).is_none());
    }
}
