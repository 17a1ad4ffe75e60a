//! Ticket records as served by the remote data source.
//!
//! Records are read-only snapshots: the engine keeps the list from the latest
//! accepted response and replaces it wholesale on the next one.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::FetchError;

/// Reference to the user who opened a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: u64,
    #[serde(default)]
    pub username: String,
}

/// One support ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRecord {
    pub id: u64,
    pub title: String,
    #[serde(default, alias = "body")]
    pub content: String,
    pub status: String,
    #[serde(default)]
    pub priority: Option<String>,
    pub author: Author,
    #[serde(deserialize_with = "timestamp::required")]
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "timestamp::optional")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::optional")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub admin_response: Option<String>,
}

impl TicketRecord {
    /// True when the ticket has a deadline strictly before `now`.
    #[must_use]
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|deadline| deadline < now)
    }
}

/// One page of results plus the total across all pages.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TicketPage {
    pub tickets: Vec<TicketRecord>,
    /// Matches across every page, not just this one. Older servers call it `count`.
    #[serde(alias = "count")]
    pub total: u64,
}

impl TicketPage {
    /// Decode a response body.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Decode`] when the body is not JSON of the expected shape.
    pub fn from_json(body: &str) -> Result<Self, FetchError> {
        serde_json::from_str(body).map_err(|err| FetchError::Decode(err.to_string()))
    }
}

/// Timestamps arrive either as RFC 3339 or as naive ISO 8601 (assumed UTC).
mod timestamp {
    use super::{DateTime, Deserialize, Deserializer, NaiveDateTime, Utc};
    use serde::de::Error;

    pub(super) fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc())
    }

    pub(super) fn required<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp `{raw}`")))
    }

    pub(super) fn optional<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => parse(&raw)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid timestamp `{raw}`"))),
        }
    }
}
