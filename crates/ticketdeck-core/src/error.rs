use std::fmt;

use thiserror::Error;

/// Stable `E####` codes printed with every user-facing failure. The first
/// digit names the area: config, fetch, saved state, push channel, mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    FetchFailed,
    HttpStatus,
    DecodeFailed,
    PersistedStateCorrupt,
    CacheWriteFailed,
    ChannelFailure,
    MutationRejected,
    MutationFailed,
    InvalidStatus,
    InternalUnexpected,
}

impl ErrorCode {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::FetchFailed => "E2001",
            Self::HttpStatus => "E2002",
            Self::DecodeFailed => "E2003",
            Self::PersistedStateCorrupt => "E3001",
            Self::CacheWriteFailed => "E3002",
            Self::ChannelFailure => "E4001",
            Self::MutationRejected => "E5001",
            Self::MutationFailed => "E5002",
            Self::InvalidStatus => "E5003",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// One-line title, without the code.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::FetchFailed => "Ticket request failed",
            Self::HttpStatus => "Ticket server returned an error status",
            Self::DecodeFailed => "Ticket response could not be decoded",
            Self::PersistedStateCorrupt => "Saved filter state is corrupt",
            Self::CacheWriteFailed => "Saved filter state could not be written",
            Self::ChannelFailure => "Push channel failure",
            Self::MutationRejected => "Status change rejected",
            Self::MutationFailed => "Status change request failed",
            Self::InvalidStatus => "Invalid ticket status",
            Self::InternalUnexpected => "Unexpected internal error",
        }
    }

    /// What the user can try next, when there is something to try.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .ticketdeck/config.toml and retry."),
            Self::FetchFailed => Some("Check that the ticket server is reachable."),
            Self::HttpStatus => Some("Check the server logs; the request itself was delivered."),
            Self::DecodeFailed => {
                Some("The server must answer with {\"tickets\": [...], \"total\": N}.")
            }
            Self::PersistedStateCorrupt => Some("Run `td state clear` to drop the saved filters."),
            Self::CacheWriteFailed => Some("Check disk space and write permissions."),
            Self::ChannelFailure => None,
            Self::MutationRejected => Some("Refresh the list; the ticket may have changed."),
            Self::MutationFailed => Some("Retry once the ticket server is reachable."),
            Self::InvalidStatus => Some("Use one of the statuses listed in `allowed_statuses`."),
            Self::InternalUnexpected => Some("Rerun with -v and report the log if it happens again."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Failure of one list fetch. Network and decode failures are handled the
/// same way: an inline error replaces the list and nothing is retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("network request failed: {0}")]
    Network(String),

    #[error("ticket server responded with HTTP {status}")]
    Status { status: u16 },

    #[error("could not decode ticket response: {0}")]
    Decode(String),
}

impl FetchError {
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Network(_) => ErrorCode::FetchFailed,
            Self::Status { .. } => ErrorCode::HttpStatus,
            Self::Decode(_) => ErrorCode::DecodeFailed,
        }
    }

    /// Text shown in place of the ticket list.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) => "Unable to load tickets. Check your connection.".to_string(),
            Self::Status { status } => format!("Unable to load tickets (HTTP {status})."),
            Self::Decode(_) => "Unable to load tickets: unexpected server response.".to_string(),
        }
    }
}

/// Failure of a single status change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    #[error("status change rejected by server (HTTP {status})")]
    Rejected { status: u16 },

    #[error("status change request failed: {0}")]
    Network(String),

    #[error("invalid status `{status}`")]
    InvalidStatus { status: String },
}

impl MutationError {
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Rejected { .. } => ErrorCode::MutationRejected,
            Self::Network(_) => ErrorCode::MutationFailed,
            Self::InvalidStatus { .. } => ErrorCode::InvalidStatus,
        }
    }
}

/// Durable cache failures. These are logged, never shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("saved filter state is corrupt: {0}")]
    Corrupt(String),

    #[error("could not read saved filter state: {0}")]
    Read(String),

    #[error("could not write saved filter state: {0}")]
    Write(String),
}

impl CacheError {
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Corrupt(_) | Self::Read(_) => ErrorCode::PersistedStateCorrupt,
            Self::Write(_) => ErrorCode::CacheWriteFailed,
        }
    }
}
