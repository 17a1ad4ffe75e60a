//! Push channel state machine.
//!
//! `Connecting → Open` on handshake, `Open → Closed` on error or close,
//! `Closed → Connecting` once the reconnect delay elapses. Retries never stop
//! until [`RealtimeChannel::shutdown`].
//!
//! Only one reconnect timer exists at a time: a close that arrives while the
//! channel is already closed is ignored.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{ReconnectConfig, ReconnectPolicyKind};
use crate::error::ErrorCode;
use crate::render::{Notice, NoticeLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
}

/// Host side of the duplex connection.
pub trait PushTransport {
    /// Start connecting to `path`. The host reports the outcome through the
    /// engine's channel callbacks.
    fn connect(&mut self, path: &str);

    fn disconnect(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    Normal,
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationPermission {
    Granted,
    Denied,
    /// Not asked yet.
    Prompt,
}

/// System notifications, when the host has them.
pub trait Notifier {
    fn permission(&self) -> NotificationPermission;

    /// Show a notification. Returns false if it could not be shown.
    fn show(&mut self, title: &str, body: &str) -> bool;
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Collection-changed events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushEventKind {
    TicketUpdate,
    NewTicket,
    TicketDeleted,
}

impl PushEventKind {
    #[must_use]
    pub fn from_type(kind: &str) -> Option<Self> {
        match kind {
            "ticket_update" => Some(Self::TicketUpdate),
            "new_ticket" => Some(Self::NewTicket),
            "ticket_deleted" => Some(Self::TicketDeleted),
            _ => None,
        }
    }

    const fn headline(self) -> &'static str {
        match self {
            Self::TicketUpdate => "Ticket updated",
            Self::NewTicket => "New ticket",
            Self::TicketDeleted => "Ticket deleted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushEvent {
    pub kind: PushEventKind,
    pub ticket_id: Option<u64>,
    pub title: Option<String>,
}

impl PushEvent {
    /// Decode one message. `None` for undecodable or unknown messages.
    ///
    /// Accepts the ticket either inline (`"ticket": {"id", "title"}`) or as
    /// flat `ticket_id` / `title` fields.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(err) => {
                debug!("ignoring undecodable push message: {err}");
                return None;
            }
        };
        let Some(kind) = value.get("type").and_then(Value::as_str) else {
            debug!("ignoring push message without a type");
            return None;
        };
        let Some(kind) = PushEventKind::from_type(kind) else {
            debug!(kind, "ignoring unknown push message type");
            return None;
        };
        let ticket = value.get("ticket");
        let ticket_id = ticket
            .and_then(|t| t.get("id"))
            .or_else(|| value.get("ticket_id"))
            .and_then(Value::as_u64);
        let title = ticket
            .and_then(|t| t.get("title"))
            .or_else(|| value.get("title"))
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(Self {
            kind,
            ticket_id,
            title,
        })
    }

    fn notification_body(&self) -> String {
        match (&self.title, self.ticket_id) {
            (Some(title), _) => title.clone(),
            (None, Some(id)) => format!("Ticket #{id}"),
            (None, None) => "The ticket list changed".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Reconnect policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ReconnectPolicy {
    Fixed { delay_ms: u64 },
    Exponential {
        initial_ms: u64,
        max_ms: u64,
        factor: f64,
    },
}

impl ReconnectPolicy {
    #[must_use]
    pub const fn fixed(delay_ms: u64) -> Self {
        Self::Fixed { delay_ms }
    }

    /// Capped doubling from one second to five minutes, retrying forever.
    #[must_use]
    pub const fn daemon() -> Self {
        Self::Exponential {
            initial_ms: 1_000,
            max_ms: 300_000,
            factor: 2.0,
        }
    }

    #[must_use]
    pub const fn from_config(config: &ReconnectConfig) -> Self {
        match config.policy {
            ReconnectPolicyKind::Fixed => Self::Fixed {
                delay_ms: config.delay_ms,
            },
            ReconnectPolicyKind::Exponential => Self::Exponential {
                initial_ms: config.delay_ms,
                max_ms: config.max_delay_ms,
                factor: config.factor,
            },
        }
    }

    /// Delay before reconnect attempt number `attempt` (0-based, reset on open).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> u64 {
        match *self {
            Self::Fixed { delay_ms } => delay_ms,
            Self::Exponential {
                initial_ms,
                max_ms,
                factor,
            } => {
                let mut delay = initial_ms;
                for _ in 0..attempt {
                    if delay >= max_ms {
                        break;
                    }
                    delay = scale(delay, factor).min(max_ms);
                }
                delay.min(max_ms)
            }
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&ReconnectConfig::default())
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn scale(delay_ms: u64, factor: f64) -> u64 {
    let scaled = (delay_ms as f64 * factor).ceil();
    if scaled >= u64::MAX as f64 {
        u64::MAX
    } else {
        scaled as u64
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct ChannelStats {
    pub connects: u64,
    pub opens: u64,
    pub closes: u64,
    pub ignored_closes: u64,
}

/// Realtime capability: owns the transport, the reconnect timer and the
/// optional notifier.
pub struct RealtimeChannel {
    transport: Box<dyn PushTransport>,
    notifier: Option<Box<dyn Notifier>>,
    path: String,
    policy: ReconnectPolicy,
    state: ChannelState,
    reconnect_at: Option<u64>,
    attempt: u32,
    stopped: bool,
    stats: ChannelStats,
}

impl RealtimeChannel {
    #[must_use]
    pub fn new(transport: impl PushTransport + 'static, path: impl Into<String>) -> Self {
        Self {
            transport: Box::new(transport),
            notifier: None,
            path: path.into(),
            policy: ReconnectPolicy::default(),
            state: ChannelState::Closed,
            reconnect_at: None,
            attempt: 0,
            stopped: false,
            stats: ChannelStats::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Some(Box::new(notifier));
        self
    }

    #[must_use]
    pub const fn state(&self) -> ChannelState {
        self.state
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub const fn stats(&self) -> ChannelStats {
        self.stats
    }

    /// Monotonic time of the pending reconnect, if any.
    #[must_use]
    pub const fn next_deadline(&self) -> Option<u64> {
        self.reconnect_at
    }

    /// Begin connecting. No-op after shutdown or while already connecting/open.
    pub fn connect(&mut self) {
        if self.stopped || self.state != ChannelState::Closed {
            return;
        }
        self.reconnect_at = None;
        self.state = ChannelState::Connecting;
        self.stats.connects += 1;
        debug!(path = %self.path, attempt = self.attempt, "push channel connecting");
        self.transport.connect(&self.path);
    }

    /// Handshake completed.
    pub fn on_open(&mut self) {
        if self.state != ChannelState::Connecting {
            debug!(state = ?self.state, "ignoring open signal");
            return;
        }
        self.state = ChannelState::Open;
        self.attempt = 0;
        self.stats.opens += 1;
        info!(path = %self.path, "push channel open");
    }

    /// Connection closed or failed. Returns false when the signal was a duplicate.
    pub fn on_closed(&mut self, reason: &CloseReason, now: u64) -> bool {
        if self.stopped || self.state == ChannelState::Closed {
            self.stats.ignored_closes += 1;
            debug!(?reason, "ignoring duplicate close signal");
            return false;
        }
        self.state = ChannelState::Closed;
        self.stats.closes += 1;

        let delay = self.policy.delay_for(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        self.reconnect_at = Some(now.saturating_add(delay));
        match reason {
            CloseReason::Normal => info!(delay_ms = delay, "push channel closed; reconnecting"),
            CloseReason::Error(detail) => warn!(
                code = %ErrorCode::ChannelFailure,
                delay_ms = delay,
                "push channel failed: {detail}; reconnecting"
            ),
        }
        true
    }

    /// Fire the reconnect timer if due. Returns true if a connect was started.
    pub fn poll(&mut self, now: u64) -> bool {
        match self.reconnect_at {
            Some(due) if due <= now => {
                self.connect();
                true
            }
            _ => false,
        }
    }

    /// Decode a message received while open.
    pub fn on_message(&mut self, raw: &str) -> Option<PushEvent> {
        if self.state != ChannelState::Open {
            debug!(state = ?self.state, "ignoring push message on a channel that is not open");
            return None;
        }
        PushEvent::parse(raw)
    }

    /// Best-effort notification for `event`.
    ///
    /// Uses the system notifier when permission is granted; otherwise returns
    /// an in-page notice for the render sink.
    pub fn announce(&mut self, event: &PushEvent) -> Option<Notice> {
        let headline = event.kind.headline();
        let body = event.notification_body();
        if let Some(notifier) = self.notifier.as_mut()
            && notifier.permission() == NotificationPermission::Granted
            && notifier.show(headline, &body)
        {
            return None;
        }
        Some(Notice::new(NoticeLevel::Info, format!("{headline}: {body}")))
    }

    /// Stop for good: disconnect and drop any pending reconnect.
    pub fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.reconnect_at = None;
        if self.state != ChannelState::Closed {
            self.transport.disconnect();
        }
        self.state = ChannelState::Closed;
    }
}

impl std::fmt::Debug for RealtimeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeChannel")
            .field("path", &self.path)
            .field("state", &self.state)
            .field("policy", &self.policy)
            .field("reconnect_at", &self.reconnect_at)
            .finish_non_exhaustive()
    }
}
