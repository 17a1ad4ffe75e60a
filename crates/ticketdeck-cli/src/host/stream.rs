//! Push channel over a newline-delimited JSON HTTP stream.
//!
//! Each `connect` spawns a reader thread tagged with a connection
//! generation. `disconnect` bumps the generation, so events from an older
//! reader are dropped by the session loop even if the thread is still
//! blocked on the socket. Reads time out after the API's stream idle
//! timeout; a superseded reader then exits and releases its socket.

use std::io::{BufRead, BufReader};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread;

use ticketdeck_core::{CloseReason, NotificationPermission, Notifier, PushTransport};
use tracing::{debug, warn};

use super::http::TicketApi;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Opened,
    Message(String),
    Closed(CloseReason),
}

/// `(generation, event)` pairs produced by reader threads.
pub type ChannelEvents = Receiver<(u64, ChannelEvent)>;

/// Shared view of the current connection generation.
#[derive(Debug, Clone, Default)]
pub struct Generation(Arc<AtomicU64>);

impl Generation {
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

pub struct StreamTransport {
    api: TicketApi,
    events: Sender<(u64, ChannelEvent)>,
    generation: Generation,
}

impl StreamTransport {
    /// Transport plus the receiving end the session loop listens on.
    pub fn new(api: TicketApi) -> (Self, ChannelEvents, Generation) {
        let (events, receiver) = channel();
        let generation = Generation::default();
        (
            Self {
                api,
                events,
                generation: generation.clone(),
            },
            receiver,
            generation,
        )
    }
}

impl PushTransport for StreamTransport {
    fn connect(&mut self, path: &str) {
        let generation = self.generation.bump();
        let api = self.api.clone();
        let events = self.events.clone();
        let live = self.generation.clone();
        let path = path.to_string();
        let spawned = thread::Builder::new()
            .name(format!("td-push-{generation}"))
            .spawn(move || read_stream(&api, &path, generation, &live, &events));
        if let Err(err) = spawned {
            warn!("could not start push reader: {err}");
            let _ = self
                .events
                .send((generation, ChannelEvent::Closed(CloseReason::Error(err.to_string()))));
        }
    }

    fn disconnect(&mut self) {
        self.generation.bump();
    }
}

fn read_stream(
    api: &TicketApi,
    path: &str,
    generation: u64,
    live: &Generation,
    events: &Sender<(u64, ChannelEvent)>,
) {
    let send = |event| events.send((generation, event)).is_ok();
    let reader = match api.open_stream(path) {
        Ok(reader) => reader,
        Err(err) => {
            debug!(generation, "push handshake failed: {err}");
            send(ChannelEvent::Closed(CloseReason::Error(err)));
            return;
        }
    };
    if !send(ChannelEvent::Opened) {
        return;
    }
    for line in BufReader::new(reader).lines() {
        if live.current() != generation {
            debug!(generation, "push reader superseded");
            return;
        }
        match line {
            Ok(line) if line.trim().is_empty() => {}
            Ok(line) => {
                if !send(ChannelEvent::Message(line)) {
                    return;
                }
            }
            Err(err) if live.current() != generation => {
                debug!(generation, "superseded push reader stopped: {err}");
                return;
            }
            Err(err) => {
                send(ChannelEvent::Closed(CloseReason::Error(err.to_string())));
                return;
            }
        }
    }
    if live.current() == generation {
        send(ChannelEvent::Closed(CloseReason::Normal));
    }
}

/// Terminal "system notification": a bell plus a line on stderr.
#[derive(Debug, Clone, Copy)]
pub struct TerminalNotifier {
    enabled: bool,
}

impl TerminalNotifier {
    pub const fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl Notifier for TerminalNotifier {
    fn permission(&self) -> NotificationPermission {
        if self.enabled {
            NotificationPermission::Granted
        } else {
            NotificationPermission::Denied
        }
    }

    fn show(&mut self, title: &str, body: &str) -> bool {
        eprintln!("\x07[{title}] {body}");
        true
    }
}
