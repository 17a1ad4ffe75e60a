//! Drives one engine against the HTTP server.
//!
//! The engine is sans-IO: it queues work through [`QueuedSource`] and
//! [`QueuedMutations`]. [`Session::settle`] executes that work synchronously
//! and feeds the completions back until nothing is left.

use std::cell::{Ref, RefCell};
use std::rc::Rc;
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

use anyhow::Result;
use serde::Serialize;
use ticketdeck_core::realtime::ReconnectPolicy;
use ticketdeck_core::{
    Clock, Engine, EngineConfig, MemoryLocation, MutationError, PersistenceBridge,
    RealtimeChannel, SystemClock,
};
use tracing::{debug, info};

use super::cache::FileCache;
use super::http::{Outbox, QueuedMutations, QueuedSource, TicketApi, Work};
use super::stream::{ChannelEvent, ChannelEvents, Generation, StreamTransport, TerminalNotifier};
use super::terminal::{Screen, TerminalSink};

/// Idle wake-up when no timer is pending.
const IDLE_POLL: Duration = Duration::from_millis(500);

pub struct SessionOptions {
    pub config: EngineConfig,
    pub api: TicketApi,
    /// Initial location query built from command-line filters.
    pub location: String,
    pub cache: Option<FileCache>,
    pub initial_page: u32,
    pub sink: TerminalSink,
    pub mutations: bool,
    /// Open the push stream; the flag enables terminal notifications.
    pub realtime: Option<bool>,
}

struct Push {
    events: ChannelEvents,
    generation: Generation,
}

pub struct Session {
    engine: Engine,
    api: TicketApi,
    outbox: Outbox,
    clock: SystemClock,
    screen: Rc<RefCell<Screen>>,
    location: MemoryLocation,
    push: Option<Push>,
    last_mutation: Option<Result<(), MutationError>>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct WatchSummary {
    pub messages: u64,
    pub renders: u64,
    pub disconnects: u64,
}

/// When `watch` stops on its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchLimit {
    pub duration: Option<Duration>,
    pub messages: Option<u64>,
}

impl Session {
    pub fn open(options: SessionOptions) -> Self {
        let outbox = Outbox::default();
        let clock = SystemClock::new();
        let screen = options.sink.screen();
        let location = MemoryLocation::new(&options.location);

        let mut bridge = PersistenceBridge::new(location.clone(), options.config.cache_key.clone());
        if let Some(cache) = options.cache {
            bridge = bridge.with_cache(cache);
        }

        let mut builder = Engine::builder(
            options.config.clone(),
            QueuedSource(Rc::clone(&outbox)),
            options.sink,
        )
        .clock(clock)
        .persistence(bridge)
        .initial_page(options.initial_page);

        if options.mutations {
            builder = builder.status_mutation(QueuedMutations(Rc::clone(&outbox)));
        }

        let mut push = None;
        if let Some(notify) = options.realtime {
            let (transport, events, generation) = StreamTransport::new(options.api.clone());
            let channel = RealtimeChannel::new(transport, options.config.push_path.clone())
                .with_policy(ReconnectPolicy::from_config(&options.config.reconnect))
                .with_notifier(TerminalNotifier::new(notify));
            builder = builder.realtime(channel);
            push = Some(Push { events, generation });
        }

        Self {
            engine: builder.build(),
            api: options.api,
            outbox,
            clock,
            screen,
            location,
            push,
            last_mutation: None,
        }
    }

    pub const fn engine(&mut self) -> &mut Engine {
        &mut self.engine
    }

    pub fn screen(&self) -> Ref<'_, Screen> {
        self.screen.borrow()
    }

    /// Canonical query string written back after the last accepted fetch.
    pub fn location(&self) -> String {
        self.location.query()
    }

    /// Server answer to the most recent status change.
    pub const fn last_mutation(&self) -> Option<&Result<(), MutationError>> {
        self.last_mutation.as_ref()
    }

    /// Start the engine and run queued work to completion.
    pub fn start(&mut self) {
        self.engine.start();
        self.settle();
    }

    /// Execute queued requests until the outbox stays empty.
    pub fn settle(&mut self) {
        loop {
            let next = self.outbox.borrow_mut().pop_front();
            let Some(work) = next else {
                return;
            };
            match work {
                Work::Fetch(request) => {
                    let result = self.api.fetch(&request);
                    self.engine.on_fetch_response(request.seq, result);
                }
                Work::Mutation(request) => {
                    let result = self.api.update_status(&request);
                    self.last_mutation = Some(result.clone());
                    self.engine.on_mutation_response(request.id, result);
                }
            }
        }
    }

    /// Follow the push stream, refreshing on every collection change.
    ///
    /// # Errors
    ///
    /// Returns an error if the session was opened without realtime.
    pub fn watch(&mut self, limit: WatchLimit) -> Result<WatchSummary> {
        let Some(push) = self.push.take() else {
            anyhow::bail!("watch requires a realtime session");
        };
        let started = Instant::now();
        let renders_before = self.screen.borrow().renders;
        let mut summary = WatchSummary::default();
        info!(server = %self.api.base(), "watching for ticket changes");

        loop {
            self.settle();
            if limit.messages.is_some_and(|max| summary.messages >= max) {
                break;
            }
            let remaining = match limit.duration {
                Some(total) => match total.checked_sub(started.elapsed()) {
                    Some(left) if !left.is_zero() => Some(left),
                    _ => break,
                },
                None => None,
            };

            let mut wait = self.engine.next_deadline().map_or(IDLE_POLL, |at| {
                Duration::from_millis(at.saturating_sub(self.clock.now_millis()))
            });
            if let Some(left) = remaining {
                wait = wait.min(left);
            }

            match push.events.recv_timeout(wait) {
                Ok((generation, event)) if generation == push.generation.current() => {
                    self.on_channel_event(event, &mut summary);
                }
                Ok((generation, _)) => debug!(generation, "dropping event from a closed stream"),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            self.engine.tick();
        }

        self.engine.shutdown();
        summary.renders = self.screen.borrow().renders - renders_before;
        Ok(summary)
    }

    fn on_channel_event(&mut self, event: ChannelEvent, summary: &mut WatchSummary) {
        match event {
            ChannelEvent::Opened => self.engine.on_channel_open(),
            ChannelEvent::Message(raw) => {
                summary.messages += 1;
                self.engine.on_channel_message(&raw);
            }
            ChannelEvent::Closed(reason) => {
                summary.disconnects += 1;
                self.engine.on_channel_closed(reason);
            }
        }
    }
}
