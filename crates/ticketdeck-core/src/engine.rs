//! Composition root.
//!
//! [`Engine`] owns the filter store, page state, fetch pipeline and debounce
//! timer, plus whichever optional capabilities the host attached through
//! [`EngineBuilder`]: persistence, realtime push, status mutation.
//!
//! The engine never blocks and never does IO itself. Hosts deliver
//! completions (`on_fetch_response`, `on_mutation_response`, `on_channel_*`)
//! and call [`Engine::tick`] no later than [`Engine::next_deadline`].

use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::debounce::{DebounceStats, Debouncer};
use crate::error::{FetchError, MutationError};
use crate::filter::{
    FilterChange, FilterPatch, FilterState, FilterStore, SortKey, StatusFilter,
};
use crate::model::{TicketPage, TicketRecord};
use crate::mutation::{DropOutcome, MutationClient, MutationId, StatusMutator};
use crate::pagination::{ClampOutcome, PageState, PaginationView};
use crate::persist::PersistenceBridge;
use crate::pipeline::{FetchPipeline, FetchRequest, PipelineStats, RequestSeq, Settle, TicketSource};
use crate::realtime::{ChannelState, CloseReason, RealtimeChannel};
use crate::render::{Notice, NoticeLevel, RenderSink, RenderedList, TicketView, status_label};

/// Work parked behind the debounce timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deferred {
    Refresh,
}

/// Counters exposed for hosts and the simulation oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct EngineStats {
    #[serde(flatten)]
    pub pipeline: PipelineStats,
    pub debounce: DebounceStats,
    pub renders: u64,
    pub errors: u64,
    /// Follow-up fetches issued after the current page was clamped.
    pub clamp_refetches: u64,
}

pub struct EngineBuilder {
    config: EngineConfig,
    source: Box<dyn TicketSource>,
    sink: Box<dyn RenderSink>,
    clock: Option<Box<dyn Clock>>,
    persistence: Option<PersistenceBridge>,
    realtime: Option<RealtimeChannel>,
    mutation: Option<Box<dyn MutationClient>>,
    initial_page: u32,
}

impl EngineBuilder {
    /// Time source. Defaults to [`SystemClock`].
    #[must_use]
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    #[must_use]
    pub fn persistence(mut self, bridge: PersistenceBridge) -> Self {
        self.persistence = Some(bridge);
        self
    }

    #[must_use]
    pub fn realtime(mut self, channel: RealtimeChannel) -> Self {
        self.realtime = Some(channel);
        self
    }

    /// Enable drag-to-change-status through `client`.
    #[must_use]
    pub fn status_mutation(mut self, client: impl MutationClient + 'static) -> Self {
        self.mutation = Some(Box::new(client));
        self
    }

    /// Page requested by the first fetch.
    #[must_use]
    pub fn initial_page(mut self, page: u32) -> Self {
        self.initial_page = page.max(1);
        self
    }

    #[must_use]
    pub fn build(self) -> Engine {
        let mut page = PageState::new(self.config.items_per_page);
        page.request_page(self.initial_page);
        let mutator = self.mutation.map(|client| {
            StatusMutator::new(client)
                .with_allowed_statuses(self.config.allowed_statuses.clone())
        });
        Engine {
            source: self.source,
            sink: self.sink,
            clock: self
                .clock
                .unwrap_or_else(|| Box::new(SystemClock::new())),
            store: FilterStore::default(),
            page,
            pipeline: FetchPipeline::new(),
            debounce: Debouncer::new(),
            persistence: self.persistence,
            realtime: self.realtime,
            mutator,
            snapshot: Vec::new(),
            last_error: None,
            started: false,
            renders: 0,
            errors: 0,
            clamp_refetches: 0,
            config: self.config,
        }
    }
}

/// Filter, sync and pagination engine for one ticket list.
pub struct Engine {
    config: EngineConfig,
    source: Box<dyn TicketSource>,
    sink: Box<dyn RenderSink>,
    clock: Box<dyn Clock>,
    store: FilterStore,
    page: PageState,
    pipeline: FetchPipeline,
    debounce: Debouncer<Deferred>,
    persistence: Option<PersistenceBridge>,
    realtime: Option<RealtimeChannel>,
    mutator: Option<StatusMutator>,
    /// Records from the latest accepted response.
    snapshot: Vec<TicketRecord>,
    last_error: Option<FetchError>,
    started: bool,
    renders: u64,
    errors: u64,
    clamp_refetches: u64,
}

impl Engine {
    /// Start building an engine around the two mandatory collaborators.
    pub fn builder(
        config: EngineConfig,
        source: impl TicketSource + 'static,
        sink: impl RenderSink + 'static,
    ) -> EngineBuilder {
        EngineBuilder {
            config,
            source: Box::new(source),
            sink: Box::new(sink),
            clock: None,
            persistence: None,
            realtime: None,
            mutation: None,
            initial_page: 1,
        }
    }

    // -- lifecycle ----------------------------------------------------------

    /// Restore persisted filters, open the push channel and issue the first fetch.
    ///
    /// Calling it twice has no effect.
    pub fn start(&mut self) -> Option<RequestSeq> {
        if self.started {
            return None;
        }
        self.started = true;
        if let Some(bridge) = &self.persistence {
            let restored = bridge.restore();
            self.store.set(FilterPatch::replace_all(&restored));
        }
        if let Some(channel) = &mut self.realtime {
            channel.connect();
        }
        info!(
            persistence = self.persistence.is_some(),
            realtime = self.realtime.is_some(),
            mutation = self.mutator.is_some(),
            "engine started"
        );
        Some(self.refresh())
    }

    /// Cancel timers and close the push channel. In-flight responses are still
    /// accepted if delivered.
    pub fn shutdown(&mut self) {
        self.debounce.cancel();
        if let Some(channel) = &mut self.realtime {
            channel.shutdown();
        }
        debug!("engine shut down");
    }

    // -- state access -------------------------------------------------------

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub const fn filters(&self) -> &FilterState {
        self.store.current()
    }

    #[must_use]
    pub const fn page(&self) -> &PageState {
        &self.page
    }

    /// Records behind the last rendered list. Empty after a failed fetch.
    #[must_use]
    pub fn snapshot(&self) -> &[TicketRecord] {
        &self.snapshot
    }

    #[must_use]
    pub const fn last_error(&self) -> Option<&FetchError> {
        self.last_error.as_ref()
    }

    #[must_use]
    pub const fn is_busy(&self) -> bool {
        self.pipeline.is_busy()
    }

    #[must_use]
    pub fn channel_state(&self) -> Option<ChannelState> {
        self.realtime.as_ref().map(RealtimeChannel::state)
    }

    #[must_use]
    pub const fn stats(&self) -> EngineStats {
        EngineStats {
            pipeline: self.pipeline.stats(),
            debounce: self.debounce.stats(),
            renders: self.renders,
            errors: self.errors,
            clamp_refetches: self.clamp_refetches,
        }
    }

    /// Observe filter changes.
    pub fn subscribe(&mut self, listener: impl FnMut(&FilterChange) + 'static) {
        self.store.subscribe(listener);
    }

    // -- filter input -------------------------------------------------------

    /// Merge `patch` into the filters and schedule the matching refresh.
    ///
    /// Any real change resets the page to 1. Changes that only touch free-text
    /// fields are debounced; anything else cancels a pending debounce and
    /// refreshes immediately.
    pub fn set_filters(&mut self, patch: FilterPatch) -> FilterChange {
        let change = self.store.set(patch);
        if change.changed.is_empty() {
            return change;
        }
        self.page.reset();
        if change.changed.only_text() {
            let now = self.clock.now_millis();
            self.debounce
                .schedule(Deferred::Refresh, self.config.debounce_ms, now);
        } else {
            self.debounce.cancel();
            self.refresh();
        }
        change
    }

    pub fn input_query(&mut self, text: &str) -> FilterChange {
        self.set_filters(FilterPatch::default().with_query(text))
    }

    pub fn input_author(&mut self, text: &str) -> FilterChange {
        self.set_filters(FilterPatch::default().with_author(text))
    }

    pub fn select_status(&mut self, raw: &str) -> FilterChange {
        self.set_filters(FilterPatch::default().with_status(StatusFilter::parse(raw)))
    }

    pub fn select_sort(&mut self, raw: &str) -> FilterChange {
        self.set_filters(FilterPatch::default().with_sort(SortKey::parse(raw)))
    }

    pub fn set_overdue_only(&mut self, checked: bool) -> FilterChange {
        self.set_filters(FilterPatch::default().with_overdue_only(checked))
    }

    /// Explicit search submit: skip the remaining debounce and fetch now.
    pub fn submit_search(&mut self) -> RequestSeq {
        self.debounce.cancel();
        self.refresh()
    }

    /// Page selector click.
    pub fn go_to_page(&mut self, page: u32) -> RequestSeq {
        self.debounce.cancel();
        self.page.request_page(page);
        let seq = self.refresh();
        self.sink.scroll_to_top();
        seq
    }

    // -- fetch pipeline -----------------------------------------------------

    /// Issue a request for the current filters and page.
    ///
    /// Earlier requests are not cancelled; their responses will be stale.
    pub fn refresh(&mut self) -> RequestSeq {
        let seq = self.pipeline.issue();
        let request = FetchRequest {
            seq,
            filter: self.store.get(),
            page: self.page.current_page,
            per_page: self.page.items_per_page,
        };
        debug!(%seq, query = %request.query_string(), "issuing fetch");
        self.sink.set_busy(true);
        self.source.fetch(&request);
        seq
    }

    /// Deliver the completion of request `seq`.
    pub fn on_fetch_response(&mut self, seq: RequestSeq, result: Result<TicketPage, FetchError>) {
        match self.pipeline.settle(seq) {
            Settle::Current => {}
            Settle::Stale => {
                debug!(%seq, latest = %self.pipeline.last_issued(), "discarding stale response");
                return;
            }
            Settle::Unknown => {
                debug!(%seq, "discarding response for an unknown or settled request");
                return;
            }
        }

        match result {
            Ok(page) => self.accept(seq, page),
            Err(err) => {
                warn!(code = %err.error_code(), %seq, "{err}");
                self.sink.set_busy(false);
                self.snapshot.clear();
                self.errors += 1;
                self.sink.render_error(&err.user_message());
                self.last_error = Some(err);
            }
        }
    }

    fn accept(&mut self, seq: RequestSeq, page: TicketPage) {
        if let ClampOutcome::Clamped { from, to } = self.page.apply_total(page.total) {
            info!(%seq, from, to, "requested page no longer exists; loading the last page");
            self.clamp_refetches += 1;
            self.refresh();
            return;
        }

        self.sink.set_busy(false);
        let now = self.clock.wall_time();
        let list = RenderedList {
            seq,
            tickets: page
                .tickets
                .iter()
                .map(|record| TicketView::from_record(record, now))
                .collect(),
            pagination: PaginationView::for_state(&self.page, self.config.page_window),
            total_items: page.total,
        };
        self.snapshot = page.tickets;
        self.last_error = None;
        self.renders += 1;
        self.sink.render_list(&list);

        if let Some(bridge) = &mut self.persistence {
            bridge.commit(self.store.current());
        }
    }

    // -- timers ---------------------------------------------------------------

    /// Fire due timers.
    pub fn tick(&mut self) {
        let now = self.clock.now_millis();
        if let Some(Deferred::Refresh) = self.debounce.poll(now) {
            self.refresh();
        }
        if let Some(channel) = &mut self.realtime {
            channel.poll(now);
        }
    }

    /// Earliest monotonic time at which [`Engine::tick`] has work to do.
    #[must_use]
    pub fn next_deadline(&self) -> Option<u64> {
        let channel = self
            .realtime
            .as_ref()
            .and_then(RealtimeChannel::next_deadline);
        match (self.debounce.next_deadline(), channel) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // -- push channel ---------------------------------------------------------

    pub fn on_channel_open(&mut self) {
        if let Some(channel) = &mut self.realtime {
            channel.on_open();
        }
    }

    /// A message arrived. Collection changes trigger a refresh plus a notification.
    pub fn on_channel_message(&mut self, raw: &str) {
        let Some(channel) = self.realtime.as_mut() else {
            return;
        };
        let Some(event) = channel.on_message(raw) else {
            return;
        };
        debug!(kind = ?event.kind, ticket_id = ?event.ticket_id, "collection changed");
        let notice = channel.announce(&event);
        self.refresh();
        if let Some(notice) = notice {
            self.sink.notify(&notice);
        }
    }

    pub fn on_channel_closed(&mut self, reason: CloseReason) {
        let now = self.clock.now_millis();
        if let Some(channel) = &mut self.realtime {
            channel.on_closed(&reason, now);
        }
    }

    // -- status mutation ------------------------------------------------------

    /// Drop `ticket_id` onto the `status` column.
    pub fn move_ticket(&mut self, ticket_id: u64, status: &str) -> DropOutcome {
        let Some(mutator) = self.mutator.as_mut() else {
            return DropOutcome::Disabled;
        };
        let current = self
            .snapshot
            .iter()
            .find(|record| record.id == ticket_id)
            .map(|record| record.status.as_str());
        let outcome = mutator.drop_ticket(ticket_id, status, current);
        if let DropOutcome::Rejected(err) = &outcome {
            warn!(code = %err.error_code(), ticket_id, "{err}");
            self.sink.notify(&Notice::new(
                NoticeLevel::Alert,
                format!("Cannot move ticket #{ticket_id}: {err}"),
            ));
        }
        outcome
    }

    /// Deliver the completion of a status change.
    pub fn on_mutation_response(&mut self, id: MutationId, result: Result<(), MutationError>) {
        let Some(mutator) = self.mutator.as_mut() else {
            return;
        };
        let Some(outcome) = mutator.settle(id, result) else {
            debug!(%id, "ignoring completion for an unknown mutation");
            return;
        };
        let request = outcome.request;
        match outcome.result {
            Ok(()) => {
                info!(ticket_id = request.ticket_id, status = %request.status, "status changed");
                self.sink.notify(&Notice::new(
                    NoticeLevel::Success,
                    format!(
                        "Ticket #{} moved to {}",
                        request.ticket_id,
                        status_label(&request.status)
                    ),
                ));
                self.refresh();
            }
            Err(err) => {
                warn!(code = %err.error_code(), ticket_id = request.ticket_id, "{err}");
                self.sink.notify(&Notice::new(
                    NoticeLevel::Alert,
                    format!("Could not move ticket #{}: {err}", request.ticket_id),
                ));
            }
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("filters", self.store.current())
            .field("page", &self.page)
            .field("busy", &self.pipeline.is_busy())
            .field("persistence", &self.persistence)
            .field("realtime", &self.realtime)
            .field("mutator", &self.mutator)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::Author;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct Source(Rc<RefCell<Vec<FetchRequest>>>);

    impl TicketSource for Source {
        fn fetch(&mut self, request: &FetchRequest) {
            self.0.borrow_mut().push(request.clone());
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Busy(bool),
        List(Vec<u64>),
        Error(String),
        Notice(NoticeLevel),
        Scroll,
    }

    #[derive(Clone, Default)]
    struct Sink(Rc<RefCell<Vec<Event>>>);

    impl RenderSink for Sink {
        fn set_busy(&mut self, busy: bool) {
            self.0.borrow_mut().push(Event::Busy(busy));
        }

        fn render_list(&mut self, list: &RenderedList) {
            self.0
                .borrow_mut()
                .push(Event::List(list.tickets.iter().map(|t| t.id).collect()));
        }

        fn render_error(&mut self, message: &str) {
            self.0.borrow_mut().push(Event::Error(message.to_string()));
        }

        fn notify(&mut self, notice: &Notice) {
            self.0.borrow_mut().push(Event::Notice(notice.level));
        }

        fn scroll_to_top(&mut self) {
            self.0.borrow_mut().push(Event::Scroll);
        }
    }

    fn ticket(id: u64) -> TicketRecord {
        TicketRecord {
            id,
            title: format!("ticket {id}"),
            content: String::new(),
            status: "en_attente".into(),
            priority: None,
            author: Author {
                id: 1,
                username: "mara".into(),
            },
            created_at: chrono::DateTime::<chrono::Utc>::UNIX_EPOCH,
            updated_at: None,
            deadline: None,
            admin_response: None,
        }
    }

    fn page_of(ids: &[u64], total: u64) -> TicketPage {
        TicketPage {
            tickets: ids.iter().copied().map(ticket).collect(),
            total,
        }
    }

    fn engine() -> (Engine, Source, Sink, ManualClock) {
        let source = Source::default();
        let sink = Sink::default();
        let clock = ManualClock::default();
        let engine = Engine::builder(EngineConfig::default(), source.clone(), sink.clone())
            .clock(clock.clone())
            .build();
        (engine, source, sink, clock)
    }

    #[test]
    fn start_fetches_once() {
        let (mut engine, source, _sink, _clock) = engine();
        assert_eq!(engine.start(), Some(RequestSeq(1)));
        assert_eq!(engine.start(), None);
        assert_eq!(source.0.borrow().len(), 1);
        assert!(engine.is_busy());
    }

    #[test]
    fn text_input_is_debounced() {
        let (mut engine, source, _sink, clock) = engine();
        engine.start();
        engine.input_query("p");
        clock.advance(100);
        engine.input_query("pr");
        clock.advance(100);
        engine.input_query("pri");
        assert_eq!(source.0.borrow().len(), 1);

        clock.advance(249);
        engine.tick();
        assert_eq!(source.0.borrow().len(), 1);
        clock.advance(1);
        engine.tick();
        assert_eq!(source.0.borrow().len(), 2);
        assert_eq!(source.0.borrow()[1].filter.query, "pri");
    }

    #[test]
    fn discrete_control_cancels_pending_debounce() {
        let (mut engine, source, _sink, clock) = engine();
        engine.start();
        engine.input_query("vpn");
        engine.select_status("en_cours");
        assert_eq!(source.0.borrow().len(), 2);
        assert_eq!(engine.next_deadline(), None);
        clock.advance(1_000);
        engine.tick();
        assert_eq!(source.0.borrow().len(), 2);
        let last = source.0.borrow().last().cloned().expect("request");
        assert_eq!(last.filter.query, "vpn");
        assert_eq!(last.filter.status.as_str(), "en_cours");
    }

    #[test]
    fn filter_change_resets_page() {
        let (mut engine, source, _sink, _clock) = engine();
        engine.start();
        engine.on_fetch_response(RequestSeq(1), Ok(page_of(&[1], 100)));
        engine.go_to_page(4);
        assert_eq!(source.0.borrow()[1].page, 4);
        engine.select_sort("oldest");
        assert_eq!(source.0.borrow()[2].page, 1);
    }

    #[test]
    fn stale_response_is_discarded() {
        let (mut engine, _source, sink, _clock) = engine();
        engine.start();
        engine.select_status("resolu");
        engine.on_fetch_response(RequestSeq(2), Ok(page_of(&[2], 1)));
        engine.on_fetch_response(RequestSeq(1), Ok(page_of(&[1], 1)));
        let lists: Vec<_> = sink
            .0
            .borrow()
            .iter()
            .filter_map(|event| match event {
                Event::List(ids) => Some(ids.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(lists, vec![vec![2]]);
        assert_eq!(engine.stats().pipeline.stale, 1);
    }

    #[test]
    fn failure_renders_inline_error_without_retry() {
        let (mut engine, source, sink, _clock) = engine();
        engine.start();
        engine.on_fetch_response(RequestSeq(1), Err(FetchError::Status { status: 500 }));
        assert!(matches!(sink.0.borrow().last(), Some(Event::Error(msg)) if msg.contains("500")));
        assert_eq!(source.0.borrow().len(), 1);
        assert!(!engine.is_busy());
        assert!(engine.last_error().is_some());
    }

    #[test]
    fn clamped_page_triggers_one_follow_up() {
        let (mut engine, source, sink, _clock) = engine();
        engine.start();
        engine.on_fetch_response(RequestSeq(1), Ok(page_of(&[1], 100)));
        engine.go_to_page(7);
        engine.on_fetch_response(RequestSeq(2), Ok(page_of(&[], 47)));
        assert_eq!(engine.page().current_page, 5);
        assert_eq!(source.0.borrow().len(), 3);
        assert_eq!(source.0.borrow()[2].page, 5);

        engine.on_fetch_response(RequestSeq(3), Ok(page_of(&[41, 42], 47)));
        assert_eq!(source.0.borrow().len(), 3);
        assert!(matches!(sink.0.borrow().last(), Some(Event::List(ids)) if ids == &vec![41, 42]));
        assert_eq!(engine.stats().clamp_refetches, 1);
    }

    #[test]
    fn page_click_scrolls_to_top() {
        let (mut engine, _source, sink, _clock) = engine();
        engine.start();
        engine.go_to_page(2);
        assert_eq!(sink.0.borrow().last(), Some(&Event::Scroll));
    }

    #[test]
    fn move_without_capability_is_disabled() {
        let (mut engine, _source, _sink, _clock) = engine();
        assert_eq!(engine.move_ticket(1, "resolu"), DropOutcome::Disabled);
    }
}
