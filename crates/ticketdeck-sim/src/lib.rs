//! ticketdeck-sim library.
//!
//! Drives a real [`ticketdeck_core::Engine`] against an in-memory ticket
//! server through a simulated network that delays, reorders, duplicates and
//! fails completions. Every seed is reproducible.
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` for return types.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod campaign;
pub mod network;
pub mod oracle;
pub mod rng;
pub mod scenario;
pub mod server;

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{Result, bail};
use serde::Serialize;
use ticketdeck_core::engine::EngineStats;
use ticketdeck_core::persist::encode_query;
use ticketdeck_core::{
    ChannelState, Clock, CloseReason, Engine, EngineConfig, FetchError, FetchRequest, ManualClock,
    MemoryCache, MemoryLocation, MutationClient, MutationError, MutationId, MutationRequest,
    Notice, PersistenceBridge, PushTransport, RealtimeChannel, RenderSink, RenderedList,
    RequestSeq, TicketPage, TicketSource,
};
use ticketdeck_core::realtime::ReconnectPolicy;
use tracing::{debug, trace};

use crate::network::{FaultConfig, SimulatedNetwork};
use crate::oracle::Observations;
use crate::rng::DeterministicRng;
use crate::scenario::{Action, Scenario, ScenarioConfig};
use crate::server::{TicketServer, epoch};

/// Upper bound on simulated time spent settling after the last action.
const QUIESCE_LIMIT_MS: u64 = 10 * 60 * 1_000;

/// Configuration for one simulated session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationConfig {
    pub seed: u64,
    pub engine: EngineConfig,
    pub scenario: ScenarioConfig,
    pub fault: FaultConfig,
    pub realtime: bool,
    pub mutations: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            seed: 0,
            scenario: ScenarioConfig {
                debounce_ms: engine.debounce_ms,
                ..ScenarioConfig::default()
            },
            engine,
            fault: FaultConfig::default(),
            realtime: true,
            mutations: true,
        }
    }
}

impl SimulationConfig {
    /// Validate configuration before running.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        if self.scenario.debounce_ms != self.engine.debounce_ms {
            bail!("scenario.debounce_ms must equal engine.debounce_ms");
        }
        if self.fault.min_latency_ms > self.fault.max_latency_ms {
            bail!("fault.min_latency_ms must be <= fault.max_latency_ms");
        }
        Ok(())
    }
}

/// One line of the replay trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEvent {
    pub at_ms: u64,
    pub what: String,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationResult {
    pub seed: u64,
    pub scenario: Scenario,
    pub stats: EngineStats,
    pub observations: Observations,
    pub trace: Vec<TraceEvent>,
    /// Whether the session hit at least one clamp, stale response and reconnect.
    pub interesting_state_reached: bool,
}

// ── Simulated collaborators ───────────────────────────────────────────────────

/// Work the engine handed to its collaborators, waiting to be routed.
#[derive(Debug, Clone)]
enum Outgoing {
    Fetch(FetchRequest),
    Mutation(MutationRequest),
    Connect,
}

/// In-flight completions.
#[derive(Debug, Clone)]
enum Completion {
    Fetch(RequestSeq, Result<TicketPage, FetchError>),
    Mutation(MutationId, Result<(), MutationError>),
    Handshake(bool),
}

type Outbox = Rc<RefCell<Vec<Outgoing>>>;

struct SimSource(Outbox);

impl TicketSource for SimSource {
    fn fetch(&mut self, request: &FetchRequest) {
        self.0.borrow_mut().push(Outgoing::Fetch(request.clone()));
    }
}

struct SimMutations(Outbox);

impl MutationClient for SimMutations {
    fn update_status(&mut self, request: &MutationRequest) {
        self.0.borrow_mut().push(Outgoing::Mutation(request.clone()));
    }
}

struct SimTransport(Outbox);

impl PushTransport for SimTransport {
    fn connect(&mut self, _path: &str) {
        self.0.borrow_mut().push(Outgoing::Connect);
    }

    fn disconnect(&mut self) {}
}

#[derive(Debug, Default)]
struct SinkLog {
    lists: Vec<RenderedList>,
    errors: usize,
    notices: usize,
}

#[derive(Clone, Default)]
struct SimSink(Rc<RefCell<SinkLog>>);

impl RenderSink for SimSink {
    fn set_busy(&mut self, _busy: bool) {}

    fn render_list(&mut self, list: &RenderedList) {
        self.0.borrow_mut().lists.push(list.clone());
    }

    fn render_error(&mut self, _message: &str) {
        self.0.borrow_mut().errors += 1;
    }

    fn notify(&mut self, _notice: &Notice) {
        self.0.borrow_mut().notices += 1;
    }
}

// ── Simulator ─────────────────────────────────────────────────────────────────

pub struct Simulator {
    config: SimulationConfig,
    rng: DeterministicRng,
    clock: ManualClock,
    engine: Engine,
    server: TicketServer,
    network: SimulatedNetwork<Completion>,
    outbox: Outbox,
    sink: SimSink,
    location: MemoryLocation,
    scenario: Scenario,
    observations: Observations,
    trace: Vec<TraceEvent>,
    saw_reconnect: bool,
}

impl Simulator {
    /// Build the server, scenario and engine for `config.seed`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = DeterministicRng::new(config.seed);
        let server = TicketServer::generate(config.scenario.ticket_count, &mut rng);
        let scenario = Scenario::generate(&config.scenario, &mut rng);

        let clock = ManualClock::new(epoch());
        let outbox: Outbox = Rc::default();
        let sink = SimSink::default();
        let location = MemoryLocation::default();
        let bridge = PersistenceBridge::new(location.clone(), config.engine.cache_key.clone())
            .with_cache(MemoryCache::new());

        let mut builder = Engine::builder(
            config.engine.clone(),
            SimSource(Rc::clone(&outbox)),
            sink.clone(),
        )
        .clock(clock.clone())
        .persistence(bridge);
        if config.realtime {
            builder = builder.realtime(
                RealtimeChannel::new(
                    SimTransport(Rc::clone(&outbox)),
                    config.engine.push_path.clone(),
                )
                .with_policy(ReconnectPolicy::from_config(&config.engine.reconnect)),
            );
        }
        if config.mutations {
            builder = builder.status_mutation(SimMutations(Rc::clone(&outbox)));
        }

        Ok(Self {
            network: SimulatedNetwork::new(config.fault),
            engine: builder.build(),
            config,
            rng,
            clock,
            server,
            outbox,
            sink,
            location,
            scenario,
            observations: Observations::default(),
            trace: Vec::new(),
            saw_reconnect: false,
        })
    }

    #[must_use]
    pub const fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// Play the scenario, settle, and collect observations.
    ///
    /// # Errors
    ///
    /// Returns an error if the session fails to settle within the time limit.
    pub fn run(&mut self) -> Result<SimulationResult> {
        self.engine.start();
        self.pump();

        let actions = self.scenario.actions.clone();
        for timed in &actions {
            self.advance_to(timed.at_ms);
            self.apply(&timed.action);
            self.pump();
        }
        self.quiesce()?;
        self.finish();

        let stats = self.engine.stats();
        Ok(SimulationResult {
            seed: self.config.seed,
            scenario: self.scenario.clone(),
            stats,
            observations: self.observations.clone(),
            trace: self.trace.clone(),
            interesting_state_reached: stats.clamp_refetches > 0
                && stats.pipeline.stale > 0
                && self.saw_reconnect,
        })
    }

    fn record(&mut self, what: String) {
        let at_ms = self.clock_now();
        trace!(at_ms, "{what}");
        self.trace.push(TraceEvent { at_ms, what });
    }

    fn clock_now(&self) -> u64 {
        self.clock.now_millis()
    }

    /// Run every delivery and timer due up to `target`, then move the clock there.
    fn advance_to(&mut self, target: u64) {
        loop {
            let due = [self.network.next_delivery(), self.engine.next_deadline()]
                .into_iter()
                .flatten()
                .min();
            match due {
                Some(at) if at <= target => {
                    self.clock.set(at);
                    self.step();
                }
                _ => break,
            }
        }
        self.clock.set(target);
    }

    fn step(&mut self) {
        let now = self.clock_now();
        let ready = self.network.deliver_ready(now, &mut self.rng);
        for completion in ready {
            self.deliver(completion);
            self.pump();
        }
        self.engine.tick();
        self.pump();
    }

    /// Route everything the engine asked for onto the network.
    fn pump(&mut self) {
        loop {
            let outgoing: Vec<Outgoing> = self.outbox.borrow_mut().drain(..).collect();
            if outgoing.is_empty() {
                return;
            }
            let now = self.clock_now();
            for item in outgoing {
                let completion = self.serve(item);
                self.network.send(completion, now, &mut self.rng);
            }
        }
    }

    /// The server side: answer immediately, deliver later.
    fn serve(&mut self, item: Outgoing) -> Completion {
        let fault = self.network.fault_config();
        match item {
            Outgoing::Fetch(request) => {
                let result = if self.rng.hit_rate_percent(fault.error_rate_percent) {
                    Err(FetchError::Network("injected failure".to_string()))
                } else {
                    Ok(self.server.query(&request, epoch()))
                };
                self.record(format!(
                    "fetch {} {} -> {}",
                    request.seq,
                    request.query_string(),
                    result.as_ref().map_or_else(
                        ToString::to_string,
                        |page| format!("{} of {}", page.tickets.len(), page.total)
                    )
                ));
                Completion::Fetch(request.seq, result)
            }
            Outgoing::Mutation(request) => {
                let result = if self.rng.hit_rate_percent(fault.error_rate_percent) {
                    Err(MutationError::Network("injected failure".to_string()))
                } else {
                    self.server
                        .update_status(request.ticket_id, &request.status)
                };
                self.record(format!(
                    "mutation {} #{} -> {} ({result:?})",
                    request.id, request.ticket_id, request.status
                ));
                Completion::Mutation(request.id, result)
            }
            Outgoing::Connect => {
                let ok = !self.rng.hit_rate_percent(fault.channel_failure_percent);
                self.record(format!("connect -> {}", if ok { "open" } else { "refused" }));
                Completion::Handshake(ok)
            }
        }
    }

    fn deliver(&mut self, completion: Completion) {
        match completion {
            Completion::Fetch(seq, result) => {
                let rendered_before = self.sink.0.borrow().lists.len();
                self.engine.on_fetch_response(seq, result);

                let latest = self.engine.stats().pipeline.issued;
                let rendered_seq = self
                    .sink
                    .0
                    .borrow()
                    .lists
                    .get(rendered_before)
                    .map(|list| list.seq.0);
                let Some(rendered_seq) = rendered_seq else {
                    debug!(%seq, "completion produced no list");
                    return;
                };
                if rendered_seq != latest {
                    self.observations.stale_renders.push((rendered_seq, latest));
                }
                let page = self.engine.page();
                if !page.is_consistent() {
                    self.observations.page_violations.push((
                        self.clock_now(),
                        page.current_page,
                        page.total_pages,
                    ));
                }
            }
            Completion::Mutation(id, result) => self.engine.on_mutation_response(id, result),
            Completion::Handshake(true) => self.engine.on_channel_open(),
            Completion::Handshake(false) => self
                .engine
                .on_channel_closed(CloseReason::Error("handshake refused".to_string())),
        }
    }

    fn apply(&mut self, action: &Action) {
        self.record(format!("user {action:?}"));
        match action {
            Action::TypeQuery { text } => {
                self.engine.input_query(text);
            }
            Action::TypeAuthor { text } => {
                self.engine.input_author(text);
            }
            Action::SelectStatus { value } => {
                self.engine.select_status(value);
            }
            Action::SelectSort { value } => {
                self.engine.select_sort(value);
            }
            Action::SetOverdue { checked } => {
                self.engine.set_overdue_only(*checked);
            }
            Action::SubmitSearch => {
                self.engine.submit_search();
            }
            Action::GoToPage { page } => {
                self.engine.go_to_page(*page);
            }
            Action::MoveTicket { ticket_id, status } => {
                let outcome = self.engine.move_ticket(*ticket_id, status);
                self.record(format!("drop outcome {outcome:?}"));
            }
            Action::ServerChange => {
                // without an open channel nobody would hear about it
                if self.engine.channel_state() == Some(ChannelState::Open) {
                    let change = self.server.random_change(&mut self.rng);
                    self.engine.on_channel_message(&change.push_message());
                }
            }
            Action::DropChannel => {
                if self.engine.channel_state() == Some(ChannelState::Open) {
                    self.saw_reconnect = true;
                    self.engine
                        .on_channel_closed(CloseReason::Error("connection reset".to_string()));
                    // browsers report error and close back to back
                    self.engine.on_channel_closed(CloseReason::Normal);
                }
            }
        }
    }

    /// Turn faults off and let everything in flight land.
    ///
    /// A failed last fetch is not retried by the engine, so the host retries
    /// it once the network is calm.
    fn quiesce(&mut self) -> Result<()> {
        self.network.set_fault_config(self.config.fault.calm());
        let deadline = self.clock_now().saturating_add(QUIESCE_LIMIT_MS);
        loop {
            let next = [self.network.next_delivery(), self.engine.next_deadline()]
                .into_iter()
                .flatten()
                .min();
            match next {
                Some(at) => {
                    if at > deadline {
                        bail!(
                            "seed {} did not settle within {QUIESCE_LIMIT_MS}ms",
                            self.config.seed
                        );
                    }
                    self.advance_to(at);
                }
                None if self.engine.last_error().is_some() => {
                    self.record("host retry after failure".to_string());
                    self.engine.refresh();
                    self.pump();
                }
                None => return Ok(()),
            }
        }
    }

    fn finish(&mut self) {
        let filters = self.engine.filters().clone();
        let page = *self.engine.page();
        let expected = self.server.query(
            &FetchRequest {
                seq: RequestSeq(0),
                filter: filters.clone(),
                page: page.current_page,
                per_page: page.items_per_page,
            },
            epoch(),
        );
        let sink = self.sink.0.borrow();
        let observed = &mut self.observations;
        observed.debounce_fired = self.engine.stats().debounce.fired;
        observed.text_windows = self.scenario.text_windows(self.config.engine.debounce_ms);
        observed.expected_filters = format!("{:?}", self.scenario.expected_filters());
        observed.actual_filters = format!("{filters:?}");
        observed.expected_ids = expected.tickets.iter().map(|t| t.id).collect();
        observed.expected_total = expected.total;
        observed.rendered = sink
            .lists
            .last()
            .map(|list| (list.tickets.iter().map(|t| t.id).collect(), list.total_items));
        observed.expected_location = encode_query(&filters);
        observed.actual_location = self.location.query();
        observed.pending_messages = self.network.pending_len();
        observed.next_deadline = self.engine.next_deadline();
        debug!(
            seed = self.config.seed,
            renders = sink.lists.len(),
            errors = sink.errors,
            notices = sink.notices,
            "session settled"
        );
    }
}
