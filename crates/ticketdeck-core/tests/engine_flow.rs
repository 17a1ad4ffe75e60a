//! End-to-end engine behaviour with recording collaborators and a manual clock.

#[path = "harness.rs"]
mod harness;

use harness::{RecordingMutations, RecordingSink, RecordingSource, RecordingTransport, page, ticket};
use ticketdeck_core::realtime::ReconnectPolicy;
use ticketdeck_core::{
    ChannelState, CloseReason, DropOutcome, Engine, EngineConfig, FetchError, FilterPatch,
    ManualClock, MemoryCache, MemoryLocation, MutationError, NoticeLevel, PersistenceBridge,
    RealtimeChannel, RequestSeq, SortKey, StatusFilter, TicketPage,
};

struct Rig {
    engine: Engine,
    source: RecordingSource,
    sink: RecordingSink,
    clock: ManualClock,
}

fn rig() -> Rig {
    let source = RecordingSource::default();
    let sink = RecordingSink::default();
    let clock = ManualClock::default();
    let engine = Engine::builder(EngineConfig::default(), source.clone(), sink.clone())
        .clock(clock.clone())
        .build();
    Rig {
        engine,
        source,
        sink,
        clock,
    }
}

#[test]
fn final_filter_matches_last_set_per_field() {
    let mut rig = rig();
    rig.engine.start();
    for text in ["d", "di", "dis", "disk"] {
        rig.engine.input_query(text);
        rig.clock.advance(40);
    }
    rig.engine.select_status("en_cours");
    rig.engine.input_author("li");
    rig.engine.input_author("lin");
    rig.engine.set_overdue_only(true);
    rig.clock.advance(1_000);
    rig.engine.tick();

    let filters = rig.engine.filters();
    assert_eq!(filters.query, "disk");
    assert_eq!(filters.author, "lin");
    assert_eq!(filters.status.as_str(), "en_cours");
    assert!(filters.overdue_only);
    assert_eq!(rig.source.last().filter, *filters);
}

#[test]
fn one_fetch_per_quiescence_window() {
    let mut rig = rig();
    rig.engine.start();
    let before = rig.source.count();
    for text in ["w", "wi", "wif", "wifi", "wifi "] {
        rig.engine.input_query(text);
        rig.clock.advance(100);
        rig.engine.tick();
    }
    assert_eq!(rig.source.count(), before);
    rig.clock.advance(150);
    rig.engine.tick();
    assert_eq!(rig.source.count(), before + 1);
    rig.clock.advance(10_000);
    rig.engine.tick();
    assert_eq!(rig.source.count(), before + 1);
}

#[test]
fn search_submit_skips_debounce() {
    let mut rig = rig();
    rig.engine.start();
    rig.engine.input_query("vpn");
    rig.engine.submit_search();
    assert_eq!(rig.source.count(), 2);
    assert_eq!(rig.engine.next_deadline(), None);
    rig.clock.advance(300);
    rig.engine.tick();
    assert_eq!(rig.source.count(), 2);
}

#[test]
fn out_of_order_responses_latest_wins() {
    let mut rig = rig();
    let first = rig.engine.start().expect("first start");
    let second = rig.engine.select_sort("oldest");
    assert!(!second.changed.is_empty());
    assert_eq!(first, RequestSeq(1));

    rig.engine.on_fetch_response(RequestSeq(2), Ok(page(&[20, 21], 2)));
    rig.engine.on_fetch_response(RequestSeq(1), Ok(page(&[10], 1)));

    assert_eq!(rig.sink.rendered_ids(), vec![vec![20, 21]]);
    assert!(!*rig.sink.busy.borrow());
}

#[test]
fn busy_until_latest_response_arrives() {
    let mut rig = rig();
    rig.engine.start();
    rig.engine.select_status("resolu");
    rig.engine.on_fetch_response(RequestSeq(1), Ok(page(&[1], 1)));
    assert!(*rig.sink.busy.borrow());
    assert!(rig.sink.lists.borrow().is_empty());
    rig.engine.on_fetch_response(RequestSeq(2), Ok(page(&[2], 1)));
    assert!(!*rig.sink.busy.borrow());
}

#[test]
fn stale_failure_does_not_replace_list() {
    let mut rig = rig();
    rig.engine.start();
    rig.engine.select_status("resolu");
    rig.engine.on_fetch_response(RequestSeq(2), Ok(page(&[2], 1)));
    rig.engine
        .on_fetch_response(RequestSeq(1), Err(FetchError::Network("timeout".into())));
    assert!(rig.sink.errors.borrow().is_empty());
    assert_eq!(rig.engine.snapshot().len(), 1);
}

#[test]
fn pagination_block_follows_response_total() {
    let mut rig = rig();
    rig.engine.start();
    rig.engine.on_fetch_response(RequestSeq(1), Ok(page(&[1, 2, 3], 47)));
    let lists = rig.sink.lists.borrow();
    let view = lists[0].pagination.as_ref().expect("five pages");
    assert_eq!(view.total_pages, 5);
    assert_eq!(view.label(), "[1] 2 3 4 5");
    drop(lists);

    rig.engine.select_status("resolu");
    rig.engine.on_fetch_response(RequestSeq(2), Ok(page(&[9], 1)));
    assert!(rig.sink.lists.borrow()[1].pagination.is_none());
}

#[test]
fn accepted_fetch_commits_location_and_cache() {
    let location = MemoryLocation::new("?status=en_attente&page=2");
    let cache = MemoryCache::new();
    let source = RecordingSource::default();
    let sink = RecordingSink::default();
    let clock = ManualClock::default();
    let config = EngineConfig::default();
    let bridge = PersistenceBridge::new(location.clone(), config.cache_key.clone())
        .with_cache(cache.clone());
    let mut engine = Engine::builder(config, source.clone(), sink)
        .clock(clock.clone())
        .persistence(bridge)
        .build();

    engine.start();
    assert_eq!(source.last().filter.status.as_str(), "en_attente");

    engine.set_filters(FilterPatch::default().with_query("printer"));
    clock.advance(250);
    engine.tick();
    // not yet accepted: location untouched
    assert_eq!(location.query(), "?status=en_attente&page=2");

    engine.on_fetch_response(RequestSeq(2), Ok(page(&[], 0)));
    assert_eq!(location.query(), "status=en_attente&q=printer");
    let blob = cache.get("ticketdeck.filters").expect("cache written");
    assert!(blob.contains("\"query\":\"printer\""));
}

#[test]
fn raw_all_status_is_stored_and_written_as_default() {
    let location = MemoryLocation::new("?status=en_attente");
    let source = RecordingSource::default();
    let clock = ManualClock::default();
    let config = EngineConfig::default();
    let bridge = PersistenceBridge::new(location.clone(), config.cache_key.clone());
    let mut engine = Engine::builder(config, source.clone(), RecordingSink::default())
        .clock(clock.clone())
        .persistence(bridge)
        .build();
    engine.start();

    engine.set_filters(
        FilterPatch::default()
            .with_status(StatusFilter::Only(" ALL ".into()))
            .with_sort(SortKey::Other(String::new())),
    );
    clock.advance(250);
    engine.tick();
    assert_eq!(engine.filters().status, StatusFilter::All);
    assert_eq!(engine.filters().sort, SortKey::Recent);

    engine.on_fetch_response(RequestSeq(2), Ok(page(&[1], 1)));
    assert_eq!(location.query(), "");
}

#[test]
fn push_event_refreshes_and_notifies() {
    let transport = RecordingTransport::default();
    let source = RecordingSource::default();
    let sink = RecordingSink::default();
    let clock = ManualClock::default();
    let config = EngineConfig::default();
    let channel = RealtimeChannel::new(transport.clone(), config.push_path.clone());
    let mut engine = Engine::builder(config, source.clone(), sink.clone())
        .clock(clock.clone())
        .realtime(channel)
        .build();

    engine.start();
    assert_eq!(*transport.connects.borrow(), vec!["/ws/tickets".to_string()]);
    assert_eq!(engine.channel_state(), Some(ChannelState::Connecting));
    engine.on_channel_open();

    engine.on_channel_message(r#"{"type":"ticket_update","ticket":{"id":4,"title":"Fan noise"}}"#);
    assert_eq!(source.count(), 2);
    let notices = sink.notices.borrow();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Info);
    assert!(notices[0].message.contains("Fan noise"));
    drop(notices);

    engine.on_channel_message(r#"{"type":"presence","users":3}"#);
    engine.on_channel_message("garbage");
    assert_eq!(source.count(), 2);
}

#[test]
fn channel_that_closes_after_open_reconnects_after_delay() {
    let transport = RecordingTransport::default();
    let clock = ManualClock::default();
    let config = EngineConfig::default();
    let channel = RealtimeChannel::new(transport.clone(), config.push_path.clone())
        .with_policy(ReconnectPolicy::from_config(&config.reconnect));
    let mut engine = Engine::builder(config, RecordingSource::default(), RecordingSink::default())
        .clock(clock.clone())
        .realtime(channel)
        .build();

    engine.start();
    engine.on_channel_open();
    engine.on_channel_closed(CloseReason::Error("reset by peer".into()));
    engine.on_channel_closed(CloseReason::Normal);
    assert_eq!(engine.channel_state(), Some(ChannelState::Closed));
    assert_eq!(engine.next_deadline(), Some(3_000));

    clock.advance(2_999);
    engine.tick();
    assert_eq!(transport.connects.borrow().len(), 1);

    clock.advance(1);
    engine.tick();
    assert_eq!(transport.connects.borrow().len(), 2);
    engine.on_channel_open();
    assert_eq!(engine.channel_state(), Some(ChannelState::Open));
}

#[test]
fn debounce_and_reconnect_timers_are_independent() {
    let transport = RecordingTransport::default();
    let source = RecordingSource::default();
    let clock = ManualClock::default();
    let config = EngineConfig::default();
    let channel = RealtimeChannel::new(transport.clone(), config.push_path.clone());
    let mut engine = Engine::builder(config, source.clone(), RecordingSink::default())
        .clock(clock.clone())
        .realtime(channel)
        .build();

    engine.start();
    engine.on_channel_closed(CloseReason::Error("refused".into()));
    engine.input_query("x");
    assert_eq!(engine.next_deadline(), Some(250));
    clock.advance(250);
    engine.tick();
    assert_eq!(source.count(), 2);
    assert_eq!(engine.next_deadline(), Some(3_000));
}

fn mutation_rig() -> (Engine, RecordingSource, RecordingSink, RecordingMutations) {
    let source = RecordingSource::default();
    let sink = RecordingSink::default();
    let mutations = RecordingMutations::default();
    let mut engine = Engine::builder(EngineConfig::default(), source.clone(), sink.clone())
        .clock(ManualClock::default())
        .status_mutation(mutations.clone())
        .build();
    engine.start();
    engine.on_fetch_response(
        RequestSeq(1),
        Ok(TicketPage {
            tickets: vec![ticket(1, "en_attente"), ticket(2, "en_cours")],
            total: 2,
        }),
    );
    (engine, source, sink, mutations)
}

#[test]
fn successful_move_confirms_and_refetches() {
    let (mut engine, source, sink, mutations) = mutation_rig();
    let DropOutcome::Sent(id) = engine.move_ticket(1, "resolu") else {
        panic!("expected a request");
    };
    assert_eq!(mutations.requests.borrow().len(), 1);
    assert_eq!(source.count(), 1);

    engine.on_mutation_response(id, Ok(()));
    assert_eq!(source.count(), 2);
    let notices = sink.notices.borrow();
    assert_eq!(notices.last().map(|n| n.level), Some(NoticeLevel::Success));
    assert!(notices.last().is_some_and(|n| n.message.contains("Resolved")));
}

#[test]
fn failed_move_alerts_and_leaves_list() {
    let (mut engine, source, sink, _mutations) = mutation_rig();
    let DropOutcome::Sent(id) = engine.move_ticket(2, "en_attente") else {
        panic!("expected a request");
    };
    engine.on_mutation_response(id, Err(MutationError::Rejected { status: 409 }));
    assert_eq!(source.count(), 1);
    assert_eq!(engine.snapshot()[1].status, "en_cours");
    assert_eq!(
        sink.notices.borrow().last().map(|n| n.level),
        Some(NoticeLevel::Alert)
    );
}

#[test]
fn move_onto_current_status_sends_nothing() {
    let (mut engine, _source, _sink, mutations) = mutation_rig();
    assert_eq!(engine.move_ticket(2, "en_cours"), DropOutcome::Unchanged);
    assert!(mutations.requests.borrow().is_empty());
}

#[test]
fn move_to_unknown_status_is_rejected_with_alert() {
    let (mut engine, _source, sink, mutations) = mutation_rig();
    let outcome = engine.move_ticket(1, "archived");
    assert!(matches!(outcome, DropOutcome::Rejected(_)));
    assert!(mutations.requests.borrow().is_empty());
    assert_eq!(
        sink.notices.borrow().last().map(|n| n.level),
        Some(NoticeLevel::Alert)
    );
}
