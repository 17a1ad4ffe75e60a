//! ticketdeck-core library.
//!
//! A sans-IO engine that keeps ticket filter criteria, the page location, and a
//! paginated, refreshable ticket list in sync. Hosts inject collaborators
//! (data source, render sink, clock, location, cache, push transport) and
//! feed completions and timer ticks back into [`Engine`].
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums at the engine boundary, `anyhow::Result`
//!   for config loading.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod clock;
pub mod config;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod filter;
pub mod model;
pub mod mutation;
pub mod pagination;
pub mod persist;
pub mod pipeline;
pub mod realtime;
pub mod render;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, ReconnectConfig, ReconnectPolicyKind};
pub use engine::{Engine, EngineBuilder};
pub use error::{CacheError, ErrorCode, FetchError, MutationError};
pub use filter::{FilterChange, FilterField, FilterPatch, FilterState, FilterStore, SortKey, StatusFilter};
pub use model::{Author, TicketPage, TicketRecord};
pub use mutation::{DropOutcome, MutationClient, MutationId, MutationRequest};
pub use pagination::{PageButton, PageState, PaginationView};
pub use persist::{DurableCache, Location, MemoryCache, MemoryLocation, PersistenceBridge};
pub use pipeline::{FetchRequest, RequestSeq, TicketSource};
pub use realtime::{ChannelState, CloseReason, NotificationPermission, Notifier, PushTransport, RealtimeChannel};
pub use render::{Notice, NoticeLevel, RenderSink, RenderedList, TicketView};
