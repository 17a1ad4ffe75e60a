//! Blocking HTTP client for the ticket server.
//!
//! The engine only hands out requests; [`Work`] items are queued by the
//! collaborators below and executed by the session loop.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::Read;
use std::rc::Rc;
use std::time::Duration;

use ticketdeck_core::{
    FetchError, FetchRequest, MutationClient, MutationError, MutationRequest, TicketPage,
    TicketSource,
};
use tracing::debug;
use url::Url;

const USER_AGENT: &str = concat!("ticketdeck-cli/", env!("CARGO_PKG_VERSION"));

/// Longest silence tolerated on a push stream. Servers keep the stream alive
/// with blank lines well inside this.
pub const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Work {
    Fetch(FetchRequest),
    Mutation(MutationRequest),
}

pub type Outbox = Rc<RefCell<VecDeque<Work>>>;

/// [`TicketSource`] that parks requests in the outbox.
pub struct QueuedSource(pub Outbox);

impl TicketSource for QueuedSource {
    fn fetch(&mut self, request: &FetchRequest) {
        self.0.borrow_mut().push_back(Work::Fetch(request.clone()));
    }
}

/// [`MutationClient`] that parks requests in the outbox.
pub struct QueuedMutations(pub Outbox);

impl MutationClient for QueuedMutations {
    fn update_status(&mut self, request: &MutationRequest) {
        self.0.borrow_mut().push_back(Work::Mutation(request.clone()));
    }
}

#[derive(Debug, Clone)]
pub struct TicketApi {
    agent: ureq::Agent,
    stream_agent: ureq::Agent,
    base: Url,
}

impl TicketApi {
    pub fn new(base: Url) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build();
        Self {
            agent,
            stream_agent: stream_agent(STREAM_IDLE_TIMEOUT),
            base: with_trailing_slash(base),
        }
    }

    /// Replace the push-stream idle timeout.
    #[must_use]
    pub fn with_stream_idle_timeout(mut self, idle: Duration) -> Self {
        self.stream_agent = stream_agent(idle);
        self
    }

    pub const fn base(&self) -> &Url {
        &self.base
    }

    /// `{server}/api/tickets?{params}`.
    pub fn list_url(&self, request: &FetchRequest) -> Result<Url, FetchError> {
        let mut url = self
            .base
            .join("api/tickets")
            .map_err(|err| FetchError::Network(err.to_string()))?;
        url.set_query(Some(&request.query_string()));
        Ok(url)
    }

    /// `{server}/api/tickets/{id}/status`.
    pub fn status_url(&self, ticket_id: u64) -> Result<Url, MutationError> {
        self.base
            .join(&format!("api/tickets/{ticket_id}/status"))
            .map_err(|err| MutationError::Network(err.to_string()))
    }

    pub fn stream_url(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base.join(path.trim_start_matches('/'))
    }

    pub fn fetch(&self, request: &FetchRequest) -> Result<TicketPage, FetchError> {
        let url = self.list_url(request)?;
        debug!(%url, seq = %request.seq, "GET");
        match self.agent.get(url.as_str()).call() {
            Ok(response) => {
                let body = response
                    .into_string()
                    .map_err(|err| FetchError::Decode(err.to_string()))?;
                TicketPage::from_json(&body)
            }
            Err(ureq::Error::Status(status, _)) => Err(FetchError::Status { status }),
            Err(ureq::Error::Transport(transport)) => {
                Err(FetchError::Network(transport.to_string()))
            }
        }
    }

    pub fn update_status(&self, request: &MutationRequest) -> Result<(), MutationError> {
        let url = self.status_url(request.ticket_id)?;
        debug!(%url, id = %request.id, status = %request.status, "POST");
        match self
            .agent
            .post(url.as_str())
            .send_json(serde_json::json!({ "status": request.status }))
        {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(status, _)) => Err(MutationError::Rejected { status }),
            Err(ureq::Error::Transport(transport)) => {
                Err(MutationError::Network(transport.to_string()))
            }
        }
    }

    /// Open the newline-delimited JSON push stream.
    pub fn open_stream(&self, path: &str) -> Result<Box<dyn Read + Send>, String> {
        let url = self.stream_url(path).map_err(|err| err.to_string())?;
        debug!(%url, "opening push stream");
        self.stream_agent
            .get(url.as_str())
            .set("Accept", "application/x-ndjson")
            .call()
            .map(|response| -> Box<dyn Read + Send> { response.into_reader() })
            .map_err(|err| err.to_string())
    }
}

// Push streams have no overall deadline; only silence ends them.
fn stream_agent(idle: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(5))
        .timeout_read(idle)
        .user_agent(USER_AGENT)
        .build()
}

/// Relative joins replace the last segment unless the base ends in `/`.
fn with_trailing_slash(mut base: Url) -> Url {
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticketdeck_core::{FilterState, RequestSeq, StatusFilter};

    fn api(base: &str) -> TicketApi {
        TicketApi::new(Url::parse(base).expect("valid url"))
    }

    #[test]
    fn list_url_carries_filter_params() {
        let request = FetchRequest {
            seq: RequestSeq(3),
            filter: FilterState {
                status: StatusFilter::Only("en_cours".into()),
                query: "vpn down".into(),
                ..FilterState::default()
            },
            page: 2,
            per_page: 10,
        };
        let url = api("http://localhost:5000").list_url(&request).expect("url");
        assert_eq!(url.path(), "/api/tickets");
        let query = url.query().expect("query");
        assert!(query.contains("status=en_cours"));
        assert!(query.contains("q=vpn+down"));
        assert!(query.contains("page=2"));
    }

    #[test]
    fn status_url_nests_under_ticket() {
        let url = api("http://localhost:5000/").status_url(42).expect("url");
        assert_eq!(url.as_str(), "http://localhost:5000/api/tickets/42/status");
    }

    #[test]
    fn stream_url_keeps_base_path() {
        let url = api("https://example.org/desk/").stream_url("/ws/tickets").expect("url");
        assert_eq!(url.as_str(), "https://example.org/desk/ws/tickets");
    }

    #[test]
    fn base_without_trailing_slash_keeps_its_last_segment() {
        let api = api("https://example.org/desk");
        assert_eq!(api.base().as_str(), "https://example.org/desk/");
        let request = FetchRequest {
            seq: RequestSeq(1),
            filter: FilterState::default(),
            page: 1,
            per_page: 10,
        };
        assert_eq!(api.list_url(&request).expect("url").path(), "/desk/api/tickets");
        assert_eq!(
            api.status_url(7).expect("url").as_str(),
            "https://example.org/desk/api/tickets/7/status"
        );
        assert_eq!(
            api.stream_url("/ws/tickets").expect("url").as_str(),
            "https://example.org/desk/ws/tickets"
        );
    }

    #[test]
    fn unreachable_server_is_a_network_error() {
        let request = FetchRequest {
            seq: RequestSeq(1),
            filter: FilterState::default(),
            page: 1,
            per_page: 10,
        };
        // port 9 (discard) is closed on test machines
        let err = api("http://127.0.0.1:9").fetch(&request).expect_err("refused");
        assert!(matches!(err, FetchError::Network(_)));
    }

    #[test]
    fn queued_collaborators_share_the_outbox() {
        let outbox = Outbox::default();
        let mut source = QueuedSource(Rc::clone(&outbox));
        let request = FetchRequest {
            seq: RequestSeq(1),
            filter: FilterState::default(),
            page: 1,
            per_page: 10,
        };
        source.fetch(&request);
        assert_eq!(outbox.borrow().front(), Some(&Work::Fetch(request)));
    }
}
