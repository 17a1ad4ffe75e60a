//! Recording collaborators shared by the integration tests.
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use ticketdeck_core::{
    Author, FetchRequest, MutationClient, MutationRequest, Notice, PushTransport, RenderSink,
    RenderedList, TicketPage, TicketRecord, TicketSource,
};

#[derive(Clone, Default)]
pub struct RecordingSource {
    pub requests: Rc<RefCell<Vec<FetchRequest>>>,
}

impl RecordingSource {
    pub fn count(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn last(&self) -> FetchRequest {
        self.requests
            .borrow()
            .last()
            .cloned()
            .expect("at least one request")
    }
}

impl TicketSource for RecordingSource {
    fn fetch(&mut self, request: &FetchRequest) {
        self.requests.borrow_mut().push(request.clone());
    }
}

#[derive(Clone, Default)]
pub struct RecordingSink {
    pub lists: Rc<RefCell<Vec<RenderedList>>>,
    pub errors: Rc<RefCell<Vec<String>>>,
    pub notices: Rc<RefCell<Vec<Notice>>>,
    pub busy: Rc<RefCell<bool>>,
    pub scrolls: Rc<RefCell<u32>>,
}

impl RecordingSink {
    pub fn rendered_ids(&self) -> Vec<Vec<u64>> {
        self.lists
            .borrow()
            .iter()
            .map(|list| list.tickets.iter().map(|t| t.id).collect())
            .collect()
    }
}

impl RenderSink for RecordingSink {
    fn set_busy(&mut self, busy: bool) {
        *self.busy.borrow_mut() = busy;
    }

    fn render_list(&mut self, list: &RenderedList) {
        self.lists.borrow_mut().push(list.clone());
    }

    fn render_error(&mut self, message: &str) {
        self.errors.borrow_mut().push(message.to_string());
    }

    fn notify(&mut self, notice: &Notice) {
        self.notices.borrow_mut().push(notice.clone());
    }

    fn scroll_to_top(&mut self) {
        *self.scrolls.borrow_mut() += 1;
    }
}

#[derive(Clone, Default)]
pub struct RecordingTransport {
    pub connects: Rc<RefCell<Vec<String>>>,
}

impl PushTransport for RecordingTransport {
    fn connect(&mut self, path: &str) {
        self.connects.borrow_mut().push(path.to_string());
    }

    fn disconnect(&mut self) {}
}

#[derive(Clone, Default)]
pub struct RecordingMutations {
    pub requests: Rc<RefCell<Vec<MutationRequest>>>,
}

impl MutationClient for RecordingMutations {
    fn update_status(&mut self, request: &MutationRequest) {
        self.requests.borrow_mut().push(request.clone());
    }
}

pub fn ticket(id: u64, status: &str) -> TicketRecord {
    TicketRecord {
        id,
        title: format!("Ticket {id}"),
        content: "body".to_string(),
        status: status.to_string(),
        priority: None,
        author: Author {
            id: 1,
            username: "mara".to_string(),
        },
        created_at: DateTime::<Utc>::UNIX_EPOCH,
        updated_at: None,
        deadline: None,
        admin_response: None,
    }
}

pub fn page(ids: &[u64], total: u64) -> TicketPage {
    TicketPage {
        tickets: ids.iter().map(|id| ticket(*id, "en_attente")).collect(),
        total,
    }
}
