//! In-memory ticket server.
//!
//! Answers list requests the way the HTTP API does: filter, sort, then slice
//! one page. Pages past the end come back empty with the real total, which
//! is what drives the engine's clamp-and-refetch path.

use chrono::{DateTime, Duration, Utc};
use ticketdeck_core::{
    Author, FetchRequest, MutationError, SortKey, StatusFilter, TicketPage, TicketRecord,
};

use crate::rng::DeterministicRng;

pub const STATUSES: [&str; 3] = ["en_attente", "en_cours", "resolu"];
pub const AUTHORS: [&str; 5] = ["mara", "li", "jean", "sam", "noor"];
pub const WORDS: [&str; 8] = [
    "printer", "vpn", "wifi", "disk", "login", "email", "badge", "screen",
];

/// Wall-clock origin of every simulation.
#[must_use]
pub fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + Duration::days(19_800)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerChange {
    Created(u64),
    Updated(u64),
    Deleted(u64),
}

impl ServerChange {
    /// Push message announcing the change.
    #[must_use]
    pub fn push_message(&self) -> String {
        let (kind, id) = match self {
            Self::Created(id) => ("new_ticket", id),
            Self::Updated(id) => ("ticket_update", id),
            Self::Deleted(id) => ("ticket_deleted", id),
        };
        serde_json::json!({ "type": kind, "ticket": { "id": id } }).to_string()
    }
}

#[derive(Debug, Clone)]
pub struct TicketServer {
    tickets: Vec<TicketRecord>,
    next_id: u64,
}

impl TicketServer {
    /// Seed `count` tickets spread over the last few weeks.
    #[must_use]
    pub fn generate(count: usize, rng: &mut DeterministicRng) -> Self {
        let mut server = Self {
            tickets: Vec::with_capacity(count),
            next_id: 1,
        };
        for _ in 0..count {
            server.insert_random(rng);
        }
        server
    }

    #[must_use]
    pub fn tickets(&self) -> &[TicketRecord] {
        &self.tickets
    }

    /// Answer one list request. `now` decides what counts as overdue.
    #[must_use]
    pub fn query(&self, request: &FetchRequest, now: DateTime<Utc>) -> TicketPage {
        let filter = &request.filter;
        let query = filter.query.to_lowercase();
        let author = filter.author.to_lowercase();

        let mut matches: Vec<&TicketRecord> = self
            .tickets
            .iter()
            .filter(|ticket| match &filter.status {
                StatusFilter::All => true,
                StatusFilter::Only(status) => ticket.status == *status,
            })
            .filter(|ticket| {
                query.is_empty()
                    || ticket.title.to_lowercase().contains(&query)
                    || ticket.content.to_lowercase().contains(&query)
            })
            .filter(|ticket| {
                author.is_empty() || ticket.author.username.to_lowercase().contains(&author)
            })
            .filter(|ticket| !filter.overdue_only || ticket.is_overdue(now))
            .collect();

        match filter.sort {
            SortKey::Oldest => matches.sort_by_key(|t| (t.created_at, t.id)),
            SortKey::Deadline => {
                matches.sort_by_key(|t| (t.deadline.is_none(), t.deadline, t.id));
            }
            SortKey::Recent | SortKey::Other(_) => {
                matches.sort_by_key(|t| (std::cmp::Reverse(t.created_at), std::cmp::Reverse(t.id)));
            }
        }

        let per_page = usize::try_from(request.per_page.max(1)).unwrap_or(usize::MAX);
        let page = usize::try_from(request.page.max(1)).unwrap_or(usize::MAX);
        let start = (page - 1).saturating_mul(per_page);
        TicketPage {
            tickets: matches
                .iter()
                .skip(start)
                .take(per_page)
                .map(|ticket| (*ticket).clone())
                .collect(),
            total: u64::try_from(matches.len()).unwrap_or(u64::MAX),
        }
    }

    /// Apply a status change.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::Rejected`] with 404 for an unknown ticket.
    pub fn update_status(&mut self, ticket_id: u64, status: &str) -> Result<(), MutationError> {
        let ticket = self
            .tickets
            .iter_mut()
            .find(|ticket| ticket.id == ticket_id)
            .ok_or(MutationError::Rejected { status: 404 })?;
        status.clone_into(&mut ticket.status);
        Ok(())
    }

    /// Random create, update or delete, as another user would do.
    pub fn random_change(&mut self, rng: &mut DeterministicRng) -> ServerChange {
        let roll = rng.next_bounded(3);
        if roll == 0 || self.tickets.is_empty() {
            return ServerChange::Created(self.insert_random(rng));
        }
        let len = u64::try_from(self.tickets.len()).unwrap_or(u64::MAX);
        let index = usize::try_from(rng.next_bounded(len)).unwrap_or(0);
        if roll == 1 {
            let ticket = self.tickets.remove(index);
            ServerChange::Deleted(ticket.id)
        } else {
            let status = rng.pick(&STATUSES).copied().unwrap_or("en_cours");
            let ticket = &mut self.tickets[index];
            status.clone_into(&mut ticket.status);
            ServerChange::Updated(ticket.id)
        }
    }

    fn insert_random(&mut self, rng: &mut DeterministicRng) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        let word = rng.pick(&WORDS).copied().unwrap_or("printer");
        let other = rng.pick(&WORDS).copied().unwrap_or("disk");
        let author = rng.pick(&AUTHORS).copied().unwrap_or("mara");
        let status = rng.pick(&STATUSES).copied().unwrap_or("en_attente");
        let age_minutes = i64::try_from(rng.next_bounded(60 * 24 * 21)).unwrap_or(0);
        let created_at = epoch() - Duration::minutes(age_minutes);
        let deadline = rng.hit_rate_percent(60).then(|| {
            let offset = i64::try_from(rng.next_bounded(60 * 24 * 14)).unwrap_or(0);
            created_at + Duration::minutes(offset)
        });
        self.tickets.push(TicketRecord {
            id,
            title: format!("{word} problem #{id}"),
            content: format!("The {other} stopped working."),
            status: status.to_string(),
            priority: None,
            author: Author {
                id: rng.next_bounded(50) + 1,
                username: author.to_string(),
            },
            created_at,
            updated_at: None,
            deadline,
            admin_response: None,
        });
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticketdeck_core::{FilterState, RequestSeq};

    fn request(filter: FilterState, page: u32) -> FetchRequest {
        FetchRequest {
            seq: RequestSeq(1),
            filter,
            page,
            per_page: 10,
        }
    }

    #[test]
    fn paginates_and_reports_total() {
        let mut rng = DeterministicRng::new(1);
        let server = TicketServer::generate(47, &mut rng);
        let first = server.query(&request(FilterState::default(), 1), epoch());
        assert_eq!(first.total, 47);
        assert_eq!(first.tickets.len(), 10);
        let last = server.query(&request(FilterState::default(), 5), epoch());
        assert_eq!(last.tickets.len(), 7);
        let beyond = server.query(&request(FilterState::default(), 7), epoch());
        assert!(beyond.tickets.is_empty());
        assert_eq!(beyond.total, 47);
    }

    #[test]
    fn recent_is_newest_first() {
        let mut rng = DeterministicRng::new(2);
        let server = TicketServer::generate(30, &mut rng);
        let page = server.query(&request(FilterState::default(), 1), epoch());
        assert!(page.tickets.windows(2).all(|w| w[0].created_at >= w[1].created_at));
    }

    #[test]
    fn status_filter_applies() {
        let mut rng = DeterministicRng::new(3);
        let server = TicketServer::generate(40, &mut rng);
        let filter = FilterState {
            status: StatusFilter::Only("resolu".into()),
            ..FilterState::default()
        };
        let page = server.query(&request(filter, 1), epoch());
        assert!(page.tickets.iter().all(|t| t.status == "resolu"));
    }

    #[test]
    fn unknown_ticket_update_is_rejected() {
        let mut rng = DeterministicRng::new(4);
        let mut server = TicketServer::generate(3, &mut rng);
        assert_eq!(
            server.update_status(99, "resolu"),
            Err(MutationError::Rejected { status: 404 })
        );
        assert!(server.update_status(1, "resolu").is_ok());
    }

    #[test]
    fn push_message_uses_event_type() {
        let message = ServerChange::Deleted(8).push_message();
        assert!(message.contains("\"type\":\"ticket_deleted\""));
    }
}
